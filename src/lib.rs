pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod detection;
pub mod global;
pub mod logs;
pub mod obs;
pub mod recorder;
pub mod sources;
