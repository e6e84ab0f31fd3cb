//! OBS Studio control over obs-websocket v5.

pub mod backoff;
pub mod client;
pub mod error;
pub mod events;
pub mod protocol;
pub mod requests;


pub use backoff::Backoff;
pub use client::{ClientOptions, ConnectionState, ObsClient};
pub use error::ObsError;
pub use events::{ClientEvent, ObsEvent};
pub use requests::{RecordStatus, RecordingEngine, SceneControl, SceneItem, VersionInfo};
