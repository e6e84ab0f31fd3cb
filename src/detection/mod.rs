//! Meeting detection.
//!
//! Probes the OS for meeting applications, scores each application with a
//! confidence level, and aggregates the per-application results into one
//! detection per poll.

pub mod aggregator;
pub mod detector;
pub mod probe;
pub mod signals;
pub mod types;

pub use aggregator::{Aggregation, Aggregator};
pub use detector::{Detector, DetectorOutput, RuleDetector};
pub use probe::{OsProbe, SystemProbe, SystemSnapshot};
pub use signals::RawSignalBundle;
pub use types::{Confidence, DetectionResult, MeetingApp};
