pub mod machine;
pub mod status;
pub mod types;

pub use machine::{MachineSettings, RecorderMachine, Transition};
pub use status::{CommandSlot, StatusHandle, StatusSnapshot};
pub use types::{
    DaemonCommand, EngineNotification, Mode, RecordingOrigin, RecordingPhase, RecordingSession,
    StopSource,
};
