//! Recording session, authority and command types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::detection::MeetingApp;
use crate::obs::ObsEvent;

/// Who started a recording. Fixed for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingOrigin {
    Manual,
    Auto,
    /// Recording found running in OBS and adopted by the daemon.
    Forced,
}

impl RecordingOrigin {
    /// `manual > auto == forced`
    pub fn priority(&self) -> u8 {
        match self {
            Self::Manual => 2,
            Self::Auto | Self::Forced => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Forced => "forced",
        }
    }
}

/// Who is asking for a recording to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSource {
    /// Explicit operator command.
    User,
    /// Negative detection streak reached the stop threshold.
    Debounce,
    /// State re-synchronisation after (re)connecting to OBS.
    Resync,
    /// OBS reported that its recording output stopped.
    Engine,
}

impl StopSource {
    pub fn priority(&self) -> u8 {
        match self {
            Self::User => RecordingOrigin::Manual.priority(),
            Self::Debounce | Self::Resync | Self::Engine => RecordingOrigin::Auto.priority(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Debounce => "debounce",
            Self::Resync => "resync",
            Self::Engine => "engine",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSession {
    pub id: String,
    pub origin: RecordingOrigin,
    pub app: MeetingApp,
    pub started_at: DateTime<Utc>,
}

impl RecordingSession {
    pub fn new(origin: RecordingOrigin, app: MeetingApp) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            origin,
            app,
            started_at: Utc::now(),
        }
    }

    pub fn duration_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Auto,
    /// Detection runs; only explicit commands act.
    Manual,
    /// Detection runs; nothing transitions.
    Paused,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPhase {
    Idle,
    /// Positive detections are accumulating toward the start threshold.
    Armed,
    Recording,
}

impl RecordingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Recording => "recording",
        }
    }
}

/// Operator commands accepted by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonCommand {
    Start,
    Stop,
    Toggle,
    Auto,
    Manual,
    Pause,
    Quit,
    Reload,
}

impl DaemonCommand {
    pub const ALL: [DaemonCommand; 8] = [
        Self::Start,
        Self::Stop,
        Self::Toggle,
        Self::Auto,
        Self::Manual,
        Self::Pause,
        Self::Quit,
        Self::Reload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Toggle => "toggle",
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Pause => "pause",
            Self::Quit => "quit",
            Self::Reload => "reload",
        }
    }
}

impl fmt::Display for DaemonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|command| command.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown command '{}' (expected one of: {})",
                    s,
                    Self::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

/// Engine-side facts the state machine reacts to, queued by client observers
/// and drained on the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotification {
    Connected,
    Disconnected { reason: String },
    RecordingStarted,
    RecordingStopped { output_path: Option<String> },
    /// Scene contents changed; required sources must be re-checked.
    ScenesChanged,
    EngineExiting,
}

const OUTPUT_STARTED: &str = "OBS_WEBSOCKET_OUTPUT_STARTED";
const OUTPUT_STOPPED: &str = "OBS_WEBSOCKET_OUTPUT_STOPPED";

impl EngineNotification {
    /// Translate an engine event. Intermediate output states are dropped.
    pub fn from_event(event: &ObsEvent) -> Option<Self> {
        match event {
            ObsEvent::RecordStateChanged {
                active,
                state,
                output_path,
            } => match (*active, state.as_str()) {
                (true, OUTPUT_STARTED) => Some(Self::RecordingStarted),
                (false, OUTPUT_STOPPED) => Some(Self::RecordingStopped {
                    output_path: output_path.clone(),
                }),
                _ => None,
            },
            // any scene edit may add, remove, enable or disable a required source
            ObsEvent::InputCreated { .. }
            | ObsEvent::InputRemoved { .. }
            | ObsEvent::SceneItemCreated { .. }
            | ObsEvent::SceneItemRemoved { .. }
            | ObsEvent::SceneItemEnableStateChanged { .. }
            | ObsEvent::CurrentProgramSceneChanged { .. } => Some(Self::ScenesChanged),
            ObsEvent::ExitStarted => Some(Self::EngineExiting),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_priority_order() {
        assert!(RecordingOrigin::Manual.priority() > RecordingOrigin::Auto.priority());
        assert_eq!(RecordingOrigin::Auto.priority(), RecordingOrigin::Forced.priority());
        assert!(StopSource::User.priority() >= RecordingOrigin::Manual.priority());
        assert!(StopSource::Debounce.priority() < RecordingOrigin::Manual.priority());
        assert!(StopSource::Resync.priority() >= RecordingOrigin::Forced.priority());
        assert!(StopSource::Engine.priority() < RecordingOrigin::Manual.priority());
    }

    #[test]
    fn test_command_parse() {
        assert_eq!("start".parse::<DaemonCommand>().unwrap(), DaemonCommand::Start);
        assert_eq!(" Pause\n".parse::<DaemonCommand>().unwrap(), DaemonCommand::Pause);
        let err = "record".parse::<DaemonCommand>().unwrap_err();
        assert!(err.contains("toggle"));
        for command in DaemonCommand::ALL {
            assert_eq!(command.as_str().parse::<DaemonCommand>().unwrap(), command);
        }
    }

    #[test]
    fn test_notification_from_record_events() {
        let started = ObsEvent::RecordStateChanged {
            active: true,
            state: OUTPUT_STARTED.to_string(),
            output_path: None,
        };
        assert_eq!(
            EngineNotification::from_event(&started),
            Some(EngineNotification::RecordingStarted)
        );

        let starting = ObsEvent::RecordStateChanged {
            active: false,
            state: "OBS_WEBSOCKET_OUTPUT_STARTING".to_string(),
            output_path: None,
        };
        assert_eq!(EngineNotification::from_event(&starting), None);

        let enabled = ObsEvent::SceneItemEnableStateChanged {
            scene_name: "Scene".to_string(),
            scene_item_id: 1,
            enabled: true,
        };
        assert_eq!(
            EngineNotification::from_event(&enabled),
            Some(EngineNotification::ScenesChanged)
        );
    }

    #[test]
    fn test_source_creation_requests_rescan() {
        let created = [
            ObsEvent::SceneItemCreated {
                scene_name: "Scene".to_string(),
                source_name: "Meeting Audio".to_string(),
                scene_item_id: 3,
            },
            ObsEvent::InputCreated {
                input_name: "Meeting Screen".to_string(),
                input_kind: "xshm_input".to_string(),
            },
        ];
        for event in &created {
            assert_eq!(
                EngineNotification::from_event(event),
                Some(EngineNotification::ScenesChanged)
            );
        }
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Paused).unwrap(), "\"paused\"");
        assert_eq!(Mode::default(), Mode::Auto);
    }
}
