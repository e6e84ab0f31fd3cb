//! Published daemon status and the pending-command slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use super::types::{DaemonCommand, Mode, RecordingPhase, RecordingSession};
use crate::detection::{Confidence, MeetingApp};
use crate::sources::SourcesHealth;

/// Snapshot published once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub mode: Mode,
    /// `detected` or `not_detected`.
    pub detection_state: String,
    pub detected_app: MeetingApp,
    pub confidence: Confidence,
    pub recording_state: RecordingPhase,
    pub start_streak: u32,
    pub stop_streak: u32,
    pub last_action: Option<String>,
    pub last_error: Option<String>,
    pub obs_connected: bool,
    pub sources_state: SourcesHealth,
    pub session: Option<RecordingSession>,
    pub timestamp: DateTime<Utc>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            detection_state: "not_detected".to_string(),
            detected_app: MeetingApp::None,
            confidence: Confidence::None,
            recording_state: RecordingPhase::Idle,
            start_streak: 0,
            stop_streak: 0,
            last_action: None,
            last_error: None,
            obs_connected: false,
            sources_state: SourcesHealth::Unknown,
            session: None,
            timestamp: Utc::now(),
        }
    }
}

/// Shared status, written by the poll loop and read by API handlers.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl StatusHandle {
    pub async fn get(&self) -> StatusSnapshot {
        self.inner.lock().await.clone()
    }

    pub async fn publish(&self, snapshot: StatusSnapshot) {
        *self.inner.lock().await = snapshot;
    }
}

/// Single pending operator command. A newer command replaces an older one
/// that has not been consumed yet.
#[derive(Clone, Default)]
pub struct CommandSlot {
    inner: Arc<StdMutex<Option<DaemonCommand>>>,
}

impl CommandSlot {
    /// Deposit a command, returning the one it replaced.
    pub fn put(&self, command: DaemonCommand) -> Option<DaemonCommand> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(command)
    }

    /// Take and clear the pending command.
    pub fn take(&self) -> Option<DaemonCommand> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_slot_latest_wins() {
        let slot = CommandSlot::default();
        assert_eq!(slot.put(DaemonCommand::Start), None);
        assert_eq!(slot.put(DaemonCommand::Stop), Some(DaemonCommand::Start));
        assert_eq!(slot.take(), Some(DaemonCommand::Stop));
        assert_eq!(slot.take(), None);
    }

    #[tokio::test]
    async fn test_status_handle_publish() {
        let handle = StatusHandle::default();
        assert_eq!(handle.get().await.recording_state, RecordingPhase::Idle);

        let snapshot = StatusSnapshot {
            mode: Mode::Paused,
            start_streak: 2,
            ..StatusSnapshot::default()
        };
        handle.publish(snapshot).await;

        let current = handle.get().await;
        assert_eq!(current.mode, Mode::Paused);
        assert_eq!(current.start_streak, 2);
    }

    #[test]
    fn test_snapshot_json_fields() {
        let value = serde_json::to_value(StatusSnapshot::default()).unwrap();
        for field in [
            "mode",
            "detection_state",
            "recording_state",
            "start_streak",
            "stop_streak",
            "last_action",
            "last_error",
            "obs_connected",
            "sources_state",
            "session",
            "timestamp",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(value["sources_state"], "unknown");
    }
}
