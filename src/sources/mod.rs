//! Required OBS sources: one audio input and one display capture in the
//! active scene.

pub mod reconciler;

use serde::{Deserialize, Serialize};

pub use reconciler::{ReconcileReport, SourceReconciler};

/// Platform input kinds used when a required source must be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputKinds {
    pub audio: &'static str,
    pub display: &'static str,
}

impl InputKinds {
    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            Self {
                audio: "coreaudio_input_capture",
                display: "screen_capture",
            }
        } else if cfg!(target_os = "windows") {
            Self {
                audio: "wasapi_input_capture",
                display: "monitor_capture",
            }
        } else {
            Self {
                audio: "pulse_input_capture",
                display: "xshm_input",
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Audio,
    Display,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio input",
            Self::Display => "display capture",
        }
    }
}

/// What the last reconciliation found in the active scene.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredSourcesStatus {
    pub has_audio_input: bool,
    pub has_display_video: bool,
    pub audio_name: Option<String>,
    pub video_name: Option<String>,
}

impl RequiredSourcesStatus {
    /// Both sources present and enabled.
    pub fn is_ready(&self) -> bool {
        self.has_audio_input && self.has_display_video
    }

    pub(crate) fn mark(&mut self, kind: SourceKind, name: &str) {
        match kind {
            SourceKind::Audio => {
                self.has_audio_input = true;
                self.audio_name = Some(name.to_string());
            }
            SourceKind::Display => {
                self.has_display_video = true;
                self.video_name = Some(name.to_string());
            }
        }
    }
}

/// Whether automatic recording may rely on the sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcesHealth {
    /// Not checked yet on this connection.
    Unknown,
    Ready,
    /// A reconciliation failed; retrying inside the recovery window.
    Recovering,
    /// The recovery window expired. Automatic recording is off until a
    /// later reconciliation succeeds.
    Disabled,
}

impl SourcesHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ready => "ready",
            Self::Recovering => "recovering",
            Self::Disabled => "disabled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_kinds_are_distinct() {
        let kinds = InputKinds::for_platform();
        assert_ne!(kinds.audio, kinds.display);
        #[cfg(target_os = "linux")]
        assert_eq!(kinds.audio, "pulse_input_capture");
    }

    #[test]
    fn test_status_ready_needs_both() {
        let mut status = RequiredSourcesStatus::default();
        status.mark(SourceKind::Audio, "Mic");
        assert!(!status.is_ready());
        status.mark(SourceKind::Display, "Screen");
        assert!(status.is_ready());
        assert_eq!(status.video_name.as_deref(), Some("Screen"));
    }
}
