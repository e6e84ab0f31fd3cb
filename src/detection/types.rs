//! Detection result types shared by detectors, the aggregator and the recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Meeting applications the detector set knows how to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingApp {
    None,
    Zoom,
    Teams,
    Webex,
    GoogleMeet,
}

impl MeetingApp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zoom => "zoom",
            Self::Teams => "teams",
            Self::Webex => "webex",
            Self::GoogleMeet => "google_meet",
        }
    }

    /// Parse an application name as written in `[[rules]]`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "zoom" => Some(Self::Zoom),
            "teams" | "microsoft_teams" | "msteams" => Some(Self::Teams),
            "webex" | "cisco_webex" => Some(Self::Webex),
            "google_meet" | "meet" | "googlemeet" => Some(Self::GoogleMeet),
            _ => None,
        }
    }
}

impl std::fmt::Display for MeetingApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How sure a detector is that a meeting is in progress.
///
/// Variants are declared in rank order so the derived `Ord` agrees with
/// [`Confidence::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    /// Escalation rule applied to one application's probes.
    ///
    /// The main process is mandatory; each of the host-process and
    /// window-title signals raises the level by one step.
    pub fn from_signals(process: bool, host: bool, window: bool) -> Self {
        if !process {
            return Self::None;
        }
        match (host, window) {
            (true, true) => Self::High,
            (true, false) | (false, true) => Self::Medium,
            (false, false) => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Outcome of one detection pass. Built fresh every poll and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub meeting_detected: bool,
    pub detected_app: MeetingApp,
    pub window_title: String,
    pub confidence: Confidence,
    pub evaluated_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn none(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            meeting_detected: false,
            detected_app: MeetingApp::None,
            window_title: String::new(),
            confidence: Confidence::None,
            evaluated_at,
        }
    }
}
