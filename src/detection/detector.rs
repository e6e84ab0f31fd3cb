//! Per-application meeting detectors.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

use super::probe::SystemSnapshot;
use super::signals::{RawSignalBundle, PROBE_HOST, PROBE_PROCESS, PROBE_WINDOW};
use super::types::{Confidence, DetectionResult, MeetingApp};
use crate::config::DetectionRule;

/// What one detector saw during a poll.
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    pub result: DetectionResult,
    pub signals: RawSignalBundle,
}

/// A probe for a single meeting application.
pub trait Detector: Send + Sync {
    fn app(&self) -> MeetingApp;

    fn detect(&self, snapshot: &SystemSnapshot) -> Result<DetectorOutput>;
}

/// Detector driven by a configured [`DetectionRule`].
pub struct RuleDetector {
    app: MeetingApp,
    process_names: Vec<String>,
    host_process_names: Vec<String>,
    window_hints: Vec<Regex>,
    min_confidence: Confidence,
}

impl RuleDetector {
    pub fn from_rule(rule: &DetectionRule, min_confidence: Confidence) -> Result<Self> {
        let app = rule
            .app()
            .with_context(|| format!("Unknown application '{}'", rule.application))?;

        let window_hints = rule
            .window_hints
            .iter()
            .map(|hint| {
                RegexBuilder::new(hint)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("Invalid window hint '{}'", hint))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            app,
            process_names: rule.process_names.clone(),
            host_process_names: rule.host_process_names.clone(),
            window_hints,
            min_confidence,
        })
    }

    fn matching_window<'a>(&self, snapshot: &'a SystemSnapshot) -> Option<&'a str> {
        snapshot
            .window_titles
            .iter()
            .find(|title| self.window_hints.iter().any(|hint| hint.is_match(title)))
            .map(|title| title.as_str())
    }
}

impl Detector for RuleDetector {
    fn app(&self) -> MeetingApp {
        self.app
    }

    fn detect(&self, snapshot: &SystemSnapshot) -> Result<DetectorOutput> {
        let process = snapshot.has_process(&self.process_names);
        let host = !self.host_process_names.is_empty()
            && snapshot.has_process(&self.host_process_names);
        let window_title = self.matching_window(snapshot);
        let window = window_title.is_some();

        let mut signals = RawSignalBundle::new();
        signals.set(self.app, PROBE_PROCESS, process);
        signals.set(self.app, PROBE_HOST, host);
        signals.set(self.app, PROBE_WINDOW, window);

        let confidence = Confidence::from_signals(process, host, window);
        let meeting_detected =
            confidence != Confidence::None && confidence >= self.min_confidence;

        let result = DetectionResult {
            meeting_detected,
            detected_app: if meeting_detected {
                self.app
            } else {
                MeetingApp::None
            },
            window_title: if process {
                window_title.unwrap_or_default().to_string()
            } else {
                String::new()
            },
            confidence,
            evaluated_at: snapshot.taken_at,
        };

        Ok(DetectorOutput { result, signals })
    }
}
