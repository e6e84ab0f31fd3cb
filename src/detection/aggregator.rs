//! Runs every registered detector once per poll and merges their output.

use anyhow::Result;
use tracing::warn;

use super::detector::{Detector, DetectorOutput, RuleDetector};
use super::probe::SystemSnapshot;
use super::signals::RawSignalBundle;
use super::types::{Confidence, DetectionResult, MeetingApp};
use crate::config::DetectionRule;

/// Merged view of one detection cycle.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Highest-confidence positive detection, or a negative result.
    pub result: DetectionResult,
    /// OR of every detector's raw signals.
    pub signals: RawSignalBundle,
    pub outputs: Vec<DetectorOutput>,
    /// Detectors skipped this cycle because they returned an error.
    pub failed: Vec<MeetingApp>,
}

#[derive(Default)]
pub struct Aggregator {
    detectors: Vec<Box<dyn Detector>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one [`RuleDetector`] per enabled rule, in file order.
    pub fn from_rules(rules: &[DetectionRule], min_confidence: Confidence) -> Result<Self> {
        let mut aggregator = Self::new();
        for rule in rules.iter().filter(|r| r.enabled) {
            aggregator.register(Box::new(RuleDetector::from_rule(rule, min_confidence)?));
        }
        Ok(aggregator)
    }

    /// Registration order is the tie-break order.
    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn evaluate(&self, snapshot: &SystemSnapshot) -> Aggregation {
        let mut signals = RawSignalBundle::new();
        let mut outputs = Vec::with_capacity(self.detectors.len());
        let mut failed = Vec::new();
        let mut best: Option<DetectionResult> = None;

        for detector in &self.detectors {
            let output = match detector.detect(snapshot) {
                Ok(output) => output,
                Err(e) => {
                    warn!("Detector {} failed, skipping this cycle: {:#}", detector.app(), e);
                    failed.push(detector.app());
                    continue;
                }
            };

            signals.merge(&output.signals);

            if output.result.meeting_detected {
                let better = match &best {
                    Some(current) => output.result.confidence.rank() > current.confidence.rank(),
                    None => true,
                };
                if better {
                    best = Some(output.result.clone());
                }
            }

            outputs.push(output);
        }

        Aggregation {
            result: best.unwrap_or_else(|| DetectionResult::none(snapshot.taken_at)),
            signals,
            outputs,
            failed,
        }
    }
}
