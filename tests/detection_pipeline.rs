//! Detection snapshots flowing through the aggregator into the recorder.

use async_trait::async_trait;
use chrono::Utc;
use meetrec::config::DetectionRule;
use meetrec::detection::{Aggregator, Confidence, SystemSnapshot};
use meetrec::obs::{ObsError, RecordingEngine};
use meetrec::recorder::{
    DaemonCommand, MachineSettings, RecorderMachine, RecordingOrigin, StopSource, Transition,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct FakeEngine {
    recording: AtomicBool,
}

#[async_trait]
impl RecordingEngine for FakeEngine {
    fn is_connected(&self) -> bool {
        true
    }

    async fn start_recording(&self) -> Result<(), ObsError> {
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_recording(&self) -> Result<(), ObsError> {
        self.recording.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn recording_active(&self) -> Result<bool, ObsError> {
        Ok(self.recording.load(Ordering::SeqCst))
    }
}

fn in_meeting() -> SystemSnapshot {
    SystemSnapshot::new(
        vec!["zoom".to_string(), "CptHost".to_string()],
        vec!["Zoom Meeting".to_string()],
        Utc::now(),
    )
}

fn idle() -> SystemSnapshot {
    SystemSnapshot::new(vec!["firefox".to_string()], Vec::new(), Utc::now())
}

fn setup() -> (Arc<FakeEngine>, Aggregator, RecorderMachine) {
    let engine = Arc::new(FakeEngine::default());
    let aggregator = Aggregator::from_rules(&DetectionRule::defaults(), Confidence::Medium).unwrap();
    let machine = RecorderMachine::new(engine.clone(), MachineSettings::default());
    (engine, aggregator, machine)
}

#[tokio::test]
async fn test_meeting_starts_and_ends_automatic_recording() {
    let (engine, aggregator, mut machine) = setup();
    let now = Instant::now();

    let mut transitions = Vec::new();
    for _ in 0..3 {
        let result = aggregator.evaluate(&in_meeting()).result;
        transitions.push(machine.evaluate(result, true, now).await);
    }
    assert_eq!(transitions.last(), Some(&Transition::Started(RecordingOrigin::Auto)));
    assert!(engine.recording.load(Ordering::SeqCst));

    let mut last = Transition::Unchanged;
    for _ in 0..6 {
        let result = aggregator.evaluate(&idle()).result;
        last = machine.evaluate(result, true, now).await;
    }
    assert_eq!(last, Transition::Stopped(StopSource::Debounce));
    assert!(!engine.recording.load(Ordering::SeqCst));
    assert!(machine.session().is_none());
}

#[tokio::test]
async fn test_unarmed_sources_suppress_automatic_start() {
    let (engine, aggregator, mut machine) = setup();
    let now = Instant::now();

    for _ in 0..5 {
        let result = aggregator.evaluate(&in_meeting()).result;
        assert_eq!(machine.evaluate(result, false, now).await, Transition::Unchanged);
    }
    assert!(!engine.recording.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_detection_never_ends_manual_recording() {
    let (engine, aggregator, mut machine) = setup();
    let started = Instant::now();

    assert_eq!(
        machine.handle_command(DaemonCommand::Start, started).await,
        Transition::Started(RecordingOrigin::Manual)
    );

    let later = started + Duration::from_secs(600);
    for _ in 0..20 {
        let result = aggregator.evaluate(&idle()).result;
        let transition = machine.evaluate(result, true, later).await;
        assert!(!matches!(transition, Transition::Stopped(_)));
    }
    assert!(engine.recording.load(Ordering::SeqCst));

    assert_eq!(
        machine.handle_command(DaemonCommand::Stop, later).await,
        Transition::Stopped(StopSource::User)
    );
    assert!(!engine.recording.load(Ordering::SeqCst));
}
