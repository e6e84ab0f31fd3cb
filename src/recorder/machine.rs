//! Debounced recording state machine.
//!
//! Detection results arrive once per tick and move two streak counters.
//! Crossing a threshold asks the engine to start or stop, but every stop goes
//! through [`RecorderMachine::authorize_stop`]: a requester may only end a
//! session whose origin does not outrank it, so automation can never end a
//! recording the operator started.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::status::StatusSnapshot;
use super::types::{
    DaemonCommand, EngineNotification, Mode, RecordingOrigin, RecordingPhase, RecordingSession,
    StopSource,
};
use crate::config::DetectionConfig;
use crate::detection::{Confidence, DetectionResult, MeetingApp};
use crate::logs::diagnostics;
use crate::obs::RecordingEngine;
use crate::sources::SourcesHealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineSettings {
    pub start_threshold: u32,
    pub stop_threshold: u32,
    /// Automated signals this close to a manual start are treated as in-flight.
    pub manual_debounce: Duration,
}

impl MachineSettings {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            start_threshold: config.start_threshold.max(1),
            stop_threshold: config.stop_threshold.max(1),
            manual_debounce: Duration::from_secs(config.manual_debounce_seconds),
        }
    }
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

/// What a call into the machine did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Started(RecordingOrigin),
    Stopped(StopSource),
    StopRejected { source: StopSource, reason: String },
    /// An engine-side recording was taken over as a forced session.
    Adopted,
    /// The engine reported the recording ended.
    Ended,
    StartFailed(String),
    StopFailed(String),
    ModeChanged(Mode),
    Reload,
    Quit,
}

struct ActiveSession {
    session: RecordingSession,
    since: Instant,
}

pub struct RecorderMachine {
    engine: Arc<dyn RecordingEngine>,
    settings: MachineSettings,
    mode: Mode,
    active: Option<ActiveSession>,
    start_streak: u32,
    stop_streak: u32,
    last_detection: Option<DetectionResult>,
    last_action: Option<String>,
    last_error: Option<String>,
}

impl RecorderMachine {
    pub fn new(engine: Arc<dyn RecordingEngine>, settings: MachineSettings) -> Self {
        Self {
            engine,
            settings,
            mode: Mode::Auto,
            active: None,
            start_streak: 0,
            stop_streak: 0,
            last_detection: None,
            last_action: None,
            last_error: None,
        }
    }

    pub fn apply_settings(&mut self, settings: MachineSettings) {
        if settings != self.settings {
            info!(
                "Recorder thresholds updated: start {}, stop {}, manual debounce {}s",
                settings.start_threshold,
                settings.stop_threshold,
                settings.manual_debounce.as_secs()
            );
        }
        self.settings = settings;
    }

    pub fn settings(&self) -> MachineSettings {
        self.settings
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub fn start_streak(&self) -> u32 {
        self.start_streak
    }

    pub fn stop_streak(&self) -> u32 {
        self.stop_streak
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn phase(&self) -> RecordingPhase {
        if self.active.is_some() {
            RecordingPhase::Recording
        } else if self.start_streak > 0 {
            RecordingPhase::Armed
        } else {
            RecordingPhase::Idle
        }
    }

    /// Feed one aggregated detection result.
    pub async fn evaluate(
        &mut self,
        detection: DetectionResult,
        sources_armed: bool,
        now: Instant,
    ) -> Transition {
        if detection.meeting_detected {
            self.start_streak = self.start_streak.saturating_add(1);
            self.stop_streak = 0;
        } else {
            self.stop_streak = self.stop_streak.saturating_add(1);
            self.start_streak = 0;
        }
        let detected_app = detection.detected_app;
        self.last_detection = Some(detection);

        if self.mode != Mode::Auto {
            return Transition::Unchanged;
        }

        match &self.active {
            None if self.start_streak >= self.settings.start_threshold => {
                if !sources_armed {
                    debug!("Meeting detected but required sources are not ready; automatic start suppressed");
                    return Transition::Unchanged;
                }
                if !self.engine.is_connected() {
                    debug!("Meeting detected but OBS is not connected");
                    return Transition::Unchanged;
                }
                self.start(RecordingOrigin::Auto, detected_app, now).await
            }
            Some(active) if self.stop_streak >= self.settings.stop_threshold => {
                // manual sessions get one rejection per negative streak
                if active.session.origin == RecordingOrigin::Manual
                    && self.stop_streak > self.settings.stop_threshold
                {
                    return Transition::Unchanged;
                }
                self.stop(StopSource::Debounce, now).await
            }
            _ => Transition::Unchanged,
        }
    }

    pub async fn handle_command(&mut self, command: DaemonCommand, now: Instant) -> Transition {
        info!("Command received: {}", command);
        match command {
            DaemonCommand::Start => self.manual_start(now).await,
            DaemonCommand::Stop => {
                if self.active.is_none() {
                    info!("No active recording; stop ignored");
                    return Transition::Unchanged;
                }
                self.stop(StopSource::User, now).await
            }
            DaemonCommand::Toggle => {
                if self.active.is_some() {
                    self.stop(StopSource::User, now).await
                } else {
                    self.manual_start(now).await
                }
            }
            DaemonCommand::Auto => self.set_mode(Mode::Auto),
            DaemonCommand::Manual => self.set_mode(Mode::Manual),
            DaemonCommand::Pause => self.set_mode(Mode::Paused),
            DaemonCommand::Reload => Transition::Reload,
            DaemonCommand::Quit => Transition::Quit,
        }
    }

    pub async fn handle_notification(
        &mut self,
        notification: EngineNotification,
        now: Instant,
    ) -> Transition {
        match notification {
            EngineNotification::Connected => self.resync(now).await,
            EngineNotification::Disconnected { reason } => {
                if let Some(session) = self.session() {
                    warn!(
                        "OBS connection lost during {} session {}: {}",
                        session.origin.as_str(),
                        session.id,
                        reason
                    );
                }
                Transition::Unchanged
            }
            EngineNotification::RecordingStarted => {
                if self.active.is_some() {
                    Transition::Unchanged
                } else {
                    self.adopt(now)
                }
            }
            EngineNotification::RecordingStopped { output_path } => {
                self.engine_stopped(output_path, now)
            }
            EngineNotification::ScenesChanged => Transition::Unchanged,
            EngineNotification::EngineExiting => {
                info!("OBS is shutting down");
                Transition::Unchanged
            }
        }
    }

    /// Reconcile the session with what the engine reports after (re)connecting.
    pub async fn resync(&mut self, now: Instant) -> Transition {
        let recording = match self.engine.recording_active().await {
            Ok(recording) => recording,
            Err(e) => {
                warn!("Could not query OBS recording status: {}", e);
                self.last_error = Some(format!("resync failed: {}", e));
                return Transition::Unchanged;
            }
        };

        match (recording, self.active.is_some()) {
            (true, false) => self.adopt(now),
            (false, true) => match self.authorize_stop(StopSource::Resync, now) {
                Ok(()) => {
                    if let Some(ended) = self.active.take() {
                        info!(
                            "OBS is no longer recording; clearing {} session {}",
                            ended.session.origin.as_str(),
                            ended.session.id
                        );
                    }
                    self.last_action = Some("recording ended while disconnected".to_string());
                    Transition::Ended
                }
                Err(reason) => {
                    self.reject(StopSource::Resync, reason.clone());
                    warn!("OBS is not recording; the manual session stays until an explicit stop");
                    Transition::StopRejected {
                        source: StopSource::Resync,
                        reason,
                    }
                }
            },
            _ => Transition::Unchanged,
        }
    }

    /// Authority check for ending the active session.
    pub fn authorize_stop(&self, source: StopSource, now: Instant) -> Result<(), String> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| "no active session".to_string())?;
        let origin = active.session.origin;

        if source.priority() >= origin.priority() {
            return Ok(());
        }

        if origin == RecordingOrigin::Manual {
            let elapsed = now.saturating_duration_since(active.since);
            if elapsed <= self.settings.manual_debounce {
                return Err(format!(
                    "{} stop arrived {}ms after manual start, inside the {}s debounce window",
                    source.as_str(),
                    elapsed.as_millis(),
                    self.settings.manual_debounce.as_secs()
                ));
            }
            return Err(format!(
                "{} stop cannot end a manual session; only an explicit user stop can",
                source.as_str()
            ));
        }

        Err(format!(
            "{} stop is outranked by {} session",
            source.as_str(),
            origin.as_str()
        ))
    }

    pub fn snapshot(&self, obs_connected: bool, sources_state: SourcesHealth) -> StatusSnapshot {
        let (detected, detected_app, confidence) = self
            .last_detection
            .as_ref()
            .map(|d| (d.meeting_detected, d.detected_app, d.confidence))
            .unwrap_or((false, MeetingApp::None, Confidence::None));

        StatusSnapshot {
            mode: self.mode,
            detection_state: if detected { "detected" } else { "not_detected" }.to_string(),
            detected_app,
            confidence,
            recording_state: self.phase(),
            start_streak: self.start_streak,
            stop_streak: self.stop_streak,
            last_action: self.last_action.clone(),
            last_error: self.last_error.clone(),
            obs_connected,
            sources_state,
            session: self.session().cloned(),
            timestamp: Utc::now(),
        }
    }

    async fn manual_start(&mut self, now: Instant) -> Transition {
        if let Some(session) = self.session() {
            info!(
                "Already recording ({} session {}); start ignored",
                session.origin.as_str(),
                session.id
            );
            return Transition::Unchanged;
        }
        if self.mode == Mode::Paused {
            warn!("Recorder is paused; start ignored. Switch to auto or manual first.");
            self.last_action = Some("start ignored while paused".to_string());
            return Transition::Unchanged;
        }
        let app = self
            .last_detection
            .as_ref()
            .filter(|d| d.meeting_detected)
            .map(|d| d.detected_app)
            .unwrap_or(MeetingApp::None);
        self.start(RecordingOrigin::Manual, app, now).await
    }

    fn set_mode(&mut self, mode: Mode) -> Transition {
        if self.mode == mode {
            return Transition::Unchanged;
        }
        info!("Mode changed: {} -> {}", self.mode.as_str(), mode.as_str());
        self.mode = mode;
        self.last_action = Some(format!("mode set to {}", mode.as_str()));
        Transition::ModeChanged(mode)
    }

    async fn start(&mut self, origin: RecordingOrigin, app: MeetingApp, now: Instant) -> Transition {
        match self.engine.start_recording().await {
            Ok(()) => {
                let session = RecordingSession::new(origin, app);
                info!(
                    "Recording started (origin: {}, app: {}, session: {})",
                    origin.as_str(),
                    app,
                    session.id
                );
                diagnostics::emit(
                    "recorder",
                    "recording_started",
                    Some(&session.id),
                    json!({ "origin": origin.as_str(), "app": app.as_str() }),
                );
                self.last_action = Some(format!("started {} recording", origin.as_str()));
                self.last_error = None;
                self.active = Some(ActiveSession {
                    session,
                    since: now,
                });
                Transition::Started(origin)
            }
            Err(e) => {
                warn!("Failed to start recording: {}", e);
                self.last_error = Some(format!("start failed: {}", e));
                Transition::StartFailed(e.to_string())
            }
        }
    }

    async fn stop(&mut self, source: StopSource, now: Instant) -> Transition {
        if let Err(reason) = self.authorize_stop(source, now) {
            self.reject(source, reason.clone());
            return Transition::StopRejected { source, reason };
        }

        match self.engine.stop_recording().await {
            Ok(()) => {
                if let Some(ended) = self.active.take() {
                    info!(
                        "Recording stopped by {} after {}s (session {})",
                        source.as_str(),
                        ended.session.duration_seconds(),
                        ended.session.id
                    );
                    diagnostics::emit(
                        "recorder",
                        "recording_stopped",
                        Some(&ended.session.id),
                        json!({
                            "source": source.as_str(),
                            "origin": ended.session.origin.as_str(),
                        }),
                    );
                }
                self.last_action = Some(format!("stopped recording ({})", source.as_str()));
                self.last_error = None;
                Transition::Stopped(source)
            }
            Err(e) => {
                warn!("Failed to stop recording: {}", e);
                self.last_error = Some(format!("stop failed: {}", e));
                Transition::StopFailed(e.to_string())
            }
        }
    }

    fn reject(&mut self, source: StopSource, reason: String) {
        let session_id = self.session().map(|s| s.id.clone());
        warn!("Rejected override attempt: {}", reason);
        diagnostics::emit(
            "recorder",
            "stop_rejected",
            session_id.as_deref(),
            json!({ "source": source.as_str(), "reason": reason }),
        );
        self.last_action = Some(format!("rejected {} stop", source.as_str()));
    }

    fn adopt(&mut self, now: Instant) -> Transition {
        let app = self
            .last_detection
            .as_ref()
            .filter(|d| d.meeting_detected)
            .map(|d| d.detected_app)
            .unwrap_or(MeetingApp::None);
        let session = RecordingSession::new(RecordingOrigin::Forced, app);
        info!(
            "Adopting recording started outside the daemon (session {})",
            session.id
        );
        diagnostics::emit(
            "recorder",
            "recording_adopted",
            Some(&session.id),
            json!({ "app": app.as_str() }),
        );
        self.last_action = Some("adopted external recording".to_string());
        self.active = Some(ActiveSession {
            session,
            since: now,
        });
        Transition::Adopted
    }

    fn engine_stopped(&mut self, output_path: Option<String>, now: Instant) -> Transition {
        if self.active.is_none() {
            return Transition::Unchanged;
        }
        if let Some(path) = &output_path {
            info!("Recording saved to {}", path);
        }

        if let Err(reason) = self.authorize_stop(StopSource::Engine, now) {
            self.reject(StopSource::Engine, reason.clone());
            warn!("OBS stopped recording; the manual session stays until an explicit stop");
            return Transition::StopRejected {
                source: StopSource::Engine,
                reason,
            };
        }

        if let Some(ended) = self.active.take() {
            info!(
                "OBS reported recording ended ({} session {})",
                ended.session.origin.as_str(),
                ended.session.id
            );
            diagnostics::emit(
                "recorder",
                "recording_ended",
                Some(&ended.session.id),
                json!({ "origin": ended.session.origin.as_str(), "output_path": output_path }),
            );
        }
        self.last_action = Some("recording ended in OBS".to_string());
        Transition::Ended
    }
}
