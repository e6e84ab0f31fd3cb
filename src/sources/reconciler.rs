//! Source reconciliation with bounded retry and a time-boxed recovery window.

use serde::Serialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{InputKinds, RequiredSourcesStatus, SourceKind, SourcesHealth};
use crate::config::SourcesConfig;
use crate::logs::diagnostics;
use crate::obs::protocol::status_code;
use crate::obs::{ObsError, SceneControl, SceneItem};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub scene: Option<String>,
    pub status: RequiredSourcesStatus,
    pub created: Vec<String>,
    pub enabled: Vec<String>,
    /// Kinds OBS rejected as unsupported. Not retried.
    pub incompatible: Vec<String>,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }
}

enum CreateFailure {
    Incompatible(ObsError),
    Failed(ObsError),
}

pub struct SourceReconciler {
    config: SourcesConfig,
    kinds: InputKinds,
    health: SourcesHealth,
    status: RequiredSourcesStatus,
    recovery_started: Option<Instant>,
    last_attempt: Option<Instant>,
    dirty: bool,
}

impl SourceReconciler {
    pub fn new(config: SourcesConfig) -> Self {
        Self::with_kinds(config, InputKinds::for_platform())
    }

    pub fn with_kinds(config: SourcesConfig, kinds: InputKinds) -> Self {
        Self {
            config,
            kinds,
            health: SourcesHealth::Unknown,
            status: RequiredSourcesStatus::default(),
            recovery_started: None,
            last_attempt: None,
            dirty: true,
        }
    }

    pub fn health(&self) -> SourcesHealth {
        self.health
    }

    pub fn status(&self) -> &RequiredSourcesStatus {
        &self.status
    }

    /// Automatic recording is allowed only on verified sources.
    pub fn is_armed(&self) -> bool {
        self.health == SourcesHealth::Ready
    }

    /// Scene contents changed or the connection was re-established.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn update_config(&mut self, config: SourcesConfig) {
        self.config = config;
        self.dirty = true;
    }

    /// A reconciliation should run now: the scene was invalidated, or a
    /// recovery retry is due.
    pub fn needs_reconcile(&self, now: Instant) -> bool {
        if self.dirty && self.health != SourcesHealth::Recovering {
            return true;
        }
        match (self.health, self.last_attempt) {
            (SourcesHealth::Recovering, Some(last)) => {
                now.saturating_duration_since(last) >= self.recovery_interval()
            }
            (SourcesHealth::Recovering, None) => true,
            _ => false,
        }
    }

    fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.config.recovery_interval_seconds)
    }

    fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.config.recovery_window_seconds)
    }

    /// Run one pass and update health.
    pub async fn reconcile(&mut self, scene: &dyn SceneControl, now: Instant) -> ReconcileReport {
        self.dirty = false;
        self.last_attempt = Some(now);

        let report = self.reconcile_once(scene).await;
        self.status = report.status.clone();

        let previous = self.health;
        if report.is_ready() {
            self.health = SourcesHealth::Ready;
            self.recovery_started = None;
            match previous {
                SourcesHealth::Recovering | SourcesHealth::Disabled => {
                    info!("Required OBS sources are ready; automatic recording re-armed")
                }
                _ => debug!("Required OBS sources are ready"),
            }
        } else {
            match previous {
                SourcesHealth::Unknown | SourcesHealth::Ready => {
                    warn!(
                        "Required OBS sources not ready ({}); retrying every {}s for up to {}s",
                        report.errors.join("; "),
                        self.config.recovery_interval_seconds,
                        self.config.recovery_window_seconds
                    );
                    self.health = SourcesHealth::Recovering;
                    self.recovery_started = Some(now);
                }
                SourcesHealth::Recovering => {
                    let started = self.recovery_started.unwrap_or(now);
                    if now.saturating_duration_since(started) >= self.recovery_window() {
                        warn!(
                            "Could not prepare OBS sources within {}s; automatic recording disabled. \
                             Fix the scene in OBS, then start a recording manually to re-arm.",
                            self.config.recovery_window_seconds
                        );
                        self.health = SourcesHealth::Disabled;
                        self.recovery_started = None;
                    } else {
                        debug!("Sources still not ready: {}", report.errors.join("; "));
                    }
                }
                SourcesHealth::Disabled => {
                    debug!("Sources still not ready while disabled: {}", report.errors.join("; "))
                }
            }
        }

        diagnostics::emit(
            "sources",
            "reconciled",
            None,
            json!({
                "health": self.health.as_str(),
                "report": &report,
            }),
        );
        report
    }

    async fn reconcile_once(&self, scene: &dyn SceneControl) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let scene_name = match scene.current_scene().await {
            Ok(name) => name,
            Err(e) => {
                report.errors.push(format!("current scene: {}", e));
                return report;
            }
        };
        let items = match scene.scene_items(&scene_name).await {
            Ok(items) => items,
            Err(e) => {
                report.errors.push(format!("scene items: {}", e));
                report.scene = Some(scene_name);
                return report;
            }
        };

        for kind in [SourceKind::Audio, SourceKind::Display] {
            let name = self.configured_name(kind);
            match self.find(&items, kind) {
                Some(item) if item.scene_item_enabled => {
                    report.status.mark(kind, &item.source_name);
                }
                Some(item) => {
                    match scene
                        .set_item_enabled(&scene_name, item.scene_item_id, true)
                        .await
                    {
                        Ok(()) => {
                            info!("Enabled {} '{}' in scene '{}'", kind.as_str(), item.source_name, scene_name);
                            report.enabled.push(item.source_name.clone());
                            report.status.mark(kind, &item.source_name);
                        }
                        Err(e) => report
                            .errors
                            .push(format!("enable {} '{}': {}", kind.as_str(), item.source_name, e)),
                    }
                }
                None => match self.create_with_retry(scene, &scene_name, kind).await {
                    Ok(()) => {
                        info!("Created {} '{}' in scene '{}'", kind.as_str(), name, scene_name);
                        report.created.push(name.to_string());
                        report.status.mark(kind, name);
                    }
                    Err(CreateFailure::Incompatible(e)) => {
                        report.incompatible.push(self.input_kind(kind).to_string());
                        report.errors.push(format!("create {}: {}", kind.as_str(), e));
                    }
                    Err(CreateFailure::Failed(e)) => {
                        report.errors.push(format!("create {}: {}", kind.as_str(), e));
                    }
                },
            }
        }

        report.scene = Some(scene_name);
        report
    }

    async fn create_with_retry(
        &self,
        scene: &dyn SceneControl,
        scene_name: &str,
        kind: SourceKind,
    ) -> Result<(), CreateFailure> {
        let name = self.configured_name(kind);
        let input_kind = self.input_kind(kind);
        let attempts = self.config.create_attempts.max(1);
        let step = Duration::from_millis(self.config.retry_step_ms);

        let mut attempt = 1;
        loop {
            match scene.create_input(scene_name, name, input_kind).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_invalid_request_kind() => {
                    warn!(
                        "OBS rejected input kind '{}' for {} ({}); this OBS build is incompatible, not retrying",
                        input_kind,
                        kind.as_str(),
                        e
                    );
                    return Err(CreateFailure::Incompatible(e));
                }
                Err(e) if e.code() == Some(status_code::RESOURCE_ALREADY_EXISTS) => {
                    warn!(
                        "An input named '{}' already exists outside scene '{}'; add it to the scene or rename it in the config",
                        name, scene_name
                    );
                    return Err(CreateFailure::Failed(e));
                }
                Err(e) if attempt >= attempts => {
                    warn!("Giving up creating {} after {} attempts: {}", kind.as_str(), attempt, e);
                    return Err(CreateFailure::Failed(e));
                }
                Err(e) => {
                    let delay = step * attempt;
                    warn!(
                        "Creating {} failed (attempt {}/{}): {}; retrying in {}ms",
                        kind.as_str(),
                        attempt,
                        attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn configured_name(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::Audio => &self.config.audio_input_name,
            SourceKind::Display => &self.config.display_capture_name,
        }
    }

    fn input_kind(&self, kind: SourceKind) -> &'static str {
        match kind {
            SourceKind::Audio => self.kinds.audio,
            SourceKind::Display => self.kinds.display,
        }
    }

    /// Match by configured name first, then by platform input kind.
    fn find<'a>(&self, items: &'a [SceneItem], kind: SourceKind) -> Option<&'a SceneItem> {
        let name = self.configured_name(kind);
        let input_kind = self.input_kind(kind);
        items
            .iter()
            .find(|item| item.source_name == name)
            .or_else(|| {
                items
                    .iter()
                    .find(|item| item.input_kind.as_deref() == Some(input_kind))
            })
    }
}
