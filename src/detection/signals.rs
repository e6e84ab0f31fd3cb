//! Raw per-probe booleans, namespaced by application.

use serde::Serialize;
use std::collections::BTreeMap;

use super::types::MeetingApp;

pub const PROBE_PROCESS: &str = "process";
pub const PROBE_HOST: &str = "host";
pub const PROBE_WINDOW: &str = "window";

/// One boolean per atomic probe, keyed `<app>.<probe>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RawSignalBundle {
    signals: BTreeMap<String, bool>,
}

impl RawSignalBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, app: MeetingApp, probe: &str, value: bool) {
        self.signals
            .insert(format!("{}.{}", app.as_str(), probe), value);
    }

    pub fn get(&self, app: MeetingApp, probe: &str) -> bool {
        self.signals
            .get(&format!("{}.{}", app.as_str(), probe))
            .copied()
            .unwrap_or(false)
    }

    /// Logical OR with another bundle. A positive signal is never lost.
    pub fn merge(&mut self, other: &RawSignalBundle) {
        for (key, value) in &other.signals {
            let entry = self.signals.entry(key.clone()).or_insert(false);
            *entry |= *value;
        }
    }

    pub fn any(&self) -> bool {
        self.signals.values().any(|v| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.signals.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
