//! Structured diagnostic entries.
//!
//! Entries are emitted through `tracing` under the `meetrec::diag` target so
//! they land wherever the subscriber sends the rest of the daemon's logs.
//! Payload fields that can carry secrets are always redacted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

pub const DIAG_TARGET: &str = "meetrec::diag";

const REDACTED: &str = "[redacted]";
const SECRET_KEYS: &[&str] = &[
    "password",
    "authentication",
    "secret",
    "token",
    "challenge",
    "salt",
];

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub event: String,
    pub session_id: Option<String>,
    pub payload: Value,
}

impl DiagnosticEntry {
    pub fn new(component: &str, event: &str, session_id: Option<&str>, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            component: component.to_string(),
            event: event.to_string(),
            session_id: session_id.map(String::from),
            payload: redact(&payload),
        }
    }
}

fn is_secret_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SECRET_KEYS.iter().any(|secret| lower.contains(secret))
}

/// Copy of `value` with every secret-bearing field replaced, at any depth.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    if is_secret_key(key) && !v.is_null() {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Emit one diagnostic entry.
pub fn emit(component: &str, event: &str, session_id: Option<&str>, payload: Value) {
    let entry = DiagnosticEntry::new(component, event, session_id, payload);
    let rendered = serde_json::to_string(&entry).unwrap_or_else(|_| entry.event.clone());
    info!(
        target: DIAG_TARGET,
        component = %entry.component,
        event = %entry.event,
        session_id = entry.session_id.as_deref().unwrap_or(""),
        "{}",
        rendered
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_nested_secrets() {
        let payload = json!({
            "op": 1,
            "d": {
                "rpcVersion": 1,
                "authentication": "abc123",
                "nested": [{"obsPassword": "pw", "name": "ok"}]
            }
        });
        let redacted = redact(&payload);
        assert_eq!(redacted["d"]["authentication"], REDACTED);
        assert_eq!(redacted["d"]["nested"][0]["obsPassword"], REDACTED);
        assert_eq!(redacted["d"]["nested"][0]["name"], "ok");
        assert_eq!(redacted["d"]["rpcVersion"], 1);
    }

    #[test]
    fn test_null_secret_stays_null() {
        let redacted = redact(&json!({"password": null}));
        assert!(redacted["password"].is_null());
    }

    #[test]
    fn test_entry_redacts_on_construction() {
        let entry = DiagnosticEntry::new(
            "obs",
            "identify_sent",
            Some("session-1"),
            json!({"authentication": {"challenge": "c", "salt": "s"}}),
        );
        assert_eq!(entry.payload["authentication"], REDACTED);
        assert_eq!(entry.session_id.as_deref(), Some("session-1"));
    }
}
