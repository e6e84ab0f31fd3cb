//! CLI handlers that talk to a running daemon over the control API.

use anyhow::{bail, Context, Result};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::api::CommandAccepted;
use crate::global;
use crate::recorder::{DaemonCommand, StatusSnapshot};

pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(port: u16) -> Self {
        Self {
            base_url: global::api_base_url(port),
            http: reqwest::Client::new(),
        }
    }

    pub async fn send_command(&self, command: DaemonCommand) -> Result<CommandAccepted> {
        let response = self
            .http
            .post(format!("{}/command", self.base_url))
            .json(&json!({ "command": command.as_str() }))
            .send()
            .await
            .context("Failed to connect to meetrec daemon. Is it running?")?;
        read_json(response, "send command").await
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let response = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .context("Failed to connect to meetrec daemon. Is it running?")?;
        read_json(response, "read status").await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        bail!(
            "Failed to {}: {}",
            action,
            body.get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error"))
        );
    }
    response
        .json()
        .await
        .with_context(|| format!("Unexpected response while trying to {}", action))
}

pub async fn handle_daemon_command(port: u16, command: DaemonCommand) -> Result<()> {
    let accepted = DaemonClient::new(port).send_command(command).await?;
    match accepted.replaced {
        Some(previous) => println!(
            "Queued '{}' (replaced pending '{}')",
            accepted.accepted, previous
        ),
        None => println!("Queued '{}'", accepted.accepted),
    }
    Ok(())
}

pub async fn handle_status_command(port: u16, raw_json: bool) -> Result<()> {
    let snapshot = DaemonClient::new(port).status().await?;
    if raw_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", format_status(&snapshot));
    }
    Ok(())
}

pub fn format_status(snapshot: &StatusSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("Mode:       {}\n", snapshot.mode.as_str()));
    out.push_str(&format!(
        "Recording:  {}\n",
        snapshot.recording_state.as_str()
    ));
    if let Some(session) = &snapshot.session {
        let duration = session.duration_seconds();
        out.push_str(&format!(
            "Session:    {} ({}, {}) {:02}:{:02}\n",
            session.id,
            session.origin.as_str(),
            session.app,
            duration / 60,
            duration % 60
        ));
    }
    out.push_str(&format!(
        "Detection:  {} ({}, {})\n",
        snapshot.detection_state,
        snapshot.detected_app,
        snapshot.confidence.as_str()
    ));
    out.push_str(&format!(
        "Streaks:    start {} / stop {}\n",
        snapshot.start_streak, snapshot.stop_streak
    ));
    out.push_str(&format!(
        "OBS:        {}\n",
        if snapshot.obs_connected { "connected" } else { "disconnected" }
    ));
    out.push_str(&format!("Sources:    {}\n", snapshot.sources_state.as_str()));
    if let Some(action) = &snapshot.last_action {
        out.push_str(&format!("Last action: {}\n", action));
    }
    if let Some(error) = &snapshot.last_error {
        out.push_str(&format!("Last error:  {}\n", error));
    }
    out
}
