use crate::detection::{Confidence, MeetingApp};
use crate::global;
use anyhow::{bail, Context, Result};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub obs: ObsConfig,
    pub detection: DetectionConfig,
    pub sources: SourcesConfig,
    pub api: ApiConfig,
    pub rules: Vec<DetectionRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            obs: ObsConfig::default(),
            detection: DetectionConfig::default(),
            sources: SourcesConfig::default(),
            api: ApiConfig::default(),
            rules: DetectionRule::defaults(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    pub host: String,
    pub port: u16,
    /// obs-websocket server password. Leave unset when authentication is off.
    pub password: Option<String>,
    pub request_timeout_ms: u64,
    pub connect_timeout_seconds: u64,
    /// Oldest OBS Studio version known to work. Older versions only log a warning.
    pub min_obs_version: String,
    pub reconnect_initial_seconds: u64,
    pub reconnect_max_seconds: u64,
    /// Fractional jitter applied to each reconnect delay (0.10 = ±10%).
    pub reconnect_jitter: f64,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4455,
            password: None,
            request_timeout_ms: 6000,
            connect_timeout_seconds: 10,
            min_obs_version: "28.0.0".to_string(),
            reconnect_initial_seconds: 5,
            reconnect_max_seconds: 60,
            reconnect_jitter: 0.10,
        }
    }
}

impl std::fmt::Debug for ObsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("min_obs_version", &self.min_obs_version)
            .field("reconnect_initial_seconds", &self.reconnect_initial_seconds)
            .field("reconnect_max_seconds", &self.reconnect_max_seconds)
            .field("reconnect_jitter", &self.reconnect_jitter)
            .finish()
    }
}

impl ObsConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub poll_interval_seconds: u64,
    /// Consecutive positive polls required before recording starts.
    pub start_threshold: u32,
    /// Consecutive negative polls required before an automatic recording stops.
    pub stop_threshold: u32,
    /// Window after a manual start during which automated signals are discarded.
    pub manual_debounce_seconds: u64,
    /// Lowest per-application confidence that counts as a detected meeting.
    pub min_confidence: Confidence,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 2,
            start_threshold: 3,
            stop_threshold: 6,
            manual_debounce_seconds: 5,
            min_confidence: Confidence::Medium,
        }
    }
}

impl DetectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub audio_input_name: String,
    pub display_capture_name: String,
    pub create_attempts: u32,
    /// Linear retry step between creation attempts (1x, 2x, 3x ...).
    pub retry_step_ms: u64,
    pub recovery_interval_seconds: u64,
    pub recovery_window_seconds: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            audio_input_name: "Meeting Audio".to_string(),
            display_capture_name: "Meeting Display".to_string(),
            create_attempts: 3,
            retry_step_ms: 1000,
            recovery_interval_seconds: 10,
            recovery_window_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: global::DEFAULT_API_PORT,
        }
    }
}

/// Detection rule for one meeting application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRule {
    pub application: String,
    /// Main application process names.
    pub process_names: Vec<String>,
    /// Helper processes that only run while a call is active.
    pub host_process_names: Vec<String>,
    /// Case-insensitive regular expressions matched against window titles.
    pub window_hints: Vec<String>,
    pub enabled: bool,
}

impl Default for DetectionRule {
    fn default() -> Self {
        Self {
            application: String::new(),
            process_names: Vec::new(),
            host_process_names: Vec::new(),
            window_hints: Vec::new(),
            enabled: true,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl DetectionRule {
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                application: "zoom".to_string(),
                process_names: strings(&["zoom", "zoom.us", "zoom.exe"]),
                host_process_names: strings(&["cpthost", "caphost", "aomhost"]),
                window_hints: strings(&["^zoom meeting", "zoom webinar", "^meeting$"]),
                enabled: true,
            },
            Self {
                application: "teams".to_string(),
                process_names: strings(&["teams", "ms-teams", "microsoft teams"]),
                host_process_names: strings(&["msedgewebview2", "microsoft teams helper"]),
                window_hints: strings(&[r"meeting.*\| microsoft teams", r"^call with", r"\| call \|"]),
                enabled: true,
            },
            Self {
                application: "webex".to_string(),
                process_names: strings(&["webex", "ciscowebexstart", "webexmta"]),
                host_process_names: strings(&["atmgr", "webexhost"]),
                window_hints: strings(&["webex meeting", "personal room"]),
                enabled: true,
            },
            Self {
                application: "google_meet".to_string(),
                process_names: strings(&[
                    "chrome",
                    "google chrome",
                    "chromium",
                    "firefox",
                    "msedge",
                    "brave",
                ]),
                host_process_names: Vec::new(),
                window_hints: strings(&["^meet - ", r"meet\.google\.com"]),
                enabled: true,
            },
        ]
    }

    pub fn app(&self) -> Option<MeetingApp> {
        MeetingApp::from_name(&self.application)
    }
}

impl Config {
    /// Load `config_path`, writing the defaults there first if it is missing.
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        Self::load_from(config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.detection.poll_interval_seconds == 0 {
            bail!("detection.poll_interval_seconds must be at least 1");
        }
        if self.detection.start_threshold == 0 || self.detection.stop_threshold == 0 {
            bail!("detection.start_threshold and detection.stop_threshold must be at least 1");
        }
        if self.obs.request_timeout_ms == 0 {
            bail!("obs.request_timeout_ms must be greater than zero");
        }
        if !(0.0..1.0).contains(&self.obs.reconnect_jitter) {
            bail!("obs.reconnect_jitter must be in [0.0, 1.0)");
        }
        if self.obs.reconnect_initial_seconds == 0
            || self.obs.reconnect_max_seconds < self.obs.reconnect_initial_seconds
        {
            bail!("obs.reconnect_max_seconds must be >= obs.reconnect_initial_seconds > 0");
        }
        semver::Version::parse(&self.obs.min_obs_version).with_context(|| {
            format!(
                "obs.min_obs_version '{}' is not a valid version",
                self.obs.min_obs_version
            )
        })?;
        if self.sources.create_attempts == 0 {
            bail!("sources.create_attempts must be at least 1");
        }

        for rule in &self.rules {
            if rule.app().is_none() {
                bail!(
                    "Unknown application '{}' in rules. Supported: zoom, teams, webex, google_meet",
                    rule.application
                );
            }
            if rule.enabled && rule.process_names.is_empty() {
                bail!("Rule '{}' has no process_names", rule.application);
            }
            for hint in &rule.window_hints {
                RegexBuilder::new(hint)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| {
                        format!("Invalid window hint '{}' in rule '{}'", hint, rule.application)
                    })?;
            }
        }

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
