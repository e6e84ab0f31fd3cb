//! OS-level process and window probing.
//!
//! One [`SystemSnapshot`] is captured per poll and shared by every detector,
//! so the process table is only walked once per cycle.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::Command;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;
use which::which;

/// Process names and window titles observed at one instant.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    /// Lowercased process names.
    pub processes: Vec<String>,
    pub window_titles: Vec<String>,
    pub taken_at: DateTime<Utc>,
}

impl SystemSnapshot {
    pub fn new(processes: Vec<String>, window_titles: Vec<String>, taken_at: DateTime<Utc>) -> Self {
        Self {
            processes: processes
                .into_iter()
                .map(|p| normalize_process_name(&p))
                .collect(),
            window_titles,
            taken_at,
        }
    }

    /// Whether any running process matches one of `names` (case-insensitive,
    /// `.exe` suffix ignored).
    pub fn has_process(&self, names: &[String]) -> bool {
        names.iter().any(|name| {
            let wanted = normalize_process_name(name);
            self.processes.iter().any(|p| *p == wanted)
        })
    }
}

fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

/// Source of process/window state.
pub trait SystemProbe: Send {
    fn snapshot(&mut self) -> Result<SystemSnapshot>;
}

#[derive(Debug, Clone)]
enum WindowLister {
    Wmctrl(PathBuf),
    AppleScript(PathBuf),
}

const APPLESCRIPT_WINDOW_NAMES: &str = "tell application \"System Events\" to get name of every window of (every process whose background only is false)";

/// Probe backed by `sysinfo` for processes and a platform window lister.
pub struct OsProbe {
    system: System,
    window_lister: Option<WindowLister>,
}

impl OsProbe {
    pub fn new() -> Self {
        let window_lister = detect_window_lister();
        match &window_lister {
            Some(lister) => debug!("Window titles read via {:?}", lister),
            None => debug!("No window lister available; window-title signals will stay false"),
        }

        Self {
            system: System::new(),
            window_lister,
        }
    }

    fn process_names(&mut self) -> Vec<String> {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::everything());

        let own_pid = std::process::id();
        self.system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .map(|(_, process)| process.name().to_string_lossy().into_owned())
            .collect()
    }

    fn window_titles(&self) -> Result<Vec<String>> {
        match &self.window_lister {
            Some(WindowLister::Wmctrl(path)) => {
                let output = Command::new(path)
                    .arg("-l")
                    .output()
                    .context("Failed to execute wmctrl")?;
                Ok(parse_wmctrl(&String::from_utf8_lossy(&output.stdout)))
            }
            Some(WindowLister::AppleScript(path)) => {
                let output = Command::new(path)
                    .arg("-e")
                    .arg(APPLESCRIPT_WINDOW_NAMES)
                    .output()
                    .context("Failed to execute osascript")?;
                Ok(parse_applescript_list(&String::from_utf8_lossy(
                    &output.stdout,
                )))
            }
            None => Ok(Vec::new()),
        }
    }
}

impl Default for OsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for OsProbe {
    fn snapshot(&mut self) -> Result<SystemSnapshot> {
        let processes = self.process_names();
        let window_titles = match self.window_titles() {
            Ok(titles) => titles,
            Err(e) => {
                debug!("Window listing failed: {:#}", e);
                Vec::new()
            }
        };

        Ok(SystemSnapshot::new(processes, window_titles, Utc::now()))
    }
}

fn detect_window_lister() -> Option<WindowLister> {
    if cfg!(target_os = "macos") {
        return which("osascript").ok().map(WindowLister::AppleScript);
    }
    which("wmctrl").ok().map(WindowLister::Wmctrl)
}

/// `wmctrl -l` prints `<id> <desktop> <host> <title...>` per window.
fn parse_wmctrl(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(fields[3..].join(" "))
        })
        .collect()
}

fn parse_applescript_list(output: &str) -> Vec<String> {
    output
        .split(", ")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "missing value")
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wmctrl() {
        let out = "0x03a00003  0 laptop Zoom Meeting\n0x04000001 -1 laptop Desktop\n0x05000002  0 laptop\n";
        let titles = parse_wmctrl(out);
        assert_eq!(titles, vec!["Zoom Meeting".to_string(), "Desktop".to_string()]);
    }

    #[test]
    fn test_parse_applescript_list() {
        let titles = parse_applescript_list("Meet - abc-defg-hij, missing value, Inbox\n");
        assert_eq!(titles, vec!["Meet - abc-defg-hij", "Inbox"]);
    }

    #[test]
    fn test_has_process_ignores_case_and_exe_suffix() {
        let snapshot = SystemSnapshot::new(
            vec!["Zoom.exe".to_string(), "bash".to_string()],
            Vec::new(),
            Utc::now(),
        );
        assert!(snapshot.has_process(&["zoom".to_string()]));
        assert!(snapshot.has_process(&["ZOOM.EXE".to_string()]));
        assert!(!snapshot.has_process(&["teams".to_string()]));
    }
}
