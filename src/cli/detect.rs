//! One-shot local detection, for checking rules without the daemon.

use anyhow::Result;
use serde_json::json;
use std::path::Path;

use super::load_config;
use crate::detection::{Aggregation, Aggregator, OsProbe, SystemProbe};

pub fn handle_detect_command(config_path: Option<&Path>, raw_json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let aggregator = Aggregator::from_rules(&config.rules, config.detection.min_confidence)?;
    let snapshot = OsProbe::new().snapshot()?;
    let aggregation = aggregator.evaluate(&snapshot);

    if raw_json {
        println!("{}", serde_json::to_string_pretty(&to_json(&aggregation))?);
    } else {
        print!("{}", format_aggregation(&aggregation));
    }
    Ok(())
}

fn to_json(aggregation: &Aggregation) -> serde_json::Value {
    json!({
        "result": aggregation.result,
        "detectors": aggregation
            .outputs
            .iter()
            .map(|output| &output.result)
            .collect::<Vec<_>>(),
        "failed": aggregation.failed,
        "signals": aggregation.signals,
    })
}

pub fn format_aggregation(aggregation: &Aggregation) -> String {
    let mut out = String::from("=== Detectors ===\n\n");
    for output in &aggregation.outputs {
        let result = &output.result;
        out.push_str(&format!(
            "{:<12} {:<7} {}",
            result.detected_app.as_str(),
            result.confidence.as_str(),
            if result.meeting_detected { "meeting" } else { "-" }
        ));
        if !result.window_title.is_empty() {
            out.push_str(&format!("  \"{}\"", result.window_title));
        }
        out.push('\n');
    }
    for app in &aggregation.failed {
        out.push_str(&format!("{:<12} failed\n", app.as_str()));
    }

    out.push_str("\n=== Signals ===\n\n");
    for (key, set) in aggregation.signals.iter() {
        out.push_str(&format!("{:<20} {}\n", key, set));
    }

    let result = &aggregation.result;
    out.push_str(&format!(
        "\nResult: {} ({}, {})\n",
        if result.meeting_detected { "meeting detected" } else { "no meeting" },
        result.detected_app,
        result.confidence.as_str()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionRule;
    use crate::detection::{Confidence, SystemSnapshot};
    use chrono::Utc;

    #[test]
    fn test_format_lists_detectors_and_result() {
        let aggregator =
            Aggregator::from_rules(&DetectionRule::defaults(), Confidence::Medium).unwrap();
        let snapshot = SystemSnapshot::new(
            vec!["zoom".to_string(), "CptHost".to_string()],
            vec!["Zoom Meeting".to_string()],
            Utc::now(),
        );
        let aggregation = aggregator.evaluate(&snapshot);
        let text = format_aggregation(&aggregation);

        assert!(text.contains("zoom"));
        assert!(text.contains("zoom.process"));
        assert!(text.contains("\"Zoom Meeting\""));
        assert!(text.contains("Result: meeting detected (zoom"));

        let value = to_json(&aggregation);
        assert_eq!(value["result"]["detected_app"], "zoom");
        assert_eq!(value["detectors"].as_array().unwrap().len(), aggregator.len());
    }
}
