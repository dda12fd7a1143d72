use colored::Colorize;
use serde::Serialize;

use super::OutputFormat;
use crate::gateway::{DeploymentReport, DeviceState, TestOutcome};

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize result: {}\"}}", e))
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn mark(ok: bool) -> String {
    if ok {
        "[OK]".green().to_string()
    } else {
        "[FAIL]".red().to_string()
    }
}

pub fn format_state(state: &DeviceState, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(state),
        OutputFormat::Text => {
            if state.is_empty() {
                return "No state available".to_string();
            }
            [
                format!("output_level: {}", show(state.output_level)),
                format!("engine_ready: {}", show(state.engine_ready)),
                format!("clock_beats:  {}", show(state.clock_beats)),
                format!("clock_tempo:  {}", show(state.clock_tempo)),
                format!("screen_dirty: {}", show(state.screen_dirty)),
                format!("midi_ports:   {}", show(state.midi_port_count)),
            ]
            .join("\n")
        }
    }
}

pub fn format_outcome(outcome: &TestOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(outcome),
        OutputFormat::Text => {
            let mut output = format!(
                "{} {}",
                mark(outcome.success && !outcome.error),
                outcome.test_identifier
            );
            if outcome.is_ambiguous() {
                output.push_str(&format!(" {}", "(both pass and fail markers)".yellow()));
            }
            if !outcome.raw_result.is_empty() {
                for line in outcome.raw_result.lines() {
                    output.push_str(&format!("\n  {}", line));
                }
            }
            output
        }
    }
}

pub fn format_report(report: &DeploymentReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Text => {
            let mut output = String::new();

            if let Some(detail) = &report.failure_detail {
                output.push_str(&format!("{} Deployment failed: {}\n", mark(false), detail));
            } else {
                output.push_str(&format!("{} Deployment complete\n", mark(true)));
            }

            if let Some(code) = report.sync_exit_code {
                if code != 0 {
                    output.push_str(&format!("  {} sync exited with {}\n", "[WARNING]".yellow(), code));
                }
            }

            for outcome in &report.outcomes {
                output.push_str(&format!(
                    "  {} {}\n",
                    mark(outcome.success && !outcome.error),
                    outcome.test_identifier
                ));
            }

            output.push_str(&format!(
                "all_passed: {} ({}ms)",
                report.all_passed, report.duration_ms
            ));
            output
        }
    }
}
