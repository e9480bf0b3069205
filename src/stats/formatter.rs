//! Stats formatting for different output formats

use super::InvocationStats;
use crate::config::{ResponseMode, StatsFormat};

/// Format stats according to the configured format
pub fn format_stats(stats: &InvocationStats, format: StatsFormat) -> String {
    match format {
        StatsFormat::Pretty => format_pretty(stats),
        StatsFormat::Json => format_json(stats),
        StatsFormat::Compact => format_compact(stats),
    }
}

fn mode_str(mode: ResponseMode) -> &'static str {
    match mode {
        ResponseMode::Text => "text",
        ResponseMode::Raw => "raw",
    }
}

/// Pretty box format for terminal output
fn format_pretty(s: &InvocationStats) -> String {
    format!(
        r#"┌──────────────────────────────────────────────────────────────────┐
│ Prompt Relay                                                     │
├──────────────────────────────────────────────────────────────────┤
│ Route: {:56}│
│ Model: {:56}│
│ Time:  {:56}│
├──────────────────────────────────────────────────────────────────┤
│ Outcome: {:18} Status: {:3}  Attempts: {:3}         │
│ Prompt: {:8} chars  Output: {:8} chars  Mode: {:5}  │
│ Duration: {:54.1}ms│
└──────────────────────────────────────────────────────────────────┘
"#,
        truncate(&s.route, 56),
        truncate(&s.model, 56),
        s.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        s.outcome.as_str(),
        s.status,
        s.attempts,
        s.prompt_len,
        s.output_len,
        mode_str(s.mode),
        s.duration_ms,
    )
}

/// JSON format for structured logging
fn format_json(s: &InvocationStats) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "{}".to_string())
}

/// Compact single-line format
fn format_compact(s: &InvocationStats) -> String {
    format!(
        "[{}] route={} model={} {} outcome={} status={} attempts={} prompt={} output={} dur={:.1}ms",
        s.timestamp.format("%H:%M:%S"),
        s.route,
        s.model,
        mode_str(s.mode),
        s.outcome.as_str(),
        s.status,
        s.attempts,
        s.prompt_len,
        s.output_len,
        s.duration_ms
    )
}

/// Truncate a string to max characters with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
