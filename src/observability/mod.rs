use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::protocol::canonical::CompletionSummary;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let filter = EnvFilter::try_new(tracing_level(&level)).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_level(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// Log token usage and finish reason for a completed call.
pub fn log_completion(model: &str, summary: &CompletionSummary, duration: Duration) {
    let usage = summary.usage.unwrap_or_default();
    info!(
        model = model,
        prompt_tokens = usage.prompt_tokens.unwrap_or(0),
        completion_tokens = usage.completion_tokens.unwrap_or(0),
        total_tokens = usage.total_tokens.unwrap_or(0),
        finish_reason = summary.finish_reason.as_deref().unwrap_or(""),
        duration_seconds = duration.as_secs_f64(),
        "completion finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_aliases() {
        assert_eq!(tracing_level("WARNING"), "WARN");
        assert_eq!(tracing_level("CRITICAL"), "ERROR");
        assert_eq!(tracing_level("DEBUG"), "DEBUG");
    }
}
