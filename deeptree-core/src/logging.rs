//! Tracing subscriber setup.
//!
//! A human-readable stderr layer filtered by verbosity (overridable through
//! `RUST_LOG`), plus an optional JSON layer written to a daily-rolling file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for a `-v` count.
pub fn filter_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// Returns the guard of the file writer when `log_dir` is set; dropping it
/// flushes and stops the background writer. Calling this twice is harmless,
/// the second install is ignored.
pub fn init_tracing(verbosity: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_for(verbosity)))
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let Some(dir) = log_dir else {
        let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(dir) {
        let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
        tracing::warn!(
            dir = %dir.display(),
            error = %e,
            "Log directory unavailable, file logging disabled"
        );
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(dir, "deeptree.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init();
    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for_verbosity() {
        assert_eq!(filter_for(0), "info");
        assert_eq!(filter_for(1), "debug");
        assert_eq!(filter_for(4), "trace");
    }

    #[test]
    fn test_init_with_log_dir_returns_guard() {
        let dir = tempfile::TempDir::new().unwrap();
        let guard = init_tracing(0, Some(dir.path()));
        assert!(guard.is_some());
        tracing::info!("logging initialised");
    }
}
