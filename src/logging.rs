//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` wins over the configured level; an unparsable level falls back
//! to `info`.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::config::{LogFormat, LoggingSection};

pub fn make_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file on drop and must be held for the
/// life of the process. Installing twice is a no-op.
pub fn init_logging(config: &LoggingSection) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    layers.push(match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    });

    let mut guard = None;
    if let Some(ref path) = config.file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        let file_name = path
            .file_name()
            .with_context(|| format!("Invalid log file path: {}", path.display()))?;

        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(worker_guard);
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(make_filter(&config.level))
        .try_init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_filter_falls_back_on_garbage() {
        // Should never panic, whatever the input.
        let _ = make_filter("not a = valid filter ===");
        let _ = make_filter("relboard=debug,tower_http=warn");
    }

    #[test]
    fn test_init_logging_with_file_returns_guard() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingSection {
            level: "debug".into(),
            format: LogFormat::Json,
            file: Some(dir.path().join("logs/relboard.log")),
        };
        let guard = init_logging(&config).unwrap();
        assert!(guard.is_some());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = LoggingSection::default();
        assert!(init_logging(&config).unwrap().is_none());
        assert!(init_logging(&config).unwrap().is_none());
    }
}
