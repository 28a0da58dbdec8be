//! Logging system configuration and initialization
//!
//! - Console output with local timestamps
//! - Optional daily-rolling file output through a non-blocking writer
//! - Optional JSON format for the file layer
//! - `RUST_LOG` overrides the configured level and dependency caps

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the file writer alive for the whole process
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Targets that stay quiet unless TRACE is requested
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("reqwest", "info"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("h2", "warn"),
    ("tokio", "info"),
    ("chromiumoxide", "warn"),
    ("tungstenite", "warn"),
    ("html5ever", "warn"),
    ("selectors", "warn"),
];

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// `<data dir>/eps-harvest/logs`, else `./logs`
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .map(|dir| dir.join("eps-harvest").join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    })
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log level '{}'", config.level))?;
    if !config.level.to_lowercase().contains("trace") {
        for (target, level) in NOISY_TARGETS {
            filter = filter.add_directive(format!("{target}={level}").parse()?);
        }
    }
    Ok(filter)
}

/// Initializes the global subscriber; calling it twice is an error
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    let log_dir = get_log_directory(config);
    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let (writer, guard) = non_blocking(rolling::daily(&log_dir, &config.file_prefix));
        if LOG_GUARD.set(guard).is_err() {
            return Err(anyhow!("Logging already initialized"));
        }

        let file_layer = fmt::Layer::new()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_ansi(false);
        layers.push(if config.json_format {
            file_layer
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            file_layer.with_target(false).boxed()
        });
    }

    Registry::default()
        .with(layers)
        .with(build_filter(config)?)
        .try_init()
        .map_err(|e| anyhow!("Failed to install subscriber: {e}"))?;

    info!("Logging system initialized (level: {})", config.level);
    if config.file_output {
        info!("Log directory: {}", log_dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_log_dir_wins() {
        let config = LoggingConfig {
            log_dir: Some(PathBuf::from("/tmp/eps-logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(get_log_directory(&config), PathBuf::from("/tmp/eps-logs"));
    }

    #[test]
    fn default_log_dir_ends_with_logs() {
        let dir = get_log_directory(&LoggingConfig::default());
        assert!(dir.ends_with("logs"));
    }

    #[test]
    fn no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }
}
