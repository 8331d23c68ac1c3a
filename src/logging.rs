//! Logging System
//!
//! Structured logging using the `tracing` crate. Provides configurable log
//! levels, output formats, and destinations. Reports go to stdout, so logs
//! default to stderr.

use crate::error::StatsError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Disable all log output when false
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format only, stdout/stderr only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogTarget {
    Stdout,
    Stderr,
    File,
}

/// Install the global subscriber.
///
/// `OBJSTAT_LOG`, `OBJSTAT_LOG_FORMAT`, `OBJSTAT_LOG_OUTPUT` and
/// `OBJSTAT_LOG_MODULES` win over `config`, which already carries any CLI
/// flags; missing values fall back to [`LoggingConfig::default`].
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), StatsError> {
    if config.map(|c| !c.enabled).unwrap_or(false) {
        return Ok(());
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let target = determine_target(config)?;

    // Colour only makes sense on a terminal stream.
    let (writer, ansi) = match target {
        LogTarget::Stdout => (
            BoxMakeWriter::new(std::io::stdout),
            config.map(|c| c.color).unwrap_or(true),
        ),
        LogTarget::Stderr => (
            BoxMakeWriter::new(std::io::stderr),
            config.map(|c| c.color).unwrap_or(true),
        ),
        LogTarget::File => (BoxMakeWriter::new(Mutex::new(open_log_file(config)?)), false),
    };

    let (json, text) = match format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            ),
            None,
        ),
        LogFormat::Text => (
            None,
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            ),
        ),
    };

    Registry::default()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| StatsError::ConfigError(format!("Failed to install log subscriber: {}", e)))
}

fn open_log_file(config: Option<&LoggingConfig>) -> Result<File, StatsError> {
    let path = config
        .and_then(|c| c.file.clone())
        .ok_or_else(|| StatsError::ConfigError("log output is 'file' but no log file is set".to_string()))?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            StatsError::ConfigError(format!("Cannot create log directory {}: {}", dir.display(), e))
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| StatsError::ConfigError(format!("Cannot open log file {}: {}", path.display(), e)))
}

fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, StatsError> {
    if let Ok(filter) = EnvFilter::try_from_env("OBJSTAT_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("warn");
    let mut filter = EnvFilter::new(level);
    if level == "off" {
        return Ok(filter);
    }

    let mut directives: Vec<String> = config
        .map(|c| {
            c.modules
                .iter()
                .map(|(module, level)| format!("{}={}", module, level))
                .collect()
        })
        .unwrap_or_default();
    if let Ok(extra) = std::env::var("OBJSTAT_LOG_MODULES") {
        directives.extend(
            extra
                .split(',')
                .filter_map(|pair| pair.split_once('='))
                .map(|(module, level)| format!("{}={}", module.trim(), level.trim())),
        );
    }

    for directive in directives {
        let parsed = directive.parse().map_err(|e| {
            StatsError::ConfigError(format!("Invalid log directive '{}': {}", directive, e))
        })?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

fn determine_format(config: Option<&LoggingConfig>) -> Result<LogFormat, StatsError> {
    if let Ok(format) = std::env::var("OBJSTAT_LOG_FORMAT") {
        if let Ok(parsed) = parse_format(&format) {
            return Ok(parsed);
        }
    }
    parse_format(config.map(|c| c.format.as_str()).unwrap_or("text"))
}

fn parse_format(format: &str) -> Result<LogFormat, StatsError> {
    match format {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(StatsError::ConfigError(format!(
            "Invalid log format: {} (expected 'text' or 'json')",
            other
        ))),
    }
}

fn determine_target(config: Option<&LoggingConfig>) -> Result<LogTarget, StatsError> {
    match std::env::var("OBJSTAT_LOG_OUTPUT") {
        Ok(output) => parse_target(&output),
        Err(_) => parse_target(config.map(|c| c.output.as_str()).unwrap_or("stderr")),
    }
}

fn parse_target(output: &str) -> Result<LogTarget, StatsError> {
    match output {
        "stdout" => Ok(LogTarget::Stdout),
        "stderr" => Ok(LogTarget::Stderr),
        "file" => Ok(LogTarget::File),
        other => Err(StatsError::ConfigError(format!(
            "Invalid log output: {} (expected 'stdout', 'stderr' or 'file')",
            other
        ))),
    }
}
