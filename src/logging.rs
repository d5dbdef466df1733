//! Process-wide logger setup.
//!
//! `tracing` events from the health and healing modules are forwarded through
//! its `log` feature, so a single `log` backend covers the whole crate.

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::OpenOptions;

use crate::config::{LoggingConfig, log_level_filter};
use crate::error::{VigilError, VigilResult};

/// Install the global logger described by `config`.
///
/// Fails if the level is unknown, the log file cannot be opened, or a
/// logger was already installed.
pub fn init_logging(config: &LoggingConfig) -> VigilResult<()> {
    let level = log_level_filter(&config.level).ok_or_else(|| {
        VigilError::Configuration(format!("Unknown log level: {}", config.level))
    })?;

    let log_config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_time_format_rfc3339()
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if config.console_output {
        loggers.push(TermLogger::new(
            level,
            log_config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    if let Some(path) = &config.file_path {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        loggers.push(WriteLogger::new(level, log_config, file));
    }

    if loggers.is_empty() {
        return Ok(());
    }
    CombinedLogger::init(loggers)
        .map_err(|e| VigilError::Configuration(format!("Logger already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_level() {
        let config = LoggingConfig {
            level: "chatty".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(VigilError::Configuration(_))
        ));
    }

    #[test]
    fn test_file_logger_writes_and_second_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.log");
        let config = LoggingConfig {
            level: "debug".to_string(),
            console_output: false,
            file_path: Some(path.to_string_lossy().into_owned()),
        };

        init_logging(&config).unwrap();
        log::warn!("disk almost full");
        log::logger().flush();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("disk almost full"));
        assert!(init_logging(&config).is_err());
    }
}
