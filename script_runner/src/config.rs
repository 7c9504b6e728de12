//! Configuration handling for the script runner

use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::{Error, Result};

/// Delimiter used when none is configured
pub const DEFAULT_DELIMITER: &str = ";";

/// Load configuration from a TOML file
pub fn load_from_file(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    config.script.validate()?;

    Ok(config)
}

/// Represents the complete script runner configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub script: ScriptConfig,
    pub output: Option<OutputConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Database connection configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub driver: String,
    pub url: String,
    pub timeout_seconds: Option<u64>,
}

/// How a script is split and executed
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ScriptConfig {
    pub stop_on_error: bool,
    pub throw_on_warning: bool,
    pub auto_commit: bool,
    /// Send the whole script as one statement instead of splitting it
    pub full_script_mode: bool,
    pub remove_carriage_returns: bool,
    pub escape_processing: bool,
    pub delimiter: String,
    /// Only a line consisting of exactly the delimiter ends a statement
    pub full_line_delimiter: bool,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            throw_on_warning: false,
            auto_commit: false,
            full_script_mode: false,
            remove_carriage_returns: false,
            escape_processing: true,
            delimiter: DEFAULT_DELIMITER.to_string(),
            full_line_delimiter: false,
        }
    }
}

impl ScriptConfig {
    /// Reject delimiters that would match every line
    pub fn validate(&self) -> Result<()> {
        validate_delimiter(&self.delimiter)
    }
}

pub(crate) fn validate_delimiter(delimiter: &str) -> Result<()> {
    if delimiter.is_empty() {
        return Err(Error::ConfigError("Delimiter must not be empty".to_string()));
    }
    if delimiter.chars().any(char::is_whitespace) {
        return Err(Error::ConfigError(format!(
            "Delimiter must not contain whitespace: {:?}",
            delimiter
        )));
    }
    Ok(())
}

/// Where an output sink writes
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkTarget {
    Stdout,
    Stderr,
    None,
}

/// Output sink configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_log_target")]
    pub log: SinkTarget,
    #[serde(default = "default_error_target")]
    pub error: SinkTarget,
}

fn default_log_target() -> SinkTarget {
    SinkTarget::Stdout
}

fn default_error_target() -> SinkTarget {
    SinkTarget::Stderr
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log: default_log_target(),
            error: default_error_target(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: String,
    pub stdout: bool,
}
