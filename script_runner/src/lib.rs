//! script_runner: runs SQL scripts statement by statement
//!
//! A script is read line by line and split on a configurable delimiter,
//! which a `-- @DELIMITER <token>` comment can change mid-script. Each
//! statement is sent to a [`Connection`] as soon as it is complete, or the
//! whole script is sent at once in full-script mode. Echoed statements,
//! result tables and failures are written to pluggable output sinks.

pub mod config;
pub mod db;
pub mod error;
pub mod runner;
pub mod utils;


// Re-export main types for easier access
pub use config::{Config, ScriptConfig};
pub use db::{Connection, ResultSet, SqlxConnection, Statement};
pub use error::{Error, Result};
pub use runner::{OutputSink, ScriptExecutor};

/// Initialize logging and open a configured executor from a configuration file
pub fn init(config_path: &str) -> Result<ScriptExecutor<SqlxConnection>> {
    let config = config::load_from_file(config_path)?;
    utils::logging::init_logging(&config.logging)?;
    connect(&config)
}

/// Open the configured database and bind an executor to it
pub fn connect(config: &Config) -> Result<ScriptExecutor<SqlxConnection>> {
    let database = config
        .database
        .as_ref()
        .ok_or_else(|| Error::ConfigError("Missing [database] section".to_string()))?;

    let connection = SqlxConnection::connect(database)?;
    ScriptExecutor::from_config(connection, config)
}
