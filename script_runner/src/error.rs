//! Error types for the script runner

use thiserror::Error;

/// Result type for script runner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the script runner
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The connection refused to switch its auto-commit mode before the run
    #[error("Could not set AutoCommit to {auto_commit}. Cause: {source}")]
    ConnectionConfiguration {
        auto_commit: bool,
        #[source]
        source: Box<Error>,
    },

    #[error("Could not commit transaction. Cause: {source}")]
    CommitError {
        #[source]
        source: Box<Error>,
    },

    /// A fatal failure while reading or executing a script; `command` holds
    /// whatever text had been assembled when it happened
    #[error("Error executing: {command}.  Cause: {source}")]
    RunExecution {
        command: String,
        #[source]
        source: Box<Error>,
    },

    /// A single statement was rejected by the database
    #[error("Error executing: {statement}.  Cause: {source}")]
    StatementExecution {
        statement: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Warning: {0}")]
    WarningEscalation(String),

    /// Incremental mode hit end of input with an unterminated statement
    #[error("Line missing end-of-line terminator ({delimiter}) => {command}")]
    MalformedScript { delimiter: String, command: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Wrap a failure raised somewhere inside a run together with the text
    /// that was being assembled at the time
    pub fn run_execution(command: impl Into<String>, source: Error) -> Self {
        Error::RunExecution {
            command: command.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error of a wrapped chain
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ConnectionConfiguration { source, .. }
            | Error::CommitError { source }
            | Error::RunExecution { source, .. }
            | Error::StatementExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Convert TOML deserialization errors to script runner errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
