//! Runner module for the script runner
//!
//! This module splits scripts into statements and executes them.

pub mod executor;
pub mod output;
pub mod parser;

// Re-export key types
pub use executor::ScriptExecutor;
pub use output::OutputSink;
pub use parser::{LineKind, ParseState};
