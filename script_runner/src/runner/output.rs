//! Output sinks
//!
//! The runner echoes processed lines, statements and result tables to a log
//! sink, and failure diagnostics to an error sink. Either may be disabled.

use std::fmt;
use std::io::{self, Write};

use crate::config::SinkTarget;

/// A writer the runner reports to, or nothing at all
pub struct OutputSink {
    writer: Option<Box<dyn Write + Send>>,
}

impl OutputSink {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Some(Box::new(writer)),
        }
    }

    pub fn from_target(target: SinkTarget) -> Self {
        match target {
            SinkTarget::Stdout => Self::stdout(),
            SinkTarget::Stderr => Self::stderr(),
            SinkTarget::None => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn print(&mut self, value: impl fmt::Display) {
        self.emit(format_args!("{}", value));
    }

    pub fn println(&mut self, value: impl fmt::Display) {
        self.emit(format_args!("{}\n", value));
    }

    // A sink that stops accepting output must not fail the script
    fn emit(&mut self, args: fmt::Arguments<'_>) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_fmt(args).and_then(|_| writer.flush()) {
                tracing::debug!(error = %e, "Output sink write failed");
            }
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
