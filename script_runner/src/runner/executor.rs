//! Script executor
//!
//! This module drives the read-parse-execute loop over a script and owns the
//! transaction handling around a run.

use std::io::BufRead;

use crate::config::{self, Config, ScriptConfig};
use crate::db::connection::{Connection, Statement};
use crate::error::{Error, Result};
use crate::runner::output::OutputSink;
use crate::runner::parser::{LineKind, ParseState, LINE_SEPARATOR};

/// What the run does after a statement failed
enum Disposition {
    /// Report the failure on the error sink and move on to the next statement
    Continue(Error),
    Abort(Error),
}

/// Executes SQL scripts against one connection
///
/// The executor holds its connection for its whole lifetime but never closes
/// it unless asked to through [`ScriptExecutor::close_connection`]. Pass
/// `&mut connection` to keep ownership on the caller's side.
pub struct ScriptExecutor<C: Connection> {
    connection: C,
    config: ScriptConfig,
    log: OutputSink,
    error_log: OutputSink,
}

impl<C: Connection> ScriptExecutor<C> {
    /// Create an executor with default settings, echoing to stdout and
    /// reporting failures on stderr
    pub fn new(connection: C) -> Self {
        Self::with_config(connection, ScriptConfig::default())
    }

    pub fn with_config(connection: C, config: ScriptConfig) -> Self {
        Self {
            connection,
            config,
            log: OutputSink::stdout(),
            error_log: OutputSink::stderr(),
        }
    }

    /// Create an executor from a loaded configuration, including its sinks
    pub fn from_config(connection: C, config: &Config) -> Result<Self> {
        config.script.validate()?;
        let output = config.output.clone().unwrap_or_default();

        Ok(Self {
            connection,
            config: config.script.clone(),
            log: OutputSink::from_target(output.log),
            error_log: OutputSink::from_target(output.error),
        })
    }

    pub fn set_stop_on_error(&mut self, stop_on_error: bool) {
        self.config.stop_on_error = stop_on_error;
    }

    pub fn set_throw_on_warning(&mut self, throw_on_warning: bool) {
        self.config.throw_on_warning = throw_on_warning;
    }

    pub fn set_auto_commit(&mut self, auto_commit: bool) {
        self.config.auto_commit = auto_commit;
    }

    pub fn set_full_script_mode(&mut self, full_script_mode: bool) {
        self.config.full_script_mode = full_script_mode;
    }

    pub fn set_remove_carriage_returns(&mut self, remove_carriage_returns: bool) {
        self.config.remove_carriage_returns = remove_carriage_returns;
    }

    pub fn set_escape_processing(&mut self, escape_processing: bool) {
        self.config.escape_processing = escape_processing;
    }

    pub fn set_delimiter(&mut self, delimiter: impl Into<String>) -> Result<()> {
        let delimiter = delimiter.into();
        config::validate_delimiter(&delimiter)?;
        self.config.delimiter = delimiter;
        Ok(())
    }

    pub fn set_full_line_delimiter(&mut self, full_line_delimiter: bool) {
        self.config.full_line_delimiter = full_line_delimiter;
    }

    pub fn set_log_sink(&mut self, sink: OutputSink) {
        self.log = sink;
    }

    pub fn set_error_sink(&mut self, sink: OutputSink) {
        self.error_log = sink;
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Give the connection back without closing it
    pub fn into_connection(self) -> C {
        self.connection
    }

    /// Close the underlying connection
    pub fn close_connection(self) {
        // nothing useful can be done with a connection that fails to close
        if let Err(e) = self.connection.close() {
            tracing::debug!(error = %e, "Ignoring failure while closing connection");
        }
    }

    /// Run a script read from `reader`
    ///
    /// The reader is consumed to exhaustion. A directive may change the
    /// delimiter for the rest of this run only; the configured delimiter is
    /// used again by the next run.
    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<()> {
        self.reconcile_auto_commit()?;

        let outcome = if self.config.full_script_mode {
            self.execute_full_script(reader)
        } else {
            self.execute_line_by_line(reader)
        };

        self.rollback_connection();
        outcome
    }

    fn reconcile_auto_commit(&mut self) -> Result<()> {
        let wanted = self.config.auto_commit;
        let reconcile = |connection: &mut C| -> Result<()> {
            if connection.auto_commit()? != wanted {
                connection.set_auto_commit(wanted)?;
            }
            Ok(())
        };

        reconcile(&mut self.connection).map_err(|e| Error::ConnectionConfiguration {
            auto_commit: wanted,
            source: Box::new(e),
        })
    }

    fn execute_full_script<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let mut script = String::new();

        if let Err(e) = self.send_full_script(reader, &mut script) {
            return Err(self.fatal(&script, e));
        }

        tracing::info!(bytes = script.len(), "Script executed as a single statement");
        Ok(())
    }

    fn send_full_script<R: BufRead>(&mut self, reader: R, script: &mut String) -> Result<()> {
        for line in reader.lines() {
            script.push_str(&line?);
            script.push_str(LINE_SEPARATOR);
        }
        self.log.println(&script);
        self.execute_statement(script)?;
        self.commit_connection()
    }

    fn execute_line_by_line<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let mut state = ParseState::new(self.config.delimiter.clone(), self.config.full_line_delimiter);

        let statements = match self.handle_lines(reader, &mut state) {
            Ok(statements) => statements,
            Err(e) => return Err(self.fatal(state.command(), e)),
        };

        if state.has_pending_command() {
            let err = Error::MalformedScript {
                delimiter: state.delimiter().to_string(),
                command: state.command().to_string(),
            };
            self.error_log.println(&err);
            return Err(err);
        }

        tracing::info!(statements, "Script executed");
        Ok(())
    }

    /// Feed every line through `state`, executing statements as they
    /// complete, then commit. Returns the number of statements dispatched.
    fn handle_lines<R: BufRead>(&mut self, reader: R, state: &mut ParseState) -> Result<usize> {
        let mut statements = 0;

        for line in reader.lines() {
            let line = line?;
            match state.feed(&line) {
                LineKind::Comment => self.log.println(line.trim()),
                LineKind::StatementEnd => {
                    self.log.println(state.command());
                    self.execute_statement(state.command())?;
                    state.clear();
                    statements += 1;
                }
                LineKind::Continuation | LineKind::Blank => {}
            }
        }

        self.commit_connection()?;
        Ok(statements)
    }

    /// Report a run-aborting failure and wrap it with the text being assembled
    fn fatal(&mut self, command: &str, cause: Error) -> Error {
        // a failed statement already names the text that `command` holds
        let cause = match cause {
            Error::StatementExecution { source, .. } => *source,
            other => other,
        };
        let err = Error::run_execution(command, cause);
        self.error_log.println(&err);
        err
    }

    fn execute_statement(&mut self, command: &str) -> Result<()> {
        let sql = if self.config.remove_carriage_returns {
            command.replace("\r\n", "\n")
        } else {
            command.to_string()
        };

        let Self {
            connection,
            config,
            log,
            error_log,
        } = self;

        let mut statement = connection.create_statement()?;
        let outcome = run_statement(statement.as_mut(), command, &sql, config, log, error_log);
        release(statement);
        outcome
    }

    fn commit_connection(&mut self) -> Result<()> {
        let commit = |connection: &mut C| -> Result<()> {
            if !connection.auto_commit()? {
                connection.commit()?;
            }
            Ok(())
        };

        commit(&mut self.connection).map_err(|e| Error::CommitError {
            source: Box::new(e),
        })
    }

    /// Leave no transaction half-open, whatever happened during the run
    fn rollback_connection(&mut self) {
        let rollback = |connection: &mut C| -> Result<()> {
            if !connection.auto_commit()? {
                connection.rollback()?;
            }
            Ok(())
        };

        // the connection may already be broken; the primary outcome wins
        if let Err(e) = rollback(&mut self.connection) {
            tracing::debug!(error = %e, "Ignoring failure while rolling back");
        }
    }
}

fn run_statement(
    statement: &mut (dyn Statement + '_),
    command: &str,
    sql: &str,
    config: &ScriptConfig,
    log: &mut OutputSink,
    error_log: &mut OutputSink,
) -> Result<()> {
    statement.set_escape_processing(config.escape_processing)?;

    let has_results = match submit(statement, sql, config) {
        Ok(has_results) => has_results,
        Err(cause) => match disposition(config.stop_on_error, command, cause) {
            Disposition::Continue(err) => {
                tracing::warn!(error = %err.root_cause(), "Statement failed, continuing");
                error_log.println(&err);
                false
            }
            Disposition::Abort(err) => return Err(err),
        },
    };

    if has_results {
        print_results(statement, log, error_log);
    }
    tracing::debug!(has_results, "Statement executed");
    Ok(())
}

fn disposition(stop_on_error: bool, statement: &str, cause: Error) -> Disposition {
    let err = Error::StatementExecution {
        statement: statement.to_string(),
        source: Box::new(cause),
    };
    if stop_on_error {
        Disposition::Abort(err)
    } else {
        Disposition::Continue(err)
    }
}

fn submit(statement: &mut (dyn Statement + '_), sql: &str, config: &ScriptConfig) -> Result<bool> {
    let has_results = statement.execute(sql)?;

    // Oracle reports compilation errors in CREATE PROCEDURE and friends as
    // warnings rather than failures
    if config.stop_on_error && config.throw_on_warning {
        if let Some(warning) = statement.warnings()? {
            return Err(Error::WarningEscalation(warning));
        }
    }

    Ok(has_results)
}

/// Print a result table: labels on one line, then one line per row, every
/// value followed by a tab
fn print_results(statement: &mut (dyn Statement + '_), log: &mut OutputSink, error_log: &mut OutputSink) {
    match statement.result_set() {
        Ok(Some(result_set)) => {
            for column in &result_set.columns {
                log.print(format_args!("{}\t", column));
            }
            log.println("");
            for row in &result_set.rows {
                for value in row {
                    log.print(format_args!("{}\t", value.as_deref().unwrap_or("NULL")));
                }
                log.println("");
            }
        }
        Ok(None) => {}
        Err(e) => error_log.println(format_args!("Error printing results: {}", e)),
    }
}

fn release(statement: Box<dyn Statement + '_>) {
    // some connection pools fail here on perfectly good statements
    if let Err(e) = statement.close() {
        tracing::debug!(error = %e, "Ignoring failure while closing statement");
    }
}
