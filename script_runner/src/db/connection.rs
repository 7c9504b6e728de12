//! Connection capability
//!
//! The runner never talks to a driver directly. It only needs the narrow,
//! blocking surface described by [`Connection`] and [`Statement`], so any
//! driver (or a test double) can be plugged in.

use crate::error::Result;

/// A database connection the runner can drive
pub trait Connection {
    /// Whether every statement is committed as soon as it executes
    fn auto_commit(&mut self) -> Result<bool>;

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Create a statement bound to this connection
    fn create_statement(&mut self) -> Result<Box<dyn Statement + '_>>;

    /// Close the connection
    fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// A single statement created by a [`Connection`]
pub trait Statement {
    /// Toggle driver-side escape substitution before the SQL is sent
    fn set_escape_processing(&mut self, enable: bool) -> Result<()>;

    /// Execute `sql`, returning `true` when it produced rows
    fn execute(&mut self, sql: &str) -> Result<bool>;

    /// The first warning attached to the last execution, if any
    fn warnings(&mut self) -> Result<Option<String>>;

    /// Take the rows produced by the last execution
    fn result_set(&mut self) -> Result<Option<ResultSet>>;

    fn close(self: Box<Self>) -> Result<()>;
}

/// Lets a caller keep ownership of its connection while a runner borrows it
impl<C: Connection + ?Sized> Connection for &mut C {
    fn auto_commit(&mut self) -> Result<bool> {
        (**self).auto_commit()
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        (**self).set_auto_commit(auto_commit)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<()> {
        (**self).rollback()
    }

    fn create_statement(&mut self) -> Result<Box<dyn Statement + '_>> {
        (**self).create_statement()
    }
}

/// Rows returned by a statement, every value already rendered as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    /// `None` marks SQL NULL
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Option<String>>) {
        self.rows.push(row);
    }
}
