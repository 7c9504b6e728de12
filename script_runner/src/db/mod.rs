//! Database module for the script runner
//!
//! This module defines the connection capability the runner drives and a
//! sqlx-backed implementation of it.

pub mod connection;
pub mod sqlx_connection;

// Re-export key types
pub use connection::{Connection, ResultSet, Statement};
pub use sqlx_connection::SqlxConnection;
