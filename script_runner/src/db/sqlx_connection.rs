//! sqlx-backed connection
//!
//! This module adapts a single sqlx connection to the blocking
//! [`Connection`] capability. Async driver calls run on a current-thread
//! tokio runtime owned by the connection, so it must not be used from inside
//! another tokio runtime.

use futures::TryStreamExt;
use sqlx::{
    mysql::MySqlConnection, postgres::PgConnection, sqlite::SqliteConnection, Column,
    ColumnIndex, Connection as _, Database, Decode, Either, Executor, MySql, Postgres, Row as _,
    Sqlite, Type,
};
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::config::DatabaseConfig;
use crate::db::connection::{Connection, ResultSet, Statement};
use crate::error::{Error, Result};

/// Rendered in place of a value none of the known types could decode
const UNREADABLE_VALUE: &str = "<unreadable>";

/// Prefix of binary values, which are rendered as hex
const BINARY_PREFIX: &str = "0x";

/// Enumeration of supported database drivers
enum DriverConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

impl DriverConnection {
    async fn open(driver: &str, url: &str) -> Result<Self> {
        match driver {
            "postgres" => Ok(DriverConnection::Postgres(PgConnection::connect(url).await?)),
            "mysql" => Ok(DriverConnection::MySql(MySqlConnection::connect(url).await?)),
            "sqlite" => Ok(DriverConnection::Sqlite(SqliteConnection::connect(url).await?)),
            _ => Err(Error::DatabaseError(format!(
                "Unsupported database driver: {}",
                driver
            ))),
        }
    }

    fn driver_name(&self) -> &'static str {
        match self {
            DriverConnection::Postgres(_) => "postgres",
            DriverConnection::MySql(_) => "mysql",
            DriverConnection::Sqlite(_) => "sqlite",
        }
    }
}

/// A single database connection driven synchronously
///
/// sqlx has no auto-commit switch, so turning auto-commit off makes the
/// connection issue `BEGIN` before the next statement and leaves the
/// transaction open until [`Connection::commit`] or [`Connection::rollback`].
pub struct SqlxConnection {
    runtime: Runtime,
    connection: DriverConnection,
    auto_commit: bool,
    in_transaction: bool,
}

impl SqlxConnection {
    /// Open a connection from configuration
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let timeout_seconds = config.timeout_seconds.unwrap_or(30);

        let connection = runtime.block_on(async {
            tokio::time::timeout(
                Duration::from_secs(timeout_seconds),
                DriverConnection::open(&config.driver, &config.url),
            )
            .await
            .map_err(|_| {
                Error::DatabaseError(format!(
                    "Timed out after {}s connecting to {}",
                    timeout_seconds, config.driver
                ))
            })?
        })?;

        tracing::debug!(driver = connection.driver_name(), "Database connection opened");

        Ok(Self {
            runtime,
            connection,
            auto_commit: true,
            in_transaction: false,
        })
    }

    /// Whether a transaction opened by this connection is still pending
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn execute_sql(&mut self, sql: &str) -> Result<Option<ResultSet>> {
        if !self.auto_commit && !self.in_transaction {
            self.send("BEGIN")?;
            self.in_transaction = true;
        }
        self.fetch(sql, true)
    }

    /// Run transaction control, which never returns rows
    fn send(&mut self, sql: &str) -> Result<()> {
        self.fetch(sql, false).map(|_| ())
    }

    fn fetch(&mut self, sql: &str, describe_empty: bool) -> Result<Option<ResultSet>> {
        let runtime = &self.runtime;
        match &mut self.connection {
            DriverConnection::Postgres(conn) => {
                runtime.block_on(fetch_result::<Postgres>(conn, sql, describe_empty))
            }
            DriverConnection::MySql(conn) => {
                runtime.block_on(fetch_result::<MySql>(conn, sql, describe_empty))
            }
            DriverConnection::Sqlite(conn) => {
                runtime.block_on(fetch_result::<Sqlite>(conn, sql, describe_empty))
            }
        }
    }
}

impl Connection for SqlxConnection {
    fn auto_commit(&mut self) -> Result<bool> {
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        // switching auto-commit back on commits whatever is pending
        if auto_commit && self.in_transaction {
            self.commit()?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.send("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.send("ROLLBACK")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn create_statement(&mut self) -> Result<Box<dyn Statement + '_>> {
        Ok(Box::new(SqlxStatement {
            connection: self,
            escape_processing: true,
            result: None,
        }))
    }

    fn close(self) -> Result<()> {
        let SqlxConnection {
            runtime,
            connection,
            ..
        } = self;
        runtime.block_on(async move {
            match connection {
                DriverConnection::Postgres(conn) => conn.close().await,
                DriverConnection::MySql(conn) => conn.close().await,
                DriverConnection::Sqlite(conn) => conn.close().await,
            }
        })?;
        Ok(())
    }
}

/// Statement handle over a [`SqlxConnection`]
struct SqlxStatement<'c> {
    connection: &'c mut SqlxConnection,
    escape_processing: bool,
    result: Option<ResultSet>,
}

impl Statement for SqlxStatement<'_> {
    // sqlx sends SQL verbatim; the flag is only recorded
    fn set_escape_processing(&mut self, enable: bool) -> Result<()> {
        self.escape_processing = enable;
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<bool> {
        tracing::trace!(escape_processing = self.escape_processing, "Sending statement");
        self.result = self.connection.execute_sql(sql)?;
        Ok(self.result.is_some())
    }

    fn warnings(&mut self) -> Result<Option<String>> {
        Ok(None)
    }

    fn result_set(&mut self) -> Result<Option<ResultSet>> {
        Ok(self.result.take())
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Try each listed type in turn and render the first one that decodes,
/// falling back to the raw bytes
macro_rules! render_cell {
    ($row:expr, $index:expr; $($ty:ty),+ $(,)?) => {{
        let mut rendered: Option<Option<String>> = None;
        $(
            if rendered.is_none() {
                if let Ok(value) = $row.try_get::<Option<$ty>, _>($index) {
                    rendered = Some(value.map(|v| v.to_string()));
                }
            }
        )+
        if rendered.is_none() {
            if let Ok(value) = $row.try_get::<Option<Vec<u8>>, _>($index) {
                rendered = Some(value.map(|bytes| hex_string(&bytes)));
            }
        }
        rendered.unwrap_or_else(|| Some(UNREADABLE_VALUE.to_string()))
    }};
}

fn column_labels<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|column| column.name().to_string()).collect()
}

fn hex_string(bytes: &[u8]) -> String {
    let mut rendered = String::with_capacity(BINARY_PREFIX.len() + bytes.len() * 2);
    rendered.push_str(BINARY_PREFIX);
    for byte in bytes {
        rendered.push_str(&format!("{:02x}", byte));
    }
    rendered
}

/// Run `sql` and collect the rows of its first result set
///
/// A script may hold several statements. Only the rows of the first one that
/// returns any are kept; later result sets are drained and dropped. When a
/// single statement returns no row and `describe_empty` is set, it is
/// described so that an empty query still reports its column labels.
async fn fetch_result<DB>(
    conn: &mut DB::Connection,
    sql: &str,
    describe_empty: bool,
) -> Result<Option<ResultSet>>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    usize: ColumnIndex<DB::Row>,
    for<'r> String: Decode<'r, DB> + Type<DB>,
    for<'r> i64: Decode<'r, DB> + Type<DB>,
    for<'r> i32: Decode<'r, DB> + Type<DB>,
    for<'r> i16: Decode<'r, DB> + Type<DB>,
    for<'r> f64: Decode<'r, DB> + Type<DB>,
    for<'r> f32: Decode<'r, DB> + Type<DB>,
    for<'r> bool: Decode<'r, DB> + Type<DB>,
    for<'r> Vec<u8>: Decode<'r, DB> + Type<DB>,
{
    let mut result: Option<ResultSet> = None;
    let mut first_set_closed = false;
    let mut completed = 0usize;

    {
        let mut stream = (&mut *conn).fetch_many(sql);
        while let Some(step) = stream.try_next().await? {
            match step {
                // the statement behind the first rows has completed
                Either::Left(_) => {
                    completed += 1;
                    first_set_closed |= result.is_some();
                }
                Either::Right(_) if first_set_closed => {}
                Either::Right(row) => {
                    let set = result.get_or_insert_with(|| ResultSet::new(column_labels(row.columns())));
                    let labels = row.columns().iter().map(|column| column.name());
                    if !set.columns.iter().map(String::as_str).eq(labels) {
                        first_set_closed = true;
                        continue;
                    }

                    let values = (0..row.len())
                        .map(|index| render_cell!(row, index; String, i64, i32, i16, f64, f32, bool))
                        .collect();
                    set.push_row(values);
                }
            }
        }
    }

    // a failed prepare would abort an open postgres transaction, and a
    // multi-statement script cannot be prepared at all
    if result.is_none() && describe_empty && completed == 1 {
        match (&mut *conn).describe(sql).await {
            Ok(description) if !description.columns().is_empty() => {
                result = Some(ResultSet::new(column_labels(description.columns())));
            }
            Ok(_) => {}
            // not every statement can be prepared; it ran, so there is just no header
            Err(e) => tracing::trace!(error = %e, "Could not describe statement"),
        }
    }

    Ok(result)
}
