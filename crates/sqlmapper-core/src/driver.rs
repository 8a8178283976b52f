//! Driver-facing traits.
//!
//! SQLMapper does not talk to a database itself. A driver crate provides:
//!
//! - [`Driver`] - a database handle that can query, execute, prepare and begin
//! - [`DriverTransaction`] - an open transaction with the same query surface
//! - [`DriverStatement`] - a prepared statement owned by the driver
//! - [`RowCursor`] - a result cursor that must be closed after use
//!
//! and callers provide a [`ResultSink`] that receives scanned rows.
//!
//! All operations take a `Cx` context for cancellation and return
//! asupersync `Outcome`s.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// Result of an INSERT / UPDATE / DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    /// Number of rows affected by the statement
    pub rows_affected: u64,
    /// Last generated id, for drivers that report one
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    /// Create a result with only the affected row count.
    #[must_use]
    pub const fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            last_insert_id: None,
        }
    }

    /// Set the last inserted id.
    #[must_use]
    pub const fn with_last_insert_id(mut self, id: i64) -> Self {
        self.last_insert_id = Some(id);
        self
    }
}

/// An open result cursor.
///
/// Cursors hold driver resources until [`close`](RowCursor::close) is called.
/// `close` must be idempotent.
pub trait RowCursor: Send {
    /// Fetch the next row, or `None` when the cursor is exhausted.
    fn next_row(&mut self, cx: &Cx) -> impl Future<Output = Outcome<Option<Row>, crate::Error>> + Send;

    /// Release the cursor.
    fn close(&mut self);
}

/// The query surface shared by a driver handle and an open transaction.
pub trait SqlExecutor: Send + Sync {
    /// The cursor type returned by [`query`](SqlExecutor::query).
    type Rows: RowCursor;

    /// Run a query and return an open cursor over its rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Self::Rows, crate::Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE, DDL).
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, crate::Error>> + Send;
}

/// A database handle provided by a driver.
///
/// # Example
///
/// ```rust,ignore
/// let mut rows = driver.query(&cx, "SELECT * FROM users WHERE id = ?", &[Value::Int(1)]).await?;
/// while let Some(row) = rows.next_row(&cx).await? {
///     // ...
/// }
/// rows.close();
/// ```
pub trait Driver: SqlExecutor {
    /// The open-transaction type returned by [`begin`](Driver::begin).
    type Tx: DriverTransaction;

    /// The prepared statement type returned by [`prepare`](Driver::prepare).
    type Stmt: DriverStatement;

    /// Prepare a statement for repeated execution.
    fn prepare(
        &self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<Self::Stmt, crate::Error>> + Send;

    /// Open a transaction.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx, crate::Error>> + Send;
}

/// An open driver transaction.
///
/// Statements prepared inside a transaction live until it commits or
/// rolls back.
pub trait DriverTransaction: SqlExecutor {
    /// Commit the transaction.
    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Roll back the transaction.
    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;
}

/// A statement prepared by the driver outside any transaction.
pub trait DriverStatement: Send + Sync {
    /// The cursor type returned by [`query`](DriverStatement::query).
    type Rows: RowCursor;

    /// Run the prepared query.
    fn query(
        &self,
        cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Self::Rows, crate::Error>> + Send;

    /// Execute the prepared statement.
    fn execute(
        &self,
        cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, crate::Error>> + Send;

    /// Release the prepared statement.
    fn close(self) -> Result<()>;
}

/// Receives rows scanned from a query.
pub trait ResultSink {
    /// Consume one row. Returning an error stops the scan.
    fn scan_row(&mut self, row: &Row) -> Result<()>;
}

impl ResultSink for Vec<Row> {
    fn scan_row(&mut self, row: &Row) -> Result<()> {
        self.push(row.clone());
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn scan_row(&mut self, row: &Row) -> Result<()> {
        (**self).scan_row(row)
    }
}

/// Adapts a closure into a [`ResultSink`].
///
/// ```
/// use sqlmapper_core::{ResultSink, Result, Row, ScanFn, Value};
///
/// let mut names = Vec::new();
/// let mut sink = ScanFn(|row: &Row| -> Result<()> {
///     names.push(row.get_named::<String>("name")?);
///     Ok(())
/// });
/// sink.scan_row(&Row::new(vec!["name".into()], vec![Value::from("bob")])).unwrap();
/// drop(sink);
/// assert_eq!(names, vec!["bob".to_string()]);
/// ```
pub struct ScanFn<F>(pub F);

impl<F> ResultSink for ScanFn<F>
where
    F: FnMut(&Row) -> Result<()>,
{
    fn scan_row(&mut self, row: &Row) -> Result<()> {
        (self.0)(row)
    }
}
