//! Prepared statements bound to one SQL string.

use crate::cursor;
use asupersync::{Cx, Outcome};
use sqlmapper_core::{
    Driver, DriverStatement, DriverTransaction, Error, ExecResult, ResultSink, Result, Value,
};
use std::fmt;
use std::future::Future;

/// A reusable handle for one SQL string.
///
/// Statements issued by a direct connection own a driver statement that is
/// released by [`close`](Statement::close). Statements issued inside a
/// transaction are released when the transaction ends, so their `close` does
/// nothing.
pub trait Statement: Send + Sync {
    /// The SQL this statement runs.
    fn sql(&self) -> &str;

    /// Run the statement and feed every row to `sink`.
    ///
    /// The driver cursor is closed before this returns, also when `sink`
    /// fails.
    fn query<S: ResultSink + Send + ?Sized>(
        &self,
        cx: &Cx,
        sink: &mut S,
        params: &[Value],
    ) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Execute the statement.
    fn exec(
        &self,
        cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send;

    /// Release the statement.
    fn close(self) -> Result<()>;
}

/// A statement prepared by the driver outside any transaction.
#[derive(Debug)]
pub struct DirectStatement<P> {
    sql: String,
    stmt: P,
}

impl<P: DriverStatement> DirectStatement<P> {
    pub fn new(sql: impl Into<String>, stmt: P) -> Self {
        Self {
            sql: sql.into(),
            stmt,
        }
    }
}

impl<P: DriverStatement> Statement for DirectStatement<P> {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn query<S: ResultSink + Send + ?Sized>(
        &self,
        cx: &Cx,
        sink: &mut S,
        params: &[Value],
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            let rows = match self.stmt.query(cx, params).await {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => return Outcome::Err(cursor::statement_query_error(&self.sql, e)),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            match cursor::drain(cx, &self.sql, rows, sink).await {
                Outcome::Ok(_) => Outcome::Ok(()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn exec(
        &self,
        cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            self.stmt.execute(cx, params).await
        }
    }

    fn close(self) -> Result<()> {
        tracing::debug!(sql = %self.sql, "closing prepared statement");
        self.stmt.close()
    }
}

/// A statement running inside an open transaction.
///
/// It runs its SQL through the transaction on every call; the transaction
/// owns all resources, so [`close`](Statement::close) is a no-op.
#[derive(Debug)]
pub struct TransactionStatement<'t, T> {
    sql: String,
    tx: &'t T,
}

impl<'t, T: DriverTransaction> TransactionStatement<'t, T> {
    pub fn new(sql: impl Into<String>, tx: &'t T) -> Self {
        Self {
            sql: sql.into(),
            tx,
        }
    }
}

impl<T: DriverTransaction> Statement for TransactionStatement<'_, T> {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn query<S: ResultSink + Send + ?Sized>(
        &self,
        cx: &Cx,
        sink: &mut S,
        params: &[Value],
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        cursor::query_into(self.tx, cx, sink, &self.sql, params)
    }

    fn exec(
        &self,
        cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            self.tx.execute(cx, &self.sql, params).await
        }
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

/// The statement issued by a [`SessionConnection`](crate::SessionConnection).
pub enum SessionStatement<'t, D: Driver> {
    Direct(DirectStatement<D::Stmt>),
    Transaction(TransactionStatement<'t, D::Tx>),
}

impl<D: Driver> SessionStatement<'_, D> {
    /// True when the statement runs inside a transaction.
    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl<D: Driver> fmt::Debug for SessionStatement<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStatement")
            .field("transactional", &self.is_transactional())
            .field("sql", &self.sql())
            .finish()
    }
}

impl<D: Driver> Statement for SessionStatement<'_, D> {
    fn sql(&self) -> &str {
        match self {
            Self::Direct(stmt) => stmt.sql(),
            Self::Transaction(stmt) => stmt.sql(),
        }
    }

    fn query<S: ResultSink + Send + ?Sized>(
        &self,
        cx: &Cx,
        sink: &mut S,
        params: &[Value],
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            match self {
                Self::Direct(stmt) => stmt.query(cx, sink, params).await,
                Self::Transaction(stmt) => stmt.query(cx, sink, params).await,
            }
        }
    }

    fn exec(
        &self,
        cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        async move {
            match self {
                Self::Direct(stmt) => stmt.exec(cx, params).await,
                Self::Transaction(stmt) => stmt.exec(cx, params).await,
            }
        }
    }

    fn close(self) -> Result<()> {
        match self {
            Self::Direct(stmt) => stmt.close(),
            Self::Transaction(stmt) => stmt.close(),
        }
    }
}

