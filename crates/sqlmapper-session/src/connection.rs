//! The connection capability and its direct and transactional variants.

use crate::cursor;
use crate::statement::{DirectStatement, SessionStatement, Statement, TransactionStatement};
use asupersync::{Cx, Outcome};
use sqlmapper_core::{Driver, DriverTransaction, Error, ExecResult, ResultSink, SqlExecutor, Value};
use std::fmt;
use std::future::Future;

/// Prepare, query and exec, with or without a surrounding transaction.
///
/// Both variants share one error taxonomy: a failed query is reported as
/// [`QueryErrorKind::Statement`](sqlmapper_core::QueryErrorKind::Statement)
/// with the driver error as its source, a failed exec returns the driver
/// error unchanged.
pub trait Connection: Send + Sync {
    /// Statement type issued by [`prepare`](Connection::prepare).
    type Stmt<'s>: Statement
    where
        Self: 's;

    /// Prepare `sql` for repeated use.
    fn prepare<'s>(
        &'s self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<Self::Stmt<'s>, Error>> + Send;

    /// Run a query and feed every row to `sink`.
    ///
    /// The driver cursor is closed before this returns, also when `sink`
    /// fails.
    fn query<S: ResultSink + Send + ?Sized>(
        &self,
        cx: &Cx,
        sink: &mut S,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE, DDL).
    fn exec(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send;
}

/// A connection that talks to the driver directly.
#[derive(Debug)]
pub struct DirectConnection<'d, D> {
    driver: &'d D,
}

impl<'d, D: Driver> DirectConnection<'d, D> {
    pub fn new(driver: &'d D) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &'d D {
        self.driver
    }
}

impl<D: Driver> Connection for DirectConnection<'_, D> {
    type Stmt<'s>
        = DirectStatement<D::Stmt>
    where
        Self: 's;

    fn prepare<'s>(
        &'s self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<Self::Stmt<'s>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            match self.driver.prepare(cx, sql).await {
                Outcome::Ok(stmt) => {
                    tracing::debug!(sql, "prepared statement");
                    Outcome::Ok(DirectStatement::new(sql, stmt))
                }
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn query<S: ResultSink + Send + ?Sized>(
        &self,
        cx: &Cx,
        sink: &mut S,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        cursor::query_into(self.driver, cx, sink, sql, params)
    }

    fn exec(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        execute(self.driver, cx, sql, params)
    }
}

/// A connection scoped to an open transaction.
#[derive(Debug)]
pub struct TransactionConnection<'t, T> {
    tx: &'t T,
}

impl<'t, T: DriverTransaction> TransactionConnection<'t, T> {
    pub fn new(tx: &'t T) -> Self {
        Self { tx }
    }
}

impl<'t, T: DriverTransaction> Connection for TransactionConnection<'t, T> {
    type Stmt<'s>
        = TransactionStatement<'t, T>
    where
        Self: 's;

    fn prepare<'s>(
        &'s self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<Self::Stmt<'s>, Error>> + Send {
        let tx = self.tx;
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            Outcome::Ok(TransactionStatement::new(sql, tx))
        }
    }

    fn query<S: ResultSink + Send + ?Sized>(
        &self,
        cx: &Cx,
        sink: &mut S,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        cursor::query_into(self.tx, cx, sink, sql, params)
    }

    fn exec(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        execute(self.tx, cx, sql, params)
    }
}

/// The connection handed out by a
/// [`DefaultTransaction`](crate::DefaultTransaction): transactional while a
/// transaction is active, direct otherwise.
pub enum SessionConnection<'a, D: Driver> {
    Direct(DirectConnection<'a, D>),
    Transaction(TransactionConnection<'a, D::Tx>),
}

impl<D: Driver> SessionConnection<'_, D> {
    /// True when calls run inside the active transaction.
    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl<D: Driver> fmt::Debug for SessionConnection<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = if self.is_transactional() {
            "Transaction"
        } else {
            "Direct"
        };
        f.debug_tuple("SessionConnection").field(&variant).finish()
    }
}

impl<'a, D: Driver> Connection for SessionConnection<'a, D> {
    type Stmt<'s>
        = SessionStatement<'a, D>
    where
        Self: 's;

    fn prepare<'s>(
        &'s self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<Self::Stmt<'s>, Error>> + Send {
        async move {
            match self {
                Self::Direct(conn) => match conn.prepare(cx, sql).await {
                    Outcome::Ok(stmt) => Outcome::Ok(SessionStatement::Direct(stmt)),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                },
                Self::Transaction(conn) => match conn.prepare(cx, sql).await {
                    Outcome::Ok(stmt) => Outcome::Ok(SessionStatement::Transaction(stmt)),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                },
            }
        }
    }

    fn query<S: ResultSink + Send + ?Sized>(
        &self,
        cx: &Cx,
        sink: &mut S,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            match self {
                Self::Direct(conn) => conn.query(cx, sink, sql, params).await,
                Self::Transaction(conn) => conn.query(cx, sink, sql, params).await,
            }
        }
    }

    fn exec(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        async move {
            match self {
                Self::Direct(conn) => conn.exec(cx, sql, params).await,
                Self::Transaction(conn) => conn.exec(cx, sql, params).await,
            }
        }
    }
}

async fn execute<E: SqlExecutor + ?Sized>(
    executor: &E,
    cx: &Cx,
    sql: &str,
    params: &[Value],
) -> Outcome<ExecResult, Error> {
    if let Some(reason) = cx.cancel_reason() {
        return Outcome::Cancelled(reason);
    }
    let outcome = executor.execute(cx, sql, params).await;
    if let Outcome::Ok(result) = &outcome {
        tracing::trace!(sql, rows_affected = result.rows_affected, "exec complete");
    }
    outcome
}
