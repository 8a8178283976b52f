//! Recording driver for end-to-end tests of the facade.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use asupersync::runtime::RuntimeBuilder;
use sqlmapper::{
    Cx, Driver, DriverStatement, DriverTransaction, Error, ExecResult, Outcome, Result, Row,
    RowCursor, SqlExecutor, Value,
};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected error, got {other:?}"),
    }
}

pub fn run<F: std::future::Future>(f: impl FnOnce(Cx) -> F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(f(Cx::for_testing()))
}

/// One statement as the driver saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// `db` outside a transaction, `tx` inside one
    pub origin: &'static str,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub calls: Vec<Call>,
    pub rows: Vec<Row>,
    pub open_cursors: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingDriver {
    pub fn returning(rows: Vec<Row>) -> Self {
        let driver = Self::default();
        driver.recorded().rows = rows;
        driver
    }

    pub fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn record<'a>(
    inner: &'a Arc<Mutex<Recorded>>,
    origin: &'static str,
    sql: &str,
    params: &[Value],
) -> MutexGuard<'a, Recorded> {
    let mut recorded = inner.lock().unwrap_or_else(|e| e.into_inner());
    recorded.calls.push(Call {
        origin,
        sql: sql.to_string(),
        params: params.to_vec(),
    });
    recorded
}

fn open_cursor(
    inner: &Arc<Mutex<Recorded>>,
    origin: &'static str,
    sql: &str,
    params: &[Value],
) -> Cursor {
    let mut recorded = record(inner, origin, sql, params);
    recorded.open_cursors += 1;
    Cursor {
        inner: Arc::clone(inner),
        rows: recorded.rows.iter().cloned().collect(),
        open: true,
    }
}

impl SqlExecutor for RecordingDriver {
    type Rows = Cursor;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Cursor, Error>> + Send {
        let cursor = open_cursor(&self.inner, "db", sql, params);
        async move { Outcome::Ok(cursor) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        drop(record(&self.inner, "db", sql, params));
        async move { Outcome::Ok(ExecResult::new(1)) }
    }
}

impl Driver for RecordingDriver {
    type Tx = Tx;
    type Stmt = Stmt;

    fn prepare(&self, _cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Stmt, Error>> + Send {
        let stmt = Stmt {
            inner: Arc::clone(&self.inner),
            sql: sql.to_string(),
        };
        async move { Outcome::Ok(stmt) }
    }

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<Tx, Error>> + Send {
        let tx = Tx {
            inner: Arc::clone(&self.inner),
        };
        async move { Outcome::Ok(tx) }
    }
}

#[derive(Debug)]
pub struct Tx {
    inner: Arc<Mutex<Recorded>>,
}

impl SqlExecutor for Tx {
    type Rows = Cursor;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Cursor, Error>> + Send {
        let cursor = open_cursor(&self.inner, "tx", sql, params);
        async move { Outcome::Ok(cursor) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        drop(record(&self.inner, "tx", sql, params));
        async move { Outcome::Ok(ExecResult::new(1)) }
    }
}

impl DriverTransaction for Tx {
    fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).commits += 1;
        async move { Outcome::Ok(()) }
    }

    fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).rollbacks += 1;
        async move { Outcome::Ok(()) }
    }
}

#[derive(Debug)]
pub struct Stmt {
    inner: Arc<Mutex<Recorded>>,
    sql: String,
}

impl DriverStatement for Stmt {
    type Rows = Cursor;

    fn query(&self, _cx: &Cx, params: &[Value]) -> impl Future<Output = Outcome<Cursor, Error>> + Send {
        let cursor = open_cursor(&self.inner, "db", &self.sql, params);
        async move { Outcome::Ok(cursor) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        drop(record(&self.inner, "db", &self.sql, params));
        async move { Outcome::Ok(ExecResult::new(1)) }
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct Cursor {
    inner: Arc<Mutex<Recorded>>,
    rows: VecDeque<Row>,
    open: bool,
}

impl RowCursor for Cursor {
    fn next_row(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let row = self.rows.pop_front();
        async move { Outcome::Ok(row) }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).open_cursors -= 1;
        }
    }
}
