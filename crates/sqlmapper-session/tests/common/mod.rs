//! In-memory driver double that records what the session layer asks of it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use asupersync::runtime::RuntimeBuilder;
use asupersync::{CancelReason, Cx, Outcome};
use sqlmapper_core::{
    Driver, DriverStatement, DriverTransaction, Error, ExecResult, QueryError, QueryErrorKind,
    Result, Row, RowCursor, SqlExecutor, Value,
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

pub fn expect_cancelled<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> CancelReason {
    match outcome {
        Outcome::Cancelled(reason) => reason,
        other => panic!("expected cancellation, got {other:?}"),
    }
}

pub fn run<F: std::future::Future>(f: impl FnOnce(Cx) -> F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(f(cx))
}

#[derive(Debug, Default)]
pub struct MockState {
    /// Rows returned by every query
    pub rows: Vec<Row>,
    /// `origin: sql` for every query and exec, in call order
    pub log: Vec<String>,
    pub params: Vec<Vec<Value>>,
    pub cursors_opened: usize,
    pub cursors_closed: usize,
    pub statements_prepared: usize,
    pub statements_closed: usize,
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
    pub fail_query: bool,
    pub fail_exec: bool,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
}

impl MockState {
    pub fn open_cursors(&self) -> usize {
        self.cursors_opened - self.cursors_closed
    }

    pub fn open_transactions(&self) -> usize {
        self.begun - self.committed - self.rolled_back
    }
}

pub fn users(names: &[&str]) -> Vec<Row> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Row::new(
                vec!["id".into(), "name".into()],
                vec![Value::BigInt(i as i64 + 1), Value::from(*name)],
            )
        })
        .collect()
}

fn driver_error(message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: None,
        sqlstate: Some("XX000".into()),
        message: message.to_string(),
        source: None,
    })
}

fn run_query(
    state: &Arc<Mutex<MockState>>,
    origin: &str,
    sql: &str,
    params: &[Value],
) -> Outcome<MockRows, Error> {
    let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
    s.log.push(format!("{origin}: {sql}"));
    s.params.push(params.to_vec());
    if s.fail_query {
        return Outcome::Err(driver_error("query failed"));
    }
    s.cursors_opened += 1;
    Outcome::Ok(MockRows {
        state: Arc::clone(state),
        rows: s.rows.iter().cloned().collect(),
        closed: false,
    })
}

fn run_exec(
    state: &Arc<Mutex<MockState>>,
    origin: &str,
    sql: &str,
    params: &[Value],
) -> Outcome<ExecResult, Error> {
    let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
    s.log.push(format!("{origin}: {sql}"));
    s.params.push(params.to_vec());
    if s.fail_exec {
        return Outcome::Err(driver_error("exec failed"));
    }
    Outcome::Ok(ExecResult::new(params.len() as u64))
}

#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    pub state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        let driver = Self::new();
        driver.state().rows = rows;
        driver
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SqlExecutor for MockDriver {
    type Rows = MockRows;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<MockRows, Error>> + Send {
        let outcome = run_query(&self.state, "db", sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        let outcome = run_exec(&self.state, "db", sql, params);
        async move { outcome }
    }
}

impl Driver for MockDriver {
    type Tx = MockTransaction;
    type Stmt = MockStatement;

    fn prepare(
        &self,
        _cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<MockStatement, Error>> + Send {
        self.state().statements_prepared += 1;
        let stmt = MockStatement {
            state: Arc::clone(&self.state),
            sql: sql.to_string(),
        };
        async move { Outcome::Ok(stmt) }
    }

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<MockTransaction, Error>> + Send {
        let outcome = {
            let mut s = self.state();
            if s.fail_begin {
                Outcome::Err(Error::Custom("begin refused".into()))
            } else {
                s.begun += 1;
                Outcome::Ok(MockTransaction {
                    state: Arc::clone(&self.state),
                })
            }
        };
        async move { outcome }
    }
}

#[derive(Debug)]
pub struct MockTransaction {
    state: Arc<Mutex<MockState>>,
}

impl SqlExecutor for MockTransaction {
    type Rows = MockRows;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<MockRows, Error>> + Send {
        let outcome = run_query(&self.state, "tx", sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        let outcome = run_exec(&self.state, "tx", sql, params);
        async move { outcome }
    }
}

impl DriverTransaction for MockTransaction {
    fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let outcome = if s.fail_commit {
            s.rolled_back += 1;
            Outcome::Err(Error::Custom("commit refused".into()))
        } else {
            s.committed += 1;
            Outcome::Ok(())
        };
        drop(s);
        async move { outcome }
    }

    fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        s.rolled_back += 1;
        let outcome = if s.fail_rollback {
            Outcome::Err(Error::Custom("rollback refused".into()))
        } else {
            Outcome::Ok(())
        };
        drop(s);
        async move { outcome }
    }
}

#[derive(Debug)]
pub struct MockStatement {
    state: Arc<Mutex<MockState>>,
    sql: String,
}

impl DriverStatement for MockStatement {
    type Rows = MockRows;

    fn query(
        &self,
        _cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<MockRows, Error>> + Send {
        let outcome = run_query(&self.state, "stmt", &self.sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        let outcome = run_exec(&self.state, "stmt", &self.sql, params);
        async move { outcome }
    }

    fn close(self) -> Result<()> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .statements_closed += 1;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockRows {
    state: Arc<Mutex<MockState>>,
    rows: VecDeque<Row>,
    closed: bool,
}

impl RowCursor for MockRows {
    fn next_row(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let row = self.rows.pop_front();
        async move { Outcome::Ok(row) }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .cursors_closed += 1;
        }
    }
}
