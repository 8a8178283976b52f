mod common;

use std::sync::Arc;

use common::{MockDriver, expect_err, run, unwrap_outcome, users};
use sqlmapper_core::{Error, QueryErrorKind, Row, ScanFn, Value};
use sqlmapper_session::{
    Connection, DefaultTransaction, DirectConnection, Statement, TransactionConnection,
};

#[test]
fn query_drains_rows_into_sink() {
    let driver = MockDriver::with_rows(users(&["ann", "bob", "cy"]));
    let conn = DirectConnection::new(&driver);

    let names = run(|cx| async move {
        let mut names = Vec::new();
        let mut sink = ScanFn(|row: &Row| -> sqlmapper_core::Result<()> {
            names.push(row.get_named::<String>("name")?);
            Ok(())
        });
        unwrap_outcome(
            conn.query(&cx, &mut sink, "SELECT * FROM users WHERE id > ?", &[Value::Int(0)])
                .await,
        );
        drop(sink);
        names
    });

    assert_eq!(names, vec!["ann", "bob", "cy"]);
    let state = driver.state();
    assert_eq!(state.cursors_opened, 1);
    assert_eq!(state.open_cursors(), 0);
    assert_eq!(state.params, vec![vec![Value::Int(0)]]);
}

#[test]
fn scan_failure_still_closes_cursor() {
    let driver = Arc::new(MockDriver::with_rows(users(&["ann", "bob"])));
    let mut tx = DefaultTransaction::new(Arc::clone(&driver));

    run(|cx| async move {
        let mut failing = ScanFn(|_: &Row| -> sqlmapper_core::Result<()> {
            Err(Error::Custom("cannot scan".into()))
        });

        let err = expect_err(tx.connection().query(&cx, &mut failing, "SELECT 1", &[]).await);
        assert!(matches!(err, Error::Custom(ref msg) if msg == "cannot scan"));

        unwrap_outcome(tx.begin(&cx).await);
        let err = expect_err(tx.connection().query(&cx, &mut failing, "SELECT 2", &[]).await);
        assert!(matches!(err, Error::Custom(_)));

        {
            let conn = tx.connection();
            let stmt = unwrap_outcome(conn.prepare(&cx, "SELECT 3").await);
            let err = expect_err(stmt.query(&cx, &mut failing, &[]).await);
            assert!(matches!(err, Error::Custom(_)));
        }
        unwrap_outcome(tx.rollback(&cx).await);
    });

    let state = driver.state();
    assert_eq!(state.cursors_opened, 3);
    assert_eq!(state.open_cursors(), 0);
}

#[test]
fn query_failure_is_statement_query_error() {
    let driver = MockDriver::new();
    driver.state().fail_query = true;
    let conn = DirectConnection::new(&driver);

    run(|cx| async move {
        let mut rows: Vec<Row> = Vec::new();
        let err = expect_err(conn.query(&cx, &mut rows, "SELECT broken", &[]).await);
        assert_eq!(err.query_kind(), Some(QueryErrorKind::Statement));
        assert_eq!(err.sql(), Some("SELECT broken"));
        assert_eq!(err.sqlstate(), Some("XX000"));
        assert!(err.to_string().contains("statement query error"));
    });
}

#[test]
fn exec_failure_passes_through() {
    let driver = MockDriver::new();
    driver.state().fail_exec = true;

    run(|cx| async move {
        let direct = DirectConnection::new(&driver);
        let err = expect_err(direct.exec(&cx, "DELETE FROM t", &[]).await);
        assert_eq!(err.query_kind(), Some(QueryErrorKind::Database));
        assert!(err.to_string().contains("exec failed"));
    });
}

#[test]
fn direct_statement_close_releases_driver_statement() {
    let driver = MockDriver::new();
    let conn = DirectConnection::new(&driver);

    run(|cx| async move {
        let stmt = unwrap_outcome(conn.prepare(&cx, "INSERT INTO t (a) VALUES (?)").await);
        assert_eq!(stmt.sql(), "INSERT INTO t (a) VALUES (?)");
        let first = unwrap_outcome(stmt.exec(&cx, &[Value::Int(1)]).await);
        let second = unwrap_outcome(stmt.exec(&cx, &[Value::Int(2)]).await);
        assert_eq!(first.rows_affected, 1);
        assert_eq!(second.rows_affected, 1);
        stmt.close().unwrap();
    });

    let state = driver.state();
    assert_eq!(state.statements_prepared, 1);
    assert_eq!(state.statements_closed, 1);
    assert_eq!(
        state.log,
        vec![
            "stmt: INSERT INTO t (a) VALUES (?)".to_string(),
            "stmt: INSERT INTO t (a) VALUES (?)".to_string(),
        ]
    );
}

#[test]
fn transaction_statement_close_is_noop() {
    let driver = Arc::new(MockDriver::with_rows(users(&["ann"])));
    let mut tx = DefaultTransaction::new(Arc::clone(&driver));

    run(|cx| async move {
        unwrap_outcome(tx.begin(&cx).await);
        {
            let conn = tx.connection();
            let stmt = unwrap_outcome(conn.prepare(&cx, "SELECT * FROM users").await);
            assert!(stmt.is_transactional());
            let mut rows: Vec<Row> = Vec::new();
            unwrap_outcome(stmt.query(&cx, &mut rows, &[]).await);
            assert_eq!(rows.len(), 1);
            stmt.close().unwrap();
        }
        unwrap_outcome(tx.commit(&cx).await);
    });

    let state = driver.state();
    assert_eq!(state.statements_prepared, 0);
    assert_eq!(state.statements_closed, 0);
    assert_eq!(state.log, vec!["tx: SELECT * FROM users".to_string()]);
}

#[test]
fn transaction_connection_runs_on_the_transaction() {
    let driver = MockDriver::new();

    run(|cx| async move {
        let open = unwrap_outcome(sqlmapper_core::Driver::begin(&driver, &cx).await);
        let conn = TransactionConnection::new(&open);
        let result = unwrap_outcome(
            conn.exec(&cx, "UPDATE t SET a = ? WHERE b = ?", &[Value::Int(1), Value::Int(2)])
                .await,
        );
        assert_eq!(result.rows_affected, 2);
        unwrap_outcome(sqlmapper_core::DriverTransaction::commit(open, &cx).await);

        let state = driver.state();
        assert_eq!(state.log, vec!["tx: UPDATE t SET a = ? WHERE b = ?".to_string()]);
        assert_eq!(state.committed, 1);
    });
}
