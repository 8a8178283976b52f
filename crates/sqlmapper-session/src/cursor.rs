//! Draining driver cursors into result sinks.

use asupersync::{Cx, Outcome};
use sqlmapper_core::{Error, QueryError, QueryErrorKind, ResultSink, RowCursor, SqlExecutor, Value};

/// Closes the wrapped cursor when dropped, including when the owning future
/// is dropped mid-scan.
struct CursorGuard<R: RowCursor> {
    rows: R,
}

impl<R: RowCursor> Drop for CursorGuard<R> {
    fn drop(&mut self) {
        self.rows.close();
        tracing::trace!("closed result cursor");
    }
}

/// Wrap a driver failure on the query path.
pub(crate) fn statement_query_error(sql: &str, err: Error) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Statement,
        sql: Some(sql.to_string()),
        sqlstate: err.sqlstate().map(str::to_string),
        message: "statement query error".to_string(),
        source: Some(Box::new(err)),
    })
}

/// Feed every row of `rows` to `sink`, then close the cursor.
///
/// The cursor is closed on every exit path.
pub(crate) async fn drain<R, S>(cx: &Cx, sql: &str, rows: R, sink: &mut S) -> Outcome<u64, Error>
where
    R: RowCursor,
    S: ResultSink + Send + ?Sized,
{
    let mut guard = CursorGuard { rows };
    let mut scanned = 0_u64;
    loop {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let row = match guard.rows.next_row(cx).await {
            Outcome::Ok(Some(row)) => row,
            Outcome::Ok(None) => break,
            Outcome::Err(e) => return Outcome::Err(statement_query_error(sql, e)),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        if let Err(e) = sink.scan_row(&row) {
            tracing::debug!(sql, scanned, error = %e, "result scan failed");
            return Outcome::Err(e);
        }
        scanned += 1;
    }
    Outcome::Ok(scanned)
}

/// Run `sql` on `executor` and drain the rows into `sink`.
pub(crate) async fn query_into<E, S>(
    executor: &E,
    cx: &Cx,
    sink: &mut S,
    sql: &str,
    params: &[Value],
) -> Outcome<(), Error>
where
    E: SqlExecutor + ?Sized,
    S: ResultSink + Send + ?Sized,
{
    if let Some(reason) = cx.cancel_reason() {
        return Outcome::Cancelled(reason);
    }
    let rows = match executor.query(cx, sql, params).await {
        Outcome::Ok(rows) => rows,
        Outcome::Err(e) => return Outcome::Err(statement_query_error(sql, e)),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    match drain(cx, sql, rows, sink).await {
        Outcome::Ok(rows) => {
            tracing::trace!(sql, rows, "query complete");
            Outcome::Ok(())
        }
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}
