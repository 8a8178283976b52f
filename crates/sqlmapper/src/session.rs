//! Executing registered SQL by id.

use crate::registry::SqlRegistry;
use asupersync::{Cx, Outcome};
use sqlmapper_core::{
    Driver, Error, ExecResult, MapperError, MapperErrorKind, Params, ResultSink,
};
use sqlmapper_parse::{RenderedSql, SqlManager};
use sqlmapper_session::{Connection, DefaultTransaction, SessionConnection, TransactionState};
use std::fmt;
use std::sync::Arc;

/// A unit of work that runs registered SQL against one driver.
///
/// Each call finds the parser for an id, renders it with the given
/// parameters and runs the result on [`DefaultTransaction::connection`], so
/// statements issued between [`begin`](Self::begin) and
/// [`commit`](Self::commit) share the driver transaction.
///
/// ```ignore
/// let mut session = SqlSession::new(&registry, driver);
/// session.begin(&cx).await;
/// session.exec(&cx, "user.rename", &Params::new().with("id", 1).with("name", "ann")).await;
/// session.commit(&cx).await;
/// ```
pub struct SqlSession<'r, D: Driver> {
    registry: &'r SqlRegistry,
    transaction: DefaultTransaction<D>,
}

impl<'r, D: Driver> SqlSession<'r, D> {
    pub fn new(registry: &'r SqlRegistry, driver: Arc<D>) -> Self {
        Self {
            registry,
            transaction: DefaultTransaction::new(driver),
        }
    }

    pub fn registry(&self) -> &'r SqlRegistry {
        self.registry
    }

    pub fn transaction(&self) -> &DefaultTransaction<D> {
        &self.transaction
    }

    /// The connection statements currently run on.
    pub fn connection(&self) -> SessionConnection<'_, D> {
        self.transaction.connection()
    }

    pub fn state(&self) -> TransactionState {
        self.transaction.state()
    }

    /// Run dynamic SQL `id` and feed every row to `sink`.
    pub async fn select<S>(
        &self,
        cx: &Cx,
        id: &str,
        params: &Params,
        sink: &mut S,
    ) -> Outcome<(), Error>
    where
        S: ResultSink + Send + ?Sized,
    {
        let rendered = match render(self.registry.dynamic(), id, params) {
            Ok(rendered) => rendered,
            Err(e) => return Outcome::Err(e),
        };
        self.connection()
            .query(cx, sink, &rendered.sql, &rendered.params)
            .await
    }

    /// Execute dynamic SQL `id`.
    pub async fn exec(&self, cx: &Cx, id: &str, params: &Params) -> Outcome<ExecResult, Error> {
        let rendered = match render(self.registry.dynamic(), id, params) {
            Ok(rendered) => rendered,
            Err(e) => return Outcome::Err(e),
        };
        self.connection()
            .exec(cx, &rendered.sql, &rendered.params)
            .await
    }

    /// Run template `id` and feed every row to `sink`.
    pub async fn select_template<S>(
        &self,
        cx: &Cx,
        id: &str,
        params: &Params,
        sink: &mut S,
    ) -> Outcome<(), Error>
    where
        S: ResultSink + Send + ?Sized,
    {
        let rendered = match render(self.registry.template(), id, params) {
            Ok(rendered) => rendered,
            Err(e) => return Outcome::Err(e),
        };
        self.connection()
            .query(cx, sink, &rendered.sql, &rendered.params)
            .await
    }

    /// Execute template `id`.
    pub async fn exec_template(
        &self,
        cx: &Cx,
        id: &str,
        params: &Params,
    ) -> Outcome<ExecResult, Error> {
        let rendered = match render(self.registry.template(), id, params) {
            Ok(rendered) => rendered,
            Err(e) => return Outcome::Err(e),
        };
        self.connection()
            .exec(cx, &rendered.sql, &rendered.params)
            .await
    }

    pub async fn begin(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.transaction.begin(cx).await
    }

    pub async fn commit(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.transaction.commit(cx).await
    }

    pub async fn rollback(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.transaction.rollback(cx).await
    }

    /// Release the session without committing or rolling back.
    pub fn close(self) {
        self.transaction.close();
    }
}

impl<D: Driver> fmt::Debug for SqlSession<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlSession")
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

fn render(manager: &SqlManager, id: &str, params: &Params) -> Result<RenderedSql, Error> {
    let Some(parser) = manager.find_sql_parser(id) else {
        tracing::debug!(id, dialect = manager.factory().dialect(), "sql id not found");
        return Err(MapperError::new(MapperErrorKind::NotFound, "no sql registered under id")
            .with_sql_id(id)
            .into());
    };
    parser.render(params)
}
