//! SQLMapper Rust - named, dynamic SQL resolved and rendered at execution time.
//!
//! SQL lives outside the code that runs it. Statements are registered once
//! under an id, parsed into an immutable tree, and rendered per call into
//! SQL text plus ordered bind values:
//!
//! - Raw dynamic SQL with inline `<if>`, `<foreach>`, `<where>` and friends
//! - Mapper XML documents (`<mapper namespace="..">`)
//! - `{{ }}` templates and `{{define}}` documents
//!
//! Rendered SQL runs through a [`Connection`] that is either direct or bound
//! to an open transaction, as chosen by [`DefaultTransaction`].
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlmapper::prelude::*;
//!
//! let registry = SqlRegistry::new();
//! registry.register_mapper_file("mappers/user.xml")?;
//!
//! async fn rename(cx: &Cx, registry: &SqlRegistry, driver: Arc<MyDriver>) {
//!     let mut session = SqlSession::new(registry, driver);
//!     session.begin(cx).await;
//!     let params = Params::new().with("id", 7).with("name", "ann");
//!     session.exec(cx, "user.rename", &params).await;
//!
//!     let mut rows: Vec<Row> = Vec::new();
//!     session.select(cx, "user.find", &params, &mut rows).await;
//!     session.commit(cx).await;
//! }
//! ```

pub mod config;
pub mod registry;
pub mod session;

pub use config::RegistryConfig;
pub use registry::{SqlRegistry, SqlRegistryBuilder};
pub use session::SqlSession;

pub use sqlmapper_core::{
    Columns, Cx, Driver, DriverStatement, DriverTransaction, Error, ExecResult, FromValue,
    MapperError, MapperErrorKind, Outcome, Params, PlaceholderStyle, QueryError, QueryErrorKind,
    RenderError, RenderErrorKind, Result, ResultSink, Row, RowCursor, ScanFn, SqlExecutor,
    TransactionError, TransactionErrorKind, Value,
};

pub use sqlmapper_parse::{
    DynamicParserFactory, ParserFactory, RenderedSql, SqlManager, SqlParser, SqlUnit,
    TemplateParserFactory,
};

pub use sqlmapper_session::{
    Connection, DefaultTransaction, DirectConnection, DirectStatement, SessionConnection,
    SessionStatement, Statement, TransactionConnection, TransactionState, TransactionStatement,
};

/// Commonly used types.
///
/// ```ignore
/// use sqlmapper::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Connection, Cx, DefaultTransaction, Driver, Error, ExecResult, Outcome, Params, Result,
        ResultSink, Row, ScanFn, SqlRegistry, SqlSession, Statement, Value,
    };
    pub use std::sync::Arc;
}
