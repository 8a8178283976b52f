//! Core types and traits for SQLMapper Rust.
//!
//! This crate provides the foundational abstractions shared by the parser,
//! registry and session crates:
//!
//! - `Value` and `Params` for bound parameters and guard evaluation
//! - `Row` for scanned results
//! - `Error` taxonomy for registration, rendering, execution and transactions
//! - Driver-facing traits (`Driver`, `DriverTransaction`, `DriverStatement`,
//!   `RowCursor`) and the `ResultSink` scanner
//! - `Outcome` and `Cx` re-exports from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod driver;
pub mod error;
pub mod params;
pub mod placeholder;
pub mod row;
pub mod value;

pub use driver::{
    Driver, DriverStatement, DriverTransaction, ExecResult, ResultSink, RowCursor, ScanFn,
    SqlExecutor,
};
pub use error::{
    Error, MapperError, MapperErrorKind, QueryError, QueryErrorKind, RenderError,
    RenderErrorKind, Result, SourceLocation, TransactionError, TransactionErrorKind,
};
pub use params::Params;
pub use placeholder::PlaceholderStyle;
pub use row::{Columns, FromValue, Row};
pub use value::Value;
