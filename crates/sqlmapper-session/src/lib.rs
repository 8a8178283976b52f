//! Connection, statement and transaction abstraction for SQLMapper Rust.
//!
//! `sqlmapper-session` is the **execution layer**. It gives statement code one
//! [`Connection`] surface whether or not a transaction is open:
//!
//! - [`DirectConnection`] / [`DirectStatement`] run on the driver handle.
//! - [`TransactionConnection`] / [`TransactionStatement`] run inside an open
//!   driver transaction; their statements are released by the transaction.
//! - [`SessionConnection`] / [`SessionStatement`] pick one of the two at run
//!   time, as handed out by [`DefaultTransaction::connection`].
//!
//! Queries always close their driver cursor before returning, and every call
//! checks the `Cx` for cancellation before entering the driver.

mod cursor;

pub mod connection;
pub mod statement;
pub mod transaction;

pub use connection::{Connection, DirectConnection, SessionConnection, TransactionConnection};
pub use statement::{DirectStatement, SessionStatement, Statement, TransactionStatement};
pub use transaction::{DefaultTransaction, TransactionState};
