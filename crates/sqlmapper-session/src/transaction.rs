//! Transaction lifecycle controller.

use crate::connection::{DirectConnection, SessionConnection, TransactionConnection};
use asupersync::{Cx, Outcome};
use sqlmapper_core::{Driver, DriverTransaction, Error, TransactionError, TransactionErrorKind};
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a [`DefaultTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

enum State<T> {
    NotStarted,
    Active(T),
    Committed,
    RolledBack,
}

impl<T> State<T> {
    fn public(&self) -> TransactionState {
        match self {
            Self::NotStarted => TransactionState::NotStarted,
            Self::Active(_) => TransactionState::Active,
            Self::Committed => TransactionState::Committed,
            Self::RolledBack => TransactionState::RolledBack,
        }
    }
}

/// Owns one unit of work against a driver.
///
/// ```text
/// NotStarted --begin--> Active --commit--> Committed
///                              --rollback--> RolledBack
/// ```
///
/// [`connection`](Self::connection) returns the transactional variant while a
/// transaction is active and the direct variant otherwise. A controller is
/// single-use: once committed or rolled back, further `begin`, `commit` and
/// `rollback` calls fail and connections fall back to the direct variant.
///
/// A failed driver commit or rollback consumes the driver transaction; the
/// controller then reports [`TransactionState::RolledBack`].
pub struct DefaultTransaction<D: Driver> {
    driver: Arc<D>,
    state: State<D::Tx>,
}

impl<D: Driver> DefaultTransaction<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self {
            driver,
            state: State::NotStarted,
        }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn state(&self) -> TransactionState {
        self.state.public()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// The connection for the current state.
    pub fn connection(&self) -> SessionConnection<'_, D> {
        match &self.state {
            State::Active(tx) => SessionConnection::Transaction(TransactionConnection::new(tx)),
            _ => SessionConnection::Direct(DirectConnection::new(self.driver.as_ref())),
        }
    }

    /// Open a driver transaction.
    ///
    /// Driver failures are returned unchanged.
    pub async fn begin(&mut self, cx: &Cx) -> Outcome<(), Error> {
        match self.state {
            State::NotStarted => {}
            State::Active(_) => {
                return Outcome::Err(transaction_error(
                    TransactionErrorKind::NestedNotSupported,
                    "transaction already active",
                ));
            }
            State::Committed | State::RolledBack => {
                return Outcome::Err(finished_error(self.state()));
            }
        }
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        match self.driver.begin(cx).await {
            Outcome::Ok(tx) => {
                tracing::debug!("transaction begun");
                self.state = State::Active(tx);
                Outcome::Ok(())
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Commit the active transaction.
    pub async fn commit(&mut self, cx: &Cx) -> Outcome<(), Error> {
        let tx = match self.take_active("commit") {
            Ok(tx) => tx,
            Err(e) => return Outcome::Err(e),
        };
        match tx.commit(cx).await {
            Outcome::Ok(()) => {
                tracing::debug!("transaction committed");
                self.state = State::Committed;
                Outcome::Ok(())
            }
            Outcome::Err(e) => {
                tracing::debug!(error = %e, "transaction commit failed");
                self.state = State::RolledBack;
                Outcome::Err(Error::Transaction(TransactionError {
                    kind: TransactionErrorKind::CommitFailed,
                    message: "transaction commit error".to_string(),
                    source: Some(Box::new(e)),
                }))
            }
            Outcome::Cancelled(r) => {
                self.state = State::RolledBack;
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                self.state = State::RolledBack;
                Outcome::Panicked(p)
            }
        }
    }

    /// Roll back the active transaction.
    pub async fn rollback(&mut self, cx: &Cx) -> Outcome<(), Error> {
        let tx = match self.take_active("rollback") {
            Ok(tx) => tx,
            Err(e) => return Outcome::Err(e),
        };
        self.state = State::RolledBack;
        match tx.rollback(cx).await {
            Outcome::Ok(()) => {
                tracing::debug!("transaction rolled back");
                Outcome::Ok(())
            }
            Outcome::Err(e) => {
                tracing::debug!(error = %e, "transaction rollback failed");
                Outcome::Err(Error::Transaction(TransactionError {
                    kind: TransactionErrorKind::RollbackFailed,
                    message: "transaction rollback error".to_string(),
                    source: Some(Box::new(e)),
                }))
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Release the controller without committing or rolling back.
    ///
    /// An active driver transaction is dropped; what happens to it is up to
    /// the driver.
    pub fn close(self) {
        if self.is_active() {
            tracing::warn!("closing transaction controller with an active transaction");
        }
    }

    fn take_active(&mut self, operation: &str) -> Result<D::Tx, Error> {
        match std::mem::replace(&mut self.state, State::NotStarted) {
            State::Active(tx) => Ok(tx),
            State::NotStarted => Err(transaction_error(
                TransactionErrorKind::WithoutBegin,
                format!("{operation}: transaction without begin"),
            )),
            finished => {
                let err = finished_error(finished.public());
                self.state = finished;
                Err(err)
            }
        }
    }
}

impl<D: Driver> fmt::Debug for DefaultTransaction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultTransaction")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn transaction_error(kind: TransactionErrorKind, message: impl Into<String>) -> Error {
    Error::Transaction(TransactionError {
        kind,
        message: message.into(),
        source: None,
    })
}

fn finished_error(state: TransactionState) -> Error {
    let kind = if state == TransactionState::Committed {
        TransactionErrorKind::AlreadyCommitted
    } else {
        TransactionErrorKind::AlreadyRolledBack
    };
    transaction_error(kind, format!("transaction already {state}"))
}
