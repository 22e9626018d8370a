//! Transaction boundary state and errors.
//!
//! # Invariants
//! - Only `Active` may move to `Committed` or `RolledBack`.
//! - A finished transaction may begin again; an active one may not.

use super::session::SessionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lifecycle of the session's current unit-of-work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Failure of a demarcated unit-of-work.
///
/// `Session` means the boundary itself failed (begin/commit). `Aborted`
/// carries the caller's error after the transaction was rolled back.
#[derive(Debug)]
pub enum TransactionError<E> {
    Session(SessionError),
    Aborted { source: E },
}

impl<E> TransactionError<E> {
    /// Returns the caller error when the work itself failed.
    pub fn aborted(&self) -> Option<&E> {
        match self {
            Self::Aborted { source } => Some(source),
            Self::Session(_) => None,
        }
    }
}

impl<E> Display for TransactionError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(_) => write!(f, "transaction boundary failed"),
            Self::Aborted { .. } => write!(f, "transaction rolled back"),
        }
    }
}

impl<E: Error + 'static> Error for TransactionError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Aborted { source } => Some(source),
        }
    }
}
