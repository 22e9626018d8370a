//! Member entity.
//!
//! # Responsibility
//! - Define the person record persisted in the `members` table.
//! - Validate field constraints before any write or after any read.
//!
//! # Invariants
//! - `id` is assigned by the caller, never generated, and unique in a store.
//! - `id` is not reassigned once the member is managed by a session.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Caller-assigned member key.
pub type MemberId = String;

/// Upper bound shared by `id` and `username`, matching a `VARCHAR(255)` column.
pub const MAX_TEXT_CHARS: usize = 255;

/// Validation failure for member field constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberValidationError {
    EmptyId,
    IdTooLong { chars: usize },
    UsernameTooLong { chars: usize },
}

impl Display for MemberValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "member id cannot be empty"),
            Self::IdTooLong { chars } => {
                write!(f, "member id has {chars} chars; max is {MAX_TEXT_CHARS}")
            }
            Self::UsernameTooLong { chars } => {
                write!(f, "username has {chars} chars; max is {MAX_TEXT_CHARS}")
            }
        }
    }
}

impl Error for MemberValidationError {}

/// A person with an identifier, display name and age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub username: String,
    pub age: i32,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, username: impl Into<String>, age: i32) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            age,
        }
    }

    /// Checks field constraints.
    ///
    /// # Errors
    /// - `EmptyId` when `id` is empty or whitespace-only.
    /// - `IdTooLong`/`UsernameTooLong` above `MAX_TEXT_CHARS`.
    pub fn validate(&self) -> Result<(), MemberValidationError> {
        if self.id.trim().is_empty() {
            return Err(MemberValidationError::EmptyId);
        }
        let id_chars = self.id.chars().count();
        if id_chars > MAX_TEXT_CHARS {
            return Err(MemberValidationError::IdTooLong { chars: id_chars });
        }
        let username_chars = self.username.chars().count();
        if username_chars > MAX_TEXT_CHARS {
            return Err(MemberValidationError::UsernameTooLong {
                chars: username_chars,
            });
        }
        Ok(())
    }
}
