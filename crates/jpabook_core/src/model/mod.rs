//! Entity model mapped by the persistence unit.
//!
//! # Responsibility
//! - Define the plain data records sessions track and repositories store.
//!
//! # Invariants
//! - Every entity is identified by a caller-assigned, non-empty key.

pub mod member;
