//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define row-level data access contracts.
//! - Isolate SQLite query details from session bookkeeping.
//!
//! # Invariants
//! - Repository writes must enforce `Member::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod member_repo;
