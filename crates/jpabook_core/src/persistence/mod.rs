//! Persistence unit, sessions and transaction boundaries.
//!
//! # Responsibility
//! - Own the lifecycle of the store behind one configured unit.
//! - Hand out sessions that track members until flush/commit.
//!
//! # Invariants
//! - A session never outlives the unit that opened it.
//! - All work runs on the calling thread; nothing here is `Sync`.

pub mod session;
pub mod transaction;
pub mod unit;

pub use session::{EntityState, FlushStats, Session, SessionError, SessionResult};
pub use transaction::{TransactionError, TransactionState};
pub use unit::{PersistenceUnit, UnitError, UnitResult};
