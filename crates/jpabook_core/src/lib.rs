//! Core persistence walkthrough for the `Member` entity.
//! This crate owns the store, the persistence context and the scripted workflow.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod persistence;
pub mod repo;
pub mod workflow;

pub use config::{DataSource, LogConfig, PersistenceUnitConfig, SchemaMode};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::member::{Member, MemberId, MemberValidationError};
pub use persistence::{
    EntityState, FlushStats, PersistenceUnit, Session, SessionError, TransactionError,
    TransactionState, UnitError,
};
pub use repo::member_repo::{MemberRepository, RepoError, RepoResult, SqliteMemberRepository};
pub use workflow::{run_member_workflow, RunError, WorkflowError, WorkflowReport};

/// Name of the persistence unit the CLI opens.
pub const PERSISTENCE_UNIT_NAME: &str = "jpabook";

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
