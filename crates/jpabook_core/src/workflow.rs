//! Scripted member walkthrough: insert, mutate, find, query, remove.
//!
//! # Responsibility
//! - Drive one session through the full entity lifecycle.
//! - Print the two report lines the walkthrough is known for.
//!
//! # Invariants
//! - `run_member_workflow` expects an active transaction and leaves the
//!   outcome (commit/rollback) to its caller.
//! - `run` releases the session on every path.

use crate::model::member::{Member, MemberId};
use crate::persistence::{
    PersistenceUnit, Session, SessionError, TransactionError, UnitError,
};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};

pub const DEMO_MEMBER_ID: &str = "id1";
pub const DEMO_USERNAME: &str = "kangho";
pub const DEMO_INITIAL_AGE: i32 = 29;
pub const DEMO_UPDATED_AGE: i32 = 19;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug)]
pub enum WorkflowError {
    Session(SessionError),
    Output(io::Error),
    /// The member registered moments earlier was not visible to `find`.
    MissingMember(MemberId),
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(_) => write!(f, "member walkthrough step failed"),
            Self::Output(_) => write!(f, "failed to write workflow output"),
            Self::MissingMember(id) => write!(f, "member `{id}` not visible in its own session"),
        }
    }
}

impl Error for WorkflowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Output(err) => Some(err),
            Self::MissingMember(_) => None,
        }
    }
}

impl From<SessionError> for WorkflowError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<io::Error> for WorkflowError {
    fn from(value: io::Error) -> Self {
        Self::Output(value)
    }
}

/// What the walkthrough observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub found_age: i32,
    pub found_username: String,
    pub member_count: usize,
}

/// Errors from `run`, one per stage of the program flow.
#[derive(Debug)]
pub enum RunError {
    Unit(UnitError),
    Transaction(TransactionError<WorkflowError>),
    Close(SessionError),
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit(_) => write!(f, "failed to open session"),
            Self::Transaction(_) => write!(f, "member transaction failed"),
            Self::Close(_) => write!(f, "failed to close session"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unit(err) => Some(err),
            Self::Transaction(err) => Some(err),
            Self::Close(err) => Some(err),
        }
    }
}

impl From<UnitError> for RunError {
    fn from(value: UnitError) -> Self {
        Self::Unit(value)
    }
}

impl From<TransactionError<WorkflowError>> for RunError {
    fn from(value: TransactionError<WorkflowError>) -> Self {
        Self::Transaction(value)
    }
}

/// Runs the walkthrough inside the session's active transaction.
///
/// Writes `"<age> , <username>"` after the lookup and
/// `"member size : <count>"` after the query.
pub fn run_member_workflow(
    session: &mut Session<'_>,
    out: &mut impl Write,
) -> WorkflowResult<WorkflowReport> {
    let member = session.persist(Member::new(DEMO_MEMBER_ID, DEMO_USERNAME, DEMO_INITIAL_AGE))?;
    member.age = DEMO_UPDATED_AGE;

    let found = session
        .find(DEMO_MEMBER_ID)?
        .cloned()
        .ok_or_else(|| WorkflowError::MissingMember(DEMO_MEMBER_ID.to_string()))?;
    writeln!(out, "{} , {}", found.age, found.username)?;

    let members = session.list_all()?;
    writeln!(out, "member size : {}", members.len())?;

    session.remove(DEMO_MEMBER_ID)?;

    info!(
        "event=workflow module=workflow status=ok session={} member_count={}",
        session.session_id(),
        members.len()
    );
    Ok(WorkflowReport {
        found_age: found.age,
        found_username: found.username,
        member_count: members.len(),
    })
}

/// Opens a session, runs the walkthrough in one transaction, closes the session.
///
/// A failed walkthrough is rolled back and returned as
/// `RunError::Transaction`; the session is closed first either way.
pub fn run(unit: &PersistenceUnit, out: &mut impl Write) -> Result<WorkflowReport, RunError> {
    let mut session = unit.session()?;
    let outcome = session.run_in_transaction(|session| run_member_workflow(session, out));
    let closed = session.close();

    let report = outcome?;
    closed.map_err(RunError::Close)?;
    Ok(report)
}
