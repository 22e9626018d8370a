//! Persistence unit: the factory sessions are opened from.
//!
//! # Responsibility
//! - Resolve the configured data source and prepare its schema once.
//! - Open sessions and count how many are still open.
//!
//! # Invariants
//! - In-memory units keep one idle keeper connection so the shared database
//!   survives between sessions; closing the unit discards it.
//! - Every session handed out has passed the repository schema check.

use super::session::Session;
use crate::config::{DataSource, PersistenceUnitConfig};
use crate::db::migrations::apply_schema_mode;
use crate::db::{connect, ConnectTarget, DbError};
use crate::logging::error_chain;
use crate::repo::member_repo::{RepoError, SqliteMemberRepository};
use log::{error, info};
use rusqlite::Connection;
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

const MAX_LOGGED_ERROR_CHARS: usize = 200;

pub type UnitResult<T> = Result<T, UnitError>;

/// Errors raised while opening a unit or one of its sessions.
#[derive(Debug)]
pub enum UnitError {
    Db(DbError),
    Repo(RepoError),
}

impl Display for UnitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(_) => write!(f, "store bootstrap failed"),
            Self::Repo(_) => write!(f, "store schema check failed"),
        }
    }
}

impl Error for UnitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<DbError> for UnitError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for UnitError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Resolved location of the unit's store.
#[derive(Debug, Clone)]
enum StoreTarget {
    File(PathBuf),
    /// Process-unique shared-cache database name.
    SharedMemory(String),
}

impl StoreTarget {
    fn resolve(config: &PersistenceUnitConfig) -> Self {
        match &config.data_source {
            DataSource::Memory => {
                Self::SharedMemory(format!("{}-{}", config.name, Uuid::new_v4().simple()))
            }
            DataSource::File(path) => Self::File(path.clone()),
        }
    }

    fn connect_target(&self) -> ConnectTarget<'_> {
        match self {
            Self::File(path) => ConnectTarget::File(path),
            Self::SharedMemory(name) => ConnectTarget::SharedMemory(name),
        }
    }
}

/// Configured entry point to one store.
pub struct PersistenceUnit {
    config: PersistenceUnitConfig,
    target: StoreTarget,
    _keeper: Option<Connection>,
    open_sessions: Cell<usize>,
    sessions_opened: Cell<u64>,
}

impl PersistenceUnit {
    /// Opens the unit and prepares the schema per `config.schema_mode`.
    ///
    /// # Side effects
    /// - `SchemaMode::Create` drops existing member rows.
    /// - Emits `unit_open` logging events with duration and status.
    pub fn open(config: PersistenceUnitConfig) -> UnitResult<Self> {
        let started_at = Instant::now();
        info!(
            "event=unit_open module=persistence status=start unit={} schema_mode={}",
            config.name,
            config.schema_mode.as_str()
        );

        let target = StoreTarget::resolve(&config);
        let conn = match prepare_schema(&config, &target) {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=unit_open module=persistence status=error unit={} duration_ms={} error={}",
                    config.name,
                    started_at.elapsed().as_millis(),
                    error_chain(&err, MAX_LOGGED_ERROR_CHARS)
                );
                return Err(err);
            }
        };
        let keeper = match target {
            StoreTarget::SharedMemory(_) => Some(conn),
            StoreTarget::File(_) => None,
        };

        info!(
            "event=unit_open module=persistence status=ok unit={} duration_ms={}",
            config.name,
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            config,
            target,
            _keeper: keeper,
            open_sessions: Cell::new(0),
            sessions_opened: Cell::new(0),
        })
    }

    /// Number of sessions opened from this unit and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.get()
    }

    /// Opens a new session on its own connection.
    pub fn session(&self) -> UnitResult<Session<'_>> {
        let conn = connect(self.target.connect_target(), self.config.show_sql)?;
        SqliteMemberRepository::try_new(&conn)?;

        let session_id = self.sessions_opened.get() + 1;
        self.sessions_opened.set(session_id);
        self.open_sessions.set(self.open_sessions.get() + 1);
        info!(
            "event=session_open module=persistence status=ok unit={} session={}",
            self.config.name, session_id
        );
        Ok(Session::new(self, conn, session_id))
    }

    /// Closes the unit, releasing the in-memory store if any.
    pub fn close(self) {
        info!(
            "event=unit_close module=persistence status=ok unit={} sessions_opened={}",
            self.config.name,
            self.sessions_opened.get()
        );
    }

    pub(super) fn session_released(&self) {
        self.open_sessions
            .set(self.open_sessions.get().saturating_sub(1));
    }
}

fn prepare_schema(config: &PersistenceUnitConfig, target: &StoreTarget) -> UnitResult<Connection> {
    let mut conn = connect(target.connect_target(), config.show_sql)?;
    apply_schema_mode(&mut conn, config.schema_mode)?;
    SqliteMemberRepository::try_new(&conn)?;
    Ok(conn)
}
