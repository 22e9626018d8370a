//! Session: one connection plus the persistence context tracked on it.
//!
//! # Responsibility
//! - Keep an identity map of managed members keyed by id.
//! - Detect changes by snapshot comparison and write them at flush time.
//! - Demarcate transactions (`begin`/`commit`/`rollback`).
//!
//! # Invariants
//! - At most one managed instance exists per id.
//! - Pending changes only reach the store inside an active transaction.
//! - Rollback detaches every managed instance.
//! - The session releases its connection exactly once (`close` or drop).

use super::transaction::{TransactionError, TransactionState};
use super::unit::PersistenceUnit;
use crate::db::DbError;
use crate::logging::error_chain;
use crate::model::member::{Member, MemberId, MemberValidationError};
use crate::repo::member_repo::{MemberRepository, RepoError, SqliteMemberRepository};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const MAX_LOGGED_ERROR_CHARS: usize = 200;

pub type SessionResult<T> = Result<T, SessionError>;

/// Errors from persistence-context and transaction operations.
#[derive(Debug)]
pub enum SessionError {
    Repo(RepoError),
    Validation(MemberValidationError),
    /// `persist` was called for an id that is already managed.
    EntityExists(MemberId),
    /// `remove` was called for an id this session does not manage.
    NotManaged(MemberId),
    /// A managed instance had its id reassigned.
    IdentifierChanged {
        original: MemberId,
        current: MemberId,
    },
    TransactionNotActive,
    TransactionAlreadyActive,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(_) => write!(f, "session flush or load failed"),
            Self::Validation(_) => write!(f, "member rejected by session"),
            Self::EntityExists(id) => write!(f, "member `{id}` is already managed"),
            Self::NotManaged(id) => write!(f, "member `{id}` is not managed by this session"),
            Self::IdentifierChanged { original, current } => write!(
                f,
                "identifier of managed member `{original}` was altered to `{current}`"
            ),
            Self::TransactionNotActive => write!(f, "no active transaction"),
            Self::TransactionAlreadyActive => write!(f, "transaction already active"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SessionError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<MemberValidationError> for SessionError {
    fn from(value: MemberValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::Db(DbError::Sqlite(value)))
    }
}

/// Per-entity lifecycle inside the persistence context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Registered, not yet written.
    New,
    /// Written or loaded; compared against its snapshot at flush.
    Managed,
    /// Delete pending.
    Removed,
}

/// Write counts produced by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl FlushStats {
    pub fn is_empty(&self) -> bool {
        self.inserted + self.updated + self.deleted == 0
    }
}

#[derive(Debug)]
struct ManagedEntry {
    member: Member,
    state: EntityState,
    /// Last state known to be in the store. `None` until first written.
    snapshot: Option<Member>,
    seq: u64,
}

/// A persistence context bound to one connection of a `PersistenceUnit`.
pub struct Session<'unit> {
    unit: &'unit PersistenceUnit,
    conn: Connection,
    session_id: u64,
    entries: HashMap<MemberId, ManagedEntry>,
    next_seq: u64,
    tx_state: TransactionState,
    released: bool,
}

impl<'unit> Session<'unit> {
    pub(super) fn new(unit: &'unit PersistenceUnit, conn: Connection, session_id: u64) -> Self {
        Self {
            unit,
            conn,
            session_id,
            entries: HashMap::new(),
            next_seq: 0,
            tx_state: TransactionState::NotStarted,
            released: false,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.tx_state
    }

    /// Starts a unit-of-work.
    pub fn begin(&mut self) -> SessionResult<()> {
        if self.tx_state.is_active() {
            return Err(SessionError::TransactionAlreadyActive);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.tx_state = TransactionState::Active;
        debug!(
            "event=tx_begin module=persistence status=ok session={}",
            self.session_id
        );
        Ok(())
    }

    /// Flushes pending changes and commits.
    ///
    /// # Errors
    /// - `TransactionNotActive` outside a transaction.
    /// - Any flush or `COMMIT` failure; the transaction is rolled back first.
    pub fn commit(&mut self) -> SessionResult<()> {
        if !self.tx_state.is_active() {
            return Err(SessionError::TransactionNotActive);
        }

        let committed = self
            .flush()
            .and_then(|_| self.conn.execute_batch("COMMIT;").map_err(SessionError::from));
        if let Err(err) = committed {
            error!(
                "event=tx_commit module=persistence status=error session={} error={}",
                self.session_id,
                error_chain(&err, MAX_LOGGED_ERROR_CHARS)
            );
            self.rollback_logged();
            return Err(err);
        }

        self.tx_state = TransactionState::Committed;
        info!(
            "event=tx_commit module=persistence status=ok session={} managed={}",
            self.session_id,
            self.entries.len()
        );
        Ok(())
    }

    /// Rolls back the active transaction and detaches every managed member.
    pub fn rollback(&mut self) -> SessionResult<()> {
        if !self.tx_state.is_active() {
            return Err(SessionError::TransactionNotActive);
        }

        self.tx_state = TransactionState::RolledBack;
        let detached = self.entries.len();
        self.entries.clear();
        self.conn.execute_batch("ROLLBACK;")?;
        info!(
            "event=tx_rollback module=persistence status=ok session={} detached={}",
            self.session_id, detached
        );
        Ok(())
    }

    /// Runs `work` inside a new transaction.
    ///
    /// Commits when `work` succeeds. When it fails the transaction is rolled
    /// back and the error is returned as `TransactionError::Aborted`.
    pub fn run_in_transaction<T, E, F>(&mut self, work: F) -> Result<T, TransactionError<E>>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: Error,
    {
        self.begin().map_err(TransactionError::Session)?;

        match work(self) {
            Ok(value) => {
                self.commit().map_err(TransactionError::Session)?;
                Ok(value)
            }
            Err(err) => {
                warn!(
                    "event=tx_abort module=persistence status=error session={} error={}",
                    self.session_id,
                    error_chain(&err, MAX_LOGGED_ERROR_CHARS)
                );
                if self.tx_state.is_active() {
                    self.rollback_logged();
                }
                Err(TransactionError::Aborted { source: err })
            }
        }
    }

    /// Registers a new member; it is inserted at the next flush.
    ///
    /// Returns the managed instance. Changes made through it are detected at
    /// flush without any further call.
    pub fn persist(&mut self, member: Member) -> SessionResult<&mut Member> {
        member.validate()?;

        let id = member.id.clone();
        if let Some(entry) = self.entries.get(&id) {
            if entry.state != EntityState::Removed {
                return Err(SessionError::EntityExists(id));
            }
        }

        let entry = match self.entries.remove(&id) {
            // Re-persisting a removed instance cancels the pending delete.
            Some(removed) => ManagedEntry {
                member,
                state: EntityState::Managed,
                snapshot: removed.snapshot,
                seq: removed.seq,
            },
            None => ManagedEntry {
                member,
                state: EntityState::New,
                snapshot: None,
                seq: self.take_seq(),
            },
        };
        debug!(
            "event=persist module=persistence status=ok session={} state={:?}",
            self.session_id, entry.state
        );
        Ok(&mut self.entries.entry(id).or_insert(entry).member)
    }

    /// Looks up a member: identity map first, then the store.
    pub fn find(&mut self, id: &str) -> SessionResult<Option<&Member>> {
        Ok(self.find_mut(id)?.map(|member| &*member))
    }

    /// Like `find`, returning the managed instance for in-place changes.
    pub fn find_mut(&mut self, id: &str) -> SessionResult<Option<&mut Member>> {
        if !self.entries.contains_key(id) {
            let loaded = self.repo().find_member(id)?;
            match loaded {
                Some(member) => self.register_loaded(member),
                None => return Ok(None),
            }
        }

        Ok(self
            .entries
            .get_mut(id)
            .filter(|entry| entry.state != EntityState::Removed)
            .map(|entry| &mut entry.member))
    }

    /// Returns every stored member ordered by id.
    ///
    /// Inside a transaction pending changes are flushed first, so members
    /// registered in this session are included. Ids already managed resolve
    /// to the managed instance.
    pub fn list_all(&mut self) -> SessionResult<Vec<Member>> {
        if self.tx_state.is_active() {
            self.flush()?;
        }

        let rows = self.repo().list_members()?;
        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            match self.entries.get(&row.id) {
                Some(entry) if entry.state == EntityState::Removed => {}
                Some(entry) => members.push(entry.member.clone()),
                None => {
                    members.push(row.clone());
                    self.register_loaded(row);
                }
            }
        }
        Ok(members)
    }

    /// Marks a managed member for deletion at the next flush.
    ///
    /// A member that was never written is simply forgotten.
    pub fn remove(&mut self, id: &str) -> SessionResult<()> {
        let Some(entry) = self.entries.get_mut(id) else {
            return Err(SessionError::NotManaged(id.to_string()));
        };

        let state = entry.state;
        match state {
            EntityState::New => {
                self.entries.remove(id);
            }
            EntityState::Managed => entry.state = EntityState::Removed,
            EntityState::Removed => {}
        }
        Ok(())
    }

    /// Whether `id` is managed and not pending removal.
    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.state != EntityState::Removed)
    }

    /// Lifecycle state of `id` in this context, `None` when detached.
    pub fn entity_state(&self, id: &str) -> Option<EntityState> {
        self.entries.get(id).map(|entry| entry.state)
    }

    /// Detaches every managed member, discarding unflushed changes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Writes pending changes: inserts, then updates, then deletes.
    pub fn flush(&mut self) -> SessionResult<FlushStats> {
        if !self.tx_state.is_active() {
            return Err(SessionError::TransactionNotActive);
        }

        let mut pending: Vec<(u8, u64, MemberId)> = Vec::new();
        for (key, entry) in &self.entries {
            if entry.member.id != *key {
                return Err(SessionError::IdentifierChanged {
                    original: key.clone(),
                    current: entry.member.id.clone(),
                });
            }
            let phase = match entry.state {
                EntityState::New => 0,
                EntityState::Managed if entry.snapshot.as_ref() != Some(&entry.member) => 1,
                EntityState::Managed => continue,
                EntityState::Removed => 2,
            };
            pending.push((phase, entry.seq, key.clone()));
        }
        pending.sort();

        let repo = SqliteMemberRepository::new_unchecked(&self.conn);
        let mut stats = FlushStats::default();
        for (_, _, id) in pending {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            let state = entry.state;
            match state {
                EntityState::New => {
                    repo.insert_member(&entry.member)?;
                    entry.state = EntityState::Managed;
                    entry.snapshot = Some(entry.member.clone());
                    stats.inserted += 1;
                }
                EntityState::Managed => {
                    repo.update_member(&entry.member)?;
                    entry.snapshot = Some(entry.member.clone());
                    stats.updated += 1;
                }
                EntityState::Removed => {
                    repo.delete_member(&id)?;
                    self.entries.remove(&id);
                    stats.deleted += 1;
                }
            }
        }

        if !stats.is_empty() {
            debug!(
                "event=flush module=persistence status=ok session={} inserted={} updated={} deleted={}",
                self.session_id, stats.inserted, stats.updated, stats.deleted
            );
        }
        Ok(stats)
    }

    /// Releases the session, rolling back an unfinished transaction.
    ///
    /// # Errors
    /// - Returns the rollback failure; the session is released regardless.
    pub fn close(mut self) -> SessionResult<()> {
        self.release()
    }

    fn repo(&self) -> SqliteMemberRepository<'_> {
        SqliteMemberRepository::new_unchecked(&self.conn)
    }

    fn register_loaded(&mut self, member: Member) {
        let seq = self.take_seq();
        self.entries.insert(
            member.id.clone(),
            ManagedEntry {
                snapshot: Some(member.clone()),
                member,
                state: EntityState::Managed,
                seq,
            },
        );
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn rollback_logged(&mut self) {
        if let Err(err) = self.rollback() {
            error!(
                "event=tx_rollback module=persistence status=error session={} error={}",
                self.session_id,
                error_chain(&err, MAX_LOGGED_ERROR_CHARS)
            );
        }
    }

    fn release(&mut self) -> SessionResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let rolled_back = if self.tx_state.is_active() {
            warn!(
                "event=session_close module=persistence status=rollback session={}",
                self.session_id
            );
            self.rollback()
        } else {
            Ok(())
        };
        self.entries.clear();
        self.unit.session_released();
        info!(
            "event=session_close module=persistence status=ok session={} tx_state={}",
            self.session_id,
            self.tx_state.as_str()
        );
        rolled_back
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(
                "event=session_close module=persistence status=error session={} error={}",
                self.session_id,
                error_chain(&err, MAX_LOGGED_ERROR_CHARS)
            );
        }
    }
}
