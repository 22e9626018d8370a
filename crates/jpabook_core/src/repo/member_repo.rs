//! Member repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide row-level CRUD over the `members` table.
//! - Keep SQL details inside the persistence boundary; sessions flush
//!   through this API and never build SQL themselves.
//!
//! # Invariants
//! - Write paths call `Member::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Listing is deterministic: `id ASC`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::member::{Member, MemberId, MemberValidationError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const MEMBER_SELECT_SQL: &str = "SELECT id, username, age FROM members";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for member persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(MemberValidationError),
    Db(DbError),
    NotFound(MemberId),
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(_) => write!(f, "member rejected by validation"),
            Self::Db(_) => write!(f, "member repository operation failed"),
            Self::NotFound(id) => write!(f, "member not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted member data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "member repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "member repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "member repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_)
            | Self::InvalidData(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<MemberValidationError> for RepoError {
    fn from(value: MemberValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for member CRUD operations.
pub trait MemberRepository {
    fn insert_member(&self, member: &Member) -> RepoResult<()>;
    fn update_member(&self, member: &Member) -> RepoResult<()>;
    fn find_member(&self, id: &str) -> RepoResult<Option<Member>>;
    fn list_members(&self) -> RepoResult<Vec<Member>>;
    fn delete_member(&self, id: &str) -> RepoResult<()>;
    fn count_members(&self) -> RepoResult<u64>;
}

/// SQLite-backed member repository.
pub struct SqliteMemberRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMemberRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_member_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Wraps a connection already checked by `try_new`.
    pub(crate) fn new_unchecked(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl MemberRepository for SqliteMemberRepository<'_> {
    fn insert_member(&self, member: &Member) -> RepoResult<()> {
        member.validate()?;

        self.conn.execute(
            "INSERT INTO members (id, username, age) VALUES (?1, ?2, ?3);",
            params![member.id.as_str(), member.username.as_str(), member.age],
        )?;

        Ok(())
    }

    fn update_member(&self, member: &Member) -> RepoResult<()> {
        member.validate()?;

        let changed = self.conn.execute(
            "UPDATE members
             SET username = ?2,
                 age = ?3
             WHERE id = ?1;",
            params![member.id.as_str(), member.username.as_str(), member.age],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(member.id.clone()));
        }

        Ok(())
    }

    fn find_member(&self, id: &str) -> RepoResult<Option<Member>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEMBER_SELECT_SQL} WHERE id = ?1;"))?;
        let raw = stmt.query_row([id], read_raw_member).optional()?;
        raw.map(validate_raw_member).transpose()
    }

    fn list_members(&self) -> RepoResult<Vec<Member>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEMBER_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut members = Vec::new();

        while let Some(row) = rows.next()? {
            members.push(validate_raw_member(read_raw_member(row)?)?);
        }

        Ok(members)
    }

    fn delete_member(&self, id: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM members WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn count_members(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM members;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative member count `{count}`")))
    }
}

fn read_raw_member(row: &Row<'_>) -> rusqlite::Result<(String, String, i64)> {
    Ok((row.get("id")?, row.get("username")?, row.get("age")?))
}

fn validate_raw_member((id, username, age): (String, String, i64)) -> RepoResult<Member> {
    let age = i32::try_from(age).map_err(|_| {
        RepoError::InvalidData(format!("age `{age}` out of range in members.age for `{id}`"))
    })?;
    let member = Member { id, username, age };
    member.validate()?;
    Ok(member)
}

fn ensure_member_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "members")? {
        return Err(RepoError::MissingRequiredTable("members"));
    }

    for column in ["id", "username", "age"] {
        if !table_has_column(conn, "members", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "members",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
