//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or shared in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Optionally trace every executed statement (`show_sql`).
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a 5s busy timeout.
//! - Schema management is left to the caller (`migrations::apply_schema_mode`).

use super::DbResult;
use crate::logging::error_chain;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

const MAX_LOGGED_ERROR_CHARS: usize = 200;

/// Where a connection should point.
#[derive(Debug, Clone, Copy)]
pub enum ConnectTarget<'a> {
    /// SQLite database file, created when missing.
    File(&'a Path),
    /// Named in-memory database shared by every connection using the same
    /// name within this process. Lives as long as one connection is open.
    SharedMemory(&'a str),
}

impl ConnectTarget<'_> {
    fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::SharedMemory(_) => "shared_memory",
        }
    }
}

/// Opens and configures a connection without touching the schema.
///
/// With `show_sql`, every statement text is logged as an `event=sql` line.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn connect(target: ConnectTarget<'_>, show_sql: bool) -> DbResult<Connection> {
    let mut conn = match target {
        ConnectTarget::File(path) => open_logged(target.mode(), || Connection::open(path))?,
        ConnectTarget::SharedMemory(name) => open_logged(
            target.mode(),
            || {
                Connection::open_with_flags(
                    format!("file:{name}?mode=memory&cache=shared"),
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
            },
        )?,
    };

    if show_sql {
        conn.trace(Some(log_sql));
    }
    Ok(conn)
}

fn open_logged(
    mode: &'static str,
    opener: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match opener() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                error_chain(&err, MAX_LOGGED_ERROR_CHARS)
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn log_sql(sql: &str) {
    let compact = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    info!("event=sql module=db sql={compact}");
}
