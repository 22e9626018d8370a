//! SQLite migration registry and schema-mode executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//! - Translate the configured `SchemaMode` into drop/migrate/validate steps.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::config::SchemaMode;
use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_init.sql"),
}];

/// Tables owned by the migrations above, in drop order.
const MANAGED_TABLES: &[&str] = &["members"];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

/// Brings the schema into the state requested by `mode`.
///
/// - `Create` drops every managed table and rebuilds from migration 1.
/// - `Update` applies pending migrations only.
/// - `Validate` touches nothing and fails unless the schema is current.
pub fn apply_schema_mode(conn: &mut Connection, mode: SchemaMode) -> DbResult<()> {
    match mode {
        SchemaMode::Create => {
            drop_managed_tables(conn)?;
            apply_migrations(conn)
        }
        SchemaMode::Update => apply_migrations(conn),
        SchemaMode::Validate => ensure_current(conn),
    }
}

/// Fails when the connection is not at exactly `latest_version()`.
pub fn ensure_current(conn: &Connection) -> DbResult<()> {
    let db_version = current_user_version(conn)?;
    let expected = latest_version();
    if db_version > expected {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported: expected,
        });
    }
    if db_version != expected {
        return Err(DbError::SchemaNotCurrent {
            db_version,
            expected,
        });
    }
    Ok(())
}

fn drop_managed_tables(conn: &mut Connection) -> DbResult<()> {
    let tx = conn.transaction()?;
    for table in MANAGED_TABLES {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
    }
    tx.execute_batch("PRAGMA user_version = 0;")?;
    tx.commit()?;
    info!(
        "event=schema_reset module=db status=ok tables={}",
        MANAGED_TABLES.len()
    );
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
