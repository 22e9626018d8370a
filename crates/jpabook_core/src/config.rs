//! Persistence-unit configuration.
//!
//! # Responsibility
//! - Describe which store a persistence unit talks to and how its schema is
//!   managed.
//! - Load that description from `JPABOOK_*` environment variables.
//!
//! # Invariants
//! - Unset variables fall back to documented defaults; set-but-invalid
//!   values are rejected, never silently defaulted.

use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DATABASE_URL: &str = "JPABOOK_DATABASE_URL";
pub const ENV_SCHEMA_MODE: &str = "JPABOOK_SCHEMA_MODE";
pub const ENV_SHOW_SQL: &str = "JPABOOK_SHOW_SQL";
pub const ENV_LOG_LEVEL: &str = "JPABOOK_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "JPABOOK_LOG_DIR";

const MEMORY_URL: &str = ":memory:";

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "invalid value `{value}` for {key}; expected {expected}"),
        }
    }
}

impl Error for ConfigError {}

/// Backing store of a persistence unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Process-local database, discarded when the unit closes.
    Memory,
    /// SQLite database file.
    File(PathBuf),
}

impl DataSource {
    /// Parses `:memory:` (case-insensitive) or a filesystem path.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: ENV_DATABASE_URL,
                value: url.to_string(),
                expected: "`:memory:` or a database file path",
            });
        }
        if trimmed.eq_ignore_ascii_case(MEMORY_URL) {
            return Ok(Self::Memory);
        }
        Ok(Self::File(PathBuf::from(trimmed)))
    }
}

/// How the schema is prepared when a unit opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaMode {
    /// Drop managed tables and recreate them.
    #[default]
    Create,
    /// Apply pending migrations, keep existing rows.
    Update,
    /// Require the schema to already be current.
    Validate,
}

impl SchemaMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "validate" => Ok(Self::Validate),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_SCHEMA_MODE,
                value: value.to_string(),
                expected: "create|update|validate",
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Validate => "validate",
        }
    }
}

/// Named persistence-unit configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceUnitConfig {
    /// Unit name used in log lines and shared in-memory database names.
    pub name: String,
    pub data_source: DataSource,
    pub schema_mode: SchemaMode,
    /// Log every executed SQL statement.
    pub show_sql: bool,
}

impl PersistenceUnitConfig {
    /// In-memory unit with a freshly created schema.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_source: DataSource::Memory,
            schema_mode: SchemaMode::Create,
            show_sql: false,
        }
    }

    /// File-backed unit that keeps existing rows and applies pending migrations.
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data_source: DataSource::File(path.into()),
            schema_mode: SchemaMode::Update,
            show_sql: false,
        }
    }

    /// Reads the unit description from the process environment.
    pub fn from_env(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(name, |key| env::var(key).ok())
    }

    /// Reads the unit description through an arbitrary key lookup.
    pub fn from_lookup(
        name: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let data_source = match lookup(ENV_DATABASE_URL) {
            Some(url) => DataSource::parse(&url)?,
            None => DataSource::Memory,
        };
        let schema_mode = match lookup(ENV_SCHEMA_MODE) {
            Some(mode) => SchemaMode::parse(&mode)?,
            None => SchemaMode::default(),
        };
        let show_sql = match lookup(ENV_SHOW_SQL) {
            Some(flag) => parse_bool(ENV_SHOW_SQL, &flag)?,
            None => false,
        };

        Ok(Self {
            name: name.into(),
            data_source,
            schema_mode,
            show_sql,
        })
    }
}

/// Logging settings read alongside the unit configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    /// `None` logs to stderr.
    pub log_dir: Option<String>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            level: lookup(ENV_LOG_LEVEL)
                .unwrap_or_else(|| crate::logging::default_log_level().to_string()),
            log_dir: lookup(ENV_LOG_DIR).filter(|dir| !dir.trim().is_empty()),
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            expected: "true|false",
        }),
    }
}
