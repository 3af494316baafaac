//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for the catalog.
//! - Isolate SQLite query details from service/business orchestration.
//! - Verify connection readiness (schema version, tables, columns) before
//!   handing out a repository.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, conflicts) in
//!   addition to DB transport errors.
//! - Read paths reject invalid persisted state as `InvalidData` instead of
//!   masking it.

pub mod attr_repo;
pub mod part_repo;
pub mod system_repo;

use crate::db::migrations::latest_version;
use crate::db::DbError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error shared by all catalog repositories.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Referenced row does not exist.
    NotFound { entity: &'static str, id: Uuid },
    /// Unique name already taken.
    NameConflict { entity: &'static str, name: String },
    /// Authorization pair already present.
    DuplicateAuthorization {
        part_uuid: Uuid,
        attr_type_uuid: Uuid,
    },
    /// Assignment pair already present.
    DuplicateAssignment { part_uuid: Uuid, attr_uuid: Uuid },
    /// Conformance edge already present.
    DuplicateConformance {
        standard_uuid: Uuid,
        part_uuid: Uuid,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::NameConflict { entity, name } => {
                write!(f, "{entity} name already taken: `{name}`")
            }
            Self::DuplicateAuthorization {
                part_uuid,
                attr_type_uuid,
            } => write!(
                f,
                "part {part_uuid} already authorizes attribute type {attr_type_uuid}"
            ),
            Self::DuplicateAssignment {
                part_uuid,
                attr_uuid,
            } => write!(f, "part {part_uuid} already carries attr {attr_uuid}"),
            Self::DuplicateConformance {
                standard_uuid,
                part_uuid,
            } => write!(
                f,
                "part {part_uuid} already conforms to standard {standard_uuid}"
            ),
            Self::InvalidData(message) => write!(f, "invalid catalog data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalog repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "catalog repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "catalog repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
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

/// Rejects connections whose schema version differs from this build.
pub(crate) fn ensure_schema_version(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
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

pub(crate) fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
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

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}
