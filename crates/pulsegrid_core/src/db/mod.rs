//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for a pulse store file.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - The applied migration version is tracked in the `schema_version` table.
//! - Core code must not read/write domain tables before migrations succeed.
//! - Lock waits are bounded; a timed-out lock surfaces as [`DbError::Busy`].

use std::error::Error;
use std::fmt::{Display, Formatter};

use rusqlite::ErrorCode;

pub mod migrations;
mod open;

pub use open::{open_store, open_store_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The store file is locked by another connection and the bounded
    /// busy timeout elapsed. The whole operation may be retried.
    Busy,
    /// The store was written by a newer version of this crate.
    UnsupportedSchemaVersion {
        db_version: i64,
        latest_supported: i64,
    },
    /// The migration registry is missing a step. Programmer error.
    MigrationGap {
        expected: i64,
        found: Option<i64>,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Busy => write!(f, "store file is locked by another operation"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::MigrationGap { expected, found } => match found {
                Some(found) => write!(
                    f,
                    "migration registry gap: expected step {expected}, found {found}"
                ),
                None => write!(f, "migration registry gap: no step registered for {expected}"),
            },
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        // SQLITE_BUSY / SQLITE_LOCKED after the busy timeout surfaces as
        // the retryable Busy variant, never as a raw driver error.
        if let rusqlite::Error::SqliteFailure(failure, _) = &value {
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) {
                return Self::Busy;
            }
        }
        Self::Sqlite(value)
    }
}
