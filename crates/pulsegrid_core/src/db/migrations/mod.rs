//! Schema migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing, contiguous order.
//! - Bring an older store up to the current version, one atomic step at a
//!   time, before any other operation touches domain tables.
//!
//! # Invariants
//! - The persisted version in `schema_version` is monotonically non-decreasing
//!   and only ever advanced by this module.
//! - Each step runs in its own transaction that also rewrites the stored
//!   version, so a crash mid-chain leaves a consistent intermediate version.
//! - A store newer than [`latest_version`] is rejected, never migrated down.

use rusqlite::{Connection, OptionalExtension};

use crate::db::{DbError, DbResult};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_user_coordinates.sql"),
    },
    Migration {
        version: 3,
        sql: include_str!("0003_variant.sql"),
    },
    Migration {
        version: 4,
        sql: include_str!("0004_multi_pass.sql"),
    },
    Migration {
        version: 5,
        sql: include_str!("0005_composition.sql"),
    },
];

/// Returns the latest schema version known by this binary.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings the store up to [`latest_version`], applying each pending step in
/// its own transaction. Idempotent: a store already at the latest version
/// performs no writes.
///
/// # Errors
/// - [`DbError::UnsupportedSchemaVersion`] when the store is newer than this
///   binary.
/// - [`DbError::MigrationGap`] when the registry is missing an intermediate
///   step; checked up front so no partial chain runs against a gap.
pub fn ensure_current(conn: &mut Connection) -> DbResult<()> {
    let stored = stored_version(conn)?;
    let latest = latest_version();

    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }
    if stored == latest {
        return Ok(());
    }

    let pending: Vec<Migration> = MIGRATIONS
        .iter()
        .copied()
        .filter(|migration| migration.version > stored)
        .collect();

    let mut expected = stored + 1;
    for migration in &pending {
        if migration.version != expected {
            return Err(DbError::MigrationGap {
                expected,
                found: Some(migration.version),
            });
        }
        expected += 1;
    }
    if expected != latest + 1 {
        return Err(DbError::MigrationGap {
            expected,
            found: None,
        });
    }

    for migration in &pending {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT (id) DO UPDATE SET version = excluded.version;",
            [migration.version],
        )?;
        tx.commit()?;
    }

    Ok(())
}

/// Reads the persisted schema version; 0 for a store that predates the
/// version table (i.e. an empty file).
pub fn stored_version(conn: &Connection) -> DbResult<i64> {
    let table_present: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'schema_version'
        );",
        [],
        |row| row.get(0),
    )?;
    if table_present == 0 {
        return Ok(0);
    }

    let version = conn
        .query_row(
            "SELECT version FROM schema_version WHERE id = 1;",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0))
}
