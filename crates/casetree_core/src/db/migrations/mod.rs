//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register case schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//! - Check that the migrated schema holds the case tree root.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Migration 1 seeds the root item (uid 1, no parent); every later open
//!   requires it to still be there.

use crate::db::{DbError, DbResult};
use crate::model::item::ROOT_ITEM_UID;
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "items",
        sql: include_str!("0001_items.sql"),
    },
    Migration {
        version: 2,
        name: "datasource",
        sql: include_str!("0002_datasource.sql"),
    },
    Migration {
        version: 3,
        name: "evidence",
        sql: include_str!("0003_evidence.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection, then checks
/// the root item.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer build.
/// - `MissingRootItem` when uid 1 is absent or has a parent.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version < latest {
        let tx = conn.transaction()?;
        for migration in MIGRATIONS
            .iter()
            .filter(|migration| migration.version > current_version)
        {
            tx.execute_batch(migration.sql)?;
            tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
            debug!(
                "event=db_migrate_step module=db status=ok version={} name={}",
                migration.version, migration.name
            );
        }
        tx.commit()?;

        info!(
            "event=db_migrate module=db status=ok from_version={} to_version={}",
            current_version, latest
        );
    }

    verify_root_item(conn)
}

fn verify_root_item(conn: &Connection) -> DbResult<()> {
    let parent: Option<Option<i64>> = conn
        .query_row(
            "SELECT parent_uid FROM item WHERE uid = ?1;",
            [ROOT_ITEM_UID],
            |row| row.get(0),
        )
        .optional()?;
    match parent {
        Some(None) => Ok(()),
        _ => Err(DbError::MissingRootItem),
    }
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
