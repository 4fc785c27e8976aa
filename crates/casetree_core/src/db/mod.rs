//! SQLite storage bootstrap, schema migrations and write scoping.
//!
//! # Responsibility
//! - Open and configure SQLite connections for a case database.
//! - Apply schema migrations in deterministic order.
//! - Run multi-statement write sequences inside one transaction.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Case code must not read/write item data before migrations succeed.
//! - The root item (uid 1) exists once migrations have been applied.

use log::debug;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Schema is current but the tree root (uid 1, no parent) is gone.
    MissingRootItem,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "case schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::MissingRootItem => write!(f, "case database has no root item"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::MissingRootItem => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Runs `body` as one atomic write sequence.
///
/// When `atomic` is set and the connection is in autocommit mode, `body`
/// runs inside an IMMEDIATE transaction that commits on success and rolls
/// back on error. When the caller already holds an open transaction, or
/// `atomic` is off, `body` runs directly on `conn` and joins whatever scope
/// is active.
pub fn write_scope<T, E, F>(conn: &Connection, atomic: bool, body: F) -> Result<T, E>
where
    E: From<rusqlite::Error>,
    F: FnOnce(&Connection) -> Result<T, E>,
{
    if !atomic || !conn.is_autocommit() {
        return body(conn);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    match body(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            debug!("event=write_scope module=db status=rollback");
            // Dropping the transaction rolls it back.
            drop(tx);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{open_db_in_memory, write_scope};

    fn count_items(conn: &rusqlite::Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM item;", [], |row| row.get(0))
            .unwrap()
    }

    fn insert_child(conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO item (parent_uid, idx, category, created_at)
             VALUES (1, 1, 'disk', 0);",
            [],
        )
    }

    #[test]
    fn write_scope_rolls_back_on_error() {
        let conn = open_db_in_memory().unwrap();

        let result: Result<(), rusqlite::Error> = write_scope(&conn, true, |conn| {
            insert_child(conn)?;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(result.is_err());
        assert_eq!(count_items(&conn), 1);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn write_scope_without_atomic_keeps_partial_writes() {
        let conn = open_db_in_memory().unwrap();

        let result: Result<(), rusqlite::Error> = write_scope(&conn, false, |conn| {
            insert_child(conn)?;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(result.is_err());
        assert_eq!(count_items(&conn), 2);
    }

    #[test]
    fn write_scope_joins_open_transaction() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let result: Result<(), rusqlite::Error> = write_scope(&conn, true, |conn| {
            insert_child(conn)?;
            Ok(())
        });
        assert!(result.is_ok());
        assert!(!conn.is_autocommit());

        conn.execute_batch("ROLLBACK;").unwrap();
        assert_eq!(count_items(&conn), 1);
    }
}
