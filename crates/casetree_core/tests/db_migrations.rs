use casetree_core::db::migrations::latest_version;
use casetree_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "item",
        "attribute",
        "event",
        "datasource",
        "evidence",
        "evidence_attribute",
        "evidence_tag",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn fresh_database_contains_only_the_root_item() {
    let conn = open_db_in_memory().unwrap();
    let (uid, parent, idx, category): (i64, Option<i64>, i64, String) = conn
        .query_row(
            "SELECT uid, parent_uid, idx, category FROM item;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!((uid, parent, idx, category.as_str()), (1, None, 1, "root"));
}

#[test]
fn connections_enforce_foreign_keys() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let err = conn.execute(
        "INSERT INTO attribute (item_uid, id, value) VALUES (42, 'a', x'00');",
        [],
    );
    assert!(err.is_err());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.sqlite");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    conn_first
        .execute(
            "INSERT INTO item (parent_uid, idx, category, created_at) VALUES (1, 1, 'disk', 0);",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let count: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM item;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn opening_database_without_root_item_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.sqlite");

    let conn = open_db(&path).unwrap();
    conn.execute("DELETE FROM item WHERE uid = 1;", []).unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    assert!(matches!(err, DbError::MissingRootItem), "unexpected error: {err}");
    assert_eq!(err.to_string(), "case database has no root item");
}

#[test]
fn root_item_with_a_parent_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.sqlite");

    let conn = open_db(&path).unwrap();
    conn.execute_batch(
        "PRAGMA foreign_keys = OFF;
         UPDATE item SET parent_uid = 7 WHERE uid = 1;",
    )
    .unwrap();
    drop(conn);

    assert!(matches!(open_db(&path).unwrap_err(), DbError::MissingRootItem));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
