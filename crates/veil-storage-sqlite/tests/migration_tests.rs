//! Migration tests
//!
//! Tests schema creation, version tracking and upgrades from older schemas.

use rusqlite::Connection;
use tempfile::NamedTempFile;
use veil_storage_sqlite::migrations::{self, SCHEMA_VERSION};

fn columns(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .map(|c| c.unwrap())
        .collect()
}

#[test]
fn test_fresh_migration() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();

    migrations::run_migrations(&conn).unwrap();

    for table in ["wallet_txs", "output_records", "mints", "zerocoin_spends"] {
        assert!(!columns(&conn, table).is_empty(), "missing table {}", table);
    }
    assert!(columns(&conn, "mints").contains(&"archived".to_string()));
    assert_eq!(migrations::get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
}

#[test]
fn test_migration_idempotency() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();

    migrations::run_migrations(&conn).unwrap();
    migrations::run_migrations(&conn).unwrap();

    let versions: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(versions, SCHEMA_VERSION as i64);
}

#[test]
fn test_upgrade_from_v1_keeps_mints() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();

    // A database written before archiving existed
    conn.execute_batch(
        r#"
        CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);
        INSERT INTO schema_version (version, applied_at) VALUES (1, '2024-01-01T00:00:00Z');
        CREATE TABLE wallet_txs (
            txid TEXT PRIMARY KEY, order_pos INTEGER NOT NULL, from_me INTEGER NOT NULL,
            payload TEXT NOT NULL, updated_at TEXT NOT NULL
        );
        CREATE TABLE output_records (txid TEXT PRIMARY KEY, payload TEXT NOT NULL);
        CREATE TABLE mints (
            hash_pubcoin TEXT PRIMARY KEY, hash_serial TEXT NOT NULL UNIQUE,
            denomination INTEGER NOT NULL, pubcoin TEXT NOT NULL, payload TEXT NOT NULL
        );
        CREATE TABLE zerocoin_spends (
            hash_serial TEXT PRIMARY KEY, hash_pubcoin TEXT NOT NULL, txid TEXT NOT NULL,
            denomination INTEGER NOT NULL, payload TEXT NOT NULL
        );
        INSERT INTO mints VALUES ('aa', 'bb', 10, 'cc', '{}');
        "#,
    )
    .unwrap();
    assert_eq!(migrations::get_schema_version(&conn).unwrap(), 1);

    migrations::run_migrations(&conn).unwrap();

    assert_eq!(migrations::get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    let archived: i64 = conn
        .query_row("SELECT archived FROM mints WHERE hash_pubcoin = 'aa'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(archived, 0);
}

#[test]
fn test_newer_schema_rejected() {
    let conn = Connection::open_in_memory().unwrap();
    migrations::run_migrations(&conn).unwrap();
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, 'later')",
        [SCHEMA_VERSION + 1],
    )
    .unwrap();

    let err = migrations::run_migrations(&conn).unwrap_err();
    assert!(matches!(err, veil_storage_sqlite::Error::Migration(_)));
}
