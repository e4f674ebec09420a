//! Database schema migrations

use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension};

/// Schema version written by [`run_migrations`].
pub const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version > SCHEMA_VERSION {
        return Err(Error::Migration(format!(
            "database schema {} is newer than supported {}",
            current_version, SCHEMA_VERSION
        )));
    }

    if current_version < 1 {
        migrate_v1(conn)?;
        set_schema_version(conn, 1)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
        set_schema_version(conn, 2)?;
    }

    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
    )?;
    tracing::debug!("Schema version {} applied", version);
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE wallet_txs (
            txid TEXT PRIMARY KEY,
            order_pos INTEGER NOT NULL,
            from_me INTEGER NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE output_records (
            txid TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        );

        CREATE TABLE mints (
            hash_pubcoin TEXT PRIMARY KEY,
            hash_serial TEXT NOT NULL UNIQUE,
            denomination INTEGER NOT NULL,
            pubcoin TEXT NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE TABLE zerocoin_spends (
            hash_serial TEXT PRIMARY KEY,
            hash_pubcoin TEXT NOT NULL,
            txid TEXT NOT NULL,
            denomination INTEGER NOT NULL,
            payload TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Archive flag on mints plus lookup indexes.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE mints ADD COLUMN archived INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE mints ADD COLUMN archived_at TEXT;

        CREATE INDEX idx_mints_archived ON mints(archived);
        CREATE INDEX idx_zerocoin_spends_txid ON zerocoin_spends(txid);
        CREATE INDEX idx_wallet_txs_order ON wallet_txs(order_pos);
        "#,
    )?;
    Ok(())
}
