//! Data access layer
//!
//! Every row keeps its record as a JSON payload. The key columns beside it exist
//! for lookups and are checked against the payload on load.

use crate::{Error, Result};
use rusqlite::{params, Connection};
use veil_core::primitives::Hash256;
use veil_core::store::{WalletTxRecord, ZerocoinSpendRecord};
use veil_core::zerocoin::Mint;
use veil_core::TransactionRecord;

/// Repository for database operations
pub struct Repository<'a> {
    conn: &'a Connection,
}

impl<'a> Repository<'a> {
    /// Create repository
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a wallet transaction
    pub fn upsert_tx(&self, record: &WalletTxRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO wallet_txs (txid, order_pos, from_me, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(txid) DO UPDATE SET
                order_pos = excluded.order_pos,
                from_me = excluded.from_me,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![
                record.txid.to_hex(),
                record.order_pos,
                record.from_me,
                serde_json::to_string(record)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Delete a wallet transaction. Missing rows are not an error.
    pub fn delete_tx(&self, txid: &Hash256) -> Result<()> {
        self.conn
            .execute("DELETE FROM wallet_txs WHERE txid = ?1", params![txid.to_hex()])?;
        Ok(())
    }

    /// All wallet transactions in insertion order
    pub fn list_txs(&self) -> Result<Vec<WalletTxRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT txid, payload FROM wallet_txs ORDER BY order_pos")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, payload) = row?;
            let record: WalletTxRecord = serde_json::from_str(&payload)?;
            check_key(&key, &record.txid, "wallet tx")?;
            out.push(record);
        }
        Ok(out)
    }

    /// Insert or replace the output records of `txid`
    pub fn upsert_output_record(&self, txid: &Hash256, record: &TransactionRecord) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO output_records (txid, payload) VALUES (?1, ?2)",
            params![txid.to_hex(), serde_json::to_string(record)?],
        )?;
        Ok(())
    }

    /// All output records
    pub fn list_output_records(&self) -> Result<Vec<(Hash256, TransactionRecord)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT txid, payload FROM output_records ORDER BY txid")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, payload) = row?;
            let txid: Hash256 = key
                .parse()
                .map_err(|_| Error::Corrupt(format!("output record key {}", key)))?;
            out.push((txid, serde_json::from_str(&payload)?));
        }
        Ok(out)
    }

    /// Insert or replace a mint. An archived mint written again becomes active.
    pub fn upsert_mint(&self, mint: &Mint) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO mints
                (hash_pubcoin, hash_serial, denomination, pubcoin, payload, archived, archived_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)
            "#,
            params![
                mint.hash_pubcoin().to_hex(),
                mint.hash_serial().to_hex(),
                mint.denomination.value(),
                hex::encode(&mint.pubcoin),
                serde_json::to_string(mint)?,
            ],
        )?;
        Ok(())
    }

    /// Delete an active mint
    pub fn delete_mint(&self, hash_pubcoin: &Hash256) -> Result<()> {
        let deleted = self.conn.execute(
            "DELETE FROM mints WHERE hash_pubcoin = ?1 AND archived = 0",
            params![hash_pubcoin.to_hex()],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("mint {}", hash_pubcoin)));
        }
        Ok(())
    }

    /// Flag a mint archived or active again
    pub fn set_mint_archived(&self, hash_pubcoin: &Hash256, archived: bool) -> Result<()> {
        let archived_at = archived.then(|| chrono::Utc::now().to_rfc3339());
        let updated = self.conn.execute(
            "UPDATE mints SET archived = ?1, archived_at = ?2 WHERE hash_pubcoin = ?3 AND archived = ?4",
            params![archived, archived_at, hash_pubcoin.to_hex(), !archived],
        )?;
        if updated == 0 {
            let what = if archived { "mint" } else { "archived mint" };
            return Err(Error::NotFound(format!("{} {}", what, hash_pubcoin)));
        }
        Ok(())
    }

    /// Mints with the given archive flag
    pub fn list_mints(&self, archived: bool) -> Result<Vec<Mint>> {
        let mut stmt = self.conn.prepare(
            "SELECT hash_pubcoin, payload FROM mints WHERE archived = ?1 ORDER BY hash_pubcoin",
        )?;
        let rows = stmt.query_map(params![archived], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, payload) = row?;
            let mint: Mint = serde_json::from_str(&payload)?;
            check_key(&key, &mint.hash_pubcoin(), "mint")?;
            out.push(mint);
        }
        Ok(out)
    }

    /// Insert or replace a zerocoin spend
    pub fn upsert_zerocoin_spend(&self, record: &ZerocoinSpendRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO zerocoin_spends
                (hash_serial, hash_pubcoin, txid, denomination, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.hash_serial.to_hex(),
                record.hash_pubcoin.to_hex(),
                record.txid.to_hex(),
                record.denomination.value(),
                serde_json::to_string(record)?,
            ],
        )?;
        Ok(())
    }

    /// Delete a zerocoin spend
    pub fn delete_zerocoin_spend(&self, hash_serial: &Hash256) -> Result<()> {
        let deleted = self.conn.execute(
            "DELETE FROM zerocoin_spends WHERE hash_serial = ?1",
            params![hash_serial.to_hex()],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("spend {}", hash_serial)));
        }
        Ok(())
    }

    /// All zerocoin spends
    pub fn list_zerocoin_spends(&self) -> Result<Vec<ZerocoinSpendRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT hash_serial, payload FROM zerocoin_spends ORDER BY hash_serial")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, payload) = row?;
            let record: ZerocoinSpendRecord = serde_json::from_str(&payload)?;
            check_key(&key, &record.hash_serial, "zerocoin spend")?;
            out.push(record);
        }
        Ok(out)
    }

    /// Spends recorded against one transaction
    pub fn zerocoin_spends_for_tx(&self, txid: &Hash256) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM zerocoin_spends WHERE txid = ?1",
            params![txid.to_hex()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn check_key(key: &str, expected: &Hash256, what: &str) -> Result<()> {
    if key != expected.to_hex() {
        return Err(Error::Corrupt(format!(
            "{} row {} holds {}",
            what, key, expected
        )));
    }
    Ok(())
}
