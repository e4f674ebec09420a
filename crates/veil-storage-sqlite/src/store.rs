//! [`WalletStore`] backed by SQLite

use crate::{Database, Repository, Result};
use parking_lot::Mutex;
use std::path::Path;
use veil_core::primitives::Hash256;
use veil_core::store::{StoreResult, WalletStore, WalletTxRecord, ZerocoinSpendRecord};
use veil_core::zerocoin::{Mint, MintMeta};
use veil_core::TransactionRecord;

/// Wallet store on a single SQLite connection.
///
/// Calls are serialized on the connection; each one is a single statement and
/// therefore atomic.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Store on an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    /// Wrap an open database.
    pub fn from_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Number of spend rows recorded for `txid`.
    pub fn zerocoin_spends_for_tx(&self, txid: &Hash256) -> Result<usize> {
        let db = self.db.lock();
        Repository::new(db.conn()).zerocoin_spends_for_tx(txid)
    }

    fn with_repo<T>(&self, op: &str, f: impl FnOnce(&Repository<'_>) -> Result<T>) -> StoreResult<T> {
        let db = self.db.lock();
        f(&Repository::new(db.conn())).map_err(|e| {
            tracing::warn!("Store {} failed: {}", op, e);
            e.into()
        })
    }
}

impl WalletStore for SqliteStore {
    fn write_tx(&self, record: &WalletTxRecord) -> StoreResult<()> {
        self.with_repo("write_tx", |r| r.upsert_tx(record))
    }

    fn erase_tx(&self, txid: &Hash256) -> StoreResult<()> {
        self.with_repo("erase_tx", |r| r.delete_tx(txid))
    }

    fn load_txs(&self) -> StoreResult<Vec<WalletTxRecord>> {
        self.with_repo("load_txs", |r| r.list_txs())
    }

    fn write_output_record(&self, txid: &Hash256, record: &TransactionRecord) -> StoreResult<()> {
        self.with_repo("write_output_record", |r| r.upsert_output_record(txid, record))
    }

    fn load_output_records(&self) -> StoreResult<Vec<(Hash256, TransactionRecord)>> {
        self.with_repo("load_output_records", |r| r.list_output_records())
    }

    fn write_mint(&self, mint: &Mint) -> StoreResult<()> {
        self.with_repo("write_mint", |r| r.upsert_mint(mint))
    }

    fn erase_deterministic_mint(&self, hash_pubcoin: &Hash256) -> StoreResult<()> {
        self.with_repo("erase_deterministic_mint", |r| r.delete_mint(hash_pubcoin))
    }

    fn load_mints(&self) -> StoreResult<Vec<Mint>> {
        self.with_repo("load_mints", |r| r.list_mints(false))
    }

    fn archive_mint(&self, meta: &MintMeta) -> StoreResult<()> {
        self.with_repo("archive_mint", |r| r.set_mint_archived(&meta.hash_pubcoin, true))
    }

    fn unarchive_mint(&self, hash_pubcoin: &Hash256) -> StoreResult<()> {
        self.with_repo("unarchive_mint", |r| r.set_mint_archived(hash_pubcoin, false))
    }

    fn load_archived_mints(&self) -> StoreResult<Vec<Mint>> {
        self.with_repo("load_archived_mints", |r| r.list_mints(true))
    }

    fn write_zerocoin_spend(&self, record: &ZerocoinSpendRecord) -> StoreResult<()> {
        self.with_repo("write_zerocoin_spend", |r| r.upsert_zerocoin_spend(record))
    }

    fn erase_zerocoin_spend(&self, hash_serial: &Hash256) -> StoreResult<()> {
        self.with_repo("erase_zerocoin_spend", |r| r.delete_zerocoin_spend(hash_serial))
    }

    fn load_zerocoin_spends(&self) -> StoreResult<Vec<ZerocoinSpendRecord>> {
        self.with_repo("load_zerocoin_spends", |r| r.list_zerocoin_spends())
    }
}
