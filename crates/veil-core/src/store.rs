//! Wallet persistence interface
//!
//! Every call is atomic on its own. Callers that need several writes to land
//! together sequence them and roll back on failure.

use crate::primitives::{Hash256, Transaction};
use crate::records::TransactionRecord;
use crate::wallet::{TxState, WalletTx};
use crate::zerocoin::{Denomination, Mint, MintMeta};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Persistence failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend refused the operation
    #[error("backend: {0}")]
    Backend(String),

    /// Record to erase or update does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored payload could not be read back
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Store result type
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persisted wallet transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTxRecord {
    /// Transaction id
    pub txid: Hash256,
    /// Full transaction encoding, hex
    pub raw_hex: String,
    /// When the wallet first saw it
    pub time_received: DateTime<Utc>,
    /// Display time
    pub time_smart: DateTime<Utc>,
    /// Created by this wallet
    pub from_me: bool,
    /// Insertion order
    pub order_pos: i64,
    /// Confirmation state
    pub state: TxState,
    /// Transaction this one replaces
    pub replaces_txid: Option<Hash256>,
    /// Transaction that replaced this one
    pub replaced_by_txid: Option<Hash256>,
}

impl WalletTxRecord {
    /// Snapshot of `wtx`.
    pub fn from_wallet_tx(wtx: &WalletTx) -> Self {
        Self {
            txid: wtx.tx.hash(),
            raw_hex: hex::encode(wtx.tx.to_bytes()),
            time_received: wtx.time_received,
            time_smart: wtx.time_smart,
            from_me: wtx.from_me,
            order_pos: wtx.order_pos,
            state: wtx.state,
            replaces_txid: wtx.replaces_txid,
            replaced_by_txid: wtx.replaced_by_txid,
        }
    }

    /// Rebuild the wallet transaction.
    pub fn to_wallet_tx(&self) -> StoreResult<WalletTx> {
        let bytes = hex::decode(&self.raw_hex)
            .map_err(|e| StoreError::Corrupt(format!("tx {}: {}", self.txid, e)))?;
        let tx = Transaction::from_bytes(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("tx {}: {}", self.txid, e)))?;
        if tx.hash() != self.txid {
            return Err(StoreError::Corrupt(format!("tx {} hash mismatch", self.txid)));
        }
        let mut wtx = WalletTx::new(Arc::new(tx), self.time_received);
        wtx.time_smart = self.time_smart;
        wtx.from_me = self.from_me;
        wtx.order_pos = self.order_pos;
        wtx.state = self.state;
        wtx.replaces_txid = self.replaces_txid;
        wtx.replaced_by_txid = self.replaced_by_txid;
        Ok(wtx)
    }
}

/// Persisted zerocoin spend, keyed by serial hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZerocoinSpendRecord {
    /// Serial hash
    pub hash_serial: Hash256,
    /// Pubcoin hash of the spent mint
    pub hash_pubcoin: Hash256,
    /// Spending transaction
    pub txid: Hash256,
    /// Denomination spent
    pub denomination: Denomination,
}

/// Wallet persistence.
pub trait WalletStore: Send + Sync {
    /// Insert or replace a transaction.
    fn write_tx(&self, record: &WalletTxRecord) -> StoreResult<()>;
    /// Delete a transaction.
    fn erase_tx(&self, txid: &Hash256) -> StoreResult<()>;
    /// All transactions.
    fn load_txs(&self) -> StoreResult<Vec<WalletTxRecord>>;

    /// Insert or replace the output records of `txid`.
    fn write_output_record(&self, txid: &Hash256, record: &TransactionRecord) -> StoreResult<()>;
    /// All output records.
    fn load_output_records(&self) -> StoreResult<Vec<(Hash256, TransactionRecord)>>;

    /// Insert or replace a mint.
    fn write_mint(&self, mint: &Mint) -> StoreResult<()>;
    /// Delete a deterministic mint by pubcoin hash.
    fn erase_deterministic_mint(&self, hash_pubcoin: &Hash256) -> StoreResult<()>;
    /// All active mints.
    fn load_mints(&self) -> StoreResult<Vec<Mint>>;
    /// Move a mint to the archive.
    fn archive_mint(&self, meta: &MintMeta) -> StoreResult<()>;
    /// Move a mint back from the archive.
    fn unarchive_mint(&self, hash_pubcoin: &Hash256) -> StoreResult<()>;
    /// All archived mints.
    fn load_archived_mints(&self) -> StoreResult<Vec<Mint>>;

    /// Record a zerocoin spend.
    fn write_zerocoin_spend(&self, record: &ZerocoinSpendRecord) -> StoreResult<()>;
    /// Delete a zerocoin spend by serial hash.
    fn erase_zerocoin_spend(&self, hash_serial: &Hash256) -> StoreResult<()>;
    /// All zerocoin spends.
    fn load_zerocoin_spends(&self) -> StoreResult<Vec<ZerocoinSpendRecord>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    txs: BTreeMap<Hash256, WalletTxRecord>,
    records: BTreeMap<Hash256, TransactionRecord>,
    mints: BTreeMap<Hash256, Mint>,
    archived: BTreeMap<Hash256, Mint>,
    spends: BTreeMap<Hash256, ZerocoinSpendRecord>,
    fail_ops: HashSet<&'static str>,
    writes: usize,
}

/// In-memory store. Individual operations can be made to fail for rollback tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call of `op` (e.g. `"erase_zerocoin_spend"`) fail.
    pub fn fail_on(&self, op: &'static str) {
        self.state.lock().fail_ops.insert(op);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.state.lock().fail_ops.clear();
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    fn check(state: &MemoryState, op: &'static str) -> StoreResult<()> {
        if state.fail_ops.contains(op) {
            return Err(StoreError::Backend(format!("{} failed", op)));
        }
        Ok(())
    }
}

impl WalletStore for MemoryStore {
    fn write_tx(&self, record: &WalletTxRecord) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "write_tx")?;
        s.txs.insert(record.txid, record.clone());
        s.writes += 1;
        Ok(())
    }

    fn erase_tx(&self, txid: &Hash256) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "erase_tx")?;
        s.txs.remove(txid);
        Ok(())
    }

    fn load_txs(&self) -> StoreResult<Vec<WalletTxRecord>> {
        Ok(self.state.lock().txs.values().cloned().collect())
    }

    fn write_output_record(&self, txid: &Hash256, record: &TransactionRecord) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "write_output_record")?;
        s.records.insert(*txid, record.clone());
        s.writes += 1;
        Ok(())
    }

    fn load_output_records(&self) -> StoreResult<Vec<(Hash256, TransactionRecord)>> {
        Ok(self
            .state
            .lock()
            .records
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn write_mint(&self, mint: &Mint) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "write_mint")?;
        s.mints.insert(mint.hash_pubcoin(), mint.clone());
        s.writes += 1;
        Ok(())
    }

    fn erase_deterministic_mint(&self, hash_pubcoin: &Hash256) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "erase_deterministic_mint")?;
        s.mints
            .remove(hash_pubcoin)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("mint {}", hash_pubcoin)))
    }

    fn load_mints(&self) -> StoreResult<Vec<Mint>> {
        Ok(self.state.lock().mints.values().cloned().collect())
    }

    fn archive_mint(&self, meta: &MintMeta) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "archive_mint")?;
        let mint = s
            .mints
            .remove(&meta.hash_pubcoin)
            .ok_or_else(|| StoreError::NotFound(format!("mint {}", meta.hash_pubcoin)))?;
        s.archived.insert(meta.hash_pubcoin, mint);
        Ok(())
    }

    fn unarchive_mint(&self, hash_pubcoin: &Hash256) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "unarchive_mint")?;
        let mint = s
            .archived
            .remove(hash_pubcoin)
            .ok_or_else(|| StoreError::NotFound(format!("archived mint {}", hash_pubcoin)))?;
        s.mints.insert(*hash_pubcoin, mint);
        Ok(())
    }

    fn load_archived_mints(&self) -> StoreResult<Vec<Mint>> {
        Ok(self.state.lock().archived.values().cloned().collect())
    }

    fn write_zerocoin_spend(&self, record: &ZerocoinSpendRecord) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "write_zerocoin_spend")?;
        s.spends.insert(record.hash_serial, record.clone());
        s.writes += 1;
        Ok(())
    }

    fn erase_zerocoin_spend(&self, hash_serial: &Hash256) -> StoreResult<()> {
        let mut s = self.state.lock();
        Self::check(&s, "erase_zerocoin_spend")?;
        s.spends
            .remove(hash_serial)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("spend {}", hash_serial)))
    }

    fn load_zerocoin_spends(&self) -> StoreResult<Vec<ZerocoinSpendRecord>> {
        Ok(self.state.lock().spends.values().cloned().collect())
    }
}
