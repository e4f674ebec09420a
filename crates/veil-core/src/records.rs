//! Output records for blinded and anonymous outputs
//!
//! Blinded outputs carry no plaintext value on-chain. The scanner that unblinds
//! them records what it learned here, and the balance and filter code read it back.

use crate::primitives::{Hash256, OutputKind, Script};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use veil_params::Amount;

/// Output belongs to the wallet
pub const ORF_OWNED: u8 = 1 << 0;
/// Output was sent by the wallet
pub const ORF_FROM: u8 = 1 << 1;
/// Output is change
pub const ORF_CHANGE: u8 = 1 << 2;
/// Output has been spent
pub const ORF_SPENT: u8 = 1 << 3;
/// Output is locked
pub const ORF_LOCKED: u8 = 1 << 4;
/// Output is watch-only
pub const ORF_WATCHONLY: u8 = 1 << 6;
/// A spend of this output is waiting for confirmation
pub const ORF_PENDING_SPEND: u8 = 1 << 7;

/// What the wallet knows about one output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Output kind
    pub kind: OutputKind,
    /// `ORF_*` flags
    pub flags: u8,
    /// Output index
    pub n: u32,
    /// Unblinded value
    pub value: Amount,
    /// Destination script, when known
    pub script_pubkey: Option<Script>,
    /// Attached narration
    pub narration: Option<String>,
}

impl OutputRecord {
    /// Owned output of `kind` at index `n` worth `value`.
    pub fn owned(kind: OutputKind, n: u32, value: Amount) -> Self {
        Self {
            kind,
            flags: ORF_OWNED,
            n,
            value,
            script_pubkey: None,
            narration: None,
        }
    }

    /// True when every bit of `flag` is set.
    pub fn is(&self, flag: u8) -> bool {
        self.flags & flag == flag
    }

    /// Set or clear `flag`.
    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }
}

/// Output records of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Records ordered by output index
    pub outputs: Vec<OutputRecord>,
    /// Fee paid, when the wallet created the transaction
    pub fee: Amount,
}

impl TransactionRecord {
    /// Record for output `n`.
    pub fn output(&self, n: u32) -> Option<&OutputRecord> {
        self.outputs.iter().find(|r| r.n == n)
    }

    /// Mutable record for output `n`.
    pub fn output_mut(&mut self, n: u32) -> Option<&mut OutputRecord> {
        self.outputs.iter_mut().find(|r| r.n == n)
    }

    /// Insert or replace the record for its output index.
    pub fn insert(&mut self, record: OutputRecord) {
        match self.outputs.iter_mut().find(|r| r.n == record.n) {
            Some(existing) => *existing = record,
            None => {
                self.outputs.push(record);
                self.outputs.sort_by_key(|r| r.n);
            }
        }
    }
}

/// Output records for every transaction that touches a blinded output.
#[derive(Debug, Clone, Default)]
pub struct AnonLedger {
    records: BTreeMap<Hash256, TransactionRecord>,
}

impl AnonLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record of `txid`.
    pub fn get(&self, txid: &Hash256) -> Option<&TransactionRecord> {
        self.records.get(txid)
    }

    /// Output record `n` of `txid`.
    pub fn output(&self, txid: &Hash256, n: u32) -> Option<&OutputRecord> {
        self.records.get(txid).and_then(|r| r.output(n))
    }

    /// True when the ledger knows `txid`.
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.records.contains_key(txid)
    }

    /// Insert or replace the record of `txid`.
    pub fn insert(&mut self, txid: Hash256, record: TransactionRecord) {
        self.records.insert(txid, record);
    }

    /// Set or clear `flag` on output `n` of `txid`.
    pub fn set_flag(&mut self, txid: &Hash256, n: u32, flag: u8, on: bool) -> bool {
        match self.records.get_mut(txid).and_then(|r| r.output_mut(n)) {
            Some(rec) => {
                rec.set(flag, on);
                true
            }
            None => false,
        }
    }

    /// Every record.
    pub fn iter(&self) -> impl Iterator<Item = (&Hash256, &TransactionRecord)> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let mut rec = OutputRecord::owned(OutputKind::RingCt, 1, 500);
        assert!(rec.is(ORF_OWNED));
        rec.set(ORF_SPENT, true);
        assert!(rec.is(ORF_OWNED | ORF_SPENT));
        rec.set(ORF_SPENT, false);
        assert!(!rec.is(ORF_SPENT));
    }

    #[test]
    fn test_ledger_insert_and_flag() {
        let txid = Hash256::from_bytes([4u8; 32]);
        let mut record = TransactionRecord::default();
        record.insert(OutputRecord::owned(OutputKind::Ct, 2, 10));
        record.insert(OutputRecord::owned(OutputKind::Ct, 0, 20));
        assert_eq!(record.outputs[0].n, 0);

        let mut ledger = AnonLedger::new();
        ledger.insert(txid, record);
        assert!(ledger.set_flag(&txid, 2, ORF_SPENT, true));
        assert!(ledger.output(&txid, 2).unwrap().is(ORF_SPENT));
        assert!(!ledger.set_flag(&txid, 7, ORF_SPENT, true));
    }
}
