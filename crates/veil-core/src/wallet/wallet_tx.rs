//! Wallet transactions and their confirmation state

use crate::chain::Chain;
use crate::keystore::IsMineFilter;
use crate::primitives::{Hash256, Transaction};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use veil_params::Amount;

/// Where a wallet transaction stands relative to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TxState {
    /// Not in a block
    Unconfirmed,
    /// Included in `block_hash` at position `index`
    Confirmed {
        /// Containing block
        block_hash: Hash256,
        /// Position in the block
        index: u32,
    },
    /// Conflicts with a transaction in `block_hash`
    Conflicted {
        /// Block holding the conflicting transaction
        block_hash: Hash256,
    },
    /// Given up on by the user
    Abandoned,
}

/// Memoized per-filter amounts.
#[derive(Debug, Clone, Default)]
pub(crate) struct AmountCache {
    pub debit: [Option<Amount>; 3],
    pub credit: [Option<Amount>; 3],
    pub available_credit: [Option<Amount>; 3],
    pub change: Option<Amount>,
}

/// A transaction relevant to the wallet.
pub struct WalletTx {
    /// The transaction
    pub tx: Arc<Transaction>,
    /// First seen
    pub time_received: DateTime<Utc>,
    /// Display time
    pub time_smart: DateTime<Utc>,
    /// Created by this wallet
    pub from_me: bool,
    /// Currently in the node's mempool
    pub in_mempool: bool,
    /// Insertion order
    pub order_pos: i64,
    /// Confirmation state
    pub state: TxState,
    /// Transaction this one replaces (fee bump)
    pub replaces_txid: Option<Hash256>,
    /// Transaction that replaced this one
    pub replaced_by_txid: Option<Hash256>,
    pub(crate) cache: Mutex<AmountCache>,
}

impl WalletTx {
    /// Unconfirmed wallet transaction first seen at `time_received`.
    pub fn new(tx: Arc<Transaction>, time_received: DateTime<Utc>) -> Self {
        Self {
            tx,
            time_received,
            time_smart: time_received,
            from_me: false,
            in_mempool: false,
            order_pos: -1,
            state: TxState::Unconfirmed,
            replaces_txid: None,
            replaced_by_txid: None,
            cache: Mutex::new(AmountCache::default()),
        }
    }

    /// Transaction id.
    pub fn hash(&self) -> Hash256 {
        self.tx.hash()
    }

    /// Drop every memoized amount.
    pub fn mark_dirty(&self) {
        *self.cache.lock() = AmountCache::default();
    }

    /// True when the user abandoned this transaction.
    pub fn is_abandoned(&self) -> bool {
        self.state == TxState::Abandoned
    }

    /// Containing block, when confirmed.
    pub fn block_hash(&self) -> Option<Hash256> {
        match self.state {
            TxState::Confirmed { block_hash, .. } => Some(block_hash),
            _ => None,
        }
    }

    /// Confirmations: positive in the main chain, negative when conflicted, else 0.
    ///
    /// A confirmed transaction whose block left the main chain has depth 0.
    pub fn depth(&self, chain: &dyn Chain) -> i32 {
        match self.state {
            TxState::Confirmed { block_hash, .. } => chain
                .block_depth(&block_hash)
                .map(|d| d as i32)
                .unwrap_or(0),
            TxState::Conflicted { block_hash } => chain
                .block_depth(&block_hash)
                .map(|d| -(d as i32))
                .unwrap_or(0),
            TxState::Unconfirmed | TxState::Abandoned => 0,
        }
    }

    /// Blocks left until a coinbase or coinstake output may be spent.
    pub fn blocks_to_maturity(&self, chain: &dyn Chain, maturity: u32) -> i32 {
        if !(self.tx.is_coinbase() || self.tx.is_coinstake()) {
            return 0;
        }
        (maturity as i32 + 1 - self.depth(chain)).max(0)
    }

    /// True for a reward transaction still below maturity.
    pub fn is_immature(&self, chain: &dyn Chain, maturity: u32) -> bool {
        self.blocks_to_maturity(chain, maturity) > 0
    }

    /// True for a reward transaction below maturity whose block is still in the main chain.
    ///
    /// Orphaned coinbase and coinstake transactions are immature forever and
    /// never count towards the immature balance.
    pub fn is_immature_in_main_chain(&self, chain: &dyn Chain, maturity: u32) -> bool {
        self.depth(chain) > 0 && self.is_immature(chain, maturity)
    }

    pub(crate) fn cached(
        &self,
        pick: impl Fn(&mut AmountCache) -> &mut [Option<Amount>; 3],
        filter: IsMineFilter,
        compute: impl FnOnce() -> Amount,
    ) -> Amount {
        if let Some(v) = pick(&mut self.cache.lock())[filter.index()] {
            return v;
        }
        let value = compute();
        pick(&mut self.cache.lock())[filter.index()] = Some(value);
        value
    }
}

impl Clone for WalletTx {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
            time_received: self.time_received,
            time_smart: self.time_smart,
            from_me: self.from_me,
            in_mempool: self.in_mempool,
            order_pos: self.order_pos,
            state: self.state,
            replaces_txid: self.replaces_txid,
            replaced_by_txid: self.replaced_by_txid,
            cache: Mutex::new(self.cache.lock().clone()),
        }
    }
}

impl std::fmt::Debug for WalletTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletTx")
            .field("hash", &self.hash())
            .field("state", &self.state)
            .field("from_me", &self.from_me)
            .field("in_mempool", &self.in_mempool)
            .field("order_pos", &self.order_pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{MutableTransaction, Output, Script};
    use crate::testing::MockChain;

    fn wtx() -> WalletTx {
        let mut tx = MutableTransaction::new();
        tx.outputs.push(Output::standard(1, Script::new()));
        WalletTx::new(Arc::new(tx.freeze()), Utc::now())
    }

    #[test]
    fn test_depth_follows_chain() {
        let chain = MockChain::new();
        let block = chain.mine_empty_blocks(3)[0];
        let mut w = wtx();
        assert_eq!(w.depth(&chain), 0);

        w.state = TxState::Confirmed {
            block_hash: block,
            index: 0,
        };
        assert_eq!(w.depth(&chain), 3);

        w.state = TxState::Conflicted { block_hash: block };
        assert_eq!(w.depth(&chain), -3);

        chain.disconnect_tip();
        chain.disconnect_tip();
        chain.disconnect_tip();
        w.state = TxState::Confirmed {
            block_hash: block,
            index: 0,
        };
        assert_eq!(w.depth(&chain), 0);
    }

    #[test]
    fn test_cache_memoizes_until_dirty() {
        let w = wtx();
        let first = w.cached(|c| &mut c.credit, IsMineFilter::All, || 7);
        let second = w.cached(|c| &mut c.credit, IsMineFilter::All, || 99);
        assert_eq!((first, second), (7, 7));
        w.mark_dirty();
        assert_eq!(w.cached(|c| &mut c.credit, IsMineFilter::All, || 99), 99);
    }

    #[test]
    fn test_state_serde() {
        let state = TxState::Confirmed {
            block_hash: Hash256::from_bytes([1u8; 32]),
            index: 4,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("confirmed"));
        assert_eq!(serde_json::from_str::<TxState>(&json).unwrap(), state);
    }
}
