//! Chain, mempool and relay interface
//!
//! The wallet never owns chain state. Everything it needs from the node goes
//! through [`Chain`], which callers guard with the chain lock.

use crate::fees::FeeRate;
use crate::primitives::{Hash256, Transaction};
use std::sync::Arc;
use veil_params::Amount;

/// A block on the main chain, as seen by a rescan.
#[derive(Debug, Clone)]
pub struct ChainBlock {
    /// Block hash
    pub hash: Hash256,
    /// Block height
    pub height: u32,
    /// Transactions in block order
    pub transactions: Vec<Arc<Transaction>>,
}

/// Location of a confirmed zerocoin mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintLocation {
    /// Height of the containing block
    pub height: u32,
    /// Mint transaction id
    pub txid: Hash256,
}

/// Node-side view the wallet depends on.
pub trait Chain: Send + Sync {
    /// Height of the active tip.
    fn height(&self) -> u32;

    /// Depth of `block_hash` (tip = 1), or `None` when it is not on the main chain.
    fn block_depth(&self, block_hash: &Hash256) -> Option<u32>;

    /// Main-chain block at `height`.
    fn block_at(&self, height: u32) -> Option<ChainBlock>;

    /// True when the block is on the main chain.
    fn is_on_main_chain(&self, block_hash: &Hash256) -> bool {
        self.block_depth(block_hash).is_some()
    }

    /// True when `tx` could be mined in the next block.
    fn is_final(&self, tx: &Transaction) -> bool;

    /// True when the mempool holds `txid`.
    fn in_mempool(&self, txid: &Hash256) -> bool;

    /// Submit `tx` to the mempool, or only check acceptance when `test_accept`.
    ///
    /// Fails with the rejection reason.
    fn accept_to_mempool(
        &self,
        tx: &Arc<Transaction>,
        max_fee: Amount,
        test_accept: bool,
    ) -> std::result::Result<(), String>;

    /// Announce a mempool transaction to peers.
    fn relay(&self, tx: &Arc<Transaction>) -> bool;

    /// Transaction that spent the serial with hash `hash_serial`, if confirmed.
    fn is_serial_in_chain(&self, hash_serial: &Hash256) -> Option<Hash256>;

    /// Drop a serial from the node's spent-serial index.
    fn remove_serial(&self, hash_serial: &Hash256);

    /// Where a mint with pubcoin hash `hash_pubcoin` confirmed.
    fn mint_in_chain(&self, hash_pubcoin: &Hash256) -> Option<MintLocation>;

    /// Accumulator checkpoint used to build spend witnesses.
    fn accumulator_checkpoint(&self, height: u32) -> Option<Hash256>;

    /// Mempool ancestor and descendant counts of `txid`.
    fn transaction_ancestry(&self, _txid: &Hash256) -> (usize, usize) {
        (0, 0)
    }

    /// Fee estimate for confirmation within `confirm_target` blocks.
    fn estimate_fee(&self, _confirm_target: u32) -> Option<FeeRate> {
        None
    }
}
