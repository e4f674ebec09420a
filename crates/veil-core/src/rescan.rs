//! Block-by-block rescan of the main chain

use crate::cancel::CancelToken;
use crate::chain::Chain;
use crate::manager::{WalletId, WalletManager};
use crate::primitives::Hash256;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const PROGRESS_INTERVAL: u32 = 1000;

/// How a rescan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RescanOutcome {
    /// Every block up to the tip `scanned_to` was scanned
    Complete {
        /// Height of the last block fed to the wallet
        scanned_to: u32,
    },
    /// The token was cancelled before `stopped_at` was scanned
    Cancelled {
        /// First height that was not scanned
        stopped_at: u32,
    },
    /// The block at `at` left the main chain during the scan
    Diverged {
        /// Height of the block that was reorganized away
        at: u32,
    },
}

impl RescanOutcome {
    /// True for [`RescanOutcome::Complete`].
    pub fn is_complete(&self) -> bool {
        matches!(self, RescanOutcome::Complete { .. })
    }
}

/// Feed every main-chain block from `start` to the tip through the wallet.
///
/// Both locks are released between blocks so other callers make progress.
/// After re-locking, the previously scanned block must still be on the main
/// chain; otherwise the scan stops and reports where it diverged.
pub fn rescan_from_height<C: Chain>(
    manager: &WalletManager<C>,
    id: &WalletId,
    start: u32,
    cancel: &CancelToken,
) -> Result<RescanOutcome> {
    let mut height = start;
    let mut last: Option<(u32, Hash256)> = None;
    tracing::info!("Rescanning wallet {} from height {}", id, start);

    loop {
        if cancel.is_cancelled() {
            tracing::info!("Rescan of wallet {} cancelled at height {}", id, height);
            return Ok(RescanOutcome::Cancelled { stopped_at: height });
        }

        let step = manager.with_wallet_write(id, |chain, wallet| -> Result<Option<RescanOutcome>> {
            let tip = chain.height();
            if height > tip {
                return Ok(Some(RescanOutcome::Complete { scanned_to: tip }));
            }
            let block = chain.block_at(height);
            if let Some((prev_height, prev_hash)) = last {
                if !chain.is_on_main_chain(&prev_hash) {
                    return Ok(Some(RescanOutcome::Diverged { at: prev_height }));
                }
            }
            let Some(block) = block else {
                return Ok(Some(RescanOutcome::Diverged { at: height }));
            };
            if !chain.is_on_main_chain(&block.hash) {
                return Ok(Some(RescanOutcome::Diverged { at: height }));
            }
            for (index, tx) in block.transactions.iter().enumerate() {
                wallet.sync_transaction(chain, Arc::clone(tx), Some((block.hash, index as u32)), false)?;
            }
            last = Some((height, block.hash));
            Ok(None)
        })??;

        if let Some(outcome) = step {
            match outcome {
                RescanOutcome::Diverged { at } => {
                    tracing::warn!("Rescan of wallet {} diverged at height {}", id, at)
                }
                _ => tracing::info!("Rescan of wallet {} finished: {:?}", id, outcome),
            }
            return Ok(outcome);
        }
        if height % PROGRESS_INTERVAL == 0 {
            tracing::debug!("Rescan of wallet {} reached height {}", id, height);
        }
        height += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainBlock, MintLocation};
    use crate::config::WalletConfig;
    use crate::keystore::IsMineFilter;
    use crate::primitives::{MutableTransaction, OutPoint, Output, Script, Transaction, TxIn};
    use crate::store::MemoryStore;
    use crate::testing::MockChain;
    use std::sync::atomic::{AtomicBool, Ordering};
    use veil_params::{Amount, NetworkType, COIN};

    fn pay(script: &Script, value: Amount, salt: u8) -> Arc<Transaction> {
        let mut tx = MutableTransaction::new();
        tx.inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([salt; 32]), 0)));
        tx.outputs.push(Output::standard(value, script.clone()));
        Arc::new(tx.freeze())
    }

    fn setup<C: Chain>(chain: C) -> (WalletManager<C>, WalletId, Script) {
        let manager = WalletManager::new(chain);
        let id = manager
            .create_wallet(
                WalletConfig::for_network(NetworkType::Regtest),
                Arc::new(MemoryStore::new()),
            )
            .unwrap();
        let script = manager
            .with_wallet_write(&id, |_, w| Script::pay_to_pubkey(&w.keystore_mut().generate_key()))
            .unwrap();
        (manager, id, script)
    }

    fn balance<C: Chain>(manager: &WalletManager<C>, id: &WalletId) -> Amount {
        manager
            .with_wallet_read(id, |chain, w| w.get_balance(chain, IsMineFilter::Spendable, 1))
            .unwrap()
    }

    #[test]
    fn test_rescan_finds_history() {
        let (manager, id, script) = setup(MockChain::new());
        {
            let chain = manager.chain().read();
            chain.mine_block(vec![pay(&script, 3 * COIN, 1)]);
            chain.mine_empty_blocks(2);
            chain.mine_block(vec![pay(&script, 2 * COIN, 2)]);
        }
        assert_eq!(balance(&manager, &id), 0);

        let outcome = rescan_from_height(&manager, &id, 1, &CancelToken::new()).unwrap();
        assert_eq!(outcome, RescanOutcome::Complete { scanned_to: 4 });
        assert_eq!(balance(&manager, &id), 5 * COIN);

        // A second pass does not double count
        rescan_from_height(&manager, &id, 1, &CancelToken::new()).unwrap();
        assert_eq!(balance(&manager, &id), 5 * COIN);
    }

    #[test]
    fn test_rescan_cancelled() {
        let (manager, id, script) = setup(MockChain::new());
        manager
            .chain()
            .read()
            .mine_block(vec![pay(&script, COIN, 1)]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = rescan_from_height(&manager, &id, 1, &cancel).unwrap();
        assert_eq!(outcome, RescanOutcome::Cancelled { stopped_at: 1 });
        assert_eq!(balance(&manager, &id), 0);
    }

    #[test]
    fn test_rescan_past_tip_is_complete() {
        let (manager, id, _) = setup(MockChain::new());
        manager.chain().read().mine_empty_blocks(2);
        let outcome = rescan_from_height(&manager, &id, 10, &CancelToken::new()).unwrap();
        assert_eq!(outcome, RescanOutcome::Complete { scanned_to: 2 });
        assert!(outcome.is_complete());
    }

    /// Chain that replaces its top blocks the first time `reorg_at` is read.
    struct ReorgingChain {
        inner: MockChain,
        reorg_at: u32,
        depth: u32,
        fired: AtomicBool,
    }

    impl Chain for ReorgingChain {
        fn height(&self) -> u32 {
            self.inner.height()
        }
        fn block_depth(&self, hash: &Hash256) -> Option<u32> {
            self.inner.block_depth(hash)
        }
        fn block_at(&self, height: u32) -> Option<ChainBlock> {
            if height == self.reorg_at && !self.fired.swap(true, Ordering::SeqCst) {
                for _ in 0..self.depth {
                    self.inner.disconnect_tip();
                }
                self.inner.mine_empty_blocks(self.depth + 1);
            }
            self.inner.block_at(height)
        }
        fn is_on_main_chain(&self, hash: &Hash256) -> bool {
            self.inner.is_on_main_chain(hash)
        }
        fn is_final(&self, tx: &Transaction) -> bool {
            self.inner.is_final(tx)
        }
        fn in_mempool(&self, txid: &Hash256) -> bool {
            self.inner.in_mempool(txid)
        }
        fn accept_to_mempool(
            &self,
            tx: &Arc<Transaction>,
            max_fee: Amount,
            test_accept: bool,
        ) -> std::result::Result<(), String> {
            self.inner.accept_to_mempool(tx, max_fee, test_accept)
        }
        fn relay(&self, tx: &Arc<Transaction>) -> bool {
            self.inner.relay(tx)
        }
        fn is_serial_in_chain(&self, hash_serial: &Hash256) -> Option<Hash256> {
            self.inner.is_serial_in_chain(hash_serial)
        }
        fn remove_serial(&self, hash_serial: &Hash256) {
            self.inner.remove_serial(hash_serial)
        }
        fn mint_in_chain(&self, hash_pubcoin: &Hash256) -> Option<MintLocation> {
            self.inner.mint_in_chain(hash_pubcoin)
        }
        fn accumulator_checkpoint(&self, height: u32) -> Option<Hash256> {
            self.inner.accumulator_checkpoint(height)
        }
    }

    #[test]
    fn test_rescan_stops_at_divergence() {
        let inner = MockChain::new();
        inner.mine_empty_blocks(5);
        let (manager, id, _) = setup(ReorgingChain {
            inner,
            reorg_at: 4,
            depth: 3,
            fired: AtomicBool::new(false),
        });
        // Blocks 3..=5 are replaced while block 4 is read, so block 3 is stale
        let outcome = rescan_from_height(&manager, &id, 1, &CancelToken::new()).unwrap();
        assert_eq!(outcome, RescanOutcome::Diverged { at: 3 });
    }
}
