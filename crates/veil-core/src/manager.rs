//! Wallet registry and lock ordering
//!
//! The manager owns the chain lock and one lock per wallet. Every path that
//! needs both takes the chain lock first, then the wallet lock.

use crate::available::OutputCandidate;
use crate::chain::{Chain, ChainBlock};
use crate::coin_control::CoinControl;
use crate::config::WalletConfig;
use crate::primitives::{Hash256, Transaction};
use crate::store::WalletStore;
use crate::transaction::Recipient;
use crate::wallet::{BalanceList, Wallet};
use crate::zerocoin::{ZerocoinProver, ZerocoinSpendReceipt, ZerocoinSpendRequest};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Identifies a wallet held by a [`WalletManager`].
pub type WalletId = Uuid;

/// Registry of wallets sharing one chain.
pub struct WalletManager<C: Chain> {
    chain: Arc<RwLock<C>>,
    wallets: RwLock<HashMap<WalletId, Arc<RwLock<Wallet>>>>,
}

impl<C: Chain> WalletManager<C> {
    /// Manager over `chain` with no wallets.
    pub fn new(chain: C) -> Self {
        Self::with_shared_chain(Arc::new(RwLock::new(chain)))
    }

    /// Manager over a chain lock shared with the node.
    pub fn with_shared_chain(chain: Arc<RwLock<C>>) -> Self {
        Self {
            chain,
            wallets: RwLock::new(HashMap::new()),
        }
    }

    /// The chain lock.
    pub fn chain(&self) -> &Arc<RwLock<C>> {
        &self.chain
    }

    /// Create an empty wallet.
    pub fn create_wallet(
        &self,
        config: WalletConfig,
        store: Arc<dyn WalletStore>,
    ) -> Result<WalletId> {
        let wallet = Wallet::new(config, store)?;
        Ok(self.insert_wallet(wallet))
    }

    /// Load a wallet from its store.
    pub fn load_wallet(&self, config: WalletConfig, store: Arc<dyn WalletStore>) -> Result<WalletId> {
        let wallet = Wallet::load(config, store)?;
        Ok(self.insert_wallet(wallet))
    }

    /// Register an existing wallet.
    pub fn insert_wallet(&self, wallet: Wallet) -> WalletId {
        let id = Uuid::new_v4();
        self.wallets
            .write()
            .insert(id, Arc::new(RwLock::new(wallet)));
        tracing::info!("Registered wallet {}", id);
        id
    }

    /// Drop a wallet from the registry.
    pub fn remove_wallet(&self, id: &WalletId) -> Result<()> {
        self.wallets
            .write()
            .remove(id)
            .map(|_| tracing::info!("Removed wallet {}", id))
            .ok_or_else(|| Error::WalletNotFound(id.to_string()))
    }

    /// Registered wallet ids, sorted.
    pub fn wallet_ids(&self) -> Vec<WalletId> {
        let mut ids: Vec<WalletId> = self.wallets.read().keys().copied().collect();
        ids.sort();
        ids
    }

    fn wallet(&self, id: &WalletId) -> Result<Arc<RwLock<Wallet>>> {
        self.wallets
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::WalletNotFound(id.to_string()))
    }

    /// Run `f` under the chain read lock and the wallet read lock.
    pub fn with_wallet_read<R>(&self, id: &WalletId, f: impl FnOnce(&C, &Wallet) -> R) -> Result<R> {
        let wallet = self.wallet(id)?;
        let chain = self.chain.read();
        let guard = wallet.read();
        Ok(f(&chain, &guard))
    }

    /// Run `f` under the chain read lock and the wallet write lock.
    pub fn with_wallet_write<R>(
        &self,
        id: &WalletId,
        f: impl FnOnce(&C, &mut Wallet) -> R,
    ) -> Result<R> {
        let wallet = self.wallet(id)?;
        let chain = self.chain.read();
        let mut guard = wallet.write();
        Ok(f(&chain, &mut guard))
    }

    /// Balances of every privacy mode.
    pub fn get_balances(&self, id: &WalletId, min_depth: u32) -> Result<BalanceList> {
        self.with_wallet_read(id, |chain, w| w.get_balances(chain, min_depth))
    }

    /// Unspent outputs of the `kinds` mask between the two depths.
    pub fn list_unspent(
        &self,
        id: &WalletId,
        min_depth: i32,
        max_depth: i32,
        kinds: u8,
    ) -> Result<Vec<OutputCandidate>> {
        self.with_wallet_read(id, |chain, w| w.list_unspent(chain, min_depth, max_depth, kinds))
    }

    /// Build, commit and relay a payment.
    pub fn create_and_send_transaction(
        &self,
        id: &WalletId,
        recipients: &[Recipient],
        coin_control: &CoinControl,
    ) -> Result<Hash256> {
        self.with_wallet_write(id, |chain, w| {
            w.create_and_send_transaction(chain, recipients, coin_control)
        })?
    }

    /// Abandon an unconfirmed transaction and its descendants.
    pub fn abandon_transaction(&self, id: &WalletId, hash: &Hash256) -> Result<Vec<Hash256>> {
        self.with_wallet_write(id, |chain, w| w.abandon_transaction(chain, hash))?
    }

    /// Spend zerocoins.
    pub fn spend_zerocoin(
        &self,
        id: &WalletId,
        prover: &dyn ZerocoinProver,
        request: &ZerocoinSpendRequest,
    ) -> Result<ZerocoinSpendReceipt> {
        self.with_wallet_write(id, |chain, w| w.spend_zerocoin(chain, prover, request))?
    }

    /// Deliver a connected block to every wallet.
    pub fn block_connected(&self, block: &ChainBlock) -> Result<()> {
        for id in self.wallet_ids() {
            self.with_wallet_write(&id, |chain, w| w.block_connected(chain, block))??;
        }
        Ok(())
    }

    /// Deliver a disconnected block to every wallet.
    pub fn block_disconnected(&self, block: &ChainBlock) -> Result<()> {
        for id in self.wallet_ids() {
            self.with_wallet_write(&id, |chain, w| w.block_disconnected(chain, block))??;
        }
        Ok(())
    }

    /// Deliver a transaction that entered the mempool.
    pub fn transaction_added_to_mempool(&self, tx: &Arc<Transaction>) -> Result<()> {
        for id in self.wallet_ids() {
            self.with_wallet_write(&id, |chain, w| {
                w.sync_transaction(chain, Arc::clone(tx), None, true)
            })??;
        }
        Ok(())
    }

    /// Deliver a transaction that left the mempool.
    pub fn transaction_removed_from_mempool(&self, txid: &Hash256) {
        for id in self.wallet_ids() {
            // The wallet may have been removed since the ids were read
            let _ = self.with_wallet_write(&id, |_, w| w.transaction_removed_from_mempool(txid));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::IsMineFilter;
    use crate::primitives::{MutableTransaction, OutPoint, Output, Script, TxIn};
    use crate::store::MemoryStore;
    use crate::testing::MockChain;
    use std::thread;
    use veil_params::{NetworkType, COIN};

    fn manager() -> (Arc<WalletManager<MockChain>>, WalletId, Script) {
        let manager = Arc::new(WalletManager::new(MockChain::new()));
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

    fn fund(manager: &WalletManager<MockChain>, script: &Script, value: i64, salt: u8) {
        let mut tx = MutableTransaction::new();
        tx.inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([salt; 32]), 0)));
        tx.outputs.push(Output::standard(value, script.clone()));
        let block = {
            let chain = manager.chain().read();
            chain.mine_block(vec![Arc::new(tx.freeze())]);
            chain.tip_block().unwrap()
        };
        manager.block_connected(&block).unwrap();
    }

    #[test]
    fn test_registry() {
        let (manager, id, _) = manager();
        assert_eq!(manager.wallet_ids(), vec![id]);
        manager.remove_wallet(&id).unwrap();
        assert!(matches!(
            manager.get_balances(&id, 0),
            Err(Error::WalletNotFound(_))
        ));
        assert!(manager.remove_wallet(&id).is_err());
    }

    #[test]
    fn test_send_through_manager() {
        let (manager, id, script) = manager();
        fund(&manager, &script, 10 * COIN, 1);
        assert_eq!(manager.get_balances(&id, 1).unwrap().basecoin_spendable, 10 * COIN);

        let txid = manager
            .create_and_send_transaction(
                &id,
                &[Recipient::new(Script::pay_to_pubkey(&[2u8; 33]), COIN)],
                &CoinControl::default(),
            )
            .unwrap();
        assert!(manager.chain().read().in_mempool(&txid));
    }

    #[test]
    fn test_concurrent_balance_reads() {
        let (manager, id, script) = manager();
        fund(&manager, &script, 5 * COIN, 1);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| {
                            manager
                                .with_wallet_read(&id, |chain, w| {
                                    w.get_balance(chain, IsMineFilter::Spendable, 1)
                                })
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let writer = {
            let manager = Arc::clone(&manager);
            let script = script.clone();
            thread::spawn(move || fund(&manager, &script, COIN, 2))
        };
        writer.join().unwrap();

        for reader in readers {
            for balance in reader.join().unwrap() {
                assert!(balance == 5 * COIN || balance == 6 * COIN);
            }
        }
        assert_eq!(manager.get_balances(&id, 1).unwrap().basecoin_spendable, 6 * COIN);
    }
}
