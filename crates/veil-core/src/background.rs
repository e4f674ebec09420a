//! Periodic rebroadcast of unconfirmed wallet transactions

use crate::cancel::CancelToken;
use crate::chain::Chain;
use crate::manager::WalletManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Summary of one rebroadcast round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebroadcastRound {
    /// Wallets visited
    pub wallets: usize,
    /// Transactions relayed
    pub relayed: usize,
    /// Wallets that disappeared mid-round
    pub errors: Vec<String>,
}

/// Relay every wallet's pending transactions once.
///
/// Locks are taken per wallet, so a long round never blocks the whole manager.
pub fn rebroadcast_once<C: Chain>(manager: &WalletManager<C>) -> RebroadcastRound {
    let mut round = RebroadcastRound::default();
    for id in manager.wallet_ids() {
        match manager.with_wallet_read(&id, |chain, w| w.resend_wallet_transactions(chain)) {
            Ok(relayed) => {
                round.wallets += 1;
                round.relayed += relayed.len();
            }
            Err(e) => {
                warn!("Rebroadcast skipped wallet {}: {}", id, e);
                round.errors.push(e.to_string());
            }
        }
    }
    debug!(
        "Rebroadcast round: {} wallets, {} transactions",
        round.wallets, round.relayed
    );
    round
}

/// Spawn a task that runs [`rebroadcast_once`] every `interval` until
/// `cancel` fires. The handle yields the number of transactions relayed.
///
/// Callers usually pass [`WalletConfig::rebroadcast_interval`](crate::config::WalletConfig::rebroadcast_interval).
pub fn spawn_rebroadcast<C: Chain + 'static>(
    manager: Arc<WalletManager<C>>,
    interval: Duration,
    cancel: CancelToken,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        info!("Rebroadcast task started, interval {:?}", interval);

        let mut total = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    total += rebroadcast_once(&manager).relayed;
                }
            }
        }
        info!("Rebroadcast task stopped after relaying {} transactions", total);
        total
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin_control::CoinControl;
    use crate::config::WalletConfig;
    use crate::manager::WalletId;
    use crate::primitives::{Hash256, MutableTransaction, OutPoint, Output, Script, TxIn};
    use crate::store::MemoryStore;
    use crate::testing::MockChain;
    use crate::transaction::Recipient;
    use veil_params::{NetworkType, COIN};

    fn funded_manager() -> (Arc<WalletManager<MockChain>>, WalletId) {
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

        let mut tx = MutableTransaction::new();
        tx.inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([9; 32]), 0)));
        tx.outputs.push(Output::standard(10 * COIN, script));
        let block = {
            let chain = manager.chain().read();
            chain.mine_block(vec![Arc::new(tx.freeze())]);
            chain.tip_block().unwrap()
        };
        manager.block_connected(&block).unwrap();
        (manager, id)
    }

    #[test]
    fn test_rebroadcast_once_relays_pending() {
        let (manager, id) = funded_manager();
        assert_eq!(rebroadcast_once(&manager).relayed, 0);

        manager
            .create_and_send_transaction(
                &id,
                &[Recipient::new(Script::pay_to_pubkey(&[2u8; 33]), COIN)],
                &CoinControl::default(),
            )
            .unwrap();
        let round = rebroadcast_once(&manager);
        assert_eq!(round.wallets, 1);
        assert_eq!(round.relayed, 1);
        assert!(round.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_task_ticks_until_cancelled() {
        let (manager, id) = funded_manager();
        manager
            .create_and_send_transaction(
                &id,
                &[Recipient::new(Script::pay_to_pubkey(&[2u8; 33]), COIN)],
                &CoinControl::default(),
            )
            .unwrap();
        let relays_before = manager.chain().read().relay_count();

        let cancel = CancelToken::new();
        let handle = spawn_rebroadcast(Arc::clone(&manager), Duration::from_secs(60), cancel.clone());
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();

        let relayed = handle.await.unwrap();
        assert_eq!(relayed, 2);
        assert_eq!(manager.chain().read().relay_count(), relays_before + 2);
    }
}
