//! Credits, debits and balances
//!
//! Each privacy mode is summed in its own pass because each decides ownership
//! and spent state differently: plain outputs through the keystore and spend
//! index, blinded outputs through their output records, zerocoin through the
//! mint tracker.

use super::{Wallet, WalletTx};
use crate::chain::Chain;
use crate::keystore::{IsMine, IsMineFilter};
use crate::primitives::{OutPoint, Output, OutputKind, Transaction};
use crate::records::ORF_SPENT;
use serde::{Deserialize, Serialize};
use veil_params::Amount;

/// Balance buckets for every privacy mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceList {
    /// Trusted plain value at the requested depth
    pub basecoin_spendable: Amount,
    /// Plain value waiting in the mempool
    pub basecoin_unconfirmed: Amount,
    /// Plain reward value below maturity
    pub basecoin_immature: Amount,
    /// Watch-only trusted plain value
    pub watch_only_spendable: Amount,
    /// Watch-only plain value waiting in the mempool
    pub watch_only_unconfirmed: Amount,
    /// Trusted CT value
    pub ct_spendable: Amount,
    /// CT value waiting in the mempool
    pub ct_unconfirmed: Amount,
    /// CT reward value below maturity
    pub ct_immature: Amount,
    /// Trusted RingCT value
    pub ringct_spendable: Amount,
    /// RingCT value waiting in the mempool
    pub ringct_unconfirmed: Amount,
    /// RingCT reward value below maturity
    pub ringct_immature: Amount,
    /// Mature unused mints
    pub zerocoin_spendable: Amount,
    /// Mints not yet in a block
    pub zerocoin_pending: Amount,
    /// Confirmed mints below maturity
    pub zerocoin_immature: Amount,
}

impl BalanceList {
    /// Spendable, unconfirmed and immature value across every mode.
    ///
    /// Watch-only buckets are reported separately and not included.
    pub fn total(&self) -> Amount {
        self.basecoin_spendable
            + self.basecoin_unconfirmed
            + self.basecoin_immature
            + self.ct_spendable
            + self.ct_unconfirmed
            + self.ct_immature
            + self.ringct_spendable
            + self.ringct_unconfirmed
            + self.ringct_immature
            + self.zerocoin_spendable
            + self.zerocoin_pending
            + self.zerocoin_immature
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Buckets {
    spendable: Amount,
    unconfirmed: Amount,
    immature: Amount,
}

impl Wallet {
    /// Value of the wallet outputs `tx` spends, under `filter`.
    ///
    /// Zerocoin spends are debited from the recorded spent serials.
    pub fn tx_debit(&self, tx: &Transaction, filter: IsMineFilter) -> Amount {
        let mut debit: Amount = 0;
        for input in tx.inputs() {
            if input.is_anon_input() || input.is_zerocoin_spend() {
                continue;
            }
            let Some(parent) = self.txs.get(&input.prevout.hash) else {
                continue;
            };
            let Some(output) = parent.tx.outputs().get(input.prevout.n as usize) else {
                continue;
            };
            let mine = self.output_is_mine(&input.prevout.hash, input.prevout.n, output);
            if filter.matches(mine) {
                debit += self.output_value(&input.prevout.hash, input.prevout.n, output);
            }
        }
        if tx.is_zerocoin_spend() && filter.matches(IsMine::Spendable) {
            let txid = tx.hash();
            debit += self
                .spent_serials
                .values()
                .filter(|s| s.txid == txid)
                .map(|s| s.denomination.amount())
                .sum::<Amount>();
        }
        debit
    }

    /// Memoized debit of a wallet transaction.
    pub fn debit(&self, wtx: &WalletTx, filter: IsMineFilter) -> Amount {
        wtx.cached(|c| &mut c.debit, filter, || self.tx_debit(&wtx.tx, filter))
    }

    /// Memoized value of the outputs `wtx` pays to the wallet, under `filter`.
    pub fn credit(&self, wtx: &WalletTx, filter: IsMineFilter) -> Amount {
        wtx.cached(|c| &mut c.credit, filter, || {
            let txid = wtx.hash();
            wtx.tx
                .outputs()
                .iter()
                .enumerate()
                .filter(|(n, o)| filter.matches(self.output_is_mine(&txid, *n as u32, o)))
                .map(|(n, o)| self.output_value(&txid, n as u32, o))
                .sum::<Amount>()
        })
    }

    /// Credit of a reward transaction that has not matured yet.
    pub fn immature_credit(&self, chain: &dyn Chain, wtx: &WalletTx, filter: IsMineFilter) -> Amount {
        if wtx.is_immature_in_main_chain(chain, self.params.coinbase_maturity) {
            self.credit(wtx, filter)
        } else {
            0
        }
    }

    /// Unspent credit, excluding zerocoin mint outputs and immature rewards.
    ///
    /// Only transactions that cannot become immature again are memoized.
    pub fn available_credit(&self, chain: &dyn Chain, wtx: &WalletTx, filter: IsMineFilter) -> Amount {
        let reward = wtx.tx.is_coinbase() || wtx.tx.is_coinstake();
        if reward && wtx.is_immature(chain, self.params.coinbase_maturity) {
            return 0;
        }
        let compute = || {
            [OutputKind::Standard, OutputKind::Ct, OutputKind::RingCt]
                .into_iter()
                .map(|kind| self.kind_available(chain, wtx, kind, filter))
                .sum::<Amount>()
        };
        if reward {
            return compute();
        }
        wtx.cached(|c| &mut c.available_credit, filter, compute)
    }

    /// Value returned to the wallet by one of its own transactions.
    pub fn change(&self, wtx: &WalletTx) -> Amount {
        if !wtx.from_me {
            return 0;
        }
        if let Some(v) = wtx.cache.lock().change {
            return v;
        }
        let txid = wtx.hash();
        let value: Amount = wtx
            .tx
            .outputs()
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.is_zerocoin_mint())
            .filter(|(n, o)| self.output_is_mine(&txid, *n as u32, o) != IsMine::No)
            .map(|(n, o)| self.output_value(&txid, n as u32, o))
            .sum();
        wtx.cache.lock().change = Some(value);
        value
    }

    /// Trusted plain balance at `min_depth` or deeper.
    pub fn get_balance(&self, chain: &dyn Chain, filter: IsMineFilter, min_depth: u32) -> Amount {
        let mut total = 0;
        for wtx in self.txs.values() {
            if !self.is_trusted(chain, wtx) || wtx.depth(chain) < min_depth as i32 {
                continue;
            }
            total += self.kind_available_mature(chain, wtx, OutputKind::Standard, filter);
        }
        total
    }

    /// Plain value in depth-0 mempool transactions.
    ///
    /// These are exactly the credits [`Wallet::get_balance`] leaves out at
    /// `min_depth` 1, trusted or not.
    pub fn get_unconfirmed_balance(&self, chain: &dyn Chain) -> Amount {
        self.txs
            .values()
            .filter(|w| w.depth(chain) == 0 && w.in_mempool)
            .map(|w| self.kind_available_mature(chain, w, OutputKind::Standard, IsMineFilter::Spendable))
            .sum()
    }

    /// Plain reward value below maturity.
    pub fn get_immature_balance(&self, chain: &dyn Chain) -> Amount {
        self.txs
            .values()
            .filter(|w| w.is_immature_in_main_chain(chain, self.params.coinbase_maturity))
            .map(|w| self.kind_available(chain, w, OutputKind::Standard, IsMineFilter::Spendable))
            .sum()
    }

    /// Unused zerocoin value; with `mature_only` only mature confirmed mints count.
    pub fn get_zerocoin_balance(&self, chain: &dyn Chain, mature_only: bool) -> Amount {
        let b = self.mints.chain_balances(chain, &self.params);
        if mature_only {
            b.spendable
        } else {
            b.spendable + b.immature + b.pending
        }
    }

    /// Trusted RingCT balance.
    pub fn get_anon_balance(&self, chain: &dyn Chain) -> Amount {
        self.kind_buckets(chain, OutputKind::RingCt, IsMineFilter::Spendable, 0)
            .spendable
    }

    /// Trusted CT balance.
    pub fn get_blind_balance(&self, chain: &dyn Chain) -> Amount {
        self.kind_buckets(chain, OutputKind::Ct, IsMineFilter::Spendable, 0)
            .spendable
    }

    /// Every bucket of every mode, with spendable value taken at `min_depth`.
    pub fn get_balances(&self, chain: &dyn Chain, min_depth: u32) -> BalanceList {
        let base = self.kind_buckets(chain, OutputKind::Standard, IsMineFilter::Spendable, min_depth);
        let watch = self.kind_buckets(chain, OutputKind::Standard, IsMineFilter::WatchOnly, min_depth);
        let ct = self.kind_buckets(chain, OutputKind::Ct, IsMineFilter::Spendable, min_depth);
        let ringct = self.kind_buckets(chain, OutputKind::RingCt, IsMineFilter::Spendable, min_depth);
        let zerocoin = self.mints.chain_balances(chain, &self.params);

        let balances = BalanceList {
            basecoin_spendable: base.spendable,
            basecoin_unconfirmed: base.unconfirmed,
            basecoin_immature: base.immature,
            watch_only_spendable: watch.spendable,
            watch_only_unconfirmed: watch.unconfirmed,
            ct_spendable: ct.spendable,
            ct_unconfirmed: ct.unconfirmed,
            ct_immature: ct.immature,
            ringct_spendable: ringct.spendable,
            ringct_unconfirmed: ringct.unconfirmed,
            ringct_immature: ringct.immature,
            zerocoin_spendable: zerocoin.spendable,
            zerocoin_pending: zerocoin.pending,
            zerocoin_immature: zerocoin.immature,
        };
        tracing::debug!("Balances at min depth {}: total {}", min_depth, balances.total());
        balances
    }

    fn kind_buckets(
        &self,
        chain: &dyn Chain,
        kind: OutputKind,
        filter: IsMineFilter,
        min_depth: u32,
    ) -> Buckets {
        let mut b = Buckets::default();
        for wtx in self.txs.values() {
            let depth = wtx.depth(chain);
            if wtx.is_immature(chain, self.params.coinbase_maturity) {
                if depth > 0 {
                    b.immature += self.kind_available(chain, wtx, kind, filter);
                }
                continue;
            }
            let counted = self.is_trusted(chain, wtx) && depth >= min_depth as i32;
            if counted {
                b.spendable += self.kind_available(chain, wtx, kind, filter);
            } else if depth == 0 && wtx.in_mempool {
                b.unconfirmed += self.kind_available(chain, wtx, kind, filter);
            }
        }
        b
    }

    fn kind_available_mature(
        &self,
        chain: &dyn Chain,
        wtx: &WalletTx,
        kind: OutputKind,
        filter: IsMineFilter,
    ) -> Amount {
        if wtx.is_immature(chain, self.params.coinbase_maturity) {
            return 0;
        }
        self.kind_available(chain, wtx, kind, filter)
    }

    /// Unspent value of outputs of `kind` owned under `filter`.
    fn kind_available(
        &self,
        chain: &dyn Chain,
        wtx: &WalletTx,
        kind: OutputKind,
        filter: IsMineFilter,
    ) -> Amount {
        let txid = wtx.hash();
        let mut total = 0;
        for (n, output) in wtx.tx.outputs().iter().enumerate() {
            let n = n as u32;
            if output.kind() != kind || output.is_zerocoin_mint() {
                continue;
            }
            if !filter.matches(self.output_is_mine(&txid, n, output)) {
                continue;
            }
            if self.is_output_spent(chain, &txid, n, output) {
                continue;
            }
            total += self.output_value(&txid, n, output);
        }
        total
    }

    pub(crate) fn is_output_spent(
        &self,
        chain: &dyn Chain,
        txid: &crate::primitives::Hash256,
        n: u32,
        output: &Output,
    ) -> bool {
        if output.is_blinded() && self.anon.output(txid, n).is_some_and(|r| r.is(ORF_SPENT)) {
            return true;
        }
        self.is_spent(chain, &OutPoint::new(*txid, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalletConfig;
    use crate::primitives::{CtOutput, Hash256, MutableTransaction, Script, TxIn, TxType};
    use crate::records::{OutputRecord, TransactionRecord};
    use crate::store::MemoryStore;
    use crate::testing::MockChain;
    use std::sync::Arc;
    use veil_params::{NetworkType, COIN};

    fn wallet() -> (Wallet, Script) {
        let mut w = Wallet::new(
            WalletConfig::for_network(NetworkType::Regtest),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let pk = w.keystore_mut().generate_key();
        (w, Script::pay_to_pubkey(&pk))
    }

    fn funding(script: &Script, value: Amount, salt: u8) -> Arc<Transaction> {
        let mut tx = MutableTransaction::new();
        tx.inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([salt; 32]), 0)));
        tx.outputs.push(Output::standard(value, script.clone()));
        Arc::new(tx.freeze())
    }

    #[test]
    fn test_credit_is_memoized_until_dirty() {
        let (mut w, script) = wallet();
        let tx = funding(&script, 5 * COIN, 1);
        w.add_to_wallet(Arc::clone(&tx), false, true).unwrap();
        let wtx = w.get_tx(&tx.hash()).unwrap();
        assert_eq!(w.credit(wtx, IsMineFilter::Spendable), 5 * COIN);
        assert_eq!(w.credit(wtx, IsMineFilter::WatchOnly), 0);
        assert_eq!(w.change(wtx), 0);
    }

    #[test]
    fn test_spent_output_leaves_available_credit() {
        let chain = MockChain::new();
        let (mut w, script) = wallet();
        let tx = funding(&script, 5 * COIN, 1);
        let block = chain.mine_block(vec![Arc::clone(&tx)]);
        w.sync_transaction(&chain, Arc::clone(&tx), Some((block, 0)), false)
            .unwrap();
        assert_eq!(w.get_balance(&chain, IsMineFilter::Spendable, 1), 5 * COIN);

        let mut spend = MutableTransaction::new();
        spend.inputs.push(TxIn::new(OutPoint::new(tx.hash(), 0)));
        spend
            .outputs
            .push(Output::standard(4 * COIN, Script::pay_to_pubkey(&[2u8; 33])));
        let spend = Arc::new(spend.freeze());
        w.add_to_wallet(Arc::clone(&spend), true, true).unwrap();

        let wtx = w.get_tx(&tx.hash()).unwrap();
        assert_eq!(w.available_credit(&chain, wtx, IsMineFilter::Spendable), 0);
        assert_eq!(w.get_balance(&chain, IsMineFilter::Spendable, 1), 0);
        assert_eq!(w.debit(w.get_tx(&spend.hash()).unwrap(), IsMineFilter::All), 5 * COIN);
    }

    #[test]
    fn test_immature_coinbase() {
        let chain = MockChain::new();
        let (mut w, script) = wallet();
        let mut cb = MutableTransaction::new();
        cb.tx_type = TxType::Coinbase;
        cb.inputs.push(TxIn::new(OutPoint::null()));
        cb.outputs.push(Output::standard(50 * COIN, script));
        let cb = Arc::new(cb.freeze());
        let block = chain.mine_block(vec![Arc::clone(&cb)]);
        w.sync_transaction(&chain, Arc::clone(&cb), Some((block, 0)), false)
            .unwrap();

        assert_eq!(w.get_immature_balance(&chain), 50 * COIN);
        let wtx = w.get_tx(&cb.hash()).unwrap();
        assert_eq!(w.immature_credit(&chain, wtx, IsMineFilter::Spendable), 50 * COIN);
        assert_eq!(w.available_credit(&chain, wtx, IsMineFilter::Spendable), 0);
        assert_eq!(w.get_balance(&chain, IsMineFilter::Spendable, 1), 0);
        assert_eq!(w.get_balances(&chain, 1).basecoin_immature, 50 * COIN);

        chain.mine_empty_blocks(w.params().coinbase_maturity);
        assert_eq!(w.get_immature_balance(&chain), 0);
        assert_eq!(w.get_balance(&chain, IsMineFilter::Spendable, 1), 50 * COIN);
    }

    #[test]
    fn test_orphaned_coinbase_not_immature() {
        let chain = MockChain::new();
        let (mut w, script) = wallet();
        let mut cb = MutableTransaction::new();
        cb.tx_type = TxType::Coinbase;
        cb.inputs.push(TxIn::new(OutPoint::null()));
        cb.outputs.push(Output::standard(50 * COIN, script));
        let cb = Arc::new(cb.freeze());
        let block = chain.mine_block(vec![Arc::clone(&cb)]);
        w.sync_transaction(&chain, Arc::clone(&cb), Some((block, 0)), false)
            .unwrap();
        assert_eq!(w.get_immature_balance(&chain), 50 * COIN);

        let orphaned = chain.disconnect_tip().unwrap();
        w.block_disconnected(&chain, &orphaned).unwrap();

        let wtx = w.get_tx(&cb.hash()).unwrap();
        assert_eq!(wtx.depth(&chain), 0);
        assert!(wtx.is_immature(&chain, w.params().coinbase_maturity));
        assert_eq!(w.get_immature_balance(&chain), 0);
        assert_eq!(w.immature_credit(&chain, wtx, IsMineFilter::Spendable), 0);
        assert_eq!(w.available_credit(&chain, wtx, IsMineFilter::Spendable), 0);
        let balances = w.get_balances(&chain, 1);
        assert_eq!(balances.basecoin_immature, 0);
        assert_eq!(balances.total(), 0);
    }

    #[test]
    fn test_blind_balance_from_records() {
        let chain = MockChain::new();
        let (mut w, _) = wallet();
        let mut tx = MutableTransaction::new();
        tx.outputs.push(Output::ConfidentialTx(CtOutput {
            commitment: [8u8; 33],
            data: vec![],
            script_pubkey: Script::new(),
            range_proof: vec![],
        }));
        let tx = Arc::new(tx.freeze());
        let mut record = TransactionRecord::default();
        record.insert(OutputRecord::owned(OutputKind::Ct, 0, 7 * COIN));
        w.add_output_record(tx.hash(), record).unwrap();

        let block = chain.mine_block(vec![Arc::clone(&tx)]);
        w.sync_transaction(&chain, Arc::clone(&tx), Some((block, 0)), false)
            .unwrap();
        assert_eq!(w.get_blind_balance(&chain), 7 * COIN);
        assert_eq!(w.get_anon_balance(&chain), 0);
        assert_eq!(w.get_balances(&chain, 1).total(), 7 * COIN);
    }
}
