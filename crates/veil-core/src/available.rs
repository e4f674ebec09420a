//! Unspent output filter engine
//!
//! Walks the ledger and returns every output the wallet could spend right now,
//! tagged with what the selector and the caller need to know about it.

use crate::chain::Chain;
use crate::coin_control::CoinControl;
use crate::keystore::{p2pk_input_size, IsMine};
use crate::primitives::{Hash256, OutPoint, Output, OutputKind, Script};
use crate::records::ORF_SPENT;
use crate::wallet::{Wallet, WalletTx};
use crate::zerocoin::pubcoin_hash;
use serde::{Deserialize, Serialize};
use veil_params::{Amount, MAX_MONEY};

/// Plain outputs
pub const KIND_BASECOIN: u8 = 1 << 0;
/// Zerocoin mint outputs
pub const KIND_ZEROCOIN: u8 = 1 << 1;
/// Confidential outputs
pub const KIND_CT: u8 = 1 << 2;
/// RingCT outputs
pub const KIND_RINGCT: u8 = 1 << 3;
/// Every kind
pub const KIND_ALL: u8 = KIND_BASECOIN | KIND_ZEROCOIN | KIND_CT | KIND_RINGCT;

/// Deepest depth a filter accepts by default.
pub const DEFAULT_MAX_DEPTH: i32 = 9_999_999;

/// Which outputs [`Wallet::available_coins`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinFilter {
    /// Skip outputs of untrusted or replaceable transactions
    pub only_safe: bool,
    /// Smallest output value
    pub min_value: Amount,
    /// Largest output value
    pub max_value: Amount,
    /// Stop once the running sum reaches this value
    pub min_sum: Option<Amount>,
    /// Stop after this many outputs
    pub max_count: Option<usize>,
    /// Shallowest depth
    pub min_depth: i32,
    /// Deepest depth
    pub max_depth: i32,
    /// `KIND_*` mask
    pub kinds: u8,
}

impl Default for CoinFilter {
    fn default() -> Self {
        Self {
            only_safe: true,
            min_value: 1,
            max_value: MAX_MONEY,
            min_sum: None,
            max_count: None,
            min_depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            kinds: KIND_BASECOIN,
        }
    }
}

impl CoinFilter {
    /// Default filter restricted to `kinds`.
    pub fn kinds(kinds: u8) -> Self {
        Self {
            kinds,
            ..Self::default()
        }
    }
}

/// An output the wallet may spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCandidate {
    /// Location
    pub outpoint: OutPoint,
    /// Output kind
    pub kind: OutputKind,
    /// Value, from the output record for blinded outputs
    pub value: Amount,
    /// Locking script, when the output has one
    pub script: Option<Script>,
    /// Confirmations of the containing transaction
    pub depth: i32,
    /// The wallet holds the key
    pub spendable: bool,
    /// The wallet can size an unlocking script
    pub solvable: bool,
    /// Transaction is trusted and not part of a replacement chain
    pub safe: bool,
    /// Transaction was created by the wallet
    pub from_me: bool,
    /// Estimated size of the input spending this output
    pub input_bytes: usize,
    /// Unconfirmed ancestors in the mempool, itself included
    pub ancestors: usize,
    /// Unconfirmed descendants in the mempool, itself included
    pub descendants: usize,
}

impl OutputCandidate {
    /// True for plain outputs locked by a zerocoin mint script.
    pub fn is_zerocoin_mint(&self) -> bool {
        self.script.as_ref().is_some_and(|s| s.is_zerocoin_mint())
    }
}

impl Wallet {
    /// Every output matching `filter`, in ledger order.
    pub fn available_coins(
        &self,
        chain: &dyn Chain,
        filter: &CoinFilter,
        coin_control: Option<&CoinControl>,
    ) -> Vec<OutputCandidate> {
        let mut out = Vec::new();
        let mut total: Amount = 0;
        let allow_watch_only = coin_control.is_some_and(|cc| cc.allow_watch_only);
        let only_selected = coin_control.filter(|cc| cc.only_selected());

        'txs: for wtx in self.transactions() {
            let txid = wtx.hash();
            if !chain.is_final(&wtx.tx) {
                continue;
            }
            if wtx.is_immature(chain, self.params.coinbase_maturity) {
                continue;
            }
            if wtx.tx.is_coinbase() && wtx.tx.outputs().first().and_then(|o| o.value()) == Some(0) {
                continue;
            }

            let depth = wtx.depth(chain);
            if depth < 0 || (depth == 0 && !wtx.in_mempool) {
                continue;
            }

            let safe = self.is_safe(chain, wtx, depth);
            if filter.only_safe && !safe {
                continue;
            }
            if depth < filter.min_depth || depth > filter.max_depth {
                continue;
            }

            let (ancestors, descendants) = if depth == 0 {
                chain.transaction_ancestry(&txid)
            } else {
                (0, 0)
            };

            for (n, output) in wtx.tx.outputs().iter().enumerate() {
                let n = n as u32;
                if n == 0 && wtx.tx.is_coinstake() {
                    continue;
                }
                let Some(candidate) = self.candidate(
                    chain,
                    wtx,
                    n,
                    output,
                    filter,
                    only_selected,
                    allow_watch_only,
                ) else {
                    continue;
                };

                total += candidate.value;
                out.push(OutputCandidate {
                    depth,
                    safe,
                    ancestors,
                    descendants,
                    ..candidate
                });

                if filter.min_sum.is_some_and(|min| total >= min)
                    || filter.max_count.is_some_and(|max| out.len() >= max)
                {
                    break 'txs;
                }
            }
        }

        tracing::debug!(
            "Found {} available outputs worth {} (kinds {:#x})",
            out.len(),
            total,
            filter.kinds
        );
        out
    }

    /// Trust adjusted for replacement chains.
    fn is_safe(&self, chain: &dyn Chain, wtx: &WalletTx, depth: i32) -> bool {
        if depth == 0 && (wtx.replaces_txid.is_some() || wtx.replaced_by_txid.is_some()) {
            return false;
        }
        self.is_trusted(chain, wtx)
    }

    #[allow(clippy::too_many_arguments)]
    fn candidate(
        &self,
        chain: &dyn Chain,
        wtx: &WalletTx,
        n: u32,
        output: &Output,
        filter: &CoinFilter,
        only_selected: Option<&CoinControl>,
        allow_watch_only: bool,
    ) -> Option<OutputCandidate> {
        let txid = wtx.hash();
        let is_mint = output.is_zerocoin_mint();
        let bit = if is_mint {
            KIND_ZEROCOIN
        } else {
            output.kind().mask_bit()
        };
        if filter.kinds & bit == 0 {
            return None;
        }

        let value = match output {
            Output::ConfidentialTx(_) | Output::RingCt(_) => {
                let record = self.anon.output(&txid, n)?;
                if record.is(ORF_SPENT) {
                    return None;
                }
                record.value
            }
            _ => output.value()?,
        };
        if value <= 0 || value < filter.min_value || value > filter.max_value {
            return None;
        }

        let outpoint = OutPoint::new(txid, n);
        if let Some(cc) = only_selected {
            if !cc.is_selected(&outpoint) {
                return None;
            }
        }
        if self.is_locked_coin(&outpoint) || self.is_spent(chain, &outpoint) {
            return None;
        }
        if is_mint && self.is_mint_used(output) {
            return None;
        }

        let mine = self.output_is_mine(&txid, n, output);
        if mine == IsMine::No {
            return None;
        }
        if mine == IsMine::WatchOnly && !allow_watch_only {
            return None;
        }

        // Mints are spent through the zerocoin protocol, never by signature
        let (spendable, solvable) = if is_mint {
            (true, true)
        } else {
            self.spendable_solvable(&txid, n, output, mine)
        };
        let input_bytes = if solvable && !output.is_blinded() {
            p2pk_input_size()
        } else {
            0
        };

        Some(OutputCandidate {
            outpoint,
            kind: output.kind(),
            value,
            script: output.script_pubkey().cloned(),
            depth: 0,
            spendable,
            solvable,
            safe: false,
            from_me: wtx.from_me,
            input_bytes,
            ancestors: 0,
            descendants: 0,
        })
    }

    fn spendable_solvable(&self, txid: &Hash256, n: u32, output: &Output, mine: IsMine) -> (bool, bool) {
        match output {
            Output::Standard(o) => {
                let solvable = self.keystore.is_solvable(&o.script_pubkey);
                (mine == IsMine::Spendable, solvable)
            }
            Output::ConfidentialTx(o) => {
                let solvable = self.keystore.is_solvable(&o.script_pubkey)
                    || self.anon.output(txid, n).is_some();
                (mine == IsMine::Spendable, solvable)
            }
            Output::RingCt(_) => (mine == IsMine::Spendable, mine == IsMine::Spendable),
            Output::Data(_) => (false, false),
        }
    }

    fn is_mint_used(&self, output: &Output) -> bool {
        output
            .script_pubkey()
            .and_then(|s| s.zerocoin_mint_pubcoin())
            .and_then(|p| self.mints.get_by_pubcoin(&pubcoin_hash(&p)))
            .is_some_and(|meta| meta.is_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalletConfig;
    use crate::primitives::{MutableTransaction, RingCtOutput, Transaction, TxIn};
    use crate::records::{OutputRecord, TransactionRecord};
    use crate::store::MemoryStore;
    use crate::testing::MockChain;
    use std::sync::Arc;
    use veil_params::{NetworkType, COIN};

    struct Setup {
        chain: MockChain,
        wallet: Wallet,
        script: Script,
    }

    fn setup() -> Setup {
        let mut wallet = Wallet::new(
            WalletConfig::for_network(NetworkType::Regtest),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let pk = wallet.keystore_mut().generate_key();
        Setup {
            chain: MockChain::new(),
            wallet,
            script: Script::pay_to_pubkey(&pk),
        }
    }

    fn receive(s: &mut Setup, values: &[Amount], salt: u8, confirm: bool) -> Arc<Transaction> {
        let mut tx = MutableTransaction::new();
        tx.inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([salt; 32]), 0)));
        for v in values {
            tx.outputs.push(Output::standard(*v, s.script.clone()));
        }
        let tx = Arc::new(tx.freeze());
        if confirm {
            let block = s.chain.mine_block(vec![Arc::clone(&tx)]);
            s.wallet
                .sync_transaction(&s.chain, Arc::clone(&tx), Some((block, 0)), false)
                .unwrap();
        } else {
            s.wallet
                .sync_transaction(&s.chain, Arc::clone(&tx), None, true)
                .unwrap();
        }
        tx
    }

    #[test]
    fn test_value_and_depth_bounds() {
        let mut s = setup();
        receive(&mut s, &[COIN, 5 * COIN, 20 * COIN], 1, true);
        s.chain.mine_empty_blocks(2);

        let filter = CoinFilter {
            min_value: 2 * COIN,
            max_value: 10 * COIN,
            ..CoinFilter::default()
        };
        let coins = s.wallet.available_coins(&s.chain, &filter, None);
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].value, 5 * COIN);
        assert_eq!(coins[0].depth, 3);
        assert!(coins[0].spendable && coins[0].solvable && coins[0].safe);
        assert_eq!(coins[0].input_bytes, p2pk_input_size());

        let shallow = CoinFilter {
            max_depth: 2,
            ..CoinFilter::default()
        };
        assert!(s.wallet.available_coins(&s.chain, &shallow, None).is_empty());
    }

    #[test]
    fn test_untrusted_mempool_outputs_are_unsafe() {
        let mut s = setup();
        receive(&mut s, &[COIN], 1, false);
        assert!(s
            .wallet
            .available_coins(&s.chain, &CoinFilter::default(), None)
            .is_empty());

        let any = CoinFilter {
            only_safe: false,
            ..CoinFilter::default()
        };
        let coins = s.wallet.available_coins(&s.chain, &any, None);
        assert_eq!(coins.len(), 1);
        assert!(!coins[0].safe);
    }

    #[test]
    fn test_locked_and_selected_outpoints() {
        let mut s = setup();
        let tx = receive(&mut s, &[COIN, 2 * COIN, 3 * COIN], 1, true);
        s.wallet.lock_coin(OutPoint::new(tx.hash(), 0));
        assert_eq!(
            s.wallet
                .available_coins(&s.chain, &CoinFilter::default(), None)
                .len(),
            2
        );

        let mut cc = CoinControl::default();
        cc.select(OutPoint::new(tx.hash(), 2));
        let coins = s
            .wallet
            .available_coins(&s.chain, &CoinFilter::default(), Some(&cc));
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].value, 3 * COIN);
    }

    #[test]
    fn test_early_exit_limits() {
        let mut s = setup();
        receive(&mut s, &[COIN, COIN, COIN, COIN], 1, true);
        let by_sum = CoinFilter {
            min_sum: Some(2 * COIN),
            ..CoinFilter::default()
        };
        assert_eq!(s.wallet.available_coins(&s.chain, &by_sum, None).len(), 2);
        let by_count = CoinFilter {
            max_count: Some(3),
            ..CoinFilter::default()
        };
        assert_eq!(s.wallet.available_coins(&s.chain, &by_count, None).len(), 3);
    }

    #[test]
    fn test_blinded_outputs_need_a_record() {
        let mut s = setup();
        let mut tx = MutableTransaction::new();
        tx.outputs.push(Output::RingCt(RingCtOutput {
            pubkey: [2u8; 33],
            commitment: [9u8; 33],
            data: vec![],
            range_proof: vec![],
        }));
        tx.outputs.push(Output::RingCt(RingCtOutput {
            pubkey: [3u8; 33],
            commitment: [9u8; 33],
            data: vec![],
            range_proof: vec![],
        }));
        let tx = Arc::new(tx.freeze());
        let mut record = TransactionRecord::default();
        record.insert(OutputRecord::owned(OutputKind::RingCt, 0, 4 * COIN));
        let mut spent = OutputRecord::owned(OutputKind::RingCt, 1, 6 * COIN);
        spent.set(ORF_SPENT, true);
        record.insert(spent);
        s.wallet.add_output_record(tx.hash(), record).unwrap();
        let block = s.chain.mine_block(vec![Arc::clone(&tx)]);
        s.wallet
            .sync_transaction(&s.chain, Arc::clone(&tx), Some((block, 0)), false)
            .unwrap();

        assert!(s
            .wallet
            .available_coins(&s.chain, &CoinFilter::default(), None)
            .is_empty());
        let coins = s
            .wallet
            .available_coins(&s.chain, &CoinFilter::kinds(KIND_RINGCT), None);
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].value, 4 * COIN);
        assert_eq!(coins[0].kind, OutputKind::RingCt);
    }
}
