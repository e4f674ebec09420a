//! Spend index, conflicts and abandonment

use super::{TxState, Wallet};
use crate::chain::Chain;
use crate::primitives::{Hash256, OutPoint};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashSet, VecDeque};

impl Wallet {
    /// Index the inputs of wallet transaction `hash`.
    ///
    /// Anonymous and zerocoin inputs spend no outpoint and are skipped.
    pub(crate) fn add_to_spends(&mut self, hash: &Hash256) {
        let Some(wtx) = self.txs.get(hash) else {
            return;
        };
        let prevouts: Vec<OutPoint> = wtx
            .tx
            .inputs()
            .iter()
            .filter(|i| !i.is_anon_input() && !i.is_zerocoin_spend())
            .map(|i| i.prevout)
            .collect();

        for prevout in prevouts {
            let spenders = self.spends.entry(prevout).or_default();
            if !spenders.contains(hash) {
                spenders.push(*hash);
            }
            if spenders.len() > 1 {
                tracing::debug!("Outpoint {} has {} spenders", prevout, spenders.len());
            }
            if let Some(parent) = self.txs.get(&prevout.hash) {
                parent.mark_dirty();
            }
        }
    }

    /// True when a live spender of `outpoint` exists.
    ///
    /// Confirmed spenders count, as do unconfirmed ones that were not abandoned.
    /// Conflicted spenders do not.
    pub fn is_spent(&self, chain: &dyn Chain, outpoint: &OutPoint) -> bool {
        let Some(spenders) = self.spends.get(outpoint) else {
            return false;
        };
        spenders.iter().any(|s| {
            self.txs.get(s).is_some_and(|w| {
                let depth = w.depth(chain);
                depth > 0 || (depth == 0 && !w.is_abandoned())
            })
        })
    }

    /// Other wallet transactions spending any input of `txid`.
    pub fn conflicts(&self, txid: &Hash256) -> BTreeSet<Hash256> {
        let mut out = BTreeSet::new();
        let Some(wtx) = self.txs.get(txid) else {
            return out;
        };
        for input in wtx.tx.inputs() {
            if input.is_anon_input() || input.is_zerocoin_spend() {
                continue;
            }
            if let Some(spenders) = self.spends.get(&input.prevout) {
                out.extend(spenders.iter().filter(|s| *s != txid).copied());
            }
        }
        out
    }

    /// True when `hash` may be abandoned: unconfirmed, not in the mempool, not abandoned yet.
    pub fn can_abandon(&self, chain: &dyn Chain, hash: &Hash256) -> bool {
        self.txs.get(hash).is_some_and(|w| {
            w.depth(chain) == 0 && !w.in_mempool && !w.is_abandoned()
        })
    }

    /// Abandon `hash` and every unconfirmed descendant.
    ///
    /// Abandoned transactions stay in the ledger but no longer spend their
    /// inputs. Returns the transactions that changed state.
    pub fn abandon_transaction(&mut self, chain: &dyn Chain, hash: &Hash256) -> Result<Vec<Hash256>> {
        let root = self
            .txs
            .get(hash)
            .ok_or_else(|| Error::TransactionNotFound(hash.to_string()))?;
        if root.depth(chain) != 0 || root.in_mempool {
            return Err(Error::AbandonNotAllowed(hash.to_string()));
        }

        let affected = self.walk_descendants(*hash, |wallet, h| {
            let Some(wtx) = wallet.txs.get_mut(h) else {
                return false;
            };
            let depth = wtx.depth(chain);
            if depth > 0 {
                return false;
            }
            if depth == 0 && !wtx.is_abandoned() {
                wtx.state = TxState::Abandoned;
                wtx.mark_dirty();
            }
            true
        });

        self.finish_transition(&affected)?;
        tracing::info!("Abandoned {} transactions starting at {}", affected.len(), hash);
        Ok(affected)
    }

    /// Mark `tx_hash` and its descendants conflicted by a transaction in `block_hash`.
    ///
    /// Only transactions shallower than the conflicting block change state.
    pub fn mark_conflicted(
        &mut self,
        chain: &dyn Chain,
        block_hash: &Hash256,
        tx_hash: &Hash256,
    ) -> Result<Vec<Hash256>> {
        let Some(block_depth) = chain.block_depth(block_hash) else {
            return Ok(Vec::new());
        };
        let conflict_depth = -(block_depth as i32);
        if !self.txs.contains_key(tx_hash) {
            return Ok(Vec::new());
        }

        let affected = self.walk_descendants(*tx_hash, |wallet, h| {
            let Some(wtx) = wallet.txs.get_mut(h) else {
                return false;
            };
            if conflict_depth < wtx.depth(chain) {
                wtx.state = TxState::Conflicted {
                    block_hash: *block_hash,
                };
                wtx.mark_dirty();
                return true;
            }
            false
        });

        self.finish_transition(&affected)?;
        if !affected.is_empty() {
            tracing::warn!(
                "Marked {} transactions conflicted by block {}",
                affected.len(),
                block_hash
            );
        }
        Ok(affected)
    }

    /// Breadth-first walk from `root` over spenders of each visited transaction's
    /// outputs. `visit` applies the state change and returns whether to descend.
    fn walk_descendants(
        &mut self,
        root: Hash256,
        mut visit: impl FnMut(&mut Wallet, &Hash256) -> bool,
    ) -> Vec<Hash256> {
        let mut todo = VecDeque::from([root]);
        let mut done: HashSet<Hash256> = HashSet::new();
        let mut affected = Vec::new();

        while let Some(hash) = todo.pop_front() {
            if !done.insert(hash) {
                continue;
            }
            if !visit(self, &hash) {
                continue;
            }
            affected.push(hash);

            let n_outputs = self.txs.get(&hash).map_or(0, |w| w.tx.outputs().len());
            for n in 0..n_outputs as u32 {
                if let Some(spenders) = self.spends.get(&OutPoint::new(hash, n)) {
                    todo.extend(spenders.iter().filter(|s| !done.contains(*s)).copied());
                }
            }
        }
        affected
    }

    fn finish_transition(&mut self, affected: &[Hash256]) -> Result<()> {
        for hash in affected {
            self.persist_tx(hash)?;
            if let Some(tx) = self.txs.get(hash).map(|w| std::sync::Arc::clone(&w.tx)) {
                self.mark_inputs_dirty(&tx);
            }
        }
        Ok(())
    }
}
