//! Mint tracker
//!
//! Keeps every active mint keyed by serial hash, plus archived mints and the
//! spends still waiting for confirmation.

use super::denomination::Denomination;
use super::mint::{Mint, MintMeta, MINT_CONFIRMED, MINT_MATURE, MINT_PENDINGSPEND};
use crate::chain::Chain;
use crate::coin_control::CoinControl;
use crate::primitives::{Hash256, OutPoint};
use std::collections::{BTreeMap, HashMap};
use veil_params::{Amount, ConsensusParams};

/// Unused mint value split by confirmation state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZerocoinBalances {
    /// Confirmed and mature
    pub spendable: Amount,
    /// Confirmed, below maturity
    pub immature: Amount,
    /// Not yet in a block
    pub pending: Amount,
}

/// Index of the wallet's zerocoin mints.
#[derive(Debug, Default)]
pub struct MintTracker {
    metas: HashMap<Hash256, MintMeta>,
    mints: HashMap<Hash256, Mint>,
    by_pubcoin: HashMap<Hash256, Hash256>,
    pending_spends: HashMap<Hash256, Hash256>,
    archived: HashMap<Hash256, (Mint, MintMeta)>,
}

impl MintTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `mint`, replacing any previous entry with the same serial.
    pub fn add(&mut self, mint: Mint) -> MintMeta {
        let meta = mint.meta();
        self.by_pubcoin.insert(meta.hash_pubcoin, meta.hash_serial);
        self.metas.insert(meta.hash_serial, meta.clone());
        self.mints.insert(meta.hash_serial, mint);
        meta
    }

    /// Drop a mint entirely.
    pub fn remove(&mut self, hash_serial: &Hash256) -> Option<Mint> {
        let meta = self.metas.remove(hash_serial)?;
        self.by_pubcoin.remove(&meta.hash_pubcoin);
        self.pending_spends.remove(hash_serial);
        self.mints.remove(hash_serial)
    }

    /// Metadata by serial hash.
    pub fn get(&self, hash_serial: &Hash256) -> Option<&MintMeta> {
        self.metas.get(hash_serial)
    }

    /// Full mint by serial hash.
    pub fn get_mint(&self, hash_serial: &Hash256) -> Option<&Mint> {
        self.mints.get(hash_serial)
    }

    /// Metadata by pubcoin hash.
    pub fn get_by_pubcoin(&self, hash_pubcoin: &Hash256) -> Option<&MintMeta> {
        self.by_pubcoin
            .get(hash_pubcoin)
            .and_then(|s| self.metas.get(s))
    }

    /// True when an active mint has this serial hash.
    pub fn has_serial_hash(&self, hash_serial: &Hash256) -> bool {
        self.metas.contains_key(hash_serial)
    }

    /// True when an active mint has this pubcoin hash.
    pub fn has_pubcoin_hash(&self, hash_pubcoin: &Hash256) -> bool {
        self.by_pubcoin.contains_key(hash_pubcoin)
    }

    /// Active mints with their secrets.
    pub fn iter_mints(&self) -> impl Iterator<Item = &Mint> {
        self.mints.values()
    }

    /// Number of active mints.
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// True when no mint is tracked.
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// Replace a mint's state from `meta`.
    pub fn update_state(&mut self, meta: MintMeta) -> bool {
        let Some(mint) = self.mints.get_mut(&meta.hash_serial) else {
            return false;
        };
        mint.used = meta.is_used;
        mint.height = meta.height;
        mint.txid = meta.txid;
        if !meta.is_used {
            self.pending_spends.remove(&meta.hash_serial);
        }
        self.metas.insert(meta.hash_serial, meta);
        true
    }

    /// Move a mint out of the active set.
    pub fn archive(&mut self, hash_serial: &Hash256) -> Option<MintMeta> {
        let mut meta = self.metas.get(hash_serial)?.clone();
        let mint = self.remove(hash_serial)?;
        meta.is_archived = true;
        tracing::info!("Archived orphaned mint {}", meta.hash_pubcoin);
        self.archived.insert(meta.hash_serial, (mint, meta.clone()));
        Some(meta)
    }

    /// Restore an archived mint.
    pub fn unarchive(&mut self, hash_serial: &Hash256) -> Option<MintMeta> {
        let (mint, _) = self.archived.remove(hash_serial)?;
        Some(self.add(mint))
    }

    /// Archived mints.
    pub fn archived(&self) -> impl Iterator<Item = (&Mint, &MintMeta)> {
        self.archived.values().map(|(m, meta)| (m, meta))
    }

    /// Hold an archived mint loaded from storage.
    pub fn insert_archived(&mut self, mint: Mint) {
        let mut meta = mint.meta();
        meta.is_archived = true;
        self.archived.insert(meta.hash_serial, (mint, meta));
    }

    /// Mark the mint used by the pending spend `txid`.
    pub fn set_pubcoin_used(&mut self, hash_pubcoin: &Hash256, txid: Hash256) -> bool {
        let Some(hash_serial) = self.by_pubcoin.get(hash_pubcoin).copied() else {
            return false;
        };
        if let Some(meta) = self.metas.get_mut(&hash_serial) {
            meta.is_used = true;
            meta.set_flag(MINT_PENDINGSPEND, true);
        }
        if let Some(mint) = self.mints.get_mut(&hash_serial) {
            mint.used = true;
        }
        self.pending_spends.insert(hash_serial, txid);
        true
    }

    /// Return a mint to the spendable set.
    pub fn set_pubcoin_not_used(&mut self, hash_pubcoin: &Hash256) -> bool {
        let Some(hash_serial) = self.by_pubcoin.get(hash_pubcoin).copied() else {
            return false;
        };
        if let Some(meta) = self.metas.get_mut(&hash_serial) {
            meta.is_used = false;
            meta.set_flag(MINT_PENDINGSPEND, false);
        }
        if let Some(mint) = self.mints.get_mut(&hash_serial) {
            mint.used = false;
        }
        self.pending_spends.remove(&hash_serial);
        true
    }

    /// Pending spend transaction of a mint.
    pub fn pending_spend(&self, hash_serial: &Hash256) -> Option<Hash256> {
        self.pending_spends.get(hash_serial).copied()
    }

    /// Refresh confirmation, maturity and spent state from the chain.
    pub fn update_status(&mut self, chain: &dyn Chain, params: &ConsensusParams) {
        let tip = chain.height();
        for (hash_serial, meta) in self.metas.iter_mut() {
            match chain.mint_in_chain(&meta.hash_pubcoin) {
                Some(loc) => {
                    meta.height = Some(loc.height);
                    meta.txid = loc.txid;
                }
                None => meta.height = None,
            }
            let confirmed = meta.height.is_some();
            let mature = meta
                .height
                .is_some_and(|h| tip >= h.saturating_add(params.zerocoin_mint_maturity));
            meta.set_flag(MINT_CONFIRMED, confirmed);
            meta.set_flag(MINT_MATURE, mature);

            if chain.is_serial_in_chain(hash_serial).is_some() {
                meta.is_used = true;
                meta.set_flag(MINT_PENDINGSPEND, false);
                self.pending_spends.remove(hash_serial);
            }
            if let Some(mint) = self.mints.get_mut(hash_serial) {
                mint.height = meta.height;
                mint.txid = meta.txid;
                mint.used = meta.is_used;
            }
        }
    }

    /// Tracked mints, optionally refreshed and filtered. Oldest first.
    pub fn list_mints(
        &mut self,
        unused_only: bool,
        mature_only: bool,
        update_status: Option<(&dyn Chain, &ConsensusParams)>,
    ) -> Vec<MintMeta> {
        if let Some((chain, params)) = update_status {
            self.update_status(chain, params);
        }
        let mut out: Vec<MintMeta> = self
            .metas
            .values()
            .filter(|m| !unused_only || !m.is_used)
            .filter(|m| !mature_only || m.has_flag(MINT_MATURE))
            .cloned()
            .collect();
        sort_oldest_first(&mut out);
        out
    }

    /// Value of unused mints as of the last status update.
    ///
    /// `confirmed_only` counts mature confirmed mints; `unconfirmed_only` counts
    /// mints not yet in a block.
    pub fn get_balance(&self, confirmed_only: bool, unconfirmed_only: bool) -> Amount {
        self.metas
            .values()
            .filter(|m| !m.is_used)
            .filter(|m| {
                if confirmed_only {
                    m.has_flag(MINT_CONFIRMED | MINT_MATURE)
                } else if unconfirmed_only {
                    !m.has_flag(MINT_CONFIRMED)
                } else {
                    true
                }
            })
            .map(|m| m.denom.amount())
            .sum()
    }

    /// Value of confirmed mints still below maturity.
    pub fn get_immature_balance(&self) -> Amount {
        self.metas
            .values()
            .filter(|m| !m.is_used && m.has_flag(MINT_CONFIRMED) && !m.has_flag(MINT_MATURE))
            .map(|m| m.denom.amount())
            .sum()
    }

    /// Spendable, immature and pending value read straight from the chain.
    ///
    /// Unlike [`MintTracker::get_balance`] this does not depend on the last
    /// status update, so it is safe under a read lock.
    pub fn chain_balances(
        &self,
        chain: &dyn Chain,
        params: &ConsensusParams,
    ) -> ZerocoinBalances {
        let tip = chain.height();
        let mut out = ZerocoinBalances::default();
        for meta in self.metas.values() {
            if meta.is_used || chain.is_serial_in_chain(&meta.hash_serial).is_some() {
                continue;
            }
            let value = meta.denom.amount();
            match chain.mint_in_chain(&meta.hash_pubcoin) {
                Some(loc) if tip >= loc.height.saturating_add(params.zerocoin_mint_maturity) => {
                    out.spendable += value
                }
                Some(_) => out.immature += value,
                None => out.pending += value,
            }
        }
        out
    }

    /// Count of spendable mints per denomination.
    pub fn mint_distribution(&self) -> BTreeMap<Denomination, usize> {
        let mut dist: BTreeMap<Denomination, usize> =
            Denomination::ALL.iter().map(|d| (*d, 0)).collect();
        for meta in self.spendable() {
            *dist.entry(meta.denom).or_default() += 1;
        }
        dist
    }

    /// Mints that can be spent now, honouring locked selections in `coin_control`.
    pub fn available_zerocoins(&self, coin_control: Option<&CoinControl>) -> Vec<MintMeta> {
        let mut out: Vec<MintMeta> = self
            .spendable()
            .filter(|m| match coin_control {
                Some(cc) if cc.only_selected() => {
                    cc.is_selected(&OutPoint::new(m.hash_serial, 0))
                }
                _ => true,
            })
            .cloned()
            .collect();
        sort_oldest_first(&mut out);
        out
    }

    fn spendable(&self) -> impl Iterator<Item = &MintMeta> {
        self.metas.values().filter(|m| {
            !m.is_used && m.has_flag(MINT_CONFIRMED | MINT_MATURE) && !m.has_flag(MINT_PENDINGSPEND)
        })
    }
}

/// Order by confirmation height, unconfirmed last, then by serial hash.
pub fn sort_oldest_first(metas: &mut [MintMeta]) {
    metas.sort_by(|a, b| {
        let ha = a.height.unwrap_or(u32::MAX);
        let hb = b.height.unwrap_or(u32::MAX);
        ha.cmp(&hb).then_with(|| a.hash_serial.cmp(&b.hash_serial))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockChain, MockProver};
    use crate::zerocoin::mint::MintGenerator;
    use veil_params::NetworkType;

    fn tracker_with(n: usize) -> (MintTracker, Vec<Mint>) {
        let prover = MockProver::new();
        let mut gen = MintGenerator::new([3u8; 32], 0);
        let mut tracker = MintTracker::new();
        let mut mints = Vec::new();
        for _ in 0..n {
            let mint = gen.generate(&prover, Denomination::Ten).unwrap();
            tracker.add(mint.clone());
            mints.push(mint);
        }
        (tracker, mints)
    }

    #[test]
    fn test_used_roundtrip() {
        let (mut tracker, mints) = tracker_with(1);
        let hp = mints[0].hash_pubcoin();
        let txid = Hash256::from_bytes([9u8; 32]);
        assert!(tracker.set_pubcoin_used(&hp, txid));
        assert!(tracker.get_by_pubcoin(&hp).unwrap().is_used);
        assert_eq!(tracker.pending_spend(&mints[0].hash_serial()), Some(txid));

        assert!(tracker.set_pubcoin_not_used(&hp));
        assert!(!tracker.get_by_pubcoin(&hp).unwrap().is_used);
        assert_eq!(tracker.pending_spend(&mints[0].hash_serial()), None);
    }

    #[test]
    fn test_archive_and_restore() {
        let (mut tracker, mints) = tracker_with(2);
        let hs = mints[0].hash_serial();
        let meta = tracker.archive(&hs).unwrap();
        assert!(meta.is_archived);
        assert!(!tracker.has_serial_hash(&hs));
        assert_eq!(tracker.archived().count(), 1);

        tracker.unarchive(&hs).unwrap();
        assert!(tracker.has_serial_hash(&hs));
        assert_eq!(tracker.archived().count(), 0);
    }

    #[test]
    fn test_status_and_balances() {
        let params = ConsensusParams::from_network(NetworkType::Regtest);
        let (mut tracker, mints) = tracker_with(2);
        let chain = MockChain::new();
        chain.mine_mint(&mints[0]);
        chain.mine_empty_blocks(params.zerocoin_mint_maturity);

        let listed = tracker.list_mints(true, true, Some((&chain, &params)));
        assert_eq!(listed.len(), 1);
        assert_eq!(tracker.get_balance(true, false), Denomination::Ten.amount());
        assert_eq!(tracker.get_balance(false, true), Denomination::Ten.amount());
        assert_eq!(tracker.get_immature_balance(), 0);
        assert_eq!(tracker.mint_distribution()[&Denomination::Ten], 1);
        assert_eq!(tracker.available_zerocoins(None).len(), 1);

        let balances = tracker.chain_balances(&chain, &params);
        assert_eq!(balances.spendable, Denomination::Ten.amount());
        assert_eq!(balances.pending, Denomination::Ten.amount());
        assert_eq!(balances.immature, 0);
    }
}
