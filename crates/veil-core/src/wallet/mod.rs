//! Wallet ledger
//!
//! A [`Wallet`] owns every transaction that touches it, the spend index used for
//! conflict detection, the output records of blinded outputs and the zerocoin
//! mint tracker. Chain notifications flow in through [`Wallet::sync_transaction`],
//! [`Wallet::block_connected`] and [`Wallet::block_disconnected`].

mod balance;
mod spends;
mod wallet_tx;

pub use balance::BalanceList;
pub use wallet_tx::{TxState, WalletTx};

use crate::chain::{Chain, ChainBlock};
use crate::config::WalletConfig;
use crate::keystore::{IsMine, KeyStore};
use crate::primitives::{Hash256, OutPoint, Output, Transaction};
use crate::records::{AnonLedger, TransactionRecord, ORF_OWNED, ORF_WATCHONLY};
use crate::store::{WalletStore, WalletTxRecord, ZerocoinSpendRecord};
use crate::zerocoin::{MintGenerator, MintTracker};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use veil_params::{Amount, ConsensusParams};

/// A single wallet and everything it tracks.
pub struct Wallet {
    pub(crate) config: WalletConfig,
    pub(crate) params: ConsensusParams,
    pub(crate) keystore: KeyStore,
    pub(crate) txs: HashMap<Hash256, WalletTx>,
    pub(crate) spends: BTreeMap<OutPoint, Vec<Hash256>>,
    pub(crate) locked_coins: HashSet<OutPoint>,
    pub(crate) anon: AnonLedger,
    pub(crate) mints: MintTracker,
    pub(crate) mint_generator: Option<MintGenerator>,
    pub(crate) spent_serials: HashMap<Hash256, ZerocoinSpendRecord>,
    pub(crate) store: Arc<dyn WalletStore>,
    next_order_pos: i64,
    locked: bool,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("network", &self.config.network)
            .field("txs", &self.txs.len())
            .field("mints", &self.mints.len())
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Empty wallet backed by `store`.
    pub fn new(config: WalletConfig, store: Arc<dyn WalletStore>) -> Result<Self> {
        config.validate()?;
        let params = config.consensus();
        Ok(Self {
            config,
            params,
            keystore: KeyStore::new(),
            txs: HashMap::new(),
            spends: BTreeMap::new(),
            locked_coins: HashSet::new(),
            anon: AnonLedger::new(),
            mints: MintTracker::new(),
            mint_generator: None,
            spent_serials: HashMap::new(),
            store,
            next_order_pos: 0,
            locked: false,
        })
    }

    /// Rebuild a wallet from what `store` holds.
    pub fn load(config: WalletConfig, store: Arc<dyn WalletStore>) -> Result<Self> {
        let mut wallet = Self::new(config, Arc::clone(&store))?;

        for record in store.load_txs()? {
            let wtx = record.to_wallet_tx()?;
            let hash = wtx.hash();
            wallet.next_order_pos = wallet.next_order_pos.max(wtx.order_pos + 1);
            wallet.txs.insert(hash, wtx);
            wallet.add_to_spends(&hash);
        }
        for (txid, record) in store.load_output_records()? {
            wallet.anon.insert(txid, record);
        }
        for mint in store.load_mints()? {
            wallet.mints.add(mint);
        }
        for mint in store.load_archived_mints()? {
            wallet.mints.insert_archived(mint);
        }
        for spend in store.load_zerocoin_spends()? {
            wallet.spent_serials.insert(spend.hash_serial, spend);
        }

        tracing::info!(
            "Loaded wallet: {} transactions, {} mints, {} spent serials",
            wallet.txs.len(),
            wallet.mints.len(),
            wallet.spent_serials.len()
        );
        Ok(wallet)
    }

    /// Configuration in effect.
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Consensus parameters of the configured network.
    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Keys.
    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    /// Keys, mutably.
    pub fn keystore_mut(&mut self) -> &mut KeyStore {
        &mut self.keystore
    }

    /// Zerocoin mint tracker.
    pub fn mints(&self) -> &MintTracker {
        &self.mints
    }

    /// Blinded output records.
    pub fn anon_ledger(&self) -> &AnonLedger {
        &self.anon
    }

    /// Persistence backend.
    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    /// Enable deterministic mint generation from `seed`.
    ///
    /// The counter resumes after the highest deterministic mint already held.
    pub fn set_mint_seed(&mut self, seed: [u8; 32]) {
        let next = self
            .mints
            .iter_mints()
            .chain(self.mints.archived().map(|(m, _)| m))
            .filter_map(|m| m.count)
            .max()
            .map_or(0, |c| c.wrapping_add(1));
        self.mint_generator = Some(MintGenerator::new(seed, next));
    }

    /// Lock or unlock the wallet. A locked wallet refuses zerocoin spends.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// True while locked.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Wallet transaction by hash.
    pub fn get_tx(&self, hash: &Hash256) -> Option<&WalletTx> {
        self.txs.get(hash)
    }

    /// Every wallet transaction, in insertion order.
    pub fn transactions(&self) -> Vec<&WalletTx> {
        let mut out: Vec<&WalletTx> = self.txs.values().collect();
        out.sort_by_key(|w| w.order_pos);
        out
    }

    /// Number of wallet transactions.
    pub fn tx_count(&self) -> usize {
        self.txs.len()
    }

    /// Depth of a wallet transaction, 0 when unknown.
    pub fn depth(&self, chain: &dyn Chain, hash: &Hash256) -> i32 {
        self.txs.get(hash).map_or(0, |w| w.depth(chain))
    }

    /// Ownership of output `n` of `txid`.
    ///
    /// Plain outputs are decided by the keystore, zerocoin mint outputs by the
    /// tracker and blinded outputs by their output records.
    pub fn output_is_mine(&self, txid: &Hash256, n: u32, output: &Output) -> IsMine {
        match output {
            Output::Standard(o) if o.script_pubkey.is_zerocoin_mint() => {
                let owned = o
                    .script_pubkey
                    .zerocoin_mint_pubcoin()
                    .map(|p| self.mints.has_pubcoin_hash(&crate::zerocoin::pubcoin_hash(&p)))
                    .unwrap_or(false);
                if owned {
                    IsMine::Spendable
                } else {
                    IsMine::No
                }
            }
            Output::Standard(o) => self.keystore.is_mine(&o.script_pubkey),
            Output::ConfidentialTx(_) | Output::RingCt(_) => match self.anon.output(txid, n) {
                Some(rec) if rec.is(ORF_OWNED | ORF_WATCHONLY) => IsMine::WatchOnly,
                Some(rec) if rec.is(ORF_OWNED) => IsMine::Spendable,
                _ => IsMine::No,
            },
            Output::Data(_) => IsMine::No,
        }
    }

    /// Value of output `n` of `txid` as the wallet knows it.
    ///
    /// Blinded outputs without a record are worth 0.
    pub fn output_value(&self, txid: &Hash256, n: u32, output: &Output) -> Amount {
        match output.value() {
            Some(v) => v,
            None => self.anon.output(txid, n).map_or(0, |r| r.value),
        }
    }

    /// True when `tx` pays to or spends from the wallet.
    pub fn is_relevant(&self, tx: &Transaction) -> bool {
        let txid = tx.hash();
        if self.anon.contains(&txid) {
            return true;
        }
        let pays_us = tx
            .outputs()
            .iter()
            .enumerate()
            .any(|(n, o)| self.output_is_mine(&txid, n as u32, o) != IsMine::No);
        if pays_us {
            return true;
        }
        if self.spent_serials.values().any(|s| s.txid == txid) {
            return true;
        }
        tx.inputs().iter().any(|input| {
            self.txs.get(&input.prevout.hash).is_some_and(|parent| {
                parent
                    .tx
                    .outputs()
                    .get(input.prevout.n as usize)
                    .is_some_and(|o| {
                        self.output_is_mine(&input.prevout.hash, input.prevout.n, o) != IsMine::No
                    })
            })
        })
    }

    /// Record `tx` in the ledger, or update an existing entry's flags.
    ///
    /// Returns true when the transaction was new.
    pub fn add_to_wallet(
        &mut self,
        tx: Arc<Transaction>,
        from_me: bool,
        in_mempool: bool,
    ) -> Result<bool> {
        let hash = tx.hash();
        let inserted = match self.txs.get_mut(&hash) {
            Some(existing) => {
                existing.from_me |= from_me;
                existing.in_mempool |= in_mempool;
                existing.mark_dirty();
                false
            }
            None => {
                let mut wtx = WalletTx::new(tx, Utc::now());
                wtx.from_me = from_me;
                wtx.in_mempool = in_mempool;
                wtx.order_pos = self.next_order_pos;
                self.next_order_pos += 1;
                self.txs.insert(hash, wtx);
                self.add_to_spends(&hash);
                true
            }
        };
        self.persist_tx(&hash)?;
        tracing::debug!(
            "{} wallet transaction {}",
            if inserted { "Added" } else { "Updated" },
            hash
        );
        Ok(inserted)
    }

    /// Store the output records the scanner recovered for `txid`.
    pub fn add_output_record(&mut self, txid: Hash256, record: TransactionRecord) -> Result<()> {
        self.store.write_output_record(&txid, &record)?;
        self.anon.insert(txid, record);
        if let Some(wtx) = self.txs.get(&txid) {
            wtx.mark_dirty();
        }
        Ok(())
    }

    /// Process a transaction seen in the mempool or in a block.
    ///
    /// `block` carries the containing block hash and position. Wallet
    /// transactions that conflict with a confirmed transaction are marked
    /// conflicted. Returns true when the transaction is in the ledger afterwards.
    pub fn sync_transaction(
        &mut self,
        chain: &dyn Chain,
        tx: Arc<Transaction>,
        block: Option<(Hash256, u32)>,
        in_mempool: bool,
    ) -> Result<bool> {
        let hash = tx.hash();

        if let Some((block_hash, _)) = block {
            let conflicting: Vec<Hash256> = tx
                .inputs()
                .iter()
                .filter(|i| !i.is_anon_input() && !i.is_zerocoin_spend())
                .filter_map(|i| self.spends.get(&i.prevout))
                .flatten()
                .filter(|s| **s != hash)
                .copied()
                .collect();
            for other in conflicting {
                self.mark_conflicted(chain, &block_hash, &other)?;
            }
        }

        if !self.txs.contains_key(&hash) {
            if !self.is_relevant(&tx) {
                return Ok(false);
            }
            let from_me = self.tx_debit(&tx, crate::keystore::IsMineFilter::All) > 0;
            self.add_to_wallet(Arc::clone(&tx), from_me, in_mempool)?;
        }

        let has_mints = tx.is_zerocoin_mint() || tx.is_zerocoin_spend();
        if let Some(wtx) = self.txs.get_mut(&hash) {
            match block {
                Some((block_hash, index)) => {
                    if wtx.is_abandoned() {
                        tracing::info!("Abandoned transaction {} confirmed", hash);
                    }
                    wtx.state = TxState::Confirmed { block_hash, index };
                    wtx.in_mempool = false;
                }
                None => wtx.in_mempool |= in_mempool,
            }
            wtx.mark_dirty();
        }
        self.mark_inputs_dirty(&tx);
        self.persist_tx(&hash)?;

        if block.is_some() && has_mints {
            self.mints.update_status(chain, &self.params);
        }
        Ok(true)
    }

    /// Process every transaction of a newly connected block.
    pub fn block_connected(&mut self, chain: &dyn Chain, block: &ChainBlock) -> Result<()> {
        for (index, tx) in block.transactions.iter().enumerate() {
            self.sync_transaction(chain, Arc::clone(tx), Some((block.hash, index as u32)), false)?;
        }
        tracing::debug!("Block {} at height {} connected", block.hash, block.height);
        Ok(())
    }

    /// Return the transactions of a disconnected block to the unconfirmed state.
    ///
    /// Transactions conflicted by that block lose their conflict. A transaction
    /// the node put back into its mempool is flagged so again.
    pub fn block_disconnected(&mut self, chain: &dyn Chain, block: &ChainBlock) -> Result<()> {
        let affected: Vec<Hash256> = self
            .txs
            .iter()
            .filter(|(_, w)| match w.state {
                TxState::Confirmed { block_hash, .. } | TxState::Conflicted { block_hash } => {
                    block_hash == block.hash
                }
                _ => false,
            })
            .map(|(h, _)| *h)
            .collect();

        for hash in &affected {
            let Some(wtx) = self.txs.get_mut(hash) else {
                continue;
            };
            wtx.state = TxState::Unconfirmed;
            wtx.in_mempool = chain.in_mempool(hash);
            wtx.mark_dirty();
            let tx = Arc::clone(&wtx.tx);
            self.mark_inputs_dirty(&tx);
            self.persist_tx(hash)?;
        }
        if !affected.is_empty() {
            self.mints.update_status(chain, &self.params);
        }
        tracing::info!(
            "Block {} disconnected, {} wallet transactions unconfirmed",
            block.hash,
            affected.len()
        );
        Ok(())
    }

    /// The node dropped `txid` from its mempool.
    pub fn transaction_removed_from_mempool(&mut self, txid: &Hash256) {
        if let Some(wtx) = self.txs.get_mut(txid) {
            wtx.in_mempool = false;
            wtx.mark_dirty();
            tracing::debug!("Transaction {} left the mempool", txid);
        }
    }

    /// True when the wallet can count on `wtx` confirming.
    ///
    /// Unconfirmed transactions are trusted only when they are our own, in the
    /// mempool, and spend only our own spendable outputs.
    pub fn is_trusted(&self, chain: &dyn Chain, wtx: &WalletTx) -> bool {
        let depth = wtx.depth(chain);
        if depth >= 1 {
            return true;
        }
        if depth < 0 {
            return false;
        }
        if !self.config.spend_zero_conf_change || !wtx.from_me || !wtx.in_mempool {
            return false;
        }
        wtx.tx
            .inputs()
            .iter()
            .filter(|i| !i.is_anon_input() && !i.is_zerocoin_spend())
            .all(|input| {
                let Some(parent) = self.txs.get(&input.prevout.hash) else {
                    return false;
                };
                parent
                    .tx
                    .outputs()
                    .get(input.prevout.n as usize)
                    .is_some_and(|o| {
                        self.output_is_mine(&input.prevout.hash, input.prevout.n, o)
                            == IsMine::Spendable
                    })
            })
    }

    /// Exclude an outpoint from coin selection.
    pub fn lock_coin(&mut self, outpoint: OutPoint) {
        self.locked_coins.insert(outpoint);
    }

    /// Allow an outpoint again.
    pub fn unlock_coin(&mut self, outpoint: &OutPoint) {
        self.locked_coins.remove(outpoint);
    }

    /// Clear every coin lock.
    pub fn unlock_all_coins(&mut self) {
        self.locked_coins.clear();
    }

    /// True when the outpoint is locked.
    pub fn is_locked_coin(&self, outpoint: &OutPoint) -> bool {
        self.locked_coins.contains(outpoint)
    }

    /// Locked outpoints, sorted.
    pub fn list_locked_coins(&self) -> Vec<OutPoint> {
        let mut out: Vec<OutPoint> = self.locked_coins.iter().copied().collect();
        out.sort();
        out
    }

    pub(crate) fn persist_tx(&self, hash: &Hash256) -> Result<()> {
        let wtx = self
            .txs
            .get(hash)
            .ok_or_else(|| Error::TransactionNotFound(hash.to_string()))?;
        self.store.write_tx(&WalletTxRecord::from_wallet_tx(wtx))?;
        Ok(())
    }

    pub(crate) fn mark_inputs_dirty(&self, tx: &Transaction) {
        for input in tx.inputs() {
            if let Some(parent) = self.txs.get(&input.prevout.hash) {
                parent.mark_dirty();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::IsMineFilter;
    use crate::primitives::{MutableTransaction, OutputKind, RingCtOutput, Script, TxIn};
    use crate::records::OutputRecord;
    use crate::store::MemoryStore;
    use crate::testing::MockChain;
    use veil_params::{NetworkType, COIN};

    fn wallet() -> Wallet {
        Wallet::new(
            WalletConfig::for_network(NetworkType::Regtest),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    fn pay(script: &Script, value: Amount, salt: u8) -> Arc<Transaction> {
        let mut tx = MutableTransaction::new();
        tx.inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([salt; 32]), 0)));
        tx.outputs.push(Output::standard(value, script.clone()));
        Arc::new(tx.freeze())
    }

    #[test]
    fn test_irrelevant_transaction_ignored() {
        let chain = MockChain::new();
        let mut w = wallet();
        let tx = pay(&Script::pay_to_pubkey(&[2u8; 33]), COIN, 1);
        assert!(!w.sync_transaction(&chain, tx, None, true).unwrap());
        assert_eq!(w.tx_count(), 0);
    }

    #[test]
    fn test_sync_confirms_and_persists() {
        let chain = MockChain::new();
        let mut w = wallet();
        let pk = w.keystore_mut().generate_key();
        let tx = pay(&Script::pay_to_pubkey(&pk), COIN, 1);
        let block = chain.mine_block(vec![Arc::clone(&tx)]);

        assert!(w.sync_transaction(&chain, Arc::clone(&tx), None, true).unwrap());
        assert!(w.get_tx(&tx.hash()).unwrap().in_mempool);

        w.sync_transaction(&chain, Arc::clone(&tx), Some((block, 0)), false)
            .unwrap();
        let wtx = w.get_tx(&tx.hash()).unwrap();
        assert_eq!(wtx.depth(&chain), 1);
        assert!(!wtx.in_mempool);

        let reloaded = Wallet::load(w.config.clone(), Arc::clone(&w.store)).unwrap();
        assert_eq!(
            reloaded.get_tx(&tx.hash()).unwrap().state,
            TxState::Confirmed {
                block_hash: block,
                index: 0
            }
        );
    }

    #[test]
    fn test_blinded_output_ownership_from_records() {
        let mut w = wallet();
        let mut tx = MutableTransaction::new();
        tx.outputs.push(Output::RingCt(RingCtOutput {
            pubkey: [2u8; 33],
            commitment: [8u8; 33],
            data: vec![],
            range_proof: vec![],
        }));
        let tx = tx.freeze();
        let txid = tx.hash();
        assert_eq!(w.output_is_mine(&txid, 0, &tx.outputs()[0]), IsMine::No);

        let mut record = TransactionRecord::default();
        record.insert(OutputRecord::owned(OutputKind::RingCt, 0, 3 * COIN));
        w.add_output_record(txid, record).unwrap();
        assert_eq!(w.output_is_mine(&txid, 0, &tx.outputs()[0]), IsMine::Spendable);
        assert_eq!(w.output_value(&txid, 0, &tx.outputs()[0]), 3 * COIN);
        assert!(w.is_relevant(&tx));
    }

    #[test]
    fn test_trust_requires_own_mempool_tx() {
        let chain = MockChain::new();
        let mut w = wallet();
        let pk = w.keystore_mut().generate_key();
        let script = Script::pay_to_pubkey(&pk);

        let incoming = pay(&script, COIN, 1);
        w.add_to_wallet(Arc::clone(&incoming), false, true).unwrap();
        assert!(!w.is_trusted(&chain, w.get_tx(&incoming.hash()).unwrap()));

        let mut own = MutableTransaction::new();
        own.inputs.push(TxIn::new(OutPoint::new(incoming.hash(), 0)));
        own.outputs.push(Output::standard(COIN / 2, script));
        let own = Arc::new(own.freeze());
        w.add_to_wallet(Arc::clone(&own), true, true).unwrap();
        assert!(w.is_trusted(&chain, w.get_tx(&own.hash()).unwrap()));
        assert_eq!(w.tx_debit(&own, IsMineFilter::All), COIN);

        w.transaction_removed_from_mempool(&own.hash());
        assert!(!w.is_trusted(&chain, w.get_tx(&own.hash()).unwrap()));
    }

    #[test]
    fn test_coin_locks() {
        let mut w = wallet();
        let a = OutPoint::new(Hash256::from_bytes([1u8; 32]), 0);
        let b = OutPoint::new(Hash256::from_bytes([2u8; 32]), 1);
        w.lock_coin(b);
        w.lock_coin(a);
        assert!(w.is_locked_coin(&a));
        assert_eq!(w.list_locked_coins(), vec![a, b]);
        w.unlock_coin(&a);
        assert!(!w.is_locked_coin(&a));
        w.unlock_all_coins();
        assert!(w.list_locked_coins().is_empty());
    }
}
