//! In-memory chain, prover and wallet fixtures for tests
//!
//! [`MockChain`] keeps blocks, a mempool with conflict checks and the zerocoin
//! serial and mint indexes. [`MockProver`] produces transparent "proofs" that
//! bind a serial to an outputs hash and a checkpoint.

use crate::chain::{Chain, ChainBlock, MintLocation};
use crate::config::WalletConfig;
use crate::fees::FeeRate;
use crate::primitives::{sha256, Hash256, MutableTransaction, OutPoint, Output, Script, Transaction, TxIn};
use crate::store::{MemoryStore, WalletStore};
use crate::wallet::Wallet;
use crate::zerocoin::{
    pubcoin_hash, serial_hash, AccumulatorWitness, CoinSpend, Denomination, Mint, MintMeta,
    ProverError, ZerocoinProver,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use veil_params::{Amount, NetworkType};

#[derive(Default)]
struct ChainState {
    blocks: Vec<ChainBlock>,
    heights: HashMap<Hash256, u32>,
    mempool: Vec<Arc<Transaction>>,
    spent: HashMap<OutPoint, u32>,
    serials: HashMap<Hash256, (Hash256, u32)>,
    mints: HashMap<Hash256, MintLocation>,
    fee_estimate: Option<FeeRate>,
    reject_all: bool,
    fail_after: Option<usize>,
    accepted: usize,
    relayed: usize,
    counter: u64,
}

impl ChainState {
    fn height(&self) -> u32 {
        self.blocks.len() as u32
    }

    fn next_hash(&mut self) -> Hash256 {
        self.counter += 1;
        let mut buf = b"mock-block".to_vec();
        buf.extend_from_slice(&self.counter.to_le_bytes());
        sha256(&buf)
    }

    fn mempool_spends(&self, outpoint: &OutPoint) -> bool {
        self.mempool
            .iter()
            .any(|tx| tx.inputs().iter().any(|i| i.prevout == *outpoint))
    }

    fn mempool_serials(&self) -> HashSet<Hash256> {
        self.mempool.iter().flat_map(|tx| spend_serials(tx)).collect()
    }

    fn connect(&mut self, transactions: Vec<Arc<Transaction>>) -> Hash256 {
        let hash = self.next_hash();
        let height = self.height() + 1;

        for tx in &transactions {
            let txid = tx.hash();
            self.mempool
                .retain(|m| m.hash() != txid && !conflicts(tx, m));
            for prevout in plain_prevouts(tx) {
                self.spent.insert(prevout, height);
            }
            for serial in spend_serials(tx) {
                self.serials.insert(serial, (txid, height));
            }
            for output in tx.outputs() {
                if let Some(pubcoin) = output.script_pubkey().and_then(|s| s.zerocoin_mint_pubcoin()) {
                    self.mints
                        .insert(pubcoin_hash(&pubcoin), MintLocation { height, txid });
                }
            }
        }

        self.heights.insert(hash, height);
        self.blocks.push(ChainBlock {
            hash,
            height,
            transactions,
        });
        hash
    }
}

fn conflicts(tx: &Transaction, other: &Transaction) -> bool {
    let ours: HashSet<OutPoint> = plain_prevouts(tx).collect();
    if plain_prevouts(other).any(|p| ours.contains(&p)) {
        return true;
    }
    let serials: HashSet<Hash256> = spend_serials(tx).collect();
    spend_serials(other).any(|s| serials.contains(&s))
}

fn plain_prevouts(tx: &Transaction) -> impl Iterator<Item = OutPoint> + '_ {
    tx.inputs()
        .iter()
        .filter(|i| !i.prevout.is_null() && !i.is_anon_input() && !i.is_zerocoin_spend())
        .map(|i| i.prevout)
}

fn spend_serials(tx: &Transaction) -> impl Iterator<Item = Hash256> + '_ {
    tx.inputs()
        .iter()
        .filter_map(|i| i.script_sig.zerocoin_spend_payload())
        .filter_map(parse_mock_spend)
        .map(|s| serial_hash(&s.serial))
}

/// Chain backed by memory. Methods take `&self`; state sits behind a mutex.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    /// Empty chain at height 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set what [`Chain::estimate_fee`] returns.
    pub fn set_fee_estimate(&self, rate: Option<FeeRate>) {
        self.state.lock().fee_estimate = rate;
    }

    /// Refuse every mempool submission.
    pub fn reject_all(&self, reject: bool) {
        self.state.lock().reject_all = reject;
    }

    /// Refuse real submissions once `n` more have been accepted.
    pub fn fail_after(&self, n: usize) {
        let mut s = self.state.lock();
        s.fail_after = Some(s.accepted + n);
    }

    /// Number of successful relays.
    pub fn relay_count(&self) -> usize {
        self.state.lock().relayed
    }

    /// Mempool contents in arrival order.
    pub fn mempool(&self) -> Vec<Arc<Transaction>> {
        self.state.lock().mempool.clone()
    }

    /// Connect a block holding `transactions`. Returns its hash.
    pub fn mine_block(&self, transactions: Vec<Arc<Transaction>>) -> Hash256 {
        self.state.lock().connect(transactions)
    }

    /// Connect `n` empty blocks.
    pub fn mine_empty_blocks(&self, n: u32) -> Vec<Hash256> {
        let mut s = self.state.lock();
        (0..n).map(|_| s.connect(Vec::new())).collect()
    }

    /// Connect a block holding the whole mempool.
    pub fn mine_mempool(&self) -> Hash256 {
        let mut s = self.state.lock();
        let txs = s.mempool.clone();
        s.connect(txs)
    }

    /// Connect a block confirming `mint`.
    pub fn mine_mint(&self, mint: &Mint) -> Hash256 {
        let mut s = self.state.lock();
        let hash = s.connect(Vec::new());
        let height = s.height();
        let txid = if mint.txid.is_null() {
            sha256(&mint.pubcoin)
        } else {
            mint.txid
        };
        s.mints
            .insert(mint.hash_pubcoin(), MintLocation { height, txid });
        hash
    }

    /// Drop a mint from the mint index, as if its block was never seen.
    pub fn forget_mint(&self, hash_pubcoin: &Hash256) {
        self.state.lock().mints.remove(hash_pubcoin);
    }

    /// Block at the tip.
    pub fn tip_block(&self) -> Option<ChainBlock> {
        self.state.lock().blocks.last().cloned()
    }

    /// Disconnect the tip. Its transactions return to the mempool.
    pub fn disconnect_tip(&self) -> Option<ChainBlock> {
        let mut s = self.state.lock();
        let block = s.blocks.pop()?;
        let height = block.height;
        s.heights.remove(&block.hash);
        s.spent.retain(|_, h| *h != height);
        s.serials.retain(|_, (_, h)| *h != height);
        s.mints.retain(|_, loc| loc.height != height);
        for tx in &block.transactions {
            if !tx.is_coinbase() && !tx.is_coinstake() {
                s.mempool.push(Arc::clone(tx));
            }
        }
        Some(block)
    }
}

impl Chain for MockChain {
    fn height(&self) -> u32 {
        self.state.lock().height()
    }

    fn block_depth(&self, block_hash: &Hash256) -> Option<u32> {
        let s = self.state.lock();
        s.heights.get(block_hash).map(|h| s.height() - h + 1)
    }

    fn block_at(&self, height: u32) -> Option<ChainBlock> {
        let s = self.state.lock();
        height
            .checked_sub(1)
            .and_then(|i| s.blocks.get(i as usize))
            .cloned()
    }

    fn is_final(&self, tx: &Transaction) -> bool {
        tx.lock_time() == 0 || tx.lock_time() <= self.state.lock().height()
    }

    fn in_mempool(&self, txid: &Hash256) -> bool {
        self.state.lock().mempool.iter().any(|t| t.hash() == *txid)
    }

    fn accept_to_mempool(
        &self,
        tx: &Arc<Transaction>,
        _max_fee: Amount,
        test_accept: bool,
    ) -> std::result::Result<(), String> {
        let mut s = self.state.lock();
        if s.reject_all {
            return Err("rejected by policy".to_string());
        }
        if !test_accept && s.fail_after.is_some_and(|n| s.accepted >= n) {
            return Err("mempool full".to_string());
        }
        let txid = tx.hash();
        if s.mempool.iter().any(|t| t.hash() == txid) {
            return Err("txn-already-in-mempool".to_string());
        }
        for prevout in plain_prevouts(tx) {
            if s.spent.contains_key(&prevout) {
                return Err("bad-txns-inputs-missingorspent".to_string());
            }
            if s.mempool_spends(&prevout) {
                return Err("txn-mempool-conflict".to_string());
            }
        }
        let pending = s.mempool_serials();
        for serial in spend_serials(tx) {
            if s.serials.contains_key(&serial) || pending.contains(&serial) {
                return Err("bad-txns-serial-spent".to_string());
            }
        }
        if !test_accept {
            s.mempool.push(Arc::clone(tx));
            s.accepted += 1;
        }
        Ok(())
    }

    fn relay(&self, tx: &Arc<Transaction>) -> bool {
        let mut s = self.state.lock();
        let txid = tx.hash();
        if s.mempool.iter().any(|t| t.hash() == txid) {
            s.relayed += 1;
            true
        } else {
            false
        }
    }

    fn is_serial_in_chain(&self, hash_serial: &Hash256) -> Option<Hash256> {
        self.state.lock().serials.get(hash_serial).map(|(txid, _)| *txid)
    }

    fn remove_serial(&self, hash_serial: &Hash256) {
        self.state.lock().serials.remove(hash_serial);
    }

    fn mint_in_chain(&self, hash_pubcoin: &Hash256) -> Option<MintLocation> {
        self.state.lock().mints.get(hash_pubcoin).copied()
    }

    fn accumulator_checkpoint(&self, height: u32) -> Option<Hash256> {
        if height > self.state.lock().height() {
            return None;
        }
        let mut buf = b"checkpoint".to_vec();
        buf.extend_from_slice(&height.to_le_bytes());
        Some(sha256(&buf))
    }

    fn transaction_ancestry(&self, txid: &Hash256) -> (usize, usize) {
        let s = self.state.lock();
        let by_hash: HashMap<Hash256, &Arc<Transaction>> =
            s.mempool.iter().map(|t| (t.hash(), t)).collect();
        if !by_hash.contains_key(txid) {
            return (0, 0);
        }

        let mut ancestors = HashSet::new();
        let mut stack = vec![*txid];
        while let Some(h) = stack.pop() {
            if let Some(tx) = by_hash.get(&h) {
                for input in tx.inputs() {
                    let parent = input.prevout.hash;
                    if by_hash.contains_key(&parent) && ancestors.insert(parent) {
                        stack.push(parent);
                    }
                }
            }
        }

        let mut descendants = HashSet::new();
        let mut stack = vec![*txid];
        while let Some(h) = stack.pop() {
            for tx in s.mempool.iter() {
                let child = tx.hash();
                if tx.inputs().iter().any(|i| i.prevout.hash == h) && descendants.insert(child) {
                    stack.push(child);
                }
            }
        }
        (1 + ancestors.len(), 1 + descendants.len())
    }

    fn estimate_fee(&self, _confirm_target: u32) -> Option<FeeRate> {
        self.state.lock().fee_estimate
    }
}

/// Length of a mock pubcoin: denomination prefix and a hash.
const MOCK_PUBCOIN_LEN: usize = 36;
/// Length of a mock spend proof.
const MOCK_SPEND_LEN: usize = 100;

/// Fields carried by a mock spend proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSpend {
    /// Revealed serial
    pub serial: [u8; 32],
    /// Denomination value
    pub denomination: u32,
    /// Outputs hash the proof is bound to
    pub outputs_hash: Hash256,
    /// Checkpoint the witness was built against
    pub checkpoint: Hash256,
}

/// Decode a proof made by [`MockProver`].
pub fn parse_mock_spend(bytes: &[u8]) -> Option<MockSpend> {
    if bytes.len() != MOCK_SPEND_LEN {
        return None;
    }
    let serial: [u8; 32] = bytes[0..32].try_into().ok()?;
    let denomination = u32::from_le_bytes(bytes[32..36].try_into().ok()?);
    let outputs_hash = Hash256::from_bytes(bytes[36..68].try_into().ok()?);
    let checkpoint = Hash256::from_bytes(bytes[68..100].try_into().ok()?);
    Some(MockSpend {
        serial,
        denomination,
        outputs_hash,
        checkpoint,
    })
}

/// Prover with transparent proofs. Failures can be switched on per stage.
#[derive(Debug, Default)]
pub struct MockProver {
    fail_witness: AtomicBool,
    fail_proof: AtomicBool,
}

impl MockProver {
    /// Prover that succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make witness construction fail.
    pub fn fail_witness(&self, fail: bool) {
        self.fail_witness.store(fail, Ordering::SeqCst);
    }

    /// Make proof generation fail.
    pub fn fail_proof(&self, fail: bool) {
        self.fail_proof.store(fail, Ordering::SeqCst);
    }
}

impl ZerocoinProver for MockProver {
    fn commit(
        &self,
        denom: Denomination,
        serial: &[u8; 32],
        randomness: &[u8; 32],
    ) -> Result<Vec<u8>, ProverError> {
        let mut buf = serial.to_vec();
        buf.extend_from_slice(randomness);
        let mut pubcoin = denom.value().to_le_bytes().to_vec();
        pubcoin.extend_from_slice(sha256(&buf).as_bytes());
        Ok(pubcoin)
    }

    fn validate_pubcoin(&self, denom: Denomination, pubcoin: &[u8]) -> bool {
        pubcoin.len() == MOCK_PUBCOIN_LEN && pubcoin[..4] == denom.value().to_le_bytes()
    }

    fn build_witness(
        &self,
        denom: Denomination,
        pubcoin: &[u8],
        checkpoint: &Hash256,
        security_level: u32,
    ) -> Result<AccumulatorWitness, ProverError> {
        if self.fail_witness.load(Ordering::SeqCst) {
            return Err(ProverError::Witness("accumulator unavailable".to_string()));
        }
        let mut buf = pubcoin.to_vec();
        buf.extend_from_slice(checkpoint.as_bytes());
        Ok(AccumulatorWitness {
            denomination: denom,
            checkpoint: *checkpoint,
            security_level,
            data: sha256(&buf).as_bytes().to_vec(),
        })
    }

    fn prove(
        &self,
        mint: &Mint,
        witness: &AccumulatorWitness,
        outputs_hash: &Hash256,
    ) -> Result<CoinSpend, ProverError> {
        if self.fail_proof.load(Ordering::SeqCst) {
            return Err(ProverError::Proof("proof generation failed".to_string()));
        }
        if witness.denomination != mint.denomination {
            return Err(ProverError::InvalidCoin("denomination mismatch".to_string()));
        }
        let mut bytes = Vec::with_capacity(MOCK_SPEND_LEN);
        bytes.extend_from_slice(mint.serial());
        bytes.extend_from_slice(&mint.denomination.value().to_le_bytes());
        bytes.extend_from_slice(outputs_hash.as_bytes());
        bytes.extend_from_slice(witness.checkpoint.as_bytes());
        Ok(CoinSpend {
            serial: *mint.serial(),
            hash_serial: mint.hash_serial(),
            denomination: mint.denomination,
            bytes,
        })
    }

    fn verify(&self, spend: &CoinSpend, outputs_hash: &Hash256, checkpoint: &Hash256) -> bool {
        parse_mock_spend(&spend.bytes).is_some_and(|s| {
            s.serial == spend.serial
                && s.denomination == spend.denomination.value()
                && s.outputs_hash == *outputs_hash
                && s.checkpoint == *checkpoint
        })
    }
}

/// A regtest wallet with one key, wired to a [`MockChain`].
pub struct WalletFixture {
    /// Chain
    pub chain: MockChain,
    /// Prover
    pub prover: MockProver,
    /// Wallet under test
    pub wallet: Wallet,
    /// Backing store, for failure injection
    pub store: Arc<MemoryStore>,
    /// Script paying the wallet's key
    pub script: Script,
    salt: u64,
}

impl WalletFixture {
    /// Regtest fixture.
    pub fn new() -> Self {
        Self::with_config(WalletConfig::for_network(NetworkType::Regtest))
    }

    /// Fixture with a custom configuration.
    pub fn with_config(config: WalletConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mut wallet = Wallet::new(config, Arc::clone(&store) as Arc<dyn WalletStore>)
            .expect("fixture wallet config is valid");
        let pubkey = wallet.keystore_mut().generate_key();
        wallet.set_mint_seed([0x5a; 32]);
        Self {
            chain: MockChain::new(),
            prover: MockProver::new(),
            wallet,
            store,
            script: Script::pay_to_pubkey(&pubkey),
            salt: 0,
        }
    }

    fn funding_tx(&mut self, values: &[Amount]) -> Arc<Transaction> {
        self.salt += 1;
        let mut buf = b"fixture-funding".to_vec();
        buf.extend_from_slice(&self.salt.to_le_bytes());
        let mut tx = MutableTransaction::new();
        tx.inputs.push(TxIn::new(OutPoint::new(sha256(&buf), 0)));
        for value in values {
            tx.outputs.push(Output::standard(*value, self.script.clone()));
        }
        Arc::new(tx.freeze())
    }

    /// Pay `values` to the wallet in one confirmed transaction.
    pub fn fund(&mut self, values: &[Amount]) -> Arc<Transaction> {
        let tx = self.funding_tx(values);
        self.chain.mine_block(vec![Arc::clone(&tx)]);
        self.connect_tip();
        tx
    }

    /// Pay `values` to the wallet in a mempool transaction.
    pub fn fund_unconfirmed(&mut self, values: &[Amount]) -> Arc<Transaction> {
        let tx = self.funding_tx(values);
        self.chain
            .accept_to_mempool(&tx, Amount::MAX, false)
            .expect("fixture funding accepted");
        self.wallet
            .sync_transaction(&self.chain, Arc::clone(&tx), None, true)
            .expect("fixture funding synced");
        tx
    }

    /// Mine the mempool and tell the wallet.
    pub fn mine_mempool(&mut self) -> Hash256 {
        let hash = self.chain.mine_mempool();
        self.connect_tip();
        hash
    }

    /// Mine `n` empty blocks.
    pub fn mine_empty_blocks(&mut self, n: u32) {
        self.chain.mine_empty_blocks(n);
    }

    /// Disconnect the tip and tell the wallet.
    pub fn disconnect_tip(&mut self) -> Option<ChainBlock> {
        let block = self.chain.disconnect_tip()?;
        self.wallet
            .block_disconnected(&self.chain, &block)
            .expect("fixture disconnect");
        Some(block)
    }

    fn connect_tip(&mut self) {
        if let Some(block) = self.chain.tip_block() {
            self.wallet
                .block_connected(&self.chain, &block)
                .expect("fixture connect");
        }
    }

    /// Give the wallet confirmed, mature mints of `denoms`.
    pub fn add_mature_mints(&mut self, denoms: &[Denomination]) -> Vec<MintMeta> {
        let mut hashes = Vec::with_capacity(denoms.len());
        for denom in denoms {
            let mint = self
                .wallet
                .mint_generator
                .as_mut()
                .expect("fixture mint seed set")
                .generate(&self.prover, *denom)
                .expect("fixture mint generated");
            self.chain.mine_mint(&mint);
            self.store.write_mint(&mint).expect("fixture mint stored");
            hashes.push(mint.hash_serial());
            self.wallet.mints.add(mint);
        }
        let params = self.wallet.params().clone();
        self.chain.mine_empty_blocks(params.zerocoin_mint_maturity);
        self.wallet.mints.update_status(&self.chain, &params);
        hashes
            .iter()
            .filter_map(|h| self.wallet.mints.get(h).cloned())
            .collect()
    }
}

impl Default for WalletFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::TxType;
    use veil_params::COIN;

    fn pay(salt: u8) -> Arc<Transaction> {
        let mut tx = MutableTransaction::new();
        tx.inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([salt; 32]), 0)));
        tx.outputs
            .push(Output::standard(COIN, Script::pay_to_pubkey(&[2u8; 33])));
        Arc::new(tx.freeze())
    }

    #[test]
    fn test_mempool_conflicts() {
        let chain = MockChain::new();
        let a = pay(1);
        chain.accept_to_mempool(&a, COIN, false).unwrap();
        assert!(chain.accept_to_mempool(&a, COIN, false).is_err());

        let mut double = a.to_mutable();
        double.outputs[0].set_value(COIN / 2);
        let double = Arc::new(double.freeze());
        assert_eq!(
            chain.accept_to_mempool(&double, COIN, true),
            Err("txn-mempool-conflict".to_string())
        );

        chain.mine_block(vec![Arc::clone(&double)]);
        assert!(!chain.in_mempool(&a.hash()));
    }

    #[test]
    fn test_disconnect_returns_to_mempool() {
        let chain = MockChain::new();
        let tx = pay(2);
        let mut cb = MutableTransaction::new();
        cb.tx_type = TxType::Coinbase;
        cb.inputs.push(TxIn::new(OutPoint::null()));
        cb.outputs.push(Output::standard(COIN, Script::new()));
        let cb = Arc::new(cb.freeze());

        let hash = chain.mine_block(vec![Arc::clone(&cb), Arc::clone(&tx)]);
        assert_eq!(chain.block_depth(&hash), Some(1));
        let block = chain.disconnect_tip().unwrap();
        assert_eq!(block.hash, hash);
        assert!(chain.in_mempool(&tx.hash()));
        assert!(!chain.in_mempool(&cb.hash()));
        assert_eq!(chain.block_depth(&hash), None);
    }

    #[test]
    fn test_fail_after_counts_real_submissions() {
        let chain = MockChain::new();
        chain.fail_after(1);
        chain.accept_to_mempool(&pay(3), COIN, true).unwrap();
        chain.accept_to_mempool(&pay(4), COIN, false).unwrap();
        assert!(chain.accept_to_mempool(&pay(5), COIN, false).is_err());
        assert!(chain.accept_to_mempool(&pay(5), COIN, true).is_ok());
    }

    #[test]
    fn test_mock_proof_binds_outputs() {
        let prover = MockProver::new();
        let mint = Mint::new(
            Denomination::Ten,
            [1u8; 32],
            [2u8; 32],
            prover
                .commit(Denomination::Ten, &[1u8; 32], &[2u8; 32])
                .unwrap(),
            None,
        );
        assert!(prover.validate_pubcoin(Denomination::Ten, &mint.pubcoin));
        assert!(!prover.validate_pubcoin(Denomination::OneHundred, &mint.pubcoin));

        let checkpoint = Hash256::from_bytes([9u8; 32]);
        let witness = prover
            .build_witness(Denomination::Ten, &mint.pubcoin, &checkpoint, 100)
            .unwrap();
        let bound = Hash256::from_bytes([4u8; 32]);
        let spend = prover.prove(&mint, &witness, &bound).unwrap();
        assert!(prover.verify(&spend, &bound, &checkpoint));
        assert!(!prover.verify(&spend, &Hash256::ZERO, &checkpoint));
        assert_eq!(parse_mock_spend(&spend.bytes).unwrap().serial, [1u8; 32]);
    }
}
