//! Zerocoin spend protocol
//!
//! A spend is prepared in batches of at most
//! `zerocoin_max_spends_per_transaction` mints. Every batch is built, proven and
//! test-accepted before anything is submitted. Commit then submits the batches
//! in order; a refused batch is rolled back and earlier batches stay committed.

use super::denomination::{denominations_for_amount, Denomination};
use super::mint::{Mint, MintMeta};
use super::prover::{CoinSpend, ProverError, ZerocoinProver};
use super::select::select_mints_from_list;
use super::ZerocoinStatus;
use crate::chain::Chain;
use crate::coin_control::CoinControl;
use crate::keystore::IsMineFilter;
use crate::primitives::{
    outputs_hash, Hash256, MutableTransaction, Output, Script, Transaction, TxIn,
    SEQUENCE_LOCKTIME_DISABLE_FLAG,
};
use crate::store::ZerocoinSpendRecord;
use crate::transaction::Recipient;
use crate::wallet::Wallet;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use veil_params::{Amount, COIN};

/// Security level version 1 mints must be spent at
const V1_SECURITY_LEVEL: u32 = 100;

/// What to spend and where to send it.
#[derive(Debug, Clone)]
pub struct ZerocoinSpendRequest {
    /// Value to send, rounded up to a whole coin
    pub value: Amount,
    /// Accumulator witness security level
    pub security_level: u32,
    /// Spend only mints of this denomination
    pub denomination: Option<Denomination>,
    /// Destination of the spent value
    pub address: Option<Script>,
    /// Re-mint change instead of paying it to a plain output
    pub mint_change: bool,
    /// Prefer the selection with the least change
    pub minimize_change: bool,
    /// Restrict the mints considered
    pub coin_control: Option<CoinControl>,
}

impl ZerocoinSpendRequest {
    /// Request sending `value` to `address` with default options.
    pub fn new(value: Amount, address: Script) -> Self {
        Self {
            value,
            security_level: V1_SECURITY_LEVEL,
            denomination: None,
            address: Some(address),
            mint_change: true,
            minimize_change: false,
            coin_control: None,
        }
    }
}

/// One spend transaction and what it consumes and creates.
#[derive(Debug, Clone)]
pub struct ZerocoinSpendBatch {
    /// Signed spend transaction
    pub tx: Arc<Transaction>,
    /// Value paid to the destination
    pub value: Amount,
    /// Proofs, one per input
    pub spends: Vec<CoinSpend>,
    /// Mints consumed
    pub spent: Vec<MintMeta>,
    /// Change mints created
    pub new_mints: Vec<Mint>,
}

/// Progress and result of a spend.
#[derive(Debug, Clone)]
pub struct ZerocoinSpendReceipt {
    /// Current status
    pub status: ZerocoinStatus,
    /// Human-readable status message
    pub message: String,
    /// Batches in submission order
    pub batches: Vec<ZerocoinSpendBatch>,
    /// Batches accepted by the mempool
    pub committed_batches: usize,
}

impl Default for ZerocoinSpendReceipt {
    fn default() -> Self {
        Self {
            status: ZerocoinStatus::SpendError,
            message: String::new(),
            batches: Vec::new(),
            committed_batches: 0,
        }
    }
}

impl ZerocoinSpendReceipt {
    fn set_status(&mut self, status: ZerocoinStatus, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
    }

    /// Spend transactions in submission order.
    pub fn transactions(&self) -> Vec<Arc<Transaction>> {
        self.batches.iter().map(|b| Arc::clone(&b.tx)).collect()
    }

    /// Spend txids in submission order.
    pub fn txids(&self) -> Vec<Hash256> {
        self.batches.iter().map(|b| b.tx.hash()).collect()
    }

    /// Proofs of every batch.
    pub fn spends(&self) -> impl Iterator<Item = &CoinSpend> {
        self.batches.iter().flat_map(|b| b.spends.iter())
    }

    /// Value paid to the destination across all batches.
    pub fn value(&self) -> Amount {
        self.batches.iter().map(|b| b.value).sum()
    }
}

impl Wallet {
    /// Select mints for `request`, build and prove every batch and test-accept
    /// each one. Nothing is submitted.
    ///
    /// On failure every spend row and change mint written for the prepared
    /// batches is removed again.
    pub fn prepare_zerocoin_spend(
        &mut self,
        chain: &dyn Chain,
        prover: &dyn ZerocoinProver,
        request: &ZerocoinSpendRequest,
    ) -> Result<ZerocoinSpendReceipt> {
        if self.is_locked() {
            return Err(Error::zerocoin(
                ZerocoinStatus::WalletLocked,
                "Error: Wallet locked, unable to create transaction!",
            ));
        }

        let (selected, value) = self.collect_mints_for_spend(
            chain,
            request.value,
            request.denomination,
            request.minimize_change,
            request.coin_control.as_ref(),
        )?;

        let max_spends = self.params.zerocoin_max_spends_per_transaction.max(1);
        let batch_count = selected.len().div_ceil(max_spends);
        let mut receipt = ZerocoinSpendReceipt::default();
        let mut remaining = value;

        for (i, chunk) in selected.chunks(max_spends).enumerate() {
            let batch_value = if i + 1 == batch_count {
                remaining
            } else {
                chunk
                    .iter()
                    .map(|m| m.denom.amount())
                    .sum::<Amount>()
                    .min(remaining)
            };

            let batch = match self.create_zerocoin_spend_transaction(
                chain,
                prover,
                batch_value,
                request.security_level,
                chunk,
                request.address.as_ref(),
                request.mint_change,
            ) {
                Ok(batch) => batch,
                Err(e) => {
                    self.discard_prepared(chain, &receipt.batches);
                    return Err(e);
                }
            };

            let test = chain.accept_to_mempool(&batch.tx, self.config.max_tx_fee, true);
            receipt.batches.push(batch);
            if let Err(reason) = test {
                tracing::warn!("Zerocoin spend batch {} failed mempool test: {}", i + 1, reason);
                self.discard_prepared(chain, &receipt.batches);
                return Err(Error::zerocoin(
                    ZerocoinStatus::CommitFailed,
                    format!("Transaction failed mempool test: {}", reason),
                ));
            }
            remaining -= batch_value;
        }

        receipt.set_status(ZerocoinStatus::SpendPrepared, "Spend prepared");
        tracing::info!(
            "Prepared zerocoin spend of {} in {} batches",
            value,
            receipt.batches.len()
        );
        Ok(receipt)
    }

    /// Choose the mints that cover `value`.
    ///
    /// Returns the mints, oldest first, and the value rounded up to a whole coin.
    pub fn collect_mints_for_spend(
        &mut self,
        chain: &dyn Chain,
        value: Amount,
        denomination: Option<Denomination>,
        minimize_change: bool,
        coin_control: Option<&CoinControl>,
    ) -> Result<(Vec<MintMeta>, Amount)> {
        if value <= 0 {
            return Err(Error::zerocoin(
                ZerocoinStatus::TrxFundsProblems,
                "Spend value must be positive",
            ));
        }
        let balance = self.mints.chain_balances(chain, &self.params).spendable;
        if value > balance {
            return Err(Error::zerocoin(
                ZerocoinStatus::TrxFundsProblems,
                format!(
                    "You don't have enough Zerocoins in your wallet. Balance: {} Needed: {}",
                    balance, value
                ),
            ));
        }

        let value = if value % COIN != 0 {
            (value / COIN + 1) * COIN
        } else {
            value
        };

        self.mints.update_status(chain, &self.params);
        let available = self.mints.available_zerocoins(coin_control);
        if available.is_empty() {
            return Err(Error::zerocoin(
                ZerocoinStatus::TrxFundsProblems,
                "Failed to find Zerocoins in wallet",
            ));
        }

        let mut held: BTreeMap<Denomination, usize> = self.mints.mint_distribution();
        if let Some(only) = denomination {
            for (denom, count) in held.iter_mut() {
                if *denom != only {
                    *count = 0;
                }
            }
        }

        let selection = select_mints_from_list(
            value,
            self.params.zerocoin_max_spends_per_transaction,
            minimize_change,
            &available,
            &held,
        );
        if selection.mints.is_empty() || selection.selected_value < value {
            return Err(Error::zerocoin(
                ZerocoinStatus::TrxFundsProblems,
                "Failed to select Zerocoins that cover the spend",
            ));
        }
        Ok((selection.mints, value))
    }

    /// Build and prove one spend transaction over `mints`.
    ///
    /// Spent-serial rows and change mints are written to the store here; they
    /// are erased again if the batch is not committed.
    #[allow(clippy::too_many_arguments)]
    pub fn create_zerocoin_spend_transaction(
        &mut self,
        chain: &dyn Chain,
        prover: &dyn ZerocoinProver,
        value: Amount,
        security_level: u32,
        mints: &[MintMeta],
        address: Option<&Script>,
        mint_change: bool,
    ) -> Result<ZerocoinSpendBatch> {
        let max_spends = self.params.zerocoin_max_spends_per_transaction;
        if mints.is_empty() || mints.len() > max_spends {
            return Err(Error::zerocoin(
                ZerocoinStatus::TrxFundsProblems,
                format!(
                    "Failed to find coin set amongst held coins with less than {} spends",
                    max_spends
                ),
            ));
        }
        if value <= 0 {
            return Err(Error::zerocoin(
                ZerocoinStatus::TrxCreate,
                "Spend batch carries no value",
            ));
        }

        let mut archived = false;
        for meta in mints {
            if let Some(txid) = chain.is_serial_in_chain(&meta.hash_serial) {
                self.mints.set_pubcoin_used(&meta.hash_pubcoin, txid);
                return Err(Error::zerocoin(
                    ZerocoinStatus::TrxCreate,
                    "Trying to spend an already spent serial #, try again.",
                ));
            }
            if chain.mint_in_chain(&meta.hash_pubcoin).is_none() {
                if let Some(archived_meta) = self.mints.archive(&meta.hash_serial) {
                    self.store.archive_mint(&archived_meta)?;
                }
                archived = true;
            }
        }
        if archived {
            return Err(Error::zerocoin(
                ZerocoinStatus::TrxCreate,
                "Failed to find mint in the main chain; it has been archived",
            ));
        }

        let destination = address.cloned().ok_or_else(|| {
            Error::zerocoin(ZerocoinStatus::TrxChange, "No destination for the spend")
        })?;

        let selected: Amount = mints.iter().map(|m| m.denom.amount()).sum();
        let change = selected - value;
        if change < 0 {
            return Err(Error::zerocoin(
                ZerocoinStatus::TrxFundsProblems,
                "Selected mints do not cover the spend",
            ));
        }

        let mut tx = MutableTransaction::new();
        tx.outputs.push(Output::standard(value, destination));

        let mut new_mints = Vec::new();
        if change > 0 {
            let (remint, dust) = if mint_change {
                self.split_change(change)?
            } else {
                (0, change)
            };
            for denom in denominations_for_amount(remint) {
                let mint = self.next_change_mint(prover, denom)?;
                tx.outputs.push(Output::standard(
                    denom.amount(),
                    Script::zerocoin_mint(&mint.pubcoin),
                ));
                new_mints.push(mint);
            }
            if dust > 0 {
                let key = self.keystore.generate_key();
                tx.outputs
                    .push(Output::standard(dust, Script::pay_to_pubkey(&key)));
            }
        }

        let bound = outputs_hash(&tx.outputs);
        let mut spends = Vec::with_capacity(mints.len());
        for meta in mints {
            let (input, spend) = self.mint_to_txin(chain, prover, meta, security_level, &bound)?;
            tx.inputs.push(input);
            spends.push(spend);
        }

        if tx.total_size() >= self.params.max_zerocoin_tx_size {
            return Err(Error::zerocoin(
                ZerocoinStatus::TxTooLarge,
                format!(
                    "In rare cases, a spend with {} coins exceeds our maximum allowable \
                     transaction size, please retry spend using {} or less coins",
                    mints.len(),
                    mints.len().saturating_sub(1).max(1)
                ),
            ));
        }

        let tx = Arc::new(tx.freeze());
        let txid = tx.hash();
        for spend in &spends {
            let hash_pubcoin = mints
                .iter()
                .find(|m| m.hash_serial == spend.hash_serial)
                .map_or(Hash256::ZERO, |m| m.hash_pubcoin);
            self.store.write_zerocoin_spend(&ZerocoinSpendRecord {
                hash_serial: spend.hash_serial,
                hash_pubcoin,
                txid,
                denomination: spend.denomination,
            })?;
        }
        for mint in &new_mints {
            self.store.write_mint(mint)?;
        }

        tracing::debug!(
            "Built zerocoin spend {} over {} mints, value {}, {} change mints",
            txid,
            mints.len(),
            value,
            new_mints.len()
        );
        Ok(ZerocoinSpendBatch {
            tx,
            value,
            spends,
            spent: mints.to_vec(),
            new_mints,
        })
    }

    /// Split `change` into a re-minted part and a plain part, paying the mint fee
    /// out of the plain part.
    fn split_change(&self, change: Amount) -> Result<(Amount, Amount)> {
        let ten = Denomination::Ten.amount();
        let mint_fee = self.params.zerocoin_mint_fee;
        let mut dust = change % ten;
        let mut remint = change - dust;
        if remint == 0 {
            return Ok((0, dust));
        }

        let count = denominations_for_amount(remint).len() as Amount;
        let fee = mint_fee * count;
        if dust >= fee {
            dust -= fee;
        } else if count == 1 {
            remint = 0;
            dust = change;
        } else {
            remint -= ten;
            dust += ten;
            if remint < ten {
                return Err(Error::zerocoin(
                    ZerocoinStatus::TrxChange,
                    "Change too small to re-mint after fees",
                ));
            }
            dust -= mint_fee * denominations_for_amount(remint).len() as Amount;
        }
        Ok((remint, dust))
    }

    fn next_change_mint(&mut self, prover: &dyn ZerocoinProver, denom: Denomination) -> Result<Mint> {
        let generator = self.mint_generator.as_mut().ok_or_else(|| {
            Error::zerocoin(ZerocoinStatus::TxMintGeneral, "Zerocoin mint seed not set")
        })?;
        generator.generate(prover, denom).map_err(|e| {
            Error::zerocoin(
                ZerocoinStatus::TxMintGeneral,
                format!("Failed to create change mint: {}", e),
            )
        })
    }

    /// Prove a spend of `meta` bound to `outputs_hash` and wrap it in an input.
    pub fn mint_to_txin(
        &mut self,
        chain: &dyn Chain,
        prover: &dyn ZerocoinProver,
        meta: &MintMeta,
        security_level: u32,
        outputs_hash: &Hash256,
    ) -> Result<(TxIn, CoinSpend)> {
        let mint = self
            .mints
            .get_mint(&meta.hash_serial)
            .cloned()
            .ok_or_else(|| Error::zerocoin(ZerocoinStatus::InvalidCoin, "Mint not in wallet"))?;

        let hash_serial = mint.hash_serial();
        if let Some(previous) = self.spent_serials.get(&hash_serial) {
            let txid = previous.txid;
            self.mints.set_pubcoin_used(&meta.hash_pubcoin, txid);
            tracing::warn!("Serial {} already spent by {}", hash_serial, txid);
            return Err(Error::zerocoin(
                ZerocoinStatus::SpentUsedZerocoin,
                "The coin spend has been used",
            ));
        }

        if mint.version < 2 && security_level < V1_SECURITY_LEVEL {
            return Err(Error::zerocoin(
                ZerocoinStatus::SpendV1SecLevel,
                format!(
                    "Version 1 zerocoins must use security level {} to spend",
                    V1_SECURITY_LEVEL
                ),
            ));
        }
        if !prover.validate_pubcoin(mint.denomination, &mint.pubcoin) {
            return Err(Error::zerocoin(
                ZerocoinStatus::InvalidCoin,
                "The new spend coin transaction did not verify",
            ));
        }

        let checkpoint = chain.accumulator_checkpoint(chain.height()).ok_or_else(|| {
            Error::zerocoin(
                ZerocoinStatus::FailedAccumulatorInitialization,
                "No accumulator checkpoint at the tip",
            )
        })?;
        let witness = prover
            .build_witness(mint.denomination, &mint.pubcoin, &checkpoint, security_level)
            .map_err(|e| {
                Error::zerocoin(ZerocoinStatus::FailedAccumulatorInitialization, e.to_string())
            })?;

        let spend = prover
            .prove(&mint, &witness, outputs_hash)
            .map_err(|e| {
                let status = match e {
                    ProverError::Serialization(_) => ZerocoinStatus::BadSerialization,
                    ProverError::InvalidCoin(_) => ZerocoinStatus::InvalidCoin,
                    ProverError::Witness(_) | ProverError::Proof(_) => ZerocoinStatus::InvalidWitness,
                };
                Error::zerocoin(status, e.to_string())
            })?;
        if !prover.verify(&spend, outputs_hash, &checkpoint) {
            return Err(Error::zerocoin(
                ZerocoinStatus::InvalidWitness,
                "The transaction did not verify",
            ));
        }

        let input = TxIn {
            script_sig: Script::zerocoin_spend(&spend.bytes),
            sequence: mint.denomination.value() | SEQUENCE_LOCKTIME_DISABLE_FLAG,
            ..TxIn::new(crate::primitives::OutPoint::null())
        };
        Ok((input, spend))
    }

    /// Submit prepared batches in order.
    ///
    /// A refused batch is rolled back and the error reports how many batches
    /// were committed before it.
    pub fn commit_zerocoin_spend(
        &mut self,
        chain: &dyn Chain,
        receipt: &mut ZerocoinSpendReceipt,
    ) -> Result<()> {
        let start = receipt.committed_batches;
        for i in start..receipt.batches.len() {
            let batch = receipt.batches[i].clone();
            let txid = batch.tx.hash();
            for meta in &batch.spent {
                self.mints.set_pubcoin_used(&meta.hash_pubcoin, txid);
            }

            if let Err(reason) = chain.accept_to_mempool(&batch.tx, self.config.max_tx_fee, false) {
                tracing::warn!("Zerocoin spend {} rejected: {}", txid, reason);
                let status = self.rollback_batch(chain, &batch);
                let message = match status {
                    ZerocoinStatus::EraseSpendsFailed => {
                        "Error: It cannot delete coin serial number in wallet".to_string()
                    }
                    ZerocoinStatus::EraseNewMintsFailed => {
                        "Error: Unable to delete zerocoin mint in wallet".to_string()
                    }
                    _ => format!("Failed to commit spend batch {}: {}", i + 1, reason),
                };
                receipt.set_status(status, message.clone());
                return Err(Error::Zerocoin {
                    status,
                    message,
                    committed_batches: receipt.committed_batches,
                });
            }

            for meta in &batch.spent {
                let used = self
                    .mints
                    .get_by_pubcoin(&meta.hash_pubcoin)
                    .is_some_and(|m| m.is_used);
                if !used {
                    tracing::error!("Mint {} did not get marked as used", meta.hash_pubcoin);
                }
            }
            for spend in &batch.spends {
                let hash_pubcoin = batch
                    .spent
                    .iter()
                    .find(|m| m.hash_serial == spend.hash_serial)
                    .map_or(Hash256::ZERO, |m| m.hash_pubcoin);
                self.spent_serials.insert(
                    spend.hash_serial,
                    ZerocoinSpendRecord {
                        hash_serial: spend.hash_serial,
                        hash_pubcoin,
                        txid,
                        denomination: spend.denomination,
                    },
                );
            }
            // The mempool holds the batch now, so bookkeeping failures below
            // must not leave it counted as uncommitted.
            let mut bookkeeping: Option<Error> = None;
            for mint in &batch.new_mints {
                let mut mint = mint.clone();
                mint.txid = txid;
                if let Err(e) = self.store.write_mint(&mint) {
                    tracing::error!("Failed to write change mint {}: {}", mint.hash_pubcoin(), e);
                    bookkeeping.get_or_insert(e.into());
                }
                self.mints.add(mint);
            }
            if let Err(e) = self.add_to_wallet(Arc::clone(&batch.tx), true, true) {
                tracing::error!("Failed to record zerocoin spend {}: {}", txid, e);
                bookkeeping.get_or_insert(e);
            }
            if !chain.relay(&batch.tx) {
                tracing::debug!("Zerocoin spend {} not relayed", txid);
            }
            receipt.committed_batches = i + 1;
            tracing::info!("Committed zerocoin spend batch {} as {}", i + 1, txid);

            if let Some(e) = bookkeeping {
                let message = format!(
                    "Spend batch {} was accepted as {} but the wallet could not record it: {}",
                    i + 1,
                    txid,
                    e
                );
                receipt.set_status(ZerocoinStatus::SpendError, message.clone());
                return Err(Error::Zerocoin {
                    status: ZerocoinStatus::SpendError,
                    message,
                    committed_batches: receipt.committed_batches,
                });
            }
        }

        receipt.set_status(ZerocoinStatus::SpendOkay, "Spend Successful");
        Ok(())
    }

    /// Undo the wallet side of a refused batch. Returns the status to report.
    fn rollback_batch(&mut self, chain: &dyn Chain, batch: &ZerocoinSpendBatch) -> ZerocoinStatus {
        let mut status = ZerocoinStatus::CommitFailed;
        for meta in &batch.spent {
            self.mints.set_pubcoin_not_used(&meta.hash_pubcoin);
        }
        for spend in &batch.spends {
            if let Err(e) = self.store.erase_zerocoin_spend(&spend.hash_serial) {
                tracing::error!("Failed to erase spend of serial {}: {}", spend.hash_serial, e);
                status = ZerocoinStatus::EraseSpendsFailed;
            }
            chain.remove_serial(&spend.hash_serial);
            self.spent_serials.remove(&spend.hash_serial);
        }
        for mint in &batch.new_mints {
            if let Err(e) = self.store.erase_deterministic_mint(&mint.hash_pubcoin()) {
                tracing::error!("Failed to erase change mint {}: {}", mint.hash_pubcoin(), e);
                if status == ZerocoinStatus::CommitFailed {
                    status = ZerocoinStatus::EraseNewMintsFailed;
                }
            }
        }
        status
    }

    fn discard_prepared(&mut self, chain: &dyn Chain, batches: &[ZerocoinSpendBatch]) {
        for batch in batches {
            let status = self.rollback_batch(chain, batch);
            if status != ZerocoinStatus::CommitFailed {
                tracing::error!("Discarding prepared spend {} left rows behind", batch.tx.hash());
            }
        }
    }

    /// Prepare and commit a spend.
    pub fn spend_zerocoin(
        &mut self,
        chain: &dyn Chain,
        prover: &dyn ZerocoinProver,
        request: &ZerocoinSpendRequest,
    ) -> Result<ZerocoinSpendReceipt> {
        let mut receipt = self.prepare_zerocoin_spend(chain, prover, request)?;
        self.commit_zerocoin_spend(chain, &mut receipt)?;
        Ok(receipt)
    }

    /// Restore archived mints that have since appeared in the main chain.
    pub fn reconsider_zerocoins(&mut self, chain: &dyn Chain) -> Result<Vec<MintMeta>> {
        let found: Vec<(Hash256, Hash256)> = self
            .mints
            .archived()
            .filter(|(_, meta)| chain.mint_in_chain(&meta.hash_pubcoin).is_some())
            .map(|(_, meta)| (meta.hash_serial, meta.hash_pubcoin))
            .collect();

        for (hash_serial, hash_pubcoin) in &found {
            self.store.unarchive_mint(hash_pubcoin)?;
            self.mints.unarchive(hash_serial);
        }
        self.mints.update_status(chain, &self.params);

        let restored: Vec<MintMeta> = found
            .iter()
            .filter_map(|(hash_serial, _)| self.mints.get(hash_serial).cloned())
            .collect();
        if !restored.is_empty() {
            tracing::info!("Restored {} archived mints", restored.len());
        }
        Ok(restored)
    }

    /// Convert `value` of plain coins into zerocoin mints.
    ///
    /// `value` must be a positive multiple of the smallest denomination. The
    /// transaction pays at least the mint fee for every mint it creates.
    pub fn mint_zerocoin(
        &mut self,
        chain: &dyn Chain,
        prover: &dyn ZerocoinProver,
        value: Amount,
        coin_control: &CoinControl,
    ) -> Result<(Hash256, Vec<MintMeta>)> {
        if self.is_locked() {
            return Err(Error::zerocoin(
                ZerocoinStatus::WalletLocked,
                "Error: Wallet locked, unable to create transaction!",
            ));
        }
        let ten = Denomination::Ten.amount();
        if value < ten || value % ten != 0 {
            return Err(Error::InvalidAmount(format!(
                "Mint value must be a multiple of {}",
                ten
            )));
        }

        let denoms = denominations_for_amount(value);
        let mint_fee = self.params.zerocoin_mint_fee * denoms.len() as Amount;
        let balance = self.get_balance(chain, IsMineFilter::Spendable, 0);
        if value + mint_fee > balance {
            return Err(Error::InsufficientFunds(format!(
                "Minting {} needs {} with fees, {} available",
                value,
                value + mint_fee,
                balance
            )));
        }

        let mut mints = Vec::with_capacity(denoms.len());
        for denom in denoms {
            mints.push(self.next_change_mint(prover, denom)?);
        }
        let recipients: Vec<Recipient> = mints
            .iter()
            .map(|m| Recipient::new(Script::zerocoin_mint(&m.pubcoin), m.denomination.amount()))
            .collect();

        let created = self.build_transaction(chain, &recipients, coin_control, true, mint_fee)?;
        let txid = self.commit_transaction(chain, Arc::clone(&created.tx))?;

        let mut metas = Vec::with_capacity(mints.len());
        for mut mint in mints {
            mint.txid = txid;
            self.store.write_mint(&mint)?;
            metas.push(self.mints.add(mint));
        }
        tracing::info!("Minted {} zerocoins worth {} in {}", metas.len(), value, txid);
        Ok((txid, metas))
    }
}
