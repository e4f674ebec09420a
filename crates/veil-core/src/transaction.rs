//! Transaction building with iterative fee calculation
//!
//! The builder selects coins, sizes the transaction with placeholder
//! signatures and repeats until the fee it pays matches the fee its size needs.

use crate::available::{CoinFilter, OutputCandidate};
use crate::chain::Chain;
use crate::coin_control::CoinControl;
use crate::fees::{discard_rate, dust_threshold, is_dust, minimum_fee_rate, FeeRate};
use crate::keystore::p2pk_input_size;
use crate::primitives::{
    standard_output_size, Hash256, MutableTransaction, Output, Script, Transaction, TxIn,
    MAX_BIP125_RBF_SEQUENCE, SEQUENCE_FINAL,
};
use crate::selection::{CoinSelectionParams, InputCoin};
use crate::wallet::Wallet;
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use veil_params::policy::{MAX_STANDARD_TX_WEIGHT, MIN_FINAL_CHANGE};
use veil_params::{money_range, Amount};

/// Upper bound on fee loop passes
pub const MAX_FEE_ITERATIONS: usize = 100;

/// Size of a pay-to-pubkey script
const P2PK_SCRIPT_LEN: usize = 35;

/// A payment requested from the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Destination script
    pub script_pubkey: Script,
    /// Amount in satoshis
    pub amount: Amount,
    /// Pay the fee out of this amount
    pub subtract_fee_from_amount: bool,
}

impl Recipient {
    /// Recipient paying `amount` to `script_pubkey`.
    pub fn new(script_pubkey: Script, amount: Amount) -> Self {
        Self {
            script_pubkey,
            amount,
            subtract_fee_from_amount: false,
        }
    }

    /// Same recipient, paying its share of the fee.
    pub fn subtracting_fee(mut self) -> Self {
        self.subtract_fee_from_amount = true;
        self
    }
}

/// A built transaction and what it pays.
#[derive(Debug, Clone)]
pub struct CreatedTransaction {
    /// Finished transaction
    pub tx: Arc<Transaction>,
    /// Fee paid
    pub fee: Amount,
    /// Index of the change output, if one was added
    pub change_pos: Option<usize>,
}

/// Working state of one fee loop pass.
struct FeeLoop {
    fee: Amount,
    pick_new_inputs: bool,
    selected: Vec<InputCoin>,
    value_in: Amount,
    used_bnb: bool,
}

impl Wallet {
    /// Build a transaction paying `recipients`.
    ///
    /// Inputs come from coin selection, change goes to a new key unless coin
    /// control names a destination, and the fee is settled by the fee loop.
    /// With `sign` unset, inputs are left unsigned.
    pub fn create_transaction(
        &mut self,
        chain: &dyn Chain,
        recipients: &[Recipient],
        coin_control: &CoinControl,
        sign: bool,
    ) -> Result<CreatedTransaction> {
        self.build_transaction(chain, recipients, coin_control, sign, 0)
    }

    /// Fee loop with a floor under the fee, used by zerocoin mints.
    pub(crate) fn build_transaction(
        &mut self,
        chain: &dyn Chain,
        recipients: &[Recipient],
        coin_control: &CoinControl,
        sign: bool,
        min_fee: Amount,
    ) -> Result<CreatedTransaction> {
        if recipients.is_empty() {
            return Err(Error::InvalidAmount(
                "Transaction must have at least one recipient".to_string(),
            ));
        }
        let mut value: Amount = 0;
        let mut subtract_count: Amount = 0;
        for r in recipients {
            if r.amount < 0 {
                return Err(Error::InvalidAmount(
                    "Transaction amounts must not be negative".to_string(),
                ));
            }
            value = value
                .checked_add(r.amount)
                .filter(|v| money_range(*v))
                .ok_or_else(|| Error::InvalidAmount("Transaction amount out of range".to_string()))?;
            if r.subtract_fee_from_amount {
                subtract_count += 1;
            }
        }

        let mut rng = rand::thread_rng();
        let mut lock_time = chain.height();
        if rng.gen_range(0..10) == 0 {
            lock_time = lock_time.saturating_sub(rng.gen_range(0..100));
        }
        let signal_rbf = coin_control.signal_rbf.unwrap_or(self.config.wallet_rbf);
        let sequence = if signal_rbf {
            MAX_BIP125_RBF_SEQUENCE
        } else {
            SEQUENCE_FINAL - 1
        };

        let rate = minimum_fee_rate(&self.config, coin_control, chain);
        let discard = discard_rate(&self.config);
        let dust_relay = FeeRate::from_per_k(self.config.dust_relay_fee);
        let min_relay = FeeRate::from_per_k(self.config.min_relay_fee);
        let change_output_size = standard_output_size(P2PK_SCRIPT_LEN);
        let mut sizing = MutableTransaction::new();
        sizing.lock_time = lock_time;
        sizing.outputs = Self::recipient_outputs(recipients, 0, subtract_count, dust_relay)?;
        let mut params = CoinSelectionParams {
            use_bnb: subtract_count == 0,
            change_output_size,
            change_spend_size: p2pk_input_size(),
            effective_fee: rate,
            long_term_fee: discard,
            tx_noinputs_size: sizing.total_size(),
        };

        let mut change_script = coin_control.dest_change.clone();
        let change_prototype = Output::standard(0, Script::pay_to_pubkey(&[0u8; 33]));
        let available = self.available_coins(chain, &CoinFilter::default(), Some(coin_control));

        let mut state = FeeLoop {
            fee: 0,
            pick_new_inputs: true,
            selected: Vec::new(),
            value_in: 0,
            used_bnb: false,
        };
        let mut tx = MutableTransaction::new();
        tx.lock_time = lock_time;
        let mut change_pos = None;
        let mut settled = false;

        for pass in 0..MAX_FEE_ITERATIONS {
            let value_to_select = if subtract_count > 0 {
                value
            } else {
                value + state.fee
            };

            tx.outputs = Self::recipient_outputs(recipients, state.fee, subtract_count, dust_relay)?;

            if state.pick_new_inputs {
                match self.select_coins(
                    chain,
                    &available,
                    value_to_select,
                    Some(coin_control),
                    &params,
                ) {
                    Ok(result) => {
                        state.selected = result.coins;
                        state.value_in = result.value;
                        state.used_bnb = result.used_bnb;
                    }
                    Err(Error::InsufficientFunds(_)) if params.use_bnb => {
                        params.use_bnb = false;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                state.used_bnb = false;
            }

            change_pos = None;
            let change = state.value_in - value_to_select;
            if change > 0 {
                let script = change_script
                    .get_or_insert_with(|| Script::pay_to_pubkey(&self.keystore.generate_key()))
                    .clone();
                let change_output = Output::standard(change, script);
                if is_dust(&change_output, discard) || state.used_bnb {
                    state.fee += change;
                } else {
                    let pos = match coin_control.change_position {
                        None => rng.gen_range(0..=tx.outputs.len()),
                        Some(p) if p > tx.outputs.len() => return Err(Error::ChangeIndexOutOfRange),
                        Some(p) => p,
                    };
                    tx.outputs.insert(pos, change_output);
                    change_pos = Some(pos);
                }
            }

            tx.inputs = state
                .selected
                .iter()
                .map(|c| TxIn {
                    sequence,
                    ..TxIn::new(c.outpoint)
                })
                .collect();
            for (i, coin) in state.selected.iter().enumerate() {
                self.keystore
                    .dummy_sign_input(&mut tx, i, &coin.script)
                    .map_err(|_| Error::SigningFailed)?;
            }

            let bytes = tx.total_size();
            let fee_needed = rate.fee(bytes);
            if fee_needed < min_relay.fee(bytes) {
                return Err(Error::FeePolicy);
            }
            let fee_needed = fee_needed.max(min_fee);
            tracing::debug!(
                "Fee pass {}: size {} paying {} needs {}",
                pass,
                bytes,
                state.fee,
                fee_needed
            );

            if state.fee >= fee_needed {
                if change_pos.is_none() && subtract_count == 0 && state.pick_new_inputs {
                    let fee_with_change = rate.fee(bytes + change_output_size + 2).max(min_fee);
                    let min_change = dust_threshold(&change_prototype, discard);
                    if state.fee >= fee_with_change + min_change {
                        state.pick_new_inputs = false;
                        state.fee = fee_with_change;
                        continue;
                    }
                }
                if let Some(pos) = change_pos {
                    if state.fee > fee_needed && subtract_count == 0 {
                        let extra = state.fee - fee_needed;
                        Self::adjust_output(&mut tx.outputs[pos], extra);
                        state.fee -= extra;
                    }
                }
                settled = true;
                break;
            } else if !state.pick_new_inputs {
                return Err(Error::FeeCalculation);
            }

            // Paying the shortfall out of change keeps the input set stable
            if let (Some(pos), 0) = (change_pos, subtract_count) {
                let additional = fee_needed - state.fee;
                let change_value = tx.outputs[pos].value().unwrap_or(0);
                if change_value >= MIN_FINAL_CHANGE + additional {
                    Self::adjust_output(&mut tx.outputs[pos], -additional);
                    state.fee += additional;
                    settled = true;
                    break;
                }
            }

            if subtract_count > 0 {
                state.pick_new_inputs = false;
            }
            state.fee = fee_needed;
            params.use_bnb = false;
        }

        if !settled {
            return Err(Error::FeeCalculation);
        }

        state.selected.shuffle(&mut rng);
        tx.inputs = state
            .selected
            .iter()
            .map(|c| TxIn {
                sequence,
                ..TxIn::new(c.outpoint)
            })
            .collect();
        if sign {
            for (i, coin) in state.selected.iter().enumerate() {
                self.keystore
                    .sign_input(&mut tx, i, &coin.script)
                    .map_err(|_| Error::SigningFailed)?;
            }
        }

        let tx = tx.freeze();
        if tx.weight() > MAX_STANDARD_TX_WEIGHT {
            return Err(Error::TransactionTooLarge);
        }
        if state.fee > self.config.max_tx_fee {
            return Err(Error::FeeTooHigh);
        }

        tracing::info!(
            "Created transaction {} with {} inputs, fee {}, change at {:?}",
            tx.hash(),
            tx.inputs().len(),
            state.fee,
            change_pos
        );
        Ok(CreatedTransaction {
            tx: Arc::new(tx),
            fee: state.fee,
            change_pos,
        })
    }

    /// Recipient outputs with subtracted fee shares applied.
    fn recipient_outputs(
        recipients: &[Recipient],
        fee: Amount,
        subtract_count: Amount,
        dust_relay: FeeRate,
    ) -> Result<Vec<Output>> {
        let mut outputs = Vec::with_capacity(recipients.len() + 1);
        let mut first = true;
        for r in recipients {
            let mut amount = r.amount;
            if r.subtract_fee_from_amount {
                amount -= fee / subtract_count;
                if first {
                    first = false;
                    amount -= fee % subtract_count;
                }
            }
            let output = Output::standard(amount, r.script_pubkey.clone());
            if is_dust(&output, dust_relay) {
                let reason = if r.subtract_fee_from_amount && fee > 0 {
                    if amount < 0 {
                        "The transaction amount is too small to pay the fee"
                    } else {
                        "The transaction amount is too small to send after the fee has been deducted"
                    }
                } else {
                    "Transaction amount too small"
                };
                return Err(Error::AmountTooSmall(reason.to_string()));
            }
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn adjust_output(output: &mut Output, delta: Amount) {
        if let Some(v) = output.value() {
            output.set_value(v + delta);
        }
    }

    /// Submit a built transaction and record it as ours.
    ///
    /// Nothing is recorded when the mempool refuses it.
    pub fn commit_transaction(&mut self, chain: &dyn Chain, tx: Arc<Transaction>) -> Result<Hash256> {
        let hash = tx.hash();
        chain
            .accept_to_mempool(&tx, self.config.max_tx_fee, false)
            .map_err(|reason| {
                tracing::warn!("Transaction {} rejected: {}", hash, reason);
                Error::MempoolRejected(reason)
            })?;

        self.add_to_wallet(Arc::clone(&tx), true, true)?;
        if !chain.relay(&tx) {
            tracing::debug!("Transaction {} not relayed", hash);
        }
        tracing::info!("Committed transaction {}", hash);
        Ok(hash)
    }

    /// Build, commit and relay a transaction. Returns its txid.
    pub fn create_and_send_transaction(
        &mut self,
        chain: &dyn Chain,
        recipients: &[Recipient],
        coin_control: &CoinControl,
    ) -> Result<Hash256> {
        let created = self.create_transaction(chain, recipients, coin_control, true)?;
        self.commit_transaction(chain, created.tx)
    }

    /// Unspent outputs between `min_depth` and `max_depth` of the `kinds` mask.
    pub fn list_unspent(
        &self,
        chain: &dyn Chain,
        min_depth: i32,
        max_depth: i32,
        kinds: u8,
    ) -> Vec<OutputCandidate> {
        let filter = CoinFilter {
            only_safe: false,
            min_depth,
            max_depth,
            kinds,
            ..CoinFilter::default()
        };
        self.available_coins(chain, &filter, None)
    }

    /// Relay our unconfirmed transactions that are still in the mempool.
    ///
    /// Returns the relayed txids, oldest first.
    pub fn resend_wallet_transactions(&self, chain: &dyn Chain) -> Vec<Hash256> {
        let mut pending: Vec<_> = self
            .txs
            .values()
            .filter(|w| w.from_me && !w.is_abandoned() && w.depth(chain) == 0)
            .filter(|w| chain.in_mempool(&w.hash()))
            .collect();
        pending.sort_by_key(|w| w.time_received);

        let relayed: Vec<Hash256> = pending
            .into_iter()
            .filter(|w| chain.relay(&w.tx))
            .map(|w| w.hash())
            .collect();
        if !relayed.is_empty() {
            tracing::info!("Rebroadcast {} wallet transactions", relayed.len());
        }
        relayed
    }
}
