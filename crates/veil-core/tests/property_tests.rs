//! Property-based tests for veil-core
//!
//! Uses proptest to verify invariants across randomized inputs

use proptest::prelude::*;
use std::sync::Arc;
use veil_core::fees::FeeRate;
use veil_core::keystore::p2pk_input_size;
use veil_core::primitives::{
    standard_output_size, CtOutput, DataOutput, Hash256, MutableTransaction, OutPoint, Output,
    OutputKind, RingCtOutput, Script, Transaction, TxIn, TxType,
};
use veil_core::selection::{group_outputs, knapsack_solver, select_coins_bnb};
use veil_core::testing::WalletFixture;
use veil_core::{CoinControl, OutputCandidate, Recipient};
use veil_params::policy::DEFAULT_FALLBACK_FEE;
use veil_params::{money_range, Amount, COIN, MAX_MONEY};

// ============================================================================
// Strategies
// ============================================================================

fn bytes_strategy(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..max)
}

fn script_strategy() -> impl Strategy<Value = Script> {
    bytes_strategy(60).prop_map(Script::from_bytes)
}

fn output_strategy() -> impl Strategy<Value = Output> {
    prop_oneof![
        (0..MAX_MONEY, script_strategy()).prop_map(|(v, s)| Output::standard(v, s)),
        (any::<[u8; 32]>(), bytes_strategy(80), script_strategy(), bytes_strategy(200)).prop_map(
            |(c, data, script_pubkey, range_proof)| {
                let mut commitment = [0x08; 33];
                commitment[1..].copy_from_slice(&c);
                Output::ConfidentialTx(CtOutput {
                    commitment,
                    data,
                    script_pubkey,
                    range_proof,
                })
            }
        ),
        (any::<[u8; 32]>(), bytes_strategy(80), bytes_strategy(200)).prop_map(
            |(k, data, range_proof)| {
                let mut pubkey = [0x02; 33];
                pubkey[1..].copy_from_slice(&k);
                Output::RingCt(RingCtOutput {
                    pubkey,
                    commitment: [0x09; 33],
                    data,
                    range_proof,
                })
            }
        ),
        bytes_strategy(40).prop_map(|data| Output::Data(DataOutput { data })),
    ]
}

fn input_strategy() -> impl Strategy<Value = TxIn> {
    (
        any::<[u8; 32]>(),
        0u32..1000,
        script_strategy(),
        any::<u32>(),
        prop::collection::vec(bytes_strategy(72), 0..3),
    )
        .prop_map(|(hash, n, script_sig, sequence, script_witness)| TxIn {
            script_sig,
            sequence,
            script_witness,
            ..TxIn::new(OutPoint::new(Hash256::from_bytes(hash), n))
        })
}

fn transaction_strategy() -> impl Strategy<Value = MutableTransaction> {
    (
        prop::collection::vec(input_strategy(), 1..5),
        prop::collection::vec(output_strategy(), 1..6),
        any::<u32>(),
        prop_oneof![Just(TxType::Standard), Just(TxType::Coinbase), Just(TxType::Coinstake)],
    )
        .prop_map(|(inputs, outputs, lock_time, tx_type)| {
            let mut tx = MutableTransaction::new();
            tx.inputs = inputs;
            tx.outputs = outputs;
            tx.lock_time = lock_time;
            tx.tx_type = tx_type;
            tx
        })
}

/// Coin values between a hundredth of a coin and ten coins
fn coin_values_strategy() -> impl Strategy<Value = Vec<Amount>> {
    prop::collection::vec(COIN / 100..10 * COIN, 1..12)
}

fn candidates(values: &[Amount]) -> Vec<OutputCandidate> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| OutputCandidate {
            outpoint: OutPoint::new(Hash256::from_bytes([i as u8; 32]), i as u32),
            kind: OutputKind::Standard,
            value: *value,
            script: Some(Script::pay_to_pubkey(&[i as u8; 33])),
            depth: 6,
            spendable: true,
            solvable: true,
            safe: true,
            from_me: false,
            input_bytes: p2pk_input_size(),
            ancestors: 0,
            descendants: 0,
        })
        .collect()
}

// ============================================================================
// Codec Properties
// ============================================================================

proptest! {
    /// Property: decoding an encoded transaction yields the same transaction
    #[test]
    fn prop_transaction_codec_roundtrip(tx in transaction_strategy()) {
        let frozen = tx.clone().freeze();
        let bytes = frozen.to_bytes();
        let decoded = Transaction::from_bytes(&bytes).expect("valid encoding");
        prop_assert_eq!(decoded.to_mutable(), tx);
        prop_assert_eq!(decoded.hash(), frozen.hash());
        prop_assert_eq!(bytes.len(), frozen.total_size());
    }

    /// Property: truncated encodings never decode
    #[test]
    fn prop_truncated_transaction_rejected(tx in transaction_strategy(), cut in 1usize..32) {
        let bytes = tx.freeze().to_bytes();
        let cut = cut.min(bytes.len());
        prop_assert!(Transaction::from_bytes(&bytes[..bytes.len() - cut]).is_err());
    }

    /// Property: the txid ignores witness data
    #[test]
    fn prop_txid_ignores_witness(tx in transaction_strategy()) {
        let mut stripped = tx.clone();
        for input in stripped.inputs.iter_mut() {
            input.script_witness.clear();
        }
        prop_assert_eq!(tx.freeze().hash(), stripped.freeze().hash());
    }
}

// ============================================================================
// Selection Properties
// ============================================================================

proptest! {
    /// Property: knapsack covers the target and reports the sum of what it picked
    #[test]
    fn prop_knapsack_conserves_value(values in coin_values_strategy(), frac in 1u64..100) {
        let total: Amount = values.iter().sum();
        let target = total * frac as Amount / 100;
        prop_assume!(target > 0);
        let groups = group_outputs(&candidates(&values), true);

        let (coins, value) = knapsack_solver(&groups, target).expect("pool covers target");
        prop_assert!(value >= target);
        prop_assert_eq!(coins.iter().map(|c| c.value).sum::<Amount>(), value);
    }

    /// Property: branch-and-bound lands inside its window or finds nothing
    #[test]
    fn prop_bnb_within_window(values in coin_values_strategy(), frac in 1u64..100, window in 0i64..CENT_WINDOW) {
        let total: Amount = values.iter().sum();
        let target = total * frac as Amount / 100;
        prop_assume!(target > 0);
        let groups = group_outputs(&candidates(&values), true);

        if let Some((coins, value)) = select_coins_bnb(&groups, target, window) {
            let effective: Amount = coins.iter().map(|c| c.effective_value).sum();
            prop_assert!(effective >= target);
            prop_assert!(effective <= target + window);
            prop_assert_eq!(coins.iter().map(|c| c.value).sum::<Amount>(), value);
        }
    }

    /// Property: branch-and-bound never pays more excess than knapsack
    #[test]
    fn prop_bnb_excess_not_above_knapsack(values in coin_values_strategy(), frac in 1u64..100, window in 0i64..CENT_WINDOW) {
        let total: Amount = values.iter().sum();
        let target = total * frac as Amount / 100;
        prop_assume!(target > 0);
        let groups = group_outputs(&candidates(&values), true);

        if let Some((_, bnb_value)) = select_coins_bnb(&groups, target, window) {
            let (_, knapsack_value) = knapsack_solver(&groups, target).expect("pool covers target");
            prop_assert!(bnb_value - target <= knapsack_value - target);
        }
    }

    /// Property: an exact subset is always found by branch-and-bound
    #[test]
    fn prop_bnb_finds_exact_subset(values in coin_values_strategy(), mask in any::<u16>()) {
        let picked: Amount = values
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, v)| *v)
            .sum();
        prop_assume!(picked > 0);
        let groups = group_outputs(&candidates(&values), true);
        let (_, value) = select_coins_bnb(&groups, picked, 0).expect("exact subset exists");
        prop_assert_eq!(value, picked);
    }
}

const CENT_WINDOW: i64 = COIN / 100;

// ============================================================================
// Fee Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: a built transaction balances and pays at least the fallback rate
    #[test]
    fn prop_fee_loop_converges(values in coin_values_strategy(), frac in 1u64..90) {
        let mut fixture = WalletFixture::new();
        fixture.fund(&values);
        let total: Amount = values.iter().sum();
        let amount = (total * frac as Amount / 100).max(COIN / 100);

        let recipient = Recipient::new(Script::pay_to_pubkey(&[3u8; 33]), amount);
        let created = match fixture.wallet.create_transaction(
            &fixture.chain,
            &[recipient],
            &CoinControl::default(),
            true,
        ) {
            Ok(created) => created,
            // Small wallets may not afford the fee
            Err(veil_core::Error::InsufficientFunds(_)) => return Ok(()),
            Err(e) => return Err(TestCaseError::fail(e.to_string())),
        };

        let tx = &created.tx;
        let value_in: Amount = tx
            .inputs()
            .iter()
            .map(|i| {
                let parent = fixture.wallet.get_tx(&i.prevout.hash).expect("input is ours");
                parent.tx.outputs()[i.prevout.n as usize].value().unwrap_or(0)
            })
            .sum();
        let value_out = tx.total_plain_out().expect("plain outputs");
        prop_assert_eq!(value_in - value_out, created.fee);

        // Overpayment stays below the cost of one more input plus a change output
        let rate = FeeRate::from_per_k(DEFAULT_FALLBACK_FEE);
        let required = rate.fee(tx.total_size());
        let slack = rate.fee(p2pk_input_size() + standard_output_size(35) + 2 * tx.inputs().len());
        prop_assert!(created.fee >= required);
        prop_assert!(created.fee < required + slack);
        prop_assert!(tx.outputs().iter().any(|o| o.value() == Some(amount)));
    }
}

// ============================================================================
// Amount Properties
// ============================================================================

proptest! {
    /// Property: the money range is exactly [0, MAX_MONEY]
    #[test]
    fn prop_money_range(value in any::<i64>()) {
        prop_assert_eq!(money_range(value), (0..=MAX_MONEY).contains(&value));
    }
}

#[test]
fn test_fixture_transactions_are_shared() {
    let mut fixture = WalletFixture::new();
    let tx = fixture.fund(&[COIN]);
    let stored = fixture.wallet.get_tx(&tx.hash()).expect("funding recorded");
    assert!(Arc::ptr_eq(&stored.tx, &tx));
}
