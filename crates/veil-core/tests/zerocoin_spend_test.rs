//! Integration tests for the zerocoin spend protocol
//!
//! Tests spends end to end: change re-minting, batching, partial commits and
//! double spends, driven through the wallet and the manager

use veil_core::keystore::IsMineFilter;
use veil_core::primitives::Script;
use veil_core::testing::WalletFixture;
use veil_core::zerocoin::{Denomination, ZerocoinSpendRequest, ZerocoinStatus};
use veil_core::{Chain, Error, ErrorCategory, WalletManager};
use veil_params::{CENT, COIN};

fn payee() -> Script {
    Script::pay_to_pubkey(&[4u8; 33])
}

#[test]
fn test_change_mints_mature_and_spend() {
    let mut fx = WalletFixture::new();
    fx.add_mature_mints(&[Denomination::OneHundred]);

    let receipt = fx
        .wallet
        .spend_zerocoin(&fx.chain, &fx.prover, &ZerocoinSpendRequest::new(75 * COIN, payee()))
        .unwrap();
    assert_eq!(receipt.status, ZerocoinStatus::SpendOkay);
    assert_eq!(receipt.message, "Spend Successful");
    // 25 coins of change: two tens re-minted, the rest paid plain after mint fees
    assert_eq!(receipt.batches[0].new_mints.len(), 2);
    let tx = &receipt.batches[0].tx;
    assert_eq!(tx.total_plain_out().unwrap(), 100 * COIN - 2 * CENT);

    fx.mine_mempool();
    let maturity = fx.wallet.params().zerocoin_mint_maturity;
    fx.mine_empty_blocks(maturity);
    assert_eq!(fx.wallet.get_zerocoin_balance(&fx.chain, true), 20 * COIN);
    assert_eq!(
        fx.wallet
            .get_balance(&fx.chain, IsMineFilter::Spendable, 1),
        5 * COIN - 2 * CENT
    );

    // The change mints are themselves spendable
    let second = fx
        .wallet
        .spend_zerocoin(&fx.chain, &fx.prover, &ZerocoinSpendRequest::new(20 * COIN, payee()))
        .unwrap();
    assert_eq!(second.batches[0].spent.len(), 2);
    assert!(second.batches[0].new_mints.is_empty());
    fx.mine_mempool();
    assert_eq!(fx.wallet.get_zerocoin_balance(&fx.chain, false), 0);
}

#[test]
fn test_partial_commit_reports_committed_batches() {
    let mut fx = WalletFixture::new();
    fx.add_mature_mints(&[Denomination::Ten; 9]);
    fx.chain.fail_after(1);

    let err = fx
        .wallet
        .spend_zerocoin(&fx.chain, &fx.prover, &ZerocoinSpendRequest::new(90 * COIN, payee()))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Commit);
    match err {
        Error::Zerocoin {
            status,
            committed_batches,
            ..
        } => {
            assert_eq!(status, ZerocoinStatus::CommitFailed);
            assert_eq!(committed_batches, 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(fx.chain.mempool().len(), 1);

    // The committed batch stands; the rolled back mints can be spent again
    fx.mine_mempool();
    fx.chain.fail_after(100);
    assert_eq!(fx.wallet.get_zerocoin_balance(&fx.chain, true), 20 * COIN);
    let retry = fx
        .wallet
        .spend_zerocoin(&fx.chain, &fx.prover, &ZerocoinSpendRequest::new(20 * COIN, payee()))
        .unwrap();
    assert_eq!(retry.committed_batches, 1);
    assert_eq!(fx.wallet.store().load_zerocoin_spends().unwrap().len(), 9);
}

#[test]
fn test_double_spend_through_manager() {
    let mut fx = WalletFixture::new();
    let metas = fx.add_mature_mints(&[Denomination::Ten]);
    let WalletFixture {
        chain,
        prover,
        wallet,
        ..
    } = fx;
    let manager = WalletManager::new(chain);
    let id = manager.insert_wallet(wallet);

    let first = manager
        .spend_zerocoin(&id, &prover, &ZerocoinSpendRequest::new(10 * COIN, payee()))
        .unwrap();
    let first_txid = first.txids()[0];

    // No mints left for a second ordinary spend
    let err = manager
        .spend_zerocoin(&id, &prover, &ZerocoinSpendRequest::new(10 * COIN, payee()))
        .unwrap_err();
    assert_eq!(err.zerocoin_status(), Some(ZerocoinStatus::TrxFundsProblems));

    // Forcing the same serial again is caught as already spent, before any
    // witness is built
    prover.fail_witness(true);
    let err = manager
        .with_wallet_write(&id, |chain, w| {
            w.create_zerocoin_spend_transaction(
                chain,
                &prover,
                10 * COIN,
                100,
                &metas,
                Some(&payee()),
                true,
            )
        })
        .unwrap()
        .unwrap_err();
    assert_eq!(err.zerocoin_status(), Some(ZerocoinStatus::SpentUsedZerocoin));
    assert_eq!(err.category(), ErrorCategory::Consistency);
    prover.fail_witness(false);

    // The first spend is untouched
    manager
        .with_wallet_read(&id, |chain, w| {
            assert!(chain.in_mempool(&first_txid));
            assert!(w.get_tx(&first_txid).is_some());
            assert!(w.mints().get(&metas[0].hash_serial).unwrap().is_used);
            assert_eq!(w.store().load_zerocoin_spends().unwrap().len(), 1);
        })
        .unwrap();

    let block = {
        let chain = manager.chain().read();
        chain.mine_mempool();
        chain.tip_block().unwrap()
    };
    manager.block_connected(&block).unwrap();
    let balances = manager.get_balances(&id, 1).unwrap();
    assert_eq!(balances.zerocoin_spendable, 0);
    assert_eq!(balances.zerocoin_pending, 0);
}

#[test]
fn test_accepted_batch_stays_committed_when_recording_fails() {
    let mut fx = WalletFixture::new();
    let metas = fx.add_mature_mints(&[Denomination::OneHundred]);
    let mut receipt = fx
        .wallet
        .prepare_zerocoin_spend(&fx.chain, &fx.prover, &ZerocoinSpendRequest::new(75 * COIN, payee()))
        .unwrap();
    let txid = receipt.txids()[0];

    fx.store.fail_on("write_mint");
    fx.store.fail_on("write_tx");
    let err = fx
        .wallet
        .commit_zerocoin_spend(&fx.chain, &mut receipt)
        .unwrap_err();
    match err {
        Error::Zerocoin {
            status,
            committed_batches,
            ..
        } => {
            assert_eq!(status, ZerocoinStatus::SpendError);
            assert_eq!(committed_batches, 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(receipt.committed_batches, 1);
    assert!(fx.chain.in_mempool(&txid));
    assert!(fx.wallet.get_tx(&txid).is_some());
    assert!(fx.wallet.mints().get(&metas[0].hash_serial).unwrap().is_used);

    // Retrying does not resubmit or roll back the accepted batch
    fx.store.clear_failures();
    fx.wallet
        .commit_zerocoin_spend(&fx.chain, &mut receipt)
        .unwrap();
    assert_eq!(receipt.status, ZerocoinStatus::SpendOkay);
    assert_eq!(fx.chain.mempool().len(), 1);
    assert!(fx.wallet.mints().get(&metas[0].hash_serial).unwrap().is_used);
    assert_eq!(fx.wallet.store().load_zerocoin_spends().unwrap().len(), 1);
}
