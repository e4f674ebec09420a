//! SQLite store tests
//!
//! Tests the store on its own and as the backend of a wallet reloaded from disk.

use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;
use veil_core::primitives::{Hash256, MutableTransaction, OutPoint, Output, Script, TxIn};
use veil_core::store::{WalletStore, WalletTxRecord};
use veil_core::testing::{MockChain, MockProver};
use veil_core::zerocoin::{Denomination, MintGenerator, ZerocoinSpendRequest};
use veil_core::{Chain, CoinControl, Wallet, WalletConfig, WalletTx};
use veil_params::{NetworkType, COIN};
use veil_storage_sqlite::SqliteStore;

fn regtest() -> WalletConfig {
    WalletConfig::for_network(NetworkType::Regtest)
}

fn connect_tip(chain: &MockChain, wallet: &mut Wallet) {
    let block = chain.tip_block().unwrap();
    wallet.block_connected(chain, &block).unwrap();
}

#[test]
fn test_tx_records_load_in_order() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut expected = Vec::new();
    for pos in [2i64, 0, 1] {
        let mut tx = MutableTransaction::new();
        tx.inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([pos as u8; 32]), 0)));
        tx.outputs
            .push(Output::standard(COIN, Script::pay_to_pubkey(&[1u8; 33])));
        let mut wtx = WalletTx::new(Arc::new(tx.freeze()), Utc::now());
        wtx.order_pos = pos;
        let record = WalletTxRecord::from_wallet_tx(&wtx);
        store.write_tx(&record).unwrap();
        expected.push(record);
    }
    expected.sort_by_key(|r| r.order_pos);

    let loaded = store.load_txs().unwrap();
    assert_eq!(loaded, expected);
    assert_eq!(loaded[0].to_wallet_tx().unwrap().tx.hash(), expected[0].txid);

    store.erase_tx(&expected[1].txid).unwrap();
    assert_eq!(store.load_txs().unwrap().len(), 2);
}

#[test]
fn test_mint_archive_cycle() {
    let store = SqliteStore::open_in_memory().unwrap();
    let prover = MockProver::new();
    let mint = MintGenerator::new([1u8; 32], 0)
        .generate(&prover, Denomination::Ten)
        .unwrap();
    let hash_pubcoin = mint.hash_pubcoin();

    store.write_mint(&mint).unwrap();
    store.archive_mint(&mint.meta()).unwrap();
    assert!(store.load_mints().unwrap().is_empty());
    assert_eq!(store.load_archived_mints().unwrap().len(), 1);
    // Archived mints are not erased as active ones
    assert!(store.erase_deterministic_mint(&hash_pubcoin).is_err());

    store.unarchive_mint(&hash_pubcoin).unwrap();
    let active = store.load_mints().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].hash_serial(), mint.hash_serial());

    store.erase_deterministic_mint(&hash_pubcoin).unwrap();
    assert!(store.load_mints().unwrap().is_empty());
}

#[test]
fn test_wallet_reloads_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.sqlite");
    let chain = MockChain::new();
    let prover = MockProver::new();

    let spend_txid = {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let mut wallet = Wallet::new(regtest(), store.clone()).unwrap();
        let key = wallet.keystore_mut().generate_key();
        wallet.set_mint_seed([0x42; 32]);

        let mut funding = MutableTransaction::new();
        funding
            .inputs
            .push(TxIn::new(OutPoint::new(Hash256::from_bytes([7u8; 32]), 0)));
        funding
            .outputs
            .push(Output::standard(30 * COIN, Script::pay_to_pubkey(&key)));
        chain.mine_block(vec![Arc::new(funding.freeze())]);
        connect_tip(&chain, &mut wallet);

        let (_, metas) = wallet
            .mint_zerocoin(&chain, &prover, 20 * COIN, &CoinControl::default())
            .unwrap();
        assert_eq!(metas.len(), 2);
        chain.mine_mempool();
        connect_tip(&chain, &mut wallet);
        for _ in 0..wallet.params().zerocoin_mint_maturity {
            chain.mine_empty_blocks(1);
            connect_tip(&chain, &mut wallet);
        }

        let receipt = wallet
            .spend_zerocoin(
                &chain,
                &prover,
                &ZerocoinSpendRequest::new(10 * COIN, Script::pay_to_pubkey(&[5u8; 33])),
            )
            .unwrap();
        let txid = receipt.txids()[0];
        chain.mine_mempool();
        connect_tip(&chain, &mut wallet);
        assert_eq!(store.zerocoin_spends_for_tx(&txid).unwrap(), 1);
        txid
    };

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let wallet = Wallet::load(regtest(), store.clone()).unwrap();
    assert!(wallet.get_tx(&spend_txid).is_some());
    assert_eq!(wallet.mints().len(), 2);
    assert_eq!(store.load_zerocoin_spends().unwrap().len(), 1);
    assert_eq!(wallet.get_zerocoin_balance(&chain, true), 10 * COIN);
    assert!(chain.is_serial_in_chain(&store.load_zerocoin_spends().unwrap()[0].hash_serial).is_some());
}
