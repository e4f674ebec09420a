//! Fuzz test for script classification
//!
//! Ensures script accessors handle arbitrary bytes gracefully

#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::Script;

fuzz_target!(|data: &[u8]| {
    let script = Script::from_bytes(data.to_vec());

    // Should never panic
    let _ = script.pay_to_pubkey_key();
    let _ = script.is_unspendable();
    let _ = script.zerocoin_spend_payload();

    if let Some(pubcoin) = script.zerocoin_mint_pubcoin() {
        assert!(script.is_zerocoin_mint());
        assert_eq!(Script::zerocoin_mint(&pubcoin).zerocoin_mint_pubcoin(), Some(pubcoin));
    }
});
