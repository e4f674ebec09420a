//! Fuzz test for transaction decoding
//!
//! Arbitrary bytes must never panic the decoder, and anything it accepts must
//! survive a second encode and decode unchanged

#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::Transaction;

fuzz_target!(|data: &[u8]| {
    let Ok(tx) = Transaction::from_bytes(data) else {
        return;
    };

    let bytes = tx.to_bytes();
    let again = Transaction::from_bytes(&bytes).expect("re-encoded transaction decodes");
    assert_eq!(again.hash(), tx.hash());
    assert_eq!(again.to_bytes(), bytes);

    // Size accounting must agree with the encoder
    assert_eq!(tx.total_size(), bytes.len());
    let _ = tx.total_plain_out();
});
