//! Key storage and input signing
//!
//! Keys are held by compressed public key. Ownership of a script is decided by the
//! pay-to-pubkey template; anything else is only ours when explicitly watched.

use crate::primitives::{sha256d, Hash256, MutableTransaction, Script};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Sign every input, all outputs committed.
pub const SIGHASH_ALL: u8 = 0x01;

/// Upper bound of a DER-encoded low-R signature.
pub const MAX_DER_SIGNATURE_LEN: usize = 72;

/// Serialized compressed public key.
pub type PubKeyBytes = [u8; 33];

/// Ownership of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IsMine {
    /// Not ours
    No,
    /// Watched, no private key
    WatchOnly,
    /// Private key held
    Spendable,
}

/// Which ownership classes a query counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsMineFilter {
    /// Spendable outputs only
    Spendable,
    /// Watch-only outputs only
    WatchOnly,
    /// Both
    All,
}

impl IsMineFilter {
    /// True when `mine` is counted by this filter.
    pub fn matches(self, mine: IsMine) -> bool {
        match (self, mine) {
            (_, IsMine::No) => false,
            (IsMineFilter::All, _) => true,
            (IsMineFilter::Spendable, IsMine::Spendable) => true,
            (IsMineFilter::WatchOnly, IsMine::WatchOnly) => true,
            _ => false,
        }
    }

    /// Index into per-filter cache arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            IsMineFilter::Spendable => 0,
            IsMineFilter::WatchOnly => 1,
            IsMineFilter::All => 2,
        }
    }
}

/// In-memory key store.
#[derive(Default)]
pub struct KeyStore {
    keys: HashMap<PubKeyBytes, SecretKey>,
    watch_scripts: HashSet<Script>,
    watch_pubkeys: HashSet<PubKeyBytes>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("keys", &self.keys.len())
            .field("watch_scripts", &self.watch_scripts.len())
            .field("watch_pubkeys", &self.watch_pubkeys.len())
            .finish()
    }
}

impl KeyStore {
    /// Empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a secret key, returning its public key.
    pub fn add_key(&mut self, secret: SecretKey) -> PubKeyBytes {
        let pubkey = PublicKey::from_secret_key(&SECP, &secret).serialize();
        self.keys.insert(pubkey, secret);
        pubkey
    }

    /// Import a raw 32-byte secret.
    pub fn add_key_bytes(&mut self, bytes: &[u8]) -> Result<PubKeyBytes> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| Error::Other(format!("invalid secret key: {}", e)))?;
        Ok(self.add_key(secret))
    }

    /// Generate a fresh key from the OS RNG.
    pub fn generate_key(&mut self) -> PubKeyBytes {
        loop {
            let bytes: [u8; 32] = rand::random();
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return self.add_key(secret);
            }
        }
    }

    /// Watch a script without holding its key.
    pub fn add_watch_only(&mut self, script: Script) {
        self.watch_scripts.insert(script);
    }

    /// Watch a public key; its pay-to-pubkey script becomes watch-only and solvable.
    pub fn add_watch_pubkey(&mut self, pubkey: PubKeyBytes) {
        self.watch_pubkeys.insert(pubkey);
    }

    /// True when the private key for `pubkey` is held.
    pub fn have_key(&self, pubkey: &PubKeyBytes) -> bool {
        self.keys.contains_key(pubkey)
    }

    /// Number of private keys held.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Ownership of `script`.
    pub fn is_mine(&self, script: &Script) -> IsMine {
        if let Some(pk) = script.pay_to_pubkey_key() {
            if self.keys.contains_key(&pk) {
                return IsMine::Spendable;
            }
            if self.watch_pubkeys.contains(&pk) {
                return IsMine::WatchOnly;
            }
        }
        if self.watch_scripts.contains(script) {
            return IsMine::WatchOnly;
        }
        IsMine::No
    }

    /// True when a signature for `script` can be sized, with or without the key.
    pub fn is_solvable(&self, script: &Script) -> bool {
        match script.pay_to_pubkey_key() {
            Some(pk) => self.keys.contains_key(&pk) || self.watch_pubkeys.contains(&pk),
            None => false,
        }
    }

    /// Legacy signature hash of input `index` spending `prev_script`.
    pub fn signature_hash(
        tx: &MutableTransaction,
        index: usize,
        prev_script: &Script,
        sighash_type: u8,
    ) -> Hash256 {
        let mut copy = tx.clone();
        for (i, input) in copy.inputs.iter_mut().enumerate() {
            input.script_witness.clear();
            input.script_sig = if i == index {
                prev_script.clone()
            } else {
                Script::new()
            };
        }
        let mut buf = Vec::new();
        copy.encode_with(&mut buf, false);
        buf.extend_from_slice(&(sighash_type as u32).to_le_bytes());
        sha256d(&buf)
    }

    /// Sign input `index` spending an output locked by `prev_script`.
    pub fn sign_input(
        &self,
        tx: &mut MutableTransaction,
        index: usize,
        prev_script: &Script,
    ) -> Result<()> {
        let pk = prev_script.pay_to_pubkey_key().ok_or(Error::SigningFailed)?;
        let secret = self.keys.get(&pk).ok_or(Error::SigningFailed)?;
        if index >= tx.inputs.len() {
            return Err(Error::SigningFailed);
        }

        let sighash = Self::signature_hash(tx, index, prev_script, SIGHASH_ALL);
        let msg = Message::from_slice(sighash.as_bytes()).map_err(|_| Error::SigningFailed)?;
        let sig = SECP.sign_ecdsa_low_r(&msg, secret);

        let mut push = sig.serialize_der().to_vec();
        push.push(SIGHASH_ALL);
        let mut script_sig = Script::new();
        script_sig.push_slice(&push);
        tx.inputs[index].script_sig = script_sig;
        Ok(())
    }

    /// Fill input `index` with a maximum-size placeholder signature.
    pub fn dummy_sign_input(
        &self,
        tx: &mut MutableTransaction,
        index: usize,
        prev_script: &Script,
    ) -> Result<()> {
        if !self.is_solvable(prev_script) || index >= tx.inputs.len() {
            return Err(Error::SigningFailed);
        }
        let mut script_sig = Script::new();
        script_sig.push_slice(&dummy_signature());
        tx.inputs[index].script_sig = script_sig;
        Ok(())
    }

    /// Verify the signature in input `index` against `prev_script`.
    pub fn verify_input(tx: &MutableTransaction, index: usize, prev_script: &Script) -> bool {
        let Some(pk) = prev_script.pay_to_pubkey_key() else {
            return false;
        };
        let Some(input) = tx.inputs.get(index) else {
            return false;
        };
        let sig_bytes = input.script_sig.as_bytes();
        if sig_bytes.len() < 2 || sig_bytes[0] as usize != sig_bytes.len() - 1 {
            return false;
        }
        let der = &sig_bytes[1..sig_bytes.len() - 1];
        let sighash = Self::signature_hash(tx, index, prev_script, SIGHASH_ALL);
        let (Ok(msg), Ok(sig), Ok(key)) = (
            Message::from_slice(sighash.as_bytes()),
            secp256k1::ecdsa::Signature::from_der(der),
            PublicKey::from_slice(&pk),
        ) else {
            return false;
        };
        SECP.verify_ecdsa(&msg, &sig, &key).is_ok()
    }
}

/// Placeholder of the largest signature push, used for size estimation.
pub fn dummy_signature() -> Vec<u8> {
    let mut sig = vec![0u8; MAX_DER_SIGNATURE_LEN];
    sig.push(SIGHASH_ALL);
    sig
}

/// Size of a signed pay-to-pubkey input: outpoint, script length, push, signature, sequence.
pub fn p2pk_input_size() -> usize {
    36 + 1 + 1 + MAX_DER_SIGNATURE_LEN + 1 + 4
}
