//! Zerocoin mints and their metadata
//!
//! A [`Mint`] carries the secrets needed to spend. [`MintMeta`] is the
//! secret-free view the tracker and balance code work with.

use super::denomination::Denomination;
use super::prover::ZerocoinProver;
use crate::primitives::{sha256, sha256d, Hash256};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Mint has reached the required confirmations
pub const MINT_MATURE: u8 = 1 << 0;
/// Mint is in a main-chain block
pub const MINT_CONFIRMED: u8 = 1 << 1;
/// A spend of this mint is waiting in the mempool
pub const MINT_PENDINGSPEND: u8 = 1 << 2;

/// Current mint version; carries a spend key.
pub const CURRENT_MINT_VERSION: u8 = 2;

/// A spendable zerocoin with its secrets.
#[derive(Clone, Serialize, Deserialize)]
pub struct Mint {
    /// Face value
    pub denomination: Denomination,
    serial: [u8; 32],
    randomness: [u8; 32],
    /// Public coin value
    pub pubcoin: Vec<u8>,
    /// Mint version
    pub version: u8,
    private_key: Option<[u8; 32]>,
    /// Confirmation height, once known
    pub height: Option<u32>,
    /// Minting transaction
    pub txid: Hash256,
    /// Spent
    pub used: bool,
    /// Derivation counter for deterministic mints
    pub count: Option<u32>,
}

impl Mint {
    /// Assemble a mint from its parts.
    pub fn new(
        denomination: Denomination,
        serial: [u8; 32],
        randomness: [u8; 32],
        pubcoin: Vec<u8>,
        private_key: Option<[u8; 32]>,
    ) -> Self {
        Self {
            denomination,
            serial,
            randomness,
            pubcoin,
            version: CURRENT_MINT_VERSION,
            private_key,
            height: None,
            txid: Hash256::ZERO,
            used: false,
            count: None,
        }
    }

    /// Serial number.
    pub fn serial(&self) -> &[u8; 32] {
        &self.serial
    }

    /// Commitment randomness.
    pub fn randomness(&self) -> &[u8; 32] {
        &self.randomness
    }

    /// Spend key of version 2 mints.
    pub fn private_key(&self) -> Option<&[u8; 32]> {
        self.private_key.as_ref()
    }

    /// Hash of the serial, as indexed by the chain.
    pub fn hash_serial(&self) -> Hash256 {
        serial_hash(&self.serial)
    }

    /// Hash of the public coin.
    pub fn hash_pubcoin(&self) -> Hash256 {
        pubcoin_hash(&self.pubcoin)
    }

    /// Stake hash, distinct from the serial hash.
    pub fn hash_stake(&self) -> Hash256 {
        sha256d(&self.serial)
    }

    /// True when derived from the wallet seed.
    pub fn is_deterministic(&self) -> bool {
        self.count.is_some()
    }

    /// Secret-free metadata view.
    pub fn meta(&self) -> MintMeta {
        MintMeta {
            height: self.height,
            hash_serial: self.hash_serial(),
            hash_pubcoin: self.hash_pubcoin(),
            hash_stake: self.hash_stake(),
            version: self.version,
            denom: self.denomination,
            txid: self.txid,
            is_used: self.used,
            is_archived: false,
            is_deterministic: self.is_deterministic(),
            mem_flags: 0,
        }
    }
}

impl Drop for Mint {
    fn drop(&mut self) {
        self.serial.zeroize();
        self.randomness.zeroize();
        if let Some(key) = self.private_key.as_mut() {
            key.zeroize();
        }
    }
}

impl std::fmt::Debug for Mint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mint")
            .field("denomination", &self.denomination)
            .field("hash_serial", &self.hash_serial())
            .field("height", &self.height)
            .field("txid", &self.txid)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

/// Hash a serial number.
pub fn serial_hash(serial: &[u8; 32]) -> Hash256 {
    sha256(serial)
}

/// Hash a public coin value.
pub fn pubcoin_hash(pubcoin: &[u8]) -> Hash256 {
    sha256(pubcoin)
}

/// Secret-free mint state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintMeta {
    /// Confirmation height, once known
    pub height: Option<u32>,
    /// Serial hash
    pub hash_serial: Hash256,
    /// Pubcoin hash
    pub hash_pubcoin: Hash256,
    /// Stake hash
    pub hash_stake: Hash256,
    /// Mint version
    pub version: u8,
    /// Face value
    pub denom: Denomination,
    /// Minting transaction
    pub txid: Hash256,
    /// Spent, or spend pending
    pub is_used: bool,
    /// Moved out of the active set
    pub is_archived: bool,
    /// Derived from the wallet seed
    pub is_deterministic: bool,
    /// In-memory `MINT_*` flags, never persisted meaningfully
    pub mem_flags: u8,
}

impl MintMeta {
    /// True when every bit of `flag` is set.
    pub fn has_flag(&self, flag: u8) -> bool {
        self.mem_flags & flag == flag
    }

    /// Set or clear `flag`.
    pub fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.mem_flags |= flag;
        } else {
            self.mem_flags &= !flag;
        }
    }
}

/// Deterministic mint source seeded from the wallet.
pub struct MintGenerator {
    seed: [u8; 32],
    count: u32,
}

impl MintGenerator {
    /// Generator starting at `count`.
    pub fn new(seed: [u8; 32], count: u32) -> Self {
        Self { seed, count }
    }

    /// Next derivation counter.
    pub fn count(&self) -> u32 {
        self.count
    }

    fn derive(&self, count: u32, tag: u8) -> [u8; 32] {
        let mut buf = Vec::with_capacity(37);
        buf.extend_from_slice(&self.seed);
        buf.extend_from_slice(&count.to_le_bytes());
        buf.push(tag);
        *sha256(&buf).as_bytes()
    }

    /// Derive the next mint of `denom`.
    pub fn generate(&mut self, prover: &dyn ZerocoinProver, denom: Denomination) -> Result<Mint> {
        let count = self.count;
        let serial = self.derive(count, 0);
        let randomness = self.derive(count, 1);
        let private_key = self.derive(count, 2);
        let pubcoin = prover
            .commit(denom, &serial, &randomness)
            .map_err(|e| Error::Other(format!("mint commitment failed: {}", e)))?;

        self.count = count.wrapping_add(1);
        let mut mint = Mint::new(denom, serial, randomness, pubcoin, Some(private_key));
        mint.count = Some(count);
        tracing::debug!("Generated deterministic mint #{} of {}", count, denom);
        Ok(mint)
    }
}

impl Drop for MintGenerator {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}
