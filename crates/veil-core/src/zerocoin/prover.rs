//! Zero-knowledge interface used by the spend protocol
//!
//! Accumulator maintenance and proof generation live outside the wallet. The
//! wallet only sequences calls and binds proofs to the transaction's outputs.

use super::denomination::Denomination;
use super::mint::Mint;
use crate::primitives::Hash256;

/// Prover failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProverError {
    /// Mint values do not form a valid coin
    #[error("invalid coin: {0}")]
    InvalidCoin(String),

    /// Accumulator witness could not be built
    #[error("witness: {0}")]
    Witness(String),

    /// Proof generation failed
    #[error("proof: {0}")]
    Proof(String),

    /// Proof did not serialize
    #[error("serialization: {0}")]
    Serialization(String),
}

/// Membership witness of a pubcoin in a denomination's accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorWitness {
    /// Accumulator denomination
    pub denomination: Denomination,
    /// Checkpoint the witness is valid against
    pub checkpoint: Hash256,
    /// Security level the witness was built at
    pub security_level: u32,
    /// Opaque witness value
    pub data: Vec<u8>,
}

/// A serialized spend proof revealing the coin's serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSpend {
    /// Revealed serial
    pub serial: [u8; 32],
    /// Serial hash indexed by the chain
    pub hash_serial: Hash256,
    /// Denomination spent
    pub denomination: Denomination,
    /// Serialized proof, placed after `OP_ZEROCOINSPEND`
    pub bytes: Vec<u8>,
}

/// Zerocoin cryptography.
pub trait ZerocoinProver: Send + Sync {
    /// Public coin for the given secrets.
    fn commit(
        &self,
        denom: Denomination,
        serial: &[u8; 32],
        randomness: &[u8; 32],
    ) -> Result<Vec<u8>, ProverError>;

    /// True when `pubcoin` is a valid coin of `denom`.
    fn validate_pubcoin(&self, denom: Denomination, pubcoin: &[u8]) -> bool;

    /// Witness for `pubcoin` against `checkpoint`.
    fn build_witness(
        &self,
        denom: Denomination,
        pubcoin: &[u8],
        checkpoint: &Hash256,
        security_level: u32,
    ) -> Result<AccumulatorWitness, ProverError>;

    /// Spend proof for `mint`, bound to `outputs_hash`.
    fn prove(
        &self,
        mint: &Mint,
        witness: &AccumulatorWitness,
        outputs_hash: &Hash256,
    ) -> Result<CoinSpend, ProverError>;

    /// Check a spend proof against the outputs it claims to bind.
    fn verify(&self, spend: &CoinSpend, outputs_hash: &Hash256, checkpoint: &Hash256) -> bool;
}
