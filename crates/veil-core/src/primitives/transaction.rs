//! Polymorphic transaction model
//!
//! A transaction carries a vector of outputs that may freely mix plain, blinded,
//! ring-signature and data outputs. Each output is prefixed on the wire by a
//! one-byte kind discriminant.
//!
//! [`MutableTransaction`] is the builder; [`Transaction`] is the frozen value whose
//! txid and witness hash are computed once at construction.

use super::encode::{
    compact_size_len, write_stack, write_var_bytes, write_varint, Decodable, DecodeError,
    Encodable, Reader,
};
use super::hash::{sha256d, Hash256};
use super::script::Script;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use veil_params::{money_range, Amount};

/// Output index marking an anonymous (RingCT or zerocoin) input.
pub const ANON_MARKER: u32 = 0xffff_ffa0;

/// Sequence number that disables lock time.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Disables relative lock time for the input.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// Highest sequence number that still signals opt-in replace-by-fee.
pub const MAX_BIP125_RBF_SEQUENCE: u32 = 0xffff_fffd;

/// Current transaction format version.
pub const CURRENT_VERSION: u8 = 2;

/// Scale factor between base size and witness size in weight units.
pub const WITNESS_SCALE_FACTOR: usize = 4;

/// Data output sub-types (first byte of a data output payload).
pub mod data_output {
    /// No payload
    pub const NULL: u8 = 0;
    /// Plain narration
    pub const NARR_PLAIN: u8 = 1;
    /// Encrypted narration
    pub const NARR_CRYPT: u8 = 2;
    /// Stealth ephemeral key
    pub const STEALTH: u8 = 3;
    /// Stealth prefix
    pub const STEALTH_PREFIX: u8 = 4;
    /// Governance vote
    pub const VOTE: u8 = 5;
    /// Explicit fee of a blinded transaction
    pub const FEE: u8 = 6;
    /// Development fund carry-forward
    pub const DEV_FUND_CFWD: u8 = 7;
    /// Fund message
    pub const FUND_MSG: u8 = 8;
}

/// Reference to a previous output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Previous transaction hash
    pub hash: Hash256,
    /// Output index
    pub n: u32,
}

impl OutPoint {
    /// Create an outpoint.
    pub const fn new(hash: Hash256, n: u32) -> Self {
        Self { hash, n }
    }

    /// The null outpoint used by coinbase and zerocoin spend inputs.
    pub const fn null() -> Self {
        Self {
            hash: Hash256::ZERO,
            n: u32::MAX,
        }
    }

    /// True for the null outpoint.
    pub fn is_null(&self) -> bool {
        self.hash.is_null() && self.n == u32::MAX
    }

    /// True when this input is a RingCT or anonymous spend.
    pub fn is_anon_input(&self) -> bool {
        self.n == ANON_MARKER
    }

    /// Anonymous input marker carrying `(n_inputs, ring_size)` in the hash bytes.
    pub fn anon(n_inputs: u32, ring_size: u32) -> Self {
        let mut hash = Hash256::ZERO;
        let bytes = hash.as_mut_bytes();
        bytes[0..4].copy_from_slice(&n_inputs.to_le_bytes());
        bytes[4..8].copy_from_slice(&ring_size.to_le_bytes());
        Self {
            hash,
            n: ANON_MARKER,
        }
    }

    /// Decode `(n_inputs, ring_size)` from an anonymous marker.
    pub fn anon_info(&self) -> Option<(u32, u32)> {
        if !self.is_anon_input() {
            return None;
        }
        let b = self.hash.as_bytes();
        let n_inputs = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let ring_size = u32::from_le_bytes([b[4], b[5], b[6], b[7]]);
        Some((n_inputs, ring_size))
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.n)
    }
}

impl Encodable for OutPoint {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(&self.n.to_le_bytes());
    }
}

impl Decodable for OutPoint {
    fn decode(r: &mut Reader<'_>) -> std::result::Result<Self, DecodeError> {
        let hash = Hash256::from_bytes(r.read_array()?);
        let n = r.read_u32()?;
        Ok(Self { hash, n })
    }
}

/// Transaction input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    /// Output being spent
    pub prevout: OutPoint,
    /// Unlocking script
    pub script_sig: Script,
    /// Sequence number
    pub sequence: u32,
    /// Non-prunable data for anonymous inputs (key images, proofs)
    pub script_data: Vec<Vec<u8>>,
    /// Segwit-style witness stack
    pub script_witness: Vec<Vec<u8>>,
}

impl TxIn {
    /// Input spending `prevout` with an empty script.
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            script_sig: Script::new(),
            sequence: SEQUENCE_FINAL,
            script_data: Vec::new(),
            script_witness: Vec::new(),
        }
    }

    /// True for RingCT inputs.
    pub fn is_anon_input(&self) -> bool {
        self.prevout.is_anon_input()
    }

    /// True for zerocoin spend inputs.
    pub fn is_zerocoin_spend(&self) -> bool {
        self.prevout.is_null() && self.script_sig.is_zerocoin_spend()
    }

    fn encode_base(&self, out: &mut Vec<u8>) {
        self.prevout.encode(out);
        self.script_sig.encode(out);
        out.extend_from_slice(&self.sequence.to_le_bytes());
        if self.is_anon_input() {
            write_stack(out, &self.script_data);
        }
    }

    fn decode_base(r: &mut Reader<'_>) -> std::result::Result<Self, DecodeError> {
        let prevout = OutPoint::decode(r)?;
        let script_sig = Script::from_bytes(r.read_var_bytes()?);
        let sequence = r.read_u32()?;
        let script_data = if prevout.is_anon_input() {
            r.read_stack()?
        } else {
            Vec::new()
        };
        Ok(Self {
            prevout,
            script_sig,
            sequence,
            script_data,
            script_witness: Vec::new(),
        })
    }
}

/// Transaction class stored in the high byte of the version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    /// Ordinary transfer
    Standard = 0,
    /// Proof-of-work block reward
    Coinbase = 1,
    /// Proof-of-stake block reward
    Coinstake = 2,
}

impl TryFrom<u8> for TxType {
    type Error = DecodeError;

    fn try_from(b: u8) -> std::result::Result<Self, DecodeError> {
        match b {
            0 => Ok(TxType::Standard),
            1 => Ok(TxType::Coinbase),
            2 => Ok(TxType::Coinstake),
            other => Err(DecodeError::UnknownTxType(other)),
        }
    }
}

/// Output kind discriminant as written on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum OutputKind {
    /// Plain value and script
    Standard = 1,
    /// Pedersen-committed value with a script
    Ct = 2,
    /// Ring-signature output
    RingCt = 3,
    /// Opaque data (fee marker, narration, votes)
    Data = 4,
}

impl OutputKind {
    /// Bit used in coin-type masks.
    pub fn mask_bit(self) -> u8 {
        match self {
            OutputKind::Standard => crate::available::KIND_BASECOIN,
            OutputKind::Ct => crate::available::KIND_CT,
            OutputKind::RingCt => crate::available::KIND_RINGCT,
            OutputKind::Data => 0,
        }
    }
}

impl TryFrom<u8> for OutputKind {
    type Error = DecodeError;

    fn try_from(b: u8) -> std::result::Result<Self, DecodeError> {
        match b {
            1 => Ok(OutputKind::Standard),
            2 => Ok(OutputKind::Ct),
            3 => Ok(OutputKind::RingCt),
            4 => Ok(OutputKind::Data),
            other => Err(DecodeError::UnknownOutputType(other)),
        }
    }
}

/// Plain output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StandardOutput {
    /// Value in satoshis
    pub value: Amount,
    /// Locking script
    pub script_pubkey: Script,
}

/// Confidential (blinded amount) output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CtOutput {
    /// Pedersen commitment
    pub commitment: [u8; 33],
    /// Blinded data; the first 33 bytes are the ephemeral public key
    pub data: Vec<u8>,
    /// Locking script
    pub script_pubkey: Script,
    /// Range proof
    pub range_proof: Vec<u8>,
}

/// RingCT output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingCtOutput {
    /// One-time public key
    pub pubkey: [u8; 33],
    /// Pedersen commitment
    pub commitment: [u8; 33],
    /// Blinded data
    pub data: Vec<u8>,
    /// Range proof
    pub range_proof: Vec<u8>,
}

/// Data-only output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataOutput {
    /// Payload, first byte is the data sub-type
    pub data: Vec<u8>,
}

/// A transaction output of any kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    /// Plain output
    Standard(StandardOutput),
    /// Confidential output
    ConfidentialTx(CtOutput),
    /// RingCT output
    RingCt(RingCtOutput),
    /// Data output
    Data(DataOutput),
}

impl Output {
    /// Plain output paying `value` to `script_pubkey`.
    pub fn standard(value: Amount, script_pubkey: Script) -> Self {
        Output::Standard(StandardOutput {
            value,
            script_pubkey,
        })
    }

    /// Data output carrying an explicit fee for a blinded transaction.
    pub fn fee_marker(fee: Amount) -> Self {
        let mut data = vec![data_output::FEE];
        write_varint(&mut data, fee.max(0) as u64);
        Output::Data(DataOutput { data })
    }

    /// Wire discriminant.
    pub fn kind(&self) -> OutputKind {
        match self {
            Output::Standard(_) => OutputKind::Standard,
            Output::ConfidentialTx(_) => OutputKind::Ct,
            Output::RingCt(_) => OutputKind::RingCt,
            Output::Data(_) => OutputKind::Data,
        }
    }

    /// Plaintext value. Blinded outputs return `None`; data outputs carry no value.
    pub fn value(&self) -> Option<Amount> {
        match self {
            Output::Standard(o) => Some(o.value),
            Output::Data(_) => Some(0),
            Output::ConfidentialTx(_) | Output::RingCt(_) => None,
        }
    }

    /// Replace the plaintext value. Only standard outputs have one.
    pub fn set_value(&mut self, value: Amount) -> bool {
        match self {
            Output::Standard(o) => {
                o.value = value;
                true
            }
            _ => false,
        }
    }

    /// Locking script, when the output carries one on-chain.
    pub fn script_pubkey(&self) -> Option<&Script> {
        match self {
            Output::Standard(o) => Some(&o.script_pubkey),
            Output::ConfidentialTx(o) => Some(&o.script_pubkey),
            Output::RingCt(_) | Output::Data(_) => None,
        }
    }

    /// True for CT and RingCT outputs.
    pub fn is_blinded(&self) -> bool {
        matches!(self, Output::ConfidentialTx(_) | Output::RingCt(_))
    }

    /// True for a plain output locked by a zerocoin mint script.
    pub fn is_zerocoin_mint(&self) -> bool {
        matches!(self, Output::Standard(o) if o.script_pubkey.is_zerocoin_mint())
    }

    /// Explicit fee carried by a fee-marker data output.
    pub fn fee(&self) -> Option<Amount> {
        let Output::Data(d) = self else {
            return None;
        };
        if d.data.first() != Some(&data_output::FEE) {
            return None;
        }
        let mut r = Reader::new(&d.data[1..]);
        let fee = r.read_varint().ok()?;
        i64::try_from(fee).ok()
    }

    /// Serialized body size, excluding the kind byte.
    pub fn body_len(&self) -> usize {
        let mut buf = Vec::new();
        self.encode_body(&mut buf);
        buf.len()
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        match self {
            Output::Standard(o) => {
                out.extend_from_slice(&o.value.to_le_bytes());
                o.script_pubkey.encode(out);
            }
            Output::ConfidentialTx(o) => {
                out.extend_from_slice(&o.commitment);
                write_var_bytes(out, &o.data);
                o.script_pubkey.encode(out);
                write_var_bytes(out, &o.range_proof);
            }
            Output::RingCt(o) => {
                out.extend_from_slice(&o.pubkey);
                out.extend_from_slice(&o.commitment);
                write_var_bytes(out, &o.data);
                write_var_bytes(out, &o.range_proof);
            }
            Output::Data(o) => {
                write_var_bytes(out, &o.data);
            }
        }
    }

    fn decode_body(kind: OutputKind, r: &mut Reader<'_>) -> std::result::Result<Self, DecodeError> {
        Ok(match kind {
            OutputKind::Standard => Output::Standard(StandardOutput {
                value: r.read_i64()?,
                script_pubkey: Script::from_bytes(r.read_var_bytes()?),
            }),
            OutputKind::Ct => Output::ConfidentialTx(CtOutput {
                commitment: r.read_array()?,
                data: r.read_var_bytes()?,
                script_pubkey: Script::from_bytes(r.read_var_bytes()?),
                range_proof: r.read_var_bytes()?,
            }),
            OutputKind::RingCt => Output::RingCt(RingCtOutput {
                pubkey: r.read_array()?,
                commitment: r.read_array()?,
                data: r.read_var_bytes()?,
                range_proof: r.read_var_bytes()?,
            }),
            OutputKind::Data => Output::Data(DataOutput {
                data: r.read_var_bytes()?,
            }),
        })
    }

    /// Hash of the output body, chained into [`Transaction::outputs_hash`].
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.encode_body(&mut buf);
        sha256d(&buf)
    }
}

impl Encodable for Output {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.kind() as u8);
        self.encode_body(out);
    }
}

impl Decodable for Output {
    fn decode(r: &mut Reader<'_>) -> std::result::Result<Self, DecodeError> {
        let kind = OutputKind::try_from(r.read_u8()?)?;
        Self::decode_body(kind, r)
    }
}

/// Transaction under construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutableTransaction {
    /// Format version (low byte)
    pub version: u8,
    /// Transaction class (high byte)
    pub tx_type: TxType,
    /// Inputs
    pub inputs: Vec<TxIn>,
    /// Outputs
    pub outputs: Vec<Output>,
    /// Lock time
    pub lock_time: u32,
}

impl Default for MutableTransaction {
    fn default() -> Self {
        Self::new()
    }
}

impl MutableTransaction {
    /// Empty standard transaction.
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            tx_type: TxType::Standard,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    /// True when any input carries a witness stack.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|i| !i.script_witness.is_empty())
    }

    /// Encode, optionally including witness data.
    pub fn encode_with(&self, out: &mut Vec<u8>, with_witness: bool) {
        let witness = with_witness && self.has_witness();
        out.push(self.version);
        out.push(self.tx_type as u8);
        out.push(witness as u8);
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        crate::primitives::encode::write_compact_size(out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode_base(out);
        }
        crate::primitives::encode::write_compact_size(out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(out);
        }
        if witness {
            for input in &self.inputs {
                write_stack(out, &input.script_witness);
            }
        }
    }

    /// Transaction id: double SHA-256 of the witness-stripped encoding.
    pub fn txid(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.encode_with(&mut buf, false);
        sha256d(&buf)
    }

    /// Encoded size without witness data.
    pub fn base_size(&self) -> usize {
        let mut buf = Vec::new();
        self.encode_with(&mut buf, false);
        buf.len()
    }

    /// Encoded size including witness data.
    pub fn total_size(&self) -> usize {
        let mut buf = Vec::new();
        self.encode_with(&mut buf, true);
        buf.len()
    }

    /// Freeze into an immutable transaction.
    pub fn freeze(self) -> Transaction {
        Transaction::from_mutable(self)
    }
}

impl Encodable for MutableTransaction {
    fn encode(&self, out: &mut Vec<u8>) {
        self.encode_with(out, true);
    }
}

impl Decodable for MutableTransaction {
    fn decode(r: &mut Reader<'_>) -> std::result::Result<Self, DecodeError> {
        let version = r.read_u8()?;
        let tx_type = TxType::try_from(r.read_u8()?)?;
        let has_witness = r.read_u8()? != 0;
        let lock_time = r.read_u32()?;

        let n_inputs = r.read_len()?;
        let mut inputs = Vec::with_capacity(n_inputs.min(4096));
        for _ in 0..n_inputs {
            inputs.push(TxIn::decode_base(r)?);
        }

        let n_outputs = r.read_len()?;
        let mut outputs = Vec::with_capacity(n_outputs.min(4096));
        for _ in 0..n_outputs {
            outputs.push(Output::decode(r)?);
        }

        if has_witness {
            for input in inputs.iter_mut() {
                input.script_witness = r.read_stack()?;
            }
        }

        Ok(Self {
            version,
            tx_type,
            inputs,
            outputs,
            lock_time,
        })
    }
}

/// Immutable transaction with cached hashes.
#[derive(Clone, PartialEq, Eq)]
pub struct Transaction {
    inner: MutableTransaction,
    hash: Hash256,
    witness_hash: Hash256,
}

impl Transaction {
    fn from_mutable(inner: MutableTransaction) -> Self {
        let hash = inner.txid();
        let witness_hash = if inner.has_witness() {
            let mut buf = Vec::new();
            inner.encode_with(&mut buf, true);
            sha256d(&buf)
        } else {
            hash
        };
        Self {
            inner,
            hash,
            witness_hash,
        }
    }

    /// Parse a full transaction, rejecting trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let tx = Self::decode(&mut r)?;
        r.finish()?;
        Ok(tx)
    }

    /// Full encoding including witness data.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Copy into a builder. Any change yields a new transaction.
    pub fn to_mutable(&self) -> MutableTransaction {
        self.inner.clone()
    }

    /// Transaction id.
    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    /// Hash including witness data.
    pub fn witness_hash(&self) -> Hash256 {
        self.witness_hash
    }

    /// Format version.
    pub fn version(&self) -> u8 {
        self.inner.version
    }

    /// Transaction class.
    pub fn tx_type(&self) -> TxType {
        self.inner.tx_type
    }

    /// Inputs.
    pub fn inputs(&self) -> &[TxIn] {
        &self.inner.inputs
    }

    /// Outputs.
    pub fn outputs(&self) -> &[Output] {
        &self.inner.outputs
    }

    /// Lock time.
    pub fn lock_time(&self) -> u32 {
        self.inner.lock_time
    }

    /// True when both input and output lists are empty.
    pub fn is_null(&self) -> bool {
        self.inner.inputs.is_empty() && self.inner.outputs.is_empty()
    }

    /// Proof-of-work reward transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inner.tx_type == TxType::Coinbase
            || (self.inner.inputs.len() == 1
                && self.inner.inputs[0].prevout.is_null()
                && !self.inner.inputs[0].is_zerocoin_spend())
    }

    /// Proof-of-stake reward transaction.
    pub fn is_coinstake(&self) -> bool {
        self.inner.tx_type == TxType::Coinstake
    }

    /// True when any input is a zerocoin spend.
    pub fn is_zerocoin_spend(&self) -> bool {
        self.inner.inputs.iter().any(TxIn::is_zerocoin_spend)
    }

    /// True when any output is a zerocoin mint.
    pub fn is_zerocoin_mint(&self) -> bool {
        self.inner.outputs.iter().any(Output::is_zerocoin_mint)
    }

    /// True when any input is an anonymous (RingCT) input.
    pub fn has_blinded_inputs(&self) -> bool {
        self.inner.inputs.iter().any(TxIn::is_anon_input)
    }

    /// True when any input carries witness data.
    pub fn has_witness(&self) -> bool {
        self.inner.has_witness()
    }

    /// Sum of plaintext output values, failing on any out-of-range value.
    pub fn total_plain_out(&self) -> Result<Amount> {
        let mut total: Amount = 0;
        for output in &self.inner.outputs {
            let value = output.value().unwrap_or(0);
            if !money_range(value) {
                return Err(Error::InvalidAmount(format!(
                    "output value {} out of range",
                    value
                )));
            }
            total = total
                .checked_add(value)
                .filter(|t| money_range(*t))
                .ok_or_else(|| Error::InvalidAmount("output total out of range".to_string()))?;
        }
        Ok(total)
    }

    /// Explicit fee declared by a fee-marker data output.
    pub fn declared_fee(&self) -> Option<Amount> {
        self.inner.outputs.iter().find_map(Output::fee)
    }

    /// Chained hash over every output, bound into zerocoin spend proofs.
    pub fn outputs_hash(&self) -> Hash256 {
        outputs_hash(&self.inner.outputs)
    }

    /// Size without witness data.
    pub fn base_size(&self) -> usize {
        self.inner.base_size()
    }

    /// Size including witness data.
    pub fn total_size(&self) -> usize {
        self.inner.total_size()
    }

    /// Weight in weight units.
    pub fn weight(&self) -> usize {
        self.base_size() * (WITNESS_SCALE_FACTOR - 1) + self.total_size()
    }
}

/// Chained hash over the given outputs.
pub fn outputs_hash(outputs: &[Output]) -> Hash256 {
    let mut acc = Hash256::ZERO;
    for output in outputs {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(output.hash().as_bytes());
        buf.extend_from_slice(acc.as_bytes());
        acc = sha256d(&buf);
    }
    acc
}

/// Serialized size of an output including its kind byte, used for dust and change sizing.
pub fn output_size(output: &Output) -> usize {
    1 + output.body_len()
}

/// Serialized size of a plain output paying to a script of the given length.
pub fn standard_output_size(script_len: usize) -> usize {
    1 + 8 + compact_size_len(script_len as u64) + script_len
}

impl Encodable for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        self.inner.encode_with(out, true);
    }
}

impl Decodable for Transaction {
    fn decode(r: &mut Reader<'_>) -> std::result::Result<Self, DecodeError> {
        Ok(MutableTransaction::decode(r)?.freeze())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("hash", &self.hash)
            .field("type", &self.inner.tx_type)
            .field("inputs", &self.inner.inputs.len())
            .field("outputs", &self.inner.outputs.len())
            .field("lock_time", &self.inner.lock_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> MutableTransaction {
        let mut tx = MutableTransaction::new();
        tx.lock_time = 42;
        tx.inputs.push(TxIn::new(OutPoint::new(Hash256::from_bytes([7u8; 32]), 1)));
        let mut anon = TxIn::new(OutPoint::anon(2, 11));
        anon.script_data = vec![vec![1, 2, 3], vec![4; 33]];
        tx.inputs.push(anon);
        tx.outputs.push(Output::standard(5_000, Script::from_bytes(vec![0x51])));
        tx.outputs.push(Output::ConfidentialTx(CtOutput {
            commitment: [8u8; 33],
            data: vec![3u8; 33],
            script_pubkey: Script::from_bytes(vec![0x52]),
            range_proof: vec![9u8; 10],
        }));
        tx.outputs.push(Output::RingCt(RingCtOutput {
            pubkey: [2u8; 33],
            commitment: [9u8; 33],
            data: vec![],
            range_proof: vec![1u8; 5],
        }));
        tx.outputs.push(Output::fee_marker(1_234));
        tx
    }

    #[test]
    fn test_roundtrip_mixed_outputs() {
        let tx = sample_tx().freeze();
        let bytes = tx.to_bytes();
        let parsed = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, tx);
        assert_eq!(parsed.to_bytes(), bytes);
        assert_eq!(parsed.hash(), tx.hash());
    }

    #[test]
    fn test_witness_changes_only_witness_hash() {
        let plain = sample_tx().freeze();
        let mut with_witness = sample_tx();
        with_witness.inputs[0].script_witness = vec![vec![0xaa; 72]];
        let with_witness = with_witness.freeze();

        assert_eq!(plain.hash(), with_witness.hash());
        assert_eq!(plain.witness_hash(), plain.hash());
        assert_ne!(with_witness.witness_hash(), with_witness.hash());

        let parsed = Transaction::from_bytes(&with_witness.to_bytes()).unwrap();
        assert_eq!(parsed.inputs()[0].script_witness, vec![vec![0xaa; 72]]);
    }

    #[test]
    fn test_unknown_output_type_is_fatal() {
        let mut bytes = Vec::new();
        let mut tx = MutableTransaction::new();
        tx.outputs.push(Output::standard(1, Script::new()));
        tx.encode(&mut bytes);
        // version, type, witness flag, lock time (4), input count, output count
        let kind_offset = 1 + 1 + 1 + 4 + 1 + 1;
        assert_eq!(bytes[kind_offset], OutputKind::Standard as u8);
        bytes[kind_offset] = 9;
        assert_eq!(
            Transaction::from_bytes(&bytes),
            Err(DecodeError::UnknownOutputType(9))
        );
    }

    #[test]
    fn test_anon_marker_info() {
        let op = OutPoint::anon(3, 11);
        assert!(op.is_anon_input());
        assert_eq!(op.anon_info(), Some((3, 11)));
        assert_eq!(OutPoint::new(Hash256::ZERO, 0).anon_info(), None);
    }

    #[test]
    fn test_fee_marker() {
        let tx = sample_tx().freeze();
        assert_eq!(tx.declared_fee(), Some(1_234));
        assert_eq!(tx.outputs()[0].fee(), None);
    }

    #[test]
    fn test_null_and_type() {
        let empty = MutableTransaction::new().freeze();
        assert!(empty.is_null());
        let mut stake = MutableTransaction::new();
        stake.tx_type = TxType::Coinstake;
        let stake = stake.freeze();
        assert!(stake.is_coinstake());
        assert_eq!(stake.tx_type(), TxType::Coinstake);
    }

    #[test]
    fn test_total_plain_out_rejects_negative() {
        let mut tx = MutableTransaction::new();
        tx.outputs.push(Output::standard(-1, Script::new()));
        assert!(tx.freeze().total_plain_out().is_err());
    }

    #[test]
    fn test_outputs_hash_depends_on_order() {
        let a = Output::standard(1, Script::new());
        let b = Output::standard(2, Script::new());
        assert_ne!(
            outputs_hash(&[a.clone(), b.clone()]),
            outputs_hash(&[b, a])
        );
        assert_eq!(outputs_hash(&[]), Hash256::ZERO);
    }

    #[test]
    fn test_weight() {
        let tx = sample_tx().freeze();
        assert_eq!(tx.weight(), tx.base_size() * 4);
    }
}
