//! Consensus data structures: hashes, scripts, and the polymorphic transaction codec.

pub mod encode;
pub mod hash;
pub mod script;
pub mod transaction;

pub use encode::{Decodable, DecodeError, Encodable, Reader};
pub use hash::{sha256, sha256d, Hash256};
pub use script::Script;
pub use transaction::{
    data_output, output_size, outputs_hash, standard_output_size, CtOutput, DataOutput,
    MutableTransaction, OutPoint, Output, OutputKind, RingCtOutput, StandardOutput, Transaction,
    TxIn, TxType, ANON_MARKER, CURRENT_VERSION, MAX_BIP125_RBF_SEQUENCE, SEQUENCE_FINAL,
    SEQUENCE_LOCKTIME_DISABLE_FLAG, WITNESS_SCALE_FACTOR,
};
