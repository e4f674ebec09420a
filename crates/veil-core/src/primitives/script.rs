//! Locking and unlocking scripts
//!
//! Only the handful of templates the wallet creates or recognises are modelled here.
//! Script execution belongs to the validation engine.

use super::encode::{write_var_bytes, Encodable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Script opcodes used by the wallet.
pub mod opcodes {
    /// Push empty vector / zero
    pub const OP_0: u8 = 0x00;
    /// Next byte is a push length
    pub const OP_PUSHDATA1: u8 = 0x4c;
    /// Next two bytes are a push length
    pub const OP_PUSHDATA2: u8 = 0x4d;
    /// Next four bytes are a push length
    pub const OP_PUSHDATA4: u8 = 0x4e;
    /// Push the number 1; OP_2..OP_16 follow
    pub const OP_1: u8 = 0x51;
    /// Marks an output provably unspendable
    pub const OP_RETURN: u8 = 0x6a;
    /// Signature check
    pub const OP_CHECKSIG: u8 = 0xac;
    /// Zerocoin mint output
    pub const OP_ZEROCOINMINT: u8 = 0xc1;
    /// Zerocoin spend input
    pub const OP_ZEROCOINSPEND: u8 = 0xc2;
}

use opcodes::*;

/// Length of a compressed secp256k1 public key.
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// A serialized script.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Script(#[serde(with = "hex_bytes")] Vec<u8>);

impl Script {
    /// Empty script.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty script.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a single opcode.
    pub fn push_opcode(&mut self, op: u8) -> &mut Self {
        self.0.push(op);
        self
    }

    /// Append a minimal data push.
    pub fn push_slice(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len < OP_PUSHDATA1 as usize {
            self.0.push(len as u8);
        } else if len <= 0xff {
            self.0.push(OP_PUSHDATA1);
            self.0.push(len as u8);
        } else if len <= 0xffff {
            self.0.push(OP_PUSHDATA2);
            self.0.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.0.push(OP_PUSHDATA4);
            self.0.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.0.extend_from_slice(data);
        self
    }

    /// Append a small non-negative number as a script number.
    pub fn push_int(&mut self, n: u64) -> &mut Self {
        match n {
            0 => {
                self.0.push(OP_0);
            }
            1..=16 => {
                self.0.push(OP_1 + (n as u8) - 1);
            }
            _ => {
                let mut bytes = Vec::new();
                let mut v = n;
                while v > 0 {
                    bytes.push((v & 0xff) as u8);
                    v >>= 8;
                }
                if bytes.last().map_or(false, |b| b & 0x80 != 0) {
                    bytes.push(0);
                }
                self.push_slice(&bytes);
            }
        }
        self
    }

    /// `<pubkey> OP_CHECKSIG`
    pub fn pay_to_pubkey(pubkey: &[u8; COMPRESSED_PUBKEY_LEN]) -> Self {
        let mut s = Self::new();
        s.push_slice(pubkey).push_opcode(OP_CHECKSIG);
        s
    }

    /// `OP_ZEROCOINMINT <len> <pubcoin>`
    pub fn zerocoin_mint(pubcoin: &[u8]) -> Self {
        let mut s = Self::new();
        s.push_opcode(OP_ZEROCOINMINT)
            .push_int(pubcoin.len() as u64)
            .push_slice(pubcoin);
        s
    }

    /// `OP_ZEROCOINSPEND <len>` followed by the raw serialized coin spend.
    pub fn zerocoin_spend(proof: &[u8]) -> Self {
        let mut s = Self::new();
        s.push_opcode(OP_ZEROCOINSPEND).push_int(proof.len() as u64);
        s.0.extend_from_slice(proof);
        s
    }

    /// `OP_RETURN <data>`
    pub fn null_data(data: &[u8]) -> Self {
        let mut s = Self::new();
        s.push_opcode(OP_RETURN).push_slice(data);
        s
    }

    /// Public key of a pay-to-pubkey script.
    pub fn pay_to_pubkey_key(&self) -> Option<[u8; COMPRESSED_PUBKEY_LEN]> {
        let b = &self.0;
        if b.len() == COMPRESSED_PUBKEY_LEN + 2
            && b[0] as usize == COMPRESSED_PUBKEY_LEN
            && b[COMPRESSED_PUBKEY_LEN + 1] == OP_CHECKSIG
        {
            let mut key = [0u8; COMPRESSED_PUBKEY_LEN];
            key.copy_from_slice(&b[1..=COMPRESSED_PUBKEY_LEN]);
            Some(key)
        } else {
            None
        }
    }

    /// True for zerocoin mint outputs.
    pub fn is_zerocoin_mint(&self) -> bool {
        self.0.first() == Some(&OP_ZEROCOINMINT)
    }

    /// True for zerocoin spend inputs.
    pub fn is_zerocoin_spend(&self) -> bool {
        self.0.first() == Some(&OP_ZEROCOINSPEND)
    }

    /// True when the output can never be spent.
    pub fn is_unspendable(&self) -> bool {
        self.0.first() == Some(&OP_RETURN)
    }

    /// Public coin value carried by a mint script.
    pub fn zerocoin_mint_pubcoin(&self) -> Option<Vec<u8>> {
        if !self.is_zerocoin_mint() {
            return None;
        }
        let mut ops = Instructions::new(&self.0[1..]);
        let _len = ops.next()?;
        ops.next()
    }

    /// Serialized coin spend carried by a spend script.
    pub fn zerocoin_spend_payload(&self) -> Option<&[u8]> {
        if !self.is_zerocoin_spend() {
            return None;
        }
        let mut ops = Instructions::new(&self.0[1..]);
        let _len = ops.next()?;
        Some(&self.0[1 + ops.pos..])
    }
}

impl Encodable for Script {
    fn encode(&self, out: &mut Vec<u8>) {
        write_var_bytes(out, &self.0);
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", hex::encode(&self.0))
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Iterates over pushed data, yielding the payload of each push opcode.
struct Instructions<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Instructions<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }
}

impl Iterator for Instructions<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let op = *self.take(1)?.first()?;
        let len = match op {
            OP_0 => return Some(Vec::new()),
            1..=0x4b => op as usize,
            OP_PUSHDATA1 => self.take(1)?[0] as usize,
            OP_PUSHDATA2 => {
                let b = self.take(2)?;
                u16::from_le_bytes([b[0], b[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let b = self.take(4)?;
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
            }
            n if (OP_1..OP_1 + 16).contains(&n) => return Some(vec![n - OP_1 + 1]),
            _ => return None,
        };
        self.take(len).map(<[u8]>::to_vec)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pay_to_pubkey_roundtrip() {
        let mut key = [2u8; 33];
        key[1] = 7;
        let script = Script::pay_to_pubkey(&key);
        assert_eq!(script.len(), 35);
        assert_eq!(script.pay_to_pubkey_key(), Some(key));
    }

    #[test]
    fn test_zerocoin_mint_script() {
        let pubcoin = vec![9u8; 32];
        let script = Script::zerocoin_mint(&pubcoin);
        assert!(script.is_zerocoin_mint());
        assert_eq!(script.zerocoin_mint_pubcoin(), Some(pubcoin));
        assert!(script.pay_to_pubkey_key().is_none());
    }

    #[test]
    fn test_zerocoin_spend_payload() {
        let proof = vec![0x55u8; 300];
        let script = Script::zerocoin_spend(&proof);
        assert!(script.is_zerocoin_spend());
        assert_eq!(script.zerocoin_spend_payload(), Some(proof.as_slice()));
    }

    #[test]
    fn test_push_int_sign_padding() {
        let mut s = Script::new();
        s.push_int(0x80);
        assert_eq!(s.as_bytes(), &[0x02, 0x80, 0x00]);

        let mut small = Script::new();
        small.push_int(5);
        assert_eq!(small.as_bytes(), &[OP_1 + 4]);
    }

    #[test]
    fn test_null_data_unspendable() {
        assert!(Script::null_data(b"vote").is_unspendable());
    }
}
