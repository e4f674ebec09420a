//! Consensus encoding helpers
//!
//! Little-endian integers, compact-size prefixes, and a bounds-checked reader.

/// Largest element count accepted when decoding a vector.
pub const MAX_VECTOR_SIZE: u64 = 0x0200_0000;

/// Decoding failures. Every variant rejects the whole transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Input ended before the structure was complete
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes requested
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Compact size was not minimally encoded
    #[error("non-canonical compact size")]
    NonCanonicalCompactSize,

    /// Declared vector length exceeds the sanity bound
    #[error("vector too large: {0}")]
    OversizedVector(u64),

    /// Output discriminant outside STANDARD..DATA
    #[error("unknown output type: {0}")]
    UnknownOutputType(u8),

    /// Transaction class byte outside STANDARD..COINSTAKE
    #[error("unknown transaction type: {0}")]
    UnknownTxType(u8),

    /// Bytes left over after a complete transaction
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    /// Varint overflowed 64 bits
    #[error("varint overflow")]
    VarIntOverflow,
}

/// Types with a consensus byte encoding.
pub trait Encodable {
    /// Append the encoding to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Encoded length in bytes.
    fn encoded_len(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }
}

/// Types that can be read back from their consensus encoding.
pub trait Decodable: Sized {
    /// Read one value from the reader.
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError>;
}

/// Append a compact-size integer.
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

/// Length of the compact-size encoding of `n`.
pub fn compact_size_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Append a length-prefixed byte string.
pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Append a stack of byte strings (witness or script data).
pub fn write_stack(out: &mut Vec<u8>, stack: &[Vec<u8>]) {
    write_compact_size(out, stack.len() as u64);
    for item in stack {
        write_var_bytes(out, item);
    }
}

/// Append a 7-bit little-endian varint, as used in data outputs.
pub fn write_varint(out: &mut Vec<u8>, mut n: u64) {
    let mut b = (n & 0x7f) as u8;
    loop {
        n >>= 7;
        if n == 0 {
            break;
        }
        out.push(b | 0x80);
        b = (n & 0x7f) as u8;
    }
    out.push(b);
}

/// Bounds-checked cursor over a byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Consume `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consume a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian i64.
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a canonical compact-size integer.
    pub fn read_compact_size(&mut self) -> Result<u64, DecodeError> {
        let first = self.read_u8()?;
        let n = match first {
            0xfd => {
                let n = self.read_u16()? as u64;
                if n < 0xfd {
                    return Err(DecodeError::NonCanonicalCompactSize);
                }
                n
            }
            0xfe => {
                let n = self.read_u32()? as u64;
                if n <= 0xffff {
                    return Err(DecodeError::NonCanonicalCompactSize);
                }
                n
            }
            0xff => {
                let n = self.read_u64()?;
                if n <= 0xffff_ffff {
                    return Err(DecodeError::NonCanonicalCompactSize);
                }
                n
            }
            n => n as u64,
        };
        Ok(n)
    }

    /// Read a compact-size element count, bounded by [`MAX_VECTOR_SIZE`].
    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        let n = self.read_compact_size()?;
        if n > MAX_VECTOR_SIZE {
            return Err(DecodeError::OversizedVector(n));
        }
        Ok(n as usize)
    }

    /// Read a length-prefixed byte string.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_len()?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Read a stack of byte strings.
    pub fn read_stack(&mut self) -> Result<Vec<Vec<u8>>, DecodeError> {
        let count = self.read_len()?;
        let mut stack = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            stack.push(self.read_var_bytes()?);
        }
        Ok(stack)
    }

    /// Read a 7-bit little-endian varint.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut n = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.read_u8()?;
            if shift >= 64 {
                return Err(DecodeError::VarIntOverflow);
            }
            n |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(n);
            }
            shift += 7;
        }
    }

    /// Fail unless every byte was consumed.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}
