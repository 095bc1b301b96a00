//! Little-endian binary encoding primitives used by the bytecode container.
//!
//! # Binary Format
//!
//! - Integers: little-endian, fixed-width
//! - Byte strings: `u8` length prefix followed by the bytes
//! - Arrays `[u8; N]`: bytes written as-is, no prefix

use thiserror::Error;

/// Sink for writing encoded bytes.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Counter for computing encoded size without allocating memory.
#[derive(Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

/// Types with a fixed binary representation.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes to a new buffer with exact capacity.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur while reading encoded input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before the expected data was read.
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof { needed: usize, available: usize },
    /// Data does not represent a valid value for the target type.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Types that can be read back from their binary representation.
pub trait Decode: Sized {
    /// Reads a value, advancing `input` past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof {
            needed: n,
            available: input.len(),
        });
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let [b] = <[u8; 1]>::decode(input)?;
        Ok(b)
    }
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    let bytes = <[u8; std::mem::size_of::<$t>()]>::decode(input)?;
                    Ok(<$t>::from_le_bytes(bytes))
                }
            }
        )*
    };
}

impl_int!(u16, i16, u32, i32);

impl<const N: usize> Encode for [u8; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_bytes(input, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

/// Short byte string with a one-byte length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortBytes(pub Vec<u8>);

impl Encode for ShortBytes {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        // Callers guarantee the length fits; see `bytecode::encode`.
        (self.0.len().min(u8::MAX as usize) as u8).encode(out);
        out.write(&self.0[..self.0.len().min(u8::MAX as usize)]);
    }
}

impl Decode for ShortBytes {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = u8::decode(input)? as usize;
        Ok(ShortBytes(read_bytes(input, len)?.to_vec()))
    }
}
