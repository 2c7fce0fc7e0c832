#![forbid(unsafe_code)]

use std::io::BufRead;

use anyhow::Result;
use byteorder::ReadBytesExt;

use crate::error::DecodeError;

const MAX_BITS: u8 = 16;

////////////////////////////////////////////////////////////////////////////////

/// Up to 16 bits in the order they came off the stream. Huffman codes arrive
/// most significant bit first, so `concat` appends new bits on the low side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitSequence {
    bits: u16,
    len: u8,
}

impl BitSequence {
    pub fn new(bits: u16, len: u8) -> Self {
        assert!(len <= MAX_BITS, "a bit sequence holds at most 16 bits");
        Self {
            bits: bits & mask_u16(len),
            len,
        }
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn concat(self, tail: Self) -> Self {
        let len = self.len + tail.len;
        assert!(len <= MAX_BITS, "concatenation exceeds 16 bits");
        let bits = (u32::from(self.bits) << tail.len) | u32::from(tail.bits);
        Self {
            bits: bits as u16,
            len,
        }
    }
}

fn mask_u16(len: u8) -> u16 {
    match len {
        0 => 0,
        16 => u16::MAX,
        _ => (1 << len) - 1,
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Pulls bits out of a byte stream, least significant bit of each byte first.
pub struct BitReader<T> {
    stream: T,
    buffer: u32,
    avail: u8,
}

impl<T: BufRead> BitReader<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            buffer: 0,
            avail: 0,
        }
    }

    /// Consumes the next `len` bits of the stream.
    pub fn read_bits(&mut self, len: u8) -> Result<BitSequence> {
        let seq = self.peek_bits(len)?;
        self.buffer >>= len;
        self.avail -= len;
        Ok(seq)
    }

    /// Extracts the next `len` bits without consuming anything.
    pub fn peek_bits(&mut self, len: u8) -> Result<BitSequence> {
        assert!(len <= MAX_BITS, "at most 16 bits can be read at once");
        while self.avail < len {
            let byte = self.stream.read_u8().map_err(DecodeError::from_io)?;
            self.buffer |= u32::from(byte) << self.avail;
            self.avail += 8;
        }
        let bits = (self.buffer & u32::from(mask_u16(len))) as u16;
        Ok(BitSequence::new(bits, len))
    }

    /// Returns the underlying stream, dropping any buffered bits.
    pub fn into_inner(self) -> T {
        self.stream
    }
}

////////////////////////////////////////////////////////////////////////////////
