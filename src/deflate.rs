#![forbid(unsafe_code)]

use std::convert::TryFrom;
use std::io::{BufRead, Write};

use anyhow::{bail, ensure, Result};
use byteorder::WriteBytesExt;

use crate::bit_reader::BitReader;
use crate::error::DecodeError;
use crate::huffman_coding::{decode_litlen_distance_trees, LitLenToken};
use crate::tracking_writer::TrackingWriter;

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct BlockHeader {
    pub is_final: bool,
    pub block_type: BlockType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Stored = 0,
    FixedHuffman = 1,
    DynamicHuffman = 2,
    Reserved = 3,
}

impl TryFrom<u16> for BlockType {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            0 => BlockType::Stored,
            1 => BlockType::FixedHuffman,
            2 => BlockType::DynamicHuffman,
            3 => BlockType::Reserved,
            _ => bail!("invalid block type {}", value),
        })
    }
}

/// Reads the three-bit header that starts every block.
pub fn read_block_header<T: BufRead>(bit_reader: &mut BitReader<T>) -> Result<BlockHeader> {
    let is_final = bit_reader.read_bits(1)?.bits() == 1;
    let block_type = BlockType::try_from(bit_reader.read_bits(2)?.bits())?;
    Ok(BlockHeader {
        is_final,
        block_type,
    })
}

////////////////////////////////////////////////////////////////////////////////

/// Decodes a deflate body block by block. Only dynamic Huffman blocks are
/// supported; anything else fails after its header has been consumed.
pub struct DeflateReader<T> {
    bit_reader: BitReader<T>,
    finished: bool,
}

impl<T: BufRead> DeflateReader<T> {
    pub fn new(bit_reader: BitReader<T>) -> Self {
        Self {
            bit_reader,
            finished: false,
        }
    }

    /// Decodes the next block into `writer`, or `None` once the final block
    /// has been seen.
    pub fn next_block<W: Write>(&mut self, writer: &mut TrackingWriter<W>) -> Option<Result<()>> {
        if self.finished {
            None
        } else {
            Some(self.read_block(writer))
        }
    }

    fn read_block<W: Write>(&mut self, writer: &mut TrackingWriter<W>) -> Result<()> {
        let header = read_block_header(&mut self.bit_reader)?;
        self.finished = header.is_final;
        ensure!(
            header.block_type == BlockType::DynamicHuffman,
            DecodeError::UnsupportedBlockType {
                found: header.block_type as u8,
            }
        );

        let (litlen_coding, distance_coding) = decode_litlen_distance_trees(&mut self.bit_reader)?;
        loop {
            match litlen_coding.read_symbol(&mut self.bit_reader)? {
                LitLenToken::EndOfBlock => break,
                LitLenToken::Literal(byte) => {
                    writer.write_u8(byte)?;
                }
                LitLenToken::Length { base, extra_bits } => {
                    let length = base + self.bit_reader.read_bits(extra_bits)?.bits();
                    let token = distance_coding.read_symbol(&mut self.bit_reader)?;
                    let distance = token.base + self.bit_reader.read_bits(token.extra_bits)?.bits();
                    writer.write_previous(distance as usize, length as usize)?;
                }
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_header_bits() -> Result<()> {
        // final flag first, then the type with its low bit first
        let mut reader = BitReader::new(&[0b101u8][..]);
        let header = read_block_header(&mut reader)?;
        assert!(header.is_final);
        assert_eq!(header.block_type, BlockType::DynamicHuffman);

        let mut reader = BitReader::new(&[0b010u8][..]);
        let header = read_block_header(&mut reader)?;
        assert!(!header.is_final);
        assert_eq!(header.block_type, BlockType::FixedHuffman);
        Ok(())
    }

    #[test]
    fn non_dynamic_blocks_are_rejected() {
        for (byte, wire_type) in [(0b001u8, 0u8), (0b011, 1), (0b111, 3)] {
            let mut writer = TrackingWriter::new(Vec::new());
            let data = [byte];
            let mut reader = DeflateReader::new(BitReader::new(&data[..]));
            let err = reader.next_block(&mut writer).unwrap().unwrap_err();
            match err.downcast_ref::<DecodeError>() {
                Some(DecodeError::UnsupportedBlockType { found }) => assert_eq!(*found, wire_type),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn no_blocks_after_final() {
        let mut writer = TrackingWriter::new(Vec::new());
        let mut reader = DeflateReader::new(BitReader::new(&[0b001u8][..]));
        // the final-block flag was consumed before the type was rejected
        assert!(reader.next_block(&mut writer).unwrap().is_err());
        assert!(reader.next_block(&mut writer).is_none());
    }
}
