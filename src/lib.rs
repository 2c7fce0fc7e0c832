#![forbid(unsafe_code)]

//! A decoder for gzip streams whose deflate bodies use dynamic Huffman
//! blocks exclusively. Stored and fixed-Huffman blocks are rejected.

use std::io::{BufRead, Seek, Write};

use anyhow::{Context, Result};
use log::debug;

use crate::bit_reader::BitReader;
use crate::deflate::DeflateReader;
use crate::tracking_writer::TrackingWriter;

pub mod bit_reader;
pub mod deflate;
pub mod error;
pub mod gzip;
pub mod huffman_coding;
pub mod tracking_writer;

pub use crate::error::DecodeError;
pub use crate::gzip::{Header, HeaderFlags};

////////////////////////////////////////////////////////////////////////////////

/// What a successful decode produced, beyond the bytes themselves.
#[derive(Debug)]
pub struct Summary {
    pub header: Header,
    /// Original size as declared by the trailer, modulo 2^32.
    pub original_size: u32,
    /// Bytes actually written to the output.
    pub output_size: usize,
    pub block_count: usize,
}

/// Decompresses a single-member stream from `input` into `output`.
///
/// On failure the output may already hold a prefix of the decoded data;
/// only a returned `Summary` marks it trustworthy.
pub fn decompress<R: BufRead + Seek, W: Write>(mut input: R, output: W) -> Result<Summary> {
    let original_size =
        gzip::read_original_size(&mut input).context("reading the original size field")?;
    debug!("trailer declares {} bytes of original data", original_size);

    let header = gzip::read_header(&mut input).context("reading the member header")?;
    if let Some(name) = &header.name {
        debug!("member carries the original file name {:?}", name);
    }

    let mut writer = TrackingWriter::new(output);
    let mut deflate_reader = DeflateReader::new(BitReader::new(input));
    let mut block_count = 0;
    while let Some(block) = deflate_reader.next_block(&mut writer) {
        block_count += 1;
        block.with_context(|| format!("decoding block {}", block_count))?;
    }
    writer.flush().context("flushing decoded data")?;
    debug!(
        "decoded {} block(s) into {} bytes",
        block_count,
        writer.byte_count()
    );

    Ok(Summary {
        header,
        original_size,
        output_size: writer.byte_count(),
        block_count,
    })
}
