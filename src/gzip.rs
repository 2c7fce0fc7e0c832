#![forbid(unsafe_code)]

use std::io::{BufRead, Read, Seek, SeekFrom};

use anyhow::{ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::DecodeError;

////////////////////////////////////////////////////////////////////////////////

const ID1: u8 = 0x1f;
const ID2: u8 = 0x8b;

const CM_DEFLATE: u8 = 8;

const FTEXT_OFFSET: u8 = 0;
const FHCRC_OFFSET: u8 = 1;
const FEXTRA_OFFSET: u8 = 2;
const FNAME_OFFSET: u8 = 3;
const FCOMMENT_OFFSET: u8 = 4;

////////////////////////////////////////////////////////////////////////////////

/// Metadata parsed from the fixed 10-byte header and its optional fields.
#[derive(Debug)]
pub struct Header {
    pub flags: HeaderFlags,
    pub modification_time: u32,
    pub extra_flags: u8,
    pub os: u8,
    pub name: Option<String>,
    pub comment: Option<String>,
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    fn bit(&self, n: u8) -> bool {
        (self.0 >> n) & 1 != 0
    }

    pub fn is_text(&self) -> bool {
        self.bit(FTEXT_OFFSET)
    }

    pub fn has_header_crc(&self) -> bool {
        self.bit(FHCRC_OFFSET)
    }

    pub fn has_extra(&self) -> bool {
        self.bit(FEXTRA_OFFSET)
    }

    pub fn has_name(&self) -> bool {
        self.bit(FNAME_OFFSET)
    }

    pub fn has_comment(&self) -> bool {
        self.bit(FCOMMENT_OFFSET)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Parses the member header, leaving the input positioned on the first byte
/// of the deflate body.
pub fn read_header<T: BufRead>(input: &mut T) -> Result<Header> {
    let id1 = input.read_u8().map_err(DecodeError::from_io)?;
    let id2 = input.read_u8().map_err(DecodeError::from_io)?;
    ensure!(id1 == ID1 && id2 == ID2, DecodeError::InvalidMagic { id1, id2 });

    let method = input.read_u8().map_err(DecodeError::from_io)?;
    ensure!(
        method == CM_DEFLATE,
        DecodeError::UnsupportedMethod { found: method }
    );

    let flags = HeaderFlags(input.read_u8().map_err(DecodeError::from_io)?);
    let modification_time = input
        .read_u32::<LittleEndian>()
        .map_err(DecodeError::from_io)?;
    let extra_flags = input.read_u8().map_err(DecodeError::from_io)?;
    let os = input.read_u8().map_err(DecodeError::from_io)?;

    if flags.has_extra() {
        // Only the length matters here, the payload itself is skipped.
        let xlen = input.read_u16::<LittleEndian>().map_err(DecodeError::from_io)?;
        let mut extra = vec![0; xlen as usize];
        input.read_exact(&mut extra).map_err(DecodeError::from_io)?;
    }

    let name = if flags.has_name() {
        Some(read_zero_terminated(input)?)
    } else {
        None
    };

    let comment = if flags.has_comment() {
        Some(read_zero_terminated(input)?)
    } else {
        None
    };

    if flags.has_header_crc() {
        // Two CRC16 bytes, skipped without validation.
        input.read_u16::<LittleEndian>().map_err(DecodeError::from_io)?;
    }

    Ok(Header {
        flags,
        modification_time,
        extra_flags,
        os,
        name,
        comment,
    })
}

fn read_zero_terminated<T: BufRead>(input: &mut T) -> Result<String> {
    let mut bytes: Vec<u8> = Vec::new();
    let mut byte;
    while {
        byte = input.read_u8().map_err(DecodeError::from_io)?;
        byte != 0
    } {
        bytes.push(byte)
    }
    Ok(String::from_utf8(bytes)?)
}

/// Reads the original-size field from the last four bytes of the stream,
/// then restores the read position. The value is informational only and is
/// truncated modulo 2^32 by the format itself.
pub fn read_original_size<T: Read + Seek>(input: &mut T) -> Result<u32> {
    let position = input.stream_position()?;
    input.seek(SeekFrom::End(-4))?;
    let size = input
        .read_u32::<LittleEndian>()
        .map_err(DecodeError::from_io)?;
    input.seek(SeekFrom::Start(position))?;
    Ok(size)
}

////////////////////////////////////////////////////////////////////////////////
