#![forbid(unsafe_code)]

use std::io;

use thiserror::Error;

/// Fatal ways a gzip stream can fail to decode. The formats are bit-exact,
/// so none of these are retryable: the stream is corrupt, truncated, or uses
/// a feature this decoder does not support.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not a gzip stream: expected magic bytes 1f 8b, found {id1:02x} {id2:02x}")]
    InvalidMagic { id1: u8, id2: u8 },

    #[error("unsupported compression method {found} (only 8 = deflate is valid)")]
    UnsupportedMethod { found: u8 },

    #[error("stream ended while more bits were required")]
    TruncatedStream,

    #[error("unsupported block type {found} (only dynamic Huffman blocks are supported)")]
    UnsupportedBlockType { found: u8 },

    #[error("malformed code table: {0}")]
    MalformedCodeTable(&'static str),

    #[error("back-reference distance {distance} exceeds the {produced} bytes produced so far")]
    InvalidDistance { distance: usize, produced: usize },
}

impl DecodeError {
    /// Folds an unexpected EOF into the truncation error. Any other I/O
    /// failure passes through untouched.
    pub(crate) fn from_io(err: io::Error) -> anyhow::Error {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::TruncatedStream.into()
        } else {
            err.into()
        }
    }
}
