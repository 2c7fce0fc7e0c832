#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::convert::TryFrom;
use std::io::BufRead;
use std::iter::repeat;

use anyhow::{bail, ensure, Result};
use log::debug;

use crate::bit_reader::{BitReader, BitSequence};
use crate::error::DecodeError;

////////////////////////////////////////////////////////////////////////////////

/// Longest code length the format can transmit for any alphabet.
const MAX_CODE_LENGTH: u8 = 15;

/// Largest valid literal/length and distance alphabet sizes.
const MAX_LITLEN_CODES: usize = 286;
const MAX_DISTANCE_CODES: usize = 30;

/// Transmission order of the code-length alphabet's own code lengths.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Base values and extra-bit counts for length symbols 265..=284.
const LENGTH_BASES: [u16; 20] = [
    11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131, 163, 195, 227,
];
const LENGTH_EXTRA_BITS: [u8; 20] = [
    1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5,
];

/// Base values and extra-bit counts for distance symbols 4..=29.
const DISTANCE_BASES: [u16; 26] = [
    5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537, 2049, 3073,
    4097, 6145, 8193, 12289, 16385, 24577,
];
const DISTANCE_EXTRA_BITS: [u8; 26] = [
    1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13,
];

////////////////////////////////////////////////////////////////////////////////

/// A symbol of the code-length alphabet that transmits the two main tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeCodeToken {
    /// Symbols 0..=15: a code length used as is.
    Length(u8),
    /// Symbol 16: repeat the previous length 3 + <2 extra bits> times.
    CopyPrev,
    /// Symbols 17 and 18: a run of zero lengths.
    RepeatZero { base: u16, extra_bits: u8 },
}

impl TryFrom<u16> for TreeCodeToken {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            0..=15 => Self::Length(value as u8),
            16 => Self::CopyPrev,
            17 => Self::RepeatZero {
                base: 3,
                extra_bits: 3,
            },
            18 => Self::RepeatZero {
                base: 11,
                extra_bits: 7,
            },
            _ => bail!(DecodeError::MalformedCodeTable(
                "code length symbol out of range"
            )),
        })
    }
}

/// A symbol of the literal/length alphabet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LitLenToken {
    Literal(u8),
    EndOfBlock,
    Length { base: u16, extra_bits: u8 },
}

impl TryFrom<u16> for LitLenToken {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            0..=255 => Self::Literal(value as u8),
            256 => Self::EndOfBlock,
            257..=264 => Self::Length {
                base: value - 254,
                extra_bits: 0,
            },
            265..=284 => {
                let index = (value - 265) as usize;
                Self::Length {
                    base: LENGTH_BASES[index],
                    extra_bits: LENGTH_EXTRA_BITS[index],
                }
            }
            // The longest match the format can encode.
            285 => Self::Length {
                base: 258,
                extra_bits: 0,
            },
            _ => bail!(DecodeError::MalformedCodeTable(
                "literal/length symbol out of range"
            )),
        })
    }
}

/// A symbol of the distance alphabet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistanceToken {
    pub base: u16,
    pub extra_bits: u8,
}

impl TryFrom<u16> for DistanceToken {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            0..=3 => Self {
                base: value + 1,
                extra_bits: 0,
            },
            4..=29 => {
                let index = (value - 4) as usize;
                Self {
                    base: DISTANCE_BASES[index],
                    extra_bits: DISTANCE_EXTRA_BITS[index],
                }
            }
            _ => bail!(DecodeError::MalformedCodeTable(
                "distance symbol out of range"
            )),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

/// A canonical Huffman decoding table over some token alphabet `T`.
#[derive(Debug)]
pub struct HuffmanCoding<T> {
    map: HashMap<BitSequence, T>,
    max_len: u8,
}

impl<T> HuffmanCoding<T>
where
    T: Copy + TryFrom<u16, Error = anyhow::Error>,
{
    /// Assigns canonical codes to `code_lengths` (one entry per symbol, zero
    /// meaning the symbol is unused) and builds the decoding map. Unused
    /// code space is tolerated here and only reported when a decode walks
    /// into it.
    pub fn from_lengths(code_lengths: &[u8]) -> Result<Self> {
        let mut bl_count = [0u16; MAX_CODE_LENGTH as usize + 1];
        let mut max_len = 0;
        for &len in code_lengths {
            ensure!(
                len <= MAX_CODE_LENGTH,
                DecodeError::MalformedCodeTable("code length exceeds 15 bits")
            );
            bl_count[len as usize] += 1;
            max_len = max_len.max(len);
        }
        bl_count[0] = 0;

        // More codes of some length than that prefix space can hold means
        // no prefix-free assignment exists.
        let mut space = 1i32;
        for len in 1..=MAX_CODE_LENGTH as usize {
            space = (space << 1) - i32::from(bl_count[len]);
            ensure!(
                space >= 0,
                DecodeError::MalformedCodeTable("over-subscribed code lengths")
            );
        }

        let mut next_code = [0u16; MAX_CODE_LENGTH as usize + 1];
        let mut code = 0u16;
        for len in 1..=max_len as usize {
            code = (code + bl_count[len - 1]) << 1;
            next_code[len] = code;
        }

        let mut map = HashMap::new();
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let token = T::try_from(symbol as u16)?;
            map.insert(BitSequence::new(next_code[len as usize], len), token);
            next_code[len as usize] += 1;
        }

        Ok(Self { map, max_len })
    }

    /// Looks up one complete code.
    pub fn decode_symbol(&self, seq: BitSequence) -> Option<T> {
        self.map.get(&seq).copied()
    }

    /// Reads one symbol, pulling bits until the accumulated pattern matches
    /// an assigned code. Every call starts over from an empty pattern.
    pub fn read_symbol<U: BufRead>(&self, bit_reader: &mut BitReader<U>) -> Result<T> {
        let mut code = BitSequence::new(0, 0);
        while code.len() < self.max_len {
            code = code.concat(bit_reader.read_bits(1)?);
            if let Some(token) = self.map.get(&code) {
                return Ok(*token);
            }
        }
        bail!(DecodeError::MalformedCodeTable(
            "bit pattern matches no assigned code"
        ))
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Reads the code-length table of a dynamic block and decodes the two code
/// tables it transmits, literal/length first.
pub fn decode_litlen_distance_trees<T: BufRead>(
    bit_reader: &mut BitReader<T>,
) -> Result<(HuffmanCoding<LitLenToken>, HuffmanCoding<DistanceToken>)> {
    let litlen_count = bit_reader.read_bits(5)?.bits() as usize + 257;
    let distance_count = bit_reader.read_bits(5)?.bits() as usize + 1;
    let clen_count = bit_reader.read_bits(4)?.bits() as usize + 4;
    debug!(
        "dynamic block: {} literal/length codes, {} distance codes, {} code length codes",
        litlen_count, distance_count, clen_count
    );
    ensure!(
        litlen_count <= MAX_LITLEN_CODES,
        DecodeError::MalformedCodeTable("too many literal/length codes")
    );
    ensure!(
        distance_count <= MAX_DISTANCE_CODES,
        DecodeError::MalformedCodeTable("too many distance codes")
    );

    let mut clen_lengths = [0u8; 19];
    for &index in CODE_LENGTH_ORDER.iter().take(clen_count) {
        clen_lengths[index] = bit_reader.read_bits(3)?.bits() as u8;
    }
    let clen_coding = HuffmanCoding::<TreeCodeToken>::from_lengths(&clen_lengths)?;

    let litlen_lengths = read_code_lengths(bit_reader, &clen_coding, litlen_count)?;
    let distance_lengths = read_code_lengths(bit_reader, &clen_coding, distance_count)?;

    Ok((
        HuffmanCoding::from_lengths(&litlen_lengths)?,
        HuffmanCoding::from_lengths(&distance_lengths)?,
    ))
}

/// Decodes exactly `count` code lengths, expanding the three repeat symbols.
fn read_code_lengths<T: BufRead>(
    bit_reader: &mut BitReader<T>,
    clen_coding: &HuffmanCoding<TreeCodeToken>,
    count: usize,
) -> Result<Vec<u8>> {
    let mut lengths = Vec::with_capacity(count);
    while lengths.len() < count {
        match clen_coding.read_symbol(bit_reader)? {
            TreeCodeToken::Length(len) => lengths.push(len),
            TreeCodeToken::CopyPrev => {
                let prev = *lengths.last().ok_or(DecodeError::MalformedCodeTable(
                    "repeat with no previous length",
                ))?;
                let run = 3 + bit_reader.read_bits(2)?.bits() as usize;
                ensure!(
                    lengths.len() + run <= count,
                    DecodeError::MalformedCodeTable("length run overflows its alphabet")
                );
                lengths.extend(repeat(prev).take(run));
            }
            TreeCodeToken::RepeatZero { base, extra_bits } => {
                let run = base as usize + bit_reader.read_bits(extra_bits)?.bits() as usize;
                ensure!(
                    lengths.len() + run <= count,
                    DecodeError::MalformedCodeTable("length run overflows its alphabet")
                );
                lengths.extend(repeat(0).take(run));
            }
        }
    }
    Ok(lengths)
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    // Lengths (3, 3, 3, 3, 3, 2, 4, 4) yield the codes 010, 011, 100, 101,
    // 110, 00, 1110, 1111.
    #[test]
    fn canonical_assignment() -> Result<()> {
        let coding = HuffmanCoding::<LitLenToken>::from_lengths(&[3, 3, 3, 3, 3, 2, 4, 4])?;
        let expected = [
            (0b010, 3, 0u8),
            (0b011, 3, 1),
            (0b100, 3, 2),
            (0b101, 3, 3),
            (0b110, 3, 4),
            (0b00, 2, 5),
            (0b1110, 4, 6),
            (0b1111, 4, 7),
        ];
        for (bits, len, symbol) in expected {
            assert_eq!(
                coding.decode_symbol(BitSequence::new(bits, len)),
                Some(LitLenToken::Literal(symbol))
            );
        }
        assert_eq!(coding.decode_symbol(BitSequence::new(0b01, 2)), None);
        Ok(())
    }

    #[test]
    fn assignment_is_deterministic() -> Result<()> {
        let lengths = [3, 1, 3, 2];
        let first = HuffmanCoding::<LitLenToken>::from_lengths(&lengths)?;
        let second = HuffmanCoding::<LitLenToken>::from_lengths(&lengths)?;
        for bits in 0..=0b111u16 {
            for len in 1..=3 {
                let seq = BitSequence::new(bits, len);
                assert_eq!(first.decode_symbol(seq), second.decode_symbol(seq));
            }
        }
        Ok(())
    }

    #[test]
    fn assigned_codes_are_prefix_free() -> Result<()> {
        let coding = HuffmanCoding::<LitLenToken>::from_lengths(&[2, 0, 3, 3, 2, 4, 0, 4])?;
        let codes: Vec<BitSequence> = coding.map.keys().copied().collect();
        for a in &codes {
            for b in &codes {
                if a == b || a.len() == b.len() {
                    continue;
                }
                let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };
                let prefix = long.bits() >> (long.len() - short.len());
                assert!(
                    prefix != short.bits(),
                    "{:?} is a prefix of {:?}",
                    short,
                    long
                );
            }
        }
        Ok(())
    }

    #[test]
    fn oversubscribed_lengths_are_rejected() {
        let err = HuffmanCoding::<LitLenToken>::from_lengths(&[1, 1, 1]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::MalformedCodeTable(_))
        ));
    }

    #[test]
    fn unassigned_pattern_is_rejected() -> Result<()> {
        // A lone one-bit distance code: the pattern 1 is never assigned.
        let coding = HuffmanCoding::<DistanceToken>::from_lengths(&[1])?;
        let mut reader = BitReader::new(&[0xffu8][..]);
        let err = coding.read_symbol(&mut reader).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::MalformedCodeTable(_))
        ));
        Ok(())
    }

    #[test]
    fn empty_alphabet_builds_but_never_decodes() -> Result<()> {
        let coding = HuffmanCoding::<DistanceToken>::from_lengths(&[0])?;
        let mut reader = BitReader::new(&[0xffu8][..]);
        assert!(coding.read_symbol(&mut reader).is_err());
        Ok(())
    }

    /// Lengths 5, 16, 17 and 18 of the code-length alphabet share two-bit
    /// codes: 00, 01, 10, 11.
    fn repeat_test_coding() -> HuffmanCoding<TreeCodeToken> {
        let mut lengths = [0u8; 19];
        lengths[5] = 2;
        lengths[16] = 2;
        lengths[17] = 2;
        lengths[18] = 2;
        HuffmanCoding::from_lengths(&lengths).unwrap()
    }

    #[test]
    fn copy_prev_expands_the_previous_length() -> Result<()> {
        // symbol 5, then symbol 16 with extra bits 11: 3 + 3 more fives
        let coding = repeat_test_coding();
        let mut reader = BitReader::new(&[0b00111000u8][..]);
        let lengths = read_code_lengths(&mut reader, &coding, 7)?;
        assert_eq!(lengths, vec![5; 7]);
        Ok(())
    }

    #[test]
    fn copy_prev_after_a_zero_run_repeats_zero() -> Result<()> {
        // symbol 17 (three zeros), then symbol 16 with extra bits 10:
        // 3 + 2 copies of the zero just emitted
        let coding = repeat_test_coding();
        let mut reader = BitReader::new(&[0b01000001u8, 0x01][..]);
        let lengths = read_code_lengths(&mut reader, &coding, 8)?;
        assert_eq!(lengths, vec![0; 8]);
        Ok(())
    }

    #[test]
    fn short_zero_run() -> Result<()> {
        // symbol 17 with extra bits 111: 3 + 7 zeros
        let coding = repeat_test_coding();
        let mut reader = BitReader::new(&[0b00011101u8][..]);
        let lengths = read_code_lengths(&mut reader, &coding, 10)?;
        assert_eq!(lengths, vec![0; 10]);
        Ok(())
    }

    #[test]
    fn long_zero_run() -> Result<()> {
        // symbol 18 with all seven extra bits set: 11 + 127 zeros
        let coding = repeat_test_coding();
        let mut reader = BitReader::new(&[0xffu8, 0x01][..]);
        let lengths = read_code_lengths(&mut reader, &coding, 138)?;
        assert_eq!(lengths, vec![0; 138]);
        Ok(())
    }

    #[test]
    fn run_overflowing_the_alphabet_is_rejected() {
        // symbol 5, then six more fives against a three-symbol alphabet
        let coding = repeat_test_coding();
        let mut reader = BitReader::new(&[0b00111000u8][..]);
        let err = read_code_lengths(&mut reader, &coding, 3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::MalformedCodeTable(_))
        ));
    }

    #[test]
    fn leading_copy_prev_is_rejected() {
        let coding = repeat_test_coding();
        let mut reader = BitReader::new(&[0x02u8][..]);
        let err = read_code_lengths(&mut reader, &coding, 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::MalformedCodeTable(_))
        ));
    }

    #[test]
    fn litlen_token_boundaries() -> Result<()> {
        assert_eq!(LitLenToken::try_from(0)?, LitLenToken::Literal(0));
        assert_eq!(LitLenToken::try_from(255)?, LitLenToken::Literal(255));
        assert_eq!(LitLenToken::try_from(256)?, LitLenToken::EndOfBlock);
        assert_eq!(
            LitLenToken::try_from(257)?,
            LitLenToken::Length {
                base: 3,
                extra_bits: 0
            }
        );
        assert_eq!(
            LitLenToken::try_from(264)?,
            LitLenToken::Length {
                base: 10,
                extra_bits: 0
            }
        );
        assert_eq!(
            LitLenToken::try_from(265)?,
            LitLenToken::Length {
                base: 11,
                extra_bits: 1
            }
        );
        assert_eq!(
            LitLenToken::try_from(284)?,
            LitLenToken::Length {
                base: 227,
                extra_bits: 5
            }
        );
        assert_eq!(
            LitLenToken::try_from(285)?,
            LitLenToken::Length {
                base: 258,
                extra_bits: 0
            }
        );
        assert!(LitLenToken::try_from(286).is_err());
        Ok(())
    }

    #[test]
    fn distance_token_boundaries() -> Result<()> {
        assert_eq!(
            DistanceToken::try_from(0)?,
            DistanceToken {
                base: 1,
                extra_bits: 0
            }
        );
        assert_eq!(
            DistanceToken::try_from(3)?,
            DistanceToken {
                base: 4,
                extra_bits: 0
            }
        );
        assert_eq!(
            DistanceToken::try_from(4)?,
            DistanceToken {
                base: 5,
                extra_bits: 1
            }
        );
        assert_eq!(
            DistanceToken::try_from(29)?,
            DistanceToken {
                base: 24577,
                extra_bits: 13
            }
        );
        assert!(DistanceToken::try_from(30).is_err());
        Ok(())
    }
}
