// SPDX-License-Identifier: Apache-2.0

//! Streaming UTF-8 to line decoder.
//!
//! The decoder is a pure step function over an input window. Each call
//! consumes bytes until it either terminates a line or runs out of complete
//! sequences, and reports exactly how many bytes were consumed so the caller
//! can keep a byte-exact resume offset.
//!
//! Line terminators are `\n`, `\r` and `\r\n`. A `\r` terminates the line
//! immediately and leaves `skip_lf` set, so a `\n` that arrives first in the
//! next window is swallowed as part of the same terminator.

use std::fmt;
use std::ops::RangeInclusive;

/// Cross-call decoder state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderState {
    /// The last byte consumed was a bare `\r`
    pub skip_lf: bool,
}

impl DecoderState {
    /// Reconstruct the state at an offset from the byte that precedes it.
    pub fn after_byte(prev: u8) -> Self {
        Self {
            skip_lf: prev == b'\r',
        }
    }
}

/// Why a step returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A terminator was consumed and the line buffer holds one complete line.
    Line,
    /// The window ran out before a terminator. Any unconsumed bytes are the
    /// leading part of a multi-byte sequence and must be offered again with
    /// more input behind them.
    Underflow,
}

/// Result of one decoder step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub outcome: Outcome,
    /// Raw input bytes consumed by this step
    pub consumed: usize,
    pub state: DecoderState,
}

/// A malformed or unmappable byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    /// Offset of the first byte of the sequence within the input window
    pub offset: usize,
    /// Length of the malformed sequence
    pub len: usize,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed UTF-8 sequence of {} byte(s) at offset {}",
            self.len, self.offset
        )
    }
}

impl std::error::Error for DecodeError {}

/// Decode from `input` into `line` until a line terminator or the end of the
/// window. Terminators are never written to `line`.
pub fn decode_step(
    state: DecoderState,
    input: &[u8],
    line: &mut String,
) -> Result<Step, DecodeError> {
    let mut skip_lf = state.skip_lf;
    let mut pos = 0;

    while pos < input.len() {
        let b1 = input[pos];

        if skip_lf {
            skip_lf = false;
            if b1 == b'\n' {
                pos += 1;
                continue;
            }
        }

        if b1 < 0x80 {
            pos += 1;
            match b1 {
                b'\n' => return Ok(Step::line(pos, false)),
                b'\r' => return Ok(Step::line(pos, true)),
                _ => line.push(char::from(b1)),
            }
            continue;
        }

        let width = sequence_width(b1).ok_or(DecodeError {
            offset: pos,
            len: 1,
        })?;
        let available = &input[pos..];

        if available.len() < width {
            // Reject early if the partial sequence can never become valid
            check_trailing(available).map_err(|len| DecodeError { offset: pos, len })?;
            return Ok(Step {
                outcome: Outcome::Underflow,
                consumed: pos,
                state: DecoderState { skip_lf },
            });
        }

        let ch = decode_sequence(&available[..width])
            .map_err(|len| DecodeError { offset: pos, len })?;
        line.push(ch);
        pos += width;
    }

    Ok(Step {
        outcome: Outcome::Underflow,
        consumed: pos,
        state: DecoderState { skip_lf },
    })
}

impl Step {
    fn line(consumed: usize, skip_lf: bool) -> Self {
        Self {
            outcome: Outcome::Line,
            consumed,
            state: DecoderState { skip_lf },
        }
    }
}

/// Number of bytes in the sequence introduced by `b1`. Continuation bytes,
/// overlong two-byte leads (C0, C1) and leads beyond U+10FFFF, including the
/// legacy five and six byte forms, have no valid width.
fn sequence_width(b1: u8) -> Option<usize> {
    match b1 {
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// Valid range of the byte following a lead. The narrowed ranges exclude
/// overlong forms (E0, F0), UTF-16 surrogates (ED) and code points above
/// U+10FFFF (F4).
fn second_byte_range(b1: u8) -> RangeInclusive<u8> {
    match b1 {
        0xE0 => 0xA0..=0xBF,
        0xED => 0x80..=0x9F,
        0xF0 => 0x90..=0xBF,
        0xF4 => 0x80..=0x8F,
        _ => 0x80..=0xBF,
    }
}

fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Check the bytes after the lead. On failure returns the length of the
/// malformed prefix, i.e. the number of bytes before the offending one.
fn check_trailing(seq: &[u8]) -> Result<(), usize> {
    for (i, &b) in seq.iter().enumerate().skip(1) {
        let valid = if i == 1 {
            second_byte_range(seq[0]).contains(&b)
        } else {
            is_continuation(b)
        };
        if !valid {
            return Err(i);
        }
    }
    Ok(())
}

fn decode_sequence(seq: &[u8]) -> Result<char, usize> {
    check_trailing(seq)?;

    let cont = |b: u8| u32::from(b & 0x3F);
    let cp = match seq.len() {
        2 => (u32::from(seq[0] & 0x1F) << 6) | cont(seq[1]),
        3 => (u32::from(seq[0] & 0x0F) << 12) | (cont(seq[1]) << 6) | cont(seq[2]),
        _ => {
            (u32::from(seq[0] & 0x07) << 18)
                | (cont(seq[1]) << 12)
                | (cont(seq[2]) << 6)
                | cont(seq[3])
        }
    };

    char::from_u32(cp).ok_or(seq.len())
}
