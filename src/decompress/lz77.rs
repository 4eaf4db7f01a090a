//! Proprietary LZ77 decoder
//!
//! The stream interleaves control bytes with tokens. Each control bit, read
//! least significant first, selects a literal byte (0) or a 16-bit
//! window reference (1). A reference packs a 12-bit window position and a
//! 4-bit length; position zero terminates the stream.

use super::{LZ77_WINDOW_MASK, LZ77_WINDOW_SIZE};
use crate::{ForgeError, Result};

/// Decompress an LZ77 chunk payload
///
/// Decoding stops at the end-of-stream token. Running out of input before
/// that token is [`ForgeError::UnexpectedEof`]; producing more bytes than
/// `decompressed_size` is a [`ForgeError::DecompressionError`].
pub fn decompress_lz77(input: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
    // A two-byte reference expands to at most 17 bytes
    let mut output = Vec::with_capacity(decompressed_size.min(input.len().saturating_mul(9)));
    let mut window = [0u8; LZ77_WINDOW_SIZE];

    let byte_at = |pos: usize| input.get(pos).copied().ok_or(ForgeError::UnexpectedEof);

    // Window write position, control mask, control byte
    let mut work1 = 1usize;
    let mut work2 = 1u32;
    let mut work3 = byte_at(0)? as u32;
    let mut inptr = 1usize;

    loop {
        if work2 & work3 == 0 {
            let literal = byte_at(inptr)?;
            inptr += 1;
            push_checked(&mut output, literal, decompressed_size)?;
            window[work1] = literal;
            work1 = (work1 + 1) & LZ77_WINDOW_MASK;
        } else {
            let token = u16::from_le_bytes([byte_at(inptr)?, byte_at(inptr + 1)?]);
            inptr += 2;

            let mut dptr = (token >> 4) as usize;
            if dptr == 0 {
                break;
            }

            let count = (token & 0x0F) as usize + 2;
            for _ in 0..count {
                let byte = window[dptr];
                push_checked(&mut output, byte, decompressed_size)?;
                window[work1] = byte;
                dptr = (dptr + 1) & LZ77_WINDOW_MASK;
                work1 = (work1 + 1) & LZ77_WINDOW_MASK;
            }
        }

        work2 <<= 1;
        if work2 & 0x100 != 0 {
            work2 = 1;
            work3 = byte_at(inptr)? as u32;
            inptr += 1;
        }
    }

    Ok(output)
}

#[inline]
fn push_checked(output: &mut Vec<u8>, byte: u8, limit: usize) -> Result<()> {
    if output.len() >= limit {
        return Err(ForgeError::DecompressionError(format!(
            "LZ77 output exceeds declared size of {limit} bytes"
        )));
    }
    output.push(byte);
    Ok(())
}
