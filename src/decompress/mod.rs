//! Chunk decompression for HPI archives
//!
//! Archive file data is stored in chunks that are either raw, compressed with
//! a proprietary LZ77 variant, or compressed with zlib. Chunks belonging to
//! first generation archives may additionally be obfuscated with a simple
//! position-keyed cipher (see [`cipher`]).

pub mod cipher;
mod lz77;
mod zlib;

pub use lz77::decompress_lz77;
pub use zlib::decompress_zlib;

use crate::{ForgeError, Result};

/// Size of the LZ77 sliding window (4096 bytes)
pub const LZ77_WINDOW_SIZE: usize = 0x1000;

/// Mask applied to window positions
pub const LZ77_WINDOW_MASK: usize = 0xFFF;

/// Compression kind stored in chunk headers and Gen1 file entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// Stored without compression
    None = 0,
    /// Proprietary LZ77 variant
    Lz77 = 1,
    /// Standard zlib stream
    Zlib = 2,
}

impl CompressionKind {
    /// Create a CompressionKind from a raw value
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionKind::None),
            1 => Ok(CompressionKind::Lz77),
            2 => Ok(CompressionKind::Zlib),
            _ => Err(ForgeError::BadCompressionKind(value)),
        }
    }
}

/// Decompress a single chunk payload
///
/// # Arguments
/// * `data` - The (already decrypted) payload
/// * `compressed_size` - Number of meaningful bytes in `data`
/// * `decompressed_size` - Declared size of the plaintext
/// * `kind` - Compression applied to the payload
pub fn decompress(
    data: &[u8],
    compressed_size: usize,
    decompressed_size: usize,
    kind: CompressionKind,
) -> Result<Vec<u8>> {
    let input = data
        .get(..compressed_size.min(data.len()))
        .ok_or(ForgeError::UnexpectedEof)?;

    match kind {
        CompressionKind::None => data
            .get(..decompressed_size)
            .map(|plain| plain.to_vec())
            .ok_or(ForgeError::UnexpectedEof),
        CompressionKind::Lz77 => decompress_lz77(input, decompressed_size),
        CompressionKind::Zlib => decompress_zlib(input, decompressed_size),
    }
}
