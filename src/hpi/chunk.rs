//! SQSH chunk decoding

use crate::decompress::{cipher, decompress, CompressionKind};
use crate::{ByteReader, ForgeError, Result};
use log::warn;

/// Chunk marker, "SQSH" in little-endian order
pub const CHUNK_MARKER: u32 = 0x4853_5153;

/// Size of the packed chunk header
pub const CHUNK_HEADER_SIZE: usize = 19;

/// Packed header preceding every compressed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Format revision byte, unused
    pub unknown: u8,
    /// Compression of the payload
    pub compression: CompressionKind,
    /// Payload carries the chunk cipher
    pub encrypted: bool,
    /// Stored payload size
    pub compressed_size: u32,
    /// Size after decompression
    pub decompressed_size: u32,
    /// Byte sum of the stored payload
    pub checksum: u32,
}

impl ChunkHeader {
    /// Parse a chunk header from the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let marker = reader.u32()?;
        if marker != CHUNK_MARKER {
            return Err(ForgeError::BadChunkMarker(marker));
        }

        let unknown = reader.u8()?;
        let compression = CompressionKind::from_u8(reader.u8()?)?;
        let encrypted = reader.u8()? != 0;

        Ok(Self {
            unknown,
            compression,
            encrypted,
            compressed_size: reader.u32()?,
            decompressed_size: reader.u32()?,
            checksum: reader.u32()?,
        })
    }
}

/// True if `data` starts with the chunk marker
pub fn is_chunk(data: &[u8]) -> bool {
    ByteReader::new(data).u32().is_ok_and(|m| m == CHUNK_MARKER)
}

/// Decode a complete SQSH chunk into its plaintext
pub fn decode_chunk(data: &[u8]) -> Result<Vec<u8>> {
    let header = ChunkHeader::parse(data)?;
    let body = &data[CHUNK_HEADER_SIZE..];
    let decompressed_size = header.decompressed_size as usize;

    if !header.encrypted && header.compression == CompressionKind::None {
        return body
            .get(..decompressed_size)
            .map(|plain| plain.to_vec())
            .ok_or(ForgeError::UnexpectedEof);
    }

    let compressed_size = header.compressed_size as usize;
    let stored = body
        .get(..compressed_size)
        .ok_or(ForgeError::UnexpectedEof)?;

    let sum = stored
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(b as u32));
    if sum != header.checksum {
        warn!(
            "Chunk checksum mismatch (stored {:#010x}, computed {:#010x})",
            header.checksum, sum
        );
    }

    let mut payload = stored.to_vec();
    if header.encrypted {
        cipher::decrypt_chunk(&mut payload);
    }

    decompress(
        &payload,
        compressed_size,
        decompressed_size,
        header.compression,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Wrap a payload in a chunk header, optionally applying the chunk cipher
    pub(crate) fn make_chunk(
        payload: &[u8],
        kind: CompressionKind,
        encrypted: bool,
        decompressed_size: usize,
    ) -> Vec<u8> {
        let mut stored = payload.to_vec();
        if encrypted {
            cipher::encrypt_chunk(&mut stored);
        }
        let checksum = stored.iter().fold(0u32, |a, &b| a.wrapping_add(b as u32));

        let mut chunk = Vec::new();
        chunk.extend_from_slice(&CHUNK_MARKER.to_le_bytes());
        chunk.push(2);
        chunk.push(kind as u8);
        chunk.push(encrypted as u8);
        chunk.extend_from_slice(&(stored.len() as u32).to_le_bytes());
        chunk.extend_from_slice(&(decompressed_size as u32).to_le_bytes());
        chunk.extend_from_slice(&checksum.to_le_bytes());
        chunk.extend_from_slice(&stored);
        chunk
    }

    #[test]
    fn test_header_layout() {
        let chunk = make_chunk(b"abc", CompressionKind::None, false, 3);
        assert_eq!(chunk.len(), CHUNK_HEADER_SIZE + 3);
        assert_eq!(&chunk[..4], b"SQSH");

        let header = ChunkHeader::parse(&chunk).unwrap();
        assert_eq!(header.compression, CompressionKind::None);
        assert!(!header.encrypted);
        assert_eq!(header.decompressed_size, 3);
        assert_eq!(header.checksum, 97 + 98 + 99);
    }

    #[test]
    fn test_stored_chunk() {
        let chunk = make_chunk(b"hello_world!", CompressionKind::None, false, 12);
        assert!(is_chunk(&chunk));
        assert_eq!(decode_chunk(&chunk).unwrap(), b"hello_world!");
    }

    #[test]
    fn test_encrypted_lz77_chunk() {
        let lz = [0x18, b'A', b'B', b'C', 0x14, 0x00, 0x00, 0x00];
        let chunk = make_chunk(&lz, CompressionKind::Lz77, true, 9);
        assert_eq!(decode_chunk(&chunk).unwrap(), b"ABCABCABC");
    }

    #[test]
    fn test_encrypted_stored_chunk() {
        let chunk = make_chunk(b"plain text", CompressionKind::None, true, 10);
        assert_eq!(decode_chunk(&chunk).unwrap(), b"plain text");
    }

    #[test]
    fn test_bad_marker_and_kind() {
        let mut chunk = make_chunk(b"x", CompressionKind::None, false, 1);
        chunk[5] = 7;
        assert!(matches!(
            decode_chunk(&chunk),
            Err(ForgeError::BadCompressionKind(7))
        ));

        chunk[0] = b'Z';
        assert!(!is_chunk(&chunk));
        assert!(matches!(
            decode_chunk(&chunk),
            Err(ForgeError::BadChunkMarker(_))
        ));
    }

    #[test]
    fn test_checksum_mismatch_is_not_fatal() {
        let mut chunk = make_chunk(b"data", CompressionKind::None, true, 4);
        chunk[15] ^= 0xFF;
        assert_eq!(decode_chunk(&chunk).unwrap(), b"data");
    }

    #[test]
    fn test_truncated_chunk() {
        let chunk = make_chunk(b"hello_world!", CompressionKind::None, false, 12);
        assert!(matches!(
            decode_chunk(&chunk[..CHUNK_HEADER_SIZE + 4]),
            Err(ForgeError::UnexpectedEof)
        ));
        assert!(matches!(
            decode_chunk(&chunk[..10]),
            Err(ForgeError::UnexpectedEof)
        ));
    }
}
