//! Common types and constants shared by every asset reader
//!
//! This module defines the crate-wide error type, the fixed-point scale
//! constants used by the model and script formats, and a small bounds-checked
//! little-endian reader used to walk the packed binary structures.

use thiserror::Error;

/// Error type for asset loading operations
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Archive does not start with the `HAPI` marker
    #[error("Bad archive marker: {0:#010X}")]
    BadMarker(u32),

    /// Archive version is not one of the supported generations
    #[error("Unsupported archive version: {0:#010X}")]
    UnsupportedVersion(u32),

    /// Compressed chunk does not start with the `SQSH` marker
    #[error("Bad chunk marker: {0:#010X}")]
    BadChunkMarker(u32),

    /// Chunk or file entry declares an unknown compression kind
    #[error("Bad compression kind: {0}")]
    BadCompressionKind(u8),

    /// Unexpected end of input
    #[error("Unexpected end of input")]
    UnexpectedEof,

    /// Invalid data format or corruption
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Decompression error
    #[error("Decompression error: {0}")]
    DecompressionError(String),

    /// Path does not resolve to any node in the filesystem
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path resolves to a directory where a file was expected
    #[error("Path is not a file: {0}")]
    PathIsNotFile(String),

    /// Sprite container carries an unknown version tag
    #[error("Bad GAF version: {0:#010X}")]
    BadGafVersion(u32),

    /// Sprite frame declares an unknown pixel encoding
    #[error("Unknown frame encoding: {0}")]
    UnknownFrameEncoding(u8),

    /// PCX image does not start with the expected manufacturer byte
    #[error("Bad PCX identifier: {0:#04X}")]
    BadPcxIdentifier(u8),

    /// PCX image declares an empty or inverted window
    #[error("Bad image size: {width}x{height}")]
    BadImageSize {
        /// Declared width
        width: i32,
        /// Declared height
        height: i32,
    },

    /// PCX image has no trailing VGA palette
    #[error("PCX image has no palette")]
    NoPcxPalette,

    /// Map terrain file carries an unknown version tag
    #[error("Unsupported TNT version: {0:#010X}")]
    UnsupportedTntVersion(u32),

    /// Script references a piece the model does not have
    #[error("Unknown piece: {0}")]
    UnknownPiece(String),

    /// Required metadata property is missing
    #[error("Missing property: {0}")]
    MissingProperty(String),

    /// Metadata object was not found in the document
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for asset loading operations
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Fixed-point scale of model coordinates and linear script values
pub const LINEAR_CONSTANT: f64 = 163840.0 / 2.5;

/// Units per degree of angular script values (65536 per full turn)
pub const ANGULAR_CONSTANT: f64 = 182.0;

/// A three component vector in model space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    /// X component
    pub x: f64,
    /// Y component (up)
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Vector3 {
    /// The zero vector
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a vector from its components
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Convert raw fixed-point model coordinates, swapping Y and Z
    pub fn from_fixed(x: i32, y: i32, z: i32) -> Self {
        Self {
            x: x as f64 / LINEAR_CONSTANT,
            y: z as f64 / LINEAR_CONSTANT,
            z: y as f64 / LINEAR_CONSTANT,
        }
    }
}

/// Width and height of an image in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size2 {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
}

impl Size2 {
    /// Create a size
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// An integer position, used for image anchor points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point2 {
    /// Horizontal coordinate
    pub x: i32,
    /// Vertical coordinate
    pub y: i32,
}

impl Point2 {
    /// Create a point
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Bounds-checked little-endian reader over a byte slice
///
/// Every packed on-disk structure in this crate is decoded through this
/// type; reads past the end fail with [`ForgeError::UnexpectedEof`] instead
/// of panicking.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        if offset > data.len() {
            return Err(ForgeError::UnexpectedEof);
        }
        Ok(Self { data, pos: offset })
    }

    /// Current position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take the next `len` bytes
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ForgeError::UnexpectedEof)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Skip `len` bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Read a single byte
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u16
    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian i16
    pub fn i16(&mut self) -> Result<i16> {
        Ok(self.u16()? as i16)
    }

    /// Read a little-endian u32
    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian i32
    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    /// Read `count` little-endian u32 values
    pub fn u32_array(&mut self, count: usize) -> Result<Vec<u32>> {
        let bytes = self.take(count.checked_mul(4).ok_or(ForgeError::UnexpectedEof)?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

/// Read a NUL-terminated string starting at `offset`
///
/// A missing terminator reads to the end of `data`. Bytes are interpreted
/// one-to-one as Latin-1 characters since the formats predate UTF-8.
pub fn c_string_at(data: &[u8], offset: usize) -> Result<String> {
    let tail = data.get(offset..).ok_or(ForgeError::UnexpectedEof)?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(latin1(&tail[..end]))
}

/// Decode a fixed-size, NUL-padded name field
pub fn c_string_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    latin1(&field[..end])
}

pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_reader_little_endian() {
        let data = [0x48, 0x41, 0x50, 0x49, 0xFE, 0xFF, 0x01];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.u32().unwrap(), 0x49504148);
        assert_eq!(reader.i16().unwrap(), -2);
        assert_eq!(reader.remaining(), 1);
        assert!(matches!(reader.u16(), Err(ForgeError::UnexpectedEof)));
        // A failed read does not consume anything
        assert_eq!(reader.u8().unwrap(), 1);
    }

    #[test]
    fn test_byte_reader_at_bounds() {
        let data = [0u8; 4];
        assert!(ByteReader::at(&data, 4).is_ok());
        assert!(ByteReader::at(&data, 5).is_err());
        let mut reader = ByteReader::at(&data, 2).unwrap();
        assert!(reader.u32_array(1).is_err());
        assert_eq!(reader.u16().unwrap(), 0);
    }

    #[test]
    fn test_c_strings() {
        let data = b"armcom\0corcom";
        assert_eq!(c_string_at(data, 0).unwrap(), "armcom");
        assert_eq!(c_string_at(data, 7).unwrap(), "corcom");
        assert!(c_string_at(data, 20).is_err());

        let mut field = [0u8; 32];
        field[..5].copy_from_slice(b"FLASH");
        assert_eq!(c_string_field(&field), "FLASH");
    }

    #[test]
    fn test_fixed_point_vector() {
        let v = Vector3::from_fixed(65536, 131072, -65536);
        assert_eq!(v, Vector3::new(1.0, -1.0, 2.0));
        assert_eq!(LINEAR_CONSTANT, 65536.0);
    }
}
