//! PCX image reader
//!
//! Interface art and side palettes ship as 8-bit single-plane PCX files with
//! a trailing 256 color VGA palette. Only that flavour is supported.

use crate::palette::Palette;
use crate::{ByteReader, ForgeError, Result, Size2};

/// Size of the fixed PCX header
pub const PCX_HEADER_SIZE: usize = 128;

/// Manufacturer byte of every PCX file
pub const PCX_MANUFACTURER: u8 = 0x0A;

/// Marker byte preceding the trailing VGA palette
const PALETTE_MARKER: u8 = 0x0C;

/// Marker byte plus 256 RGB triples
const PALETTE_TRAILER_SIZE: usize = 1 + 256 * 3;

/// Fields of the PCX header used for decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcxHeader {
    /// Format revision
    pub version: u8,
    /// 1 when scan lines are run length encoded
    pub encoding: u8,
    /// Bits per pixel per plane
    pub bits_per_pixel: u8,
    /// Left edge of the image window
    pub x_min: u16,
    /// Top edge of the image window
    pub y_min: u16,
    /// Right edge of the image window, inclusive
    pub x_max: u16,
    /// Bottom edge of the image window, inclusive
    pub y_max: u16,
    /// Number of color planes
    pub planes: u8,
    /// Bytes per decoded scan line of one plane, including padding
    pub bytes_per_line: u16,
}

impl PcxHeader {
    /// Parse and validate the 128-byte header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let manufacturer = reader.u8()?;
        if manufacturer != PCX_MANUFACTURER {
            return Err(ForgeError::BadPcxIdentifier(manufacturer));
        }

        let version = reader.u8()?;
        let encoding = reader.u8()?;
        let bits_per_pixel = reader.u8()?;
        let x_min = reader.u16()?;
        let y_min = reader.u16()?;
        let x_max = reader.u16()?;
        let y_max = reader.u16()?;
        // Resolution and the 16 color EGA palette
        reader.skip(4 + 48)?;
        let _reserved = reader.u8()?;
        let planes = reader.u8()?;
        let bytes_per_line = reader.u16()?;
        reader.skip(PCX_HEADER_SIZE - reader.position())?;

        let header = Self {
            version,
            encoding,
            bits_per_pixel,
            x_min,
            y_min,
            x_max,
            y_max,
            planes,
            bytes_per_line,
        };
        header.size()?;
        Ok(header)
    }

    /// Image dimensions, from the inclusive window rectangle
    pub fn size(&self) -> Result<Size2> {
        let width = self.x_max as i32 - self.x_min as i32 + 1;
        let height = self.y_max as i32 - self.y_min as i32 + 1;
        if width <= 0 || height <= 0 {
            return Err(ForgeError::BadImageSize { width, height });
        }
        Ok(Size2::new(width as usize, height as usize))
    }
}

/// Decoded 8-bit PCX image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcx {
    /// Image dimensions
    pub size: Size2,
    /// Palette indices, row-major, `size.area()` long
    pub indices: Vec<u8>,
    /// Trailing VGA palette
    pub palette: Palette,
}

impl Pcx {
    /// Decode a complete PCX file
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let header = PcxHeader::parse(bytes)?;
        Ok(Self {
            size: header.size()?,
            indices: Self::decode_indices(bytes)?,
            palette: Self::extract_palette(bytes)?,
        })
    }

    /// Read the 256 color palette appended to the image
    pub fn extract_palette(bytes: &[u8]) -> Result<Palette> {
        PcxHeader::parse(bytes)?;
        if bytes.len() <= PALETTE_TRAILER_SIZE {
            return Err(ForgeError::NoPcxPalette);
        }
        let trailer = &bytes[bytes.len() - PALETTE_TRAILER_SIZE..];
        if trailer[0] != PALETTE_MARKER {
            return Err(ForgeError::NoPcxPalette);
        }
        Palette::from_rgb(&trailer[1..])
    }

    /// Decode the image into `width * height` palette indices
    ///
    /// Every scan line decodes to `bytes_per_line` bytes; padding beyond the
    /// image width is dropped.
    pub fn decode_indices(bytes: &[u8]) -> Result<Vec<u8>> {
        let header = PcxHeader::parse(bytes)?;
        let size = header.size()?;
        if header.bits_per_pixel != 8 || header.planes != 1 {
            return Err(ForgeError::InvalidData(format!(
                "unsupported PCX layout: {} bits per pixel, {} planes",
                header.bits_per_pixel, header.planes
            )));
        }

        let line_length = (header.bytes_per_line as usize).max(size.width);
        let mut stream = bytes.get(PCX_HEADER_SIZE..).unwrap_or_default().iter();
        let mut indices = Vec::with_capacity(size.area());
        let mut line = Vec::with_capacity(line_length);

        for _ in 0..size.height {
            line.clear();
            while line.len() < line_length {
                let byte = *stream.next().ok_or(ForgeError::UnexpectedEof)?;
                if header.encoding == 1 && byte & 0xC0 == 0xC0 {
                    let count = (byte & 0x3F) as usize;
                    let value = *stream.next().ok_or(ForgeError::UnexpectedEof)?;
                    // Runs may cross into padding but never past the line
                    let count = count.min(line_length - line.len());
                    line.resize(line.len() + count, value);
                } else {
                    line.push(byte);
                }
            }
            indices.extend_from_slice(&line[..size.width]);
        }

        Ok(indices)
    }
}
