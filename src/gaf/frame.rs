//! Frame headers, pixel formats and sub-frame composition

use super::rle;
use crate::vfs::FileRead;
use crate::{ByteReader, ForgeError, Point2, Result, Size2};

/// Size of a packed frame header
pub const FRAME_HEADER_SIZE: usize = 24;

/// Sub-frames nested deeper than this are rejected
const MAX_SUBFRAME_DEPTH: usize = 8;

/// Encoding tag of frame pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    /// Raw palette indices
    Uncompressed = 0,
    /// Run length encoded palette indices
    RunLength = 1,
    /// Raw 16-bit pixels, 4 bits per channel
    Packed4444 = 4,
    /// Raw 16-bit pixels, 1 bit alpha and 5 bits per color
    Packed1555 = 5,
}

impl FrameEncoding {
    /// Map a raw encoding tag
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FrameEncoding::Uncompressed),
            1 => Ok(FrameEncoding::RunLength),
            4 => Ok(FrameEncoding::Packed4444),
            5 => Ok(FrameEncoding::Packed1555),
            _ => Err(ForgeError::UnknownFrameEncoding(value)),
        }
    }

    /// Pixel format the encoding decodes to
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            FrameEncoding::Uncompressed | FrameEncoding::RunLength => PixelFormat::Paletted,
            FrameEncoding::Packed4444 => PixelFormat::Packed4444,
            FrameEncoding::Packed1555 => PixelFormat::Packed1555,
        }
    }
}

/// Layout of decoded frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One palette index per pixel
    Paletted,
    /// Little-endian u16 per pixel, ARGB 4 bits each
    Packed4444,
    /// Little-endian u16 per pixel, 1 bit alpha and RGB 5 bits each
    Packed1555,
}

impl PixelFormat {
    /// Bytes occupied by one pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Paletted => 1,
            PixelFormat::Packed4444 | PixelFormat::Packed1555 => 2,
        }
    }
}

/// Packed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame width in pixels
    pub width: u16,
    /// Frame height in pixels
    pub height: u16,
    /// Horizontal anchor
    pub x_offset: i16,
    /// Vertical anchor
    pub y_offset: i16,
    /// Raw encoding tag
    pub encoding: u8,
    /// Number of sub-frames composing this frame
    pub sub_frame_count: u16,
    /// Offset of the pixel data, or of the sub-frame offset array
    pub data_offset: u32,
}

impl FrameHeader {
    /// Parse a frame header from its packed form
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let width = reader.u16()?;
        let height = reader.u16()?;
        let x_offset = reader.i16()?;
        let y_offset = reader.i16()?;
        let _unknown = reader.u8()?;
        let encoding = reader.u8()?;
        let sub_frame_count = reader.u16()?;
        let _unknown = reader.u32()?;
        let data_offset = reader.u32()?;

        Ok(Self {
            width,
            height,
            x_offset,
            y_offset,
            encoding,
            sub_frame_count,
            data_offset,
        })
    }

    /// Read a frame header located at `offset`
    pub fn read_at<R: FileRead + ?Sized>(handle: &mut R, offset: u32) -> Result<Self> {
        handle.seek_to(offset as usize);
        Self::parse(&handle.read_data_verifying(FRAME_HEADER_SIZE)?)
    }

    /// Frame dimensions
    pub fn size(&self) -> Size2 {
        Size2::new(self.width as usize, self.height as usize)
    }

    /// Frame anchor point
    pub fn offset(&self) -> Point2 {
        Point2::new(self.x_offset as i32, self.y_offset as i32)
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GafFrame {
    /// Pixel bytes, `size.area() * format.bytes_per_pixel()` long
    pub data: Vec<u8>,
    /// Frame dimensions
    pub size: Size2,
    /// Anchor point
    pub offset: Point2,
    /// Pixel layout of `data`
    pub format: PixelFormat,
}

/// Decode the frame whose header is at `header_offset`
pub fn decode_frame<R: FileRead + ?Sized>(handle: &mut R, header_offset: u32) -> Result<GafFrame> {
    decode_nested(handle, header_offset, 0)
}

fn decode_nested<R: FileRead + ?Sized>(
    handle: &mut R,
    header_offset: u32,
    depth: usize,
) -> Result<GafFrame> {
    if depth > MAX_SUBFRAME_DEPTH {
        return Err(ForgeError::InvalidData(format!(
            "sub-frames nested deeper than {MAX_SUBFRAME_DEPTH} at {header_offset:#x}"
        )));
    }

    let header = FrameHeader::read_at(handle, header_offset)?;
    let format = FrameEncoding::from_u8(header.encoding)?.pixel_format();

    if header.sub_frame_count == 0 {
        return Ok(GafFrame {
            data: decode_pixels(handle, &header)?,
            size: header.size(),
            offset: header.offset(),
            format,
        });
    }

    handle.seek_to(header.data_offset as usize);
    let sub_offsets = handle.read_u32_array(header.sub_frame_count as usize)?;

    let mut canvas = GafFrame {
        data: vec![0; header.size().area() * format.bytes_per_pixel()],
        size: header.size(),
        offset: header.offset(),
        format,
    };
    for sub_offset in sub_offsets {
        let sub = decode_nested(handle, sub_offset, depth + 1)?;
        overlay(&mut canvas, &sub)?;
    }
    Ok(canvas)
}

fn decode_pixels<R: FileRead + ?Sized>(handle: &mut R, header: &FrameHeader) -> Result<Vec<u8>> {
    let size = header.size();
    handle.seek_to(header.data_offset as usize);

    match FrameEncoding::from_u8(header.encoding)? {
        FrameEncoding::Uncompressed => handle.read_data_verifying(size.area()),
        FrameEncoding::RunLength => rle::decode_image(handle, size),
        FrameEncoding::Packed4444 | FrameEncoding::Packed1555 => {
            handle.read_data_verifying(size.area() * 2)
        }
    }
}

/// Draw `source` onto `dest`, aligning their anchor points
///
/// The source lands at `dest.offset - source.offset` and is clipped to the
/// destination. For paletted frames a zero source pixel is transparent;
/// packed pixels are copied unconditionally.
pub fn overlay(dest: &mut GafFrame, source: &GafFrame) -> Result<()> {
    if dest.format.bytes_per_pixel() != source.format.bytes_per_pixel() {
        return Err(ForgeError::InvalidData(format!(
            "cannot overlay {:?} sub-frame onto {:?} frame",
            source.format, dest.format
        )));
    }
    let bpp = dest.format.bytes_per_pixel();

    let origin_x = dest.offset.x as i64 - source.offset.x as i64;
    let origin_y = dest.offset.y as i64 - source.offset.y as i64;

    let x_start = origin_x.max(0);
    let y_start = origin_y.max(0);
    let x_end = (origin_x + source.size.width as i64).min(dest.size.width as i64);
    let y_end = (origin_y + source.size.height as i64).min(dest.size.height as i64);
    if x_start >= x_end || y_start >= y_end {
        return Ok(());
    }

    let span = (x_end - x_start) as usize;
    for y in y_start..y_end {
        let src_x = (x_start - origin_x) as usize;
        let src_y = (y - origin_y) as usize;
        let src_start = (src_y * source.size.width + src_x) * bpp;
        let dst_start = (y as usize * dest.size.width + x_start as usize) * bpp;

        let src = &source.data[src_start..src_start + span * bpp];
        let dst = &mut dest.data[dst_start..dst_start + span * bpp];
        if bpp == 1 {
            for (d, &s) in dst.iter_mut().zip(src) {
                if s != 0 {
                    *d = s;
                }
            }
        } else {
            dst.copy_from_slice(src);
        }
    }

    Ok(())
}
