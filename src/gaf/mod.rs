//! GAF sprite container decoder
//!
//! A GAF file holds named sequences of bitmap frames used for unit build
//! pictures, explosions, map features and interface graphics. Frames are
//! decoded into raw palette indices or packed 16-bit pixels; turning those
//! into colors is left to [`crate::palette`].

mod frame;
pub mod rle;

pub use frame::{
    decode_frame, overlay, FrameEncoding, FrameHeader, GafFrame, PixelFormat, FRAME_HEADER_SIZE,
};

use crate::vfs::FileRead;
use crate::{c_string_field, ByteReader, ForgeError, Result};
use log::{debug, trace};
use std::collections::HashMap;

/// Version tag of standard GAF files
pub const GAF_VERSION_STANDARD: u32 = 0x0001_0100;

/// Size of the fixed part of a sequence entry, including its name
const ENTRY_HEADER_SIZE: usize = 8 + ENTRY_NAME_SIZE;
const ENTRY_NAME_SIZE: usize = 32;

/// Reference from a sequence to one of its frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    /// Offset of the frame header
    pub frame_offset: u32,
    /// Unidentified field
    pub unknown: u32,
}

/// A named sequence of frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GafItem {
    /// Sequence name
    pub name: String,
    /// Frames in display order
    pub frames: Vec<FrameEntry>,
}

/// The sequences stored in a GAF file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GafListing {
    /// Sequences in file order
    pub items: Vec<GafItem>,
}

impl GafListing {
    /// Read the sequence table of a GAF file
    pub fn load<R: FileRead + ?Sized>(handle: &mut R) -> Result<Self> {
        handle.seek_to(0);
        let header = handle.read_data_verifying(12)?;
        let mut fields = ByteReader::new(&header);
        let version = fields.u32()?;
        let entry_count = fields.u32()? as usize;
        let _unknown = fields.u32()?;

        if version != GAF_VERSION_STANDARD {
            return Err(ForgeError::BadGafVersion(version));
        }

        let entry_offsets = handle.read_u32_array(entry_count)?;
        let mut items = Vec::with_capacity(entry_offsets.len());
        for offset in entry_offsets {
            handle.seek_to(offset as usize);
            let entry = handle.read_data_verifying(ENTRY_HEADER_SIZE)?;
            let mut fields = ByteReader::new(&entry);
            let frame_count = fields.u16()? as usize;
            let _unknown1 = fields.u16()?;
            let _unknown2 = fields.u32()?;
            let name = c_string_field(fields.take(ENTRY_NAME_SIZE)?);

            let raw = handle.read_u32_array(frame_count * 2)?;
            let frames = raw
                .chunks_exact(2)
                .map(|pair| FrameEntry {
                    frame_offset: pair[0],
                    unknown: pair[1],
                })
                .collect();

            trace!("Sequence {} with {} frames", name, frame_count);
            items.push(GafItem { name, frames });
        }

        debug!("Loaded {} sequences from {}", items.len(), handle.file_name());
        Ok(Self { items })
    }

    /// Find a sequence by name, ignoring ASCII case
    pub fn item(&self, name: &str) -> Option<&GafItem> {
        self.items
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }
}

impl GafItem {
    /// Decode the frame at `index`
    pub fn extract_frame<R: FileRead + ?Sized>(&self, index: usize, handle: &mut R) -> Result<GafFrame> {
        let entry = self.frames.get(index).ok_or_else(|| {
            ForgeError::InvalidData(format!(
                "frame {} out of range for {} ({} frames)",
                index,
                self.name,
                self.frames.len()
            ))
        })?;
        decode_frame(handle, entry.frame_offset)
    }

    /// Decode every frame, decoding frames that share data only once
    pub fn extract_frames<R: FileRead + ?Sized>(&self, handle: &mut R) -> Result<Vec<GafFrame>> {
        let mut cache: HashMap<u32, GafFrame> = HashMap::new();
        let mut frames = Vec::with_capacity(self.frames.len());

        for entry in &self.frames {
            let header = FrameHeader::read_at(handle, entry.frame_offset)?;
            let frame = match cache.get(&header.data_offset) {
                Some(cached) => cached.clone(),
                None => {
                    let decoded = decode_frame(handle, entry.frame_offset)?;
                    cache.insert(header.data_offset, decoded.clone());
                    decoded
                }
            };
            frames.push(frame);
        }

        Ok(frames)
    }
}

/// Decode frame `index` of `item`
pub fn extract_frame<R: FileRead + ?Sized>(
    item: &GafItem,
    index: usize,
    handle: &mut R,
) -> Result<GafFrame> {
    item.extract_frame(index, handle)
}

/// Decode every frame of `item`
pub fn extract_frames<R: FileRead + ?Sized>(item: &GafItem, handle: &mut R) -> Result<Vec<GafFrame>> {
    item.extract_frames(handle)
}
