//! First generation archive layout
//!
//! Everything after the 20-byte header is obfuscated with the archive cipher.
//! The directory is a single blob whose internal references are absolute
//! file offsets; it is read and deciphered once and then walked in memory.

use super::{
    chunk, eof_on_short, read_at, ArchiveDirectory, ArchiveFile, ArchiveItem, GEN1_CHUNK_SIZE,
    MAX_DIRECTORY_DEPTH,
};
use crate::decompress::{cipher, CompressionKind};
use crate::{c_string_at, ByteReader, ForgeError, Result};
use log::trace;
use std::fs::File;
use std::io::Read;

const ENTRY_FLAG_DIRECTORY: u8 = 1 << 0;

/// Extended header following the common archive header
#[derive(Debug, Clone, Copy)]
pub(super) struct ExtHeader {
    pub directory_size: u32,
    pub header_key: u32,
    pub directory_offset: u32,
}

impl ExtHeader {
    pub fn read(file: &File) -> Result<Self> {
        let mut raw = [0u8; 12];
        let mut reader = file;
        reader.read_exact(&mut raw).map_err(eof_on_short)?;

        let mut fields = ByteReader::new(&raw);
        Ok(Self {
            directory_size: fields.u32()?,
            header_key: fields.u32()?,
            directory_offset: fields.u32()?,
        })
    }

    fn key(&self) -> u32 {
        cipher::archive_key(self.header_key)
    }
}

/// Read `len` bytes at `offset` and remove the archive cipher
fn read_deciphered(file: &File, offset: u32, len: usize, key: u32) -> Result<Vec<u8>> {
    let mut data = read_at(file, offset as u64, len)?;
    cipher::decrypt_at(&mut data, offset, key);
    Ok(data)
}

/// The deciphered directory blob, addressed by absolute file offsets
struct DirectoryBlob {
    data: Vec<u8>,
    base: u32,
}

impl DirectoryBlob {
    fn reader(&self, offset: u32) -> Result<ByteReader<'_>> {
        let relative = offset.checked_sub(self.base).ok_or_else(|| {
            ForgeError::InvalidData(format!(
                "directory reference {:#x} precedes directory start {:#x}",
                offset, self.base
            ))
        })?;
        ByteReader::at(&self.data, relative as usize)
    }

    fn name(&self, offset: u32) -> Result<String> {
        let relative = offset.checked_sub(self.base).ok_or(ForgeError::UnexpectedEof)?;
        c_string_at(&self.data, relative as usize)
    }

    fn load_items(&self, offset: u32, depth: usize) -> Result<Vec<ArchiveItem>> {
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(ForgeError::InvalidData(format!(
                "directory nesting exceeds {MAX_DIRECTORY_DEPTH} levels at {offset:#x}"
            )));
        }

        let mut header = self.reader(offset)?;
        let entry_count = header.u32()? as usize;
        let entry_array = header.u32()?;

        let mut entries = self.reader(entry_array)?;
        // Each entry is 9 bytes; reject counts the blob cannot hold before allocating
        if entry_count > entries.remaining() / 9 {
            return Err(ForgeError::UnexpectedEof);
        }

        let mut items = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let name_offset = entries.u32()?;
            let data_offset = entries.u32()?;
            let flags = entries.u8()?;
            let name = self.name(name_offset)?;

            if flags & ENTRY_FLAG_DIRECTORY != 0 {
                trace!("Directory {} at {:#x}", name, data_offset);
                let children = self.load_items(data_offset, depth + 1)?;
                items.push(ArchiveItem::Directory(ArchiveDirectory {
                    name,
                    items: children,
                }));
            } else {
                let mut record = self.reader(data_offset)?;
                let offset = record.u32()?;
                let size = record.u32()?;
                let compression =
                    CompressionKind::from_u8(record.u8()?).unwrap_or(CompressionKind::None);

                items.push(ArchiveItem::File(ArchiveFile {
                    name,
                    size: size as usize,
                    offset: offset as u64,
                    compression,
                    compressed_size: 0,
                }));
            }
        }

        Ok(items)
    }
}

pub(super) fn load_root(file: &File, header: &ExtHeader) -> Result<ArchiveDirectory> {
    let blob = DirectoryBlob {
        data: read_deciphered(
            file,
            header.directory_offset,
            header.directory_size as usize,
            header.key(),
        )?,
        base: header.directory_offset,
    };

    Ok(ArchiveDirectory {
        name: String::new(),
        items: blob.load_items(header.directory_offset, 0)?,
    })
}

pub(super) fn extract(file: &File, header: &ExtHeader, info: &ArchiveFile) -> Result<Vec<u8>> {
    let key = header.key();
    let offset = u32::try_from(info.offset)
        .map_err(|_| ForgeError::InvalidData(format!("file offset {:#x} out of range", info.offset)))?;

    if info.compression == CompressionKind::None {
        return read_deciphered(file, offset, info.size, key);
    }

    let chunk_count = info.size.div_ceil(GEN1_CHUNK_SIZE);
    let table = read_deciphered(file, offset, chunk_count * 4, key)?;
    let chunk_sizes = ByteReader::new(&table).u32_array(chunk_count)?;

    let mut data = Vec::with_capacity(info.size);
    let mut chunk_offset = offset.wrapping_add(table.len() as u32);
    for chunk_size in chunk_sizes {
        let raw = read_deciphered(file, chunk_offset, chunk_size as usize, key)?;
        data.extend_from_slice(&chunk::decode_chunk(&raw)?);
        chunk_offset = chunk_offset.wrapping_add(chunk_size);
    }

    Ok(data)
}
