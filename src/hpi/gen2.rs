//! Second generation archive layout

use super::{
    chunk, eof_on_short, read_at, ArchiveDirectory, ArchiveFile, ArchiveItem,
    MAX_DIRECTORY_DEPTH,
};
use crate::decompress::CompressionKind;
use crate::{c_string_at, ByteReader, ForgeError, Result};
use log::debug;
use std::fs::File;
use std::io::Read;

const DIRECTORY_RECORD_SIZE: u32 = 20;
const FILE_RECORD_SIZE: usize = 24;

/// Extended header following the common archive header
#[derive(Debug, Clone, Copy)]
pub(super) struct ExtHeader {
    pub directory_offset: u32,
    pub directory_size: u32,
    pub names_offset: u32,
    pub names_size: u32,
    pub data_offset: u32,
    pub verification_offset: u32,
}

impl ExtHeader {
    pub fn read(file: &File) -> Result<Self> {
        let mut raw = [0u8; 24];
        let mut reader = file;
        reader.read_exact(&mut raw).map_err(eof_on_short)?;

        let mut fields = ByteReader::new(&raw);
        Ok(Self {
            directory_offset: fields.u32()?,
            directory_size: fields.u32()?,
            names_offset: fields.u32()?,
            names_size: fields.u32()?,
            data_offset: fields.u32()?,
            verification_offset: fields.u32()?,
        })
    }
}

/// Read a table blob, unpacking it if it is stored as a chunk
fn read_table(file: &File, offset: u32, len: u32) -> Result<Vec<u8>> {
    let raw = read_at(file, offset as u64, len as usize)?;
    if chunk::is_chunk(&raw) {
        chunk::decode_chunk(&raw)
    } else {
        Ok(raw)
    }
}

struct Tables {
    directory: Vec<u8>,
    names: Vec<u8>,
}

impl Tables {
    fn load_items(&self, offset: u32, depth: usize) -> Result<Vec<ArchiveItem>> {
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(ForgeError::InvalidData(format!(
                "directory nesting exceeds {MAX_DIRECTORY_DEPTH} levels at {offset:#x}"
            )));
        }

        let mut record = ByteReader::at(&self.directory, offset as usize)?;
        let _name_offset = record.u32()?;
        let subdir_array = record.u32()?;
        let subdir_count = record.u32()?;
        let file_array = record.u32()? as usize;
        let file_count = record.u32()? as usize;

        let mut items = Vec::new();

        let mut sub_offset = subdir_array;
        for _ in 0..subdir_count {
            let name_offset = ByteReader::at(&self.directory, sub_offset as usize)?.u32()?;
            let name = c_string_at(&self.names, name_offset as usize)?;
            let children = self.load_items(sub_offset, depth + 1)?;
            items.push(ArchiveItem::Directory(ArchiveDirectory {
                name,
                items: children,
            }));
            sub_offset = sub_offset
                .checked_add(DIRECTORY_RECORD_SIZE)
                .ok_or(ForgeError::UnexpectedEof)?;
        }

        if file_count > 0 {
            let mut files = ByteReader::at(&self.directory, file_array)?;
            if file_count > files.remaining() / FILE_RECORD_SIZE {
                return Err(ForgeError::UnexpectedEof);
            }

            for _ in 0..file_count {
                let name_offset = files.u32()?;
                let data_offset = files.u32()?;
                let size = files.u32()?;
                let compressed_size = files.u32()?;
                let _date = files.u32()?;
                let _checksum = files.u32()?;

                items.push(ArchiveItem::File(ArchiveFile {
                    name: c_string_at(&self.names, name_offset as usize)?,
                    size: size as usize,
                    offset: data_offset as u64,
                    compression: if compressed_size == 0 {
                        CompressionKind::None
                    } else {
                        CompressionKind::Zlib
                    },
                    compressed_size: compressed_size as usize,
                }));
            }
        }

        Ok(items)
    }
}

pub(super) fn load_root(file: &File, header: &ExtHeader) -> Result<ArchiveDirectory> {
    debug!(
        "Directory table {} bytes at {:#x}, names {} bytes at {:#x}, data at {:#x}, verification at {:#x}",
        header.directory_size,
        header.directory_offset,
        header.names_size,
        header.names_offset,
        header.data_offset,
        header.verification_offset
    );

    let tables = Tables {
        directory: read_table(file, header.directory_offset, header.directory_size)?,
        names: read_table(file, header.names_offset, header.names_size)?,
    };

    Ok(ArchiveDirectory {
        name: String::new(),
        items: tables.load_items(0, 0)?,
    })
}

pub(super) fn extract(file: &File, info: &ArchiveFile) -> Result<Vec<u8>> {
    match info.compression {
        CompressionKind::None => read_at(file, info.offset, info.size),
        CompressionKind::Lz77 | CompressionKind::Zlib => {
            let raw = read_at(file, info.offset, info.compressed_size)?;
            chunk::decode_chunk(&raw)
        }
    }
}
