//! Read handles over filesystem files
//!
//! A [`ReadHandle`] extracts its file from the archive on first access and
//! then serves reads from memory. Decoders are written against the
//! [`FileRead`] trait so they work equally on archive files and on plain
//! in-memory buffers ([`MemoryHandle`]).

use super::VfsFile;
use crate::{hpi, ForgeError, Result};
use log::warn;
use std::io::{self, Read, Seek, SeekFrom};

/// A positioned, seekable source of file bytes
pub trait FileRead {
    /// Read up to `len` bytes from the current offset and advance past them
    fn read_data(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Move the offset, clamped to the file size
    fn seek_to(&mut self, offset: usize);

    /// Name of the underlying file
    fn file_name(&self) -> &str;

    /// Size of the file in bytes
    fn size(&self) -> usize;

    /// Current read offset
    fn offset(&self) -> usize;

    /// Read exactly `len` bytes, failing with [`ForgeError::UnexpectedEof`]
    fn read_data_verifying(&mut self, len: usize) -> Result<Vec<u8>> {
        let data = self.read_data(len)?;
        if data.len() != len {
            warn!(
                "Expected to read {} bytes; got {} bytes [{}]",
                len,
                data.len(),
                self.file_name()
            );
            return Err(ForgeError::UnexpectedEof);
        }
        Ok(data)
    }

    /// Read everything from the current offset to the end of the file
    fn read_to_end_data(&mut self) -> Result<Vec<u8>> {
        let remaining = self.size().saturating_sub(self.offset());
        self.read_data(remaining)
    }

    /// Move the offset to the end of the file and return it
    fn seek_to_end(&mut self) -> usize {
        let size = self.size();
        self.seek_to(size);
        size
    }

    /// Read a single byte
    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_data_verifying(1)?[0])
    }

    /// Read a little-endian u16
    fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_data_verifying(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32
    fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_data_verifying(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian i32
    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read `count` little-endian u32 values
    fn read_u32_array(&mut self, count: usize) -> Result<Vec<u32>> {
        let len = count.checked_mul(4).ok_or(ForgeError::UnexpectedEof)?;
        let bytes = self.read_data_verifying(len)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

/// Lazily extracting reader over a single filesystem file
///
/// Each handle owns its own buffer and offset; handles to the same file do
/// not affect each other.
#[derive(Debug, Clone)]
pub struct ReadHandle {
    file: VfsFile,
    offset: usize,
    buffer: Option<Vec<u8>>,
}

impl ReadHandle {
    /// Create a handle positioned at the start of `file`
    pub fn new(file: VfsFile) -> Self {
        Self {
            file,
            offset: 0,
            buffer: None,
        }
    }

    /// The file this handle reads
    pub fn file(&self) -> &VfsFile {
        &self.file
    }

    /// True once the file data has been extracted
    pub fn is_buffered(&self) -> bool {
        self.buffer.is_some()
    }

    fn buffer(&mut self) -> Result<&[u8]> {
        if self.buffer.is_none() {
            let data = hpi::extract(&self.file.info, &self.file.archive)?;
            if data.len() != self.file.size() {
                warn!(
                    "Extracted {} bytes from {}, expected {}",
                    data.len(),
                    self.file.name(),
                    self.file.size()
                );
            }
            self.buffer = Some(data);
        }
        Ok(self.buffer.as_deref().unwrap_or_default())
    }
}

impl FileRead for ReadHandle {
    fn read_data(&mut self, len: usize) -> Result<Vec<u8>> {
        let size = self.file.size();
        let start = self.offset;
        let data = self.buffer()?;

        let available = data.len().min(size);
        let start = start.min(available);
        let end = start.saturating_add(len).min(available);
        let chunk = data[start..end].to_vec();

        self.offset = end;
        Ok(chunk)
    }

    fn seek_to(&mut self, offset: usize) {
        self.offset = offset.min(self.file.size());
    }

    fn file_name(&self) -> &str {
        self.file.name()
    }

    fn size(&self) -> usize {
        self.file.size()
    }

    fn offset(&self) -> usize {
        self.offset
    }
}

/// A named in-memory file
#[derive(Debug, Clone, Default)]
pub struct MemoryHandle {
    name: String,
    data: Vec<u8>,
    offset: usize,
}

impl MemoryHandle {
    /// Wrap `data` as a file called `name`
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            offset: 0,
        }
    }

    /// The wrapped bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl FileRead for MemoryHandle {
    fn read_data(&mut self, len: usize) -> Result<Vec<u8>> {
        let end = self.offset.saturating_add(len).min(self.data.len());
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(chunk)
    }

    fn seek_to(&mut self, offset: usize) {
        self.offset = offset.min(self.data.len());
    }

    fn file_name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn offset(&self) -> usize {
        self.offset
    }
}

fn clamped_seek(pos: SeekFrom, offset: usize, size: usize) -> usize {
    let target = match pos {
        SeekFrom::Start(n) => n.min(size as u64) as i128,
        SeekFrom::End(d) => size as i128 + d as i128,
        SeekFrom::Current(d) => offset as i128 + d as i128,
    };
    target.clamp(0, size as i128) as usize
}

macro_rules! impl_io_traits {
    ($handle:ty) => {
        impl Read for $handle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let data = self.read_data(buf.len()).map_err(io::Error::other)?;
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
        }

        impl Seek for $handle {
            fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
                let target = clamped_seek(pos, self.offset(), self.size());
                self.seek_to(target);
                Ok(self.offset() as u64)
            }
        }
    };
}

impl_io_traits!(ReadHandle);
impl_io_traits!(MemoryHandle);
