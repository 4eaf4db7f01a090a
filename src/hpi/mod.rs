//! HPI archive container reader
//!
//! HPI archives bundle a directory tree of game assets. Two generations of
//! the format exist: the first obfuscates everything after the header with a
//! position-keyed cipher and splits compressed files into fixed-size chunks,
//! the second keeps its directory and name tables in separate (optionally
//! compressed) blobs and stores each compressed file as a single zlib chunk.
//!
//! Loading produces an immutable [`ArchiveDirectory`] snapshot; file data is
//! only read when a file is extracted.

mod chunk;
mod gen1;
mod gen2;

pub use chunk::{decode_chunk, is_chunk, ChunkHeader, CHUNK_HEADER_SIZE, CHUNK_MARKER};

use crate::decompress::CompressionKind;
use crate::{ByteReader, ForgeError, Result};
use log::{debug, warn};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Archive marker, "HAPI" in little-endian order
pub const HPI_MARKER: u32 = 0x4950_4148;

/// Version tag of first generation archives
pub const HPI_VERSION_GEN1: u32 = 0x0001_0000;

/// Version tag of second generation archives
pub const HPI_VERSION_GEN2: u32 = 0x0002_0000;

/// Version tag of savegame banks ("BANK"), which are not supported
pub const HPI_VERSION_SAVEGAME: u32 = 0x4B4E_4142;

/// Size of the uncompressed pieces a Gen1 file is split into before chunking
pub const GEN1_CHUNK_SIZE: usize = 65536;

/// Directory nesting beyond this depth is treated as a corrupt (cyclic) tree
pub const MAX_DIRECTORY_DEPTH: usize = 256;

/// Archive format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpiVersion {
    /// First generation: ciphered directory, chunked file data
    Gen1,
    /// Second generation: separate name table, single-chunk files
    Gen2,
}

impl HpiVersion {
    /// Map a raw header version tag
    pub fn from_raw(version: u32) -> Result<Self> {
        match version {
            HPI_VERSION_GEN1 => Ok(HpiVersion::Gen1),
            HPI_VERSION_GEN2 => Ok(HpiVersion::Gen2),
            _ => Err(ForgeError::UnsupportedVersion(version)),
        }
    }
}

/// Metadata of a single file stored in an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    /// File name, unique within its directory
    pub name: String,
    /// Size of the extracted data in bytes
    pub size: usize,
    /// Absolute offset of the stored data within the archive
    pub offset: u64,
    /// Compression of the stored data
    pub compression: CompressionKind,
    /// Size of the stored data (Gen2 only, zero otherwise)
    pub compressed_size: usize,
}

impl ArchiveFile {
    /// True if the file name ends with `.ext` (compared case-insensitively)
    pub fn has_extension(&self, ext: &str) -> bool {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }

    /// File name without its extension
    pub fn base_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(dot) if dot > 0 => &self.name[..dot],
            _ => &self.name,
        }
    }
}

/// A directory listing inside an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveDirectory {
    /// Directory name; the root directory has an empty name
    pub name: String,
    /// Contained files and subdirectories in archive order
    pub items: Vec<ArchiveItem>,
}

impl ArchiveDirectory {
    /// Total number of files in this directory and every subdirectory
    pub fn file_count(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                ArchiveItem::File(_) => 1,
                ArchiveItem::Directory(dir) => dir.file_count(),
            })
            .sum()
    }

    /// Total number of subdirectories below this directory
    pub fn directory_count(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                ArchiveItem::File(_) => 0,
                ArchiveItem::Directory(dir) => 1 + dir.directory_count(),
            })
            .sum()
    }

    /// Visit every file below this directory together with its `/`-joined path
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &ArchiveFile),
    {
        fn recurse<F: FnMut(&str, &ArchiveFile)>(
            dir: &ArchiveDirectory,
            prefix: &str,
            visit: &mut F,
        ) {
            for item in &dir.items {
                let path = if prefix.is_empty() {
                    item.name().to_string()
                } else {
                    format!("{}/{}", prefix, item.name())
                };
                match item {
                    ArchiveItem::File(file) => visit(&path, file),
                    ArchiveItem::Directory(sub) => recurse(sub, &path, visit),
                }
            }
        }
        recurse(self, "", &mut visit);
    }
}

/// An entry of an archive directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveItem {
    /// A file that can be extracted
    File(ArchiveFile),
    /// A nested directory
    Directory(ArchiveDirectory),
}

impl ArchiveItem {
    /// Name of the item within its directory
    pub fn name(&self) -> &str {
        match self {
            ArchiveItem::File(file) => &file.name,
            ArchiveItem::Directory(dir) => &dir.name,
        }
    }
}

/// Header fields needed to read an archive after the directory is loaded
#[derive(Debug, Clone, Copy)]
enum Layout {
    Gen1(gen1::ExtHeader),
    Gen2(gen2::ExtHeader),
}

impl Layout {
    fn read(file: &File) -> Result<Self> {
        let mut reader = file;
        reader.seek(SeekFrom::Start(0))?;

        let mut header = [0u8; 8];
        reader.read_exact(&mut header).map_err(eof_on_short)?;
        let mut fields = ByteReader::new(&header);
        let marker = fields.u32()?;
        let version = fields.u32()?;

        if marker != HPI_MARKER {
            return Err(ForgeError::BadMarker(marker));
        }

        match HpiVersion::from_raw(version)? {
            HpiVersion::Gen1 => Ok(Layout::Gen1(gen1::ExtHeader::read(file)?)),
            HpiVersion::Gen2 => Ok(Layout::Gen2(gen2::ExtHeader::read(file)?)),
        }
    }

    fn version(&self) -> HpiVersion {
        match self {
            Layout::Gen1(_) => HpiVersion::Gen1,
            Layout::Gen2(_) => HpiVersion::Gen2,
        }
    }

    fn load_root(&self, file: &File) -> Result<ArchiveDirectory> {
        match self {
            Layout::Gen1(header) => gen1::load_root(file, header),
            Layout::Gen2(header) => gen2::load_root(file, header),
        }
    }

    fn extract(&self, file: &File, info: &ArchiveFile) -> Result<Vec<u8>> {
        match self {
            Layout::Gen1(header) => gen1::extract(file, header, info),
            Layout::Gen2(_) => gen2::extract(file, info),
        }
    }
}

/// An open archive with its directory tree loaded
///
/// The file handle is kept open so repeated extractions do not re-parse the
/// header.
#[derive(Debug)]
pub struct HpiArchive {
    path: PathBuf,
    file: File,
    layout: Layout,
    root: ArchiveDirectory,
}

impl HpiArchive {
    /// Open an archive and load its directory tree
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let layout = Layout::read(&file)?;

        debug!("Loading {:?} archive {}", layout.version(), path.display());
        let root = layout.load_root(&file)?;
        debug!(
            "Loaded {} files in {} directories from {}",
            root.file_count(),
            root.directory_count(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            layout,
            root,
        })
    }

    /// Path the archive was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format generation of the archive
    pub fn version(&self) -> HpiVersion {
        self.layout.version()
    }

    /// Root directory of the archive
    pub fn root(&self) -> &ArchiveDirectory {
        &self.root
    }

    /// Consume the archive, keeping only its directory tree
    pub fn into_root(self) -> ArchiveDirectory {
        self.root
    }

    /// Extract the complete contents of a file listed in this archive
    pub fn extract(&self, info: &ArchiveFile) -> Result<Vec<u8>> {
        self.layout.extract(&self.file, info)
    }
}

/// Load the directory tree of the archive at `path`
pub fn load_directory<P: AsRef<Path>>(path: P) -> Result<ArchiveDirectory> {
    HpiArchive::open(path).map(HpiArchive::into_root)
}

/// Extract a single file from the archive at `path`
///
/// Only the archive header is re-read; `info` must have been obtained from
/// a directory loaded from the same archive.
pub fn extract<P: AsRef<Path>>(info: &ArchiveFile, path: P) -> Result<Vec<u8>> {
    let file = File::open(path.as_ref())?;
    let layout = Layout::read(&file)?;
    layout.extract(&file, info)
}

/// Read up to `len` bytes at an absolute archive offset
///
/// A short read is logged and the available bytes are returned; the caller
/// decides whether the shortfall is fatal.
fn read_at(file: &File, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut reader = file;
    reader.seek(SeekFrom::Start(offset))?;

    // Sizes come from the archive itself; never reserve past the end of the file
    let available = file.metadata()?.len().saturating_sub(offset);
    let mut data = Vec::with_capacity(len.min(usize::try_from(available).unwrap_or(usize::MAX)));
    reader.take(len as u64).read_to_end(&mut data)?;
    if data.len() < len {
        warn!(
            "Read less data than requested at {:#x} (wanted {} bytes, read {} bytes)",
            offset,
            len,
            data.len()
        );
    }
    Ok(data)
}

fn eof_on_short(err: std::io::Error) -> ForgeError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ForgeError::UnexpectedEof
    } else {
        ForgeError::Io(err)
    }
}
