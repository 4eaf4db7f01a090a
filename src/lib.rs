//! taforge - Rust toolkit for Total Annihilation game assets
//!
//! This crate reads the data formats of Total Annihilation and its engine
//! siblings: HPI archives and the layered virtual filesystem built from them,
//! GAF sprites, palettes and PCX images, 3DO models, compiled COB unit
//! scripts (with a cooperative virtual machine to run them), TNT map
//! terrain and TDF text metadata.
//!
//! # Features
//!
//! - HPI archives in both the original (TA) and the `BANK` (Kingdoms) layout
//! - LZ77 and zlib chunk decompression with the per-chunk cipher
//! - A merged virtual filesystem over a game directory, honoring archive
//!   priority by extension
//! - GAF sprite listings and frame decoding, including RLE and composite frames
//! - 3DO model tables and per-unit animation state
//! - COB script decoding, disassembly and execution
//! - TDF parsing with typed unit, map and side metadata
//! - TNT terrain in both layouts, and map feature lookup across worlds
//!
//! # Example - Reading a file from the game data
//!
//! ```no_run
//! use taforge::{FileSystem, GafListing};
//! use taforge::vfs::BuildOptions;
//!
//! let fs = FileSystem::build("/games/TotalA", &BuildOptions::default())?;
//! let mut handle = fs.open_file("anims/buildpic.gaf")?;
//! let listing = GafListing::load(&mut handle)?;
//! for item in &listing.items {
//!     println!("{} ({} frames)", item.name, item.frames.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Example - Listing an archive
//!
//! ```no_run
//! use taforge::HpiArchive;
//!
//! let archive = HpiArchive::open("totala1.hpi")?;
//! archive.root().walk(|path, file| println!("{path} {} bytes", file.size));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

// Public modules
pub mod common;
pub mod decompress;
pub mod error;
pub mod gaf;
pub mod hpi;
pub mod info;
pub mod map;
pub mod model;
pub mod palette;
pub mod pcx;
pub mod script;
pub mod tdf;
pub mod vfs;

// Re-export commonly used types
pub use common::{
    c_string_at, c_string_field, ByteReader, ForgeError, Point2, Result, Size2, Vector3,
    ANGULAR_CONSTANT, LINEAR_CONSTANT,
};
pub use gaf::GafListing;
pub use hpi::HpiArchive;
pub use map::{MapFeatureInfo, MapModel};
pub use model::ModelTable;
pub use palette::Palette;
pub use script::{Context, Script};
pub use tdf::TdfParser;
pub use vfs::{FileSystem, ReadHandle};

/// Read a whole file out of the filesystem
///
/// # Arguments
/// * `fs` - The filesystem to search
/// * `path` - Slash-separated path, matched without regard to ASCII case
///
/// # Returns
/// The decompressed file contents
pub fn read_file(fs: &FileSystem, path: &str) -> Result<Vec<u8>> {
    use vfs::FileRead;

    let mut handle = fs.open_file(path)?;
    handle.read_to_end_data()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let _ = Vector3::ZERO;
        let _ = Size2::new(1, 1);
        let _ = TdfParser::new(Vec::new());

        let fs = FileSystem::empty();
        assert!(matches!(read_file(&fs, "missing.txt"), Err(ForgeError::NotFound(_))));
    }
}
