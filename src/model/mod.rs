//! 3DO model decoder
//!
//! A model file encodes a rigid piece hierarchy through sibling and child
//! byte offsets in fixed-size object records. [`ModelTable::load`] flattens
//! that tree into index-based arrays: pieces, primitives, vertices and a
//! deduplicated texture table.
//!
//! Piece indices are assigned in worklist order and are stable; the script
//! VM maps its piece names to these positions.

mod instance;
mod loader;

pub use instance::{PieceState, UnitInstance};

use crate::vfs::FileRead;
use crate::{Result, Vector3};
use std::collections::HashMap;

/// Size of an object record
pub const OBJECT_RECORD_SIZE: usize = 52;

/// Size of a primitive record
pub const PRIMITIVE_RECORD_SIZE: usize = 32;

/// A named node of the piece hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    /// Piece name as stored in the file
    pub name: String,
    /// Translation from the parent piece
    pub offset: Vector3,
    /// Indices into [`ModelTable::primitives`]
    pub primitives: Vec<usize>,
    /// Indices into [`ModelTable::pieces`]
    pub children: Vec<usize>,
}

/// A polygon of the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primitive {
    /// Index into [`ModelTable::textures`]
    pub texture: usize,
    /// Indices into [`ModelTable::vertices`]
    pub indices: Vec<usize>,
}

/// Surface of a primitive
#[derive(Debug, Clone)]
pub enum Texture {
    /// Named texture image
    Image(String),
    /// Flat palette color
    Color(u32),
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Texture::Image(a), Texture::Image(b)) => a.eq_ignore_ascii_case(b),
            (Texture::Color(a), Texture::Color(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Texture::Image(name) => write!(f, "Texture:{name}"),
            Texture::Color(index) => write!(f, "Color:{index}"),
        }
    }
}

/// Flattened model geometry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTable {
    /// Pieces in worklist order
    pub pieces: Vec<Piece>,
    /// Every primitive of every piece
    pub primitives: Vec<Primitive>,
    /// Every vertex of every piece
    pub vertices: Vec<Vector3>,
    /// Distinct textures
    pub textures: Vec<Texture>,
    /// Indices of the top-level pieces
    pub roots: Vec<usize>,
    /// Primitive used as the unit's ground plate, if any
    pub ground_plate: Option<usize>,
    /// Lowercased piece name to piece index
    pub name_lookup: HashMap<String, usize>,
}

impl ModelTable {
    /// Decode a model file
    pub fn load<R: FileRead + ?Sized>(handle: &mut R) -> Result<Self> {
        handle.seek_to(0);
        let data = handle.read_to_end_data()?;
        loader::load_model(&data)
    }

    /// Decode a model from its raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        loader::load_model(data)
    }

    /// Index of the piece with the given name, ignoring case
    pub fn piece_index(&self, name: &str) -> Option<usize> {
        self.name_lookup.get(&name.to_ascii_lowercase()).copied()
    }

    /// Find a piece by name, ignoring case
    pub fn piece_named(&self, name: &str) -> Option<&Piece> {
        self.piece_index(name).map(|index| &self.pieces[index])
    }

    /// First top-level piece
    pub fn root(&self) -> Option<&Piece> {
        self.roots.first().map(|&index| &self.pieces[index])
    }
}
