//! Per-unit animation state

use super::ModelTable;
use crate::Vector3;

/// Mutable state of one piece, driven by the script VM
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PieceState {
    /// Translation in model units
    pub translation: Vector3,
    /// Rotation in degrees around each axis
    pub rotation: Vector3,
    /// Whether the piece is drawn
    pub hidden: bool,
    /// Whether the piece may be cached by a renderer
    pub cache: bool,
    /// Whether the piece is lit
    pub shade: bool,
    /// Whether the piece casts a shadow
    pub shadow: bool,
}

impl Default for PieceState {
    fn default() -> Self {
        Self {
            translation: Vector3::ZERO,
            rotation: Vector3::ZERO,
            hidden: false,
            cache: true,
            shade: true,
            shadow: true,
        }
    }
}

/// An animated copy of a model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitInstance {
    /// World position of the unit
    pub position: Vector3,
    /// World orientation of the unit
    pub orientation: Vector3,
    /// One state per model piece, in piece order
    pub pieces: Vec<PieceState>,
}

impl UnitInstance {
    /// Fresh state for every piece of `model`
    pub fn new(model: &ModelTable) -> Self {
        Self::with_piece_count(model.pieces.len())
    }

    /// Fresh state for `count` pieces
    pub fn with_piece_count(count: usize) -> Self {
        Self {
            position: Vector3::ZERO,
            orientation: Vector3::ZERO,
            pieces: vec![PieceState::default(); count],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_piece_state() {
        let instance = UnitInstance::with_piece_count(2);
        assert_eq!(instance.pieces.len(), 2);
        let piece = instance.pieces[1];
        assert!(!piece.hidden);
        assert!(piece.cache && piece.shade && piece.shadow);
        assert_eq!(piece.translation, Vector3::ZERO);
    }
}
