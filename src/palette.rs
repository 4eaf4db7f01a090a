//! Palette color mapping
//!
//! Paletted images store one byte per pixel that indexes a 256 entry color
//! table. The mapping functions here are pure: they do not treat any index
//! specially. Transparency is expressed by giving palette entries a zero
//! alpha with [`Palette::with_chroma_keys`].

use crate::pcx::Pcx;
use crate::vfs::{FileRead, FileSystem};
use crate::{ForgeError, Result, Size2};

/// Number of palette entries
pub const PALETTE_SIZE: usize = 256;

/// Location of the standard palette in the game filesystem
pub const STANDARD_PALETTE_PATH: &str = "palettes/PALETTE.PAL";

/// Palette indices treated as transparent in model textures
pub const TEXTURE_TRANSPARENCIES: [u8; 1] = [5];

/// Palette indices treated as transparent in map feature sprites
pub const FEATURE_TRANSPARENCIES: [u8; 1] = [0];

/// An RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel
    pub red: u8,
    /// Green channel
    pub green: u8,
    /// Blue channel
    pub blue: u8,
    /// Alpha channel, 255 is opaque
    pub alpha: u8,
}

impl Color {
    /// Opaque white
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    /// Opaque black
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    /// Translucent black used for unit shadows
    pub const SHADOW: Color = Color::rgba(0, 0, 0, 100);

    /// Create a color from its channels
    pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

/// A 256 entry color table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [Color; PALETTE_SIZE],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: [Color::WHITE; PALETTE_SIZE],
        }
    }
}

impl std::ops::Index<u8> for Palette {
    type Output = Color;

    fn index(&self, index: u8) -> &Color {
        &self.colors[index as usize]
    }
}

impl Palette {
    /// Build a palette from explicit colors; missing entries are white
    pub fn from_colors(colors: &[Color]) -> Self {
        let mut palette = Self::default();
        for (slot, color) in palette.colors.iter_mut().zip(colors) {
            *slot = *color;
        }
        palette
    }

    /// Parse a `.pal` file of 4-byte RGBx entries
    ///
    /// The stored fourth byte is ignored and every entry is made opaque.
    pub fn from_pal(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PALETTE_SIZE * 4 {
            return Err(ForgeError::InvalidData(format!(
                "palette has {} bytes, expected {}",
                bytes.len(),
                PALETTE_SIZE * 4
            )));
        }

        let mut palette = Self::default();
        for (slot, entry) in palette.colors.iter_mut().zip(bytes.chunks_exact(4)) {
            *slot = Color::rgba(entry[0], entry[1], entry[2], 255);
        }
        Ok(palette)
    }

    /// Parse 768 bytes of packed RGB triples, as stored at the end of PCX files
    pub fn from_rgb(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PALETTE_SIZE * 3 {
            return Err(ForgeError::UnexpectedEof);
        }

        let mut palette = Self::default();
        for (slot, entry) in palette.colors.iter_mut().zip(bytes.chunks_exact(3)) {
            *slot = Color::rgba(entry[0], entry[1], entry[2], 255);
        }
        Ok(palette)
    }

    /// Read a `.pal` file from a handle
    pub fn load<R: FileRead + ?Sized>(handle: &mut R) -> Result<Self> {
        handle.seek_to(0);
        Self::from_pal(&handle.read_to_end_data()?)
    }

    /// Load the game's standard palette
    pub fn standard(fs: &FileSystem) -> Result<Self> {
        Self::load(&mut fs.open_file(STANDARD_PALETTE_PATH)?)
    }

    /// Palette for map feature sprites of `world`
    ///
    /// Worlds with their own colors ship `palettes/<world>_features.pcx`;
    /// features without a world use the standard palette. Entry 0 is
    /// transparent either way.
    pub fn feature_palette(fs: &FileSystem, world: Option<&str>) -> Result<Self> {
        let palette = match world.filter(|w| !w.is_empty()) {
            None => Self::standard(fs)?,
            Some(world) => {
                let path = format!("palettes/{}_features.pcx", world.to_lowercase());
                let mut handle = fs.open_file(&path)?;
                handle.seek_to(0);
                Pcx::extract_palette(&handle.read_to_end_data()?)?
            }
        };
        Ok(palette.with_chroma_keys(&FEATURE_TRANSPARENCIES, 0))
    }

    /// Palette used to draw shadows: translucent black with clear entries 0 and 9
    pub fn shadow() -> Self {
        let mut palette = Self {
            colors: [Color::SHADOW; PALETTE_SIZE],
        };
        palette.apply_chroma_keys(&[0, 9], 0);
        palette
    }

    /// Every color in index order
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Set the alpha of the given entries in place
    pub fn apply_chroma_keys(&mut self, indices: &[u8], alpha: u8) {
        for &index in indices {
            self.colors[index as usize].alpha = alpha;
        }
    }

    /// A copy of this palette with the given entries set to `alpha`
    pub fn with_chroma_keys(&self, indices: &[u8], alpha: u8) -> Self {
        let mut copy = self.clone();
        copy.apply_chroma_keys(indices, alpha);
        copy
    }

    /// Expand palette indices into RGB triples
    pub fn map_indices_rgb(&self, indices: &[u8], size: Size2) -> Vec<u8> {
        let mut out = Vec::with_capacity(size.area() * 3);
        for &index in indices.iter().take(size.area()) {
            let c = self[index];
            out.extend_from_slice(&[c.red, c.green, c.blue]);
        }
        out
    }

    /// Expand palette indices into RGB triples, bottom row first
    pub fn map_indices_rgb_flipped(&self, indices: &[u8], size: Size2) -> Vec<u8> {
        let rows = flip_rows(indices, size);
        self.map_indices_rgb(&rows, size)
    }

    /// Expand palette indices into RGBA quads
    pub fn map_indices_rgba(&self, indices: &[u8], size: Size2) -> Vec<u8> {
        let mut out = Vec::with_capacity(size.area() * 4);
        for &index in indices.iter().take(size.area()) {
            let c = self[index];
            out.extend_from_slice(&[c.red, c.green, c.blue, c.alpha]);
        }
        out
    }

    /// Expand palette indices into RGBA quads, bottom row first
    pub fn map_indices_rgba_flipped(&self, indices: &[u8], size: Size2) -> Vec<u8> {
        let rows = flip_rows(indices, size);
        self.map_indices_rgba(&rows, size)
    }

    /// An RGBA image filled with a single palette color
    pub fn make_rgba(&self, index: u8, size: Size2) -> Vec<u8> {
        let c = self[index];
        [c.red, c.green, c.blue, c.alpha].repeat(size.area())
    }
}

fn flip_rows(indices: &[u8], size: Size2) -> Vec<u8> {
    if size.width == 0 {
        return Vec::new();
    }
    let used = &indices[..indices.len().min(size.area())];
    used.chunks(size.width).rev().flatten().copied().collect()
}

/// Expand little-endian ARGB 4444 pixels into RGBA quads
pub fn map_packed_4444(pixels: &[u8]) -> Vec<u8> {
    let expand = |nibble: u16| (nibble as u8 & 0x0F) * 17;
    pixels
        .chunks_exact(2)
        .flat_map(|p| {
            let v = u16::from_le_bytes([p[0], p[1]]);
            [expand(v >> 8), expand(v >> 4), expand(v), expand(v >> 12)]
        })
        .collect()
}

/// Expand little-endian ARGB 1555 pixels into RGBA quads
pub fn map_packed_1555(pixels: &[u8]) -> Vec<u8> {
    let expand = |bits: u16| {
        let v = (bits & 0x1F) as u8;
        (v << 3) | (v >> 2)
    };
    pixels
        .chunks_exact(2)
        .flat_map(|p| {
            let v = u16::from_le_bytes([p[0], p[1]]);
            let alpha = if v & 0x8000 != 0 { 255 } else { 0 };
            [expand(v >> 10), expand(v >> 5), expand(v), alpha]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> Palette {
        let colors: Vec<Color> = (0..=255u8).map(|i| Color::rgba(i, 255 - i, i / 2, 0)).collect();
        Palette::from_colors(&colors)
    }

    #[test]
    fn test_default_is_white() {
        let palette = Palette::default();
        assert!(palette.colors().iter().all(|&c| c == Color::WHITE));
        assert_eq!(palette.colors().len(), 256);
    }

    #[test]
    fn test_from_pal_forces_opaque() {
        let bytes: Vec<u8> = (0..256).flat_map(|i| [i as u8, 1, 2, 0]).collect();
        let palette = Palette::from_pal(&bytes).unwrap();
        assert_eq!(palette[7], Color::rgba(7, 1, 2, 255));
        assert!(Palette::from_pal(&bytes[..100]).is_err());
    }

    #[test]
    fn test_map_indices() {
        let palette = gradient();
        let size = Size2::new(2, 1);
        assert_eq!(palette.map_indices_rgb(&[0, 10], size), [0, 255, 0, 10, 245, 5]);
        assert_eq!(
            palette.map_indices_rgba(&[0, 10], size),
            [0, 255, 0, 0, 10, 245, 5, 0]
        );
    }

    #[test]
    fn test_map_indices_flipped() {
        let palette = gradient();
        let size = Size2::new(1, 2);
        assert_eq!(palette.map_indices_rgb_flipped(&[1, 2], size), [2, 253, 1, 1, 254, 0]);
        assert_eq!(
            palette.map_indices_rgba_flipped(&[1, 2], size),
            [2, 253, 1, 0, 1, 254, 0, 0]
        );
    }

    #[test]
    fn test_index_zero_not_special() {
        let palette = Palette::from_colors(&[Color::BLACK]);
        assert_eq!(palette.map_indices_rgba(&[0], Size2::new(1, 1)), [0, 0, 0, 255]);
    }

    #[test]
    fn test_chroma_keys_and_shadow() {
        let palette = Palette::default().with_chroma_keys(&TEXTURE_TRANSPARENCIES, 0);
        assert_eq!(palette[5].alpha, 0);
        assert_eq!(palette[4].alpha, 255);

        let shadow = Palette::shadow();
        assert_eq!(shadow[0].alpha, 0);
        assert_eq!(shadow[9].alpha, 0);
        assert_eq!(shadow[10], Color::SHADOW);
    }

    #[test]
    fn test_make_rgba() {
        let palette = gradient();
        assert_eq!(
            palette.make_rgba(4, Size2::new(2, 1)),
            [4, 251, 2, 0, 4, 251, 2, 0]
        );
    }

    #[test]
    fn test_packed_formats() {
        // 0xF0F0: alpha 15, red 0, green 15, blue 0
        assert_eq!(map_packed_4444(&[0xF0, 0xF0]), [0, 255, 0, 255]);
        // 0x801F: opaque, pure blue
        assert_eq!(map_packed_1555(&[0x1F, 0x80]), [0, 0, 255, 255]);
        // 0x7C00: transparent, pure red
        assert_eq!(map_packed_1555(&[0x00, 0x7C]), [255, 0, 0, 0]);
    }
}
