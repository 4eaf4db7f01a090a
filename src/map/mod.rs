//! Map terrain and feature metadata
//!
//! A map is a `.tnt` terrain file next to its `.ota` header (see
//! [`crate::info::MapInfo`]). The terrain holds the height and feature
//! grids, sampled once per 16x16 pixel map unit, the graphics for the
//! ground and a small overview image. Total Annihilation stores the ground
//! as 32x32 paletted tiles; Kingdoms references regions of external JPEGs
//! and also carries a second, larger overview.
//!
//! Features (trees, rocks, wrecks) are named in the terrain and described
//! by `features/<world>/*.tdf`; [`MapFeatureInfo::collect`] resolves them.

mod feature;
mod tnt;

pub use feature::{
    planet_directory, Destruction, FeatureCollection, Flammability, MapFeatureInfo, Reclamation,
};
pub use tnt::{TaMapModel, TakMapModel, TakTile};

use crate::vfs::FileRead;
use crate::{ByteReader, ForgeError, Result, Size2};
use log::debug;
use std::collections::BTreeSet;

/// Version tag of Total Annihilation terrain files
pub const TNT_VERSION_TA: u32 = 0x0000_2000;

/// Version tag of Kingdoms terrain files
pub const TNT_VERSION_KINGDOMS: u32 = 0x0000_4000;

/// Pixels along each side of a map unit
pub const MAP_UNIT_PIXELS: usize = 16;

/// Pixels along each side of a ground tile; one tile covers 2x2 map units
pub const TILE_PIXELS: usize = 32;

/// A paletted overview image of a map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinimapImage {
    /// Image dimensions
    pub size: Size2,
    /// One palette index per pixel, row-major
    pub data: Vec<u8>,
}

impl MinimapImage {
    /// Read a `width, height, pixels` block at the current offset
    pub fn read<R: FileRead + ?Sized>(handle: &mut R) -> Result<Self> {
        let width = handle.read_u32()? as usize;
        let height = handle.read_u32()? as usize;
        let len = width
            .checked_mul(height)
            .ok_or_else(|| ForgeError::InvalidData(format!("minimap {width}x{height}")))?;
        let data = handle.read_data_verifying(len)?;
        Ok(Self {
            size: Size2::new(width, height),
            data,
        })
    }
}

/// Terrain of a map in either engine's layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapModel {
    /// Total Annihilation terrain
    Ta(TaMapModel),
    /// Kingdoms terrain
    Tak(TakMapModel),
}

impl MapModel {
    /// Decode a `.tnt` file
    pub fn load<R: FileRead + ?Sized>(handle: &mut R) -> Result<Self> {
        handle.seek_to(0);
        let header = handle.read_data_verifying(12)?;
        let mut fields = ByteReader::new(&header);
        let version = fields.u32()?;
        let map_size = Size2::new(fields.u32()? as usize, fields.u32()? as usize);

        let model = match version {
            TNT_VERSION_TA => MapModel::Ta(TaMapModel::read(handle, map_size)?),
            TNT_VERSION_KINGDOMS => MapModel::Tak(TakMapModel::read(handle, map_size)?),
            other => return Err(ForgeError::UnsupportedTntVersion(other)),
        };

        debug!(
            "Loaded {}x{} map {} with {} features",
            map_size.width,
            map_size.height,
            handle.file_name(),
            model.features().len()
        );
        Ok(model)
    }

    /// Size in map units
    pub fn map_size(&self) -> Size2 {
        match self {
            MapModel::Ta(model) => model.map_size,
            MapModel::Tak(model) => model.map_size,
        }
    }

    /// Size in pixels
    pub fn resolution(&self) -> Size2 {
        let size = self.map_size();
        Size2::new(size.width * MAP_UNIT_PIXELS, size.height * MAP_UNIT_PIXELS)
    }

    /// Height below which terrain is under water
    pub fn sea_level(&self) -> u32 {
        match self {
            MapModel::Ta(model) => model.sea_level,
            MapModel::Tak(model) => model.sea_level,
        }
    }

    /// The overview image; the small one for Kingdoms maps
    pub fn minimap(&self) -> &MinimapImage {
        match self {
            MapModel::Ta(model) => &model.minimap,
            MapModel::Tak(model) => &model.small_minimap,
        }
    }

    /// One elevation per map unit, row-major
    pub fn height_map(&self) -> &[u8] {
        match self {
            MapModel::Ta(model) => &model.height_map,
            MapModel::Tak(model) => &model.height_map,
        }
    }

    /// Index into [`features`](Self::features) per map unit, row-major
    pub fn feature_map(&self) -> &[Option<usize>] {
        match self {
            MapModel::Ta(model) => &model.feature_map,
            MapModel::Tak(model) => &model.feature_map,
        }
    }

    /// Names of the feature kinds placed on the map
    pub fn features(&self) -> &[String] {
        match self {
            MapModel::Ta(model) => &model.features,
            MapModel::Tak(model) => &model.features,
        }
    }

    /// Lowercased feature names, ready for [`MapFeatureInfo::collect`]
    pub fn feature_names(&self) -> BTreeSet<String> {
        self.features().iter().map(|name| name.to_lowercase()).collect()
    }

    /// Elevation of the map unit at `(x, y)`
    pub fn height_at(&self, x: usize, y: usize) -> Option<u8> {
        self.unit_index(x, y)
            .and_then(|index| self.height_map().get(index).copied())
    }

    /// Name of the feature on the map unit at `(x, y)`
    pub fn feature_at(&self, x: usize, y: usize) -> Option<&str> {
        let index = self.unit_index(x, y)?;
        let feature = (*self.feature_map().get(index)?)?;
        self.features().get(feature).map(String::as_str)
    }

    fn unit_index(&self, x: usize, y: usize) -> Option<usize> {
        let size = self.map_size();
        (x < size.width && y < size.height).then(|| y * size.width + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryHandle;

    fn put_u32(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    fn feature_entries(out: &mut Vec<u8>, names: &[&str]) {
        for (index, name) in names.iter().enumerate() {
            put_u32(out, index as u32);
            let mut field = [0u8; 128];
            field[..name.len()].copy_from_slice(name.as_bytes());
            out.extend_from_slice(&field);
        }
    }

    fn minimap(out: &mut Vec<u8>, width: u32, height: u32, fill: u8) {
        put_u32(out, width);
        put_u32(out, height);
        out.extend(std::iter::repeat(fill).take((width * height) as usize));
    }

    /// A 4x2 unit TA terrain: two tiles side by side, one tree, one rock
    fn ta_tnt() -> Vec<u8> {
        let (width, height) = (4u32, 2u32);
        let index_offset = 12 + 52;
        let info_offset = index_offset + 2 * 2;
        let tiles_offset = info_offset + 4 * 8;
        let features_offset = tiles_offset + 2 * 1024;
        let minimap_offset = features_offset + 2 * 132;

        let mut out = Vec::new();
        for value in [TNT_VERSION_TA, width, height] {
            put_u32(&mut out, value);
        }
        for value in [
            index_offset,
            info_offset,
            tiles_offset,
            2,
            2,
            features_offset,
            40,
            minimap_offset,
            1,
        ] {
            put_u32(&mut out, value);
        }
        out.extend_from_slice(&[0u8; 16]);

        // Tile grid is 2x1: second tile, then first
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());

        // elevation | special << 8; 0xFFFF is open ground
        for unit in 0..8u32 {
            let special = match unit {
                1 => 0,
                6 => 1,
                7 => 0xFFFC,
                _ => 0xFFFF,
            };
            put_u32(&mut out, (unit * 10) | (special << 8));
        }

        out.extend(std::iter::repeat(3u8).take(1024));
        out.extend(std::iter::repeat(4u8).take(1024));
        feature_entries(&mut out, &["Tree1", "Rock3"]);
        minimap(&mut out, 3, 2, 0xDD);
        out
    }

    /// A 2x2 unit Kingdoms terrain with one placed feature
    fn tak_tnt() -> Vec<u8> {
        let heights_offset = 12 + 40;
        let spots_offset = heights_offset + 4;
        let features_offset = spots_offset + 4 * 4;
        let names_offset = features_offset + 132;
        let columns_offset = names_offset + 4;
        let rows_offset = columns_offset + 4;
        let small_offset = rows_offset + 4;
        let large_offset = small_offset + 8 + 4;

        let mut out = Vec::new();
        for value in [TNT_VERSION_KINGDOMS, 2, 2] {
            put_u32(&mut out, value);
        }
        for value in [
            7,
            heights_offset,
            spots_offset,
            features_offset,
            1,
            names_offset,
            columns_offset,
            rows_offset,
            small_offset,
            large_offset,
        ] {
            put_u32(&mut out, value);
        }
        out.extend_from_slice(&[5, 6, 7, 8]);
        for spot in [u32::MAX, u32::MAX, 0, 9] {
            put_u32(&mut out, spot);
        }
        feature_entries(&mut out, &["Bush2"]);
        for value in [0xCAFE, 3, 1] {
            put_u32(&mut out, value);
        }
        minimap(&mut out, 2, 2, 1);
        minimap(&mut out, 4, 4, 2);
        out
    }

    #[test]
    fn test_load_ta_terrain() {
        let mut handle = MemoryHandle::new("coast.tnt", ta_tnt());
        let map = MapModel::load(&mut handle).unwrap();

        assert_eq!(map.map_size(), Size2::new(4, 2));
        assert_eq!(map.resolution(), Size2::new(64, 32));
        assert_eq!(map.sea_level(), 40);
        assert_eq!(map.height_map(), [0, 10, 20, 30, 40, 50, 60, 70]);
        assert_eq!(map.features(), ["Tree1", "Rock3"]);
        assert_eq!(map.feature_at(1, 0), Some("Tree1"));
        assert_eq!(map.feature_at(2, 1), Some("Rock3"));
        assert_eq!(map.feature_at(3, 1), None);
        assert_eq!(map.feature_at(4, 0), None);
        assert_eq!(map.height_at(3, 1), Some(70));
        assert_eq!(map.minimap().size, Size2::new(3, 2));
        assert!(map.feature_names().contains("rock3"));

        let MapModel::Ta(ta) = &map else {
            panic!("expected TA terrain");
        };
        assert_eq!(ta.tile_count, 2);
        assert_eq!(ta.tile_at(0, 0).unwrap()[0], 4);
        assert_eq!(ta.tile_at(1, 0).unwrap()[0], 3);
        assert!(ta.tile_at(2, 0).is_none());
    }

    #[test]
    fn test_load_kingdoms_terrain() {
        let mut handle = MemoryHandle::new("isle.tnt", tak_tnt());
        let map = MapModel::load(&mut handle).unwrap();

        assert_eq!(map.sea_level(), 7);
        assert_eq!(map.height_map(), [5, 6, 7, 8]);
        // Spot 9 is past the feature count and ignored
        assert_eq!(map.feature_map(), [None, None, Some(0), None]);
        assert_eq!(map.feature_at(0, 1), Some("Bush2"));
        assert_eq!(map.minimap().size, Size2::new(2, 2));

        let MapModel::Tak(tak) = &map else {
            panic!("expected Kingdoms terrain");
        };
        assert_eq!(tak.large_minimap.size, Size2::new(4, 4));
        assert_eq!(
            tak.tile_at(0, 0),
            Some(TakTile {
                name: 0xCAFE,
                column: 3,
                row: 1
            })
        );
    }

    #[test]
    fn test_unknown_version() {
        let mut data = ta_tnt();
        data[..4].copy_from_slice(&0x3000u32.to_le_bytes());
        let mut handle = MemoryHandle::new("odd.tnt", data);
        assert!(matches!(
            MapModel::load(&mut handle),
            Err(ForgeError::UnsupportedTntVersion(0x3000))
        ));
    }

    #[test]
    fn test_truncated_terrain() {
        let data = ta_tnt();
        let mut handle = MemoryHandle::new("short.tnt", data[..data.len() - 1].to_vec());
        assert!(matches!(MapModel::load(&mut handle), Err(ForgeError::UnexpectedEof)));

        let mut handle = MemoryHandle::new("tiny.tnt", vec![0, 0x20]);
        assert!(MapModel::load(&mut handle).is_err());
    }
}
