use super::{MinimapImage, TILE_PIXELS};
use crate::vfs::FileRead;
use crate::{c_string_field, ByteReader, ForgeError, Result, Size2};
use log::trace;

/// Extended header of TA terrain, after the common 12 bytes
const TA_HEADER_SIZE: usize = 9 * 4 + 16;

/// Extended header of Kingdoms terrain, after the common 12 bytes
const TAK_HEADER_SIZE: usize = 10 * 4;

const FEATURE_NAME_SIZE: usize = 128;
const FEATURE_ENTRY_SIZE: usize = 4 + FEATURE_NAME_SIZE;

/// Bytes in one paletted ground tile
const TILE_BYTES: usize = TILE_PIXELS * TILE_PIXELS;

/// Total Annihilation terrain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaMapModel {
    /// Size in map units
    pub map_size: Size2,
    /// Height below which terrain is under water
    pub sea_level: u32,
    /// Number of distinct ground tiles
    pub tile_count: usize,
    /// Paletted tile graphics, 32x32 bytes each
    pub tiles: Vec<u8>,
    /// Tile index per 2x2 map units, row-major over [`tile_grid`](Self::tile_grid)
    pub tile_indices: Vec<u16>,
    /// Elevation per map unit
    pub height_map: Vec<u8>,
    /// Feature index per map unit
    pub feature_map: Vec<Option<usize>>,
    /// Feature names in declaration order
    pub features: Vec<String>,
    /// Overview image
    pub minimap: MinimapImage,
}

impl TaMapModel {
    pub(super) fn read<R: FileRead + ?Sized>(handle: &mut R, map_size: Size2) -> Result<Self> {
        let header = handle.read_data_verifying(TA_HEADER_SIZE)?;
        let mut fields = ByteReader::new(&header);
        let tile_index_offset = fields.u32()? as usize;
        let map_info_offset = fields.u32()? as usize;
        let tile_array_offset = fields.u32()? as usize;
        let tile_count = fields.u32()? as usize;
        let feature_count = fields.u32()? as usize;
        let feature_entry_offset = fields.u32()? as usize;
        let sea_level = fields.u32()?;
        let minimap_offset = fields.u32()? as usize;
        let _unknown = fields.u32()?;

        let grid = tile_grid(map_size);
        handle.seek_to(tile_index_offset);
        let raw = handle.read_data_verifying(byte_len(grid.area(), 2)?)?;
        let tile_indices = raw
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();

        // Each map unit packs elevation, a 16-bit special value and a spare byte
        handle.seek_to(map_info_offset);
        let info = handle.read_u32_array(map_size.area())?;
        let height_map = info.iter().map(|&entry| entry as u8).collect();
        let feature_map = info
            .iter()
            .map(|&entry| feature_slot((entry >> 8) & 0xFFFF, feature_count))
            .collect();

        handle.seek_to(tile_array_offset);
        let tiles = handle.read_data_verifying(byte_len(tile_count, TILE_BYTES)?)?;

        let features = read_features(handle, feature_entry_offset, feature_count)?;

        handle.seek_to(minimap_offset);
        let minimap = MinimapImage::read(handle)?;

        Ok(Self {
            map_size,
            sea_level,
            tile_count,
            tiles,
            tile_indices,
            height_map,
            feature_map,
            features,
            minimap,
        })
    }

    /// Size of the tile grid, half the map size in each direction
    pub fn tile_grid(&self) -> Size2 {
        tile_grid(self.map_size)
    }

    /// Pixels of tile `index`
    pub fn tile(&self, index: usize) -> Option<&[u8]> {
        if index >= self.tile_count {
            return None;
        }
        self.tiles.get(index * TILE_BYTES..(index + 1) * TILE_BYTES)
    }

    /// Pixels of the tile drawn at grid position `(column, row)`
    pub fn tile_at(&self, column: usize, row: usize) -> Option<&[u8]> {
        let grid = self.tile_grid();
        if column >= grid.width || row >= grid.height {
            return None;
        }
        let index = *self.tile_indices.get(row * grid.width + column)?;
        self.tile(index as usize)
    }

    /// Paint every tile into one paletted image of the whole map
    ///
    /// Grid cells naming a missing tile stay zero.
    pub fn compose(&self) -> (Size2, Vec<u8>) {
        let grid = self.tile_grid();
        let size = Size2::new(grid.width * TILE_PIXELS, grid.height * TILE_PIXELS);
        let mut image = vec![0u8; size.area()];

        for row in 0..grid.height {
            for column in 0..grid.width {
                let Some(tile) = self.tile_at(column, row) else {
                    continue;
                };
                for (line, pixels) in tile.chunks_exact(TILE_PIXELS).enumerate() {
                    let start = (row * TILE_PIXELS + line) * size.width + column * TILE_PIXELS;
                    image[start..start + TILE_PIXELS].copy_from_slice(pixels);
                }
            }
        }

        (size, image)
    }
}

/// Location of a Kingdoms ground tile inside an external image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TakTile {
    /// Identifier of the source image
    pub name: u32,
    /// Tile column within the source image
    pub column: u32,
    /// Tile row within the source image
    pub row: u32,
}

/// Kingdoms terrain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakMapModel {
    /// Size in map units
    pub map_size: Size2,
    /// Height below which terrain is under water
    pub sea_level: u32,
    /// Elevation per map unit
    pub height_map: Vec<u8>,
    /// Feature index per map unit
    pub feature_map: Vec<Option<usize>>,
    /// Feature names in declaration order
    pub features: Vec<String>,
    /// Source image per 2x2 map units
    pub tile_names: Vec<u32>,
    /// Source tile column per 2x2 map units
    pub tile_columns: Vec<u32>,
    /// Source tile row per 2x2 map units
    pub tile_rows: Vec<u32>,
    /// Small overview image
    pub small_minimap: MinimapImage,
    /// Large overview image
    pub large_minimap: MinimapImage,
}

impl TakMapModel {
    pub(super) fn read<R: FileRead + ?Sized>(handle: &mut R, map_size: Size2) -> Result<Self> {
        let header = handle.read_data_verifying(TAK_HEADER_SIZE)?;
        let mut fields = ByteReader::new(&header);
        let sea_level = fields.u32()?;
        let height_map_offset = fields.u32()? as usize;
        let feature_spot_offset = fields.u32()? as usize;
        let feature_entry_offset = fields.u32()? as usize;
        let feature_count = fields.u32()? as usize;
        let tile_name_offset = fields.u32()? as usize;
        let tile_column_offset = fields.u32()? as usize;
        let tile_row_offset = fields.u32()? as usize;
        let small_minimap_offset = fields.u32()? as usize;
        let large_minimap_offset = fields.u32()? as usize;

        handle.seek_to(height_map_offset);
        let height_map = handle.read_data_verifying(map_size.area())?;

        handle.seek_to(feature_spot_offset);
        let feature_map = handle
            .read_u32_array(map_size.area())?
            .into_iter()
            .map(|spot| feature_slot(spot, feature_count))
            .collect();

        let features = read_features(handle, feature_entry_offset, feature_count)?;

        let cells = tile_grid(map_size).area();
        let mut tile_array = |offset: usize| {
            handle.seek_to(offset);
            handle.read_u32_array(cells)
        };
        let tile_names = tile_array(tile_name_offset)?;
        let tile_columns = tile_array(tile_column_offset)?;
        let tile_rows = tile_array(tile_row_offset)?;

        handle.seek_to(large_minimap_offset);
        let large_minimap = MinimapImage::read(handle)?;
        handle.seek_to(small_minimap_offset);
        let small_minimap = MinimapImage::read(handle)?;

        Ok(Self {
            map_size,
            sea_level,
            height_map,
            feature_map,
            features,
            tile_names,
            tile_columns,
            tile_rows,
            small_minimap,
            large_minimap,
        })
    }

    /// Size of the tile grid, half the map size in each direction
    pub fn tile_grid(&self) -> Size2 {
        tile_grid(self.map_size)
    }

    /// Source of the tile drawn at grid position `(column, row)`
    pub fn tile_at(&self, column: usize, row: usize) -> Option<TakTile> {
        let grid = self.tile_grid();
        if column >= grid.width || row >= grid.height {
            return None;
        }
        let index = row * grid.width + column;
        Some(TakTile {
            name: *self.tile_names.get(index)?,
            column: *self.tile_columns.get(index)?,
            row: *self.tile_rows.get(index)?,
        })
    }
}

fn tile_grid(map_size: Size2) -> Size2 {
    Size2::new(map_size.width / 2, map_size.height / 2)
}

fn byte_len(count: usize, item: usize) -> Result<usize> {
    count
        .checked_mul(item)
        .ok_or_else(|| ForgeError::InvalidData(format!("{count} entries of {item} bytes")))
}

/// Values outside the feature table mark open ground or void
fn feature_slot(value: u32, feature_count: usize) -> Option<usize> {
    let slot = value as usize;
    (slot < feature_count).then_some(slot)
}

fn read_features<R: FileRead + ?Sized>(
    handle: &mut R,
    offset: usize,
    count: usize,
) -> Result<Vec<String>> {
    handle.seek_to(offset);
    let entries = handle.read_data_verifying(byte_len(count, FEATURE_ENTRY_SIZE)?)?;

    Ok(entries
        .chunks_exact(FEATURE_ENTRY_SIZE)
        .enumerate()
        .map(|(position, entry)| {
            let index = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let name = c_string_field(&entry[4..]);
            if index as usize != position {
                trace!("Feature {} listed at {} carries index {}", name, position, index);
            }
            name
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_tiles(tile_indices: Vec<u16>, tile_count: usize) -> TaMapModel {
        TaMapModel {
            map_size: Size2::new(4, 2),
            sea_level: 0,
            tile_count,
            tiles: (0..tile_count).flat_map(|t| vec![t as u8 + 1; TILE_BYTES]).collect(),
            tile_indices,
            height_map: vec![0; 8],
            feature_map: vec![None; 8],
            features: Vec::new(),
            minimap: MinimapImage::default(),
        }
    }

    #[test]
    fn test_compose_places_tiles() {
        let model = model_with_tiles(vec![1, 7], 2);
        let (size, image) = model.compose();

        assert_eq!(size, Size2::new(64, 32));
        assert_eq!(image[0], 2);
        assert_eq!(image[31 * 64 + 31], 2);
        // Index 7 names no tile; its cell stays blank
        assert_eq!(image[32], 0);
        assert_eq!(image[31 * 64 + 63], 0);
    }

    #[test]
    fn test_feature_slot_bounds() {
        assert_eq!(feature_slot(0, 3), Some(0));
        assert_eq!(feature_slot(2, 3), Some(2));
        assert_eq!(feature_slot(3, 3), None);
        assert_eq!(feature_slot(0xFFFF, 3), None);
        assert_eq!(feature_slot(0, 0), None);
    }

    #[test]
    fn test_tile_grid_rounds_down() {
        assert_eq!(tile_grid(Size2::new(5, 3)), Size2::new(2, 1));
        assert!(byte_len(usize::MAX, 2).is_err());
    }
}
