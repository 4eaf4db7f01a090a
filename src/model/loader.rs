//! Object record parsing and tree flattening

use super::{ModelTable, Piece, Primitive, Texture, OBJECT_RECORD_SIZE, PRIMITIVE_RECORD_SIZE};
use crate::{c_string_at, ByteReader, ForgeError, Result, Vector3};
use log::{debug, trace, warn};
use std::collections::{HashSet, VecDeque};

const VERTEX_SIZE: usize = 12;

/// Fixed-size object record
#[derive(Debug, Clone, Copy)]
struct ObjectRecord {
    vertex_count: u32,
    primitive_count: u32,
    ground_plate_index: i32,
    x_from_parent: i32,
    y_from_parent: i32,
    z_from_parent: i32,
    name_offset: u32,
    vertex_array_offset: u32,
    primitive_array_offset: u32,
    sibling_offset: u32,
    child_offset: u32,
}

impl ObjectRecord {
    fn read(data: &[u8], offset: usize) -> Result<Self> {
        let mut reader = ByteReader::at(data, offset)?;
        let record = reader.take(OBJECT_RECORD_SIZE)?;
        let mut fields = ByteReader::new(record);

        let _version = fields.u32()?;
        let vertex_count = fields.u32()?;
        let primitive_count = fields.u32()?;
        let ground_plate_index = fields.i32()?;
        let x_from_parent = fields.i32()?;
        let y_from_parent = fields.i32()?;
        let z_from_parent = fields.i32()?;
        let name_offset = fields.u32()?;
        let _unknown = fields.u32()?;
        let vertex_array_offset = fields.u32()?;
        let primitive_array_offset = fields.u32()?;
        let sibling_offset = fields.u32()?;
        let child_offset = fields.u32()?;

        Ok(Self {
            vertex_count,
            primitive_count,
            ground_plate_index,
            x_from_parent,
            y_from_parent,
            z_from_parent,
            name_offset,
            vertex_array_offset,
            primitive_array_offset,
            sibling_offset,
            child_offset,
        })
    }

    fn offset_from_parent(&self) -> Vector3 {
        Vector3::from_fixed(self.x_from_parent, self.y_from_parent, self.z_from_parent)
    }
}

/// Fixed-size primitive record
#[derive(Debug, Clone, Copy)]
struct PrimitiveRecord {
    color: u32,
    index_count: u32,
    index_array_offset: u32,
    texture_name_offset: u32,
}

impl PrimitiveRecord {
    fn read(data: &[u8], offset: usize) -> Result<Self> {
        let mut reader = ByteReader::at(data, offset)?;
        let mut fields = ByteReader::new(reader.take(PRIMITIVE_RECORD_SIZE)?);

        let color = fields.u32()?;
        let index_count = fields.u32()?;
        let _unknown = fields.u32()?;
        let index_array_offset = fields.u32()?;
        let texture_name_offset = fields.u32()?;

        Ok(Self {
            color,
            index_count,
            index_array_offset,
            texture_name_offset,
        })
    }

    fn texture(&self, data: &[u8]) -> Result<Texture> {
        if self.texture_name_offset != 0 {
            Ok(Texture::Image(c_string_at(data, self.texture_name_offset as usize)?))
        } else {
            Ok(Texture::Color(self.color))
        }
    }
}

#[derive(Debug, Default)]
struct Counts {
    pieces: usize,
    primitives: usize,
    vertices: usize,
}

fn cycle_error(offset: usize) -> ForgeError {
    ForgeError::InvalidData(format!("object at {offset:#x} is part of a cycle"))
}

/// Walk the whole tree once to size the output arrays
fn count_objects(data: &[u8], start: usize) -> Result<Counts> {
    let mut counts = Counts::default();
    let mut pending = vec![start];
    let mut seen = HashSet::new();

    while let Some(offset) = pending.pop() {
        if !seen.insert(offset) {
            return Err(cycle_error(offset));
        }
        let object = ObjectRecord::read(data, offset)?;
        counts.pieces += 1;
        counts.primitives += object.primitive_count as usize;
        counts.vertices += object.vertex_count as usize;

        if object.sibling_offset != 0 {
            pending.push(object.sibling_offset as usize);
        }
        if object.child_offset != 0 {
            pending.push(object.child_offset as usize);
        }
    }

    Ok(counts)
}

/// Offsets of the object at `start` and all its following siblings
fn sibling_offsets(data: &[u8], start: usize) -> Result<Vec<usize>> {
    let mut offsets = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = start;

    loop {
        if !seen.insert(offset) {
            return Err(cycle_error(offset));
        }
        offsets.push(offset);
        let object = ObjectRecord::read(data, offset)?;
        if object.sibling_offset == 0 {
            break;
        }
        offset = object.sibling_offset as usize;
    }

    Ok(offsets)
}

fn read_vertices(data: &[u8], object: &ObjectRecord, out: &mut Vec<Vector3>) -> Result<()> {
    let mut reader = ByteReader::at(data, object.vertex_array_offset as usize)?;
    for _ in 0..object.vertex_count {
        let x = reader.i32()?;
        let y = reader.i32()?;
        let z = reader.i32()?;
        out.push(Vector3::from_fixed(x, y, z));
    }
    Ok(())
}

fn intern_texture(textures: &mut Vec<Texture>, texture: Texture) -> usize {
    match textures.iter().position(|known| *known == texture) {
        Some(index) => index,
        None => {
            textures.push(texture);
            textures.len() - 1
        }
    }
}

/// Flatten the object tree rooted at offset 0
pub(super) fn load_model(data: &[u8]) -> Result<ModelTable> {
    let counts = count_objects(data, 0)?;
    let mut model = ModelTable::default();
    // Counts come from the file, so never reserve beyond what it could hold
    model.pieces.reserve(counts.pieces.min(data.len() / OBJECT_RECORD_SIZE));
    model.primitives.reserve(counts.primitives.min(data.len() / PRIMITIVE_RECORD_SIZE));
    model.vertices.reserve(counts.vertices.min(data.len() / VERTEX_SIZE));

    let mut queue: VecDeque<usize> = sibling_offsets(data, 0)?.into();
    model.roots = (0..queue.len()).collect();
    let mut visited = HashSet::new();

    while let Some(offset) = queue.pop_front() {
        if !visited.insert(offset) {
            return Err(cycle_error(offset));
        }
        let object = ObjectRecord::read(data, offset)?;

        let vertices_start = model.vertices.len();
        read_vertices(data, &object, &mut model.vertices)?;

        let primitives_start = model.primitives.len();
        for i in 0..object.primitive_count as usize {
            let record_offset = object.primitive_array_offset as usize + i * PRIMITIVE_RECORD_SIZE;
            let raw = PrimitiveRecord::read(data, record_offset)?;
            let texture = intern_texture(&mut model.textures, raw.texture(data)?);

            let mut reader = ByteReader::at(data, raw.index_array_offset as usize)?;
            let indices = (0..raw.index_count)
                .map(|_| -> Result<usize> { Ok(reader.u16()? as usize + vertices_start) })
                .collect::<Result<Vec<_>>>()?;
            model.primitives.push(Primitive { texture, indices });
        }

        let child_offsets = if object.child_offset != 0 {
            sibling_offsets(data, object.child_offset as usize)?
        } else {
            Vec::new()
        };
        // Children land after this piece and everything already queued
        let children_start = model.pieces.len() + 1 + queue.len();
        queue.extend(&child_offsets);

        if object.ground_plate_index >= 0 {
            let claimed = primitives_start + object.ground_plate_index as usize;
            match model.ground_plate {
                None => model.ground_plate = Some(claimed),
                Some(existing) => warn!(
                    "Ground plate already assigned to primitive {}; ignoring primitive {}",
                    existing, claimed
                ),
            }
        }

        let name = c_string_at(data, object.name_offset as usize)?;
        trace!(
            "Piece {} '{}' with {} primitives and {} children",
            model.pieces.len(),
            name,
            object.primitive_count,
            child_offsets.len()
        );
        model
            .name_lookup
            .entry(name.to_ascii_lowercase())
            .or_insert(model.pieces.len());
        model.pieces.push(Piece {
            name,
            offset: object.offset_from_parent(),
            primitives: (primitives_start..model.primitives.len()).collect(),
            children: (children_start..children_start + child_offsets.len()).collect(),
        });
    }

    if model.ground_plate.is_none() {
        debug!("Model has no ground plate");
    }

    Ok(model)
}
