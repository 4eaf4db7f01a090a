//! Synthetic game data shared by the integration tests

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Wrap a payload in an SQSH chunk header
pub fn chunk(stored: &[u8], kind: u8, decompressed_size: usize) -> Vec<u8> {
    let checksum = stored.iter().fold(0u32, |a, &b| a.wrapping_add(b as u32));
    let mut out = Vec::new();
    out.extend_from_slice(b"SQSH");
    out.push(2);
    out.push(kind);
    out.push(0);
    out.extend_from_slice(&(stored.len() as u32).to_le_bytes());
    out.extend_from_slice(&(decompressed_size as u32).to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(stored);
    out
}

/// A zlib chunk holding `plain`
pub fn zlib_chunk(plain: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plain).expect("in-memory write");
    chunk(&encoder.finish().expect("in-memory write"), 2, plain.len())
}

#[derive(Default)]
struct Dir {
    name: String,
    dirs: Vec<Dir>,
    files: Vec<(String, Vec<u8>, bool)>,
}

impl Dir {
    fn subdir(&mut self, name: &str) -> &mut Dir {
        let index = match self.dirs.iter().position(|d| d.name == name) {
            Some(index) => index,
            None => {
                self.dirs.push(Dir {
                    name: name.to_string(),
                    ..Dir::default()
                });
                self.dirs.len() - 1
            }
        };
        &mut self.dirs[index]
    }
}

/// Builder for second generation archives
#[derive(Default)]
pub struct ArchiveBuilder {
    root: Dir,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stored file at a `/`-separated path
    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.insert(path, data, false);
        self
    }

    /// Add a zlib-compressed file at a `/`-separated path
    pub fn compressed(mut self, path: &str, data: &[u8]) -> Self {
        self.insert(path, data, true);
        self
    }

    fn insert(&mut self, path: &str, data: &[u8], compress: bool) {
        let mut parts: Vec<&str> = path.split('/').collect();
        let name = parts.pop().unwrap_or_default();
        let mut dir = &mut self.root;
        for part in parts {
            dir = dir.subdir(part);
        }
        dir.files.push((name.to_string(), data.to_vec(), compress));
    }

    /// Serialize the archive
    pub fn build(&self) -> Vec<u8> {
        const HEADER_SIZE: u32 = 32;

        let mut data = Vec::new();
        let mut names = vec![0u8];
        let mut directory = vec![0u8; 20];
        emit(&self.root, 0, HEADER_SIZE, &mut directory, &mut names, &mut data);

        let dir_at = HEADER_SIZE + data.len() as u32;
        let names_at = dir_at + directory.len() as u32;

        let mut out = Vec::new();
        out.extend_from_slice(b"HAPI");
        out.extend_from_slice(&0x0002_0000u32.to_le_bytes());
        for v in [
            dir_at,
            directory.len() as u32,
            names_at,
            names.len() as u32,
            HEADER_SIZE,
            0,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend(data);
        out.extend(directory);
        out.extend(names);
        out
    }

    /// Serialize the archive into `dir/name`
    pub fn write_to(&self, dir: &Path, name: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, self.build())?;
        Ok(path)
    }
}

fn put(table: &mut [u8], at: usize, fields: &[u32]) {
    for (i, field) in fields.iter().enumerate() {
        table[at + i * 4..at + i * 4 + 4].copy_from_slice(&field.to_le_bytes());
    }
}

fn intern(names: &mut Vec<u8>, name: &str) -> u32 {
    let at = names.len() as u32;
    names.extend_from_slice(name.as_bytes());
    names.push(0);
    at
}

/// Write the record of `dir` at `record_at` plus everything below it
fn emit(
    dir: &Dir,
    record_at: usize,
    data_base: u32,
    directory: &mut Vec<u8>,
    names: &mut Vec<u8>,
    data: &mut Vec<u8>,
) {
    let subdir_array = directory.len();
    directory.resize(subdir_array + dir.dirs.len() * 20, 0);
    let file_array = directory.len();
    directory.resize(file_array + dir.files.len() * 24, 0);

    let name_offset = if dir.name.is_empty() {
        0
    } else {
        intern(names, &dir.name)
    };
    put(
        directory,
        record_at,
        &[
            name_offset,
            subdir_array as u32,
            dir.dirs.len() as u32,
            file_array as u32,
            dir.files.len() as u32,
        ],
    );

    for (i, (name, plain, compress)) in dir.files.iter().enumerate() {
        let offset = data_base + data.len() as u32;
        let compressed_size = if *compress {
            let packed = zlib_chunk(plain);
            data.extend_from_slice(&packed);
            packed.len() as u32
        } else {
            data.extend_from_slice(plain);
            0
        };
        let name_offset = intern(names, name);
        put(
            directory,
            file_array + i * 24,
            &[name_offset, offset, plain.len() as u32, compressed_size, 0, 0],
        );
    }

    for (i, sub) in dir.dirs.iter().enumerate() {
        emit(sub, subdir_array + i * 20, data_base, directory, names, data);
    }
}

/// Compiled script with the given modules, piece names and static count
pub fn script_bytes(modules: &[(&str, Vec<i32>)], pieces: &[&str], statics: u32) -> Vec<u8> {
    let mut code = Vec::new();
    let mut offsets = Vec::new();
    for (_, words) in modules {
        offsets.push(code.len() as u32);
        code.extend_from_slice(words);
    }

    let code_offset = 52u32;
    let module_offsets_offset = code_offset + code.len() as u32 * 4;
    let module_names_offset = module_offsets_offset + modules.len() as u32 * 4;
    let piece_names_offset = module_names_offset + modules.len() as u32 * 4;
    let names_offset = piece_names_offset + pieces.len() as u32 * 4;

    let mut pool = Vec::new();
    let mut name_offsets = Vec::new();
    for name in modules.iter().map(|(name, _)| *name).chain(pieces.iter().copied()) {
        name_offsets.push(names_offset + pool.len() as u32);
        pool.extend_from_slice(name.as_bytes());
        pool.push(0);
    }

    let header = [
        4,
        modules.len() as u32,
        pieces.len() as u32,
        code.len() as u32,
        statics,
        0,
        module_offsets_offset,
        module_names_offset,
        piece_names_offset,
        code_offset,
        names_offset,
        0,
        0,
    ];

    let mut out = Vec::new();
    for field in header {
        out.extend_from_slice(&field.to_le_bytes());
    }
    for word in &code {
        out.extend_from_slice(&word.to_le_bytes());
    }
    for offset in offsets.iter().chain(&name_offsets) {
        out.extend_from_slice(&offset.to_le_bytes());
    }
    out.extend(pool);
    out
}

/// Geometry-free model; each entry is `(name, sibling, child)` by record index
pub fn model_bytes(objects: &[(&str, Option<usize>, Option<usize>)]) -> Vec<u8> {
    const RECORD_SIZE: usize = 52;
    let base = objects.len() * RECORD_SIZE;
    let mut records = Vec::new();
    let mut tail = Vec::new();

    for (name, sibling, child) in objects {
        let name_offset = (base + tail.len()) as u32;
        tail.extend_from_slice(name.as_bytes());
        tail.push(0);

        let link = |i: &Option<usize>| i.map_or(0, |i| (i * RECORD_SIZE) as u32);
        let fields: [u32; 13] = [
            1,
            0,
            0,
            u32::MAX,
            0,
            0,
            0,
            name_offset,
            0,
            0,
            0,
            link(sibling),
            link(child),
        ];
        for field in fields {
            records.extend_from_slice(&field.to_le_bytes());
        }
    }

    records.extend(tail);
    records
}

/// A `key=value;` TDF document with a single section
pub fn tdf_section(name: &str, pairs: &[(&str, &str)]) -> String {
    let mut text = format!("[{name}]\r\n\t{{\r\n");
    for (key, value) in pairs {
        text.push_str(&format!("\t{key}={value};\r\n"));
    }
    text.push_str("\t}\r\n");
    text
}

/// A TA terrain file with one 32x32 tile and `features` placed left to
/// right along the top row of map units
pub fn tnt_bytes(width: u32, height: u32, features: &[&str]) -> Vec<u8> {
    let grid = (width / 2) * (height / 2);
    let units = width * height;
    let index_offset = 12 + 52;
    let info_offset = index_offset + 2 * grid;
    let tiles_offset = info_offset + 4 * units;
    let features_offset = tiles_offset + 1024;
    let minimap_offset = features_offset + 132 * features.len() as u32;

    let mut out = Vec::new();
    let header = [
        0x2000,
        width,
        height,
        index_offset,
        info_offset,
        tiles_offset,
        1,
        features.len() as u32,
        features_offset,
        16,
        minimap_offset,
        1,
    ];
    for field in header {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&[0u8; 16]);

    out.extend(std::iter::repeat([0u8, 0]).take(grid as usize).flatten());
    for unit in 0..units {
        let special = if unit < features.len() as u32 { unit } else { 0xFFFF };
        out.extend_from_slice(&((unit & 0xFF) | (special << 8)).to_le_bytes());
    }
    out.extend(std::iter::repeat(1u8).take(1024));
    for (index, name) in features.iter().enumerate() {
        out.extend_from_slice(&(index as u32).to_le_bytes());
        let mut field = [0u8; 128];
        field[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&field);
    }
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&[7u8; 4]);
    out
}

/// A 1x1 uncompressed PCX whose trailing palette is all `gray`
pub fn pcx_bytes(gray: u8) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out[0] = 0x0A;
    out[1] = 5;
    out[3] = 8;
    out[65] = 1;
    out[66..68].copy_from_slice(&1u16.to_le_bytes());
    out.push(0);
    out.push(0x0C);
    out.extend(std::iter::repeat(gray).take(768));
    out
}
