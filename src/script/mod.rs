//! COB unit script decoder and virtual machine
//!
//! A compiled script is a flat array of 32-bit code words shared by a set of
//! named modules. [`Script::load`] decodes the file; a [`Context`] binds a
//! script to a model and runs its cooperative threads one tick at a time.
//!
//! Piece movement is two-phase: instructions register [`Animation`]s and
//! [`Context::apply_animations`] integrates them once per tick.
//!
//! ```no_run
//! use taforge::{Context, ModelTable, Script};
//! use taforge::model::UnitInstance;
//! use taforge::script::ScriptMachine;
//!
//! struct Clock(f64);
//!
//! impl ScriptMachine for Clock {
//!     fn time(&self) -> f64 {
//!         self.0
//!     }
//! }
//!
//! # fn main() -> taforge::Result<()> {
//! # let (script, model): (Script, ModelTable) = unimplemented!();
//! let mut instance = UnitInstance::new(&model);
//! let mut context = Context::new(script, &model)?;
//! context.start_script("Create", &[]);
//!
//! let mut clock = Clock(0.0);
//! for _ in 0..60 {
//!     context.run(&instance, &mut clock);
//!     context.apply_animations(&mut instance, 1.0 / 30.0);
//!     clock.0 += 1.0 / 30.0;
//! }
//! # Ok(())
//! # }
//! ```

mod animation;
mod instructions;
mod opcode;
mod vm;

pub use animation::{
    Animation, PieceFlag, RotationAnimation, SetAngle, SetPosition, SpinAnimation,
    TranslationAnimation,
};
pub use opcode::Opcode;
pub use vm::{
    Context, ExecutionError, ScriptMachine, StepResult, Thread, ThreadStatus, MAX_STEPS_PER_SLICE,
};

use crate::vfs::FileRead;
use crate::{c_string_at, ByteReader, ForgeError, Result, ANGULAR_CONSTANT, LINEAR_CONSTANT};
use log::debug;
use std::fmt;

/// Size of the script file header
pub const SCRIPT_HEADER_SIZE: usize = 13 * 4;

/// Header version of Total Annihilation scripts
pub const SCRIPT_VERSION_TA: u32 = 4;

/// Header version of Kingdoms scripts
pub const SCRIPT_VERSION_KINGDOMS: u32 = 6;

/// Convert a raw stack value to model units
pub fn as_linear(raw: i32) -> f64 {
    raw as f64 / LINEAR_CONSTANT
}

/// Convert a raw stack value to degrees
pub fn as_angular(raw: i32) -> f64 {
    raw as f64 / ANGULAR_CONSTANT
}

/// Axis operand of piece instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// X axis
    X = 0,
    /// Y axis
    Y = 1,
    /// Z axis
    Z = 2,
}

impl Axis {
    /// Map a raw axis operand
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Axis::X),
            1 => Some(Axis::Y),
            2 => Some(Axis::Z),
            _ => None,
        }
    }
}

/// A named entry point into the code array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Word index of the first instruction
    pub offset: usize,
    /// Number of local slots, counted from the leading stack-allocate words
    pub local_count: usize,
}

/// Raw header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptHeader {
    /// Format version
    pub version: u32,
    /// Number of modules
    pub module_count: u32,
    /// Number of piece names
    pub piece_count: u32,
    /// Length of the code array in words
    pub code_length: u32,
    /// Number of static variables
    pub static_count: u32,
    /// Unused, always zero
    pub always_zero: u32,
    /// Offset of the module word-offset array
    pub module_offsets_offset: u32,
    /// Offset of the module name offset array
    pub module_names_offset: u32,
    /// Offset of the piece name offset array
    pub piece_names_offset: u32,
    /// Offset of the code array
    pub code_offset: u32,
    /// Offset of the string pool
    pub names_offset: u32,
    /// Offset of the sound name offset array
    pub sound_names_offset: u32,
    /// Number of sound names
    pub sound_count: u32,
}

impl ScriptHeader {
    /// Parse the fixed header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        Ok(Self {
            version: r.u32()?,
            module_count: r.u32()?,
            piece_count: r.u32()?,
            code_length: r.u32()?,
            static_count: r.u32()?,
            always_zero: r.u32()?,
            module_offsets_offset: r.u32()?,
            module_names_offset: r.u32()?,
            piece_names_offset: r.u32()?,
            code_offset: r.u32()?,
            names_offset: r.u32()?,
            sound_names_offset: r.u32()?,
            sound_count: r.u32()?,
        })
    }
}

/// A decoded unit script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    /// Header version
    pub version: u32,
    /// Modules in file order
    pub modules: Vec<Module>,
    /// Code words
    pub code: Vec<i32>,
    /// Number of static variables
    pub static_count: usize,
    /// Piece names referenced by piece operands
    pub pieces: Vec<String>,
    /// Sound names referenced by play-sound operands
    pub sounds: Vec<String>,
}

impl Script {
    /// Decode a script file
    pub fn load<R: FileRead + ?Sized>(handle: &mut R) -> Result<Self> {
        handle.seek_to(0);
        let data = handle.read_to_end_data()?;
        let script = Self::from_bytes(&data)?;
        debug!(
            "Loaded script {} with {} modules and {} pieces",
            handle.file_name(),
            script.modules.len(),
            script.pieces.len()
        );
        Ok(script)
    }

    /// Decode a script from its raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = ScriptHeader::parse(data)?;

        let code_bytes = ByteReader::at(data, header.code_offset as usize)?.take(
            (header.code_length as usize)
                .checked_mul(4)
                .ok_or(ForgeError::UnexpectedEof)?,
        )?;
        let code: Vec<i32> = code_bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let offsets = ByteReader::at(data, header.module_offsets_offset as usize)?
            .u32_array(header.module_count as usize)?;
        let names = collect_strings(data, header.module_names_offset, header.module_count)?;
        let modules = names
            .into_iter()
            .zip(offsets)
            .map(|(name, offset)| {
                let offset = offset as usize;
                Module {
                    name,
                    offset,
                    local_count: count_locals(&code, offset),
                }
            })
            .collect();

        let pieces = collect_strings(data, header.piece_names_offset, header.piece_count)?;
        let sounds = if header.sound_count > 0 {
            collect_strings(data, header.sound_names_offset, header.sound_count)?
        } else {
            Vec::new()
        };

        Ok(Self {
            version: header.version,
            modules,
            code,
            static_count: header.static_count as usize,
            pieces,
            sounds,
        })
    }

    /// Index of the module with the given name, ignoring ASCII case
    pub fn module_index(&self, name: &str) -> Option<usize> {
        self.modules
            .iter()
            .position(|module| module.name.eq_ignore_ascii_case(name))
    }

    /// Find a module by name, ignoring ASCII case
    pub fn module_named(&self, name: &str) -> Option<&Module> {
        self.module_index(name).map(|index| &self.modules[index])
    }

    /// Code range owned by module `index`: up to the next module or the end of code
    fn module_range(&self, index: usize) -> Option<std::ops::Range<usize>> {
        let start = self.modules.get(index)?.offset.min(self.code.len());
        let end = self
            .modules
            .iter()
            .map(|module| module.offset)
            .filter(|&offset| offset > start)
            .min()
            .unwrap_or(self.code.len())
            .min(self.code.len());
        Some(start..end)
    }

    /// Decode the instructions of module `index`
    pub fn disassemble(&self, index: usize) -> Result<Vec<Disassembled>> {
        let range = self.module_range(index).ok_or_else(|| {
            ForgeError::InvalidData(format!(
                "module {} out of range ({} modules)",
                index,
                self.modules.len()
            ))
        })?;

        let mut out = Vec::new();
        let mut pc = range.start;
        while pc < range.end {
            let raw = self.code[pc];
            let opcode = Opcode::from_raw(raw);
            let width = opcode.map_or(1, Opcode::width);
            let end = (pc + width).min(self.code.len());
            out.push(Disassembled {
                offset: pc,
                raw,
                opcode,
                operands: self.code[pc + 1..end].to_vec(),
            });
            pc += width;
        }
        Ok(out)
    }
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembled {
    /// Word index of the opcode
    pub offset: usize,
    /// Raw opcode word
    pub raw: i32,
    /// Decoded opcode, if known
    pub opcode: Option<Opcode>,
    /// Immediate operands
    pub operands: Vec<i32>,
}

impl fmt::Display for Disassembled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:6}: ", self.offset)?;
        match self.opcode {
            Some(op) => write!(f, "{op}")?,
            None => write!(f, ".word {:#010x}", self.raw)?,
        }
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

fn collect_strings(data: &[u8], offset: u32, count: u32) -> Result<Vec<String>> {
    ByteReader::at(data, offset as usize)?
        .u32_array(count as usize)?
        .into_iter()
        .map(|name_offset| c_string_at(data, name_offset as usize))
        .collect()
}

fn count_locals(code: &[i32], offset: usize) -> usize {
    code.get(offset..)
        .unwrap_or_default()
        .iter()
        .take_while(|&&word| word == Opcode::StackAllocate.raw())
        .count()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Assemble a script file from modules of raw code words
    pub(crate) fn build_script(
        modules: &[(&str, Vec<i32>)],
        pieces: &[&str],
        statics: u32,
    ) -> Vec<u8> {
        let mut code = Vec::new();
        let mut offsets = Vec::new();
        for (_, words) in modules {
            offsets.push(code.len() as u32);
            code.extend_from_slice(words);
        }

        let code_offset = SCRIPT_HEADER_SIZE as u32;
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
            SCRIPT_VERSION_TA,
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

    const ALLOC: i32 = 0x10022000;
    const RETURN: i32 = 0x10065000;
    const PUSH: i32 = 0x10021001;

    #[test]
    fn test_load_script() {
        let bytes = build_script(
            &[
                ("Create", vec![ALLOC, ALLOC, PUSH, 0, RETURN]),
                ("Killed", vec![PUSH, 1, RETURN]),
            ],
            &["base", "turret"],
            3,
        );
        let script = Script::from_bytes(&bytes).unwrap();

        assert_eq!(script.version, SCRIPT_VERSION_TA);
        assert_eq!(script.code.len(), 8);
        assert_eq!(script.static_count, 3);
        assert_eq!(script.pieces, ["base", "turret"]);
        assert_eq!(script.modules[0].local_count, 2);
        assert_eq!(script.modules[1].offset, 5);
        assert_eq!(script.modules[1].local_count, 0);
        assert_eq!(script.module_index("killed"), Some(1));
        assert!(script.module_named("Activate").is_none());
    }

    #[test]
    fn test_disassemble() {
        let bytes = build_script(
            &[
                ("Create", vec![ALLOC, PUSH, 7, 0x12345678, RETURN]),
                ("Other", vec![RETURN]),
            ],
            &[],
            0,
        );
        let script = Script::from_bytes(&bytes).unwrap();
        let lines = script.disassemble(0).unwrap();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].opcode, Some(Opcode::PushConstant));
        assert_eq!(lines[1].operands, [7]);
        assert_eq!(lines[2].opcode, None);
        assert_eq!(lines[2].to_string(), "     3: .word 0x12345678");
        assert_eq!(lines[3].to_string(), "     4: return");
        assert!(script.disassemble(5).is_err());
    }

    #[test]
    fn test_truncated_script() {
        let bytes = build_script(&[("Create", vec![RETURN])], &["base"], 0);
        assert!(matches!(
            Script::from_bytes(&bytes[..20]),
            Err(ForgeError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(as_linear(65536 * 3), 3.0);
        assert_eq!(as_angular(182 * 90), 90.0);
        assert_eq!(Axis::from_raw(2), Some(Axis::Z));
        assert_eq!(Axis::from_raw(3), None);
    }
}
