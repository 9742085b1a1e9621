//! Compiled output: the type array, the side tables, and the text form.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use log::debug;
use serde::Serialize;

use crate::error::Error;
use crate::opcode::{StructFlags, TypeOp};

use super::ModuleKind;

/// Bumped whenever the meaning of any slot or table column changes.
pub const FORMAT_VERSION: &str = "0x2601";

/// One slot of the type array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OpSlot {
    Op(TypeOp),
    /// `PRIMITIVE` whose index only an external build step can supply, from
    /// a `typedef int... name` declaration.
    UnknownPrim { name: String },
    /// Trailing length slot of an `ARRAY`.
    Len(LenSlot),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LenSlot {
    Fixed(u64),
    /// Measured off the named global array variable.
    Global(String),
    /// Measured off a field of the dense-indexed struct/union.
    Field { struct_index: u32, field: String },
}

impl fmt::Display for OpSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpSlot::Op(op) => op.fmt(f),
            OpSlot::UnknownPrim { name } => write!(f, "PRIMITIVE int_size({name})"),
            OpSlot::Len(LenSlot::Fixed(n)) => write!(f, "LEN {n}"),
            OpSlot::Len(LenSlot::Global(name)) => write!(f, "LEN array_len({name})"),
            OpSlot::Len(LenSlot::Field {
                struct_index,
                field,
            }) => write!(f, "LEN field_len({struct_index}.{field})"),
        }
    }
}

/// Functions, constants, macros, enum members and variables all land here,
/// distinguished by their operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalEntry {
    pub name: String,
    pub op: TypeOp,
    /// Size hint for variables whose type the compiler could measure.
    pub size: Option<u64>,
    /// Declared value to verify against the native one, for macros and enum
    /// members.
    pub check_value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldEntry {
    /// Empty for unnamed bit-field padding.
    pub name: String,
    /// `NOOP type-slot`, or `BITFIELD type-slot` for bit-fields.
    pub op: TypeOp,
    /// Byte offset inside the owning record; `None` when only an external
    /// build step can know it.
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub bit_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructUnionEntry {
    pub name: String,
    /// Primary slot of the record type in the type array.
    pub type_index: u32,
    pub flags: StructFlags,
    pub size: Option<u64>,
    pub align: Option<u64>,
    /// Index of the first entry in the field table, -1 when no fields were
    /// emitted at all.
    pub first_field_index: i32,
    pub field_count: u32,
    /// "opaque", "external" or "unnamed".
    pub comment: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumEntry {
    pub name: String,
    pub type_index: u32,
    /// Storage size and signedness of the synthesized base integer.
    pub size: u64,
    pub signed: bool,
    /// Comma-joined enumerator names, in declaration order.
    pub enumerators: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypenameEntry {
    pub name: String,
    pub type_index: u32,
}

/// A fully compiled interface. Everything needed to rebuild the types at
/// runtime without re-parsing, addressed by dense integer indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub name: String,
    pub kind: ModuleKind,
    pub types: Vec<OpSlot>,
    /// Canonical C spelling per primary slot, `None` on inline argument,
    /// length and end-marker slots.
    pub annotations: Vec<Option<String>>,
    pub globals: Vec<GlobalEntry>,
    pub fields: Vec<FieldEntry>,
    pub struct_unions: Vec<StructUnionEntry>,
    pub enums: Vec<EnumEntry>,
    pub typenames: Vec<TypenameEntry>,
}

impl Module {
    /// The deterministic text form. Compiling an unchanged registry renders
    /// byte-identical output.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Render to `path`, skipping the write when the file already holds
    /// exactly this content. Returns whether anything was written.
    pub fn write_if_changed(&self, path: &Path) -> Result<bool, Error> {
        let rendered = self.render();
        if let Ok(existing) = fs::read_to_string(path) {
            if existing == rendered {
                debug!("module {} unchanged, not rewriting {}", self.name, path.display());
                return Ok(false);
            }
        }
        // write-then-rename so a concurrent reader never sees a truncated
        // module
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".~{}", process::id()));
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, path)?;
        debug!("module {} written to {}", self.name, path.display());
        Ok(true)
    }
}

fn or_unknown<T: fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "?".to_owned(),
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "// module '{}' ({}), format {}",
            self.name, self.kind, FORMAT_VERSION
        )?;
        writeln!(f, "//")?;
        writeln!(f, "// types:")?;
        for (i, slot) in self.types.iter().enumerate() {
            match self.annotations.get(i).and_then(|a| a.as_deref()) {
                Some(c_name) => {
                    writeln!(f, "/* {i:3} */ {:<28} // {c_name}", slot.to_string())?;
                }
                None => writeln!(f, "/* {i:3} */ {slot}")?,
            }
        }
        writeln!(f, "//")?;
        writeln!(f, "// globals:")?;
        for g in &self.globals {
            write!(f, "{}: {}", g.name, g.op)?;
            if let Some(size) = g.size {
                write!(f, ", size {size}")?;
            }
            if let Some(check) = g.check_value {
                write!(f, ", check {check}")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "//")?;
        writeln!(f, "// fields:")?;
        for (i, fld) in self.fields.iter().enumerate() {
            match fld.bit_size {
                Some(bits) => {
                    writeln!(f, "/* {i:3} */ {}: {}, bits {bits}", fld.name, fld.op)?;
                }
                None => writeln!(
                    f,
                    "/* {i:3} */ {}: {}, offset {}, size {}",
                    fld.name,
                    fld.op,
                    or_unknown(fld.offset),
                    or_unknown(fld.size)
                )?,
            }
        }
        writeln!(f, "//")?;
        writeln!(f, "// struct_unions:")?;
        for s in &self.struct_unions {
            write!(
                f,
                "{}: slot {}, flags {}, size {}, align {}, fields {} at {}",
                s.name,
                s.type_index,
                s.flags,
                or_unknown(s.size),
                or_unknown(s.align),
                s.field_count,
                s.first_field_index
            )?;
            match s.comment {
                Some(comment) => writeln!(f, " // {comment}")?,
                None => writeln!(f)?,
            }
        }
        writeln!(f, "//")?;
        writeln!(f, "// enums:")?;
        for e in &self.enums {
            writeln!(
                f,
                "{}: slot {}, size {}, {}, values {}",
                e.name,
                e.type_index,
                e.size,
                if e.signed { "signed" } else { "unsigned" },
                e.enumerators
            )?;
        }
        writeln!(f, "//")?;
        writeln!(f, "// typenames:")?;
        for t in &self.typenames {
            writeln!(f, "{}: slot {}", t.name, t.type_index)?;
        }
        Ok(())
    }
}
