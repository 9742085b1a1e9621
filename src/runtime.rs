//! Runtime consumer of compiled modules.
//!
//! [`TypeRegistry::from_module`] decodes the opcode array back into model
//! types without reparsing any C, rebuilds record and enum declarations
//! from the side tables, and answers the questions a binding layer asks at
//! call time: named type lookups, sizes and offsets, global bindings, and
//! C integer conversion. Records whose descriptor carries `CHECK_FIELDS`
//! are verified against the layout engine while loading; any other
//! malformed input is an [`VerificationError::InvalidModule`].

use hashbrown::HashMap;
use log::debug;
use thin_vec::ThinVec;

use crate::compiler::{FieldEntry, LenSlot, Module, OpSlot};
use crate::error::{Error, VerificationError};
use crate::model::{
    ArrayLength, EnumDecl, EnumId, Enumerator, FieldDecl, Primitive, RecordDecl, RecordId,
    TypeKind, TypeRef, TypeTable,
};
use crate::opcode::{Opcode, StructFlags, TypeOp, PRIM_VOID};
use crate::StringId;

/// How a looked-up global is bound at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Call through the indexed raw signature.
    Function { type_index: usize },
    /// Read a constant of the indexed type.
    Constant { type_index: usize },
    /// An integer constant; `None` when only the original build step knew
    /// the value.
    ConstantInt { value: Option<i64> },
    /// An enum member with its declared value.
    EnumConstant { value: i64 },
    /// Address of a variable of the indexed type.
    Variable {
        type_index: usize,
        size: Option<u64>,
    },
}

/// Placement of one decoded field.
#[derive(Debug, Clone, Copy)]
enum FieldPlace {
    At(u64),
    /// Bit-fields have no addressable offset.
    InBits,
    /// Only the original build step knew.
    Unknown,
}

/// All types and globals of one loaded module, addressed by slot index.
#[derive(Debug)]
pub struct TypeRegistry {
    table: TypeTable,
    /// Decoded model type per primary slot; `None` on length and end-marker
    /// slots.
    types: Vec<Option<TypeRef>>,
    typenames: HashMap<StringId, usize>,
    globals: HashMap<StringId, Binding>,
    enum_constants: HashMap<StringId, i64>,
    field_places: HashMap<(RecordId, StringId), FieldPlace>,
    /// Recorded `(size, align)` hints, which take precedence over the
    /// layout engine for the records themselves.
    layouts: HashMap<RecordId, (u64, u64)>,
}

impl TypeRegistry {
    pub fn from_module(module: &Module) -> Result<TypeRegistry, Error> {
        let mut table = TypeTable::new();

        // record shells first, so slots and fields can refer to them
        let mut records = Vec::with_capacity(module.struct_unions.len());
        for entry in &module.struct_unions {
            records.push(table.new_record(RecordDecl {
                is_union: entry.flags.contains(StructFlags::UNION),
                name: StringId::new(&entry.name),
                forcename: None,
                fields: None,
                partial: false,
                packed: entry.flags.contains(StructFlags::PACKED),
            }));
        }

        // enum member values travel in the global table
        let mut member_values: HashMap<&str, i64> = HashMap::new();
        for g in &module.globals {
            if g.op.op == Opcode::Enum {
                let value = g
                    .check_value
                    .ok_or_else(|| bad(format!("enum member {} has no value", g.name)))?;
                member_values.insert(g.name.as_str(), value);
            }
        }
        let mut enums = Vec::with_capacity(module.enums.len());
        for entry in &module.enums {
            let mut enumerators = ThinVec::new();
            for name in entry.enumerators.split(',').filter(|n| !n.is_empty()) {
                let value = *member_values.get(name).ok_or_else(|| {
                    bad(format!(
                        "enum {}: member {name} is missing from the globals",
                        entry.name
                    ))
                })?;
                enumerators.push(Enumerator {
                    name: StringId::new(name),
                    value,
                });
            }
            let decl = EnumDecl {
                name: StringId::new(&entry.name),
                forcename: None,
                enumerators,
                partial: false,
            };
            let base = decl.base_primitive();
            if (base.size(), base.is_signed()) != (entry.size, entry.signed) {
                return Err(bad(format!(
                    "enum {}: recorded base ({} bytes, {}) does not match the member values",
                    entry.name,
                    entry.size,
                    if entry.signed { "signed" } else { "unsigned" }
                ))
                .into());
            }
            enums.push(table.new_enum(decl));
        }

        let mut decoder = Decoder {
            module,
            table: &mut table,
            records: &records,
            enums: &enums,
            memo: vec![SlotState::Pending; module.types.len()],
        };
        let mut types: Vec<Option<TypeRef>> = vec![None; module.types.len()];
        for index in 0..module.types.len() {
            if decoder.addressable(index) {
                types[index] = Some(decoder.decode(index)?);
            }
        }

        let mut field_places = HashMap::new();
        let mut layouts = HashMap::new();
        for (i, entry) in module.struct_unions.iter().enumerate() {
            let id = records[i];
            if let (Some(size), Some(align)) = (entry.size, entry.align) {
                layouts.insert(id, (size, align));
            }
            if entry.first_field_index < 0 {
                continue;
            }
            let start = entry.first_field_index as usize;
            let count = entry.field_count as usize;
            let slice = module.fields.get(start..start + count).ok_or_else(|| {
                bad(format!("struct/union {}: field slice out of range", entry.name))
            })?;
            let mut fields = ThinVec::with_capacity(count);
            for f in slice {
                let ty = field_type(&types, f)?;
                let name = if f.name.is_empty() {
                    None
                } else {
                    Some(StringId::new(&f.name))
                };
                if let Some(field) = name {
                    let place = if f.bit_size.is_some() {
                        FieldPlace::InBits
                    } else {
                        match f.offset {
                            Some(offset) => FieldPlace::At(offset),
                            None => FieldPlace::Unknown,
                        }
                    };
                    field_places.insert((id, field), place);
                }
                fields.push(FieldDecl {
                    name,
                    ty,
                    bit_size: f.bit_size,
                });
            }
            let rec = table.record_mut(id);
            rec.fields = Some(fields);
            if entry.size.is_none() {
                // the module withheld the layout on purpose
                rec.partial = true;
            }
        }

        verify_layouts(&table, module, &records)?;

        let mut typenames = HashMap::new();
        for t in &module.typenames {
            let index = slot_index(&types, t.type_index as i32, &t.name)?;
            typenames.insert(StringId::new(&t.name), index);
        }

        let mut globals = HashMap::new();
        let mut enum_constants = HashMap::new();
        for g in &module.globals {
            let binding = match g.op.op {
                Opcode::BuiltinFunctionN
                | Opcode::BuiltinFunctionO
                | Opcode::BuiltinFunctionV
                | Opcode::DlopenFunc => Binding::Function {
                    type_index: slot_index(&types, g.op.arg, &g.name)?,
                },
                Opcode::Constant | Opcode::DlopenConst => Binding::Constant {
                    type_index: slot_index(&types, g.op.arg, &g.name)?,
                },
                Opcode::ConstantInt => Binding::ConstantInt {
                    value: g.check_value,
                },
                Opcode::Enum => {
                    let value = g
                        .check_value
                        .ok_or_else(|| bad(format!("enum member {} has no value", g.name)))?;
                    enum_constants.insert(StringId::new(&g.name), value);
                    Binding::EnumConstant { value }
                }
                Opcode::GlobalVar => Binding::Variable {
                    type_index: slot_index(&types, g.op.arg, &g.name)?,
                    size: g.size,
                },
                other => {
                    return Err(bad(format!(
                        "global {}: unexpected operation {}",
                        g.name,
                        other.name()
                    ))
                    .into())
                }
            };
            globals.insert(StringId::new(&g.name), binding);
        }

        debug!(
            "loaded module {}: {} type slots, {} globals, {} typenames",
            module.name,
            types.len(),
            globals.len(),
            typenames.len()
        );
        Ok(TypeRegistry {
            table,
            types,
            typenames,
            globals,
            enum_constants,
            field_places,
            layouts,
        })
    }

    /// Slot index registered for a typedef name.
    pub fn type_by_name(&self, name: &str) -> Option<usize> {
        self.typenames.get(&StringId::new(name)).copied()
    }

    pub fn global(&self, name: &str) -> Option<Binding> {
        self.globals.get(&StringId::new(name)).copied()
    }

    pub fn enum_constant(&self, name: &str) -> Option<i64> {
        self.enum_constants.get(&StringId::new(name)).copied()
    }

    /// The decoded model type at `index`.
    pub fn type_ref(&self, index: usize) -> Result<TypeRef, Error> {
        match self.types.get(index) {
            Some(Some(ty)) => Ok(*ty),
            Some(None) => Err(bad(format!("slot {index} is not a type")).into()),
            None => Err(bad(format!("type index {index} out of range")).into()),
        }
    }

    pub fn table(&self) -> &TypeTable {
        &self.table
    }

    pub fn size_of(&self, index: usize) -> Result<u64, Error> {
        let ty = self.type_ref(index)?;
        if let TypeKind::Record(id) = *self.table.kind(ty) {
            if let Some(&(size, _)) = self.layouts.get(&id) {
                return Ok(size);
            }
        }
        Ok(self.table.size_of(ty)?)
    }

    pub fn align_of(&self, index: usize) -> Result<u64, Error> {
        let ty = self.type_ref(index)?;
        if let TypeKind::Record(id) = *self.table.kind(ty) {
            if let Some(&(_, align)) = self.layouts.get(&id) {
                return Ok(align);
            }
        }
        Ok(self.table.align_of(ty)?)
    }

    /// Byte offset of `field`, answered from the recorded placements.
    pub fn offset_of(&self, index: usize, field: &str) -> Result<u64, Error> {
        let ty = self.type_ref(index)?;
        let TypeKind::Record(id) = *self.table.kind(ty) else {
            return Err(VerificationError::NotARecord {
                type_name: self.table.c_name(ty),
            }
            .into());
        };
        match self.field_places.get(&(id, StringId::new(field))) {
            Some(FieldPlace::At(offset)) => Ok(*offset),
            Some(FieldPlace::InBits) => Err(VerificationError::BitFieldOffset {
                field: field.to_owned(),
            }
            .into()),
            Some(FieldPlace::Unknown) => Err(VerificationError::PartialType {
                type_name: self.table.record_c_name(id),
            }
            .into()),
            None if self.table.record(id).fields.is_none() => {
                Err(VerificationError::OpaqueType {
                    type_name: self.table.record_c_name(id),
                }
                .into())
            }
            None => Err(VerificationError::UnknownField {
                type_name: self.table.record_c_name(id),
                field: field.to_owned(),
            }
            .into()),
        }
    }

    /// Array-to-pointer view of `index`, for argument positions.
    pub fn decayed(&mut self, index: usize) -> Result<TypeRef, Error> {
        let ty = self.type_ref(index)?;
        Ok(self.table.decayed(ty))
    }

    /// C integer conversion of `value` to the type at `index`.
    pub fn cast_int(&self, index: usize, value: i64) -> Result<i64, Error> {
        let ty = self.type_ref(index)?;
        Ok(self.cast_to(ty, value)?)
    }

    fn cast_to(&self, ty: TypeRef, value: i64) -> Result<i64, VerificationError> {
        match *self.table.kind(ty) {
            TypeKind::Primitive(prim) if prim.is_integer() => Ok(cast_primitive(prim, value)),
            TypeKind::Enum(id) => {
                let base = self.table.enum_decl(id).base_primitive();
                Ok(cast_primitive(base, value))
            }
            TypeKind::UnknownInt(name) => Err(VerificationError::UnresolvedInteger {
                name: name.as_str().to_owned(),
            }),
            _ => Err(VerificationError::NotAnInteger {
                type_name: self.table.c_name(ty),
            }),
        }
    }
}

/// C integer conversion: truncate to the target width, then sign-extend
/// when the target is signed. `_Bool` collapses any nonzero value to 1.
/// 64-bit results carry the two's-complement bit pattern.
fn cast_primitive(prim: Primitive, value: i64) -> i64 {
    if prim == Primitive::Bool {
        return i64::from(value != 0);
    }
    let bits = prim.size() * 8;
    if bits >= 64 {
        return value;
    }
    let mask = (1u64 << bits) - 1;
    let truncated = (value as u64) & mask;
    if prim.is_signed() && (truncated >> (bits - 1)) & 1 == 1 {
        (truncated | !mask) as i64
    } else {
        truncated as i64
    }
}

fn bad(detail: String) -> VerificationError {
    VerificationError::InvalidModule { detail }
}

fn checked_index(arg: i32, len: usize) -> Result<usize, VerificationError> {
    usize::try_from(arg)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| bad(format!("type index {arg} out of range")))
}

/// A slot index referenced from a table entry; must name a decoded type.
fn slot_index(
    types: &[Option<TypeRef>],
    arg: i32,
    what: &str,
) -> Result<usize, VerificationError> {
    let index = usize::try_from(arg)
        .ok()
        .filter(|&i| i < types.len())
        .ok_or_else(|| bad(format!("{what}: type index {arg} out of range")))?;
    if types[index].is_none() {
        return Err(bad(format!("{what}: slot {index} is not a type")));
    }
    Ok(index)
}

fn field_type(types: &[Option<TypeRef>], f: &FieldEntry) -> Result<TypeRef, VerificationError> {
    if f.op.op != Opcode::Noop && f.op.op != Opcode::Bitfield {
        return Err(bad(format!("field {}: unexpected operation {}", f.name, f.op)));
    }
    let index = slot_index(types, f.op.arg, &f.name)?;
    Ok(types[index].unwrap())
}

/// Check records flagged `CHECK_FIELDS` against the layout engine.
fn verify_layouts(
    table: &TypeTable,
    module: &Module,
    records: &[RecordId],
) -> Result<(), Error> {
    for (i, entry) in module.struct_unions.iter().enumerate() {
        if !entry.flags.contains(StructFlags::CHECK_FIELDS) {
            continue;
        }
        let (Some(size), Some(align)) = (entry.size, entry.align) else {
            continue;
        };
        if entry.first_field_index < 0 {
            continue;
        }
        let id = records[i];
        let layout = table.record_layout(id)?;
        if (layout.size, layout.align) != (size, align) {
            return Err(bad(format!(
                "struct/union {}: recorded size {size} align {align}, fields lay out as size {} align {}",
                entry.name, layout.size, layout.align
            ))
            .into());
        }
        let start = entry.first_field_index as usize;
        let slice = &module.fields[start..start + entry.field_count as usize];
        for f in slice {
            let (Some(offset), false) = (f.offset, f.name.is_empty()) else {
                continue;
            };
            if table.field_offset(id, StringId::new(&f.name))? != offset {
                return Err(bad(format!(
                    "struct/union {}: field {} is not at the recorded offset {offset}",
                    entry.name, f.name
                ))
                .into());
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum SlotState {
    Pending,
    Busy,
    Done(TypeRef),
}

struct Decoder<'a> {
    module: &'a Module,
    table: &'a mut TypeTable,
    records: &'a [RecordId],
    enums: &'a [EnumId],
    memo: Vec<SlotState>,
}

impl Decoder<'_> {
    /// Length and end-marker slots carry no type of their own.
    fn addressable(&self, index: usize) -> bool {
        match &self.module.types[index] {
            OpSlot::Len(_) => false,
            OpSlot::Op(op) => op.op != Opcode::FunctionEnd,
            OpSlot::UnknownPrim { .. } => true,
        }
    }

    fn decode(&mut self, index: usize) -> Result<TypeRef, VerificationError> {
        match self.memo.get(index) {
            Some(SlotState::Done(ty)) => return Ok(*ty),
            Some(SlotState::Busy) => {
                return Err(bad(format!("slot {index} refers back to itself")))
            }
            Some(SlotState::Pending) => {}
            None => return Err(bad(format!("type index {index} out of range"))),
        }
        self.memo[index] = SlotState::Busy;
        let ty = self.decode_slot(index)?;
        self.memo[index] = SlotState::Done(ty);
        Ok(ty)
    }

    fn decode_slot(&mut self, index: usize) -> Result<TypeRef, VerificationError> {
        let module = self.module;
        match &module.types[index] {
            OpSlot::UnknownPrim { name } => Ok(self.table.unknown_integer(StringId::new(name))),
            OpSlot::Len(_) => Err(bad(format!("slot {index} is an array length, not a type"))),
            OpSlot::Op(op) => self.decode_op(index, *op),
        }
    }

    fn decode_op(&mut self, index: usize, op: TypeOp) -> Result<TypeRef, VerificationError> {
        let module = self.module;
        match op.op {
            Opcode::Primitive => {
                if op.arg == PRIM_VOID {
                    return Ok(self.table.void_type());
                }
                let prim = u8::try_from(op.arg)
                    .ok()
                    .and_then(Primitive::from_index)
                    .ok_or_else(|| bad(format!("unknown primitive index {}", op.arg)))?;
                Ok(self.table.primitive(prim))
            }
            Opcode::Pointer => {
                let target = checked_index(op.arg, module.types.len())?;
                let target = self.decode(target)?;
                // a pointer at a raw signature is the function pointer form
                if matches!(self.table.kind(target), TypeKind::Function { .. }) {
                    Ok(self.table.as_function_pointer(target))
                } else {
                    Ok(self.table.pointer_to(target))
                }
            }
            Opcode::Array | Opcode::OpenArray => {
                let item = checked_index(op.arg, module.types.len())?;
                let item = self.decode(item)?;
                let length = if op.op == Opcode::OpenArray {
                    ArrayLength::Open
                } else {
                    match module.types.get(index + 1) {
                        Some(OpSlot::Len(LenSlot::Fixed(n))) => ArrayLength::Fixed(*n),
                        // symbolic lengths were only measurable by the
                        // original build step
                        Some(OpSlot::Len(_)) => ArrayLength::Open,
                        _ => return Err(bad(format!("array at slot {index} has no length slot"))),
                    }
                };
                Ok(self.table.array_of(item, length))
            }
            Opcode::StructUnion => {
                let id = usize::try_from(op.arg)
                    .ok()
                    .and_then(|i| self.records.get(i))
                    .copied()
                    .ok_or_else(|| bad(format!("struct/union index {} out of range", op.arg)))?;
                Ok(self.table.record_type(id))
            }
            Opcode::Enum => {
                let id = usize::try_from(op.arg)
                    .ok()
                    .and_then(|i| self.enums.get(i))
                    .copied()
                    .ok_or_else(|| bad(format!("enum index {} out of range", op.arg)))?;
                Ok(self.table.enum_type(id))
            }
            Opcode::Function => {
                let result = checked_index(op.arg, module.types.len())?;
                let result = self.decode(result)?;
                let mut args = Vec::new();
                let mut next = index + 1;
                let varargs = loop {
                    match module.types.get(next) {
                        Some(OpSlot::Op(end)) if end.op == Opcode::FunctionEnd => {
                            break end.arg & 1 != 0;
                        }
                        Some(_) => {
                            args.push(self.decode(next)?);
                            next += 1;
                        }
                        None => return Err(bad(format!("signature at slot {index} never ends"))),
                    }
                };
                Ok(self.table.intern(TypeKind::Function {
                    args,
                    result,
                    varargs,
                }))
            }
            Opcode::Noop => {
                let real = checked_index(op.arg, module.types.len())?;
                self.decode(real)
            }
            other => Err(bad(format!(
                "{} cannot appear in the type array",
                other.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests_runtime;
