//! Construction of the five side tables.

use hashbrown::HashSet;
use itertools::Itertools;

use crate::declarations::{DeclKey, DeclValue, DeclarationKind, DeclarationRegistry};
use crate::error::VerificationError;
use crate::model::{EnumId, RecordId, TypeKind, TypeRef, TypeTable};
use crate::opcode::{Opcode, StructFlags, TypeOp};
use crate::StringId;

use super::collect::{self, DenseIds, TypeCollection};
use super::module::{EnumEntry, FieldEntry, GlobalEntry, StructUnionEntry, TypenameEntry};
use super::ModuleKind;

pub(super) struct Tables {
    pub globals: Vec<GlobalEntry>,
    pub fields: Vec<FieldEntry>,
    pub struct_unions: Vec<StructUnionEntry>,
    pub enums: Vec<EnumEntry>,
    pub typenames: Vec<TypenameEntry>,
}

pub(super) struct TableBuilder<'a> {
    table: &'a mut TypeTable,
    registry: &'a DeclarationRegistry,
    kind: ModuleKind,
    collection: &'a TypeCollection,
    dense: &'a DenseIds,
    globals: Vec<GlobalEntry>,
    fields: Vec<FieldEntry>,
    struct_unions: Vec<StructUnionEntry>,
    enums: Vec<EnumEntry>,
    typenames: Vec<TypenameEntry>,
    emitted_records: HashSet<RecordId>,
}

impl<'a> TableBuilder<'a> {
    pub(super) fn new(
        table: &'a mut TypeTable,
        registry: &'a DeclarationRegistry,
        kind: ModuleKind,
        collection: &'a TypeCollection,
        dense: &'a DenseIds,
    ) -> TableBuilder<'a> {
        TableBuilder {
            table,
            registry,
            kind,
            collection,
            dense,
            globals: Vec::new(),
            fields: Vec::new(),
            struct_unions: Vec::new(),
            enums: Vec::new(),
            typenames: Vec::new(),
            emitted_records: HashSet::new(),
        }
    }

    pub(super) fn add_entry(
        &mut self,
        key: DeclKey,
        value: DeclValue,
    ) -> Result<(), VerificationError> {
        match (key.kind, value) {
            (DeclarationKind::Macro, DeclValue::Macro(check_value)) => {
                if check_value.is_none() && self.kind.is_abi() {
                    return Err(VerificationError::DotsMacroAbi {
                        name: key.name.as_str().to_owned(),
                    });
                }
                self.globals.push(GlobalEntry {
                    name: key.name.as_str().to_owned(),
                    op: TypeOp::new(Opcode::ConstantInt, -1),
                    size: None,
                    check_value,
                });
            }
            (DeclarationKind::Anonymous, DeclValue::Type(ty)) => {
                let TypeKind::Record(id) = *self.table.kind(ty) else {
                    unreachable!("anonymous keys always name a record");
                };
                self.struct_ctx(id, true)?;
            }
            (DeclarationKind::Struct | DeclarationKind::Union, DeclValue::Type(ty)) => {
                let TypeKind::Record(id) = *self.table.kind(ty) else {
                    unreachable!("tag keys always name a record");
                };
                self.struct_ctx(id, true)?;
            }
            (DeclarationKind::Enum, DeclValue::Type(ty)) => {
                let TypeKind::Enum(id) = *self.table.kind(ty) else {
                    unreachable!("enum keys always name an enum");
                };
                self.enum_ctx(id)?;
            }
            (DeclarationKind::Constant, DeclValue::Type(ty)) => {
                self.constant_entry(key.name, ty)?;
            }
            (DeclarationKind::Function, DeclValue::Type(ty)) => {
                self.function_entry(key.name, ty)?;
            }
            (DeclarationKind::Typedef, DeclValue::Type(ty)) => {
                self.typedef_entry(key.name, ty)?;
            }
            (DeclarationKind::Variable, DeclValue::Type(ty)) => {
                self.variable_entry(key.name, ty);
            }
            (kind, value) => unreachable!("mismatched registry entry: {kind} {value:?}"),
        }
        Ok(())
    }

    fn constant_entry(&mut self, name: StringId, ty: TypeRef) -> Result<(), VerificationError> {
        let op = if self.table.is_integer_type(ty) && !self.kind.is_abi() {
            // checked against the native value at build time
            TypeOp::new(Opcode::ConstantInt, -1)
        } else {
            // refuse opaque or unsized constant types up front
            self.table.size_of(ty)?;
            let opcode = if self.kind.is_abi() {
                Opcode::DlopenConst
            } else {
                Opcode::Constant
            };
            TypeOp::new(opcode, self.collection.slot_of(ty))
        };
        self.globals.push(GlobalEntry {
            name: name.as_str().to_owned(),
            op,
            size: None,
            check_value: None,
        });
        Ok(())
    }

    fn function_entry(&mut self, name: StringId, ty: TypeRef) -> Result<(), VerificationError> {
        let TypeKind::FunctionPointer { args, varargs, .. } = self.table.kind(ty).clone() else {
            unreachable!("function keys always hold a function pointer");
        };
        if varargs {
            if self.kind.is_abi() {
                return Err(VerificationError::VariadicAbi {
                    name: name.as_str().to_owned(),
                });
            }
            // bound as a plain constant function pointer
            return self.constant_entry(name, ty);
        }
        let raw = self.table.as_raw_function(ty);
        let opcode = if self.kind.is_abi() {
            Opcode::DlopenFunc
        } else {
            match args.len() {
                0 => Opcode::BuiltinFunctionN,
                1 => Opcode::BuiltinFunctionO,
                _ => Opcode::BuiltinFunctionV,
            }
        };
        self.globals.push(GlobalEntry {
            name: name.as_str().to_owned(),
            op: TypeOp::new(opcode, self.collection.slot_of(raw)),
            size: None,
            check_value: None,
        });
        Ok(())
    }

    fn typedef_entry(&mut self, name: StringId, ty: TypeRef) -> Result<(), VerificationError> {
        self.typenames.push(TypenameEntry {
            name: name.as_str().to_owned(),
            type_index: self.collection.slot_of(ty) as u32,
        });
        if let TypeKind::Record(id) = *self.table.kind(ty) {
            let rec = self.table.record(id);
            // A `typedef ... name` record exists only through its typedef
            // and has no tag or anonymous entry of its own.
            if rec.fields.is_none() && rec.name.as_str().starts_with('$') {
                self.struct_ctx(id, true)?;
            }
        }
        Ok(())
    }

    fn variable_entry(&mut self, name: StringId, ty: TypeRef) {
        let rewritten = collect::rewrite_global(self.table, ty, name.as_str());
        let size = self.table.size_of(rewritten).ok();
        self.globals.push(GlobalEntry {
            name: name.as_str().to_owned(),
            op: TypeOp::new(Opcode::GlobalVar, self.collection.slot_of(rewritten)),
            size,
            check_value: None,
        });
    }

    fn enum_ctx(&mut self, id: EnumId) -> Result<(), VerificationError> {
        let ty = self.table.enum_type(id);
        let type_index = self.collection.slot_of(ty) as u32;
        let decl = self.table.enum_decl(id).clone();
        if self.kind.is_abi() && decl.partial {
            return Err(VerificationError::PartialType {
                type_name: self.table.enum_c_name(id),
            });
        }
        for e in &decl.enumerators {
            self.globals.push(GlobalEntry {
                name: e.name.as_str().to_owned(),
                op: TypeOp::new(Opcode::Enum, -1),
                size: None,
                check_value: Some(e.value),
            });
        }
        let base = decl.base_primitive();
        self.enums.push(EnumEntry {
            name: decl.name.as_str().to_owned(),
            type_index,
            size: base.size(),
            signed: base.is_signed(),
            enumerators: decl.enumerators.iter().map(|e| e.name.as_str()).join(","),
        });
        Ok(())
    }

    /// Emit the struct/union descriptor and, unless the record is opaque or
    /// externally owned, its slice of the field table. `named` is false only
    /// for records reachable without any declaration entry, which are
    /// emitted with no layout hints.
    fn struct_ctx(&mut self, id: RecordId, named: bool) -> Result<(), VerificationError> {
        self.emitted_records.insert(id);
        let ty = self.table.record_type(id);
        let type_index = self.collection.slot_of(ty) as u32;
        let rec = self.table.record(id).clone();

        let mut flags = StructFlags::empty();
        if rec.is_union {
            flags |= StructFlags::UNION;
        }
        let mut comment = None;
        if rec.fields.is_none() {
            flags |= StructFlags::OPAQUE;
            comment = Some("opaque");
        }
        if self.registry.is_included(ty) {
            flags |= StructFlags::EXTERNAL;
            comment = Some("external");
        } else {
            if rec.fields.is_some()
                && !rec.partial
                && !rec.has_anonymous_record_fields(self.table)
            {
                flags |= StructFlags::CHECK_FIELDS;
            }
            if rec.packed {
                flags |= StructFlags::PACKED;
            }
        }

        let mut size = None;
        let mut align = None;
        let mut first_field_index = -1i32;
        let mut field_count = 0u32;
        if comment.is_none() {
            // partial records leave every layout hint unresolved
            let complete = named && !rec.partial;
            if complete {
                let layout = self.table.record_layout(id)?;
                size = Some(layout.size);
                align = Some(layout.align);
            }
            if !named {
                comment = Some("unnamed");
            }
            let leaves = collect::flattened_fields(self.table, id);
            first_field_index = self.fields.len() as i32;
            field_count = leaves.len() as u32;
            for leaf in leaves {
                let type_slot = self.collection.slot_of(leaf.ty);
                let field_name = match leaf.name {
                    Some(n) => n.as_str().to_owned(),
                    None => String::new(),
                };
                let entry = match leaf.bit_size {
                    Some(bits) => FieldEntry {
                        name: field_name,
                        op: TypeOp::new(Opcode::Bitfield, type_slot),
                        offset: None,
                        size: None,
                        bit_size: Some(bits),
                    },
                    None => {
                        let offset = match (complete, leaf.name) {
                            (true, Some(field)) => Some(self.table.field_offset(id, field)?),
                            _ => None,
                        };
                        let size = if complete {
                            self.table.size_of(leaf.ty).ok()
                        } else {
                            None
                        };
                        FieldEntry {
                            name: field_name,
                            op: TypeOp::new(Opcode::Noop, type_slot),
                            offset,
                            size,
                            bit_size: None,
                        }
                    }
                };
                self.fields.push(entry);
            }
        }

        self.struct_unions.push(StructUnionEntry {
            name: rec.name.as_str().to_owned(),
            type_index,
            flags,
            size,
            align,
            first_field_index,
            field_count,
            comment,
        });
        Ok(())
    }

    /// Records that were collected but belong to no declaration entry, in
    /// practice tag-less records reached through a variable or a pointer
    /// typedef. They carry generated `$N` names and are emitted without
    /// layout hints.
    pub(super) fn add_missing_records(&mut self) -> Result<(), VerificationError> {
        for id in self.dense.records().to_vec() {
            if self.emitted_records.contains(&id) {
                continue;
            }
            let (partial, kind_str, name) = {
                let rec = self.table.record(id);
                (rec.partial, rec.kind_str(), rec.name.as_str())
            };
            if partial {
                unreachable!("internal inconsistency: partial {kind_str} {name} was never emitted");
            }
            let counted = name
                .strip_prefix('$')
                .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()));
            if counted {
                self.struct_ctx(id, false)?;
            } else {
                unreachable!("internal inconsistency: {kind_str} {name} has no declaration entry");
            }
        }
        Ok(())
    }

    pub(super) fn finish(mut self) -> Tables {
        self.globals.sort_by(|a, b| a.name.cmp(&b.name));
        self.struct_unions.sort_by(|a, b| a.name.cmp(&b.name));
        self.enums.sort_by(|a, b| a.name.cmp(&b.name));
        self.typenames.sort_by(|a, b| a.name.cmp(&b.name));
        // The dense numbering baked into STRUCT_UNION and ENUM opcodes must
        // agree with the sorted tables.
        assert_eq!(
            self.struct_unions.len(),
            self.dense.record_count(),
            "internal inconsistency: struct/union table length"
        );
        for (i, &id) in self.dense.records().iter().enumerate() {
            assert_eq!(
                self.struct_unions[i].name,
                self.table.record(id).name.as_str(),
                "internal inconsistency: struct/union table out of order"
            );
        }
        assert_eq!(
            self.enums.len(),
            self.dense.enum_count(),
            "internal inconsistency: enum table length"
        );
        for (i, &id) in self.dense.enums().iter().enumerate() {
            assert_eq!(
                self.enums[i].name,
                self.table.enum_decl(id).name.as_str(),
                "internal inconsistency: enum table out of order"
            );
        }
        Tables {
            globals: self.globals,
            fields: self.fields,
            struct_unions: self.struct_unions,
            enums: self.enums,
            typenames: self.typenames,
        }
    }
}
