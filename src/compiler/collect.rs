//! Reachable-type collection and slot assignment.

use hashbrown::HashMap;
use log::trace;

use crate::declarations::DeclarationRegistry;
use crate::model::{ArrayLength, EnumId, FieldDecl, RecordId, TypeKind, TypeRef, TypeTable};
use crate::StringId;

/// Every type the module must encode, in a deterministic slot order.
///
/// Insertion order only breaks ties between types with identical spellings;
/// the slot order itself comes from sorting by canonical C spelling, so it
/// does not depend on the order declarations were made in.
#[derive(Default)]
pub(super) struct TypeCollection {
    slots: HashMap<TypeRef, Option<u32>>,
    order: Vec<TypeRef>,
    all_decls: Vec<TypeRef>,
}

impl TypeCollection {
    /// Collect `ty` and everything it references. Record fields are
    /// collected through the `[...]`-length rewrite and with anonymous
    /// nested records flattened away, so the collected set matches what the
    /// field table will reference.
    pub(super) fn add(
        &mut self,
        table: &mut TypeTable,
        registry: &DeclarationRegistry,
        ty: TypeRef,
    ) {
        if self.slots.contains_key(&ty) {
            return;
        }
        trace!("collect {}", table.c_name(ty));
        self.slots.insert(ty, None);
        self.order.push(ty);
        match table.kind(ty).clone() {
            TypeKind::Void
            | TypeKind::Primitive(_)
            | TypeKind::UnknownInt(_)
            | TypeKind::Enum(_) => {}
            TypeKind::Pointer { target, .. } => self.add(table, registry, target),
            TypeKind::Array { item, .. } => self.add(table, registry, item),
            TypeKind::FunctionPointer { .. } => {
                let raw = table.as_raw_function(ty);
                self.add(table, registry, raw);
            }
            TypeKind::Function { args, result, .. } => {
                for arg in args {
                    self.add(table, registry, arg);
                }
                self.add(table, registry, result);
            }
            TypeKind::Record(id) => {
                if table.record(id).fields.is_some() && !registry.is_included(ty) {
                    for field in flattened_fields(table, id) {
                        self.add(table, registry, field.ty);
                    }
                }
            }
        }
    }

    /// Raw function signatures first, as variable-length runs; then single
    /// slots for everything else, with a second slot behind arrays that
    /// carry a length.
    pub(super) fn assign_slots(&mut self, table: &mut TypeTable) -> usize {
        let mut all = self.order.clone();
        all.sort_by_cached_key(|&ty| table.c_name(ty));
        let mut next = 0u32;
        for &ty in &all {
            let TypeKind::Function { args, .. } = table.kind(ty) else {
                continue;
            };
            let args = args.clone();
            self.slots.insert(ty, Some(next));
            next += 1;
            for arg in args {
                if self.unassigned(arg) {
                    self.slots.insert(arg, Some(next));
                }
                next += 1;
            }
            // end-marker slot
            next += 1;
        }
        for &ty in &all {
            if matches!(table.kind(ty), TypeKind::Function { .. }) || !self.unassigned(ty) {
                continue;
            }
            self.slots.insert(ty, Some(next));
            next += 1;
            if let TypeKind::Array { length, .. } = table.kind(ty) {
                if !matches!(length, ArrayLength::Open) {
                    // length slot
                    next += 1;
                }
            }
        }
        self.all_decls = all;
        next as usize
    }

    fn unassigned(&self, ty: TypeRef) -> bool {
        matches!(self.slots.get(&ty), Some(None))
    }

    pub(super) fn slot_of(&self, ty: TypeRef) -> i32 {
        match self.slots.get(&ty) {
            Some(Some(slot)) => *slot as i32,
            _ => unreachable!("internal inconsistency: type was never assigned a slot"),
        }
    }

    /// All collected types in slot order, primary owners only.
    pub(super) fn all_decls(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.all_decls.iter().copied()
    }
}

/// Dense secondary numbering for struct/unions and enums, sorted by bare
/// declaration name. `STRUCT_UNION` and `ENUM` opcodes index these, not the
/// main slot array.
pub(super) struct DenseIds {
    records: Vec<RecordId>,
    record_index: HashMap<RecordId, u32>,
    enums: Vec<EnumId>,
    enum_index: HashMap<EnumId, u32>,
}

impl DenseIds {
    pub(super) fn build(collection: &TypeCollection, table: &TypeTable) -> DenseIds {
        let mut records = Vec::new();
        let mut enums = Vec::new();
        for &ty in &collection.order {
            match table.kind(ty) {
                TypeKind::Record(id) => records.push(*id),
                TypeKind::Enum(id) => enums.push(*id),
                _ => {}
            }
        }
        records.sort_by_key(|&id| table.record(id).name.as_str());
        enums.sort_by_key(|&id| table.enum_decl(id).name.as_str());
        let record_index = records
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32))
            .collect();
        let enum_index = enums
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32))
            .collect();
        DenseIds {
            records,
            record_index,
            enums,
            enum_index,
        }
    }

    pub(super) fn record_slot(&self, id: RecordId) -> i32 {
        match self.record_index.get(&id) {
            Some(slot) => *slot as i32,
            None => unreachable!("internal inconsistency: record was never collected"),
        }
    }

    pub(super) fn enum_slot(&self, id: EnumId) -> i32 {
        match self.enum_index.get(&id) {
            Some(slot) => *slot as i32,
            None => unreachable!("internal inconsistency: enum was never collected"),
        }
    }

    pub(super) fn records(&self) -> &[RecordId] {
        &self.records
    }

    pub(super) fn enums(&self) -> &[EnumId] {
        &self.enums
    }

    pub(super) fn record_count(&self) -> usize {
        self.records.len()
    }

    pub(super) fn enum_count(&self) -> usize {
        self.enums.len()
    }
}

/// The field list of `id` with anonymous nested records flattened to their
/// leaf fields and `[...]` lengths rewritten to [`ArrayLength::OfField`]
/// against the outermost record. Must stay in sync between collection and
/// the field table, which both go through here.
pub(super) fn flattened_fields(table: &mut TypeTable, id: RecordId) -> Vec<FieldDecl> {
    let mut leaves = Vec::new();
    raw_leaves(table, id, &mut leaves);
    for leaf in &mut leaves {
        let path = match leaf.name {
            Some(name) => name.as_str().to_owned(),
            None => String::new(),
        };
        leaf.ty = rewrite_field(table, id, &path, leaf.ty);
    }
    leaves
}

fn raw_leaves(table: &TypeTable, id: RecordId, out: &mut Vec<FieldDecl>) {
    let Some(fields) = table.record(id).fields.clone() else {
        return;
    };
    for field in fields {
        if field.name.is_none() {
            if let TypeKind::Record(inner) = *table.kind(field.ty) {
                raw_leaves(table, inner, out);
                continue;
            }
        }
        out.push(field);
    }
}

/// `[...]` lengths on fields resolve against the owning record; nested array
/// items resolve through a synthetic `name[0]` element path.
pub(super) fn rewrite_field(
    table: &mut TypeTable,
    record: RecordId,
    name: &str,
    ty: TypeRef,
) -> TypeRef {
    let TypeKind::Array { item, length } = table.kind(ty).clone() else {
        return ty;
    };
    let length = match length {
        ArrayLength::Dots => ArrayLength::OfField {
            record,
            field: StringId::new(name),
        },
        other => other,
    };
    let item = rewrite_field(table, record, &format!("{name}[0]"), item);
    table.array_of(item, length)
}

/// Same rewrite for a global array variable: `int g[...]` measures its
/// length off the symbol `g`.
pub(super) fn rewrite_global(table: &mut TypeTable, ty: TypeRef, name: &str) -> TypeRef {
    let TypeKind::Array { item, length } = table.kind(ty).clone() else {
        return ty;
    };
    let length = match length {
        ArrayLength::Dots => ArrayLength::OfGlobal(StringId::new(name)),
        other => other,
    };
    let item = rewrite_global(table, item, &format!("{name}[0]"));
    table.array_of(item, length)
}
