//! Two-pass bytecode compiler over a declaration registry.
//!
//! Pass one walks every registered declaration in deterministic key order,
//! collects the set of reachable types and assigns each one a slot in the
//! flat type array: raw function signatures go first as variable-length
//! runs, everything else takes one slot, fixed- and symbolic-length arrays
//! take a trailing length slot. Pass two fills the slots with opcodes and
//! builds the five side tables (globals, fields, struct/unions, enums,
//! typenames). Compiling the same registry twice renders byte-identical
//! output; [`Module::write_if_changed`] relies on that to skip rewrites.

use log::debug;

use crate::declarations::{DeclKey, DeclValue, DeclarationKind, DeclarationRegistry};
use crate::error::Error;
use crate::model::{TypeKind, TypeTable};

mod collect;
mod emit;
mod module;
mod tables;

pub use module::{
    EnumEntry, FieldEntry, GlobalEntry, LenSlot, Module, OpSlot, StructUnionEntry, TypenameEntry,
    FORMAT_VERSION,
};

use collect::{DenseIds, TypeCollection};
use tables::TableBuilder;

/// How the emitted module will be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum ModuleKind {
    /// Compiled against native declarations; integer constants and struct
    /// layouts can be checked at build time.
    #[default]
    Api,
    /// Loaded through a dynamic linker with nothing but the symbol names.
    Abi,
}

impl ModuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::Api => "api",
            ModuleKind::Abi => "abi",
        }
    }

    pub fn is_abi(self) -> bool {
        self == ModuleKind::Abi
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-shot driver for both passes. The registry must not change between
/// them, which the shared borrow enforces.
pub struct ModuleCompiler<'a> {
    table: &'a mut TypeTable,
    registry: &'a DeclarationRegistry,
    kind: ModuleKind,
}

impl<'a> ModuleCompiler<'a> {
    pub fn compile(
        name: &str,
        kind: ModuleKind,
        registry: &'a DeclarationRegistry,
        table: &'a mut TypeTable,
    ) -> Result<Module, Error> {
        let mut compiler = ModuleCompiler {
            table,
            registry,
            kind,
        };
        let module = compiler.run(name)?;
        Ok(module)
    }

    fn run(&mut self, name: &str) -> Result<Module, Error> {
        debug!(
            "compiling module {name} ({}) from {} declarations",
            self.kind,
            self.registry.len()
        );
        let mut collection = TypeCollection::default();
        for (key, value) in self.registry.sorted_entries() {
            self.collect_entry(&mut collection, key, value);
        }
        let total = collection.assign_slots(self.table);
        let dense = DenseIds::build(&collection, self.table);
        debug!(
            "assigned {total} type slots, {} struct/unions, {} enums",
            dense.record_count(),
            dense.enum_count()
        );

        let mut types: Vec<Option<OpSlot>> = vec![None; total];
        for ty in collection.all_decls() {
            emit::emit_type(self.table, &collection, &dense, ty, &mut types)?;
        }
        let mut annotations: Vec<Option<String>> = vec![None; total];
        for ty in collection.all_decls() {
            let slot = collection.slot_of(ty) as usize;
            annotations[slot] = Some(self.table.c_name(ty));
        }
        let types: Vec<OpSlot> = types
            .into_iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Some(op) => op,
                None => unreachable!("internal inconsistency: slot {i} was never emitted"),
            })
            .collect();

        let mut builder = TableBuilder::new(self.table, self.registry, self.kind, &collection, &dense);
        for (key, value) in self.registry.sorted_entries() {
            builder.add_entry(key, value)?;
        }
        builder.add_missing_records()?;
        let tables = builder.finish();

        Ok(Module {
            name: name.to_owned(),
            kind: self.kind,
            types,
            annotations,
            globals: tables.globals,
            fields: tables.fields,
            struct_unions: tables.struct_unions,
            enums: tables.enums,
            typenames: tables.typenames,
        })
    }

    /// Which types an entry pulls into the module. Mirrored by
    /// [`TableBuilder::add_entry`], which assumes every type it mentions got
    /// a slot here.
    fn collect_entry(&mut self, collection: &mut TypeCollection, key: DeclKey, value: DeclValue) {
        let ty = match value {
            DeclValue::Type(ty) => ty,
            // Macros carry no type at all.
            DeclValue::Macro(_) => return,
        };
        match key.kind {
            DeclarationKind::Macro => {}
            DeclarationKind::Typedef
            | DeclarationKind::Struct
            | DeclarationKind::Union
            | DeclarationKind::Anonymous
            | DeclarationKind::Enum => {
                collection.add(self.table, self.registry, ty);
            }
            DeclarationKind::Function => {
                let raw = self.table.as_raw_function(ty);
                collection.add(self.table, self.registry, raw);
                let varargs = matches!(
                    self.table.kind(ty),
                    TypeKind::FunctionPointer { varargs: true, .. }
                );
                if varargs && !self.kind.is_abi() {
                    // Bound as a constant function pointer instead of a
                    // builtin entry; needs the pointer type in the table.
                    collection.add(self.table, self.registry, ty);
                }
            }
            DeclarationKind::Constant => {
                if !self.table.is_integer_type(ty) || self.kind.is_abi() {
                    collection.add(self.table, self.registry, ty);
                }
            }
            DeclarationKind::Variable => {
                let rewritten = collect::rewrite_global(self.table, ty, key.name.as_str());
                collection.add(self.table, self.registry, rewritten);
            }
        }
    }
}

#[cfg(test)]
mod tests_compiler;
