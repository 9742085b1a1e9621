//! User-facing interface tying the pipeline together.
//!
//! An [`Ffi`] owns one type table and one declaration registry and feeds
//! them through `cdef` calls. Everything else is a query over that state:
//! `typeof_` and friends parse a single type spelling, `include` imports
//! another unit wholesale, `compile`/`emit` hand the registry to the
//! bytecode compiler.

use std::path::Path;

use hashbrown::HashMap;
use log::debug;

use crate::ast::Ast;
use crate::compiler::{Module, ModuleCompiler, ModuleKind};
use crate::declarations::{DeclValue, DeclarationKind, DeclarationRegistry};
use crate::error::{Error, VerificationError};
use crate::lexer::tokenize;
use crate::model::{
    ArrayLength, EnumId, FieldDecl, RecordDecl, RecordId, TypeKind, TypeRef, TypeTable,
};
use crate::parser::{Parser, TypeDefContext};
use crate::preprocess::prepare;
use crate::semantic::Analyzer;
use crate::source::SourceText;
use crate::StringId;

/// Options accepted by [`Ffi::cdef_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CdefOptions {
    /// Replace conflicting earlier declarations instead of erroring.
    pub override_: bool,
    /// Give every record declared in this call a packing of 1.
    pub packed: bool,
}

/// One coherent set of C interface declarations.
///
/// Declarations accumulate across `cdef` calls; typedef names from earlier
/// calls are visible to later ones. A parsed-type cache makes repeated
/// `typeof_` of the same spelling O(1) and guarantees it returns the
/// identical [`TypeRef`].
pub struct Ffi {
    table: TypeTable,
    registry: DeclarationRegistry,
    anon_counter: u32,
    parsed_types: HashMap<String, TypeRef>,
}

impl Default for Ffi {
    fn default() -> Ffi {
        Ffi::new()
    }
}

impl Ffi {
    pub fn new() -> Ffi {
        Ffi {
            table: TypeTable::new(),
            registry: DeclarationRegistry::new(),
            anon_counter: 0,
            parsed_types: HashMap::new(),
        }
    }

    /// Register every declaration in `source`.
    pub fn cdef(&mut self, source: &str) -> Result<(), Error> {
        self.cdef_with(source, CdefOptions::default())
    }

    pub fn cdef_with(&mut self, source: &str, options: CdefOptions) -> Result<(), Error> {
        let prepared = prepare(source)?;
        let text = SourceText::new(prepared.source);
        let tokens = tokenize(text.text())?;
        let mut ast = Ast::new();
        let mut parser = Parser::new(&tokens, &mut ast, &text, self.seeded_typedefs());
        parser.parse_translation_unit()?;
        let mut analyzer = Analyzer::new(
            &ast,
            &mut self.table,
            &mut self.registry,
            options,
            &mut self.anon_counter,
        );
        analyzer.run(&prepared.macros)?;
        if options.override_ {
            // replaced typedefs may invalidate previously parsed spellings
            self.parsed_types.clear();
        }
        debug!(
            "cdef done, {} declarations registered",
            self.registry.len()
        );
        Ok(())
    }

    /// Parse a single type spelling such as `"int(*)[10]"`.
    ///
    /// A bare function spelling comes back as the corresponding function
    /// pointer. Mentioning an unknown tag registers it as opaque, exactly
    /// as it would inside a `cdef`.
    pub fn typeof_(&mut self, cdecl: &str) -> Result<TypeRef, Error> {
        if let Some(&ty) = self.parsed_types.get(cdecl) {
            return Ok(ty);
        }
        let ty = self.parse_type_name(cdecl)?;
        self.parsed_types.insert(cdecl.to_owned(), ty);
        Ok(ty)
    }

    pub fn sizeof_(&mut self, cdecl: &str) -> Result<u64, Error> {
        let ty = self.typeof_(cdecl)?;
        Ok(self.table.size_of(ty)?)
    }

    pub fn alignof_(&mut self, cdecl: &str) -> Result<u64, Error> {
        let ty = self.typeof_(cdecl)?;
        Ok(self.table.align_of(ty)?)
    }

    /// Byte offset of `field` in the struct or union named by `cdecl`.
    pub fn offsetof_(&mut self, cdecl: &str, field: &str) -> Result<u64, Error> {
        let ty = self.typeof_(cdecl)?;
        let TypeKind::Record(id) = *self.table.kind(ty) else {
            return Err(VerificationError::NotARecord {
                type_name: self.table.c_name(ty),
            }
            .into());
        };
        Ok(self.table.field_offset(id, StringId::new(field))?)
    }

    /// Canonical spelling of `cdecl` with `replace_with` in declarator
    /// position, e.g. `getctype("int[4]", "*x")` gives `"int(*x)[4]"`.
    pub fn getctype(&mut self, cdecl: &str, replace_with: &str) -> Result<String, Error> {
        let ty = self.typeof_(cdecl)?;
        Ok(self.table.spelling(ty, replace_with)?)
    }

    /// Make every type declared by `other` available here as well.
    ///
    /// Typedef, struct, union, enum and anonymous entries are copied, with
    /// their types imported recursively into this unit's table. Imported
    /// records are remembered so the compiler can flag their layout as
    /// externally owned. Constants, functions and variables stay behind;
    /// they belong to the other unit's module.
    pub fn include(&mut self, other: &Ffi) -> Result<(), Error> {
        let mut importer = Importer {
            src: &other.table,
            dst: &mut self.table,
            types: HashMap::new(),
            records: HashMap::new(),
            enums: HashMap::new(),
        };
        for (key, value) in other.registry.sorted_entries() {
            if !matches!(
                key.kind,
                DeclarationKind::Typedef
                    | DeclarationKind::Struct
                    | DeclarationKind::Union
                    | DeclarationKind::Enum
                    | DeclarationKind::Anonymous
            ) {
                continue;
            }
            let DeclValue::Type(ty) = value else {
                continue;
            };
            let imported = importer.import_type(ty);
            self.registry.declare(key, DeclValue::Type(imported), false)?;
            self.registry.mark_included(imported);
        }
        Ok(())
    }

    /// Compile everything registered so far into a bytecode module.
    pub fn compile(&mut self, name: &str, kind: ModuleKind) -> Result<Module, Error> {
        ModuleCompiler::compile(name, kind, &self.registry, &mut self.table)
    }

    /// Compile and write the rendered module to `path`, skipping the write
    /// when the file already holds identical content. Returns whether the
    /// file was written.
    pub fn emit(&mut self, name: &str, kind: ModuleKind, path: &Path) -> Result<bool, Error> {
        let module = self.compile(name, kind)?;
        module.write_if_changed(path)
    }

    fn seeded_typedefs(&self) -> TypeDefContext {
        let mut types = TypeDefContext::new();
        for name in self.registry.typedef_names() {
            types.add_typedef(name);
        }
        types
    }

    fn parse_type_name(&mut self, cdecl: &str) -> Result<TypeRef, Error> {
        let prepared = prepare(cdecl)?;
        let text = SourceText::new(prepared.source);
        let tokens = tokenize(text.text())?;
        let mut ast = Ast::new();
        let mut parser = Parser::new(&tokens, &mut ast, &text, self.seeded_typedefs());
        let parsed = parser.parse_type_name()?;
        let mut analyzer = Analyzer::new(
            &ast,
            &mut self.table,
            &mut self.registry,
            CdefOptions::default(),
            &mut self.anon_counter,
        );
        let ty = analyzer.resolve_standalone(&parsed)?;
        if matches!(self.table.kind(ty), TypeKind::Function { .. }) {
            return Ok(self.table.as_function_pointer(ty));
        }
        Ok(ty)
    }
}

/// Copies types from one table into another, preserving sharing.
///
/// Records are memoized shell-first so self-referential fields terminate.
struct Importer<'a> {
    src: &'a TypeTable,
    dst: &'a mut TypeTable,
    types: HashMap<TypeRef, TypeRef>,
    records: HashMap<RecordId, RecordId>,
    enums: HashMap<EnumId, EnumId>,
}

impl Importer<'_> {
    fn import_type(&mut self, ty: TypeRef) -> TypeRef {
        if let Some(&done) = self.types.get(&ty) {
            return done;
        }
        let imported = match self.src.kind(ty).clone() {
            TypeKind::Void => self.dst.void_type(),
            TypeKind::Primitive(prim) => self.dst.primitive(prim),
            TypeKind::UnknownInt(name) => self.dst.unknown_integer(name),
            TypeKind::Pointer { target, to_const } => {
                let target = self.import_type(target);
                if to_const {
                    self.dst.const_pointer_to(target)
                } else {
                    self.dst.pointer_to(target)
                }
            }
            TypeKind::Array { item, length } => {
                let item = self.import_type(item);
                let length = match length {
                    ArrayLength::OfField { record, field } => ArrayLength::OfField {
                        record: self.import_record(record),
                        field,
                    },
                    other => other,
                };
                self.dst.array_of(item, length)
            }
            TypeKind::Record(id) => {
                let id = self.import_record(id);
                self.dst.record_type(id)
            }
            TypeKind::Enum(id) => {
                let id = self.import_enum(id);
                self.dst.enum_type(id)
            }
            TypeKind::Function {
                args,
                result,
                varargs,
            } => {
                let args = args.iter().map(|&a| self.import_type(a)).collect();
                let result = self.import_type(result);
                self.dst.intern(TypeKind::Function {
                    args,
                    result,
                    varargs,
                })
            }
            TypeKind::FunctionPointer {
                args,
                result,
                varargs,
            } => {
                let args = args.iter().map(|&a| self.import_type(a)).collect();
                let result = self.import_type(result);
                self.dst.intern(TypeKind::FunctionPointer {
                    args,
                    result,
                    varargs,
                })
            }
        };
        self.types.insert(ty, imported);
        imported
    }

    fn import_record(&mut self, id: RecordId) -> RecordId {
        if let Some(&done) = self.records.get(&id) {
            return done;
        }
        let src = self.src.record(id).clone();
        let new_id = self.dst.new_record(RecordDecl {
            is_union: src.is_union,
            name: src.name,
            forcename: src.forcename,
            fields: None,
            partial: src.partial,
            packed: src.packed,
        });
        // memoize before the fields so self-referential records terminate
        self.records.insert(id, new_id);
        if let Some(fields) = src.fields {
            let imported = fields
                .iter()
                .map(|f| FieldDecl {
                    name: f.name,
                    ty: self.import_type(f.ty),
                    bit_size: f.bit_size,
                })
                .collect();
            self.dst.record_mut(new_id).fields = Some(imported);
        }
        new_id
    }

    fn import_enum(&mut self, id: EnumId) -> EnumId {
        if let Some(&done) = self.enums.get(&id) {
            return done;
        }
        let new_id = self.dst.new_enum(self.src.enum_decl(id).clone());
        self.enums.insert(id, new_id);
        new_id
    }
}
