//! Semantic analysis: walking the syntax tree, interning types and
//! filling the declaration registry.
//!
//! The analyzer is the only place that understands the `...` extensions:
//! opaque typedefs, unknown-width integers, incomplete member lists and
//! `[...]` array lengths all get their model representation here. The
//! grammar has already accepted them; deciding whether they are allowed
//! in a given position happens in this module.

use hashbrown::HashMap;

use crate::ast::{
    Ast, AstType, Declaration, EnumSpecId, RecordSpecId, TopDecl, TypeQualifiers, TypeSpec,
    TypedefDecl,
};
use crate::declarations::{DeclKey, DeclValue, DeclarationKind, DeclarationRegistry};
use crate::error::DeclarationError;
use crate::ffi::CdefOptions;
use crate::model::{RecordDecl, TypeKind, TypeRef, TypeTable};
use crate::preprocess::MacroDef;
use crate::StringId;

pub mod const_eval;
pub mod records;
pub mod type_resolver;

#[cfg(test)]
mod tests_semantic;

/// Walks one parsed translation unit and registers everything it declares.
///
/// The caller owns the type table, registry and anonymous-name counter so
/// they survive across `cdef` calls; the per-run caches keyed by specifier
/// occurrence do not, which is what makes `typedef struct { ... } a, *b;`
/// share one record while two separate cdefs of `struct { ... }` do not.
pub struct Analyzer<'a> {
    ast: &'a Ast,
    table: &'a mut TypeTable,
    registry: &'a mut DeclarationRegistry,
    options: CdefOptions,
    anon_counter: &'a mut u32,
    records_seen: HashMap<RecordSpecId, TypeRef>,
    enums_seen: HashMap<EnumSpecId, TypeRef>,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        ast: &'a Ast,
        table: &'a mut TypeTable,
        registry: &'a mut DeclarationRegistry,
        options: CdefOptions,
        anon_counter: &'a mut u32,
    ) -> Self {
        Analyzer {
            ast,
            table,
            registry,
            options,
            anon_counter,
            records_seen: HashMap::new(),
            enums_seen: HashMap::new(),
        }
    }

    /// Register the harvested macros, then every declaration in order.
    pub fn run(&mut self, macros: &[MacroDef]) -> Result<(), DeclarationError> {
        for m in macros {
            self.registry.declare(
                DeclKey::new(DeclarationKind::Macro, m.name),
                DeclValue::Macro(m.value),
                self.options.override_,
            )?;
        }
        let ast = self.ast;
        for decl in &ast.decls {
            match decl {
                TopDecl::Typedef(td) => self.declare_typedef(td)?,
                TopDecl::Declaration(d) => self.declare_declaration(d)?,
            }
        }
        Ok(())
    }

    /// Resolve a bare type name, as parsed by `Parser::parse_type_name`.
    pub fn resolve_standalone(&mut self, ty: &AstType) -> Result<TypeRef, DeclarationError> {
        type_resolver::resolve_type(self, ty, false, None)
    }

    fn declare_typedef(&mut self, td: &TypedefDecl) -> Result<(), DeclarationError> {
        let ty = match &td.ty {
            // `typedef ... name;` declares a named opaque record
            AstType::Base {
                spec: TypeSpec::DotDotDot,
                ..
            } => {
                let tag = StringId::new(format!("${}", td.name));
                let id = self.table.new_record(RecordDecl::opaque(false, tag));
                self.table.record_mut(id).forcename = Some(td.name);
                self.table.record_type(id)
            }
            // `typedef int... name;` declares an integer of unknown width
            AstType::Base {
                spec: TypeSpec::UnknownInt(_),
                ..
            } => self.table.unknown_integer(td.name),
            // the typedef name stands in for a missing record or enum tag
            AstType::Base {
                spec: TypeSpec::Record(id),
                ..
            } => records::realize_record(self, *id, Some(td.name))?,
            AstType::Base {
                spec: TypeSpec::Enum(id),
                ..
            } => records::realize_enum(self, *id, Some(td.name))?,
            ty => type_resolver::resolve_type(self, ty, true, None)?,
        };
        self.registry.declare(
            DeclKey::new(DeclarationKind::Typedef, td.name),
            DeclValue::Type(ty),
            self.options.override_,
        )
    }

    fn declare_declaration(&mut self, d: &Declaration) -> Result<(), DeclarationError> {
        let Some(name) = d.name else {
            return self.declare_unnamed(d);
        };
        let ty = type_resolver::resolve_type(self, &d.ty, true, Some(name))?;
        if matches!(self.table.kind(ty), TypeKind::Function { .. }) {
            // functions are registered through a pointer to themselves
            let fnptr = self.table.as_function_pointer(ty);
            return self.registry.declare(
                DeclKey::new(DeclarationKind::Function, name),
                DeclValue::Type(fnptr),
                self.options.override_,
            );
        }
        let kind = if is_constant_declaration(&d.ty, false) {
            DeclarationKind::Constant
        } else {
            DeclarationKind::Variable
        };
        self.registry.declare(
            DeclKey::new(kind, name),
            DeclValue::Type(ty),
            self.options.override_,
        )
    }

    /// A declaration without a declared name is only meaningful when it
    /// carries a record or enum body.
    fn declare_unnamed(&mut self, d: &Declaration) -> Result<(), DeclarationError> {
        match &d.ty {
            AstType::Base {
                spec: TypeSpec::Record(id),
                ..
            } => {
                let has_body = self.ast.record(*id).fields.is_some();
                if has_body {
                    records::realize_record(self, *id, None)?;
                }
                Ok(())
            }
            AstType::Base {
                spec: TypeSpec::Enum(id),
                ..
            } => {
                let has_body = self.ast.enum_spec(*id).body.is_some();
                if has_body {
                    records::realize_enum(self, *id, None)?;
                }
                Ok(())
            }
            AstType::Base {
                spec: TypeSpec::DotDotDot | TypeSpec::UnknownInt(_),
                line,
                ..
            } => Err(DeclarationError::BadDotDotDot { line: *line }),
            ty => Err(DeclarationError::NoDeclaredVariable { line: ty.line() }),
        }
    }

    fn next_anonymous_name(&mut self) -> StringId {
        *self.anon_counter += 1;
        StringId::new(format!("${}", *self.anon_counter))
    }
}

/// A declaration is a `constant` when its value cannot be assigned
/// through: either the base type is const-qualified or the innermost
/// pointer level is. Array levels reset the pointer qualifier, matching
/// how a `const` binds in C declarators.
fn is_constant_declaration(ty: &AstType, const_from_pointer: bool) -> bool {
    match ty {
        AstType::Array { inner, .. } => is_constant_declaration(inner, false),
        AstType::Pointer { inner, quals } => {
            is_constant_declaration(inner, quals.contains(TypeQualifiers::CONST))
        }
        AstType::Base { quals, .. } => {
            const_from_pointer || quals.contains(TypeQualifiers::CONST)
        }
        AstType::Function { .. } => false,
    }
}
