//! Realization of struct/union and enum specifiers.
//!
//! Tagged records resolve through the registry, so every mention of
//! `struct foo` lands on one interned type, with an opaque shell created
//! at first sight and the body filled in by whichever mention carries it.
//! Anonymous records get a generated `$N` name, or `$typedefname` when a
//! typedef supplies one.

use thin_vec::ThinVec;

use crate::ast::{ArraySizeExpr, AstType, EnumSpecId, FieldSpec, RecordSpecId};
use crate::declarations::{DeclKey, DeclValue, DeclarationKind};
use crate::error::DeclarationError;
use crate::model::{EnumDecl, Enumerator, FieldDecl, RecordDecl, RecordId, TypeKind, TypeRef};
use crate::semantic::{const_eval, type_resolver, Analyzer};
use crate::StringId;

pub(crate) fn realize_record(
    an: &mut Analyzer,
    spec_id: RecordSpecId,
    force_name: Option<StringId>,
) -> Result<TypeRef, DeclarationError> {
    if let Some(&ty) = an.records_seen.get(&spec_id) {
        return Ok(ty);
    }
    let ast = an.ast;
    let spec = ast.record(spec_id);
    let kind = if spec.is_union {
        DeclarationKind::Union
    } else {
        DeclarationKind::Struct
    };

    let (id, ty) = match spec.tag {
        None => {
            let name = match force_name {
                Some(force) => StringId::new(format!("${}", force)),
                None => an.next_anonymous_name(),
            };
            let id = an.table.new_record(RecordDecl::opaque(spec.is_union, name));
            let ty = an.table.record_type(id);
            (id, ty)
        }
        Some(tag) => {
            let key = DeclKey::new(kind, tag);
            match an.registry.lookup(key) {
                Some(DeclValue::Type(existing)) => {
                    let TypeKind::Record(id) = *an.table.kind(existing) else {
                        unreachable!("registry holds a non-record under a record key");
                    };
                    (id, existing)
                }
                _ => {
                    let id = an.table.new_record(RecordDecl::opaque(spec.is_union, tag));
                    let ty = an.table.record_type(id);
                    an.registry
                        .declare(key, DeclValue::Type(ty), an.options.override_)?;
                    (id, ty)
                }
            }
        }
    };

    {
        let rec = an.table.record_mut(id);
        if rec.forcename.is_none() {
            rec.forcename = force_name;
        }
    }
    // an anonymous record with a typedef name is reachable by that name
    let rec = an.table.record(id);
    if let Some(forced) = rec.forcename {
        if rec.name.as_str().contains('$') {
            an.registry.declare(
                DeclKey::new(DeclarationKind::Anonymous, forced),
                DeclValue::Type(ty),
                an.options.override_,
            )?;
        }
    }
    an.records_seen.insert(spec_id, ty);

    let Some(field_specs) = &spec.fields else {
        return Ok(ty);
    };
    if an.table.record(id).fields.is_some() {
        return Err(DeclarationError::DuplicateBody {
            kind: an.table.record(id).kind_str(),
            name: an.table.record(id).name.to_string(),
        });
    }
    build_record_body(an, id, field_specs)?;
    Ok(ty)
}

fn build_record_body(
    an: &mut Analyzer,
    id: RecordId,
    field_specs: &[FieldSpec],
) -> Result<(), DeclarationError> {
    let mut fields: ThinVec<FieldDecl> = ThinVec::new();
    for field in field_specs {
        match field {
            FieldSpec::DotDotDot { .. } => make_partial(an, id)?,
            FieldSpec::Member(m) => {
                let bit_size = match &m.bit_size {
                    Some(expr) => Some(const_eval::eval_bit_size(expr)?),
                    None => None,
                };
                let written_dots_length =
                    matches!(&m.ty, AstType::Array { size: ArraySizeExpr::Dots, .. });
                let ty = type_resolver::resolve_type(an, &m.ty, true, None)?;
                if written_dots_length {
                    make_partial(an, id)?;
                }
                fields.push(FieldDecl {
                    name: m.name,
                    ty,
                    bit_size,
                });
            }
        }
    }
    let packed = an.options.packed;
    let rec = an.table.record_mut(id);
    rec.fields = Some(fields);
    if packed {
        rec.packed = true;
    }
    Ok(())
}

/// Record that the member list is incomplete. Only structs with a real C
/// name can defer their layout to an external measurement step.
pub(crate) fn make_partial(an: &mut Analyzer, id: RecordId) -> Result<(), DeclarationError> {
    if an.table.record(id).is_union {
        return Err(DeclarationError::CannotBePartial {
            type_name: an.table.record_c_name(id),
        });
    }
    if !an.table.record_has_c_name(id) {
        return Err(DeclarationError::PartialWithoutCName {
            type_name: an.table.record_c_name(id),
        });
    }
    an.table.record_mut(id).partial = true;
    Ok(())
}

pub(crate) fn realize_enum(
    an: &mut Analyzer,
    spec_id: EnumSpecId,
    force_name: Option<StringId>,
) -> Result<TypeRef, DeclarationError> {
    if let Some(&ty) = an.enums_seen.get(&spec_id) {
        return Ok(ty);
    }
    let ast = an.ast;
    let spec = ast.enum_spec(spec_id);

    if let Some(tag) = spec.tag {
        let key = DeclKey::new(DeclarationKind::Enum, tag);
        if let Some(DeclValue::Type(existing)) = an.registry.lookup(key) {
            // a second body for a registered enum is silently dropped
            an.enums_seen.insert(spec_id, existing);
            return Ok(existing);
        }
    }

    let ty = match &spec.body {
        Some(enumerator_specs) => {
            let name = match (spec.tag, force_name) {
                (Some(tag), _) => tag,
                (None, Some(force)) => StringId::new(format!("${}", force)),
                (None, None) => an.next_anonymous_name(),
            };
            let mut enumerators = ThinVec::new();
            let mut next_value: i64 = 0;
            for e in enumerator_specs {
                let value = match &e.value {
                    Some(expr) => const_eval::eval_const(expr)?,
                    None => next_value,
                };
                next_value = value.wrapping_add(1);
                enumerators.push(Enumerator {
                    name: e.name,
                    value,
                });
            }
            let id = an.table.new_enum(EnumDecl {
                name,
                forcename: force_name,
                enumerators,
                partial: spec.partial,
            });
            let ty = an.table.enum_type(id);
            an.registry.declare(
                DeclKey::new(DeclarationKind::Enum, name),
                DeclValue::Type(ty),
                an.options.override_,
            )?;
            ty
        }
        None => {
            // an opaque mention of an unregistered enum is a fresh type
            // every time; only a body registers one
            let Some(tag) = spec.tag else {
                unreachable!("enum specifier without tag or body");
            };
            let id = an.table.new_enum(EnumDecl {
                name: tag,
                forcename: None,
                enumerators: ThinVec::new(),
                partial: false,
            });
            an.table.enum_type(id)
        }
    };
    an.enums_seen.insert(spec_id, ty);
    Ok(ty)
}
