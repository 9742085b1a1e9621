//! Resolution of syntax-tree types into interned model types.

use crate::ast::{ArraySizeExpr, AstType, PrimWord, TypeQualifiers, TypeSpec};
use crate::error::DeclarationError;
use crate::model::{ArrayLength, Primitive, TypeKind, TypeRef};
use crate::semantic::{const_eval, records, Analyzer};
use crate::StringId;

/// Resolve `ty` to an interned type.
///
/// `partial_ok` permits a `[...]` length on the outermost array level;
/// it never propagates inward. `declared_name` is the name being
/// declared, threaded through for error messages only.
pub(crate) fn resolve_type(
    an: &mut Analyzer,
    ty: &AstType,
    partial_ok: bool,
    declared_name: Option<StringId>,
) -> Result<TypeRef, DeclarationError> {
    match ty {
        AstType::Base { spec, line, .. } => match spec {
            TypeSpec::Primitive(words) => resolve_primitive(an, words, *line),
            TypeSpec::Named(name) => {
                if let Some(ty) = an.registry.typedef(*name) {
                    return Ok(ty);
                }
                match Primitive::from_name(name.as_str()) {
                    Some(prim) => Ok(an.table.primitive(prim)),
                    None => Err(DeclarationError::UnknownType {
                        name: name.to_string(),
                        line: *line,
                    }),
                }
            }
            TypeSpec::Record(id) => records::realize_record(an, *id, None),
            TypeSpec::Enum(id) => records::realize_enum(an, *id, None),
            // only `typedef` gives these two a meaning
            TypeSpec::DotDotDot | TypeSpec::UnknownInt(_) => {
                Err(DeclarationError::BadDotDotDot { line: *line })
            }
        },
        AstType::Pointer { inner, .. } => {
            let pointee_const = matches!(
                &**inner,
                AstType::Base { quals, .. } if quals.contains(TypeQualifiers::CONST)
            );
            let target = resolve_type(an, inner, false, None)?;
            if matches!(an.table.kind(target), TypeKind::Function { .. }) {
                Ok(an.table.as_function_pointer(target))
            } else if pointee_const {
                Ok(an.table.const_pointer_to(target))
            } else {
                Ok(an.table.pointer_to(target))
            }
        }
        AstType::Array { inner, size } => {
            let length = match size {
                ArraySizeExpr::Open => ArrayLength::Open,
                ArraySizeExpr::Dots if partial_ok => ArrayLength::Dots,
                ArraySizeExpr::Dots => {
                    return Err(DeclarationError::NonConstantExpression {
                        line: inner.line(),
                    })
                }
                ArraySizeExpr::Fixed(expr) => {
                    ArrayLength::Fixed(const_eval::eval_array_length(expr)?)
                }
            };
            let item = resolve_type(an, inner, false, None)?;
            Ok(an.table.array_of(item, length))
        }
        AstType::Function {
            result,
            params,
            varargs,
        } => {
            // `f(void)` means an empty parameter list
            let params = if params.len() == 1 && is_plain_void(&params[0].ty) {
                &params[..0]
            } else {
                &params[..]
            };
            let mut args = Vec::with_capacity(params.len());
            for param in params {
                args.push(resolve_argument(an, &param.ty)?);
            }
            if args.is_empty() && *varargs {
                return Err(DeclarationError::FunctionDotsOnly {
                    name: declared_name
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "in expression".to_string()),
                });
            }
            let result = resolve_type(an, result, false, None)?;
            Ok(an.table.intern(TypeKind::Function {
                args,
                result,
                varargs: *varargs,
            }))
        }
    }
}

/// Parameters undergo the C argument adjustments: arrays decay to
/// pointers without their length ever being inspected, and functions
/// become function pointers.
fn resolve_argument(an: &mut Analyzer, ty: &AstType) -> Result<TypeRef, DeclarationError> {
    if let AstType::Array { inner, .. } = ty {
        let item = resolve_type(an, inner, false, None)?;
        return Ok(an.table.pointer_to(item));
    }
    let resolved = resolve_type(an, ty, false, None)?;
    match an.table.kind(resolved) {
        TypeKind::Function { .. } => Ok(an.table.as_function_pointer(resolved)),
        // typedefs of array types decay the same way
        TypeKind::Array { item, .. } => {
            let item = *item;
            Ok(an.table.pointer_to(item))
        }
        _ => Ok(resolved),
    }
}

fn is_plain_void(ty: &AstType) -> bool {
    matches!(
        ty,
        AstType::Base {
            spec: TypeSpec::Primitive(words),
            ..
        } if words.as_slice() == [PrimWord::Void]
    )
}

/// Normalize a multi-keyword spelling to its canonical form: `signed` is
/// dropped except in `signed char`, a trailing `int` is dropped except in
/// `unsigned int`, and a lone `signed`/`unsigned` means `int`.
fn resolve_primitive(
    an: &mut Analyzer,
    words: &[PrimWord],
    line: u32,
) -> Result<TypeRef, DeclarationError> {
    let mut names: Vec<&'static str> = words.iter().map(|w| w.as_str()).collect();
    if names == ["signed"] || names == ["unsigned"] {
        names.push("int");
    }
    if names.first() == Some(&"signed") && names != ["signed", "char"] {
        names.remove(0);
    }
    if names.len() > 1 && names.last() == Some(&"int") && names != ["unsigned", "int"] {
        names.pop();
    }
    let ident = names.join(" ");
    if ident == "void" {
        return Ok(an.table.void_type());
    }
    match Primitive::from_name(&ident) {
        Some(prim) => Ok(an.table.primitive(prim)),
        None => Err(DeclarationError::UnknownType { name: ident, line }),
    }
}
