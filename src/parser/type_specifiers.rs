//! Declaration specifier parsing: qualifiers, primitive keywords, tagged
//! types, typedef names and the `...` specifier forms.

use thin_vec::ThinVec;

use crate::ast::{AstType, PrimWord, TypeQualifiers, TypeSpec};
use crate::error::DeclarationError;
use crate::lexer::TokenKind;
use crate::parser::{enum_parsing, struct_parsing, Parser};

/// The collected declaration specifiers of one declaration, shared by
/// every declarator that follows them.
#[derive(Debug, Clone)]
pub(crate) struct DeclSpecs {
    pub spec: TypeSpec,
    pub quals: TypeQualifiers,
    pub is_typedef: bool,
    pub line: u32,
}

impl DeclSpecs {
    pub(crate) fn base_type(&self) -> AstType {
        AstType::Base {
            spec: self.spec.clone(),
            quals: self.quals,
            line: self.line,
        }
    }
}

pub(crate) fn parse_decl_specifiers(p: &mut Parser) -> Result<DeclSpecs, DeclarationError> {
    let line = p.current_line();
    let mut quals = TypeQualifiers::empty();
    let mut is_typedef = false;
    let mut words: ThinVec<PrimWord> = ThinVec::new();
    let mut spec: Option<TypeSpec> = None;

    loop {
        let kind = p.current_kind();
        match kind {
            TokenKind::Const => {
                quals |= TypeQualifiers::CONST;
                p.advance();
            }
            TokenKind::Volatile => {
                quals |= TypeQualifiers::VOLATILE;
                p.advance();
            }
            TokenKind::Restrict => {
                quals |= TypeQualifiers::RESTRICT;
                p.advance();
            }
            k if k.is_ignored_specifier() => {
                p.advance();
            }
            TokenKind::Typedef => {
                is_typedef = true;
                p.advance();
            }
            k if k.is_primitive_word() => {
                if spec.is_some() {
                    return Err(two_or_more(p));
                }
                words.push(prim_word(k));
                p.advance();
            }
            TokenKind::Struct | TokenKind::Union => {
                if spec.is_some() || !words.is_empty() {
                    return Err(two_or_more(p));
                }
                let is_union = kind == TokenKind::Union;
                let id = struct_parsing::parse_record_specifier(p, is_union)?;
                spec = Some(TypeSpec::Record(id));
            }
            TokenKind::Enum => {
                if spec.is_some() || !words.is_empty() {
                    return Err(two_or_more(p));
                }
                let id = enum_parsing::parse_enum_specifier(p)?;
                spec = Some(TypeSpec::Enum(id));
            }
            TokenKind::Identifier(name)
                if spec.is_none() && words.is_empty() && p.types.is_type_name(name) =>
            {
                spec = Some(TypeSpec::Named(name));
                p.advance();
            }
            // `typedef ... t;` and `typedef int... t;`
            TokenKind::Ellipsis if spec.is_none() => {
                let dots_line = p.current_line();
                p.advance();
                if words.is_empty() {
                    spec = Some(TypeSpec::DotDotDot);
                } else if words.iter().any(|w| {
                    matches!(
                        w,
                        PrimWord::Void | PrimWord::Float | PrimWord::Double | PrimWord::Complex
                    )
                }) {
                    return Err(DeclarationError::BadDotDotDot { line: dots_line });
                } else {
                    spec = Some(TypeSpec::UnknownInt(std::mem::take(&mut words)));
                }
                break;
            }
            _ => break,
        }
    }

    let spec = match spec {
        Some(spec) => {
            if !words.is_empty() {
                return Err(two_or_more(p));
            }
            spec
        }
        None => {
            if words.is_empty() {
                return Err(p.syntax_error(line, "expected a type specifier"));
            }
            TypeSpec::Primitive(words)
        }
    };

    Ok(DeclSpecs {
        spec,
        quals,
        is_typedef,
        line,
    })
}

fn two_or_more(p: &Parser) -> DeclarationError {
    p.syntax_error(
        p.current_line(),
        "two or more data types in declaration specifiers",
    )
}

fn prim_word(kind: TokenKind) -> PrimWord {
    match kind {
        TokenKind::Void => PrimWord::Void,
        TokenKind::Char => PrimWord::Char,
        TokenKind::Short => PrimWord::Short,
        TokenKind::Int => PrimWord::Int,
        TokenKind::Long => PrimWord::Long,
        TokenKind::Float => PrimWord::Float,
        TokenKind::Double => PrimWord::Double,
        TokenKind::Signed => PrimWord::Signed,
        TokenKind::Unsigned => PrimWord::Unsigned,
        TokenKind::Bool => PrimWord::Bool,
        TokenKind::Complex => PrimWord::Complex,
        _ => unreachable!("not a primitive type keyword: {:?}", kind),
    }
}
