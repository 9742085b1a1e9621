//! Declarator parsing.
//!
//! Declarators are parsed into a small inside-out tree first and then
//! [`Declarator::apply`] rewrites them onto the base type, producing the
//! outside-in [`AstType`] the rest of the crate works with. This is the
//! usual two-step dance that keeps `int *x[4]` (array of pointers) and
//! `int (*x)[4]` (pointer to array) straight.

use thin_vec::ThinVec;

use crate::ast::{ArraySizeExpr, AstType, ParamDecl, TypeQualifiers};
use crate::error::DeclarationError;
use crate::lexer::TokenKind;
use crate::parser::{expressions, type_specifiers, Parser};
use crate::StringId;

#[derive(Debug)]
pub(crate) enum Declarator {
    /// The center of the declarator; `None` for abstract declarators.
    Name(Option<StringId>),
    Pointer {
        quals: TypeQualifiers,
        inner: Box<Declarator>,
    },
    Array {
        inner: Box<Declarator>,
        size: ArraySizeExpr,
    },
    Function {
        inner: Box<Declarator>,
        params: ThinVec<ParamDecl>,
        varargs: bool,
    },
}

impl Declarator {
    /// Wrap `base` in the type constructors this declarator spells, from
    /// the outside in, and return the declared name.
    pub(crate) fn apply(self, base: AstType) -> (Option<StringId>, AstType) {
        match self {
            Declarator::Name(name) => (name, base),
            Declarator::Pointer { quals, inner } => inner.apply(AstType::Pointer {
                inner: Box::new(base),
                quals,
            }),
            Declarator::Array { inner, size } => inner.apply(AstType::Array {
                inner: Box::new(base),
                size,
            }),
            Declarator::Function {
                inner,
                params,
                varargs,
            } => inner.apply(AstType::Function {
                result: Box::new(base),
                params,
                varargs,
            }),
        }
    }
}

pub(crate) fn parse_declarator(p: &mut Parser) -> Result<Declarator, DeclarationError> {
    if p.accept(TokenKind::Star).is_some() {
        let quals = p.parse_qualifiers();
        let inner = parse_declarator(p)?;
        return Ok(Declarator::Pointer {
            quals,
            inner: Box::new(inner),
        });
    }
    parse_direct_declarator(p)
}

fn parse_direct_declarator(p: &mut Parser) -> Result<Declarator, DeclarationError> {
    let mut decl = match p.current_kind() {
        TokenKind::Identifier(name) => {
            p.advance();
            Declarator::Name(Some(name))
        }
        TokenKind::LParen => {
            let next = p.peek_kind();
            if next == TokenKind::RParen || next == TokenKind::Ellipsis || p.starts_type(next) {
                // parameter list of an unnamed declarator, handled below
                Declarator::Name(None)
            } else {
                p.advance();
                let inner = parse_declarator(p)?;
                p.expect(TokenKind::RParen)?;
                inner
            }
        }
        _ => Declarator::Name(None),
    };

    loop {
        if p.accept(TokenKind::LBracket).is_some() {
            let size = parse_array_size(p)?;
            decl = Declarator::Array {
                inner: Box::new(decl),
                size,
            };
        } else if p.accept(TokenKind::LParen).is_some() {
            let (params, varargs) = parse_parameter_list(p)?;
            decl = Declarator::Function {
                inner: Box::new(decl),
                params,
                varargs,
            };
        } else {
            return Ok(decl);
        }
    }
}

fn parse_array_size(p: &mut Parser) -> Result<ArraySizeExpr, DeclarationError> {
    if p.accept(TokenKind::RBracket).is_some() {
        return Ok(ArraySizeExpr::Open);
    }
    if p.accept(TokenKind::Ellipsis).is_some() {
        p.expect(TokenKind::RBracket)?;
        return Ok(ArraySizeExpr::Dots);
    }
    let expr = expressions::parse_const_expr(p)?;
    p.expect(TokenKind::RBracket)?;
    Ok(ArraySizeExpr::Fixed(expr))
}

fn parse_parameter_list(
    p: &mut Parser,
) -> Result<(ThinVec<ParamDecl>, bool), DeclarationError> {
    let mut params = ThinVec::new();
    if p.accept(TokenKind::RParen).is_some() {
        return Ok((params, false));
    }
    let mut varargs = false;
    loop {
        if p.accept(TokenKind::Ellipsis).is_some() {
            varargs = true;
            p.expect(TokenKind::RParen)?;
            break;
        }
        let specs = type_specifiers::parse_decl_specifiers(p)?;
        if specs.is_typedef {
            return Err(p.syntax_error(specs.line, "typedef is not allowed here"));
        }
        let declarator = parse_declarator(p)?;
        let (name, ty) = declarator.apply(specs.base_type());
        params.push(ParamDecl { name, ty });
        if p.accept(TokenKind::Comma).is_some() {
            continue;
        }
        p.expect(TokenKind::RParen)?;
        break;
    }
    Ok((params, varargs))
}
