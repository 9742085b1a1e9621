//! Enum specifier parsing.

use thin_vec::ThinVec;

use crate::ast::{EnumSpec, EnumSpecId, EnumeratorSpec};
use crate::error::DeclarationError;
use crate::lexer::TokenKind;
use crate::parser::{expressions, Parser};

/// Parse an `enum` specifier, with the keyword as the current token, and
/// intern it in the syntax tree arena.
pub(crate) fn parse_enum_specifier(p: &mut Parser) -> Result<EnumSpecId, DeclarationError> {
    let line = p.current_line();
    p.advance(); // enum keyword
    let tag = match p.current_kind() {
        TokenKind::Identifier(name) => {
            p.advance();
            Some(name)
        }
        _ => None,
    };

    let mut partial = false;
    let body = if p.accept(TokenKind::LBrace).is_some() {
        let mut enumerators = ThinVec::new();
        loop {
            if p.accept(TokenKind::RBrace).is_some() {
                break;
            }
            // a trailing `...` closes the body and marks it incomplete
            if p.current_kind() == TokenKind::Ellipsis {
                p.advance();
                partial = true;
                p.expect(TokenKind::RBrace)?;
                break;
            }
            let enumerator_line = p.current_line();
            let name = p.expect_identifier("an enumerator name")?;
            let value = if p.accept(TokenKind::Equals).is_some() {
                Some(expressions::parse_const_expr(p)?)
            } else {
                None
            };
            enumerators.push(EnumeratorSpec {
                name,
                value,
                line: enumerator_line,
            });
            if p.accept(TokenKind::Comma).is_some() {
                continue;
            }
            p.expect(TokenKind::RBrace)?;
            break;
        }
        Some(enumerators)
    } else {
        None
    };

    if tag.is_none() && body.is_none() {
        return Err(p.syntax_error(line, "expected a tag name or an enumerator list"));
    }
    Ok(p.ast.add_enum(EnumSpec {
        tag,
        body,
        partial,
        line,
    }))
}
