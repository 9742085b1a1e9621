//! The constant-expression grammar.
//!
//! Deliberately narrow: integer literals, unary minus, parentheses and
//! bare identifiers. Identifiers are carried through so the analyzer can
//! report them as non-constant instead of a generic syntax error.

use crate::ast::ConstExpr;
use crate::error::DeclarationError;
use crate::lexer::TokenKind;
use crate::parser::Parser;

pub(crate) fn parse_const_expr(p: &mut Parser) -> Result<ConstExpr, DeclarationError> {
    let token = p.current();
    match token.kind {
        TokenKind::Integer(value) => {
            p.advance();
            Ok(ConstExpr::Int {
                value,
                line: token.line,
            })
        }
        TokenKind::Minus => {
            p.advance();
            let inner = parse_const_expr(p)?;
            Ok(ConstExpr::Neg {
                inner: Box::new(inner),
                line: token.line,
            })
        }
        TokenKind::Identifier(name) => {
            p.advance();
            Ok(ConstExpr::Ident {
                name,
                line: token.line,
            })
        }
        TokenKind::LParen => {
            p.advance();
            let inner = parse_const_expr(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(inner)
        }
        _ => Err(p.syntax_error(token.line, "expected a constant expression")),
    }
}
