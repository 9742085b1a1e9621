//! Top-level declaration parsing: typedefs, variables, constants,
//! functions and tag-only statements.

use crate::ast::{AstType, Declaration, TopDecl, TypedefDecl};
use crate::error::DeclarationError;
use crate::lexer::TokenKind;
use crate::parser::{declarator, expressions, type_specifiers, Parser};

pub(crate) fn parse_declaration(p: &mut Parser) -> Result<(), DeclarationError> {
    let specs = type_specifiers::parse_decl_specifiers(p)?;

    // tag-only statement such as `struct foo { int a; };`
    if p.current_kind() == TokenKind::Semicolon {
        p.advance();
        if specs.is_typedef {
            return Err(DeclarationError::TypedefWithoutName { line: specs.line });
        }
        p.ast.decls.push(TopDecl::Declaration(Declaration {
            name: None,
            ty: specs.base_type(),
            line: specs.line,
        }));
        return Ok(());
    }

    loop {
        let line = p.current_line();
        let decl = declarator::parse_declarator(p)?;
        let (name, ty) = decl.apply(specs.base_type());
        if specs.is_typedef {
            let name = match name {
                Some(name) => name,
                None => return Err(DeclarationError::TypedefWithoutName { line }),
            };
            if p.current_kind() == TokenKind::Equals {
                return Err(p.syntax_error(line, "initializer in typedef"));
            }
            p.types.add_typedef(name);
            p.ast.decls.push(TopDecl::Typedef(TypedefDecl { name, ty, line }));
        } else {
            // an initializer may follow; it parses but carries no meaning here
            if p.accept(TokenKind::Equals).is_some() {
                expressions::parse_const_expr(p)?;
            }
            p.ast
                .decls
                .push(TopDecl::Declaration(Declaration { name, ty, line }));
        }
        if p.accept(TokenKind::Comma).is_some() {
            continue;
        }
        p.expect(TokenKind::Semicolon)?;
        return Ok(());
    }
}

/// Specifiers plus an abstract declarator, terminated by end of input.
pub(crate) fn parse_type_name(p: &mut Parser) -> Result<AstType, DeclarationError> {
    let specs = type_specifiers::parse_decl_specifiers(p)?;
    if specs.is_typedef {
        return Err(p.syntax_error(specs.line, "typedef is not allowed here"));
    }
    let decl = declarator::parse_declarator(p)?;
    let (_, ty) = decl.apply(specs.base_type());
    p.expect(TokenKind::Eof)?;
    Ok(ty)
}
