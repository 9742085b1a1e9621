//! Struct and union specifier parsing.

use thin_vec::ThinVec;

use crate::ast::{FieldSpec, MemberSpec, RecordSpec, RecordSpecId};
use crate::error::DeclarationError;
use crate::lexer::TokenKind;
use crate::parser::{declarator, expressions, type_specifiers, Parser};

/// Parse a `struct`/`union` specifier, with the keyword as the current
/// token, and intern it in the syntax tree arena.
pub(crate) fn parse_record_specifier(
    p: &mut Parser,
    is_union: bool,
) -> Result<RecordSpecId, DeclarationError> {
    let line = p.current_line();
    p.advance(); // struct or union keyword
    let tag = match p.current_kind() {
        TokenKind::Identifier(name) => {
            p.advance();
            Some(name)
        }
        _ => None,
    };
    let fields = if p.accept(TokenKind::LBrace).is_some() {
        Some(parse_member_list(p)?)
    } else {
        None
    };
    if tag.is_none() && fields.is_none() {
        return Err(p.syntax_error(line, "expected a tag name or a member list"));
    }
    Ok(p.ast.add_record(RecordSpec {
        is_union,
        tag,
        fields,
        line,
    }))
}

fn parse_member_list(p: &mut Parser) -> Result<ThinVec<FieldSpec>, DeclarationError> {
    let mut fields = ThinVec::new();
    loop {
        if p.accept(TokenKind::RBrace).is_some() {
            return Ok(fields);
        }
        // `...;` marks the member list as incomplete
        if p.current_kind() == TokenKind::Ellipsis {
            let line = p.current_line();
            p.advance();
            p.expect(TokenKind::Semicolon)?;
            fields.push(FieldSpec::DotDotDot { line });
            continue;
        }
        parse_member_declaration(p, &mut fields)?;
    }
}

fn parse_member_declaration(
    p: &mut Parser,
    fields: &mut ThinVec<FieldSpec>,
) -> Result<(), DeclarationError> {
    let specs = type_specifiers::parse_decl_specifiers(p)?;
    if specs.is_typedef {
        return Err(p.syntax_error(specs.line, "typedef is not allowed here"));
    }

    // no declarator at all: an unnamed member, e.g. a nested anonymous record
    if p.accept(TokenKind::Semicolon).is_some() {
        fields.push(FieldSpec::Member(MemberSpec {
            name: None,
            ty: specs.base_type(),
            bit_size: None,
            line: specs.line,
        }));
        return Ok(());
    }

    loop {
        let line = p.current_line();
        let (name, ty, bit_size);
        if p.current_kind() == TokenKind::Colon {
            // unnamed bit field
            p.advance();
            name = None;
            ty = specs.base_type();
            bit_size = Some(expressions::parse_const_expr(p)?);
        } else {
            let decl = declarator::parse_declarator(p)?;
            let (declared, declared_ty) = decl.apply(specs.base_type());
            name = declared;
            ty = declared_ty;
            bit_size = if p.accept(TokenKind::Colon).is_some() {
                Some(expressions::parse_const_expr(p)?)
            } else {
                None
            };
        }
        fields.push(FieldSpec::Member(MemberSpec {
            name,
            ty,
            bit_size,
            line,
        }));
        if p.accept(TokenKind::Comma).is_some() {
            continue;
        }
        p.expect(TokenKind::Semicolon)?;
        return Ok(());
    }
}
