#![cfg(test)]

use super::*;

fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source)
        .expect("tokenize failed")
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        kinds("unsigned long x;"),
        vec![
            TokenKind::Unsigned,
            TokenKind::Long,
            TokenKind::Identifier(StringId::new("x")),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]
    );
    assert_eq!(
        kinds("_Bool flag"),
        vec![
            TokenKind::Bool,
            TokenKind::Identifier(StringId::new("flag")),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn punctuation_and_ellipsis() {
    assert_eq!(
        kinds("int f(int, ...);"),
        vec![
            TokenKind::Int,
            TokenKind::Identifier(StringId::new("f")),
            TokenKind::LParen,
            TokenKind::Int,
            TokenKind::Comma,
            TokenKind::Ellipsis,
            TokenKind::RParen,
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]
    );
    assert_eq!(
        kinds("a[...]"),
        vec![
            TokenKind::Identifier(StringId::new("a")),
            TokenKind::LBracket,
            TokenKind::Ellipsis,
            TokenKind::RBracket,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn integer_literals() {
    assert_eq!(kinds("42"), vec![TokenKind::Integer(42), TokenKind::Eof]);
    assert_eq!(kinds("0x1F"), vec![TokenKind::Integer(31), TokenKind::Eof]);
    assert_eq!(kinds("010"), vec![TokenKind::Integer(8), TokenKind::Eof]);
    assert_eq!(kinds("0"), vec![TokenKind::Integer(0), TokenKind::Eof]);
    assert_eq!(
        kinds("42UL"),
        vec![TokenKind::Integer(42), TokenKind::Eof],
        "suffixes are consumed"
    );
    assert_eq!(
        kinds("-3"),
        vec![TokenKind::Minus, TokenKind::Integer(3), TokenKind::Eof]
    );
}

#[test]
fn integer_overflow_is_reported() {
    let err = tokenize("9223372036854775808").unwrap_err();
    assert_eq!(err, DeclarationError::IntegerOutOfRange { line: 1 });
    assert!(tokenize("9223372036854775807").is_ok());
}

#[test]
fn lines_are_tracked() {
    let tokens = tokenize("int a;\n\nshort b;").unwrap();
    let lines: Vec<u32> = tokens.iter().map(|t| t.line).collect();
    assert_eq!(lines, [1, 1, 1, 3, 3, 3, 3]);
}

#[test]
fn stray_characters_are_rejected() {
    assert_eq!(
        tokenize("int $x;").unwrap_err(),
        DeclarationError::UnexpectedCharacter { ch: '$', line: 1 }
    );
    assert_eq!(
        tokenize("a .. b").unwrap_err(),
        DeclarationError::UnexpectedCharacter { ch: '.', line: 1 }
    );
}

#[test]
fn classifiers() {
    assert!(TokenKind::Unsigned.is_primitive_word());
    assert!(TokenKind::Const.is_type_qualifier());
    assert!(TokenKind::Extern.is_ignored_specifier());
    assert!(!TokenKind::Struct.is_primitive_word());
}
