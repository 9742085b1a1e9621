//! Hand-written scanner for the C declaration subset.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::DeclarationError;
use crate::StringId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // type specifier keywords
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Bool,
    Complex,
    // tag and declaration keywords
    Struct,
    Union,
    Enum,
    Typedef,
    // qualifiers
    Const,
    Volatile,
    Restrict,
    // storage classes accepted and ignored
    Extern,
    Static,
    Auto,
    Register,
    Inline,
    Identifier(StringId),
    Integer(i64),
    Star,
    Comma,
    Semicolon,
    Colon,
    Equals,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Ellipsis,
    Eof,
}

impl TokenKind {
    /// Keywords that contribute to a primitive type spelling.
    pub fn is_primitive_word(self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Signed
                | TokenKind::Unsigned
                | TokenKind::Bool
                | TokenKind::Complex
        )
    }

    pub fn is_type_qualifier(self) -> bool {
        matches!(
            self,
            TokenKind::Const | TokenKind::Volatile | TokenKind::Restrict
        )
    }

    /// Storage classes and function specifiers that are parsed and dropped.
    pub fn is_ignored_specifier(self) -> bool {
        matches!(
            self,
            TokenKind::Extern
                | TokenKind::Static
                | TokenKind::Auto
                | TokenKind::Register
                | TokenKind::Inline
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "void" => TokenKind::Void,
        "char" => TokenKind::Char,
        "short" => TokenKind::Short,
        "int" => TokenKind::Int,
        "long" => TokenKind::Long,
        "float" => TokenKind::Float,
        "double" => TokenKind::Double,
        "signed" => TokenKind::Signed,
        "unsigned" => TokenKind::Unsigned,
        "_Bool" => TokenKind::Bool,
        "_Complex" => TokenKind::Complex,
        "struct" => TokenKind::Struct,
        "union" => TokenKind::Union,
        "enum" => TokenKind::Enum,
        "typedef" => TokenKind::Typedef,
        "const" => TokenKind::Const,
        "volatile" => TokenKind::Volatile,
        "restrict" => TokenKind::Restrict,
        "extern" => TokenKind::Extern,
        "static" => TokenKind::Static,
        "auto" => TokenKind::Auto,
        "register" => TokenKind::Register,
        "inline" => TokenKind::Inline,
        _ => return None,
    })
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
    tokens: Vec<Token>,
}

/// Scan prepared declaration text into a token stream ending with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, DeclarationError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn run(&mut self) -> Result<(), DeclarationError> {
        while let Some(c) = self.chars.next() {
            match c {
                '\n' => self.line += 1,
                c if c.is_whitespace() => {}
                c if c.is_ascii_alphabetic() || c == '_' => self.word(c),
                c if c.is_ascii_digit() => self.number(c)?,
                '*' => self.push(TokenKind::Star),
                ',' => self.push(TokenKind::Comma),
                ';' => self.push(TokenKind::Semicolon),
                ':' => self.push(TokenKind::Colon),
                '=' => self.push(TokenKind::Equals),
                '-' => self.push(TokenKind::Minus),
                '(' => self.push(TokenKind::LParen),
                ')' => self.push(TokenKind::RParen),
                '[' => self.push(TokenKind::LBracket),
                ']' => self.push(TokenKind::RBracket),
                '{' => self.push(TokenKind::LBrace),
                '}' => self.push(TokenKind::RBrace),
                '.' => {
                    if self.chars.next_if_eq(&'.').is_some()
                        && self.chars.next_if_eq(&'.').is_some()
                    {
                        self.push(TokenKind::Ellipsis);
                    } else {
                        return Err(DeclarationError::UnexpectedCharacter {
                            ch: '.',
                            line: self.line,
                        });
                    }
                }
                c => {
                    return Err(DeclarationError::UnexpectedCharacter { ch: c, line: self.line })
                }
            }
        }
        self.push(TokenKind::Eof);
        Ok(())
    }

    fn word(&mut self, first: char) {
        let mut word = String::new();
        word.push(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match keyword(&word) {
            Some(kind) => self.push(kind),
            None => self.push(TokenKind::Identifier(StringId::new(word.as_str()))),
        }
    }

    fn number(&mut self, first: char) -> Result<(), DeclarationError> {
        let mut value: u128 = 0;
        let radix: u128;
        if first == '0' && matches!(self.chars.peek(), Some('x') | Some('X')) {
            self.chars.next();
            radix = 16;
        } else if first == '0' {
            radix = 8;
        } else {
            radix = 10;
            value = first as u128 - '0' as u128;
        }
        while let Some(&c) = self.chars.peek() {
            let digit = match c.to_digit(radix as u32) {
                Some(d) => d as u128,
                None => break,
            };
            self.chars.next();
            value = value * radix + digit;
            if value > i64::MAX as u128 {
                return Err(DeclarationError::IntegerOutOfRange { line: self.line });
            }
        }
        // integer suffixes are accepted and carry no meaning here
        while matches!(self.chars.peek(), Some('u') | Some('U') | Some('l') | Some('L')) {
            self.chars.next();
        }
        self.push(TokenKind::Integer(value as i64));
        Ok(())
    }
}

#[cfg(test)]
mod tests_lexer;
