//! Recursive-descent parser for the C declaration subset.
//!
//! This module owns the parser state and the token-level helpers. The
//! grammar productions live in specialized sub-modules: declaration
//! specifiers, declarators, struct/union bodies, enum bodies and the
//! narrow constant-expression grammar.
//!
//! The parser only builds the syntax tree; name resolution, registration
//! and all the `...` bookkeeping happen later in [`crate::semantic`].

use hashbrown::HashSet;
use log::{debug, trace};

use crate::ast::{Ast, AstType, TypeQualifiers};
use crate::error::DeclarationError;
use crate::lexer::{Token, TokenKind};
use crate::source::SourceText;
use crate::StringId;

pub mod declarations;
pub mod declarator;
pub mod enum_parsing;
pub mod expressions;
pub mod struct_parsing;
pub mod type_specifiers;


/// Named types that are recognized without a preceding `typedef`.
///
/// These are exactly the identifier-shaped primitives of the type model;
/// resolving them is the analyzer's job, the parser only needs to know
/// that an identifier in specifier position denotes a type.
const BUILTIN_TYPE_NAMES: &[&str] = &[
    "wchar_t",
    "char16_t",
    "char32_t",
    "int8_t",
    "uint8_t",
    "int16_t",
    "uint16_t",
    "int32_t",
    "uint32_t",
    "int64_t",
    "uint64_t",
    "intptr_t",
    "uintptr_t",
    "ptrdiff_t",
    "size_t",
    "ssize_t",
    "int_least8_t",
    "uint_least8_t",
    "int_least16_t",
    "uint_least16_t",
    "int_least32_t",
    "uint_least32_t",
    "int_least64_t",
    "uint_least64_t",
    "int_fast8_t",
    "uint_fast8_t",
    "int_fast16_t",
    "uint_fast16_t",
    "int_fast32_t",
    "uint_fast32_t",
    "int_fast64_t",
    "uint_fast64_t",
    "intmax_t",
    "uintmax_t",
];

/// Type context for tracking typedef names across `cdef` calls.
#[derive(Debug)]
pub struct TypeDefContext {
    typedef_names: HashSet<StringId>,
}

impl Default for TypeDefContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeDefContext {
    /// Create a new type context seeded with the builtin named types.
    pub fn new() -> Self {
        let mut typedef_names = HashSet::new();
        for name in BUILTIN_TYPE_NAMES {
            typedef_names.insert(StringId::new(name));
        }
        TypeDefContext { typedef_names }
    }

    /// Check if a symbol is a typedef name.
    pub fn is_type_name(&self, symbol: StringId) -> bool {
        let result = self.typedef_names.contains(&symbol);
        trace!("is_type_name({:?}) = {}", symbol, result);
        result
    }

    /// Add a typedef name.
    pub fn add_typedef(&mut self, symbol: StringId) {
        self.typedef_names.insert(symbol);
    }
}

/// Main parser structure.
pub struct Parser<'a, 's> {
    tokens: &'s [Token],
    current_idx: usize,
    ast: &'a mut Ast,
    source: &'s SourceText,
    types: TypeDefContext,
}

impl<'a, 's> Parser<'a, 's> {
    /// Create a new parser over a token stream produced by
    /// [`crate::lexer::tokenize`]. The stream always ends with `Eof`.
    pub fn new(
        tokens: &'s [Token],
        ast: &'a mut Ast,
        source: &'s SourceText,
        types: TypeDefContext,
    ) -> Self {
        Parser {
            tokens,
            current_idx: 0,
            ast,
            source,
            types,
        }
    }

    /// Parse every top-level declaration until end of input.
    pub fn parse_translation_unit(&mut self) -> Result<(), DeclarationError> {
        debug!("parsing {} tokens", self.tokens.len());
        loop {
            match self.current_kind() {
                TokenKind::Eof => break,
                // stray semicolons are harmless
                TokenKind::Semicolon => {
                    self.advance();
                }
                _ => {
                    trace!("declaration at line {}", self.current_line());
                    declarations::parse_declaration(self)?;
                }
            }
        }
        Ok(())
    }

    /// Parse a standalone type name (declaration specifiers plus an
    /// abstract declarator), as used by `Ffi::typeof_`.
    pub fn parse_type_name(&mut self) -> Result<AstType, DeclarationError> {
        declarations::parse_type_name(self)
    }

    // ---- token helpers -------------------------------------------------

    /// Current token; the stream is never empty and ends with `Eof`.
    fn current(&self) -> Token {
        self.tokens[self.current_idx.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn current_line(&self) -> u32 {
        self.current().line
    }

    /// Peek at the token after the current one.
    fn peek_kind(&self) -> TokenKind {
        self.tokens
            .get(self.current_idx + 1)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    /// Advance to the next token and return the consumed one.
    fn advance(&mut self) -> Token {
        let token = self.current();
        if self.current_idx < self.tokens.len() {
            self.current_idx += 1;
        }
        token
    }

    /// Consume the current token if it has the given kind.
    fn accept(&mut self, accepted: TokenKind) -> Option<Token> {
        if self.current_kind() == accepted {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Consume the current token, requiring the given kind.
    fn expect(&mut self, expected: TokenKind) -> Result<Token, DeclarationError> {
        let token = self.current();
        if token.kind == expected {
            self.advance();
            Ok(token)
        } else {
            Err(self.syntax_error(
                token.line,
                format!("expected {:?}, found {:?}", expected, token.kind),
            ))
        }
    }

    /// Consume an identifier token, requiring one.
    fn expect_identifier(&mut self, what: &str) -> Result<StringId, DeclarationError> {
        let token = self.current();
        if let TokenKind::Identifier(name) = token.kind {
            self.advance();
            Ok(name)
        } else {
            Err(self.syntax_error(token.line, format!("expected {}", what)))
        }
    }

    /// Whether `kind` can begin declaration specifiers. Used to tell a
    /// parenthesized declarator from a parameter list.
    fn starts_type(&self, kind: TokenKind) -> bool {
        match kind {
            TokenKind::Struct | TokenKind::Union | TokenKind::Enum => true,
            TokenKind::Identifier(name) => self.types.is_type_name(name),
            _ => {
                kind.is_primitive_word() || kind.is_type_qualifier() || kind.is_ignored_specifier()
            }
        }
    }

    /// Collect qualifier keywords, e.g. after a `*`.
    fn parse_qualifiers(&mut self) -> TypeQualifiers {
        let mut quals = TypeQualifiers::empty();
        loop {
            match self.current_kind() {
                TokenKind::Const => quals |= TypeQualifiers::CONST,
                TokenKind::Volatile => quals |= TypeQualifiers::VOLATILE,
                TokenKind::Restrict => quals |= TypeQualifiers::RESTRICT,
                _ => return quals,
            }
            self.advance();
        }
    }

    /// Build a grammar error carrying the offending source line.
    fn syntax_error(&self, line: u32, detail: impl Into<String>) -> DeclarationError {
        DeclarationError::Syntax {
            text: self.source.line_text(line).to_string(),
            line,
            detail: detail.into(),
        }
    }
}
