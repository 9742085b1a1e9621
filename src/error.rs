//! Error types for declaration parsing and module verification.

use thiserror::Error;

/// Errors raised while C declaration text is parsed and registered.
///
/// Variants produced before or during grammar analysis carry the 1-based
/// source line; variants raised while declarations are being resolved
/// against the registry do not, because the offending construct may span
/// several earlier lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("unexpected character {ch:?} on line {line}")]
    UnexpectedCharacter { ch: char, line: u32 },

    #[error("unterminated comment starting on line {line}")]
    UnterminatedComment { line: u32 },

    #[error("unsupported preprocessor directive \"{text}\" on line {line}")]
    Directive { text: String, line: u32 },

    #[error(
        "only supports \"#define {name} ...\" (literally dot-dot-dot) or \
         \"#define {name} NUMBER\" (with NUMBER an integer constant)"
    )]
    BadDefine { name: String, line: u32 },

    #[error("integer constant out of range on line {line}")]
    IntegerOutOfRange { line: u32 },

    /// Grammar-level failure; `text` is the offending source line.
    #[error("cannot parse \"{text}\" on line {line}: {detail}")]
    Syntax {
        text: String,
        line: u32,
        detail: String,
    },

    #[error("typedef does not declare any name")]
    TypedefWithoutName { line: u32 },

    #[error("construct does not declare any variable")]
    NoDeclaredVariable { line: u32 },

    #[error("bad usage of \"...\"")]
    BadDotDotDot { line: u32 },

    #[error("unknown type name \"{name}\"")]
    UnknownType { name: String, line: u32 },

    #[error("unsupported non-constant or not immediately constant expression")]
    NonConstantExpression { line: u32 },

    #[error("{name}: a function with only \"(...)\" as argument is not correct C")]
    FunctionDotsOnly { name: String },

    /// Conflicting redeclaration of a registry key such as `function foo`.
    #[error("multiple declarations of {key} (for interactive usage, declare with override enabled)")]
    MultipleDeclarations { key: String },

    #[error("duplicate declaration of {kind} {name}")]
    DuplicateBody { kind: &'static str, name: String },

    #[error("{type_name} cannot be partial")]
    CannotBePartial { type_name: String },

    #[error("{type_name} is partial but has no C name")]
    PartialWithoutCName { type_name: String },
}

impl DeclarationError {
    /// Source line the error points at, when one is known.
    pub fn line(&self) -> Option<u32> {
        match self {
            DeclarationError::UnexpectedCharacter { line, .. }
            | DeclarationError::UnterminatedComment { line }
            | DeclarationError::Directive { line, .. }
            | DeclarationError::BadDefine { line, .. }
            | DeclarationError::IntegerOutOfRange { line }
            | DeclarationError::Syntax { line, .. }
            | DeclarationError::TypedefWithoutName { line }
            | DeclarationError::NoDeclaredVariable { line }
            | DeclarationError::BadDotDotDot { line }
            | DeclarationError::UnknownType { line, .. }
            | DeclarationError::NonConstantExpression { line } => Some(*line),
            DeclarationError::FunctionDotsOnly { .. }
            | DeclarationError::MultipleDeclarations { .. }
            | DeclarationError::DuplicateBody { .. }
            | DeclarationError::CannotBePartial { .. }
            | DeclarationError::PartialWithoutCName { .. } => None,
        }
    }
}

/// Errors raised by the bytecode compiler and the runtime registry when a
/// declaration is structurally fine but cannot be realized as requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error(
        "type {type_name} badly placed: the \"...\" array length can only be \
         used on global arrays or on fields of structures"
    )]
    MisplacedDotsArray { type_name: String },

    #[error("cannot generate \"{name}\": unknown type name")]
    UnknownTypeName { name: String },

    #[error("{type_name} is opaque")]
    OpaqueType { type_name: String },

    #[error("{type_name} has no size")]
    UnsizedType { type_name: String },

    #[error("{type_name} contains itself by value")]
    RecursiveRecord { type_name: String },

    #[error("{type_name} is partial: the real layout is only known to the C compiler")]
    PartialType { type_name: String },

    #[error("\"{name}\" is an integer type of unknown width")]
    UnresolvedInteger { name: String },

    #[error("the \"...\" length of {type_name} is not resolved")]
    UnresolvedArrayLength { type_name: String },

    #[error("function {name}: \"...\" not supported in ABI mode")]
    VariadicAbi { name: String },

    #[error("macro {name}: cannot use the syntax \"...\" in \"#define {name} ...\" in ABI mode")]
    DotsMacroAbi { name: String },

    #[error("cannot take the offset of bit field {field}")]
    BitFieldOffset { field: String },

    #[error("{type_name} has no field {field}")]
    UnknownField { type_name: String, field: String },

    #[error("{type_name} is not a struct or union")]
    NotARecord { type_name: String },

    #[error("{type_name} is not an integer type")]
    NotAnInteger { type_name: String },

    #[error("invalid module: {detail}")]
    InvalidModule { detail: String },
}

/// Top-level error for the crate facade.
#[derive(Debug, Error)]
pub enum Error {
    #[error("declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
