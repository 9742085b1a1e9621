//! Syntax tree for the C declaration subset.
//!
//! Struct/union and enum specifier occurrences live in arenas on [`Ast`] and
//! are referenced by id. A declaration like `typedef struct { ... } a, *b;`
//! produces two typedefs sharing one [`RecordSpecId`], which is how the later
//! analysis knows both names refer to a single type rather than to two
//! identical anonymous types.

use thin_vec::ThinVec;

use crate::StringId;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeQualifiers: u8 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordSpecId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumSpecId(pub u32);

/// One parsed translation unit plus its specifier arenas.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    pub decls: ThinVec<TopDecl>,
    records: Vec<RecordSpec>,
    enums: Vec<EnumSpec>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn add_record(&mut self, spec: RecordSpec) -> RecordSpecId {
        self.records.push(spec);
        RecordSpecId(self.records.len() as u32 - 1)
    }

    pub fn add_enum(&mut self, spec: EnumSpec) -> EnumSpecId {
        self.enums.push(spec);
        EnumSpecId(self.enums.len() as u32 - 1)
    }

    pub fn record(&self, id: RecordSpecId) -> &RecordSpec {
        &self.records[id.0 as usize]
    }

    pub fn enum_spec(&self, id: EnumSpecId) -> &EnumSpec {
        &self.enums[id.0 as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopDecl {
    Declaration(Declaration),
    Typedef(TypedefDecl),
}

/// A non-typedef declaration; `name` is absent for tag-only statements such
/// as `struct foo { int a; };`.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: Option<StringId>,
    pub ty: AstType,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedefDecl {
    pub name: StringId,
    pub ty: AstType,
    pub line: u32,
}

/// Keywords collected from a primitive type spelling, in written order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimWord {
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
}

impl PrimWord {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimWord::Void => "void",
            PrimWord::Char => "char",
            PrimWord::Short => "short",
            PrimWord::Int => "int",
            PrimWord::Long => "long",
            PrimWord::Float => "float",
            PrimWord::Double => "double",
            PrimWord::Signed => "signed",
            PrimWord::Unsigned => "unsigned",
            PrimWord::Bool => "_Bool",
            PrimWord::Complex => "_Complex",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Primitive(ThinVec<PrimWord>),
    /// A typedef name or builtin named type (`size_t`, `int32_t`, ...).
    Named(StringId),
    Record(RecordSpecId),
    Enum(EnumSpecId),
    /// `typedef ... name;`, a fully unknown type.
    DotDotDot,
    /// `typedef int... name;`, an integer type of unknown width.
    UnknownInt(ThinVec<PrimWord>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstType {
    Base {
        spec: TypeSpec,
        quals: TypeQualifiers,
        line: u32,
    },
    Pointer {
        inner: Box<AstType>,
        /// Qualifiers written on the pointer declarator itself (`* const`).
        quals: TypeQualifiers,
    },
    Array {
        inner: Box<AstType>,
        size: ArraySizeExpr,
    },
    Function {
        result: Box<AstType>,
        params: ThinVec<ParamDecl>,
        varargs: bool,
    },
}

impl AstType {
    /// Line of the underlying base specifier.
    pub fn line(&self) -> u32 {
        match self {
            AstType::Base { line, .. } => *line,
            AstType::Pointer { inner, .. } => inner.line(),
            AstType::Array { inner, .. } => inner.line(),
            AstType::Function { result, .. } => result.line(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArraySizeExpr {
    /// `[]`
    Open,
    Fixed(ConstExpr),
    /// `[...]`
    Dots,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: Option<StringId>,
    pub ty: AstType,
}

/// The deliberately narrow constant grammar: literals, unary minus and
/// parentheses. Identifiers parse but are rejected during analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
    Int { value: i64, line: u32 },
    Neg { inner: Box<ConstExpr>, line: u32 },
    Ident { name: StringId, line: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSpec {
    pub is_union: bool,
    pub tag: Option<StringId>,
    pub fields: Option<ThinVec<FieldSpec>>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    Member(MemberSpec),
    /// A lone `...;` member, marking the record as partially declared.
    DotDotDot { line: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSpec {
    pub name: Option<StringId>,
    pub ty: AstType,
    pub bit_size: Option<ConstExpr>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSpec {
    pub tag: Option<StringId>,
    pub body: Option<ThinVec<EnumeratorSpec>>,
    /// Body ended with `...`.
    pub partial: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumeratorSpec {
    pub name: StringId,
    pub value: Option<ConstExpr>,
    pub line: u32,
}
