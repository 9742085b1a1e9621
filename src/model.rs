//! Interned type model and LP64 layout rules.
//!
//! Every distinct C type is stored once in a [`TypeTable`] and addressed by
//! [`TypeRef`]. Compound shapes (pointers, arrays, functions) are interned
//! structurally, while struct/union/enum types are interned by declaration
//! identity: two mentions of `struct foo` resolve to one [`RecordId`], and
//! two textually identical anonymous bodies stay distinct.

use std::num::NonZeroU32;

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use thin_vec::ThinVec;

use crate::error::VerificationError;
use crate::StringId;

/// A non-void primitive C type, named the way C spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
    FloatComplex,
    DoubleComplex,
    WChar,
    Char16,
    Char32,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    IntPtr,
    UIntPtr,
    PtrDiff,
    Size,
    SSize,
    IntLeast8,
    UIntLeast8,
    IntLeast16,
    UIntLeast16,
    IntLeast32,
    UIntLeast32,
    IntLeast64,
    UIntLeast64,
    IntFast8,
    UIntFast8,
    IntFast16,
    UIntFast16,
    IntFast32,
    UIntFast32,
    IntFast64,
    UIntFast64,
    IntMax,
    UIntMax,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Primitive> {
        Some(match name {
            "_Bool" => Primitive::Bool,
            "char" => Primitive::Char,
            "signed char" => Primitive::SChar,
            "unsigned char" => Primitive::UChar,
            "short" => Primitive::Short,
            "unsigned short" => Primitive::UShort,
            "int" => Primitive::Int,
            "unsigned int" => Primitive::UInt,
            "long" => Primitive::Long,
            "unsigned long" => Primitive::ULong,
            "long long" => Primitive::LongLong,
            "unsigned long long" => Primitive::ULongLong,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "long double" => Primitive::LongDouble,
            "float _Complex" => Primitive::FloatComplex,
            "double _Complex" => Primitive::DoubleComplex,
            "wchar_t" => Primitive::WChar,
            "char16_t" => Primitive::Char16,
            "char32_t" => Primitive::Char32,
            "int8_t" => Primitive::Int8,
            "uint8_t" => Primitive::UInt8,
            "int16_t" => Primitive::Int16,
            "uint16_t" => Primitive::UInt16,
            "int32_t" => Primitive::Int32,
            "uint32_t" => Primitive::UInt32,
            "int64_t" => Primitive::Int64,
            "uint64_t" => Primitive::UInt64,
            "intptr_t" => Primitive::IntPtr,
            "uintptr_t" => Primitive::UIntPtr,
            "ptrdiff_t" => Primitive::PtrDiff,
            "size_t" => Primitive::Size,
            "ssize_t" => Primitive::SSize,
            "int_least8_t" => Primitive::IntLeast8,
            "uint_least8_t" => Primitive::UIntLeast8,
            "int_least16_t" => Primitive::IntLeast16,
            "uint_least16_t" => Primitive::UIntLeast16,
            "int_least32_t" => Primitive::IntLeast32,
            "uint_least32_t" => Primitive::UIntLeast32,
            "int_least64_t" => Primitive::IntLeast64,
            "uint_least64_t" => Primitive::UIntLeast64,
            "int_fast8_t" => Primitive::IntFast8,
            "uint_fast8_t" => Primitive::UIntFast8,
            "int_fast16_t" => Primitive::IntFast16,
            "uint_fast16_t" => Primitive::UIntFast16,
            "int_fast32_t" => Primitive::IntFast32,
            "uint_fast32_t" => Primitive::UIntFast32,
            "int_fast64_t" => Primitive::IntFast64,
            "uint_fast64_t" => Primitive::UIntFast64,
            "intmax_t" => Primitive::IntMax,
            "uintmax_t" => Primitive::UIntMax,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::Bool => "_Bool",
            Primitive::Char => "char",
            Primitive::SChar => "signed char",
            Primitive::UChar => "unsigned char",
            Primitive::Short => "short",
            Primitive::UShort => "unsigned short",
            Primitive::Int => "int",
            Primitive::UInt => "unsigned int",
            Primitive::Long => "long",
            Primitive::ULong => "unsigned long",
            Primitive::LongLong => "long long",
            Primitive::ULongLong => "unsigned long long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::LongDouble => "long double",
            Primitive::FloatComplex => "float _Complex",
            Primitive::DoubleComplex => "double _Complex",
            Primitive::WChar => "wchar_t",
            Primitive::Char16 => "char16_t",
            Primitive::Char32 => "char32_t",
            Primitive::Int8 => "int8_t",
            Primitive::UInt8 => "uint8_t",
            Primitive::Int16 => "int16_t",
            Primitive::UInt16 => "uint16_t",
            Primitive::Int32 => "int32_t",
            Primitive::UInt32 => "uint32_t",
            Primitive::Int64 => "int64_t",
            Primitive::UInt64 => "uint64_t",
            Primitive::IntPtr => "intptr_t",
            Primitive::UIntPtr => "uintptr_t",
            Primitive::PtrDiff => "ptrdiff_t",
            Primitive::Size => "size_t",
            Primitive::SSize => "ssize_t",
            Primitive::IntLeast8 => "int_least8_t",
            Primitive::UIntLeast8 => "uint_least8_t",
            Primitive::IntLeast16 => "int_least16_t",
            Primitive::UIntLeast16 => "uint_least16_t",
            Primitive::IntLeast32 => "int_least32_t",
            Primitive::UIntLeast32 => "uint_least32_t",
            Primitive::IntLeast64 => "int_least64_t",
            Primitive::UIntLeast64 => "uint_least64_t",
            Primitive::IntFast8 => "int_fast8_t",
            Primitive::UIntFast8 => "uint_fast8_t",
            Primitive::IntFast16 => "int_fast16_t",
            Primitive::UIntFast16 => "uint_fast16_t",
            Primitive::IntFast32 => "int_fast32_t",
            Primitive::UIntFast32 => "uint_fast32_t",
            Primitive::IntFast64 => "int_fast64_t",
            Primitive::UIntFast64 => "uint_fast64_t",
            Primitive::IntMax => "intmax_t",
            Primitive::UIntMax => "uintmax_t",
        }
    }

    /// Position in the primitive space of the opcode table. Index 0 is
    /// reserved for `void`.
    pub fn index(self) -> u8 {
        match self {
            Primitive::Bool => 1,
            Primitive::Char => 2,
            Primitive::SChar => 3,
            Primitive::UChar => 4,
            Primitive::Short => 5,
            Primitive::UShort => 6,
            Primitive::Int => 7,
            Primitive::UInt => 8,
            Primitive::Long => 9,
            Primitive::ULong => 10,
            Primitive::LongLong => 11,
            Primitive::ULongLong => 12,
            Primitive::Float => 13,
            Primitive::Double => 14,
            Primitive::LongDouble => 15,
            Primitive::WChar => 16,
            Primitive::Int8 => 17,
            Primitive::UInt8 => 18,
            Primitive::Int16 => 19,
            Primitive::UInt16 => 20,
            Primitive::Int32 => 21,
            Primitive::UInt32 => 22,
            Primitive::Int64 => 23,
            Primitive::UInt64 => 24,
            Primitive::IntPtr => 25,
            Primitive::UIntPtr => 26,
            Primitive::PtrDiff => 27,
            Primitive::Size => 28,
            Primitive::SSize => 29,
            Primitive::IntLeast8 => 30,
            Primitive::UIntLeast8 => 31,
            Primitive::IntLeast16 => 32,
            Primitive::UIntLeast16 => 33,
            Primitive::IntLeast32 => 34,
            Primitive::UIntLeast32 => 35,
            Primitive::IntLeast64 => 36,
            Primitive::UIntLeast64 => 37,
            Primitive::IntFast8 => 38,
            Primitive::UIntFast8 => 39,
            Primitive::IntFast16 => 40,
            Primitive::UIntFast16 => 41,
            Primitive::IntFast32 => 42,
            Primitive::UIntFast32 => 43,
            Primitive::IntFast64 => 44,
            Primitive::UIntFast64 => 45,
            Primitive::IntMax => 46,
            Primitive::UIntMax => 47,
            Primitive::FloatComplex => 48,
            Primitive::DoubleComplex => 49,
            Primitive::Char16 => 50,
            Primitive::Char32 => 51,
        }
    }

    pub fn from_index(index: u8) -> Option<Primitive> {
        Some(match index {
            1 => Primitive::Bool,
            2 => Primitive::Char,
            3 => Primitive::SChar,
            4 => Primitive::UChar,
            5 => Primitive::Short,
            6 => Primitive::UShort,
            7 => Primitive::Int,
            8 => Primitive::UInt,
            9 => Primitive::Long,
            10 => Primitive::ULong,
            11 => Primitive::LongLong,
            12 => Primitive::ULongLong,
            13 => Primitive::Float,
            14 => Primitive::Double,
            15 => Primitive::LongDouble,
            16 => Primitive::WChar,
            17 => Primitive::Int8,
            18 => Primitive::UInt8,
            19 => Primitive::Int16,
            20 => Primitive::UInt16,
            21 => Primitive::Int32,
            22 => Primitive::UInt32,
            23 => Primitive::Int64,
            24 => Primitive::UInt64,
            25 => Primitive::IntPtr,
            26 => Primitive::UIntPtr,
            27 => Primitive::PtrDiff,
            28 => Primitive::Size,
            29 => Primitive::SSize,
            30 => Primitive::IntLeast8,
            31 => Primitive::UIntLeast8,
            32 => Primitive::IntLeast16,
            33 => Primitive::UIntLeast16,
            34 => Primitive::IntLeast32,
            35 => Primitive::UIntLeast32,
            36 => Primitive::IntLeast64,
            37 => Primitive::UIntLeast64,
            38 => Primitive::IntFast8,
            39 => Primitive::UIntFast8,
            40 => Primitive::IntFast16,
            41 => Primitive::UIntFast16,
            42 => Primitive::IntFast32,
            43 => Primitive::UIntFast32,
            44 => Primitive::IntFast64,
            45 => Primitive::UIntFast64,
            46 => Primitive::IntMax,
            47 => Primitive::UIntMax,
            48 => Primitive::FloatComplex,
            49 => Primitive::DoubleComplex,
            50 => Primitive::Char16,
            51 => Primitive::Char32,
            _ => return None,
        })
    }

    /// The stdint type of exactly `size` bytes with the given signedness.
    pub fn int_with(size: u64, signed: bool) -> Primitive {
        match (size, signed) {
            (1, true) => Primitive::Int8,
            (1, false) => Primitive::UInt8,
            (2, true) => Primitive::Int16,
            (2, false) => Primitive::UInt16,
            (4, true) => Primitive::Int32,
            (4, false) => Primitive::UInt32,
            (8, true) => Primitive::Int64,
            (8, false) => Primitive::UInt64,
            _ => unreachable!("no integer type of {size} bytes"),
        }
    }

    pub fn size(self) -> u64 {
        match self {
            Primitive::Bool
            | Primitive::Char
            | Primitive::SChar
            | Primitive::UChar
            | Primitive::Int8
            | Primitive::UInt8
            | Primitive::IntLeast8
            | Primitive::UIntLeast8
            | Primitive::IntFast8
            | Primitive::UIntFast8 => 1,
            Primitive::Short
            | Primitive::UShort
            | Primitive::Char16
            | Primitive::Int16
            | Primitive::UInt16
            | Primitive::IntLeast16
            | Primitive::UIntLeast16 => 2,
            Primitive::Int
            | Primitive::UInt
            | Primitive::Float
            | Primitive::WChar
            | Primitive::Char32
            | Primitive::Int32
            | Primitive::UInt32
            | Primitive::IntLeast32
            | Primitive::UIntLeast32 => 4,
            Primitive::Long
            | Primitive::ULong
            | Primitive::LongLong
            | Primitive::ULongLong
            | Primitive::Double
            | Primitive::FloatComplex
            | Primitive::Int64
            | Primitive::UInt64
            | Primitive::IntPtr
            | Primitive::UIntPtr
            | Primitive::PtrDiff
            | Primitive::Size
            | Primitive::SSize
            | Primitive::IntLeast64
            | Primitive::UIntLeast64
            | Primitive::IntFast16
            | Primitive::UIntFast16
            | Primitive::IntFast32
            | Primitive::UIntFast32
            | Primitive::IntFast64
            | Primitive::UIntFast64
            | Primitive::IntMax
            | Primitive::UIntMax => 8,
            Primitive::LongDouble | Primitive::DoubleComplex => 16,
        }
    }

    pub fn align(self) -> u64 {
        match self {
            Primitive::FloatComplex => 4,
            Primitive::DoubleComplex => 8,
            other => other.size(),
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::Char
                | Primitive::SChar
                | Primitive::Short
                | Primitive::Int
                | Primitive::Long
                | Primitive::LongLong
                | Primitive::WChar
                | Primitive::Int8
                | Primitive::Int16
                | Primitive::Int32
                | Primitive::Int64
                | Primitive::IntPtr
                | Primitive::PtrDiff
                | Primitive::SSize
                | Primitive::IntLeast8
                | Primitive::IntLeast16
                | Primitive::IntLeast32
                | Primitive::IntLeast64
                | Primitive::IntFast8
                | Primitive::IntFast16
                | Primitive::IntFast32
                | Primitive::IntFast64
                | Primitive::IntMax
        )
    }

    /// True for the character category: plain `char` and the wide variants.
    pub fn is_char_kind(self) -> bool {
        matches!(
            self,
            Primitive::Char | Primitive::WChar | Primitive::Char16 | Primitive::Char32
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            Primitive::Float | Primitive::Double | Primitive::LongDouble
        )
    }

    pub fn is_complex(self) -> bool {
        matches!(self, Primitive::FloatComplex | Primitive::DoubleComplex)
    }

    /// Integer category. `_Bool` counts; the char kinds do not, mirroring how
    /// the constant emitter distinguishes them.
    pub fn is_integer(self) -> bool {
        !self.is_char_kind() && !self.is_float() && !self.is_complex()
    }
}

/// Handle into a [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(NonZeroU32);

impl TypeRef {
    fn new(index: usize) -> TypeRef {
        match u32::try_from(index + 1).ok().and_then(NonZeroU32::new) {
            Some(raw) => TypeRef(raw),
            None => unreachable!("type table overflow"),
        }
    }

    pub fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub u32);

impl RecordId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub u32);

impl EnumId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayLength {
    Fixed(u64),
    /// `[]` with no length at all.
    Open,
    /// `[...]`, to be measured by an external build step.
    Dots,
    /// Length of the global array variable `name`, measured externally.
    OfGlobal(StringId),
    /// Length of a `[...]` field, measured externally on the owning record.
    OfField { record: RecordId, field: StringId },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Primitive(Primitive),
    /// A typedef declared `typedef int... name;` whose width is only known
    /// to an external build step.
    UnknownInt(StringId),
    Pointer {
        target: TypeRef,
        /// Pointer to const data, as in `const char *`.
        to_const: bool,
    },
    Array {
        item: TypeRef,
        length: ArrayLength,
    },
    Record(RecordId),
    Enum(EnumId),
    /// A bare function signature. Transient: declarations always wrap it
    /// into a [`TypeKind::FunctionPointer`] before registration.
    Function {
        args: Vec<TypeRef>,
        result: TypeRef,
        varargs: bool,
    },
    FunctionPointer {
        args: Vec<TypeRef>,
        result: TypeRef,
        varargs: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// `None` for unnamed bit-field padding and anonymous nested records.
    pub name: Option<StringId>,
    pub ty: TypeRef,
    pub bit_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDecl {
    pub is_union: bool,
    /// Tag name, or a generated `$`-name for anonymous records.
    pub name: StringId,
    /// Typedef name that stands in for an anonymous tag, as in
    /// `typedef struct { ... } foo_t;`.
    pub forcename: Option<StringId>,
    /// `None` while the record is opaque.
    pub fields: Option<ThinVec<FieldDecl>>,
    pub partial: bool,
    pub packed: bool,
}

impl RecordDecl {
    pub fn opaque(is_union: bool, name: StringId) -> RecordDecl {
        RecordDecl {
            is_union,
            name,
            forcename: None,
            fields: None,
            partial: false,
            packed: false,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        if self.is_union {
            "union"
        } else {
            "struct"
        }
    }

    pub fn has_anonymous_record_fields(&self, table: &TypeTable) -> bool {
        let Some(fields) = &self.fields else {
            return false;
        };
        fields.iter().any(|f| {
            f.name.is_none() && matches!(table.kind(f.ty), TypeKind::Record(_))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enumerator {
    pub name: StringId,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: StringId,
    pub forcename: Option<StringId>,
    pub enumerators: ThinVec<Enumerator>,
    pub partial: bool,
}

impl EnumDecl {
    /// Smallest of `int`, `unsigned int`, `long`, `unsigned long` able to
    /// hold every enumerator value. An empty value list picks
    /// `unsigned int`, the common compiler guess for opaque enums.
    pub fn base_primitive(&self) -> Primitive {
        if self.enumerators.is_empty() {
            return Primitive::UInt;
        }
        let smallest = self.enumerators.iter().map(|e| e.value).min().unwrap_or(0);
        let largest = self.enumerators.iter().map(|e| e.value).max().unwrap_or(0);
        if smallest < 0 {
            if smallest >= i64::from(i32::MIN) && largest <= i64::from(i32::MAX) {
                Primitive::Int
            } else {
                Primitive::Long
            }
        } else if largest <= i64::from(u32::MAX) {
            Primitive::UInt
        } else {
            Primitive::ULong
        }
    }
}

/// Concrete LP64 placement of a record's members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    pub size: u64,
    pub align: u64,
    pub fields: Vec<PlacedField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedField {
    pub name: Option<StringId>,
    pub ty: TypeRef,
    /// Byte offset from the start of the record; `None` for bit-fields,
    /// which have no addressable offset.
    pub byte_offset: Option<u64>,
}

const POINTER_SIZE: u64 = 8;

fn round_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

#[derive(Debug, Default)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    interned: HashMap<TypeKind, TypeRef>,
    records: Vec<RecordDecl>,
    enums: Vec<EnumDecl>,
}

impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable::default()
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeRef {
        if let Some(&existing) = self.interned.get(&kind) {
            return existing;
        }
        let r = TypeRef::new(self.kinds.len());
        self.kinds.push(kind.clone());
        self.interned.insert(kind, r);
        r
    }

    pub fn kind(&self, r: TypeRef) -> &TypeKind {
        &self.kinds[r.index()]
    }

    pub fn void_type(&mut self) -> TypeRef {
        self.intern(TypeKind::Void)
    }

    pub fn primitive(&mut self, prim: Primitive) -> TypeRef {
        self.intern(TypeKind::Primitive(prim))
    }

    pub fn unknown_integer(&mut self, name: StringId) -> TypeRef {
        self.intern(TypeKind::UnknownInt(name))
    }

    pub fn pointer_to(&mut self, target: TypeRef) -> TypeRef {
        self.intern(TypeKind::Pointer {
            target,
            to_const: false,
        })
    }

    pub fn const_pointer_to(&mut self, target: TypeRef) -> TypeRef {
        self.intern(TypeKind::Pointer {
            target,
            to_const: true,
        })
    }

    pub fn array_of(&mut self, item: TypeRef, length: ArrayLength) -> TypeRef {
        self.intern(TypeKind::Array { item, length })
    }

    pub fn record_type(&mut self, id: RecordId) -> TypeRef {
        self.intern(TypeKind::Record(id))
    }

    pub fn enum_type(&mut self, id: EnumId) -> TypeRef {
        self.intern(TypeKind::Enum(id))
    }

    pub fn new_record(&mut self, decl: RecordDecl) -> RecordId {
        self.records.push(decl);
        RecordId(self.records.len() as u32 - 1)
    }

    pub fn record(&self, id: RecordId) -> &RecordDecl {
        &self.records[id.index()]
    }

    pub fn record_mut(&mut self, id: RecordId) -> &mut RecordDecl {
        &mut self.records[id.index()]
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn new_enum(&mut self, decl: EnumDecl) -> EnumId {
        self.enums.push(decl);
        EnumId(self.enums.len() as u32 - 1)
    }

    pub fn enum_decl(&self, id: EnumId) -> &EnumDecl {
        &self.enums[id.index()]
    }

    pub fn enum_decl_mut(&mut self, id: EnumId) -> &mut EnumDecl {
        &mut self.enums[id.index()]
    }

    /// Function-to-pointer wrap applied when a function declaration is
    /// registered.
    pub fn as_function_pointer(&mut self, raw: TypeRef) -> TypeRef {
        match self.kind(raw) {
            TypeKind::Function {
                args,
                result,
                varargs,
            } => {
                let kind = TypeKind::FunctionPointer {
                    args: args.clone(),
                    result: *result,
                    varargs: *varargs,
                };
                self.intern(kind)
            }
            TypeKind::FunctionPointer { .. } => raw,
            other => unreachable!("not a function type: {other:?}"),
        }
    }

    /// The bare signature behind a function pointer, used when the compiler
    /// emits the variable-length function run.
    pub fn as_raw_function(&mut self, fnptr: TypeRef) -> TypeRef {
        match self.kind(fnptr) {
            TypeKind::FunctionPointer {
                args,
                result,
                varargs,
            } => {
                let kind = TypeKind::Function {
                    args: args.clone(),
                    result: *result,
                    varargs: *varargs,
                };
                self.intern(kind)
            }
            TypeKind::Function { .. } => fnptr,
            other => unreachable!("not a function type: {other:?}"),
        }
    }

    /// Array-to-pointer and function-to-pointer decay, as applied to call
    /// arguments.
    pub fn decayed(&mut self, r: TypeRef) -> TypeRef {
        match self.kind(r) {
            TypeKind::Array { item, .. } => {
                let item = *item;
                self.pointer_to(item)
            }
            TypeKind::Function { .. } => self.as_function_pointer(r),
            _ => r,
        }
    }

    pub fn is_integer_type(&self, r: TypeRef) -> bool {
        match self.kind(r) {
            TypeKind::Primitive(p) => p.is_integer(),
            TypeKind::UnknownInt(_) => true,
            TypeKind::Enum(_) => true,
            _ => false,
        }
    }

    pub fn record_c_name(&self, id: RecordId) -> String {
        let rec = self.record(id);
        match rec.forcename {
            Some(force) => force.as_str().to_owned(),
            None => format!("{} {}", rec.kind_str(), rec.name),
        }
    }

    pub fn enum_c_name(&self, id: EnumId) -> String {
        let decl = self.enum_decl(id);
        match decl.forcename {
            Some(force) => force.as_str().to_owned(),
            None => format!("enum {}", decl.name),
        }
    }

    /// True when the record can be named in generated output, either by tag
    /// or through a typedef.
    pub fn record_has_c_name(&self, id: RecordId) -> bool {
        !self.record_c_name(id).contains('$')
    }

    /// The C spelling with a positional marker `&` where a declared name
    /// would sit: `"int *&"`, `"int(*&)(int)"`, `"int&[10]"`.
    pub fn c_name_with_marker(&self, r: TypeRef) -> String {
        match self.kind(r) {
            TypeKind::Void => "void&".to_owned(),
            TypeKind::Primitive(p) => format!("{}&", p.as_str()),
            TypeKind::UnknownInt(name) => format!("{name}&"),
            TypeKind::Pointer { target, to_const } => {
                let base = self.c_name_with_marker(*target);
                let mut extra = if *to_const {
                    " const *&".to_owned()
                } else {
                    " *&".to_owned()
                };
                if matches!(self.kind(*target), TypeKind::Array { .. }) {
                    extra = format!("({})", extra.trim_start());
                }
                base.replace('&', &extra)
            }
            TypeKind::Array { item, length } => {
                let brackets = match length {
                    ArrayLength::Open => "&[]".to_owned(),
                    ArrayLength::Dots => "&[/*...*/]".to_owned(),
                    ArrayLength::Fixed(n) => format!("&[{n}]"),
                    ArrayLength::OfGlobal(name) => format!("&[array_len({name})]"),
                    ArrayLength::OfField { record, field } => {
                        format!(
                            "&[array_len((({} *)0)->{field})]",
                            self.record_c_name(*record)
                        )
                    }
                };
                self.c_name_with_marker(*item).replace('&', &brackets)
            }
            TypeKind::Record(id) => format!("{}&", self.record_c_name(*id)),
            TypeKind::Enum(id) => format!("{}&", self.enum_c_name(*id)),
            TypeKind::Function {
                args,
                result,
                varargs,
            } => self.function_marker(args, *result, *varargs, "(&)"),
            TypeKind::FunctionPointer {
                args,
                result,
                varargs,
            } => self.function_marker(args, *result, *varargs, "(*&)"),
        }
    }

    fn function_marker(
        &self,
        args: &[TypeRef],
        result: TypeRef,
        varargs: bool,
        head: &str,
    ) -> String {
        let mut rendered: Vec<String> = args.iter().map(|&a| self.c_name(a)).collect();
        if varargs {
            rendered.push("...".to_owned());
        }
        if rendered.is_empty() {
            rendered.push("void".to_owned());
        }
        let replace = format!("{head}({})", rendered.iter().join(", "));
        self.c_name_with_marker(result).replace('&', &replace)
    }

    /// Plain C spelling with no declared name, `$`-names included. Used for
    /// diagnostics and deterministic ordering.
    pub fn c_name(&self, r: TypeRef) -> String {
        self.c_name_with_marker(r).replace('&', "")
    }

    /// The C spelling declaring `replace_with`, refusing types that have no
    /// nameable spelling (`$`-named anonymous tags).
    pub fn spelling(&self, r: TypeRef, replace_with: &str) -> Result<String, VerificationError> {
        let marker = self.c_name_with_marker(r);
        if marker.contains('$') {
            return Err(VerificationError::UnknownTypeName {
                name: marker.replace('&', ""),
            });
        }
        let mut replace = replace_with.trim().to_owned();
        if !replace.is_empty() {
            if replace.starts_with('*') && marker.contains("&[") {
                replace = format!("({replace})");
            } else if !replace.starts_with('[') && !replace.starts_with('(') {
                replace = format!(" {replace}");
            }
        }
        Ok(marker.replace('&', &replace))
    }

    pub fn size_of(&self, r: TypeRef) -> Result<u64, VerificationError> {
        let mut guard = HashSet::new();
        Ok(self.size_align(r, &mut guard)?.0)
    }

    pub fn align_of(&self, r: TypeRef) -> Result<u64, VerificationError> {
        let mut guard = HashSet::new();
        Ok(self.size_align(r, &mut guard)?.1)
    }

    fn size_align(
        &self,
        r: TypeRef,
        guard: &mut HashSet<RecordId>,
    ) -> Result<(u64, u64), VerificationError> {
        match self.kind(r) {
            TypeKind::Void | TypeKind::Function { .. } => Err(VerificationError::UnsizedType {
                type_name: self.c_name(r),
            }),
            TypeKind::Primitive(p) => Ok((p.size(), p.align())),
            TypeKind::UnknownInt(name) => Err(VerificationError::UnresolvedInteger {
                name: name.as_str().to_owned(),
            }),
            TypeKind::Pointer { .. } | TypeKind::FunctionPointer { .. } => {
                Ok((POINTER_SIZE, POINTER_SIZE))
            }
            TypeKind::Array { item, length } => {
                let (item_size, item_align) = self.size_align(*item, guard)?;
                match length {
                    ArrayLength::Fixed(n) => match item_size.checked_mul(*n) {
                        Some(total) => Ok((total, item_align)),
                        None => Err(VerificationError::UnsizedType {
                            type_name: self.c_name(r),
                        }),
                    },
                    _ => Err(VerificationError::UnresolvedArrayLength {
                        type_name: self.c_name(r),
                    }),
                }
            }
            TypeKind::Record(id) => {
                let layout = self.layout_guarded(*id, guard)?;
                Ok((layout.size, layout.align))
            }
            TypeKind::Enum(id) => {
                let decl = self.enum_decl(*id);
                if decl.partial {
                    return Err(VerificationError::PartialType {
                        type_name: self.enum_c_name(*id),
                    });
                }
                let base = decl.base_primitive();
                Ok((base.size(), base.align()))
            }
        }
    }

    pub fn record_layout(&self, id: RecordId) -> Result<RecordLayout, VerificationError> {
        let mut guard = HashSet::new();
        self.layout_guarded(id, &mut guard)
    }

    fn layout_guarded(
        &self,
        id: RecordId,
        guard: &mut HashSet<RecordId>,
    ) -> Result<RecordLayout, VerificationError> {
        let rec = self.record(id);
        let Some(fields) = &rec.fields else {
            return Err(VerificationError::OpaqueType {
                type_name: self.record_c_name(id),
            });
        };
        if rec.partial {
            return Err(VerificationError::PartialType {
                type_name: self.record_c_name(id),
            });
        }
        if !guard.insert(id) {
            return Err(VerificationError::RecursiveRecord {
                type_name: self.record_c_name(id),
            });
        }
        let layout = if rec.is_union {
            self.layout_union(rec, fields, guard)
        } else {
            self.layout_struct(rec, fields, guard)
        };
        guard.remove(&id);
        layout
    }

    fn layout_struct(
        &self,
        rec: &RecordDecl,
        fields: &[FieldDecl],
        guard: &mut HashSet<RecordId>,
    ) -> Result<RecordLayout, VerificationError> {
        let mut bit_pos: u64 = 0;
        let mut max_align: u64 = 1;
        let mut placed = Vec::with_capacity(fields.len());
        for field in fields {
            match field.bit_size {
                None => {
                    let (size, align) = self.member_size_align(field.ty, guard)?;
                    let align = if rec.packed { 1 } else { align };
                    bit_pos = round_up(bit_pos, align * 8);
                    placed.push(PlacedField {
                        name: field.name,
                        ty: field.ty,
                        byte_offset: Some(bit_pos / 8),
                    });
                    bit_pos += size * 8;
                    max_align = max_align.max(align);
                }
                Some(0) => {
                    // Zero-width bit-field: close the current storage unit.
                    let (_, align) = self.size_align(field.ty, guard)?;
                    bit_pos = round_up(bit_pos, align * 8);
                }
                Some(bits) => {
                    let (size, align) = self.size_align(field.ty, guard)?;
                    let unit = size * 8;
                    if bit_pos % unit + u64::from(bits) > unit {
                        bit_pos = round_up(bit_pos, unit);
                    }
                    if let Some(name) = field.name {
                        if !rec.packed {
                            max_align = max_align.max(align);
                        }
                        placed.push(PlacedField {
                            name: Some(name),
                            ty: field.ty,
                            byte_offset: None,
                        });
                    }
                    bit_pos += u64::from(bits);
                }
            }
        }
        Ok(RecordLayout {
            size: round_up(bit_pos, max_align * 8) / 8,
            align: max_align,
            fields: placed,
        })
    }

    fn layout_union(
        &self,
        rec: &RecordDecl,
        fields: &[FieldDecl],
        guard: &mut HashSet<RecordId>,
    ) -> Result<RecordLayout, VerificationError> {
        let mut max_bits: u64 = 0;
        let mut max_align: u64 = 1;
        let mut placed = Vec::with_capacity(fields.len());
        for field in fields {
            let (size, align) = self.member_size_align(field.ty, guard)?;
            let align = if rec.packed { 1 } else { align };
            max_bits = max_bits.max(size * 8);
            match field.bit_size {
                None => {
                    placed.push(PlacedField {
                        name: field.name,
                        ty: field.ty,
                        byte_offset: Some(0),
                    });
                    max_align = max_align.max(align);
                }
                Some(_) => {
                    if let Some(name) = field.name {
                        max_align = max_align.max(align);
                        placed.push(PlacedField {
                            name: Some(name),
                            ty: field.ty,
                            byte_offset: None,
                        });
                    }
                }
            }
        }
        Ok(RecordLayout {
            size: round_up(max_bits, max_align * 8) / 8,
            align: max_align,
            fields: placed,
        })
    }

    /// Like [`size_align`](Self::size_align) but permitting a flexible array
    /// member, which occupies no space of its own.
    fn member_size_align(
        &self,
        r: TypeRef,
        guard: &mut HashSet<RecordId>,
    ) -> Result<(u64, u64), VerificationError> {
        if let TypeKind::Array {
            item,
            length: ArrayLength::Open,
        } = self.kind(r)
        {
            let (_, item_align) = self.size_align(*item, guard)?;
            return Ok((0, item_align));
        }
        self.size_align(r, guard)
    }

    /// Byte offset of `field`, looking through anonymous nested records.
    pub fn field_offset(&self, id: RecordId, field: StringId) -> Result<u64, VerificationError> {
        let layout = self.record_layout(id)?;
        for placed in &layout.fields {
            if placed.name == Some(field) {
                return placed.byte_offset.ok_or_else(|| {
                    VerificationError::BitFieldOffset {
                        field: field.as_str().to_owned(),
                    }
                });
            }
        }
        for placed in &layout.fields {
            if placed.name.is_none() {
                if let TypeKind::Record(inner) = self.kind(placed.ty) {
                    if let Ok(offset) = self.field_offset(*inner, field) {
                        let base = placed.byte_offset.unwrap_or(0);
                        return Ok(base + offset);
                    }
                }
            }
        }
        Err(VerificationError::UnknownField {
            type_name: self.record_c_name(id),
            field: field.as_str().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests_model;
