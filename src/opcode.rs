//! Numbering of the compiled type bytecode.
//!
//! A compiled module stores every type as an `(operation, argument)` pair in
//! one flat array. The argument is usually another slot index, which keeps
//! the encoding relocatable: nothing in it depends on addresses or on
//! registration order. All numbers here are frozen; modules emitted by
//! different runs only compare byte-for-byte because they never change.

use std::fmt;

use serde::Serialize;

/// Primitive index reserved for `void` (`PRIMITIVE 0`).
pub const PRIM_VOID: i32 = 0;

/// Operation half of a bytecode slot.
///
/// Codes are odd so that a packed `(arg << 8) | code` slot can never be
/// mistaken for an aligned pointer by consumers that overlay the table in
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Opcode {
    Primitive = 1,
    Pointer = 3,
    Array = 5,
    OpenArray = 7,
    StructUnion = 9,
    Enum = 11,
    Function = 13,
    FunctionEnd = 15,
    Noop = 17,
    Bitfield = 19,
    Typename = 21,
    /// General builtin function entry, any arity.
    BuiltinFunctionV = 23,
    /// Builtin function entry taking no arguments.
    BuiltinFunctionN = 25,
    /// Builtin function entry taking exactly one argument.
    BuiltinFunctionO = 27,
    Constant = 29,
    ConstantInt = 31,
    GlobalVar = 33,
    DlopenFunc = 35,
    DlopenConst = 37,
}

impl Opcode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Primitive => "PRIMITIVE",
            Opcode::Pointer => "POINTER",
            Opcode::Array => "ARRAY",
            Opcode::OpenArray => "OPEN_ARRAY",
            Opcode::StructUnion => "STRUCT_UNION",
            Opcode::Enum => "ENUM",
            Opcode::Function => "FUNCTION",
            Opcode::FunctionEnd => "FUNCTION_END",
            Opcode::Noop => "NOOP",
            Opcode::Bitfield => "BITFIELD",
            Opcode::Typename => "TYPENAME",
            Opcode::BuiltinFunctionV => "BUILTIN_FUNCTION_V",
            Opcode::BuiltinFunctionN => "BUILTIN_FUNCTION_N",
            Opcode::BuiltinFunctionO => "BUILTIN_FUNCTION_O",
            Opcode::Constant => "CONSTANT",
            Opcode::ConstantInt => "CONSTANT_INT",
            Opcode::GlobalVar => "GLOBAL_VAR",
            Opcode::DlopenFunc => "DLOPEN_FUNC",
            Opcode::DlopenConst => "DLOPEN_CONST",
        }
    }
}

/// One `(operation, argument)` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeOp {
    pub op: Opcode,
    pub arg: i32,
}

impl TypeOp {
    pub fn new(op: Opcode, arg: i32) -> TypeOp {
        TypeOp { op, arg }
    }
}

impl fmt::Display for TypeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.name(), self.arg)
    }
}

bitflags::bitflags! {
    /// Flag bits of a struct/union descriptor. Wire-stable like [`Opcode`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct StructFlags: u32 {
        const UNION = 0x01;
        const CHECK_FIELDS = 0x02;
        const PACKED = 0x04;
        const EXTERNAL = 0x08;
        const OPAQUE = 0x10;
    }
}

impl fmt::Display for StructFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("0")
        } else {
            bitflags::parser::to_writer(self, f)
        }
    }
}
