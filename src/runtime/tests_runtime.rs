#![cfg(test)]
use super::*;
use crate::compiler::{GlobalEntry, ModuleKind};
use crate::ffi::Ffi;
use crate::opcode::{Opcode, TypeOp};

fn compile(source: &str) -> Module {
    let mut ffi = Ffi::new();
    ffi.cdef(source).expect("cdef succeeds");
    ffi.compile("rt", ModuleKind::Api).expect("compiles")
}

fn load(source: &str) -> TypeRegistry {
    TypeRegistry::from_module(&compile(source)).expect("module decodes")
}

#[test]
fn round_trip_preserves_sizes_and_offsets() {
    let mut reg = load(
        "typedef struct point_s { int x, y; } point_t;\n\
         typedef int triple_t[3];\n\
         typedef int (*cb_t)(int, long);",
    );

    let point = reg.type_by_name("point_t").unwrap();
    assert_eq!(reg.size_of(point).unwrap(), 8);
    assert_eq!(reg.align_of(point).unwrap(), 4);
    assert_eq!(reg.offset_of(point, "x").unwrap(), 0);
    assert_eq!(reg.offset_of(point, "y").unwrap(), 4);

    let triple = reg.type_by_name("triple_t").unwrap();
    assert_eq!(reg.size_of(triple).unwrap(), 12);
    let decayed = reg.decayed(triple).unwrap();
    assert_eq!(reg.table().c_name(decayed), "int *");

    let cb = reg.type_by_name("cb_t").unwrap();
    let ty = reg.type_ref(cb).unwrap();
    assert_eq!(reg.table().c_name(ty), "int(*)(int, long)");
}

#[test]
fn functions_come_back_as_raw_signatures() {
    let reg = load("typedef struct point_s { int x, y; } point_t; int dist(point_t *);");
    let Some(Binding::Function { type_index }) = reg.global("dist") else {
        panic!("dist should bind as a function");
    };
    let ty = reg.type_ref(type_index).unwrap();
    let TypeKind::Function {
        args,
        result,
        varargs,
    } = reg.table().kind(ty)
    else {
        panic!("expected a raw signature");
    };
    assert_eq!(args.len(), 1);
    assert!(!*varargs);
    assert_eq!(reg.table().c_name(args[0]), "struct point_s *");
    assert_eq!(reg.table().c_name(*result), "int");
}

#[test]
fn enum_values_and_base_survive() {
    let reg = load("enum color { RED, GREEN = 5, BLUE }; typedef enum color color_t;");
    assert_eq!(reg.enum_constant("RED"), Some(0));
    assert_eq!(reg.enum_constant("GREEN"), Some(5));
    assert_eq!(reg.enum_constant("BLUE"), Some(6));
    assert_eq!(reg.global("GREEN"), Some(Binding::EnumConstant { value: 5 }));

    let color = reg.type_by_name("color_t").unwrap();
    assert_eq!(reg.size_of(color).unwrap(), 4);
    // values are all nonnegative, so the base is unsigned int
    assert_eq!(reg.cast_int(color, -1).unwrap(), 4294967295);
}

#[test]
fn cast_int_wraps_like_c() {
    let reg = load(
        "typedef signed char i8_t; typedef unsigned short u16_t;\n\
         typedef int i32_t; typedef _Bool flag_t;\n\
         typedef unsigned long u64_t;\n\
         typedef double real_t; typedef int... tricky_t;",
    );

    let i8_t = reg.type_by_name("i8_t").unwrap();
    assert_eq!(reg.cast_int(i8_t, -129).unwrap(), 127);
    assert_eq!(reg.cast_int(i8_t, 128).unwrap(), -128);
    assert_eq!(reg.cast_int(i8_t, 300).unwrap(), 44);
    assert_eq!(reg.cast_int(i8_t, -1).unwrap(), -1);

    let u16_t = reg.type_by_name("u16_t").unwrap();
    assert_eq!(reg.cast_int(u16_t, -1).unwrap(), 65535);
    assert_eq!(reg.cast_int(u16_t, 65536).unwrap(), 0);

    let i32_t = reg.type_by_name("i32_t").unwrap();
    assert_eq!(reg.cast_int(i32_t, 2147483648).unwrap(), -2147483648);
    assert_eq!(reg.cast_int(i32_t, -2147483649).unwrap(), 2147483647);

    let flag = reg.type_by_name("flag_t").unwrap();
    assert_eq!(reg.cast_int(flag, 7).unwrap(), 1);
    assert_eq!(reg.cast_int(flag, 0).unwrap(), 0);

    // 64-bit unsigned keeps the two's-complement bit pattern
    let u64_t = reg.type_by_name("u64_t").unwrap();
    assert_eq!(reg.cast_int(u64_t, -1).unwrap(), -1);

    let real = reg.type_by_name("real_t").unwrap();
    assert!(matches!(
        reg.cast_int(real, 1).unwrap_err(),
        Error::Verification(VerificationError::NotAnInteger { .. })
    ));

    let tricky = reg.type_by_name("tricky_t").unwrap();
    assert!(matches!(
        reg.cast_int(tricky, 1).unwrap_err(),
        Error::Verification(VerificationError::UnresolvedInteger { name }) if name == "tricky_t"
    ));
}

#[test]
fn constants_and_macros_bind() {
    let reg = load("#define N 64\n#define VER ...\nconst double PI;");
    assert_eq!(reg.global("N"), Some(Binding::ConstantInt { value: Some(64) }));
    assert_eq!(reg.global("VER"), Some(Binding::ConstantInt { value: None }));

    let Some(Binding::Constant { type_index }) = reg.global("PI") else {
        panic!("PI should bind as a typed constant");
    };
    assert_eq!(
        reg.table().c_name(reg.type_ref(type_index).unwrap()),
        "double"
    );
}

#[test]
fn symbolic_lengths_fall_back_to_open_arrays() {
    let reg = load("int g[...]; int v[4];");

    let Some(Binding::Variable { type_index, size }) = reg.global("g") else {
        panic!("g should bind as a variable");
    };
    assert_eq!(size, None);
    assert_eq!(
        reg.table().c_name(reg.type_ref(type_index).unwrap()),
        "int[]"
    );

    let Some(Binding::Variable { type_index, size }) = reg.global("v") else {
        panic!("v should bind as a variable");
    };
    assert_eq!(size, Some(16));
    assert_eq!(
        reg.table().c_name(reg.type_ref(type_index).unwrap()),
        "int[4]"
    );
}

#[test]
fn partial_records_refuse_layout_questions() {
    let reg = load("struct pkt { int kind; char data[...]; }; typedef struct pkt pkt_t;");
    let pkt = reg.type_by_name("pkt_t").unwrap();
    assert!(matches!(
        reg.size_of(pkt).unwrap_err(),
        Error::Verification(VerificationError::PartialType { .. })
    ));
    // the offset of kind is 0 in practice, but the module does not say so
    assert!(matches!(
        reg.offset_of(pkt, "kind").unwrap_err(),
        Error::Verification(VerificationError::PartialType { .. })
    ));
    assert!(matches!(
        reg.offset_of(pkt, "missing").unwrap_err(),
        Error::Verification(VerificationError::UnknownField { .. })
    ));
}

#[test]
fn opaque_records_stay_opaque() {
    let reg = load("typedef struct handle_s handle_t;");
    let handle = reg.type_by_name("handle_t").unwrap();
    assert!(matches!(
        reg.size_of(handle).unwrap_err(),
        Error::Verification(VerificationError::OpaqueType { .. })
    ));
    assert!(matches!(
        reg.offset_of(handle, "anything").unwrap_err(),
        Error::Verification(VerificationError::OpaqueType { .. })
    ));
}

#[test]
fn bit_fields_have_no_addressable_offset() {
    let reg = load(
        "struct flags_s { unsigned ready : 1; unsigned error : 1; int rest; };\n\
         typedef struct flags_s flags_t;",
    );
    let flags = reg.type_by_name("flags_t").unwrap();
    assert_eq!(reg.size_of(flags).unwrap(), 8);
    assert_eq!(reg.offset_of(flags, "rest").unwrap(), 4);
    assert!(matches!(
        reg.offset_of(flags, "ready").unwrap_err(),
        Error::Verification(VerificationError::BitFieldOffset { .. })
    ));
}

#[test]
fn unnamed_records_decode_but_withhold_layout() {
    let reg = load("struct { int x; } v;");
    let Some(Binding::Variable { type_index, size }) = reg.global("v") else {
        panic!("v should bind as a variable");
    };
    assert_eq!(size, Some(4));
    assert!(matches!(
        reg.size_of(type_index).unwrap_err(),
        Error::Verification(VerificationError::PartialType { .. })
    ));
}

#[test]
fn invalid_modules_are_refused() {
    // a global pointing past the type array
    let mut module = compile("typedef struct point_s { int x, y; } point_t;");
    module.globals.push(GlobalEntry {
        name: "bogus".to_owned(),
        op: TypeOp::new(Opcode::GlobalVar, 99),
        size: None,
        check_value: None,
    });
    assert!(matches!(
        TypeRegistry::from_module(&module).unwrap_err(),
        Error::Verification(VerificationError::InvalidModule { .. })
    ));

    // a recorded size the fields cannot produce
    let mut module = compile("typedef struct point_s { int x, y; } point_t;");
    module.struct_unions[0].size = Some(16);
    assert!(matches!(
        TypeRegistry::from_module(&module).unwrap_err(),
        Error::Verification(VerificationError::InvalidModule { .. })
    ));

    // an enum member stripped out of the globals
    let mut module = compile("enum color { RED, GREEN = 5, BLUE };");
    module.globals.retain(|g| g.name != "GREEN");
    assert!(matches!(
        TypeRegistry::from_module(&module).unwrap_err(),
        Error::Verification(VerificationError::InvalidModule { .. })
    ));
}
