#![cfg(test)]
use crate::compiler::{GlobalEntry, LenSlot, Module, ModuleKind, OpSlot};
use crate::error::{Error, VerificationError};
use crate::ffi::Ffi;
use crate::opcode::{Opcode, StructFlags, TypeOp};

fn compile(source: &str, kind: ModuleKind) -> Result<Module, Error> {
    let mut ffi = Ffi::new();
    ffi.cdef(source).expect("cdef failed");
    ffi.compile("m", kind)
}

fn module(source: &str) -> Module {
    compile(source, ModuleKind::Api).expect("compile failed")
}

fn verification(err: Error) -> VerificationError {
    match err {
        Error::Verification(v) => v,
        other => panic!("expected a verification error, got {other}"),
    }
}

fn global<'a>(module: &'a Module, name: &str) -> &'a GlobalEntry {
    module
        .globals
        .iter()
        .find(|g| g.name == name)
        .unwrap_or_else(|| panic!("no global {name}"))
}

fn op(opcode: Opcode, arg: i32) -> OpSlot {
    OpSlot::Op(TypeOp::new(opcode, arg))
}

#[test]
fn point_module_renders_stably() {
    let mut ffi = Ffi::new();
    ffi.cdef("typedef struct point_s { int x, y; } point_t;")
        .unwrap();
    let module = ffi.compile("point", ModuleKind::Api).unwrap();
    insta::assert_snapshot!(module.render(), @r"
    // module 'point' (api), format 0x2601
    //
    // types:
    /*   0 */ PRIMITIVE 7                  // int
    /*   1 */ STRUCT_UNION 0               // struct point_s
    //
    // globals:
    //
    // fields:
    /*   0 */ x: NOOP 0, offset 0, size 4
    /*   1 */ y: NOOP 0, offset 4, size 4
    //
    // struct_unions:
    point_s: slot 1, flags CHECK_FIELDS, size 8, align 4, fields 2 at 0
    //
    // enums:
    //
    // typenames:
    point_t: slot 1
    ");
}

#[test]
fn function_runs_pack_arguments_inline() {
    let m = module("int f(int, long); void g(short);");
    let expected = [
        op(Opcode::Function, 1),
        op(Opcode::Primitive, 7),
        op(Opcode::Primitive, 9),
        op(Opcode::FunctionEnd, 0),
        op(Opcode::Function, 7),
        op(Opcode::Primitive, 5),
        op(Opcode::FunctionEnd, 0),
        op(Opcode::Primitive, 0),
    ];
    assert_eq!(m.types, expected);
    assert_eq!(m.annotations[0].as_deref(), Some("int()(int, long)"));
    assert_eq!(m.annotations[3], None);

    assert_eq!(global(&m, "f").op, TypeOp::new(Opcode::BuiltinFunctionV, 0));
    assert_eq!(global(&m, "g").op, TypeOp::new(Opcode::BuiltinFunctionO, 4));
}

#[test]
fn declaration_order_does_not_matter() {
    let one = module(
        "#define K 3\n\
         typedef unsigned sz;\n\
         struct s { sz a; int b; };\n\
         int f(struct s *);\n\
         const double PI;",
    );
    // same declarations, permuted as far as parse order allows
    let two = module(
        "typedef unsigned sz;\n\
         const double PI;\n\
         int f(struct s *);\n\
         struct s { sz a; int b; };\n\
         #define K 3",
    );
    assert_eq!(one.render(), two.render());
}

#[test]
fn dots_arrays_resolve_against_globals() {
    let m = module("int g[...]; int v[4];");
    let expected = [
        op(Opcode::Primitive, 7),
        op(Opcode::Array, 0),
        OpSlot::Len(LenSlot::Fixed(4)),
        op(Opcode::Array, 0),
        OpSlot::Len(LenSlot::Global("g".to_owned())),
    ];
    assert_eq!(m.types, expected);

    let g = global(&m, "g");
    assert_eq!(g.op, TypeOp::new(Opcode::GlobalVar, 3));
    assert_eq!(g.size, None);
    let v = global(&m, "v");
    assert_eq!(v.op, TypeOp::new(Opcode::GlobalVar, 1));
    assert_eq!(v.size, Some(16));
}

#[test]
fn dots_fields_mark_partial_structs() {
    let m = module("struct pkt { int kind; char data[...]; };");
    assert_eq!(
        m.types[2],
        OpSlot::Len(LenSlot::Field {
            struct_index: 0,
            field: "data".to_owned(),
        })
    );

    let entry = &m.struct_unions[0];
    assert_eq!(entry.name, "pkt");
    assert_eq!(entry.flags, StructFlags::empty());
    assert_eq!(entry.size, None);
    assert_eq!(entry.align, None);
    assert_eq!((entry.first_field_index, entry.field_count), (0, 2));

    assert_eq!(m.fields[0].name, "kind");
    assert_eq!(m.fields[0].offset, None);
    assert_eq!(m.fields[1].name, "data");
    assert_eq!(m.fields[1].op, TypeOp::new(Opcode::Noop, 1));
}

#[test]
fn unnamed_records_get_a_missing_entry() {
    let m = module("struct { int x; } v;");
    let entry = &m.struct_unions[0];
    assert_eq!(entry.name, "$1");
    assert_eq!(entry.comment, Some("unnamed"));
    assert_eq!(entry.size, None);
    assert!(entry.flags.contains(StructFlags::CHECK_FIELDS));
    assert_eq!((entry.first_field_index, entry.field_count), (0, 1));
    assert_eq!(m.fields[0].offset, None);

    // the variable itself still knows its size
    assert_eq!(global(&m, "v").size, Some(4));
}

#[test]
fn field_slices_follow_struct_order() {
    let m = module("struct a { char c; }; struct b { long l; };");
    assert_eq!(m.struct_unions[0].name, "a");
    assert_eq!(m.struct_unions[0].first_field_index, 0);
    assert_eq!(m.struct_unions[1].name, "b");
    assert_eq!(m.struct_unions[1].first_field_index, 1);
    assert_eq!(m.fields[0].name, "c");
    assert_eq!(m.fields[1].name, "l");
}

#[test]
fn comma_declarators_emit_one_contiguous_slice() {
    let m = module("struct foo { int a; short b, c; };");
    assert_eq!(m.struct_unions.len(), 1);
    let entry = &m.struct_unions[0];
    assert_eq!((entry.first_field_index, entry.field_count), (0, 3));
    assert_eq!((entry.size, entry.align), (Some(8), Some(4)));

    let names: Vec<&str> = m.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c"]);
    let offsets: Vec<Option<u64>> = m.fields.iter().map(|f| f.offset).collect();
    assert_eq!(offsets, [Some(0), Some(4), Some(6)]);
}

#[test]
fn enums_emit_members_and_base() {
    let m = module("enum color { RED, GREEN = 5, BLUE };");
    assert_eq!(m.types, [op(Opcode::Enum, 0)]);

    let entry = &m.enums[0];
    assert_eq!(entry.name, "color");
    assert_eq!(entry.type_index, 0);
    assert_eq!((entry.size, entry.signed), (4, false));
    assert_eq!(entry.enumerators, "RED,GREEN,BLUE");

    // alphabetical, each carrying its value to verify at build time
    let names: Vec<&str> = m.globals.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["BLUE", "GREEN", "RED"]);
    assert_eq!(global(&m, "GREEN").op, TypeOp::new(Opcode::Enum, -1));
    assert_eq!(global(&m, "GREEN").check_value, Some(5));
    assert_eq!(global(&m, "BLUE").check_value, Some(6));
}

#[test]
fn misplaced_dots_array_is_refused() {
    let err = compile("typedef int t[...];", ModuleKind::Api).unwrap_err();
    assert_eq!(
        verification(err),
        VerificationError::MisplacedDotsArray {
            type_name: "int[...]".to_owned(),
        }
    );
}

#[test]
fn varargs_need_api_mode() {
    let err = compile("int printf(const char *, ...);", ModuleKind::Abi).unwrap_err();
    assert_eq!(
        verification(err),
        VerificationError::VariadicAbi {
            name: "printf".to_owned(),
        }
    );

    let m = compile("int printf(const char *, ...);", ModuleKind::Api).unwrap();
    assert_eq!(m.types[2], op(Opcode::FunctionEnd, 1));
    // bound as a constant function pointer, not a builtin
    assert_eq!(global(&m, "printf").op, TypeOp::new(Opcode::Constant, 5));
}

#[test]
fn partial_enums_need_api_mode() {
    let source = "enum st { OK, ... };";
    let err = compile(source, ModuleKind::Abi).unwrap_err();
    assert_eq!(
        verification(err),
        VerificationError::PartialType {
            type_name: "enum st".to_owned(),
        }
    );
    assert!(compile(source, ModuleKind::Api).is_ok());
}

#[test]
fn dots_macros_need_api_mode() {
    let source = "#define N 64\n#define VER ...";
    let err = compile(source, ModuleKind::Abi).unwrap_err();
    assert_eq!(
        verification(err),
        VerificationError::DotsMacroAbi {
            name: "VER".to_owned(),
        }
    );

    let m = compile(source, ModuleKind::Api).unwrap();
    assert_eq!(global(&m, "N").op, TypeOp::new(Opcode::ConstantInt, -1));
    assert_eq!(global(&m, "N").check_value, Some(64));
    assert_eq!(global(&m, "VER").check_value, None);
}

#[test]
fn abi_modules_bind_through_the_dynamic_linker() {
    let m = compile("int f(int); const double PI;", ModuleKind::Abi).unwrap();
    let expected = [
        op(Opcode::Function, 1),
        op(Opcode::Primitive, 7),
        op(Opcode::FunctionEnd, 0),
        op(Opcode::Primitive, 14),
    ];
    assert_eq!(m.types, expected);
    assert_eq!(global(&m, "f").op, TypeOp::new(Opcode::DlopenFunc, 0));
    assert_eq!(global(&m, "PI").op, TypeOp::new(Opcode::DlopenConst, 3));
}

#[test]
fn included_records_are_externally_owned() {
    let mut base = Ffi::new();
    base.cdef("struct pt { int x, y; };").unwrap();
    let mut user = Ffi::new();
    user.include(&base).unwrap();
    user.cdef("struct pt origin;").unwrap();

    let m = user.compile("m", ModuleKind::Api).unwrap();
    let entry = &m.struct_unions[0];
    assert_eq!(entry.name, "pt");
    assert_eq!(entry.flags, StructFlags::EXTERNAL);
    assert_eq!(entry.comment, Some("external"));
    assert_eq!((entry.first_field_index, entry.field_count), (-1, 0));

    // the imported fields still size the variable
    assert_eq!(global(&m, "origin").size, Some(8));
}

#[test]
fn emit_skips_identical_files() {
    let path = std::env::temp_dir().join(format!("ffidef-emit-{}.txt", std::process::id()));
    let mut ffi = Ffi::new();
    ffi.cdef("typedef int t;").unwrap();
    assert!(ffi.emit("m", ModuleKind::Api, &path).unwrap());
    assert!(!ffi.emit("m", ModuleKind::Api, &path).unwrap());

    ffi.cdef("typedef long u;").unwrap();
    assert!(ffi.emit("m", ModuleKind::Api, &path).unwrap());
    let _ = std::fs::remove_file(&path);
}
