#![cfg(test)]
use crate::ast::Ast;
use crate::declarations::{DeclKey, DeclValue, DeclarationKind, DeclarationRegistry};
use crate::error::DeclarationError;
use crate::ffi::CdefOptions;
use crate::lexer::tokenize;
use crate::model::{Primitive, RecordDecl, TypeKind, TypeRef, TypeTable};
use crate::parser::{Parser, TypeDefContext};
use crate::preprocess::prepare;
use crate::semantic::Analyzer;
use crate::source::SourceText;
use crate::StringId;

#[derive(Debug)]
struct Analyzed {
    table: TypeTable,
    registry: DeclarationRegistry,
}

fn run_cdef(
    source: &str,
    options: CdefOptions,
    table: &mut TypeTable,
    registry: &mut DeclarationRegistry,
    anon_counter: &mut u32,
) -> Result<(), DeclarationError> {
    let prepared = prepare(source)?;
    let text = SourceText::new(prepared.source);
    let tokens = tokenize(text.text())?;
    let mut ast = Ast::new();
    let mut types = TypeDefContext::new();
    for name in registry.typedef_names() {
        types.add_typedef(name);
    }
    let mut parser = Parser::new(&tokens, &mut ast, &text, types);
    parser.parse_translation_unit()?;
    let mut analyzer = Analyzer::new(&ast, table, registry, options, anon_counter);
    analyzer.run(&prepared.macros)
}

fn try_analyze(source: &str) -> Result<Analyzed, DeclarationError> {
    let mut table = TypeTable::new();
    let mut registry = DeclarationRegistry::new();
    let mut anon_counter = 0;
    run_cdef(
        source,
        CdefOptions::default(),
        &mut table,
        &mut registry,
        &mut anon_counter,
    )?;
    Ok(Analyzed { table, registry })
}

fn analyze(source: &str) -> Analyzed {
    try_analyze(source).expect("analysis failed")
}

impl Analyzed {
    fn lookup(&self, kind: DeclarationKind, name: &str) -> Option<DeclValue> {
        self.registry.lookup(DeclKey::new(kind, StringId::new(name)))
    }

    fn type_of(&self, kind: DeclarationKind, name: &str) -> TypeRef {
        match self.lookup(kind, name) {
            Some(DeclValue::Type(ty)) => ty,
            other => panic!("no {:?} named {}: {:?}", kind, name, other),
        }
    }

    fn record_of(&self, kind: DeclarationKind, name: &str) -> &RecordDecl {
        match self.table.kind(self.type_of(kind, name)) {
            TypeKind::Record(id) => self.table.record(*id),
            k => panic!("{} is not a record: {:?}", name, k),
        }
    }
}

#[test]
fn typedef_resolves_to_the_underlying_type() {
    let mut a = analyze("typedef int foo_t; foo_t *x; int *y;");
    let named = a.type_of(DeclarationKind::Typedef, "foo_t");
    assert_eq!(named, a.table.primitive(Primitive::Int));
    // interning collapses equal types to one reference
    assert_eq!(
        a.type_of(DeclarationKind::Variable, "x"),
        a.type_of(DeclarationKind::Variable, "y")
    );
}

#[test]
fn struct_body_fills_the_registered_shell() {
    let a = analyze("struct s *p; struct s { int a; };");
    let rec = a.record_of(DeclarationKind::Struct, "s");
    let fields = rec.fields.as_ref().expect("body was declared");
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, Some(StringId::new("a")));
    let TypeKind::Pointer { target, .. } = a.table.kind(a.type_of(DeclarationKind::Variable, "p"))
    else {
        panic!();
    };
    assert_eq!(*target, a.type_of(DeclarationKind::Struct, "s"));
}

#[test]
fn duplicate_struct_body_is_rejected() {
    let err = try_analyze("struct s { int a; }; struct s { int b; };").unwrap_err();
    assert_eq!(
        err,
        DeclarationError::DuplicateBody {
            kind: "struct",
            name: "s".to_string()
        }
    );
}

#[test]
fn enum_values_count_up_from_the_last_explicit_value() {
    let a = analyze("enum e { A, B = 5, C, D = -2, E };");
    let TypeKind::Enum(id) = a.table.kind(a.type_of(DeclarationKind::Enum, "e")) else {
        panic!();
    };
    let values: Vec<i64> = a
        .table
        .enum_decl(*id)
        .enumerators
        .iter()
        .map(|e| e.value)
        .collect();
    assert_eq!(values, [0, 5, 6, -2, -1]);
}

#[test]
fn typedef_names_an_anonymous_enum() {
    let a = analyze("typedef enum { LOW, HIGH = 9 } level_t;");
    let ty = a.type_of(DeclarationKind::Typedef, "level_t");
    let TypeKind::Enum(id) = *a.table.kind(ty) else {
        panic!();
    };
    let decl = a.table.enum_decl(id);
    assert_eq!(decl.name, StringId::new("$level_t"));
    assert_eq!(decl.forcename, Some(StringId::new("level_t")));
    // the body registers under its generated tag
    assert_eq!(
        a.lookup(DeclarationKind::Enum, "$level_t"),
        Some(DeclValue::Type(ty))
    );
}

#[test]
fn second_enum_body_is_dropped() {
    let a = analyze("enum e { A }; enum e { B, C };");
    let TypeKind::Enum(id) = a.table.kind(a.type_of(DeclarationKind::Enum, "e")) else {
        panic!();
    };
    assert_eq!(a.table.enum_decl(*id).enumerators.len(), 1);
}

#[test]
fn opaque_enum_mentions_do_not_register() {
    let a = analyze("enum e *x; enum e *y;");
    assert!(a.lookup(DeclarationKind::Enum, "e").is_none());
    // every opaque mention is a distinct type
    assert_ne!(
        a.type_of(DeclarationKind::Variable, "x"),
        a.type_of(DeclarationKind::Variable, "y")
    );
}

#[test]
fn registered_enum_wins_over_an_opaque_mention() {
    let a = analyze("enum e { A }; enum e x;");
    let TypeKind::Enum(_) = a.table.kind(a.type_of(DeclarationKind::Variable, "x")) else {
        panic!();
    };
    assert_eq!(
        a.type_of(DeclarationKind::Variable, "x"),
        a.type_of(DeclarationKind::Enum, "e")
    );
}

#[test]
fn anonymous_records_are_counted() {
    let a = analyze("struct { int a; } v; struct { int b; } w;");
    assert_eq!(
        a.record_of(DeclarationKind::Variable, "v").name,
        StringId::new("$1")
    );
    assert_eq!(
        a.record_of(DeclarationKind::Variable, "w").name,
        StringId::new("$2")
    );
}

#[test]
fn typedef_names_an_anonymous_record() {
    let a = analyze("typedef struct { int a; } pair_t;");
    let rec = a.record_of(DeclarationKind::Typedef, "pair_t");
    assert_eq!(rec.name, StringId::new("$pair_t"));
    assert_eq!(rec.forcename, Some(StringId::new("pair_t")));
    assert_eq!(
        a.lookup(DeclarationKind::Anonymous, "pair_t"),
        a.lookup(DeclarationKind::Typedef, "pair_t")
    );
}

#[test]
fn typedef_dots_declares_an_opaque_record() {
    let a = analyze("typedef ... handle_t;");
    let rec = a.record_of(DeclarationKind::Typedef, "handle_t");
    assert_eq!(rec.name, StringId::new("$handle_t"));
    assert_eq!(rec.forcename, Some(StringId::new("handle_t")));
    assert!(rec.fields.is_none());
    assert!(a.lookup(DeclarationKind::Anonymous, "handle_t").is_none());
}

#[test]
fn typedef_int_dots_declares_an_unknown_integer() {
    let a = analyze("typedef int... tricky_t;");
    let ty = a.type_of(DeclarationKind::Typedef, "tricky_t");
    assert!(matches!(
        a.table.kind(ty),
        TypeKind::UnknownInt(name) if *name == StringId::new("tricky_t")
    ));
}

#[test]
fn unknown_int_outside_typedef_is_rejected() {
    let err = try_analyze("int... x;").unwrap_err();
    assert!(matches!(err, DeclarationError::BadDotDotDot { .. }));
}

#[test]
fn functions_register_as_pointers_to_themselves() {
    let a = analyze("int f(long, short);");
    let ty = a.type_of(DeclarationKind::Function, "f");
    let TypeKind::FunctionPointer { args, varargs, .. } = a.table.kind(ty) else {
        panic!("expected function pointer");
    };
    assert!(!*varargs);
    assert_eq!(args.len(), 2);
}

#[test]
fn dots_only_functions_are_not_correct_c() {
    let err = try_analyze("int f(...);").unwrap_err();
    assert_eq!(
        err,
        DeclarationError::FunctionDotsOnly {
            name: "f".to_string()
        }
    );
}

#[test]
fn void_parameter_list_is_empty() {
    let a = analyze("int f(void);");
    let TypeKind::FunctionPointer { args, .. } =
        a.table.kind(a.type_of(DeclarationKind::Function, "f"))
    else {
        panic!();
    };
    assert!(args.is_empty());
}

#[test]
fn array_parameters_decay_to_pointers() {
    let a = analyze("void f(int a[8]);");
    let TypeKind::FunctionPointer { args, .. } =
        a.table.kind(a.type_of(DeclarationKind::Function, "f"))
    else {
        panic!();
    };
    let TypeKind::Pointer { target, .. } = a.table.kind(args[0]) else {
        panic!("expected the array length to be dropped");
    };
    assert!(matches!(
        a.table.kind(*target),
        TypeKind::Primitive(Primitive::Int)
    ));
}

#[test]
fn const_declarations_become_constants() {
    let a = analyze("const int limit; const char *version; int counter;");
    assert!(a.lookup(DeclarationKind::Constant, "limit").is_some());
    // pointer-to-const also classifies as a constant
    assert!(a.lookup(DeclarationKind::Constant, "version").is_some());
    assert!(a.lookup(DeclarationKind::Variable, "counter").is_some());
    let ty = a.type_of(DeclarationKind::Constant, "version");
    assert!(matches!(
        a.table.kind(ty),
        TypeKind::Pointer { to_const: true, .. }
    ));
}

#[test]
fn dots_member_marks_the_struct_partial() {
    let a = analyze("struct s { int a; ...; };");
    assert!(a.record_of(DeclarationKind::Struct, "s").partial);
}

#[test]
fn dots_array_field_marks_the_struct_partial() {
    let a = analyze("struct s { int a[...]; };");
    let rec = a.record_of(DeclarationKind::Struct, "s");
    assert!(rec.partial);
}

#[test]
fn unions_cannot_be_partial() {
    let err = try_analyze("union u { int a; ...; };").unwrap_err();
    assert_eq!(
        err,
        DeclarationError::CannotBePartial {
            type_name: "union u".to_string()
        }
    );
}

#[test]
fn partial_needs_a_c_name() {
    let err = try_analyze("struct { int a; ...; } v;").unwrap_err();
    assert_eq!(
        err,
        DeclarationError::PartialWithoutCName {
            type_name: "struct $1".to_string()
        }
    );
}

#[test]
fn nested_anonymous_records_stay_unnamed_fields() {
    let a = analyze("struct s { struct { int x; }; int y; };");
    let rec = a.record_of(DeclarationKind::Struct, "s");
    let fields = rec.fields.as_ref().unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].name, None);
    assert!(matches!(a.table.kind(fields[0].ty), TypeKind::Record(_)));
    assert!(rec.has_anonymous_record_fields(&a.table));
}

#[test]
fn primitive_spellings_normalize() {
    let a = analyze("unsigned u; short int s; signed char c; long int l;");
    let prim = |name: &str| match a.table.kind(a.type_of(DeclarationKind::Variable, name)) {
        TypeKind::Primitive(p) => *p,
        k => panic!("{:?}", k),
    };
    assert_eq!(prim("u"), Primitive::UInt);
    assert_eq!(prim("s"), Primitive::Short);
    assert_eq!(prim("c"), Primitive::SChar);
    assert_eq!(prim("l"), Primitive::Long);
}

#[test]
fn unnormalizable_spelling_is_an_unknown_type() {
    let err = try_analyze("long signed x;").unwrap_err();
    assert_eq!(
        err,
        DeclarationError::UnknownType {
            name: "long signed".to_string(),
            line: 1
        }
    );
}

#[test]
fn macros_register_with_their_value() {
    let a = analyze("#define LIMIT 64\n#define LATER ...\n");
    assert_eq!(
        a.lookup(DeclarationKind::Macro, "LIMIT"),
        Some(DeclValue::Macro(Some(64)))
    );
    assert_eq!(
        a.lookup(DeclarationKind::Macro, "LATER"),
        Some(DeclValue::Macro(None))
    );
}

#[test]
fn packed_option_applies_to_new_bodies() {
    let mut table = TypeTable::new();
    let mut registry = DeclarationRegistry::new();
    let mut anon_counter = 0;
    let options = CdefOptions {
        packed: true,
        ..CdefOptions::default()
    };
    run_cdef(
        "struct s { char a; int b; };",
        options,
        &mut table,
        &mut registry,
        &mut anon_counter,
    )
    .unwrap();
    let a = Analyzed { table, registry };
    assert!(a.record_of(DeclarationKind::Struct, "s").packed);
}

#[test]
fn override_allows_changing_a_declaration() {
    let mut table = TypeTable::new();
    let mut registry = DeclarationRegistry::new();
    let mut anon_counter = 0;
    run_cdef(
        "int x;",
        CdefOptions::default(),
        &mut table,
        &mut registry,
        &mut anon_counter,
    )
    .unwrap();
    let conflict = run_cdef(
        "long x;",
        CdefOptions::default(),
        &mut table,
        &mut registry,
        &mut anon_counter,
    );
    assert!(matches!(
        conflict,
        Err(DeclarationError::MultipleDeclarations { .. })
    ));
    run_cdef(
        "long x;",
        CdefOptions {
            override_: true,
            ..CdefOptions::default()
        },
        &mut table,
        &mut registry,
        &mut anon_counter,
    )
    .unwrap();
    let a = Analyzed { table, registry };
    assert!(matches!(
        a.table.kind(a.type_of(DeclarationKind::Variable, "x")),
        TypeKind::Primitive(Primitive::Long)
    ));
}
