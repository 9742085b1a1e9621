#![cfg(test)]

use thin_vec::thin_vec;

use super::*;

fn field(name: &str, ty: TypeRef) -> FieldDecl {
    FieldDecl {
        name: Some(StringId::new(name)),
        ty,
        bit_size: None,
    }
}

fn bit_field(name: Option<&str>, ty: TypeRef, bits: u32) -> FieldDecl {
    FieldDecl {
        name: name.map(StringId::new),
        ty,
        bit_size: Some(bits),
    }
}

fn sealed_record(table: &mut TypeTable, name: &str, is_union: bool, fields: Vec<FieldDecl>) -> RecordId {
    let id = table.new_record(RecordDecl::opaque(is_union, StringId::new(name)));
    table.record_mut(id).fields = Some(fields.into_iter().collect());
    id
}

#[test]
fn interning_collapses_structural_duplicates() {
    let mut table = TypeTable::new();
    let int = table.primitive(Primitive::Int);
    let p1 = table.pointer_to(int);
    let p2 = table.pointer_to(int);
    assert_eq!(p1, p2);
    let pc = table.const_pointer_to(int);
    assert_ne!(p1, pc);
    let a1 = table.array_of(int, ArrayLength::Fixed(10));
    let a2 = table.array_of(int, ArrayLength::Fixed(10));
    assert_eq!(a1, a2);
    assert_ne!(a1, table.array_of(int, ArrayLength::Open));
}

#[test]
fn named_records_intern_by_identity() {
    let mut table = TypeTable::new();
    let foo = table.new_record(RecordDecl::opaque(false, StringId::new("foo")));
    let other = table.new_record(RecordDecl::opaque(false, StringId::new("foo")));
    assert_eq!(table.record_type(foo), table.record_type(foo));
    assert_ne!(table.record_type(foo), table.record_type(other));
}

#[test]
fn primitive_properties() {
    assert_eq!(Primitive::Long.size(), 8);
    assert_eq!(Primitive::WChar.size(), 4);
    assert!(Primitive::WChar.is_signed());
    assert!(Primitive::Bool.is_integer());
    assert!(!Primitive::Char.is_integer());
    assert!(Primitive::Char.is_char_kind());
    assert_eq!(Primitive::FloatComplex.size(), 8);
    assert_eq!(Primitive::FloatComplex.align(), 4);
    assert_eq!(Primitive::LongDouble.align(), 16);
    assert_eq!(Primitive::from_name("unsigned long long"), Some(Primitive::ULongLong));
    assert_eq!(Primitive::from_name("uint_fast16_t"), Some(Primitive::UIntFast16));
    assert_eq!(Primitive::from_name("bogus_t"), None);
}

#[test]
fn primitive_index_round_trips() {
    for index in 1..=51u8 {
        let prim = Primitive::from_index(index).unwrap();
        assert_eq!(prim.index(), index);
        assert_eq!(Primitive::from_name(prim.as_str()), Some(prim));
    }
    assert_eq!(Primitive::from_index(0), None);
    assert_eq!(Primitive::from_index(52), None);
}

#[test]
fn c_name_spellings() {
    let mut table = TypeTable::new();
    let int = table.primitive(Primitive::Int);
    let ch = table.primitive(Primitive::Char);

    let ptr = table.pointer_to(int);
    assert_eq!(table.c_name(ptr), "int *");

    let const_ptr = table.const_pointer_to(ch);
    assert_eq!(table.c_name(const_ptr), "char const *");

    let arr = table.array_of(int, ArrayLength::Fixed(10));
    assert_eq!(table.c_name(arr), "int[10]");
    let ptr_arr = table.pointer_to(arr);
    assert_eq!(table.c_name(ptr_arr), "int(*)[10]");
    let arr_ptr = table.array_of(ptr, ArrayLength::Fixed(4));
    assert_eq!(table.c_name(arr_ptr), "int *[4]");

    let dots = table.array_of(int, ArrayLength::Dots);
    assert_eq!(table.c_name(dots), "int[/*...*/]");

    let fnptr = table.intern(TypeKind::FunctionPointer {
        args: vec![int, ch],
        result: int,
        varargs: false,
    });
    assert_eq!(table.c_name(fnptr), "int(*)(int, char)");

    let void = table.void_type();
    let noargs = table.intern(TypeKind::FunctionPointer {
        args: vec![],
        result: void,
        varargs: false,
    });
    assert_eq!(table.c_name(noargs), "void(*)(void)");

    let variadic = table.intern(TypeKind::Function {
        args: vec![int],
        result: int,
        varargs: true,
    });
    assert_eq!(table.c_name(variadic), "int()(int, ...)");
}

#[test]
fn spelling_places_the_declared_name() {
    let mut table = TypeTable::new();
    let int = table.primitive(Primitive::Int);
    let ptr = table.pointer_to(int);
    let arr = table.array_of(int, ArrayLength::Fixed(5));

    assert_eq!(table.spelling(int, "x").unwrap(), "int x");
    assert_eq!(table.spelling(ptr, "x").unwrap(), "int * x");
    assert_eq!(table.spelling(int, "*").unwrap(), "int *");
    assert_eq!(table.spelling(arr, "(*)").unwrap(), "int(*)[5]");
    assert_eq!(table.spelling(arr, "[6]").unwrap(), "int[6][5]");
    assert_eq!(table.spelling(arr, "*").unwrap(), "int(*)[5]");

    let anon = table.new_record(RecordDecl::opaque(false, StringId::new("$1")));
    let anon_ty = table.record_type(anon);
    assert!(matches!(
        table.spelling(anon_ty, ""),
        Err(VerificationError::UnknownTypeName { .. })
    ));
}

#[test]
fn struct_layout_basics() {
    let mut table = TypeTable::new();
    let ch = table.primitive(Primitive::Char);
    let int = table.primitive(Primitive::Int);
    let fields = vec![field("a", ch), field("b", int)];
    let id = sealed_record(&mut table, "s", false, fields);
    let layout = table.record_layout(id).unwrap();
    assert_eq!(layout.size, 8);
    assert_eq!(layout.align, 4);
    assert_eq!(table.field_offset(id, StringId::new("a")).unwrap(), 0);
    assert_eq!(table.field_offset(id, StringId::new("b")).unwrap(), 4);
    let ty = table.record_type(id);
    assert_eq!(table.size_of(ty).unwrap(), 8);
}

#[test]
fn union_layout_overlaps_members() {
    let mut table = TypeTable::new();
    let ch = table.primitive(Primitive::Char);
    let int = table.primitive(Primitive::Int);
    let fields = vec![field("a", ch), field("b", int)];
    let id = sealed_record(&mut table, "u", true, fields);
    let layout = table.record_layout(id).unwrap();
    assert_eq!(layout.size, 4);
    assert_eq!(layout.align, 4);
    assert_eq!(table.field_offset(id, StringId::new("b")).unwrap(), 0);
}

#[test]
fn bit_fields_pack_into_storage_units() {
    let mut table = TypeTable::new();
    let ch = table.primitive(Primitive::Char);
    let int = table.primitive(Primitive::Int);
    let fields = vec![
        field("a", ch),
        bit_field(Some("b"), int, 25),
        field("c", ch),
    ];
    let id = sealed_record(&mut table, "s", false, fields);
    let layout = table.record_layout(id).unwrap();
    assert_eq!(layout.size, 12);
    assert_eq!(layout.align, 4);
    assert_eq!(table.field_offset(id, StringId::new("a")).unwrap(), 0);
    assert_eq!(table.field_offset(id, StringId::new("c")).unwrap(), 8);
    assert!(matches!(
        table.field_offset(id, StringId::new("b")),
        Err(VerificationError::BitFieldOffset { .. })
    ));
}

#[test]
fn zero_width_bit_field_closes_the_unit() {
    let mut table = TypeTable::new();
    let ch = table.primitive(Primitive::Char);
    let int = table.primitive(Primitive::Int);
    let fields = vec![
        field("a", ch),
        bit_field(None, int, 0),
        field("b", ch),
    ];
    let id = sealed_record(&mut table, "s", false, fields);
    let layout = table.record_layout(id).unwrap();
    assert_eq!(table.field_offset(id, StringId::new("b")).unwrap(), 4);
    assert_eq!(layout.size, 5);
    assert_eq!(layout.align, 1);
}

#[test]
fn packed_records_drop_member_padding() {
    let mut table = TypeTable::new();
    let ch = table.primitive(Primitive::Char);
    let int = table.primitive(Primitive::Int);
    let fields = vec![field("a", ch), field("b", int)];
    let id = sealed_record(&mut table, "s", false, fields);
    table.record_mut(id).packed = true;
    let layout = table.record_layout(id).unwrap();
    assert_eq!(layout.size, 5);
    assert_eq!(layout.align, 1);
    assert_eq!(table.field_offset(id, StringId::new("b")).unwrap(), 1);
}

#[test]
fn flexible_array_member_occupies_no_space() {
    let mut table = TypeTable::new();
    let int = table.primitive(Primitive::Int);
    let ch = table.primitive(Primitive::Char);
    let tail = table.array_of(ch, ArrayLength::Open);
    let fields = vec![field("n", int), field("tail", tail)];
    let id = sealed_record(&mut table, "s", false, fields);
    let layout = table.record_layout(id).unwrap();
    assert_eq!(layout.size, 4);
    assert_eq!(table.field_offset(id, StringId::new("tail")).unwrap(), 4);
}

#[test]
fn anonymous_members_are_looked_through() {
    let mut table = TypeTable::new();
    let int = table.primitive(Primitive::Int);
    let ch = table.primitive(Primitive::Char);
    let inner_fields = vec![field("a", int)];
    let inner = sealed_record(&mut table, "$1", false, inner_fields);
    let inner_ty = table.record_type(inner);
    let fields = vec![
        FieldDecl {
            name: None,
            ty: inner_ty,
            bit_size: None,
        },
        field("b", ch),
    ];
    let outer = sealed_record(&mut table, "outer", false, fields);
    assert_eq!(table.field_offset(outer, StringId::new("a")).unwrap(), 0);
    assert_eq!(table.field_offset(outer, StringId::new("b")).unwrap(), 4);
    assert!(matches!(
        table.field_offset(outer, StringId::new("missing")),
        Err(VerificationError::UnknownField { .. })
    ));
}

#[test]
fn opaque_partial_and_recursive_records_have_no_layout() {
    let mut table = TypeTable::new();
    let opaque = table.new_record(RecordDecl::opaque(false, StringId::new("op")));
    assert!(matches!(
        table.record_layout(opaque),
        Err(VerificationError::OpaqueType { .. })
    ));

    let int = table.primitive(Primitive::Int);
    let partial = sealed_record(&mut table, "pa", false, vec![field("a", int)]);
    table.record_mut(partial).partial = true;
    assert!(matches!(
        table.record_layout(partial),
        Err(VerificationError::PartialType { .. })
    ));

    let loopy = table.new_record(RecordDecl::opaque(false, StringId::new("loop")));
    let loopy_ty = table.record_type(loopy);
    table.record_mut(loopy).fields = Some(thin_vec![FieldDecl {
        name: Some(StringId::new("next")),
        ty: loopy_ty,
        bit_size: None,
    }]);
    assert!(matches!(
        table.record_layout(loopy),
        Err(VerificationError::RecursiveRecord { .. })
    ));
}

#[test]
fn sizeless_types_report_errors() {
    let mut table = TypeTable::new();
    let void = table.void_type();
    assert!(matches!(
        table.size_of(void),
        Err(VerificationError::UnsizedType { .. })
    ));

    let unknown = table.unknown_integer(StringId::new("myint_t"));
    assert!(matches!(
        table.size_of(unknown),
        Err(VerificationError::UnresolvedInteger { .. })
    ));

    let int = table.primitive(Primitive::Int);
    let dots = table.array_of(int, ArrayLength::Dots);
    assert!(matches!(
        table.size_of(dots),
        Err(VerificationError::UnresolvedArrayLength { .. })
    ));
}

#[test]
fn enum_base_type_tracks_value_range() {
    let mk = |values: &[i64]| EnumDecl {
        name: StringId::new("e"),
        forcename: None,
        enumerators: values
            .iter()
            .enumerate()
            .map(|(i, &v)| Enumerator {
                name: StringId::new(format!("V{i}")),
                value: v,
            })
            .collect(),
        partial: false,
    };
    assert_eq!(mk(&[]).base_primitive(), Primitive::UInt);
    assert_eq!(mk(&[0, 1, 2]).base_primitive(), Primitive::UInt);
    assert_eq!(mk(&[-1, 5]).base_primitive(), Primitive::Int);
    assert_eq!(mk(&[0, 1 << 40]).base_primitive(), Primitive::ULong);
    assert_eq!(mk(&[-1, 1 << 40]).base_primitive(), Primitive::Long);

    let mut table = TypeTable::new();
    let id = table.new_enum(mk(&[0, 1]));
    let ty = table.enum_type(id);
    assert_eq!(table.size_of(ty).unwrap(), 4);
}

#[test]
fn decay_turns_arrays_and_functions_into_pointers() {
    let mut table = TypeTable::new();
    let int = table.primitive(Primitive::Int);
    let arr = table.array_of(int, ArrayLength::Fixed(10));
    let expected = table.pointer_to(int);
    assert_eq!(table.decayed(arr), expected);

    let raw = table.intern(TypeKind::Function {
        args: vec![int],
        result: int,
        varargs: false,
    });
    let fnptr = table.as_function_pointer(raw);
    assert_eq!(table.decayed(raw), fnptr);
    assert_eq!(table.as_raw_function(fnptr), raw);
    assert_eq!(table.decayed(fnptr), fnptr);
}
