//! Opcode emission into the assigned slots.

use crate::error::VerificationError;
use crate::model::{ArrayLength, TypeKind, TypeRef, TypeTable};
use crate::opcode::{Opcode, TypeOp, PRIM_VOID};

use super::collect::{DenseIds, TypeCollection};
use super::module::{LenSlot, OpSlot};

/// Write the opcode run for `ty` at its primary slot. Function signatures
/// also fill their inline argument and end-marker slots; arrays fill their
/// trailing length slot.
pub(super) fn emit_type(
    table: &mut TypeTable,
    collection: &TypeCollection,
    dense: &DenseIds,
    ty: TypeRef,
    out: &mut [Option<OpSlot>],
) -> Result<(), VerificationError> {
    let slot = collection.slot_of(ty) as usize;
    match table.kind(ty).clone() {
        TypeKind::Void => {
            fill(out, slot, op(Opcode::Primitive, PRIM_VOID));
        }
        TypeKind::Primitive(p) => {
            fill(out, slot, op(Opcode::Primitive, i32::from(p.index())));
        }
        TypeKind::UnknownInt(name) => {
            fill(
                out,
                slot,
                OpSlot::UnknownPrim {
                    name: name.as_str().to_owned(),
                },
            );
        }
        TypeKind::Pointer { target, .. } => {
            fill(out, slot, op(Opcode::Pointer, collection.slot_of(target)));
        }
        TypeKind::FunctionPointer { .. } => {
            let raw = table.as_raw_function(ty);
            fill(out, slot, op(Opcode::Pointer, collection.slot_of(raw)));
        }
        TypeKind::Function {
            args,
            result,
            varargs,
        } => {
            fill(out, slot, op(Opcode::Function, collection.slot_of(result)));
            let mut index = slot + 1;
            for arg in args {
                let real = collection.slot_of(arg);
                if index != real as usize {
                    // An argument type already slotted elsewhere points
                    // there; primitives are cheap enough to re-emit inline.
                    let inline = match table.kind(arg) {
                        TypeKind::Void => op(Opcode::Primitive, PRIM_VOID),
                        TypeKind::Primitive(p) => op(Opcode::Primitive, i32::from(p.index())),
                        _ => op(Opcode::Noop, real),
                    };
                    fill(out, index, inline);
                }
                index += 1;
            }
            fill(out, index, op(Opcode::FunctionEnd, i32::from(varargs)));
        }
        TypeKind::Array { item, length } => {
            let item_slot = collection.slot_of(item);
            match length {
                ArrayLength::Open => {
                    fill(out, slot, op(Opcode::OpenArray, item_slot));
                }
                ArrayLength::Dots => {
                    return Err(VerificationError::MisplacedDotsArray {
                        type_name: table.c_name(ty).replace("/*...*/", "..."),
                    });
                }
                ArrayLength::Fixed(n) => {
                    fill(out, slot, op(Opcode::Array, item_slot));
                    fill(out, slot + 1, OpSlot::Len(LenSlot::Fixed(n)));
                }
                ArrayLength::OfGlobal(name) => {
                    fill(out, slot, op(Opcode::Array, item_slot));
                    fill(
                        out,
                        slot + 1,
                        OpSlot::Len(LenSlot::Global(name.as_str().to_owned())),
                    );
                }
                ArrayLength::OfField { record, field } => {
                    fill(out, slot, op(Opcode::Array, item_slot));
                    fill(
                        out,
                        slot + 1,
                        OpSlot::Len(LenSlot::Field {
                            struct_index: dense.record_slot(record) as u32,
                            field: field.as_str().to_owned(),
                        }),
                    );
                }
            }
        }
        TypeKind::Record(id) => {
            fill(out, slot, op(Opcode::StructUnion, dense.record_slot(id)));
        }
        TypeKind::Enum(id) => {
            fill(out, slot, op(Opcode::Enum, dense.enum_slot(id)));
        }
    }
    Ok(())
}

fn op(opcode: Opcode, arg: i32) -> OpSlot {
    OpSlot::Op(TypeOp::new(opcode, arg))
}

fn fill(out: &mut [Option<OpSlot>], slot: usize, value: OpSlot) {
    debug_assert!(out[slot].is_none(), "slot {slot} emitted twice");
    out[slot] = Some(value);
}
