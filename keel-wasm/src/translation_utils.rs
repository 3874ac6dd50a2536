//! Helper functions and index types for the translation.

use crate::module::{Module, ValType};
use crate::operators::BlockType;
use cranelift_entity::{entity_impl, EntityRef};
use keel_ir as ir;

/// Index of a function (imported or defined) in a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncIndex(u32);
entity_impl!(FuncIndex, "func");

/// Index of a type in a module's type section.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(u32);
entity_impl!(TypeIndex, "type");

/// Index of a global (imported or defined) in a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalIndex(u32);
entity_impl!(GlobalIndex, "global");

/// Index of a linear memory (imported or defined) in a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryIndex(u32);
entity_impl!(MemoryIndex, "memory");

/// Index of a table (imported or defined) in a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableIndex(u32);
entity_impl!(TableIndex, "table");

/// The IR type representing a Wasm value type.
///
/// References are represented as 64-bit integers: a function reference is
/// the address of a function instance record, an extern reference an opaque
/// host word.
pub fn value_type(ty: ValType) -> ir::Type {
    match ty {
        ValType::I32 => ir::Type::I32,
        ValType::I64 => ir::Type::I64,
        ValType::F32 => ir::Type::F32,
        ValType::F64 => ir::Type::F64,
        ValType::V128 => ir::Type::V128,
        ValType::FuncRef | ValType::ExternRef => ir::Type::I64,
    }
}

/// The parameter and result types of a block type.
///
/// The module is validated, so a type index out of range is a bug in the
/// caller and panics.
pub fn blocktype_params_results(
    module: &Module,
    block_type: BlockType,
) -> (Vec<ValType>, Vec<ValType>) {
    match block_type {
        BlockType::Empty => (Vec::new(), Vec::new()),
        BlockType::Value(ty) => (Vec::new(), vec![ty]),
        BlockType::Func(index) => {
            let ty = &module.types[index as usize];
            (ty.params.clone(), ty.results.clone())
        }
    }
}

/// Create a block with one parameter per result type of the block type.
pub fn block_with_params(
    builder: &mut keel_frontend::FunctionBuilder,
    types: &[ValType],
) -> ir::Block {
    let block = builder.create_block();
    for &ty in types {
        builder.append_block_param(block, value_type(ty));
    }
    block
}

/// Turn the raw bits of a Wasm `f32.const` into an IR immediate.
pub fn f32_translation(bits: u32) -> ir::Ieee32 {
    ir::Ieee32::with_bits(bits)
}

/// Turn the raw bits of a Wasm `f64.const` into an IR immediate.
pub fn f64_translation(bits: u64) -> ir::Ieee64 {
    ir::Ieee64::with_bits(bits)
}

/// Index into the runtime's type-ID array for a module type.
pub fn type_id_offset(type_index: TypeIndex) -> u32 {
    // Type IDs are 4-byte integers.
    (type_index.index() as u32) * 4
}
