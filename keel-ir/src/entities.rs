//! IR entity references.
//!
//! Instructions need to reference other entities in the function: values,
//! blocks, signatures, external functions and jump tables. These references
//! are implemented as structs wrapping a `u32` index into a table in the
//! `Function` main data structure rather than as Rust references, both for
//! compactness and because the ownership rules would make the latter
//! impractical. There is a separate index type for each entity type, so we
//! don't lose type safety.
//!
//! The entity references all implement the `Display` trait in a way that
//! matches the textual IR format.

use cranelift_entity::entity_impl;

/// An opaque reference to a basic block in a function.
///
/// Blocks have explicitly typed parameters standing in for phi nodes; every
/// predecessor branch carries one argument per parameter.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an SSA value.
///
/// A value is produced by exactly one program point: either an instruction
/// result or a block parameter.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction in a function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A reference to a signature declared in the function preamble.
///
/// Used by `call_indirect` instructions and by external function
/// declarations.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// A reference to an external function declared in the function preamble.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// A reference to a jump table declared in the function preamble.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");
