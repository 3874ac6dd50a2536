//! A frontend-facing notion of a variable.

use cranelift_entity::entity_impl;

/// An opaque reference to a variable.
///
/// A variable is a mutable name in the source language: a Wasm local, a
/// cached global, anything the frontend wants to assign more than once.
/// The index space is chosen by the frontend; the builder only requires
/// that each variable's type is declared before its first use.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(u32);
entity_impl!(Variable, "var");

impl Variable {
    /// Create a variable with the given index.
    pub fn with_u32(index: u32) -> Self {
        debug_assert!(index < u32::MAX, "invalid variable index");
        Self(index)
    }
}
