//! IR builder for frontends translating into keel IR.
//!
//! Frontends drive a [`FunctionBuilder`] one instruction at a time. Source
//! variables that are assigned at multiple program points are declared with
//! [`Variable`], written with `def_var` and read with `use_var`; the
//! builder turns them into pure SSA values on the fly, inserting block
//! parameters (phi nodes) where control flow merges, using the algorithm
//! from Braun et al., "Simple and Efficient Construction of Static Single
//! Assignment Form".

#![deny(missing_docs)]

mod frontend;
mod ssa;
mod variable;

pub use crate::frontend::{FuncInstBuilder, FunctionBuilder, FunctionBuilderContext};
pub use crate::variable::Variable;
