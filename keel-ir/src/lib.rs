//! SSA intermediate representation for the keel compiler core.
//!
//! This crate defines the machine-independent IR that the Wasm frontend
//! lowers into: typed SSA values, basic blocks with explicit block
//! parameters (phi nodes), an instruction set covering Wasm's numeric,
//! memory and control operators, and the function container tying them
//! together. It deliberately stops at representation: construction lives in
//! `keel-frontend`, consumption (optimization, code generation) in
//! downstream crates.

#![deny(missing_docs)]

pub mod condcodes;
pub mod dfg;
pub mod entities;
pub mod exit_code;
pub mod extfunc;
pub mod function;
pub mod immediates;
pub mod instructions;
pub mod jumptable;
pub mod layout;
pub mod types;
pub mod verifier;
pub mod write;

pub use crate::condcodes::{FloatCC, IntCC};
pub use crate::dfg::{DataFlowGraph, ValueDef};
pub use crate::entities::{Block, FuncRef, Inst, JumpTable, SigRef, Value};
pub use crate::exit_code::ExitCode;
pub use crate::extfunc::{AbiParam, ArgumentPurpose, ExtFuncData, ExternalName, Signature};
pub use crate::function::Function;
pub use crate::immediates::{Ieee32, Ieee64, Imm64};
pub use crate::instructions::{InstructionData, Opcode};
pub use crate::jumptable::JumpTableData;
pub use crate::layout::Layout;
pub use crate::types::Type;
