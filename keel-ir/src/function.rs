//! Intermediate representation of a function.
//!
//! The `Function` struct defined in this module owns all of its basic
//! blocks, instructions and preamble entities.

use crate::dfg::DataFlowGraph;
use crate::entities::{FuncRef, JumpTable, SigRef};
use crate::extfunc::{ExtFuncData, ExternalName, Signature};
use crate::jumptable::JumpTableData;
use crate::layout::Layout;
use crate::write::write_function;
use cranelift_entity::PrimaryMap;
use core::fmt;

/// A function.
///
/// Functions can be cloned, and the clone has the same entity numbers as
/// the original: the numbering is determined entirely by the construction
/// sequence, which keeps the textual form reproducible.
#[derive(Clone)]
pub struct Function {
    /// Name of this function.
    pub name: ExternalName,

    /// Signature of this function.
    pub signature: Signature,

    /// Jump tables used by `br_table` instructions in this function.
    pub jump_tables: PrimaryMap<JumpTable, JumpTableData>,

    /// Data flow graph containing the primary definition of all
    /// instructions, blocks and values.
    pub dfg: DataFlowGraph,

    /// Layout of blocks and instructions in the function body.
    pub layout: Layout,
}

impl Function {
    /// Create a function with the given name and signature.
    pub fn with_name_signature(name: ExternalName, sig: Signature) -> Self {
        Self {
            name,
            signature: sig,
            jump_tables: PrimaryMap::new(),
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
        }
    }

    /// Create a new empty, anonymous function.
    pub fn new() -> Self {
        Self::with_name_signature(ExternalName::default(), Signature::new())
    }

    /// Clear all data structures in this function, keeping allocations.
    pub fn clear(&mut self) {
        self.name = ExternalName::default();
        self.signature.clear();
        self.jump_tables.clear();
        self.dfg.clear();
        self.layout.clear();
    }

    /// Create a jump table in the preamble, to be used by `br_table`
    /// instructions.
    pub fn create_jump_table(&mut self, data: JumpTableData) -> JumpTable {
        self.jump_tables.push(data)
    }

    /// Add a signature which can later be used to declare an external
    /// function import.
    pub fn import_signature(&mut self, signature: Signature) -> SigRef {
        self.dfg.signatures.push(signature)
    }

    /// Declare an external function import.
    pub fn import_function(&mut self, data: ExtFuncData) -> FuncRef {
        self.dfg.ext_funcs.push(data)
    }

    /// A displayable object for this function, printing the stable textual
    /// form.
    pub fn display(&self) -> DisplayFunction<'_> {
        DisplayFunction(self)
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper type capable of displaying a `Function`.
pub struct DisplayFunction<'a>(&'a Function);

impl fmt::Display for DisplayFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_function(f, self.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_function(f, self)
    }
}
