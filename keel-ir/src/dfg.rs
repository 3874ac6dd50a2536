//! Data flow graph tracking instructions, values and blocks.

use crate::entities::{Block, FuncRef, Inst, SigRef, Value};
use crate::extfunc::{ExtFuncData, Signature};
use crate::instructions::{InstructionData, Opcode};
use crate::types::Type;
use cranelift_entity::{PrimaryMap, SecondaryMap};

/// Where a value comes from.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValueDef {
    /// Result number `n` of an instruction.
    Result(Inst, usize),
    /// Parameter number `n` of a block.
    Param(Block, usize),
}

#[derive(Clone, Debug)]
enum ValueData {
    Inst { ty: Type, num: u16, inst: Inst },
    Param { ty: Type, num: u16, block: Block },
    /// A value that has been rewritten to be the same as another; created
    /// when SSA construction removes a redundant block parameter.
    Alias { ty: Type, original: Value },
}

#[derive(Clone, Default)]
struct BlockData {
    params: Vec<Value>,
}

/// A data flow graph defines all instructions and basic blocks in a
/// function as well as the values defined by them.
///
/// Instruction and value orderings are insertion orderings, so the
/// numbering (and therefore the textual form of a function) is a
/// deterministic product of the construction sequence.
#[derive(Clone, Default)]
pub struct DataFlowGraph {
    insts: PrimaryMap<Inst, InstructionData>,
    results: SecondaryMap<Inst, Vec<Value>>,
    values: PrimaryMap<Value, ValueData>,
    blocks: PrimaryMap<Block, BlockData>,

    /// Signatures referenced by `call_indirect` instructions and external
    /// function declarations.
    pub signatures: PrimaryMap<SigRef, Signature>,

    /// External functions referenced by `call` instructions.
    pub ext_funcs: PrimaryMap<FuncRef, ExtFuncData>,
}

impl DataFlowGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything, keeping allocations for reuse.
    pub fn clear(&mut self) {
        self.insts.clear();
        self.results.clear();
        self.values.clear();
        self.blocks.clear();
        self.signatures.clear();
        self.ext_funcs.clear();
    }

    /// The number of blocks created.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The number of instructions created.
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Create a new basic block with no parameters.
    pub fn make_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    /// The parameters of `block`, in order.
    pub fn block_params(&self, block: Block) -> &[Value] {
        &self.blocks[block].params
    }

    /// Append a typed parameter to `block` and return its value.
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let num = self.blocks[block].params.len();
        debug_assert!(num <= u16::MAX as usize, "too many parameters on {block}");
        let val = self.values.push(ValueData::Param {
            ty,
            num: num as u16,
            block,
        });
        self.blocks[block].params.push(val);
        val
    }

    /// Remove `val` from its block's parameter list and renumber the
    /// remaining parameters. The value itself stays allocated; the caller
    /// is expected to turn it into an alias.
    pub fn remove_block_param(&mut self, val: Value) {
        let (block, num) = match self.values[val] {
            ValueData::Param { block, num, .. } => (block, num as usize),
            _ => panic!("{val} is not a block parameter"),
        };
        self.blocks[block].params.remove(num);
        for &later in &self.blocks[block].params[num..] {
            match &mut self.values[later] {
                ValueData::Param { num, .. } => *num -= 1,
                _ => panic!("{later} is not a block parameter"),
            }
        }
    }

    /// Turn `dest` into an alias of `src`. Existing uses of `dest` resolve
    /// to `src` through `resolve_aliases`.
    pub fn change_to_alias(&mut self, dest: Value, src: Value) {
        debug_assert_ne!(dest, src, "cannot alias a value to itself");
        let ty = self.value_type(dest);
        debug_assert_eq!(ty, self.value_type(src), "alias type mismatch");
        // Collapse chains so lookups stay O(1).
        let original = self.resolve_aliases(src);
        self.values[dest] = ValueData::Alias { ty, original };
    }

    /// Resolve an alias chain to the original value.
    pub fn resolve_aliases(&self, val: Value) -> Value {
        let mut v = val;
        let mut steps = 0;
        while let ValueData::Alias { original, .. } = self.values[v] {
            v = original;
            steps += 1;
            debug_assert!(steps <= self.values.len(), "alias cycle through {val}");
        }
        v
    }

    /// The type of a value.
    pub fn value_type(&self, val: Value) -> Type {
        match self.values[val] {
            ValueData::Inst { ty, .. }
            | ValueData::Param { ty, .. }
            | ValueData::Alias { ty, .. } => ty,
        }
    }

    /// Where a (non-alias) value is defined.
    pub fn value_def(&self, val: Value) -> ValueDef {
        match self.values[self.resolve_aliases(val)] {
            ValueData::Inst { inst, num, .. } => ValueDef::Result(inst, num as usize),
            ValueData::Param { block, num, .. } => ValueDef::Param(block, num as usize),
            ValueData::Alias { .. } => unreachable!(),
        }
    }

    /// Create an instruction from `data`. It has no results until
    /// `make_inst_results` is called and is not inserted anywhere until the
    /// layout places it.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        self.insts.push(data)
    }

    /// The contents of an instruction.
    pub fn inst_data(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    /// All value operands of `inst`.
    pub fn inst_args(&self, inst: Inst) -> &[Value] {
        self.insts[inst].arguments()
    }

    /// Append a destination argument to a branch instruction.
    pub fn append_branch_argument(&mut self, inst: Inst, val: Value) {
        self.insts[inst].append_branch_argument(val);
    }

    /// Allocate result values for `inst`, returning how many were created.
    ///
    /// `ctrl_ty` is the controlling type: the result type of constants,
    /// loads and conversions. Calls take their result types from their
    /// signature and ignore it.
    pub fn make_inst_results(&mut self, inst: Inst, ctrl_ty: Type) -> usize {
        debug_assert!(self.results[inst].is_empty(), "{inst} already has results");
        let types = self.result_types(inst, ctrl_ty);
        let num = types.len();
        for (i, ty) in types.into_iter().enumerate() {
            let val = self.values.push(ValueData::Inst {
                ty,
                num: i as u16,
                inst,
            });
            self.results[inst].push(val);
        }
        num
    }

    fn result_types(&self, inst: Inst, ctrl_ty: Type) -> Vec<Type> {
        let data = &self.insts[inst];
        match data.opcode() {
            Opcode::Store
            | Opcode::Istore8
            | Opcode::Istore16
            | Opcode::Istore32
            | Opcode::Jump
            | Opcode::Brz
            | Opcode::Brnz
            | Opcode::BrTable
            | Opcode::Return
            | Opcode::Exit
            | Opcode::ExitIfTrue => vec![],
            Opcode::Icmp | Opcode::Fcmp => vec![Type::I32],
            Opcode::Call => {
                let sig = self.ext_funcs[match data {
                    InstructionData::Call { func_ref, .. } => *func_ref,
                    _ => panic!("bad format for call"),
                }]
                .signature;
                self.signatures[sig]
                    .returns
                    .iter()
                    .map(|p| p.value_type)
                    .collect()
            }
            Opcode::CallIndirect => {
                let sig = match data {
                    InstructionData::CallIndirect { sig_ref, .. } => *sig_ref,
                    _ => panic!("bad format for call_indirect"),
                };
                self.signatures[sig]
                    .returns
                    .iter()
                    .map(|p| p.value_type)
                    .collect()
            }
            _ => vec![ctrl_ty],
        }
    }

    /// The result values of an instruction.
    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        &self.results[inst]
    }

    /// The first result of an instruction that has at least one.
    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst][0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immediates::Imm64;

    #[test]
    fn results_and_params() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let p0 = dfg.append_block_param(block, Type::I32);
        let p1 = dfg.append_block_param(block, Type::I64);
        assert_eq!(dfg.block_params(block), &[p0, p1]);
        assert_eq!(dfg.value_def(p1), ValueDef::Param(block, 1));

        let inst = dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: Imm64::new(5),
        });
        assert_eq!(dfg.make_inst_results(inst, Type::I32), 1);
        let v = dfg.first_result(inst);
        assert_eq!(dfg.value_type(v), Type::I32);
        assert_eq!(dfg.value_def(v), ValueDef::Result(inst, 0));
    }

    #[test]
    fn param_removal_renumbers() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let p0 = dfg.append_block_param(block, Type::I32);
        let p1 = dfg.append_block_param(block, Type::I32);
        let p2 = dfg.append_block_param(block, Type::I32);
        dfg.remove_block_param(p1);
        dfg.change_to_alias(p1, p0);
        assert_eq!(dfg.block_params(block), &[p0, p2]);
        assert_eq!(dfg.value_def(p2), ValueDef::Param(block, 1));
        assert_eq!(dfg.resolve_aliases(p1), p0);
    }

    #[test]
    fn alias_chains_collapse() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let a = dfg.append_block_param(block, Type::I32);
        let b = dfg.append_block_param(block, Type::I32);
        let c = dfg.append_block_param(block, Type::I32);
        dfg.change_to_alias(b, a);
        dfg.change_to_alias(c, b);
        assert_eq!(dfg.resolve_aliases(c), a);
    }
}
