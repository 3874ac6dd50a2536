//! On-the-fly SSA construction.
//!
//! This module provides the `SSABuilder` that the `FunctionBuilder` uses to
//! resolve `use_var` calls to SSA values, following Braun et al., "Simple
//! and Efficient Construction of Static Single Assignment Form".
//!
//! The terminology distinguishes two granularities:
//!
//! - an `ir::Block` is an *extended* block: conditional branches
//!   (`brz`/`brnz`) may appear in its middle, with control falling through;
//! - an `SsaBlock` is a true basic block. Each `ir::Block` starts with a
//!   header `SsaBlock`, and every conditional branch inside it opens a new
//!   body `SsaBlock` whose single predecessor is the block before the
//!   branch.
//!
//! Variable definitions are recorded per `SsaBlock`. A use that is not
//! satisfied locally walks single-predecessor chains; at a header whose
//! predecessor set is final ("sealed") and has several predecessors, a
//! block parameter is appended and an argument is added to every
//! predecessor branch. At an unsealed header a provisional parameter is
//! recorded and completed when `seal_block` declares the predecessor set
//! final. Provisional or completed parameters that turn out to take a
//! single distinct value are removed again and aliased to that value, so
//! straight-line code never pays for the machinery.

use crate::variable::Variable;
use cranelift_entity::packed_option::PackedOption;
use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use keel_ir as ir;
use keel_ir::{InstructionData, Opcode};
use std::mem;

/// An opaque reference to a basic block used during SSA construction.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SsaBlock(u32);
entity_impl!(SsaBlock, "ssa");

enum SsaBlockData {
    /// A basic block opened inside an `ir::Block` by a conditional branch.
    Body { predecessor: SsaBlock },
    /// The basic block at the top of an `ir::Block`.
    Header(HeaderData),
}

struct HeaderData {
    block: ir::Block,
    sealed: bool,
    predecessors: Vec<(SsaBlock, ir::Inst)>,
    /// Provisional block parameters created by `use_var` before sealing,
    /// completed in `seal_block`.
    undef_variables: Vec<(Variable, ir::Value)>,
}

/// Bookkeeping the `FunctionBuilder` must act on after an SSA operation:
/// blocks that received materialized default values.
#[derive(Default)]
pub struct SideEffects {
    /// Blocks that had instructions inserted into them and are therefore no
    /// longer pristine.
    pub instructions_added_to_blocks: Vec<ir::Block>,
}

impl SideEffects {
    fn is_empty(&self) -> bool {
        self.instructions_added_to_blocks.is_empty()
    }
}

/// `SSABuilder` computes, for each variable use, the SSA value that reaches
/// it, inserting block parameters as needed.
pub struct SSABuilder {
    /// Records the current definition of each variable in each basic block.
    variables: SecondaryMap<Variable, SecondaryMap<SsaBlock, PackedOption<ir::Value>>>,
    ssa_blocks: PrimaryMap<SsaBlock, SsaBlockData>,
    /// The header basic block of each `ir::Block`.
    headers: SecondaryMap<ir::Block, PackedOption<SsaBlock>>,
}

impl SSABuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self {
            variables: SecondaryMap::new(),
            ssa_blocks: PrimaryMap::new(),
            headers: SecondaryMap::new(),
        }
    }

    /// Clear the builder for reuse, keeping allocations.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.ssa_blocks.clear();
        self.headers.clear();
    }

    /// Is the builder in the cleared state?
    pub fn is_empty(&self) -> bool {
        self.ssa_blocks.is_empty()
    }

    /// Declare the header basic block of a newly created `ir::Block`.
    pub fn declare_block_header_block(&mut self, block: ir::Block) {
        debug_assert!(self.headers[block].is_none(), "{block} declared twice");
        let ssa = self.ssa_blocks.push(SsaBlockData::Header(HeaderData {
            block,
            sealed: false,
            predecessors: Vec::new(),
            undef_variables: Vec::new(),
        }));
        self.headers[block] = ssa.into();
    }

    /// Declare a body basic block following a conditional branch in
    /// `predecessor`'s block, and return it.
    pub fn declare_body_block(&mut self, predecessor: SsaBlock) -> SsaBlock {
        self.ssa_blocks.push(SsaBlockData::Body { predecessor })
    }

    /// The header basic block of `block`.
    pub fn header_block(&self, block: ir::Block) -> SsaBlock {
        self.headers[block].expand().expect("undeclared block")
    }

    /// Record that `inst` in basic block `pred` branches to `block`.
    pub fn declare_block_predecessor(&mut self, block: ir::Block, pred: SsaBlock, inst: ir::Inst) {
        let header = self.header_block(block);
        match &mut self.ssa_blocks[header] {
            SsaBlockData::Header(data) => {
                debug_assert!(!data.sealed, "predecessor added to sealed {block}");
                data.predecessors.push((pred, inst));
            }
            SsaBlockData::Body { .. } => unreachable!(),
        }
    }

    /// Does `block` have any declared predecessors?
    pub fn has_any_predecessors(&self, block: ir::Block) -> bool {
        match &self.ssa_blocks[self.header_block(block)] {
            SsaBlockData::Header(data) => !data.predecessors.is_empty(),
            SsaBlockData::Body { .. } => unreachable!(),
        }
    }

    /// Has `block` been sealed?
    pub fn is_sealed(&self, block: ir::Block) -> bool {
        match &self.ssa_blocks[self.header_block(block)] {
            SsaBlockData::Header(data) => data.sealed,
            SsaBlockData::Body { .. } => unreachable!(),
        }
    }

    /// Record a definition of `var` in `block`.
    pub fn def_var(&mut self, var: Variable, val: ir::Value, block: SsaBlock) {
        self.variables[var][block] = val.into();
    }

    /// Resolve the value of `var` visible from `block`, creating block
    /// parameters where control-flow merges require them.
    pub fn use_var(
        &mut self,
        func: &mut ir::Function,
        var: Variable,
        ty: ir::Type,
        block: SsaBlock,
    ) -> (ir::Value, SideEffects) {
        let mut effects = SideEffects::default();
        let val = self.use_var_rec(func, var, ty, block, &mut effects);
        (val, effects)
    }

    /// Like `use_var`, but only walks the current basic block and its
    /// single-predecessor chain of sealed blocks; never creates block
    /// parameters. Returns `None` when no definition is found on that
    /// path. Frontends use this to probe caches that must be reloaded
    /// rather than merged at join points.
    pub fn find_value_in_linear_path(&self, var: Variable, block: SsaBlock) -> Option<ir::Value> {
        let mut current = block;
        loop {
            if let Some(val) = self.variables[var][current].expand() {
                return Some(val);
            }
            current = match &self.ssa_blocks[current] {
                SsaBlockData::Body { predecessor } => *predecessor,
                SsaBlockData::Header(data) if data.sealed && data.predecessors.len() == 1 => {
                    data.predecessors[0].0
                }
                SsaBlockData::Header(_) => return None,
            };
        }
    }

    /// Declare that `block`'s predecessor set is final, completing any
    /// provisional block parameters recorded for it.
    pub fn seal_block(&mut self, block: ir::Block, func: &mut ir::Function) -> SideEffects {
        let header = self.header_block(block);
        let undefs = match &mut self.ssa_blocks[header] {
            SsaBlockData::Header(data) => {
                debug_assert!(!data.sealed, "{block} sealed twice");
                data.sealed = true;
                mem::take(&mut data.undef_variables)
            }
            SsaBlockData::Body { .. } => unreachable!(),
        };
        let mut effects = SideEffects::default();
        for (var, temp) in undefs {
            let ty = func.dfg.value_type(temp);
            self.resolve_param(func, var, ty, temp, header, &mut effects);
        }
        effects
    }

    fn use_var_rec(
        &mut self,
        func: &mut ir::Function,
        var: Variable,
        ty: ir::Type,
        block: SsaBlock,
        effects: &mut SideEffects,
    ) -> ir::Value {
        if let Some(val) = self.variables[var][block].expand() {
            return val;
        }
        enum Path {
            Through(SsaBlock),
            Unsealed(ir::Block),
            SealedMerge(ir::Block),
            NoPredecessor(ir::Block),
        }
        let path = match &self.ssa_blocks[block] {
            SsaBlockData::Body { predecessor } => Path::Through(*predecessor),
            SsaBlockData::Header(data) => {
                if !data.sealed {
                    Path::Unsealed(data.block)
                } else {
                    match data.predecessors.len() {
                        0 => Path::NoPredecessor(data.block),
                        1 => Path::Through(data.predecessors[0].0),
                        _ => Path::SealedMerge(data.block),
                    }
                }
            }
        };
        let val = match path {
            Path::Through(pred) => self.use_var_rec(func, var, ty, pred, effects),
            Path::Unsealed(ir_block) => {
                let val = func.dfg.append_block_param(ir_block, ty);
                let header = self.header_block(ir_block);
                match &mut self.ssa_blocks[header] {
                    SsaBlockData::Header(data) => data.undef_variables.push((var, val)),
                    SsaBlockData::Body { .. } => unreachable!(),
                }
                val
            }
            Path::NoPredecessor(ir_block) => self.materialize_default(func, ty, ir_block, effects),
            Path::SealedMerge(ir_block) => {
                let temp = func.dfg.append_block_param(ir_block, ty);
                // Record the provisional value first so that uses reached
                // through a cycle resolve to it instead of recursing
                // forever.
                self.def_var(var, temp, block);
                self.resolve_param(func, var, ty, temp, block, effects)
            }
        };
        self.def_var(var, val, block);
        val
    }

    /// Complete the provisional parameter `temp` of the header `block` by
    /// looking the variable up in every predecessor. A parameter that would
    /// take a single distinct value is removed and aliased to it.
    fn resolve_param(
        &mut self,
        func: &mut ir::Function,
        var: Variable,
        ty: ir::Type,
        temp: ir::Value,
        block: SsaBlock,
        effects: &mut SideEffects,
    ) -> ir::Value {
        let (ir_block, preds) = match &self.ssa_blocks[block] {
            SsaBlockData::Header(data) => (data.block, data.predecessors.clone()),
            SsaBlockData::Body { .. } => unreachable!(),
        };

        let mut pred_values = Vec::with_capacity(preds.len());
        for &(pred, _) in &preds {
            pred_values.push(self.use_var_rec(func, var, ty, pred, effects));
        }

        // The parameter is redundant if every predecessor passes the same
        // value (uses reaching `temp` through a back edge don't count).
        let mut unique = None;
        let mut redundant = true;
        for &val in &pred_values {
            let val = func.dfg.resolve_aliases(val);
            if val == temp {
                continue;
            }
            match unique {
                None => unique = Some(val),
                Some(seen) if seen == val => {}
                Some(_) => {
                    redundant = false;
                    break;
                }
            }
        }

        if redundant {
            func.dfg.remove_block_param(temp);
            let val = match unique {
                Some(val) => val,
                // No definition reaches this block at all.
                None => self.materialize_default(func, ty, ir_block, effects),
            };
            func.dfg.change_to_alias(temp, val);
            self.def_var(var, val, block);
            val
        } else {
            for (&(_, branch), val) in preds.iter().zip(pred_values) {
                func.dfg.append_branch_argument(branch, val);
            }
            temp
        }
    }

    /// Materialize a zero value for a variable that is read before any
    /// definition, at the top of `block` so it dominates all uses.
    fn materialize_default(
        &mut self,
        func: &mut ir::Function,
        ty: ir::Type,
        block: ir::Block,
        effects: &mut SideEffects,
    ) -> ir::Value {
        log::warn!("variable of type {ty} read before definition; zero-filling in {block}");
        let data = match ty {
            ir::Type::I32 | ir::Type::I64 => InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm: ir::Imm64::new(0),
            },
            ir::Type::F32 => InstructionData::UnaryIeee32 {
                opcode: Opcode::F32const,
                imm: ir::Ieee32::with_bits(0),
            },
            ir::Type::F64 => InstructionData::UnaryIeee64 {
                opcode: Opcode::F64const,
                imm: ir::Ieee64::with_bits(0),
            },
            ir::Type::V128 => panic!("cannot zero-fill a v128 variable"),
        };
        let inst = func.dfg.make_inst(data);
        func.dfg.make_inst_results(inst, ty);
        if !func.layout.is_block_inserted(block) {
            func.layout.append_block(block);
        }
        func.layout.prepend_inst(inst, block);
        effects.instructions_added_to_blocks.push(block);
        func.dfg.first_result(inst)
    }
}

impl Default for SSABuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_ir::{Function, Type};

    fn setup() -> (Function, SSABuilder) {
        (Function::new(), SSABuilder::new())
    }

    fn jump(func: &mut Function, from: ir::Block, to: ir::Block) -> ir::Inst {
        let inst = func.dfg.make_inst(InstructionData::Jump {
            opcode: Opcode::Jump,
            destination: to,
            args: Vec::new(),
        });
        if !func.layout.is_block_inserted(from) {
            func.layout.append_block(from);
        }
        func.layout.append_inst(inst, from);
        inst
    }

    #[test]
    fn straight_line_lookup() {
        let (mut func, mut ssa) = setup();
        let block0 = func.dfg.make_block();
        ssa.declare_block_header_block(block0);
        let h0 = ssa.header_block(block0);
        ssa.seal_block(block0, &mut func);

        let x = Variable::with_u32(0);
        let val = func.dfg.append_block_param(block0, Type::I32);
        ssa.def_var(x, val, h0);
        let (found, effects) = ssa.use_var(&mut func, x, Type::I32, h0);
        assert_eq!(found, val);
        assert!(effects.is_empty());
        assert_eq!(ssa.find_value_in_linear_path(x, h0), Some(val));
    }

    #[test]
    fn diamond_same_value_is_redundant() {
        // block0 defines x, branches to block1 and block2, both jump to
        // block3. Reading x in block3 must not create a parameter.
        let (mut func, mut ssa) = setup();
        let blocks: Vec<ir::Block> = (0..4).map(|_| func.dfg.make_block()).collect();
        for &b in &blocks {
            ssa.declare_block_header_block(b);
        }
        let x = Variable::with_u32(0);
        let def = func.dfg.append_block_param(blocks[0], Type::I32);
        ssa.seal_block(blocks[0], &mut func);
        let h0 = ssa.header_block(blocks[0]);
        ssa.def_var(x, def, h0);

        for &mid in &blocks[1..3] {
            let inst = jump(&mut func, blocks[0], mid);
            ssa.declare_block_predecessor(mid, h0, inst);
            ssa.seal_block(mid, &mut func);
            let hm = ssa.header_block(mid);
            let inst = jump(&mut func, mid, blocks[3]);
            ssa.declare_block_predecessor(blocks[3], hm, inst);
        }
        ssa.seal_block(blocks[3], &mut func);

        let h3 = ssa.header_block(blocks[3]);
        let (found, _) = ssa.use_var(&mut func, x, Type::I32, h3);
        assert_eq!(func.dfg.resolve_aliases(found), def);
        assert!(func.dfg.block_params(blocks[3]).is_empty());
    }

    #[test]
    fn loop_with_redefinition_creates_param() {
        // block0 -> block1 (header) -> block1 (back edge), with x redefined
        // in the loop body: the header needs a parameter and the back edge
        // must carry the redefined value.
        let (mut func, mut ssa) = setup();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        ssa.declare_block_header_block(block0);
        ssa.declare_block_header_block(block1);
        ssa.seal_block(block0, &mut func);
        let h0 = ssa.header_block(block0);
        let h1 = ssa.header_block(block1);

        let x = Variable::with_u32(0);
        let init = func.dfg.append_block_param(block0, Type::I32);
        ssa.def_var(x, init, h0);
        let entry_jump = jump(&mut func, block0, block1);
        ssa.declare_block_predecessor(block1, h0, entry_jump);

        // Inside the unsealed header, read then redefine x.
        let (inside, _) = ssa.use_var(&mut func, x, Type::I32, h1);
        assert_eq!(func.dfg.block_params(block1), &[inside]);
        let redefined = {
            let inst = func.dfg.make_inst(InstructionData::Binary {
                opcode: Opcode::Iadd,
                args: [inside, inside],
            });
            func.dfg.make_inst_results(inst, Type::I32);
            func.layout.append_block(block1);
            func.layout.append_inst(inst, block1);
            func.dfg.first_result(inst)
        };
        ssa.def_var(x, redefined, h1);
        let back_edge = {
            let inst = func.dfg.make_inst(InstructionData::Jump {
                opcode: Opcode::Jump,
                destination: block1,
                args: Vec::new(),
            });
            func.layout.append_inst(inst, block1);
            inst
        };
        ssa.declare_block_predecessor(block1, h1, back_edge);
        ssa.seal_block(block1, &mut func);

        // The provisional parameter survives and both predecessors carry
        // arguments: the initial value and the redefinition.
        assert_eq!(func.dfg.block_params(block1), &[inside]);
        assert_eq!(func.dfg.inst_data(entry_jump).branch_arguments(), &[init]);
        assert_eq!(
            func.dfg.inst_data(back_edge).branch_arguments(),
            &[redefined]
        );
    }

    #[test]
    fn loop_without_redefinition_removes_param() {
        let (mut func, mut ssa) = setup();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        ssa.declare_block_header_block(block0);
        ssa.declare_block_header_block(block1);
        ssa.seal_block(block0, &mut func);
        let h0 = ssa.header_block(block0);
        let h1 = ssa.header_block(block1);

        let x = Variable::with_u32(0);
        let init = func.dfg.append_block_param(block0, Type::I32);
        ssa.def_var(x, init, h0);
        let entry_jump = jump(&mut func, block0, block1);
        ssa.declare_block_predecessor(block1, h0, entry_jump);

        let (inside, _) = ssa.use_var(&mut func, x, Type::I32, h1);
        let back_edge = jump(&mut func, block1, block1);
        ssa.declare_block_predecessor(block1, h1, back_edge);
        ssa.seal_block(block1, &mut func);

        // x is loop-invariant: the provisional parameter collapses to the
        // initial definition.
        assert!(func.dfg.block_params(block1).is_empty());
        assert_eq!(func.dfg.resolve_aliases(inside), init);
        assert_eq!(func.dfg.inst_data(entry_jump).branch_arguments(), &[]);
    }

    #[test]
    fn linear_path_stops_at_merges() {
        let (mut func, mut ssa) = setup();
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        ssa.declare_block_header_block(block0);
        ssa.declare_block_header_block(block1);
        ssa.seal_block(block0, &mut func);
        let h0 = ssa.header_block(block0);
        let h1 = ssa.header_block(block1);

        let x = Variable::with_u32(0);
        let def = func.dfg.append_block_param(block0, Type::I64);
        ssa.def_var(x, def, h0);

        // Unsealed: the probe must refuse to look through.
        let inst = jump(&mut func, block0, block1);
        ssa.declare_block_predecessor(block1, h0, inst);
        assert_eq!(ssa.find_value_in_linear_path(x, h1), None);

        // Sealed with a single predecessor: the probe sees the definition.
        ssa.seal_block(block1, &mut func);
        assert_eq!(ssa.find_value_in_linear_path(x, h1), Some(def));
    }
}
