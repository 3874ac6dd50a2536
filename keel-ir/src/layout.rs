//! Function layout: the order of blocks and of instructions within blocks.
//!
//! The layout is kept separate from the data flow graph: the DFG says what
//! instructions compute, the layout says where they are. Blocks are created
//! in the DFG first and only enter the layout when the first instruction is
//! inserted into them, so blocks that never receive code (e.g. merge points
//! of unreachable control flow) simply never appear.

use crate::entities::{Block, Inst};
use cranelift_entity::SecondaryMap;

#[derive(Clone, Default)]
struct BlockNode {
    inserted: bool,
    insts: Vec<Inst>,
}

/// Block and instruction ordering for a function.
#[derive(Clone, Default)]
pub struct Layout {
    order: Vec<Block>,
    nodes: SecondaryMap<Block, BlockNode>,
}

impl Layout {
    /// Create a new empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the layout, keeping allocations.
    pub fn clear(&mut self) {
        self.order.clear();
        self.nodes.clear();
    }

    /// The entry block, i.e. the first block in the layout.
    pub fn entry_block(&self) -> Option<Block> {
        self.order.first().copied()
    }

    /// Has `block` been appended to the layout?
    pub fn is_block_inserted(&self, block: Block) -> bool {
        self.nodes[block].inserted
    }

    /// Append `block` to the end of the layout.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(!self.nodes[block].inserted, "{block} is already inserted");
        self.nodes[block].inserted = true;
        self.order.push(block);
    }

    /// Append `inst` to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert!(self.nodes[block].inserted, "{block} is not inserted");
        self.nodes[block].insts.push(inst);
    }

    /// Insert `inst` at the front of `block`, before any existing
    /// instructions. Used by SSA construction to materialize a default
    /// value ahead of its uses.
    pub fn prepend_inst(&mut self, inst: Inst, block: Block) {
        debug_assert!(self.nodes[block].inserted, "{block} is not inserted");
        self.nodes[block].insts.insert(0, inst);
    }

    /// The blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.order.iter().copied()
    }

    /// The instructions of `block` in order.
    pub fn block_insts(&self, block: Block) -> &[Inst] {
        &self.nodes[block].insts
    }

    /// The last instruction of `block`, if it has any.
    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.nodes[block].insts.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn ordering() {
        let mut layout = Layout::new();
        let b0 = Block::new(0);
        let b1 = Block::new(1);
        assert_eq!(layout.entry_block(), None);
        layout.append_block(b1);
        layout.append_block(b0);
        assert_eq!(layout.entry_block(), Some(b1));
        assert!(layout.is_block_inserted(b0));

        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);
        layout.append_inst(i0, b1);
        layout.append_inst(i1, b1);
        layout.prepend_inst(i2, b1);
        assert_eq!(layout.block_insts(b1), &[i2, i0, i1]);
        assert_eq!(layout.last_inst(b1), Some(i1));
        assert_eq!(layout.last_inst(b0), None);
    }
}
