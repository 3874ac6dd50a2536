//! Jump table representation.

use crate::entities::Block;
use core::fmt;

/// Contents of a jump table used by `br_table`.
///
/// The index operand selects `table[index]`, or `default` when it is out of
/// range. Targets carry no block arguments; a frontend that needs to pass
/// values through a table branch routes each edge through a trampoline
/// block holding a plain `jump`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct JumpTableData {
    /// The default target, taken when the index is out of range.
    pub default: Block,
    /// The indexed targets.
    pub table: Vec<Block>,
}

impl JumpTableData {
    /// Create a jump table with the given default target and no entries.
    pub fn new(default: Block) -> Self {
        Self {
            default,
            table: Vec::new(),
        }
    }

    /// Append an indexed target.
    pub fn push_entry(&mut self, block: Block) {
        self.table.push(block);
    }

    /// Iterate over the default target followed by the indexed targets.
    pub fn all_targets(&self) -> impl Iterator<Item = Block> + '_ {
        core::iter::once(self.default).chain(self.table.iter().copied())
    }
}

impl fmt::Display for JumpTableData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "jump_table [")?;
        for (i, b) in self.table.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{b}")?;
        }
        write!(f, "], default {}", self.default)
    }
}
