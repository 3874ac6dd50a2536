//! Translation state: the value stack and the control stack.

use crate::environ::FuncEnvironment;
use crate::translation_utils::{FuncIndex, TypeIndex};
use cranelift_entity::EntityRef;
use keel_ir as ir;
use keel_ir::{ExtFuncData, ExternalName, FuncRef, SigRef, Value};
use smallvec::SmallVec;
use std::collections::HashMap;

/// A control-flow structure currently being translated.
///
/// One frame is pushed when a `block`, `loop` or `if` opens (plus one
/// `Function` frame for the whole body) and popped at the matching `end`.
/// `following` is the block that receives control after the structure; its
/// parameters are the structure's result types. A loop's `header` receives
/// control at each iteration; its parameters are the loop's parameter
/// types.
#[derive(Debug)]
pub enum ControlStackFrame {
    /// The frame enclosing the whole function body; `following` is the
    /// return block.
    Function {
        /// The return block; its parameters are the function results.
        following: ir::Block,
        /// Number of function results.
        num_results: usize,
        /// Value-stack height when the frame was pushed.
        original_stack_size: usize,
    },
    /// A `block`.
    Block {
        /// Merge block after the structure.
        following: ir::Block,
        /// Number of block parameters.
        num_params: usize,
        /// Number of block results.
        num_results: usize,
        /// Value-stack height when the frame was pushed, not counting the
        /// parameters.
        original_stack_size: usize,
    },
    /// A `loop`.
    Loop {
        /// The loop header block; branch target of the loop's label.
        header: ir::Block,
        /// Merge block after the structure.
        following: ir::Block,
        /// Number of block parameters.
        num_params: usize,
        /// Number of block results.
        num_results: usize,
        /// Value-stack height when the frame was pushed, not counting the
        /// parameters.
        original_stack_size: usize,
    },
    /// An `if`, with or (not yet) without its `else`.
    If {
        /// The block translating the `else` arm; created eagerly so the
        /// conditional branch at the `if` has its target up front.
        else_block: ir::Block,
        /// Merge block after the structure.
        following: ir::Block,
        /// Snapshot of the parameter values at the `if`, replayed when
        /// entering the `else` arm (and at a synthesized empty `else`).
        cloned_args: SmallVec<[Value; 4]>,
        /// Has the `else` opcode been seen?
        has_else: bool,
        /// Number of block parameters.
        num_params: usize,
        /// Number of block results.
        num_results: usize,
        /// Value-stack height when the frame was pushed, not counting the
        /// parameters (the condition is already popped).
        original_stack_size: usize,
    },
}

impl ControlStackFrame {
    /// The block receiving control after the structure.
    pub fn following_code(&self) -> ir::Block {
        match *self {
            Self::Function { following, .. }
            | Self::Block { following, .. }
            | Self::Loop { following, .. }
            | Self::If { following, .. } => following,
        }
    }

    /// The target of a branch to this frame's label: the header for a
    /// loop, the following block otherwise.
    pub fn br_destination(&self) -> ir::Block {
        match *self {
            Self::Loop { header, .. } => header,
            _ => self.following_code(),
        }
    }

    /// How many values a branch to this frame's label carries: the
    /// parameter count for a loop, the result count otherwise.
    pub fn num_br_args(&self) -> usize {
        match *self {
            Self::Loop { num_params, .. } => num_params,
            _ => self.num_return_values(),
        }
    }

    /// The number of result values of the structure.
    pub fn num_return_values(&self) -> usize {
        match *self {
            Self::Function { num_results, .. }
            | Self::Block { num_results, .. }
            | Self::Loop { num_results, .. }
            | Self::If { num_results, .. } => num_results,
        }
    }

    /// The value-stack height to restore when the structure ends.
    pub fn original_stack_size(&self) -> usize {
        match *self {
            Self::Function {
                original_stack_size,
                ..
            }
            | Self::Block {
                original_stack_size,
                ..
            }
            | Self::Loop {
                original_stack_size,
                ..
            }
            | Self::If {
                original_stack_size,
                ..
            } => original_stack_size,
        }
    }

    /// Is this a loop frame?
    pub fn is_loop(&self) -> bool {
        matches!(self, Self::Loop { .. })
    }
}

/// Contains information passed along during the translation and all the
/// hooks required to translate the environment-dependent instructions.
pub struct TranslationState {
    /// The value stack, mirroring the Wasm operand stack.
    pub stack: Vec<Value>,
    /// The open control-flow structures, innermost last.
    pub control_stack: Vec<ControlStackFrame>,
    /// Is the current program point reachable?
    pub reachable: bool,
    /// Number of control structures opened while unreachable; their `end`s
    /// must not pop real frames.
    pub unreachable_depth: u32,

    // Memoized function-preamble entities, keyed by module indices.
    functions: HashMap<u32, (FuncRef, usize)>,
    signatures: HashMap<u32, (SigRef, usize)>,
}

impl TranslationState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            control_stack: Vec::new(),
            reachable: true,
            unreachable_depth: 0,
            functions: HashMap::new(),
            signatures: HashMap::new(),
        }
    }

    fn clear(&mut self) {
        self.stack.clear();
        self.control_stack.clear();
        self.reachable = true;
        self.unreachable_depth = 0;
        self.functions.clear();
        self.signatures.clear();
    }

    /// Initialize the state for a new function, pushing the `Function`
    /// frame whose following block is the return block.
    pub fn initialize(&mut self, sig: &ir::Signature, return_block: ir::Block) {
        self.clear();
        self.control_stack.push(ControlStackFrame::Function {
            following: return_block,
            num_results: sig.returns.len(),
            original_stack_size: 0,
        });
    }

    /// Push a value.
    pub fn push1(&mut self, val: Value) {
        self.stack.push(val);
    }

    /// Push multiple values.
    pub fn pushn(&mut self, vals: &[Value]) {
        self.stack.extend_from_slice(vals);
    }

    /// Pop one value.
    pub fn pop1(&mut self) -> Value {
        self.stack.pop().expect("empty value stack")
    }

    /// Peek at the value on top of the stack without popping it.
    pub fn peek1(&self) -> Value {
        *self.stack.last().expect("empty value stack")
    }

    /// Pop two values, returned in push order.
    pub fn pop2(&mut self) -> (Value, Value) {
        let v2 = self.pop1();
        let v1 = self.pop1();
        (v1, v2)
    }

    /// Pop three values, returned in push order.
    pub fn pop3(&mut self) -> (Value, Value, Value) {
        let v3 = self.pop1();
        let v2 = self.pop1();
        let v1 = self.pop1();
        (v1, v2, v3)
    }

    /// Pop the top `n` values.
    pub fn popn(&mut self, n: usize) {
        debug_assert!(self.stack.len() >= n, "value stack underflow");
        let len = self.stack.len();
        self.stack.truncate(len - n);
    }

    /// The top `n` values, without popping them.
    pub fn peekn(&self, n: usize) -> &[Value] {
        debug_assert!(self.stack.len() >= n, "value stack underflow");
        &self.stack[self.stack.len() - n..]
    }

    /// Push a `Block` frame. The top `num_params` values are the block's
    /// parameters and stay on the stack.
    pub fn push_block(&mut self, following: ir::Block, num_params: usize, num_results: usize) {
        debug_assert!(self.stack.len() >= num_params);
        self.control_stack.push(ControlStackFrame::Block {
            following,
            num_params,
            num_results,
            original_stack_size: self.stack.len() - num_params,
        });
    }

    /// Push a `Loop` frame. Call after the loop parameters have been
    /// replaced by the header's block parameters.
    pub fn push_loop(
        &mut self,
        header: ir::Block,
        following: ir::Block,
        num_params: usize,
        num_results: usize,
    ) {
        debug_assert!(self.stack.len() >= num_params);
        self.control_stack.push(ControlStackFrame::Loop {
            header,
            following,
            num_params,
            num_results,
            original_stack_size: self.stack.len() - num_params,
        });
    }

    /// Push an `If` frame; the condition has already been popped.
    pub fn push_if(
        &mut self,
        else_block: ir::Block,
        following: ir::Block,
        cloned_args: SmallVec<[Value; 4]>,
        num_params: usize,
        num_results: usize,
    ) {
        debug_assert!(self.stack.len() >= num_params);
        self.control_stack.push(ControlStackFrame::If {
            else_block,
            following,
            cloned_args,
            has_else: false,
            num_params,
            num_results,
            original_stack_size: self.stack.len() - num_params,
        });
    }

    /// The frame addressed by a branch label, innermost label being 0.
    pub fn frame_at_depth(&self, relative_depth: u32) -> &ControlStackFrame {
        let i = self.control_stack.len() - 1 - relative_depth as usize;
        &self.control_stack[i]
    }

    /// The branch target and argument count of a label, as mandated by the
    /// frame kind.
    pub fn br_target_and_argc(&self, relative_depth: u32) -> (ir::Block, usize) {
        let frame = self.frame_at_depth(relative_depth);
        (frame.br_destination(), frame.num_br_args())
    }

    /// Get the `FuncRef` for the directly-called defined function
    /// `function_index`, declaring it on first use. Returns the reference
    /// and the number of Wasm-level arguments.
    pub fn get_direct_func(
        &mut self,
        func: &mut ir::Function,
        function_index: u32,
        environ: &FuncEnvironment,
    ) -> (FuncRef, usize) {
        if let Some(&cached) = self.functions.get(&function_index) {
            return cached;
        }
        let type_index = environ
            .module()
            .func_type_index(FuncIndex::new(function_index as usize));
        let (signature, num_args) = self.get_indirect_sig(func, type_index.index() as u32, environ);
        let func_ref = func.import_function(ExtFuncData {
            name: ExternalName::user(0, function_index),
            signature,
        });
        self.functions.insert(function_index, (func_ref, num_args));
        (func_ref, num_args)
    }

    /// Get the `SigRef` for module type `type_index`, declaring it on
    /// first use. Returns the reference and the number of Wasm-level
    /// arguments.
    pub fn get_indirect_sig(
        &mut self,
        func: &mut ir::Function,
        type_index: u32,
        environ: &FuncEnvironment,
    ) -> (SigRef, usize) {
        if let Some(&cached) = self.signatures.get(&type_index) {
            return cached;
        }
        let index = TypeIndex::new(type_index as usize);
        let sig_ref = func.import_signature(environ.catalog().signature(index).clone());
        let num_args = environ.catalog().num_wasm_params(index);
        self.signatures.insert(type_index, (sig_ref, num_args));
        (sig_ref, num_args)
    }
}

impl Default for TranslationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    fn vals(n: usize) -> Vec<Value> {
        (0..n).map(Value::new).collect()
    }

    #[test]
    fn stack_discipline() {
        let mut state = TranslationState::new();
        let v = vals(3);
        state.push1(v[0]);
        state.pushn(&v[1..]);
        assert_eq!(state.peekn(2), &v[1..]);
        assert_eq!(state.pop3(), (v[0], v[1], v[2]));
        assert!(state.stack.is_empty());
    }

    #[test]
    fn branch_targets_follow_frame_kind() {
        let mut state = TranslationState::new();
        let header = ir::Block::new(0);
        let after_loop = ir::Block::new(1);
        let after_block = ir::Block::new(2);
        let v = vals(2);

        state.pushn(&v);
        state.push_block(after_block, 0, 1);
        state.push_loop(header, after_loop, 2, 1);

        // Label 0 is the loop: target header, carry the parameters.
        assert_eq!(state.br_target_and_argc(0), (header, 2));
        // Label 1 is the block: target its following code, carry results.
        assert_eq!(state.br_target_and_argc(1), (after_block, 1));

        let frame = state.control_stack.pop().unwrap();
        assert!(frame.is_loop());
        assert_eq!(frame.original_stack_size(), 0);
    }
}
