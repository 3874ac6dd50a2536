//! A frontend for building keel IR from other languages.

use crate::ssa::{SSABuilder, SideEffects, SsaBlock};
use crate::variable::Variable;
use cranelift_entity::packed_option::PackedOption;
use cranelift_entity::{EntitySet, SecondaryMap};
use keel_ir as ir;
use keel_ir::{
    ExitCode, ExtFuncData, FloatCC, FuncRef, Ieee32, Ieee64, Imm64, InstructionData, IntCC,
    JumpTableData, Opcode, SigRef, Signature, Type, Value,
};

/// Structure used for translating a series of functions into keel IR.
///
/// In order to reduce memory reallocations when compiling multiple
/// functions, `FunctionBuilderContext` holds various data structures which
/// are cleared between functions, rather than dropped, preserving the
/// underlying allocations.
pub struct FunctionBuilderContext {
    ssa: SSABuilder,
    blocks: SecondaryMap<ir::Block, BlockStatus>,
    types: SecondaryMap<Variable, Option<Type>>,
}

/// Temporary object used to build a single keel IR `Function`.
pub struct FunctionBuilder<'a> {
    /// The function currently being built.
    /// This field is public so the function can be re-borrowed.
    pub func: &'a mut ir::Function,

    func_ctx: &'a mut FunctionBuilderContext,
    position: Position,
}

#[derive(Clone, Default)]
struct BlockStatus {
    /// A terminator has been inserted since the last `switch_to_block`.
    filled: bool,
    /// No instructions have been inserted yet.
    pristine: bool,
    /// Parameters appended by the frontend, as opposed to by SSA
    /// construction.
    user_param_count: usize,
}

struct Position {
    block: PackedOption<ir::Block>,
    basic_block: PackedOption<SsaBlock>,
}

impl Position {
    fn at(block: ir::Block, basic_block: SsaBlock) -> Self {
        Self {
            block: block.into(),
            basic_block: basic_block.into(),
        }
    }

    fn default() -> Self {
        Self {
            block: PackedOption::default(),
            basic_block: PackedOption::default(),
        }
    }

    fn is_default(&self) -> bool {
        self.block.is_none() && self.basic_block.is_none()
    }
}

impl FunctionBuilderContext {
    /// Creates a `FunctionBuilderContext` structure. The structure is
    /// automatically cleared after each `FunctionBuilder` completes
    /// translating a function.
    pub fn new() -> Self {
        Self {
            ssa: SSABuilder::new(),
            blocks: SecondaryMap::new(),
            types: SecondaryMap::new(),
        }
    }

    fn clear(&mut self) {
        self.ssa.clear();
        self.blocks.clear();
        self.types.clear();
    }

    fn is_empty(&self) -> bool {
        self.ssa.is_empty()
    }
}

impl Default for FunctionBuilderContext {
    fn default() -> Self {
        Self::new()
    }
}

/// This module allows you to create a function in keel IR in a
/// straightforward way, hiding all the complexity of its internal
/// representation.
///
/// The module is parametrized by one type which is the representation of
/// variables in your origin language. It offers a way to conveniently
/// append instructions to your program flow. You are responsible for
/// splitting your instruction flow into blocks whose properties are:
///
/// - branch and jump instructions can only point at the top of blocks;
/// - the last instruction of each block is a terminator instruction which
///   has no natural successor; terminators can only appear at the end.
///
/// The parameters of keel IR instructions are keel IR values, which can
/// only be created as results of other instructions. To be able to create
/// variables redefined multiple times in your program, use the `def_var`
/// and `use_var` methods, which will maintain the correspondence between
/// your variables and keel IR SSA values.
///
/// The first block for which you call `switch_to_block` is assumed to be
/// the beginning of the function.
///
/// At creation, a `FunctionBuilder` instance borrows an already allocated
/// `Function` which it modifies with the information stored in the mutable
/// borrowed `FunctionBuilderContext`. The function passed in argument
/// should be newly created with `Function::with_name_signature`, whereas
/// the context can be kept as is between two function translations.
///
/// # Errors
///
/// The functions below will panic in debug mode whenever you try to modify
/// the keel IR function in a way that violates the coherence of the code.
/// For instance: switching to a new block when you haven't filled the
/// current one with a terminator instruction, or inserting a return
/// instruction with arguments that don't match the function's signature.
impl<'a> FunctionBuilder<'a> {
    /// Creates a new `FunctionBuilder` structure that will operate on a
    /// `Function` using a `FunctionBuilderContext`.
    pub fn new(func: &'a mut ir::Function, func_ctx: &'a mut FunctionBuilderContext) -> Self {
        debug_assert!(func_ctx.is_empty());
        Self {
            func,
            func_ctx,
            position: Position::default(),
        }
    }

    /// Creates a new block and returns its reference.
    pub fn create_block(&mut self) -> ir::Block {
        let block = self.func.dfg.make_block();
        self.func_ctx.ssa.declare_block_header_block(block);
        self.func_ctx.blocks[block] = BlockStatus {
            filled: false,
            pristine: true,
            user_param_count: 0,
        };
        block
    }

    /// After the call to this function, new instructions will be inserted
    /// into the designated block, in the order they are declared. You must
    /// declare the types of the block arguments you will use here.
    ///
    /// When inserting the terminator instruction (which doesn't have a
    /// fallthrough to its immediate successor), the block will be declared
    /// filled and it will not be possible to append instructions to it.
    pub fn switch_to_block(&mut self, block: ir::Block) {
        // First we check that the previous block has been filled.
        debug_assert!(
            self.position.is_default()
                || self.is_unreachable()
                || self.is_pristine()
                || self.is_filled(),
            "you have to fill your block before switching"
        );
        // We cannot switch to a filled block.
        debug_assert!(
            !self.func_ctx.blocks[block].filled,
            "you cannot switch to a block which is already filled"
        );

        let basic_block = self.func_ctx.ssa.header_block(block);
        // Then we change the cursor position.
        self.position = Position::at(block, basic_block);
    }

    /// Declares that all the predecessors of this block are known.
    ///
    /// Function to call with `block` as soon as the last branch instruction
    /// to `block` has been created. Forgetting to call this method on every
    /// block will cause inconsistencies in the produced functions.
    pub fn seal_block(&mut self, block: ir::Block) {
        let side_effects = self.func_ctx.ssa.seal_block(block, self.func);
        self.handle_ssa_side_effects(side_effects);
    }

    /// In order to use a variable in `use_var`, you need to declare its
    /// type with this method.
    pub fn declare_var(&mut self, var: Variable, ty: Type) {
        self.func_ctx.types[var] = Some(ty);
    }

    /// Returns the keel IR value corresponding to the utilization at the
    /// current program position of a previously defined user variable.
    pub fn use_var(&mut self, var: Variable) -> Value {
        let (val, side_effects) = {
            let ty = self.func_ctx.types[var].unwrap_or_else(|| {
                panic!("variable {var} is used but its type has not been declared")
            });
            self.func_ctx
                .ssa
                .use_var(self.func, var, ty, self.position.basic_block.unwrap())
        };
        self.handle_ssa_side_effects(side_effects);
        val
    }

    /// Registers a new definition of a user variable. The type of the
    /// value must match the type registered for the variable.
    pub fn def_var(&mut self, var: Variable, val: Value) {
        debug_assert_eq!(
            Some(self.func.dfg.value_type(val)),
            self.func_ctx.types[var],
            "declared type of variable {var} doesn't match type of value {val}"
        );
        self.func_ctx
            .ssa
            .def_var(var, val, self.position.basic_block.unwrap());
    }

    /// Looks for a definition of `var` in the current basic block and its
    /// single-predecessor chain of sealed blocks, without creating any
    /// block parameters. Frontends use this to probe values that are cached
    /// on linear paths but must be recomputed rather than merged at control
    /// flow joins.
    pub fn find_value_in_linear_path(&self, var: Variable) -> Option<Value> {
        self.func_ctx
            .ssa
            .find_value_in_linear_path(var, self.position.basic_block.unwrap())
    }

    /// Creates a jump table in the function, to be used by `br_table`
    /// instructions.
    pub fn create_jump_table(&mut self, data: JumpTableData) -> ir::JumpTable {
        self.func.create_jump_table(data)
    }

    /// Adds a signature which can later be used to declare an external
    /// function import.
    pub fn import_signature(&mut self, signature: Signature) -> SigRef {
        self.func.import_signature(signature)
    }

    /// Declare an external function import.
    pub fn import_function(&mut self, data: ExtFuncData) -> FuncRef {
        self.func.import_function(data)
    }

    /// Returns an object with one convenience method per keel IR
    /// instruction that appends to the current block being built.
    pub fn ins<'short>(&'short mut self) -> FuncInstBuilder<'short, 'a> {
        let block = self
            .position
            .block
            .expand()
            .expect("call switch_to_block before inserting instructions");
        FuncInstBuilder::new(self, block)
    }

    /// Make sure that the current block is inserted in the layout.
    pub fn ensure_inserted_block(&mut self) {
        let block = self.position.block.unwrap();
        if self.func_ctx.blocks[block].pristine {
            if !self.func.layout.is_block_inserted(block) {
                self.func.layout.append_block(block);
            }
            self.func_ctx.blocks[block].pristine = false;
        } else {
            debug_assert!(
                !self.func_ctx.blocks[block].filled,
                "you cannot add an instruction to a block already filled"
            );
        }
    }

    /// The block currently being filled.
    pub fn current_block(&self) -> ir::Block {
        self.position.block.unwrap()
    }

    /// Creates a parameter for a specific block by appending it to the list
    /// of already existing parameters.
    ///
    /// **Note:** this function has to be called at the creation of the
    /// block, before adding instructions to it, otherwise it interferes
    /// with SSA construction.
    pub fn append_block_param(&mut self, block: ir::Block, ty: Type) -> Value {
        debug_assert!(self.func_ctx.blocks[block].pristine);
        debug_assert_eq!(
            self.func_ctx.blocks[block].user_param_count,
            self.func.dfg.block_params(block).len()
        );
        self.func_ctx.blocks[block].user_param_count += 1;
        self.func.dfg.append_block_param(block, ty)
    }

    /// Append parameters to the given block corresponding to the function
    /// parameters. This can be used to set up the block parameters for the
    /// entry block.
    pub fn append_block_params_for_function_params(&mut self, block: ir::Block) {
        debug_assert!(
            !self.func_ctx.ssa.has_any_predecessors(block),
            "block parameters for function parameters should only be added to the entry block"
        );
        // These parameters count as "user" parameters here because they
        // aren't inserted by the SSABuilder.
        let user_param_count = &mut self.func_ctx.blocks[block].user_param_count;
        for param in &self.func.signature.params {
            *user_param_count += 1;
            self.func.dfg.append_block_param(block, param.value_type);
        }
    }

    /// Append parameters to the given block corresponding to the function
    /// return values. This can be used to set up the block parameters for a
    /// function exit block.
    pub fn append_block_params_for_function_returns(&mut self, block: ir::Block) {
        // These parameters count as "user" parameters here because they
        // aren't inserted by the SSABuilder.
        let user_param_count = &mut self.func_ctx.blocks[block].user_param_count;
        for ret in &self.func.signature.returns {
            *user_param_count += 1;
            self.func.dfg.append_block_param(block, ret.value_type);
        }
    }

    /// Declare that translation of the current function is complete. This
    /// resets the state of the `FunctionBuilder` in preparation to be used
    /// for another function.
    pub fn finalize(&mut self) {
        // Check that all the blocks are filled and sealed.
        debug_assert!(
            self.func
                .layout
                .blocks()
                .all(|block| self.func_ctx.blocks[block].pristine
                    || self.func_ctx.ssa.is_sealed(block)),
            "all blocks should be sealed before dropping a FunctionBuilder"
        );
        debug_assert!(
            self.func
                .layout
                .blocks()
                .all(|block| self.func_ctx.blocks[block].pristine
                    || self.func_ctx.blocks[block].filled),
            "all blocks should be filled before dropping a FunctionBuilder"
        );

        // Clear the state (but preserve the allocated buffers) in
        // preparation for translation of another function.
        self.func_ctx.clear();
        self.position = Position::default();
    }
}

/// All the functions documented in the previous block are write-only and
/// help you build a valid keel IR function. The functions below help you
/// inspect the function you're creating.
impl<'a> FunctionBuilder<'a> {
    /// Retrieves all the parameters for a block currently inferred from the
    /// jump instructions inserted that target it and the SSA construction.
    pub fn block_params(&self, block: ir::Block) -> &[Value] {
        self.func.dfg.block_params(block)
    }

    /// Retrieves the signature with reference `sigref` previously added
    /// with `import_signature`.
    pub fn signature(&self, sigref: SigRef) -> Option<&Signature> {
        self.func.dfg.signatures.get(sigref)
    }

    /// Returns the result values of an instruction.
    pub fn inst_results(&self, inst: ir::Inst) -> &[Value] {
        self.func.dfg.inst_results(inst)
    }

    /// Returns `true` if and only if the current block is sealed and has no
    /// predecessors declared.
    ///
    /// The entry block of a function is never unreachable.
    pub fn is_unreachable(&self) -> bool {
        let is_entry = match self.func.layout.entry_block() {
            None => false,
            Some(entry) => self.position.block.unwrap() == entry,
        };
        !is_entry
            && self.func_ctx.ssa.is_sealed(self.position.block.unwrap())
            && !self
                .func_ctx
                .ssa
                .has_any_predecessors(self.position.block.unwrap())
    }

    /// Returns `true` if and only if no instructions have been added since
    /// the last call to `switch_to_block`.
    pub fn is_pristine(&self) -> bool {
        self.func_ctx.blocks[self.position.block.unwrap()].pristine
    }

    /// Returns `true` if and only if a terminator instruction has been
    /// inserted since the last call to `switch_to_block`.
    pub fn is_filled(&self) -> bool {
        self.func_ctx.blocks[self.position.block.unwrap()].filled
    }
}

// Helper functions
impl<'a> FunctionBuilder<'a> {
    fn move_to_next_basic_block(&mut self) {
        self.position.basic_block = self
            .func_ctx
            .ssa
            .declare_body_block(self.position.basic_block.unwrap())
            .into();
    }

    fn fill_current_block(&mut self) {
        self.func_ctx.blocks[self.position.block.unwrap()].filled = true;
    }

    fn declare_successor(&mut self, dest_block: ir::Block, branch_inst: ir::Inst) {
        self.func_ctx.ssa.declare_block_predecessor(
            dest_block,
            self.position.basic_block.unwrap(),
            branch_inst,
        );
    }

    fn handle_ssa_side_effects(&mut self, side_effects: SideEffects) {
        for modified_block in side_effects.instructions_added_to_blocks {
            self.func_ctx.blocks[modified_block].pristine = false;
        }
    }
}

/// Builder object appending one instruction to the current block per method
/// call.
pub struct FuncInstBuilder<'short, 'long: 'short> {
    builder: &'short mut FunctionBuilder<'long>,
    block: ir::Block,
}

macro_rules! binary_ops {
    ($( $(#[$attr:meta])* $name:ident => $opcode:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(mut self, x: Value, y: Value) -> Value {
                let ty = self.builder.func.dfg.value_type(x);
                let inst = self.build(
                    InstructionData::Binary {
                        opcode: Opcode::$opcode,
                        args: [x, y],
                    },
                    ty,
                );
                self.builder.func.dfg.first_result(inst)
            }
        )*
    };
}

macro_rules! unary_ops {
    ($( $(#[$attr:meta])* $name:ident => $opcode:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(mut self, x: Value) -> Value {
                let ty = self.builder.func.dfg.value_type(x);
                let inst = self.build(
                    InstructionData::Unary {
                        opcode: Opcode::$opcode,
                        arg: x,
                    },
                    ty,
                );
                self.builder.func.dfg.first_result(inst)
            }
        )*
    };
}

macro_rules! conversion_ops {
    ($( $(#[$attr:meta])* $name:ident => $opcode:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(mut self, ty: Type, x: Value) -> Value {
                let inst = self.build(
                    InstructionData::Unary {
                        opcode: Opcode::$opcode,
                        arg: x,
                    },
                    ty,
                );
                self.builder.func.dfg.first_result(inst)
            }
        )*
    };
}

macro_rules! div_rem_ops {
    ($( $(#[$attr:meta])* $name:ident => $opcode:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(mut self, x: Value, y: Value, exec_ctx: Value) -> Value {
                let ty = self.builder.func.dfg.value_type(x);
                let inst = self.build(
                    InstructionData::Ternary {
                        opcode: Opcode::$opcode,
                        args: [x, y, exec_ctx],
                    },
                    ty,
                );
                self.builder.func.dfg.first_result(inst)
            }
        )*
    };
}

macro_rules! load_ops {
    ($( $(#[$attr:meta])* $name:ident => $opcode:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(mut self, ty: Type, addr: Value, offset: u32) -> Value {
                let inst = self.build(
                    InstructionData::Load {
                        opcode: Opcode::$opcode,
                        arg: addr,
                        offset,
                    },
                    ty,
                );
                self.builder.func.dfg.first_result(inst)
            }
        )*
    };
}

macro_rules! store_ops {
    ($( $(#[$attr:meta])* $name:ident => $opcode:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(mut self, x: Value, addr: Value, offset: u32) -> ir::Inst {
                self.build(
                    InstructionData::Store {
                        opcode: Opcode::$opcode,
                        args: [x, addr],
                        offset,
                    },
                    Type::I32,
                )
            }
        )*
    };
}

impl<'short, 'long> FuncInstBuilder<'short, 'long> {
    fn new(builder: &'short mut FunctionBuilder<'long>, block: ir::Block) -> Self {
        Self { builder, block }
    }

    /// Insert the instruction into the current block, allocate its results
    /// and perform the branch bookkeeping SSA construction relies on.
    fn build(&mut self, data: InstructionData, ctrl_ty: Type) -> ir::Inst {
        self.builder.ensure_inserted_block();
        let inst = self.builder.func.dfg.make_inst(data);
        self.builder.func.dfg.make_inst_results(inst, ctrl_ty);
        self.builder.func.layout.append_inst(inst, self.block);

        let opcode = self.builder.func.dfg.inst_data(inst).opcode();
        if opcode.is_branch() {
            match self.builder.func.dfg.inst_data(inst).branch_destination() {
                Some(dest) => self.builder.declare_successor(dest, inst),
                None => {
                    if let InstructionData::BranchTable { table, .. } =
                        *self.builder.func.dfg.inst_data(inst)
                    {
                        // Unlike all other branches, a jump table can have
                        // the same successor appear multiple times, so we
                        // must deduplicate.
                        let mut unique = EntitySet::<ir::Block>::new();
                        let targets: Vec<ir::Block> = self.builder.func.jump_tables[table]
                            .all_targets()
                            .filter(|&dest| unique.insert(dest))
                            .collect();
                        for dest in targets {
                            self.builder.declare_successor(dest, inst);
                        }
                    }
                }
            }
        }
        if opcode.is_terminator() {
            self.builder.fill_current_block();
        } else if opcode.is_branch() {
            self.builder.move_to_next_basic_block();
        }
        inst
    }

    /// An integer constant of the given type.
    pub fn iconst(mut self, ty: Type, imm: i64) -> Value {
        debug_assert!(ty.is_int(), "iconst requires an integer type");
        let inst = self.build(
            InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm: Imm64::new(imm),
            },
            ty,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// A 32-bit float constant.
    pub fn f32const(mut self, imm: Ieee32) -> Value {
        let inst = self.build(
            InstructionData::UnaryIeee32 {
                opcode: Opcode::F32const,
                imm,
            },
            Type::F32,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// A 64-bit float constant.
    pub fn f64const(mut self, imm: Ieee64) -> Value {
        let inst = self.build(
            InstructionData::UnaryIeee64 {
                opcode: Opcode::F64const,
                imm,
            },
            Type::F64,
        );
        self.builder.func.dfg.first_result(inst)
    }

    binary_ops! {
        /// Integer addition.
        iadd => Iadd;
        /// Integer subtraction.
        isub => Isub;
        /// Integer multiplication.
        imul => Imul;
        /// Bitwise and.
        band => Band;
        /// Bitwise or.
        bor => Bor;
        /// Bitwise exclusive or.
        bxor => Bxor;
        /// Shift left; the amount is taken modulo the operand width.
        ishl => Ishl;
        /// Arithmetic shift right.
        sshr => Sshr;
        /// Logical shift right.
        ushr => Ushr;
        /// Rotate left.
        rotl => Rotl;
        /// Rotate right.
        rotr => Rotr;
        /// Float addition.
        fadd => Fadd;
        /// Float subtraction.
        fsub => Fsub;
        /// Float multiplication.
        fmul => Fmul;
        /// Float division.
        fdiv => Fdiv;
        /// IEEE 754-2019 minimum.
        fmin => Fmin;
        /// IEEE 754-2019 maximum.
        fmax => Fmax;
        /// Copy the sign of `y` onto `x`.
        fcopysign => Fcopysign;
    }

    unary_ops! {
        /// Count leading zero bits.
        clz => Clz;
        /// Count trailing zero bits.
        ctz => Ctz;
        /// Count one bits.
        popcnt => Popcnt;
        /// Float absolute value.
        fabs => Fabs;
        /// Float negation.
        fneg => Fneg;
        /// Float square root.
        sqrt => Sqrt;
        /// Round towards positive infinity.
        ceil => Ceil;
        /// Round towards negative infinity.
        floor => Floor;
        /// Round towards zero.
        trunc => Trunc;
        /// Round to nearest, ties to even.
        nearest => Nearest;
    }

    div_rem_ops! {
        /// Signed division; the execution context operand lets the code
        /// generator emit the division-by-zero and overflow exits.
        sdiv => Sdiv;
        /// Unsigned division.
        udiv => Udiv;
        /// Signed remainder.
        srem => Srem;
        /// Unsigned remainder.
        urem => Urem;
    }

    conversion_ops! {
        /// Truncate an integer to a narrower type.
        ireduce => Ireduce;
        /// Convert a signed integer to float.
        fcvt_from_sint => FcvtFromSint;
        /// Convert an unsigned integer to float.
        fcvt_from_uint => FcvtFromUint;
        /// Saturating float to signed integer conversion.
        fcvt_to_sint_sat => FcvtToSintSat;
        /// Saturating float to unsigned integer conversion.
        fcvt_to_uint_sat => FcvtToUintSat;
        /// Convert a float to a wider float type.
        fpromote => Fpromote;
        /// Convert a float to a narrower float type.
        fdemote => Fdemote;
        /// Reinterpret the bits of a value as another type of the same
        /// width.
        bitcast => Bitcast;
    }

    load_ops! {
        /// Load a value of the controlling type.
        load => Load;
        /// Load 8 bits and zero-extend.
        uload8 => Uload8;
        /// Load 8 bits and sign-extend.
        sload8 => Sload8;
        /// Load 16 bits and zero-extend.
        uload16 => Uload16;
        /// Load 16 bits and sign-extend.
        sload16 => Sload16;
        /// Load 32 bits and zero-extend.
        uload32 => Uload32;
        /// Load 32 bits and sign-extend.
        sload32 => Sload32;
    }

    store_ops! {
        /// Store a value.
        store => Store;
        /// Store the low 8 bits.
        istore8 => Istore8;
        /// Store the low 16 bits.
        istore16 => Istore16;
        /// Store the low 32 bits.
        istore32 => Istore32;
    }

    /// Trapping float to signed integer conversion; traps on NaN and
    /// values out of range of the destination type.
    pub fn fcvt_to_sint(mut self, ty: Type, x: Value, exec_ctx: Value) -> Value {
        let inst = self.build(
            InstructionData::Binary {
                opcode: Opcode::FcvtToSint,
                args: [x, exec_ctx],
            },
            ty,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// Trapping float to unsigned integer conversion.
    pub fn fcvt_to_uint(mut self, ty: Type, x: Value, exec_ctx: Value) -> Value {
        let inst = self.build(
            InstructionData::Binary {
                opcode: Opcode::FcvtToUint,
                args: [x, exec_ctx],
            },
            ty,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// Sign-extend the low `from_bits` of `x` to an integer of `to_bits`.
    pub fn sextend(mut self, x: Value, from_bits: u8, to_bits: u8) -> Value {
        let ty = Type::int_with_bits(to_bits).expect("invalid extension width");
        let inst = self.build(
            InstructionData::Extend {
                opcode: Opcode::Sextend,
                arg: x,
                from_bits,
                to_bits,
            },
            ty,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// Zero-extend the low `from_bits` of `x` to an integer of `to_bits`.
    pub fn uextend(mut self, x: Value, from_bits: u8, to_bits: u8) -> Value {
        let ty = Type::int_with_bits(to_bits).expect("invalid extension width");
        let inst = self.build(
            InstructionData::Extend {
                opcode: Opcode::Uextend,
                arg: x,
                from_bits,
                to_bits,
            },
            ty,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// Integer comparison producing 1 when it holds and 0 otherwise.
    pub fn icmp(mut self, cond: IntCC, x: Value, y: Value) -> Value {
        let inst = self.build(
            InstructionData::IntCompare {
                opcode: Opcode::Icmp,
                cond,
                args: [x, y],
            },
            Type::I32,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// Float comparison producing 1 when it holds and 0 otherwise.
    pub fn fcmp(mut self, cond: FloatCC, x: Value, y: Value) -> Value {
        let inst = self.build(
            InstructionData::FloatCompare {
                opcode: Opcode::Fcmp,
                cond,
                args: [x, y],
            },
            Type::I32,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// Choose `x` when `cond` is non-zero, `y` otherwise.
    pub fn select(mut self, cond: Value, x: Value, y: Value) -> Value {
        let ty = self.builder.func.dfg.value_type(x);
        let inst = self.build(
            InstructionData::Ternary {
                opcode: Opcode::Select,
                args: [cond, x, y],
            },
            ty,
        );
        self.builder.func.dfg.first_result(inst)
    }

    /// Call a directly declared function.
    pub fn call(mut self, func_ref: FuncRef, args: &[Value]) -> ir::Inst {
        self.build(
            InstructionData::Call {
                opcode: Opcode::Call,
                func_ref,
                args: args.to_vec(),
            },
            Type::I32,
        )
    }

    /// Call through the code pointer `callee` with signature `sig_ref`.
    pub fn call_indirect(mut self, sig_ref: SigRef, callee: Value, args: &[Value]) -> ir::Inst {
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(callee);
        full_args.extend_from_slice(args);
        self.build(
            InstructionData::CallIndirect {
                opcode: Opcode::CallIndirect,
                sig_ref,
                args: full_args,
            },
            Type::I32,
        )
    }

    /// Unconditional jump carrying destination arguments.
    pub fn jump(mut self, destination: ir::Block, args: &[Value]) -> ir::Inst {
        self.build(
            InstructionData::Jump {
                opcode: Opcode::Jump,
                destination,
                args: args.to_vec(),
            },
            Type::I32,
        )
    }

    /// Branch to `destination` when `cond` is zero.
    pub fn brz(mut self, cond: Value, destination: ir::Block, args: &[Value]) -> ir::Inst {
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(cond);
        full_args.extend_from_slice(args);
        self.build(
            InstructionData::Branch {
                opcode: Opcode::Brz,
                destination,
                args: full_args,
            },
            Type::I32,
        )
    }

    /// Branch to `destination` when `cond` is non-zero.
    pub fn brnz(mut self, cond: Value, destination: ir::Block, args: &[Value]) -> ir::Inst {
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(cond);
        full_args.extend_from_slice(args);
        self.build(
            InstructionData::Branch {
                opcode: Opcode::Brnz,
                destination,
                args: full_args,
            },
            Type::I32,
        )
    }

    /// Indexed branch through a jump table.
    pub fn br_table(mut self, index: Value, table: ir::JumpTable) -> ir::Inst {
        self.build(
            InstructionData::BranchTable {
                opcode: Opcode::BrTable,
                arg: index,
                table,
            },
            Type::I32,
        )
    }

    /// Return from the function.
    pub fn return_(mut self, args: &[Value]) -> ir::Inst {
        self.build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args: args.to_vec(),
            },
            Type::I32,
        )
    }

    /// Transfer control to the runtime with the given exit code.
    pub fn exit(mut self, exec_ctx: Value, code: ExitCode) -> ir::Inst {
        self.build(
            InstructionData::Exit {
                opcode: Opcode::Exit,
                ctx: exec_ctx,
                code,
            },
            Type::I32,
        )
    }

    /// Transfer control to the runtime with the given exit code when
    /// `cond` is non-zero; fall through otherwise.
    pub fn exit_if_true(mut self, cond: Value, exec_ctx: Value, code: ExitCode) -> ir::Inst {
        self.build(
            InstructionData::ExitIfTrue {
                opcode: Opcode::ExitIfTrue,
                args: [cond, exec_ctx],
                code,
            },
            Type::I32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_ir::verifier::verify_function;
    use keel_ir::{AbiParam as Param, ExternalName, Function};

    fn signature(params: &[Type], returns: &[Type]) -> Signature {
        let mut sig = Signature::new();
        sig.params.extend(params.iter().map(|&ty| Param::new(ty)));
        sig.returns.extend(returns.iter().map(|&ty| Param::new(ty)));
        sig
    }

    #[test]
    fn straight_line_display() {
        let mut fn_ctx = FunctionBuilderContext::new();
        let mut func = Function::with_name_signature(
            ExternalName::testcase("sample"),
            signature(&[Type::I32, Type::I32], &[Type::I32]),
        );
        {
            let mut builder = FunctionBuilder::new(&mut func, &mut fn_ctx);
            let block0 = builder.create_block();
            builder.append_block_params_for_function_params(block0);
            builder.switch_to_block(block0);
            builder.seal_block(block0);
            let params = [
                builder.block_params(block0)[0],
                builder.block_params(block0)[1],
            ];
            let sum = builder.ins().iadd(params[0], params[1]);
            builder.ins().return_(&[sum]);
            builder.finalize();
        }

        verify_function(&func).unwrap();
        assert_eq!(
            func.display().to_string(),
            "function %sample(i32, i32) -> i32 {\n\
             block0(v0: i32, v1: i32):\n    \
             v2 = iadd v0, v1\n    \
             return v2\n\
             }\n"
        );
    }

    #[test]
    fn variables_across_blocks() {
        // Adapted from the classic sample: a counter mutated around a
        // back edge, with a conditional early return.
        let mut fn_ctx = FunctionBuilderContext::new();
        let mut func = Function::with_name_signature(
            ExternalName::testcase("sample"),
            signature(&[Type::I32], &[Type::I32]),
        );
        {
            let mut builder = FunctionBuilder::new(&mut func, &mut fn_ctx);
            let block0 = builder.create_block();
            let block1 = builder.create_block();
            let block2 = builder.create_block();
            let x = Variable::with_u32(0);
            let y = Variable::with_u32(1);
            builder.declare_var(x, Type::I32);
            builder.declare_var(y, Type::I32);
            builder.append_block_params_for_function_params(block0);

            builder.switch_to_block(block0);
            builder.seal_block(block0);
            let arg = builder.block_params(block0)[0];
            builder.def_var(x, arg);
            let two = builder.ins().iconst(Type::I32, 2);
            builder.def_var(y, two);
            builder.ins().jump(block1, &[]);

            builder.switch_to_block(block1);
            let y_val = builder.use_var(y);
            builder.ins().brnz(y_val, block2, &[]);
            let x_val = builder.use_var(x);
            builder.ins().return_(&[x_val]);

            builder.switch_to_block(block2);
            builder.seal_block(block2);
            let x_val = builder.use_var(x);
            let y_val = builder.use_var(y);
            let diff = builder.ins().isub(x_val, y_val);
            builder.def_var(y, diff);
            builder.ins().jump(block1, &[]);
            builder.seal_block(block1);

            builder.finalize();
        }
        verify_function(&func).unwrap();

        // y is redefined around the back edge, so block1 must have grown a
        // parameter for it; x is invariant and must not have.
        let block1 = func.layout.blocks().nth(1).unwrap();
        assert_eq!(func.dfg.block_params(block1).len(), 1);
    }

    #[test]
    fn context_is_reusable() {
        let mut fn_ctx = FunctionBuilderContext::new();
        for _ in 0..2 {
            let mut func = Function::with_name_signature(
                ExternalName::testcase("noop"),
                signature(&[], &[]),
            );
            let mut builder = FunctionBuilder::new(&mut func, &mut fn_ctx);
            let block0 = builder.create_block();
            builder.switch_to_block(block0);
            builder.seal_block(block0);
            builder.ins().return_(&[]);
            builder.finalize();
            verify_function(&func).unwrap();
        }
    }
}
