//! This module contains the bulk of the interesting code performing the
//! translation between WebAssembly and keel IR.
//!
//! The translation is done in one pass, opcode by opcode. Two main data
//! structures are used during code translation: the value stack and the
//! control stack. The value stack mimics the execution of the WebAssembly
//! stack machine: each instruction result is pushed onto the stack and
//! instruction arguments are popped off. Similarly, when encountering a
//! control-flow structure, it is pushed onto the control stack and popped
//! off when encountering the corresponding `end`.
//!
//! The translation state also records the unreachability status: opcodes
//! in dead code are not translated, but control structures opened there
//! must still be counted so the matching `end`/`else` restores
//! reachability at the right nesting level.
//!
//! Some WebAssembly instructions need information about the runtime
//! environment to be translated: loads and stores need the memory base
//! and length, `global.get`/`global.set` go through the module context,
//! `memory.grow` and the termination checks call runtime trampolines, and
//! `call_indirect` checks a table entry's type ID. That is why the
//! translation functions take a [`FuncEnvironment`] argument.

use crate::environ::{FuncEnvironment, WasmError, WasmResult};
use crate::operators::{MemArg, Operator};
use crate::state::{ControlStackFrame, TranslationState};
use crate::translation_utils::{blocktype_params_results, block_with_params, FuncIndex};
use cranelift_entity::EntityRef;
use keel_frontend::{FunctionBuilder, Variable};
use keel_ir::{self as ir, ExitCode, FloatCC, IntCC, Opcode, Type};
use smallvec::SmallVec;
use std::collections::hash_map;
use std::collections::HashMap;

/// Translate one decoded operator, updating the builder and the state.
pub fn translate_operator(
    op: &Operator,
    builder: &mut FunctionBuilder,
    state: &mut TranslationState,
    environ: &mut FuncEnvironment,
) -> WasmResult<()> {
    if !state.reachable {
        translate_unreachable_operator(op, builder, state);
        return Ok(());
    }

    // This big match treats all Wasm code operators.
    match op {
        /****************************** Locals *****************************
         * `local.get`, `local.set` and `local.tee` are treated as non-SSA
         * variables and completely disappear in the generated code.
         *******************************************************************/
        Operator::LocalGet { local_index } => {
            let val = builder.use_var(Variable::with_u32(*local_index));
            state.push1(val);
        }
        Operator::LocalSet { local_index } => {
            let val = state.pop1();
            builder.def_var(Variable::with_u32(*local_index), val);
        }
        Operator::LocalTee { local_index } => {
            let val = state.peek1();
            builder.def_var(Variable::with_u32(*local_index), val);
        }
        /****************************** Globals ****************************
         * Globals live behind the module context; reads are cached on
         * linear paths and the cache is refreshed after calls.
         *******************************************************************/
        Operator::GlobalGet { global_index } => {
            let val = environ.translate_global_get(builder, *global_index);
            state.push1(val);
        }
        Operator::GlobalSet { global_index } => {
            let val = state.pop1();
            environ.translate_global_set(builder, *global_index, val);
        }
        /**************************** Stack misc ***************************/
        Operator::Drop => {
            state.pop1();
        }
        Operator::Select => {
            let (arg1, arg2, cond) = state.pop3();
            state.push1(builder.ins().select(cond, arg1, arg2));
        }
        Operator::Nop => {
            // We do nothing.
        }
        Operator::Unreachable => {
            builder.ins().exit(environ.exec_ctx(), ExitCode::Unreachable);
            state.reachable = false;
        }
        /************************ Control flow blocks **********************
         * When starting a control-flow structure, we create a new block
         * that will hold the code after the structure, and push a frame on
         * the control stack. Depending on the structure we also create
         * blocks for its body.
         *
         * The `end` pops the frame, seals the following block (all the
         * branches to it are known at that point) and continues there.
         *******************************************************************/
        Operator::Block { block_type } => {
            let (params, results) = blocktype_params_results(environ.module(), *block_type);
            let following = block_with_params(builder, &results);
            state.push_block(following, params.len(), results.len());
        }
        Operator::Loop { block_type } => {
            let (params, results) = blocktype_params_results(environ.module(), *block_type);
            let header = block_with_params(builder, &params);
            let following = block_with_params(builder, &results);
            builder.ins().jump(header, state.peekn(params.len()));
            state.popn(params.len());
            builder.switch_to_block(header);
            // The loop's body sees the header's parameters, not the values
            // that entered the loop; back edges merge into them. The
            // header stays unsealed until its `end` has seen every back
            // edge.
            state.stack.extend_from_slice(builder.block_params(header));
            state.push_loop(header, following, params.len(), results.len());
            environ.translate_loop_header(builder);
        }
        Operator::If { block_type } => {
            let cond = state.pop1();
            let (params, results) = blocktype_params_results(environ.module(), *block_type);
            let then_block = builder.create_block();
            let else_block = builder.create_block();
            let following = block_with_params(builder, &results);
            // Snapshot the parameter values for replay at the `else` edge;
            // the condition is already popped.
            let cloned_args: SmallVec<[ir::Value; 4]> =
                SmallVec::from_slice(state.peekn(params.len()));
            builder.ins().brz(cond, else_block, &[]);
            builder.ins().jump(then_block, &[]);
            // Both arms have their single predecessor right here.
            builder.seal_block(then_block);
            builder.seal_block(else_block);
            builder.switch_to_block(then_block);
            state.push_if(
                else_block,
                following,
                cloned_args,
                params.len(),
                results.len(),
            );
        }
        Operator::Else => {
            let i = state.control_stack.len() - 1;
            let (else_block, following, cloned_args, num_results, original_stack_size) =
                match &mut state.control_stack[i] {
                    ControlStackFrame::If {
                        else_block,
                        following,
                        cloned_args,
                        has_else,
                        num_results,
                        original_stack_size,
                        ..
                    } => {
                        debug_assert!(!*has_else, "two else clauses in one if");
                        *has_else = true;
                        (
                            *else_block,
                            *following,
                            cloned_args.clone(),
                            *num_results,
                            *original_stack_size,
                        )
                    }
                    _ => panic!("else outside an if"),
                };
            // Close the consequent with a jump to the merge point, then
            // restore the stack as it was when the `if` opened and
            // translate the alternative.
            builder.ins().jump(following, state.peekn(num_results));
            state.stack.truncate(original_stack_size);
            state.stack.extend_from_slice(&cloned_args);
            builder.switch_to_block(else_block);
        }
        Operator::End => {
            let frame = state.control_stack.pop().unwrap();
            builder
                .ins()
                .jump(frame.following_code(), state.peekn(frame.num_return_values()));
            finish_end(frame, builder, state);
        }
        /************************** Branches *******************************
         * Branch arguments follow the frame kind: a branch to a loop
         * label carries the loop parameters to the header, any other
         * branch carries the structure's results to its following block.
         *
         * `br_table` targets cannot carry arguments, so every edge goes
         * through a freshly created trampoline block holding a plain jump
         * with the arguments.
         *******************************************************************/
        Operator::Br { relative_depth } => {
            let (target, argc) = state.br_target_and_argc(*relative_depth);
            builder.ins().jump(target, state.peekn(argc));
            state.reachable = false;
        }
        Operator::BrIf { relative_depth } => {
            translate_br_if(*relative_depth, builder, state);
        }
        Operator::BrTable { targets, default } => {
            let index = state.pop1();
            if targets.is_empty() {
                // Degenerate one-way table.
                let (target, argc) = state.br_target_and_argc(*default);
                builder.ins().jump(target, state.peekn(argc));
            } else {
                let argc = state.br_target_and_argc(*default).1;
                debug_assert!(
                    targets
                        .iter()
                        .all(|&depth| state.br_target_and_argc(depth).1 == argc),
                    "br_table targets disagree on argument count"
                );
                // One trampoline per distinct depth; the table may repeat
                // them.
                let mut trampolines: HashMap<u32, ir::Block> = HashMap::new();
                let mut sequence: Vec<(u32, ir::Block)> = Vec::new();
                let mut trampoline_for = |depth: u32, builder: &mut FunctionBuilder| match trampolines
                    .entry(depth)
                {
                    hash_map::Entry::Occupied(entry) => *entry.get(),
                    hash_map::Entry::Vacant(entry) => {
                        let block = builder.create_block();
                        sequence.push((depth, block));
                        *entry.insert(block)
                    }
                };
                let default_block = trampoline_for(*default, builder);
                let mut data = ir::JumpTableData::new(default_block);
                for &depth in targets {
                    let block = trampoline_for(depth, builder);
                    data.push_entry(block);
                }
                let table = builder.create_jump_table(data);
                builder.ins().br_table(index, table);
                for (depth, block) in sequence {
                    builder.switch_to_block(block);
                    builder.seal_block(block);
                    let (target, argc) = state.br_target_and_argc(depth);
                    builder.ins().jump(target, state.peekn(argc));
                }
            }
            state.reachable = false;
        }
        Operator::Return => {
            let argc = state.control_stack[0].num_return_values();
            builder.ins().return_(state.peekn(argc));
            state.reachable = false;
        }
        /**************************** Calls ********************************/
        Operator::Call { function_index } => {
            translate_call(builder, state, environ, *function_index);
        }
        Operator::CallIndirect {
            type_index,
            table_index,
        } => {
            environ.translate_call_indirect(builder, state, *type_index, *table_index)?;
        }
        /*********************** Memory management *************************/
        Operator::MemoryGrow { .. } => {
            let pages = state.pop1();
            let result = environ.translate_memory_grow(builder, pages);
            state.push1(result);
        }
        Operator::MemorySize { .. } => {
            state.push1(environ.translate_memory_size(builder));
        }
        /**************************** Loads ********************************/
        Operator::I32Load8U { memarg } => {
            translate_load(memarg, Opcode::Uload8, Type::I32, 1, builder, state, environ);
        }
        Operator::I32Load8S { memarg } => {
            translate_load(memarg, Opcode::Sload8, Type::I32, 1, builder, state, environ);
        }
        Operator::I32Load16U { memarg } => {
            translate_load(memarg, Opcode::Uload16, Type::I32, 2, builder, state, environ);
        }
        Operator::I32Load16S { memarg } => {
            translate_load(memarg, Opcode::Sload16, Type::I32, 2, builder, state, environ);
        }
        Operator::I64Load8U { memarg } => {
            translate_load(memarg, Opcode::Uload8, Type::I64, 1, builder, state, environ);
        }
        Operator::I64Load8S { memarg } => {
            translate_load(memarg, Opcode::Sload8, Type::I64, 1, builder, state, environ);
        }
        Operator::I64Load16U { memarg } => {
            translate_load(memarg, Opcode::Uload16, Type::I64, 2, builder, state, environ);
        }
        Operator::I64Load16S { memarg } => {
            translate_load(memarg, Opcode::Sload16, Type::I64, 2, builder, state, environ);
        }
        Operator::I64Load32U { memarg } => {
            translate_load(memarg, Opcode::Uload32, Type::I64, 4, builder, state, environ);
        }
        Operator::I64Load32S { memarg } => {
            translate_load(memarg, Opcode::Sload32, Type::I64, 4, builder, state, environ);
        }
        Operator::I32Load { memarg } => {
            translate_load(memarg, Opcode::Load, Type::I32, 4, builder, state, environ);
        }
        Operator::I64Load { memarg } => {
            translate_load(memarg, Opcode::Load, Type::I64, 8, builder, state, environ);
        }
        Operator::F32Load { memarg } => {
            translate_load(memarg, Opcode::Load, Type::F32, 4, builder, state, environ);
        }
        Operator::F64Load { memarg } => {
            translate_load(memarg, Opcode::Load, Type::F64, 8, builder, state, environ);
        }
        /**************************** Stores *******************************/
        Operator::I32Store { memarg } => {
            translate_store(memarg, Opcode::Store, 4, builder, state, environ);
        }
        Operator::I64Store { memarg } => {
            translate_store(memarg, Opcode::Store, 8, builder, state, environ);
        }
        Operator::F32Store { memarg } => {
            translate_store(memarg, Opcode::Store, 4, builder, state, environ);
        }
        Operator::F64Store { memarg } => {
            translate_store(memarg, Opcode::Store, 8, builder, state, environ);
        }
        Operator::I32Store8 { memarg } | Operator::I64Store8 { memarg } => {
            translate_store(memarg, Opcode::Istore8, 1, builder, state, environ);
        }
        Operator::I32Store16 { memarg } | Operator::I64Store16 { memarg } => {
            translate_store(memarg, Opcode::Istore16, 2, builder, state, environ);
        }
        Operator::I64Store32 { memarg } => {
            translate_store(memarg, Opcode::Istore32, 4, builder, state, environ);
        }
        /************************* Constants *******************************/
        Operator::I32Const { value } => {
            state.push1(builder.ins().iconst(Type::I32, i64::from(*value)));
        }
        Operator::I64Const { value } => {
            state.push1(builder.ins().iconst(Type::I64, *value));
        }
        Operator::F32Const { bits } => {
            state.push1(builder.ins().f32const(ir::Ieee32::with_bits(*bits)));
        }
        Operator::F64Const { bits } => {
            state.push1(builder.ins().f64const(ir::Ieee64::with_bits(*bits)));
        }
        /********************** Unary operators ****************************/
        Operator::I32Clz | Operator::I64Clz => {
            let arg = state.pop1();
            state.push1(builder.ins().clz(arg));
        }
        Operator::I32Ctz | Operator::I64Ctz => {
            let arg = state.pop1();
            state.push1(builder.ins().ctz(arg));
        }
        Operator::I32Popcnt | Operator::I64Popcnt => {
            let arg = state.pop1();
            state.push1(builder.ins().popcnt(arg));
        }
        Operator::I64ExtendI32S => {
            let val = state.pop1();
            state.push1(builder.ins().sextend(val, 32, 64));
        }
        Operator::I64ExtendI32U => {
            let val = state.pop1();
            state.push1(builder.ins().uextend(val, 32, 64));
        }
        Operator::I32WrapI64 => {
            let val = state.pop1();
            state.push1(builder.ins().ireduce(Type::I32, val));
        }
        Operator::I32Extend8S => {
            let val = state.pop1();
            state.push1(builder.ins().sextend(val, 8, 32));
        }
        Operator::I32Extend16S => {
            let val = state.pop1();
            state.push1(builder.ins().sextend(val, 16, 32));
        }
        Operator::I64Extend8S => {
            let val = state.pop1();
            state.push1(builder.ins().sextend(val, 8, 64));
        }
        Operator::I64Extend16S => {
            let val = state.pop1();
            state.push1(builder.ins().sextend(val, 16, 64));
        }
        Operator::I64Extend32S => {
            let val = state.pop1();
            state.push1(builder.ins().sextend(val, 32, 64));
        }
        Operator::F32Sqrt | Operator::F64Sqrt => {
            let arg = state.pop1();
            state.push1(builder.ins().sqrt(arg));
        }
        Operator::F32Ceil | Operator::F64Ceil => {
            let arg = state.pop1();
            state.push1(builder.ins().ceil(arg));
        }
        Operator::F32Floor | Operator::F64Floor => {
            let arg = state.pop1();
            state.push1(builder.ins().floor(arg));
        }
        Operator::F32Trunc | Operator::F64Trunc => {
            let arg = state.pop1();
            state.push1(builder.ins().trunc(arg));
        }
        Operator::F32Nearest | Operator::F64Nearest => {
            let arg = state.pop1();
            state.push1(builder.ins().nearest(arg));
        }
        Operator::F32Abs | Operator::F64Abs => {
            let arg = state.pop1();
            state.push1(builder.ins().fabs(arg));
        }
        Operator::F32Neg | Operator::F64Neg => {
            let arg = state.pop1();
            state.push1(builder.ins().fneg(arg));
        }
        Operator::F64ConvertI64S | Operator::F64ConvertI32S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_from_sint(Type::F64, val));
        }
        Operator::F64ConvertI64U | Operator::F64ConvertI32U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_from_uint(Type::F64, val));
        }
        Operator::F32ConvertI64S | Operator::F32ConvertI32S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_from_sint(Type::F32, val));
        }
        Operator::F32ConvertI64U | Operator::F32ConvertI32U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_from_uint(Type::F32, val));
        }
        Operator::F64PromoteF32 => {
            let val = state.pop1();
            state.push1(builder.ins().fpromote(Type::F64, val));
        }
        Operator::F32DemoteF64 => {
            let val = state.pop1();
            state.push1(builder.ins().fdemote(Type::F32, val));
        }
        Operator::I64TruncF64S | Operator::I64TruncF32S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_sint(Type::I64, val, environ.exec_ctx()));
        }
        Operator::I32TruncF64S | Operator::I32TruncF32S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_sint(Type::I32, val, environ.exec_ctx()));
        }
        Operator::I64TruncF64U | Operator::I64TruncF32U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_uint(Type::I64, val, environ.exec_ctx()));
        }
        Operator::I32TruncF64U | Operator::I32TruncF32U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_uint(Type::I32, val, environ.exec_ctx()));
        }
        Operator::I64TruncSatF64S | Operator::I64TruncSatF32S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_sint_sat(Type::I64, val));
        }
        Operator::I32TruncSatF64S | Operator::I32TruncSatF32S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_sint_sat(Type::I32, val));
        }
        Operator::I64TruncSatF64U | Operator::I64TruncSatF32U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_uint_sat(Type::I64, val));
        }
        Operator::I32TruncSatF64U | Operator::I32TruncSatF32U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_uint_sat(Type::I32, val));
        }
        Operator::F32ReinterpretI32 => {
            let val = state.pop1();
            state.push1(builder.ins().bitcast(Type::F32, val));
        }
        Operator::F64ReinterpretI64 => {
            let val = state.pop1();
            state.push1(builder.ins().bitcast(Type::F64, val));
        }
        Operator::I32ReinterpretF32 => {
            let val = state.pop1();
            state.push1(builder.ins().bitcast(Type::I32, val));
        }
        Operator::I64ReinterpretF64 => {
            let val = state.pop1();
            state.push1(builder.ins().bitcast(Type::I64, val));
        }
        /********************** Binary operators ***************************/
        Operator::I32Add | Operator::I64Add => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().iadd(arg1, arg2));
        }
        Operator::I32Sub | Operator::I64Sub => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().isub(arg1, arg2));
        }
        Operator::I32Mul | Operator::I64Mul => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().imul(arg1, arg2));
        }
        Operator::I32DivS | Operator::I64DivS => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().sdiv(arg1, arg2, environ.exec_ctx()));
        }
        Operator::I32DivU | Operator::I64DivU => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().udiv(arg1, arg2, environ.exec_ctx()));
        }
        Operator::I32RemS | Operator::I64RemS => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().srem(arg1, arg2, environ.exec_ctx()));
        }
        Operator::I32RemU | Operator::I64RemU => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().urem(arg1, arg2, environ.exec_ctx()));
        }
        Operator::I32And | Operator::I64And => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().band(arg1, arg2));
        }
        Operator::I32Or | Operator::I64Or => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().bor(arg1, arg2));
        }
        Operator::I32Xor | Operator::I64Xor => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().bxor(arg1, arg2));
        }
        Operator::I32Shl | Operator::I64Shl => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().ishl(arg1, arg2));
        }
        Operator::I32ShrS | Operator::I64ShrS => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().sshr(arg1, arg2));
        }
        Operator::I32ShrU | Operator::I64ShrU => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().ushr(arg1, arg2));
        }
        Operator::I32Rotl | Operator::I64Rotl => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().rotl(arg1, arg2));
        }
        Operator::I32Rotr | Operator::I64Rotr => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().rotr(arg1, arg2));
        }
        Operator::F32Add | Operator::F64Add => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fadd(arg1, arg2));
        }
        Operator::F32Sub | Operator::F64Sub => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fsub(arg1, arg2));
        }
        Operator::F32Mul | Operator::F64Mul => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fmul(arg1, arg2));
        }
        Operator::F32Div | Operator::F64Div => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fdiv(arg1, arg2));
        }
        Operator::F32Min | Operator::F64Min => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fmin(arg1, arg2));
        }
        Operator::F32Max | Operator::F64Max => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fmax(arg1, arg2));
        }
        Operator::F32Copysign | Operator::F64Copysign => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fcopysign(arg1, arg2));
        }
        /********************** Comparison operators ***********************/
        Operator::I32LtS | Operator::I64LtS => {
            translate_icmp(IntCC::SignedLessThan, builder, state);
        }
        Operator::I32LtU | Operator::I64LtU => {
            translate_icmp(IntCC::UnsignedLessThan, builder, state);
        }
        Operator::I32LeS | Operator::I64LeS => {
            translate_icmp(IntCC::SignedLessThanOrEqual, builder, state);
        }
        Operator::I32LeU | Operator::I64LeU => {
            translate_icmp(IntCC::UnsignedLessThanOrEqual, builder, state);
        }
        Operator::I32GtS | Operator::I64GtS => {
            translate_icmp(IntCC::SignedGreaterThan, builder, state);
        }
        Operator::I32GtU | Operator::I64GtU => {
            translate_icmp(IntCC::UnsignedGreaterThan, builder, state);
        }
        Operator::I32GeS | Operator::I64GeS => {
            translate_icmp(IntCC::SignedGreaterThanOrEqual, builder, state);
        }
        Operator::I32GeU | Operator::I64GeU => {
            translate_icmp(IntCC::UnsignedGreaterThanOrEqual, builder, state);
        }
        Operator::I32Eq | Operator::I64Eq => {
            translate_icmp(IntCC::Equal, builder, state);
        }
        Operator::I32Ne | Operator::I64Ne => {
            translate_icmp(IntCC::NotEqual, builder, state);
        }
        Operator::I32Eqz | Operator::I64Eqz => {
            let arg = state.pop1();
            let ty = builder.func.dfg.value_type(arg);
            let zero = builder.ins().iconst(ty, 0);
            state.push1(builder.ins().icmp(IntCC::Equal, arg, zero));
        }
        Operator::F32Eq | Operator::F64Eq => {
            translate_fcmp(FloatCC::Equal, builder, state);
        }
        Operator::F32Ne | Operator::F64Ne => {
            translate_fcmp(FloatCC::NotEqual, builder, state);
        }
        Operator::F32Lt | Operator::F64Lt => {
            translate_fcmp(FloatCC::LessThan, builder, state);
        }
        Operator::F32Le | Operator::F64Le => {
            translate_fcmp(FloatCC::LessThanOrEqual, builder, state);
        }
        Operator::F32Gt | Operator::F64Gt => {
            translate_fcmp(FloatCC::GreaterThan, builder, state);
        }
        Operator::F32Ge | Operator::F64Ge => {
            translate_fcmp(FloatCC::GreaterThanOrEqual, builder, state);
        }
        /************************* References ******************************
         * References are 64-bit function-instance or host addresses here;
         * null is the zero address.
         *******************************************************************/
        Operator::RefNull => {
            state.push1(builder.ins().iconst(Type::I64, 0));
        }
        Operator::RefIsNull => {
            let arg = state.pop1();
            let zero = builder.ins().iconst(Type::I64, 0);
            state.push1(builder.ins().icmp(IntCC::Equal, arg, zero));
        }
        Operator::RefFunc { .. } => {
            return Err(WasmError::Unsupported(
                "ref.func; function addresses are not materializable".to_string(),
            ));
        }
        /*********************** Unsupported sets **************************/
        Operator::TableGet { .. }
        | Operator::TableSet { .. }
        | Operator::TableGrow { .. }
        | Operator::TableSize { .. }
        | Operator::TableFill { .. }
        | Operator::TableInit { .. }
        | Operator::TableCopy { .. }
        | Operator::ElemDrop { .. } => {
            return Err(WasmError::Unsupported("table operators".to_string()));
        }
        Operator::MemoryInit { .. }
        | Operator::DataDrop { .. }
        | Operator::MemoryCopy { .. }
        | Operator::MemoryFill { .. } => {
            return Err(WasmError::Unsupported("bulk memory operators".to_string()));
        }
    };
    Ok(())
}

/// Deal with a Wasm instruction located in an unreachable portion of the
/// code. Most are dropped (their immediates were consumed at decode time),
/// but control-structure boundaries must still be tracked so the matching
/// `end` or `else` restores reachability at the right depth.
fn translate_unreachable_operator(
    op: &Operator,
    builder: &mut FunctionBuilder,
    state: &mut TranslationState,
) {
    match op {
        Operator::Block { .. } | Operator::Loop { .. } | Operator::If { .. } => {
            state.unreachable_depth += 1;
        }
        Operator::Else => {
            if state.unreachable_depth == 0 {
                // The consequent of a real `if` ended unreachable; the
                // alternative starts from the `if`'s own stack snapshot
                // and is reachable through the conditional branch.
                let i = state.control_stack.len() - 1;
                let (else_block, cloned_args, original_stack_size) =
                    match &mut state.control_stack[i] {
                        ControlStackFrame::If {
                            else_block,
                            cloned_args,
                            has_else,
                            original_stack_size,
                            ..
                        } => {
                            debug_assert!(!*has_else, "two else clauses in one if");
                            *has_else = true;
                            (*else_block, cloned_args.clone(), *original_stack_size)
                        }
                        _ => panic!("else outside an if"),
                    };
                state.stack.truncate(original_stack_size);
                state.stack.extend_from_slice(&cloned_args);
                builder.switch_to_block(else_block);
                state.reachable = true;
            }
        }
        Operator::End => {
            if state.unreachable_depth > 0 {
                state.unreachable_depth -= 1;
            } else {
                let frame = state.control_stack.pop().unwrap();
                finish_end(frame, builder, state);
            }
        }
        _ => {
            // Nothing to translate in unreachable code.
        }
    }
}

/// The part of `end` shared between reachable and unreachable code: close
/// the structure's auxiliary blocks, seal the following block and continue
/// there.
fn finish_end(
    frame: ControlStackFrame,
    builder: &mut FunctionBuilder,
    state: &mut TranslationState,
) {
    let following = frame.following_code();
    match &frame {
        // All back edges of the loop have been translated.
        ControlStackFrame::Loop { header, .. } => builder.seal_block(*header),
        // An `if` without an `else`: synthesize the empty alternative,
        // passing the `if`'s parameters through unchanged. The else block
        // is reachable through the conditional branch even when the
        // consequent is not.
        ControlStackFrame::If {
            else_block,
            cloned_args,
            has_else: false,
            ..
        } => {
            builder.switch_to_block(*else_block);
            builder.ins().jump(following, cloned_args);
        }
        _ => {}
    }
    builder.seal_block(following);
    state.stack.truncate(frame.original_stack_size());
    builder.switch_to_block(following);
    state.stack.extend_from_slice(builder.block_params(following));
    // A merge point no branch reaches leaves the code after it dead.
    state.reachable = !builder.is_unreachable();
    state.unreachable_depth = 0;
}

fn translate_br_if(
    relative_depth: u32,
    builder: &mut FunctionBuilder,
    state: &mut TranslationState,
) {
    let cond = state.pop1();
    let (target, argc) = state.br_target_and_argc(relative_depth);
    builder.ins().brnz(cond, target, state.peekn(argc));
    let next = builder.create_block();
    builder.ins().jump(next, &[]);
    builder.seal_block(next);
    builder.switch_to_block(next);
}

fn translate_icmp(cond: IntCC, builder: &mut FunctionBuilder, state: &mut TranslationState) {
    let (arg1, arg2) = state.pop2();
    state.push1(builder.ins().icmp(cond, arg1, arg2));
}

fn translate_fcmp(cond: FloatCC, builder: &mut FunctionBuilder, state: &mut TranslationState) {
    let (arg1, arg2) = state.pop2();
    state.push1(builder.ins().fcmp(cond, arg1, arg2));
}

fn translate_load(
    memarg: &MemArg,
    opcode: Opcode,
    result_ty: Type,
    access_size: u8,
    builder: &mut FunctionBuilder,
    state: &mut TranslationState,
    environ: &mut FuncEnvironment,
) {
    let index = state.pop1();
    let addr = environ.prepare_addr(builder, index, memarg.offset, access_size);
    let val = match opcode {
        Opcode::Load => builder.ins().load(result_ty, addr, memarg.offset),
        Opcode::Uload8 => builder.ins().uload8(result_ty, addr, memarg.offset),
        Opcode::Sload8 => builder.ins().sload8(result_ty, addr, memarg.offset),
        Opcode::Uload16 => builder.ins().uload16(result_ty, addr, memarg.offset),
        Opcode::Sload16 => builder.ins().sload16(result_ty, addr, memarg.offset),
        Opcode::Uload32 => builder.ins().uload32(result_ty, addr, memarg.offset),
        Opcode::Sload32 => builder.ins().sload32(result_ty, addr, memarg.offset),
        _ => panic!("not a load opcode: {opcode}"),
    };
    state.push1(val);
}

fn translate_store(
    memarg: &MemArg,
    opcode: Opcode,
    access_size: u8,
    builder: &mut FunctionBuilder,
    state: &mut TranslationState,
    environ: &mut FuncEnvironment,
) {
    let (index, val) = state.pop2();
    let addr = environ.prepare_addr(builder, index, memarg.offset, access_size);
    match opcode {
        Opcode::Store => builder.ins().store(val, addr, memarg.offset),
        Opcode::Istore8 => builder.ins().istore8(val, addr, memarg.offset),
        Opcode::Istore16 => builder.ins().istore16(val, addr, memarg.offset),
        Opcode::Istore32 => builder.ins().istore32(val, addr, memarg.offset),
        _ => panic!("not a store opcode: {opcode}"),
    };
}

/// Translate a direct `call`. Locally defined callees become direct calls;
/// imported callees go through the code pointer and module context stored
/// in this module's context record.
fn translate_call(
    builder: &mut FunctionBuilder,
    state: &mut TranslationState,
    environ: &mut FuncEnvironment,
    function_index: u32,
) {
    environ.store_caller_module_context(builder);
    let num_imports = environ.module().num_imported_funcs() as u32;
    let call = if function_index < num_imports {
        let type_index = environ
            .module()
            .func_type_index(FuncIndex::new(function_index as usize));
        let (sig_ref, num_args) =
            state.get_indirect_sig(builder.func, type_index.index() as u32, environ);
        let record = environ
            .offsets()
            .imported_function(FuncIndex::new(function_index as usize));
        let module_ctx = environ.module_ctx();
        let func_ptr = builder.ins().load(Type::I64, module_ctx, record.func_ptr);
        let callee_module_ctx = builder.ins().load(Type::I64, module_ctx, record.module_ctx);
        let mut args = Vec::with_capacity(num_args + 2);
        args.push(environ.exec_ctx());
        args.push(callee_module_ctx);
        args.extend_from_slice(state.peekn(num_args));
        let call = builder.ins().call_indirect(sig_ref, func_ptr, &args);
        state.popn(num_args);
        call
    } else {
        let (func_ref, num_args) = state.get_direct_func(builder.func, function_index, environ);
        let mut args = Vec::with_capacity(num_args + 2);
        args.push(environ.exec_ctx());
        args.push(environ.module_ctx());
        args.extend_from_slice(state.peekn(num_args));
        let call = builder.ins().call(func_ref, &args);
        state.popn(num_args);
        call
    };
    state.pushn(builder.inst_results(call));
    environ.after_call(builder);
}
