//! Stand-alone WebAssembly to keel IR function translator.
//!
//! This module defines the [`FuncTranslator`] type which translates a
//! single WebAssembly function into keel IR, guided by a
//! [`FuncEnvironment`] which provides the module context ABI.

use crate::code_translator::translate_operator;
use crate::environ::{FuncEnvironment, WasmError, WasmResult};
use crate::module::{FunctionBody, ValType};
use crate::reader::BytecodeReader;
use crate::state::TranslationState;
use crate::translation_utils::FuncIndex;
use cranelift_entity::EntityRef;
use keel_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use keel_ir::{self as ir, ArgumentPurpose, ExternalName, Ieee32, Ieee64, Type, Value};
use log::debug;

/// WebAssembly to keel IR function translator.
///
/// A `FuncTranslator` is used to translate function bodies into keel IR
/// guided by a `FuncEnvironment`. A single translator instance can be
/// reused to translate multiple functions, which reduces heap allocation
/// traffic.
pub struct FuncTranslator {
    func_ctx: FunctionBuilderContext,
    state: TranslationState,
}

impl FuncTranslator {
    /// Create a new translator.
    pub fn new() -> Self {
        Self {
            func_ctx: FunctionBuilderContext::new(),
            state: TranslationState::new(),
        }
    }

    /// Translate the defined function `func_index` of the environment's
    /// module into `func`.
    ///
    /// `func` should be completely empty; its name and signature are set
    /// here. The first two signature arguments are the execution and
    /// module context pointers and are not visible as Wasm locals.
    pub fn translate(
        &mut self,
        environ: &mut FuncEnvironment,
        func_index: FuncIndex,
        func: &mut ir::Function,
    ) -> WasmResult<()> {
        let module = environ.module();
        let def_index = module
            .defined_func_index(func_index)
            .expect("cannot translate an imported function");
        let body = &module.code[def_index];
        let type_index = module.func_type_index(func_index);

        func.name = ExternalName::user(0, func_index.index() as u32);
        func.signature = environ.catalog().signature(type_index).clone();
        debug!(
            "translate({} bytes, {}{})",
            body.body.len(),
            func.name,
            func.signature
        );
        debug_assert_eq!(func.dfg.num_blocks(), 0, "Function must be empty");
        debug_assert_eq!(func.dfg.num_insts(), 0, "Function must be empty");

        // This clears the `FunctionBuilderContext`.
        let mut builder = FunctionBuilder::new(func, &mut self.func_ctx);
        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block); // Declare all predecessors known.

        // Make sure the entry block is inserted in the layout before the
        // environment inserts anything into it.
        builder.ensure_inserted_block();

        let exec_ctx = builder.block_params(entry_block)[0];
        let module_ctx = builder.block_params(entry_block)[1];
        let num_params = declare_wasm_parameters(&mut builder, entry_block);
        let num_locals = declare_locals(&mut builder, &body.locals, num_params)?;
        environ.begin_function(&mut builder, exec_ctx, module_ctx, (num_params + num_locals) as u32);

        // Set up the translation state with a single frame representing
        // the whole function, ending at the return block.
        let return_block = builder.create_block();
        builder.append_block_params_for_function_returns(return_block);
        self.state.initialize(&builder.func.signature, return_block);

        parse_function_body(body, &mut builder, &mut self.state, environ)?;

        builder.finalize();
        Ok(())
    }
}

impl Default for FuncTranslator {
    fn default() -> Self {
        Self::new()
    }
}

/// Declare local variables for the signature parameters that correspond to
/// WebAssembly locals: every parameter whose purpose is `Normal`. The
/// context pointers are passed through to the environment instead.
///
/// Returns the number of local variables declared.
fn declare_wasm_parameters(builder: &mut FunctionBuilder, entry_block: ir::Block) -> usize {
    let sig_len = builder.func.signature.params.len();
    let mut next_local = 0;
    for i in 0..sig_len {
        let param_type = builder.func.signature.params[i];
        if param_type.purpose == ArgumentPurpose::Normal {
            let local = Variable::with_u32(next_local as u32);
            builder.declare_var(local, param_type.value_type);
            next_local += 1;

            let param_value = builder.block_params(entry_block)[i];
            builder.def_var(local, param_value);
        }
    }
    next_local
}

/// Declare and zero-initialize the function's declared locals, starting
/// after the parameters. Returns the number of locals declared.
fn declare_locals(
    builder: &mut FunctionBuilder,
    local_types: &[ValType],
    num_params: usize,
) -> WasmResult<usize> {
    // All locals are initialized to 0, sharing one constant per type.
    let mut i32_zero: Option<Value> = None;
    let mut i64_zero: Option<Value> = None;
    let mut f32_zero: Option<Value> = None;
    let mut f64_zero: Option<Value> = None;
    let mut next_local = num_params;
    for &ty in local_types {
        let (ir_ty, zero) = match ty {
            ValType::I32 => (
                Type::I32,
                *i32_zero.get_or_insert_with(|| builder.ins().iconst(Type::I32, 0)),
            ),
            ValType::I64 => (
                Type::I64,
                *i64_zero.get_or_insert_with(|| builder.ins().iconst(Type::I64, 0)),
            ),
            ValType::F32 => (
                Type::F32,
                *f32_zero.get_or_insert_with(|| builder.ins().f32const(Ieee32::with_bits(0))),
            ),
            ValType::F64 => (
                Type::F64,
                *f64_zero.get_or_insert_with(|| builder.ins().f64const(Ieee64::with_bits(0))),
            ),
            ValType::FuncRef | ValType::ExternRef => (
                Type::I64,
                *i64_zero.get_or_insert_with(|| builder.ins().iconst(Type::I64, 0)),
            ),
            ValType::V128 => {
                return Err(WasmError::Unsupported("v128 locals".to_string()));
            }
        };
        let local = Variable::with_u32(next_local as u32);
        builder.declare_var(local, ir_ty);
        builder.def_var(local, zero);
        next_local += 1;
    }
    Ok(next_local - num_params)
}

/// Translate the function body.
///
/// This assumes the parameter and local variables are declared and the
/// control stack holds the function frame.
fn parse_function_body(
    body: &FunctionBody,
    builder: &mut FunctionBuilder,
    state: &mut TranslationState,
    environ: &mut FuncEnvironment,
) -> WasmResult<()> {
    debug_assert_eq!(state.control_stack.len(), 1, "State not initialized");
    let mut reader = BytecodeReader::new(&body.body);

    // Keep going until the final `end` pops the function frame.
    while !state.control_stack.is_empty() {
        let op = reader.read_operator()?;
        translate_operator(&op, builder, state, environ)?;
    }

    // The final `end` left us in the return block; add the return
    // instruction unless no branch ever reaches it.
    if state.reachable {
        debug_assert!(builder.is_pristine());
        builder.ins().return_(&state.stack);
    }

    // Discard any remaining values on the stack; either we just returned
    // them or the end of the function is unreachable.
    state.stack.clear();

    if !reader.eof() {
        return Err(WasmError::InvalidBytecode {
            message: "trailing bytes after the function's final end".to_string(),
            offset: reader.position(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FunctionType, Module};
    use crate::signatures::SignatureCatalog;
    use crate::translation_utils::TypeIndex;
    use crate::vmoffsets::ModuleContextOffsets;
    use keel_ir::verifier::verify_function;

    fn translate_one(module: &Module, func_index: usize) -> ir::Function {
        let offsets = ModuleContextOffsets::new(module);
        let catalog = SignatureCatalog::new(module);
        let mut environ = FuncEnvironment::new(module, &offsets, &catalog);
        let mut trans = FuncTranslator::new();
        let mut func = ir::Function::new();
        trans
            .translate(&mut environ, FuncIndex::new(func_index), &mut func)
            .unwrap();
        verify_function(&func).unwrap_or_else(|errors| {
            panic!("{}\n{errors}", func.display());
        });
        func
    }

    fn single_func_module(ty: FunctionType, locals: Vec<ValType>, body: &[u8]) -> Module {
        Module {
            types: vec![ty],
            functions: vec![TypeIndex::new(0)],
            code: vec![FunctionBody {
                locals,
                body: body.to_vec(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn small1() {
        // Implicit return.
        //
        // (func $small1 (param i32) (result i32)
        //     (i32.add (local.get 0) (i32.const 1))
        // )
        const BODY: [u8; 6] = [
            0x20, 0x00, // local.get 0
            0x41, 0x01, // i32.const 1
            0x6a, // i32.add
            0x0b, // end
        ];
        let module = single_func_module(
            FunctionType {
                params: vec![ValType::I32],
                results: vec![ValType::I32],
            },
            vec![],
            &BODY,
        );
        let func = translate_one(&module, 0);
        // v3 is the return block's parameter; it is created before the
        // body is translated.
        assert_eq!(
            func.display().to_string(),
            "function u0:0(i64 exec_ctx, i64 module_ctx, i32) -> i32 {\n\
             block0(v0: i64, v1: i64, v2: i32):\n    \
             v4 = iconst.i32 1\n    \
             v5 = iadd v2, v4\n    \
             jump block1(v5)\n\
             \n\
             block1(v3: i32):\n    \
             return v3\n\
             }\n"
        );
    }

    #[test]
    fn small2() {
        // Same as above, but with an explicit return instruction.
        const BODY: [u8; 7] = [
            0x20, 0x00, // local.get 0
            0x41, 0x01, // i32.const 1
            0x6a, // i32.add
            0x0f, // return
            0x0b, // end
        ];
        let module = single_func_module(
            FunctionType {
                params: vec![ValType::I32],
                results: vec![ValType::I32],
            },
            vec![],
            &BODY,
        );
        let func = translate_one(&module, 0);
        // The explicit return makes the return block unreachable; it never
        // enters the layout.
        assert_eq!(
            func.display().to_string(),
            "function u0:0(i64 exec_ctx, i64 module_ctx, i32) -> i32 {\n\
             block0(v0: i64, v1: i64, v2: i32):\n    \
             v4 = iconst.i32 1\n    \
             v5 = iadd v2, v4\n    \
             return v5\n\
             }\n"
        );
    }

    #[test]
    fn infloop() {
        // An infinite loop, no return instructions.
        //
        // (func $infloop (result i32)
        //     (local i32)
        //     (loop (result i32)
        //         (i32.add (local.get 0) (i32.const 1))
        //         (local.set 0)
        //         (br 0)
        //     )
        // )
        const BODY: [u8; 13] = [
            0x03, 0x7f, // loop i32
            0x20, 0x00, // local.get 0
            0x41, 0x01, // i32.const 1
            0x6a, // i32.add
            0x21, 0x00, // local.set 0
            0x0c, 0x00, // br 0
            0x0b, // end
            0x0b, // end
        ];
        let module = single_func_module(
            FunctionType {
                params: vec![],
                results: vec![ValType::I32],
            },
            vec![ValType::I32],
            &BODY,
        );
        let func = translate_one(&module, 0);
        // The loop header is the back-edge target; the local redefined in
        // the body forces a header parameter.
        let header = func.layout.blocks().nth(1).unwrap();
        assert_eq!(func.dfg.block_params(header).len(), 1);
        // No return instruction: the function end is unreachable.
        let text = func.display().to_string();
        assert!(!text.contains("return"), "{text}");
    }
}
