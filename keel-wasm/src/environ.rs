//! Translation errors and the per-function environment.
//!
//! `FuncEnvironment` is where the module-context ABI lives: it knows the
//! offsets of memories, tables, globals and imported functions, owns the
//! caching discipline for memory base/length and globals, and emits the
//! heavyweight sequences (bounds checks, indirect calls, trampoline calls)
//! that the opcode dispatcher requests.

use crate::module::Module;
use crate::signatures::SignatureCatalog;
use crate::state::TranslationState;
use crate::translation_utils::{type_id_offset, value_type, GlobalIndex, MemoryIndex, TableIndex, TypeIndex};
use crate::vmoffsets::{
    ModuleContextOffsets, EXEC_CTX_CALLER_MODULE_CONTEXT_OFFSET,
    EXEC_CTX_CHECK_MODULE_EXIT_TRAMPOLINE_OFFSET, EXEC_CTX_MEMORY_GROW_TRAMPOLINE_OFFSET,
    FUNCTION_INSTANCE_EXECUTABLE_OFFSET, FUNCTION_INSTANCE_MODULE_CTX_OFFSET,
    FUNCTION_INSTANCE_TYPE_ID_OFFSET, GLOBAL_INSTANCE_VALUE_OFFSET, MEMORY_INSTANCE_BUF_OFFSET,
    MEMORY_INSTANCE_LEN_OFFSET, TABLE_INSTANCE_BASE_OFFSET, TABLE_INSTANCE_LEN_OFFSET,
};
use cranelift_entity::EntityRef;
use keel_frontend::{FunctionBuilder, Variable};
use keel_ir::{ExitCode, IntCC, SigRef, Type, Value};
use thiserror::Error;

/// A translation failure.
///
/// `InvalidBytecode` means the purportedly validated input could not be
/// decoded; it indicates a bug in the validator or corrupted memory, and
/// callers must not retry. `Unsupported` names a feature outside the
/// supported opcode set; callers treat it as a permanent failure for that
/// module and feature set.
#[derive(Debug, Error)]
pub enum WasmError {
    /// A feature outside the supported set.
    #[error("unsupported WebAssembly feature: {0}")]
    Unsupported(String),
    /// Undecodable input in a validated function body.
    #[error("invalid function bytecode at offset {offset}: {message}")]
    InvalidBytecode {
        /// What could not be decoded.
        message: String,
        /// Byte offset within the function body.
        offset: usize,
    },
}

/// A convenient alias for a `Result` that uses `WasmError` as the error
/// type.
pub type WasmResult<T> = Result<T, WasmError>;

/// The environment a single function is translated against.
///
/// The module-wide parts (module, offset map, signature catalog) are
/// borrowed and shared across functions; the rest is per-function state
/// reset by [`FuncEnvironment::begin_function`].
pub struct FuncEnvironment<'module> {
    module: &'module Module,
    offsets: &'module ModuleContextOffsets,
    catalog: &'module SignatureCatalog,
    termination_checks: bool,

    // Per-function state.
    exec_ctx: Option<Value>,
    module_ctx: Option<Value>,
    globals_base: u32,
    memory_base_var: Variable,
    memory_len_var: Variable,
    grow_sig: Option<SigRef>,
    check_sig: Option<SigRef>,
}

impl<'module> FuncEnvironment<'module> {
    /// Create an environment for translating functions of `module`.
    pub fn new(
        module: &'module Module,
        offsets: &'module ModuleContextOffsets,
        catalog: &'module SignatureCatalog,
    ) -> Self {
        Self {
            module,
            offsets,
            catalog,
            termination_checks: false,
            exec_ctx: None,
            module_ctx: None,
            globals_base: 0,
            memory_base_var: Variable::with_u32(0),
            memory_len_var: Variable::with_u32(0),
            grow_sig: None,
            check_sig: None,
        }
    }

    /// Emit a check-module-exit trampoline call in every function prologue
    /// and loop header, so the runtime can interrupt long-running code.
    pub fn enable_termination_checks(&mut self) {
        self.termination_checks = true;
    }

    /// The module being translated.
    pub fn module(&self) -> &'module Module {
        self.module
    }

    /// The module-context offset map.
    pub fn offsets(&self) -> &'module ModuleContextOffsets {
        self.offsets
    }

    /// The signature catalog.
    pub fn catalog(&self) -> &'module SignatureCatalog {
        self.catalog
    }

    /// The current function's execution context pointer.
    pub fn exec_ctx(&self) -> Value {
        self.exec_ctx.expect("begin_function not called")
    }

    /// The current function's module context pointer.
    pub fn module_ctx(&self) -> Value {
        self.module_ctx.expect("begin_function not called")
    }

    /// Start a new function: record the context parameter values, bind a
    /// variable to every global and to the cached memory base and length,
    /// and emit the prologue termination check when enabled.
    ///
    /// `num_locals` is the number of variables already taken by the Wasm
    /// parameters and locals; the environment's variables are numbered
    /// after them.
    pub fn begin_function(
        &mut self,
        builder: &mut FunctionBuilder,
        exec_ctx: Value,
        module_ctx: Value,
        num_locals: u32,
    ) {
        self.exec_ctx = Some(exec_ctx);
        self.module_ctx = Some(module_ctx);
        self.globals_base = num_locals;
        self.grow_sig = None;
        self.check_sig = None;

        let num_globals = self.module.num_globals() as u32;
        for index in 0..num_globals {
            let ty = self.module.global_type(GlobalIndex::new(index as usize));
            builder.declare_var(
                Variable::with_u32(num_locals + index),
                value_type(ty.value_type),
            );
        }
        self.memory_base_var = Variable::with_u32(num_locals + num_globals);
        self.memory_len_var = Variable::with_u32(num_locals + num_globals + 1);
        builder.declare_var(self.memory_base_var, Type::I64);
        builder.declare_var(self.memory_len_var, Type::I64);

        if self.termination_checks {
            self.translate_termination_check(builder);
        }
    }

    fn global_var(&self, global: GlobalIndex) -> Variable {
        Variable::with_u32(self.globals_base + global.index() as u32)
    }

    /// Translate `global.get`: return the cached value when one is visible
    /// on a linear path, otherwise load it through the module context.
    pub fn translate_global_get(&self, builder: &mut FunctionBuilder, global_index: u32) -> Value {
        let index = GlobalIndex::new(global_index as usize);
        let var = self.global_var(index);
        if let Some(val) = builder.find_value_in_linear_path(var) {
            return val;
        }
        let val = self.load_global(builder, index);
        builder.def_var(var, val);
        val
    }

    /// Translate `global.set`: store through the module context and update
    /// the cache.
    pub fn translate_global_set(
        &self,
        builder: &mut FunctionBuilder,
        global_index: u32,
        val: Value,
    ) {
        let index = GlobalIndex::new(global_index as usize);
        let ptr = builder
            .ins()
            .load(Type::I64, self.module_ctx(), self.offsets.global(index));
        builder.ins().store(val, ptr, GLOBAL_INSTANCE_VALUE_OFFSET);
        builder.def_var(self.global_var(index), val);
    }

    fn load_global(&self, builder: &mut FunctionBuilder, index: GlobalIndex) -> Value {
        let ty = value_type(self.module.global_type(index).value_type);
        let ptr = builder
            .ins()
            .load(Type::I64, self.module_ctx(), self.offsets.global(index));
        builder.ins().load(ty, ptr, GLOBAL_INSTANCE_VALUE_OFFSET)
    }

    /// The memory base address, cached on linear paths.
    fn memory_base(&self, builder: &mut FunctionBuilder) -> Value {
        if let Some(val) = builder.find_value_in_linear_path(self.memory_base_var) {
            return val;
        }
        let val = self.load_memory_base(builder);
        builder.def_var(self.memory_base_var, val);
        val
    }

    /// The memory length in bytes as an i64, cached on linear paths.
    fn memory_len(&self, builder: &mut FunctionBuilder) -> Value {
        if let Some(val) = builder.find_value_in_linear_path(self.memory_len_var) {
            return val;
        }
        let val = self.load_memory_len(builder);
        builder.def_var(self.memory_len_var, val);
        val
    }

    fn memory_instance_ptr(&self, builder: &mut FunctionBuilder) -> Value {
        let offset = self.offsets.imported_memory(MemoryIndex::new(0));
        builder.ins().load(Type::I64, self.module_ctx(), offset)
    }

    fn load_memory_base(&self, builder: &mut FunctionBuilder) -> Value {
        if self.module.is_imported_memory(MemoryIndex::new(0)) {
            let instance = self.memory_instance_ptr(builder);
            builder
                .ins()
                .load(Type::I64, instance, MEMORY_INSTANCE_BUF_OFFSET)
        } else {
            let offset = self.offsets.local_memory_base(0);
            builder.ins().load(Type::I64, self.module_ctx(), offset)
        }
    }

    fn load_memory_len(&self, builder: &mut FunctionBuilder) -> Value {
        if self.module.is_imported_memory(MemoryIndex::new(0)) {
            let instance = self.memory_instance_ptr(builder);
            builder
                .ins()
                .load(Type::I64, instance, MEMORY_INSTANCE_LEN_OFFSET)
        } else {
            let offset = self.offsets.local_memory_len(0);
            builder.ins().uload32(Type::I64, self.module_ctx(), offset)
        }
    }

    /// Reload the cached memory base and length. Required after anything
    /// that may move the buffer: `memory.grow`, and any call (a callee may
    /// grow the memory).
    pub fn reload_memory(&self, builder: &mut FunctionBuilder) {
        if !self.module.has_memory() {
            return;
        }
        let base = self.load_memory_base(builder);
        builder.def_var(self.memory_base_var, base);
        let len = self.load_memory_len(builder);
        builder.def_var(self.memory_len_var, len);
    }

    /// Reload the cached value of every mutable global. Required after
    /// every call, since the callee may have written them.
    pub fn reload_mutable_globals(&self, builder: &mut FunctionBuilder) {
        for index in 0..self.module.num_globals() {
            let index = GlobalIndex::new(index);
            if self.module.global_type(index).mutable {
                let val = self.load_global(builder, index);
                builder.def_var(self.global_var(index), val);
            }
        }
    }

    /// Invalidate everything a callee may have touched.
    pub fn after_call(&self, builder: &mut FunctionBuilder) {
        self.reload_memory(builder);
        self.reload_mutable_globals(builder);
    }

    /// Store this function's module context into the execution context's
    /// caller slot. The ABI requires this before every call.
    pub fn store_caller_module_context(&self, builder: &mut FunctionBuilder) {
        let module_ctx = self.module_ctx();
        builder.ins().store(
            module_ctx,
            self.exec_ctx(),
            EXEC_CTX_CALLER_MODULE_CONTEXT_OFFSET,
        );
    }

    /// Compute the bounds-checked 64-bit effective address for an access
    /// of `access_size` bytes at `index + offset`.
    ///
    /// When execution continues past the emitted check, the whole accessed
    /// range lies within the memory buffer. The check and the dependent
    /// access stay in the same block, in order.
    pub fn prepare_addr(
        &self,
        builder: &mut FunctionBuilder,
        index: Value,
        offset: u32,
        access_size: u8,
    ) -> Value {
        let ceil = u64::from(offset) + u64::from(access_size);
        let ceil_const = builder.ins().iconst(Type::I64, ceil as i64);
        let ext = builder.ins().uextend(index, 32, 64);
        let mem_len = self.memory_len(builder);
        let end = builder.ins().iadd(ext, ceil_const);
        let oob = builder.ins().icmp(IntCC::UnsignedLessThan, mem_len, end);
        builder
            .ins()
            .exit_if_true(oob, self.exec_ctx(), ExitCode::MemoryOutOfBounds);
        let base = self.memory_base(builder);
        builder.ins().iadd(base, ext)
    }

    /// Translate `memory.size`: the byte length shifted down to pages.
    pub fn translate_memory_size(&self, builder: &mut FunctionBuilder) -> Value {
        let len = self.memory_len(builder);
        let page_bits = builder.ins().iconst(Type::I64, 16);
        let pages = builder.ins().ushr(len, page_bits);
        builder.ins().ireduce(Type::I32, pages)
    }

    /// Translate `memory.grow` through the runtime trampoline, then reload
    /// the cached memory base and length.
    pub fn translate_memory_grow(&mut self, builder: &mut FunctionBuilder, pages: Value) -> Value {
        self.store_caller_module_context(builder);
        let sig = self.memory_grow_sig(builder);
        let trampoline = builder.ins().load(
            Type::I64,
            self.exec_ctx(),
            EXEC_CTX_MEMORY_GROW_TRAMPOLINE_OFFSET,
        );
        let exec_ctx = self.exec_ctx();
        let call = builder
            .ins()
            .call_indirect(sig, trampoline, &[exec_ctx, pages]);
        let result = builder.inst_results(call)[0];
        self.reload_memory(builder);
        result
    }

    /// Translate `call_indirect`: table bounds check, null check, type-ID
    /// check, then the call through the function instance, with the
    /// post-call cache reload.
    pub fn translate_call_indirect(
        &mut self,
        builder: &mut FunctionBuilder,
        state: &mut TranslationState,
        type_index: u32,
        table_index: u32,
    ) -> WasmResult<()> {
        let exec_ctx = self.exec_ctx();
        let table_offset = state.pop1();
        let ext = builder.ins().uextend(table_offset, 32, 64);

        let table = TableIndex::new(table_index as usize);
        let table_ptr =
            builder
                .ins()
                .load(Type::I64, self.module_ctx(), self.offsets.table(table));
        let len = builder
            .ins()
            .load(Type::I64, table_ptr, TABLE_INSTANCE_LEN_OFFSET);
        let oob = builder
            .ins()
            .icmp(IntCC::UnsignedGreaterThanOrEqual, ext, len);
        builder
            .ins()
            .exit_if_true(oob, exec_ctx, ExitCode::TableOutOfBounds);

        let base = builder
            .ins()
            .load(Type::I64, table_ptr, TABLE_INSTANCE_BASE_OFFSET);
        let three = builder.ins().iconst(Type::I64, 3);
        let scaled = builder.ins().ishl(ext, three);
        let entry = builder.ins().iadd(base, scaled);
        let fn_instance = builder.ins().load(Type::I64, entry, 0);

        let zero = builder.ins().iconst(Type::I64, 0);
        let is_null = builder.ins().icmp(IntCC::Equal, fn_instance, zero);
        builder
            .ins()
            .exit_if_true(is_null, exec_ctx, ExitCode::IndirectCallNullPointer);

        let actual_type_id =
            builder
                .ins()
                .load(Type::I32, fn_instance, FUNCTION_INSTANCE_TYPE_ID_OFFSET);
        let type_ids = builder
            .ins()
            .load(Type::I64, self.module_ctx(), self.offsets.type_ids());
        let expected_type_id = builder.ins().load(
            Type::I32,
            type_ids,
            type_id_offset(TypeIndex::new(type_index as usize)),
        );
        let mismatch = builder
            .ins()
            .icmp(IntCC::NotEqual, actual_type_id, expected_type_id);
        builder
            .ins()
            .exit_if_true(mismatch, exec_ctx, ExitCode::IndirectCallTypeMismatch);

        let executable =
            builder
                .ins()
                .load(Type::I64, fn_instance, FUNCTION_INSTANCE_EXECUTABLE_OFFSET);
        let callee_module_ctx =
            builder
                .ins()
                .load(Type::I64, fn_instance, FUNCTION_INSTANCE_MODULE_CTX_OFFSET);
        self.store_caller_module_context(builder);

        let (sig_ref, num_args) = state.get_indirect_sig(builder.func, type_index, self);
        let mut args = Vec::with_capacity(num_args + 2);
        args.push(exec_ctx);
        args.push(callee_module_ctx);
        args.extend_from_slice(state.peekn(num_args));
        let call = builder.ins().call_indirect(sig_ref, executable, &args);
        state.popn(num_args);
        state.pushn(builder.inst_results(call));
        self.after_call(builder);
        Ok(())
    }

    /// Emit a call to the check-module-exit trampoline if termination
    /// checks are enabled. Called at function prologues and loop headers.
    pub fn translate_loop_header(&mut self, builder: &mut FunctionBuilder) {
        if self.termination_checks {
            self.translate_termination_check(builder);
        }
    }

    fn translate_termination_check(&mut self, builder: &mut FunctionBuilder) {
        let sig = self.check_module_exit_sig(builder);
        let exec_ctx = self.exec_ctx();
        let trampoline = builder.ins().load(
            Type::I64,
            exec_ctx,
            EXEC_CTX_CHECK_MODULE_EXIT_TRAMPOLINE_OFFSET,
        );
        builder.ins().call_indirect(sig, trampoline, &[exec_ctx]);
    }

    fn memory_grow_sig(&mut self, builder: &mut FunctionBuilder) -> SigRef {
        match self.grow_sig {
            Some(sig) => sig,
            None => {
                let sig = builder.import_signature(self.catalog.memory_grow_signature().clone());
                self.grow_sig = Some(sig);
                sig
            }
        }
    }

    fn check_module_exit_sig(&mut self, builder: &mut FunctionBuilder) -> SigRef {
        match self.check_sig {
            Some(sig) => sig,
            None => {
                let sig =
                    builder.import_signature(self.catalog.check_module_exit_signature().clone());
                self.check_sig = Some(sig);
                sig
            }
        }
    }
}
