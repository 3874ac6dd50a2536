//! Byte offsets into the runtime's context records.
//!
//! Compiled code never sees the runtime's data structures as types; it
//! reads them at constant byte offsets from two opaque pointers passed to
//! every function:
//!
//! - the *execution context*, shared across a call chain, holding the
//!   caller's module context slot and the trampoline addresses
//!   (fixed offsets, see the `EXEC_CTX_*` constants);
//! - the *module context*, one per instantiated module, holding memories,
//!   tables, globals and imported-function records at offsets computed
//!   here from the module's import and definition counts.
//!
//! The module context layout is, in order:
//!
//! ```text
//! [imported function records]   24 bytes each: code ptr, module ctx, type id
//! [local memory records]        16 bytes each: base ptr, 32-bit length
//! [imported memory pointers]     8 bytes each: ptr to a memory instance
//! [table pointers]               8 bytes each: ptr to a table instance
//! [global pointers]              8 bytes each: ptr to a global instance
//! [type ids pointer]             8 bytes: ptr to the type-ID array
//! ```
//!
//! The layout is a pure function of the module, so separately compiled
//! functions of the same module agree on every offset.

use crate::module::Module;
use crate::translation_utils::{FuncIndex, GlobalIndex, MemoryIndex, TableIndex};
use cranelift_entity::EntityRef;

/// Offset of the caller-module-context slot in the execution context.
/// Stored by compiled code before every call. Offset 0 holds the runtime's
/// exit-code slot and is not touched by compiled code.
pub const EXEC_CTX_CALLER_MODULE_CONTEXT_OFFSET: u32 = 8;

/// Offset of the memory-grow trampoline address in the execution context.
/// The trampoline takes `(exec_ctx, pages)` and returns the previous page
/// count.
pub const EXEC_CTX_MEMORY_GROW_TRAMPOLINE_OFFSET: u32 = 16;

/// Offset of the check-module-exit trampoline address in the execution
/// context. The trampoline takes `(exec_ctx)` and returns nothing.
pub const EXEC_CTX_CHECK_MODULE_EXIT_TRAMPOLINE_OFFSET: u32 = 24;

/// Memory instance record: buffer base pointer.
pub const MEMORY_INSTANCE_BUF_OFFSET: u32 = 0;
/// Memory instance record: buffer size in bytes, as a 64-bit integer.
pub const MEMORY_INSTANCE_LEN_OFFSET: u32 = 8;

/// Table instance record: base of the references array.
pub const TABLE_INSTANCE_BASE_OFFSET: u32 = 0;
/// Table instance record: length in elements, as a 64-bit integer.
pub const TABLE_INSTANCE_LEN_OFFSET: u32 = 8;

/// Global instance record: the value. The first 8 bytes of the record
/// belong to the runtime.
pub const GLOBAL_INSTANCE_VALUE_OFFSET: u32 = 8;

/// Function instance record: address of the compiled code.
pub const FUNCTION_INSTANCE_EXECUTABLE_OFFSET: u32 = 0;
/// Function instance record: the function's module context.
pub const FUNCTION_INSTANCE_MODULE_CTX_OFFSET: u32 = 8;
/// Function instance record: the function's 32-bit type ID.
pub const FUNCTION_INSTANCE_TYPE_ID_OFFSET: u32 = 16;

const IMPORTED_FUNCTION_RECORD_SIZE: u32 = 24;
const LOCAL_MEMORY_RECORD_SIZE: u32 = 16;
const POINTER_SIZE: u32 = 8;

/// The offsets of one imported-function record in the module context.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ImportedFunctionOffsets {
    /// Address of the imported function's compiled code.
    pub func_ptr: u32,
    /// The imported function's own module context.
    pub module_ctx: u32,
    /// The imported function's 32-bit type ID.
    pub type_id: u32,
}

/// Byte offsets of every field of a module's context record.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ModuleContextOffsets {
    num_imported_funcs: u32,
    num_imported_memories: u32,
    num_local_memories: u32,
    num_tables: u32,
    num_globals: u32,
    imported_functions_begin: u32,
    local_memories_begin: u32,
    imported_memories_begin: u32,
    tables_begin: u32,
    globals_begin: u32,
    type_ids_begin: u32,
    size: u32,
}

impl ModuleContextOffsets {
    /// Compute the offsets for `module`.
    pub fn new(module: &Module) -> Self {
        let num_imported_funcs = module.num_imported_funcs() as u32;
        let num_imported_memories = module.num_imported_memories() as u32;
        let num_local_memories = module.memories.len() as u32;
        let num_tables = module.num_tables() as u32;
        let num_globals = module.num_globals() as u32;

        let imported_functions_begin = 0;
        let local_memories_begin =
            imported_functions_begin + num_imported_funcs * IMPORTED_FUNCTION_RECORD_SIZE;
        let imported_memories_begin =
            local_memories_begin + num_local_memories * LOCAL_MEMORY_RECORD_SIZE;
        let tables_begin = imported_memories_begin + num_imported_memories * POINTER_SIZE;
        let globals_begin = tables_begin + num_tables * POINTER_SIZE;
        let type_ids_begin = globals_begin + num_globals * POINTER_SIZE;
        let size = type_ids_begin + POINTER_SIZE;

        Self {
            num_imported_funcs,
            num_imported_memories,
            num_local_memories,
            num_tables,
            num_globals,
            imported_functions_begin,
            local_memories_begin,
            imported_memories_begin,
            tables_begin,
            globals_begin,
            type_ids_begin,
            size,
        }
    }

    /// Total size of the module context record in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Offsets of the record for imported function `func`.
    pub fn imported_function(&self, func: FuncIndex) -> ImportedFunctionOffsets {
        let index = func.index() as u32;
        debug_assert!(index < self.num_imported_funcs, "{func} is not imported");
        let begin = self.imported_functions_begin + index * IMPORTED_FUNCTION_RECORD_SIZE;
        ImportedFunctionOffsets {
            func_ptr: begin,
            module_ctx: begin + 8,
            type_id: begin + 16,
        }
    }

    /// Offset of the base pointer of the `def_index`th defined memory.
    pub fn local_memory_base(&self, def_index: u32) -> u32 {
        debug_assert!(def_index < self.num_local_memories);
        self.local_memories_begin + def_index * LOCAL_MEMORY_RECORD_SIZE
    }

    /// Offset of the 32-bit byte length of the `def_index`th defined
    /// memory.
    pub fn local_memory_len(&self, def_index: u32) -> u32 {
        self.local_memory_base(def_index) + 8
    }

    /// Offset of the pointer to the memory instance of imported memory
    /// `memory`.
    pub fn imported_memory(&self, memory: MemoryIndex) -> u32 {
        let index = memory.index() as u32;
        debug_assert!(index < self.num_imported_memories, "{memory} is not imported");
        self.imported_memories_begin + index * POINTER_SIZE
    }

    /// Offset of the pointer to the table instance of `table`.
    pub fn table(&self, table: TableIndex) -> u32 {
        let index = table.index() as u32;
        debug_assert!(index < self.num_tables);
        self.tables_begin + index * POINTER_SIZE
    }

    /// Offset of the pointer to the global instance of `global`.
    pub fn global(&self, global: GlobalIndex) -> u32 {
        let index = global.index() as u32;
        debug_assert!(index < self.num_globals);
        self.globals_begin + index * POINTER_SIZE
    }

    /// Offset of the pointer to the first element of the type-ID array.
    pub fn type_ids(&self) -> u32 {
        self.type_ids_begin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{
        FunctionType, GlobalType, Import, ImportKind, MemoryType, TableType, ValType,
    };
    use crate::translation_utils::TypeIndex;

    fn test_module() -> Module {
        Module {
            types: vec![FunctionType::default()],
            imports: vec![
                Import {
                    module: "env".to_string(),
                    field: "f0".to_string(),
                    kind: ImportKind::Function(TypeIndex::new(0)),
                },
                Import {
                    module: "env".to_string(),
                    field: "f1".to_string(),
                    kind: ImportKind::Function(TypeIndex::new(0)),
                },
                Import {
                    module: "env".to_string(),
                    field: "g".to_string(),
                    kind: ImportKind::Global(GlobalType {
                        value_type: ValType::I64,
                        mutable: true,
                    }),
                },
            ],
            memories: vec![MemoryType {
                minimum: 1,
                maximum: None,
            }],
            tables: vec![TableType {
                element: ValType::FuncRef,
                minimum: 4,
                maximum: Some(4),
            }],
            globals: vec![GlobalType {
                value_type: ValType::I32,
                mutable: false,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn layout_is_sequential_and_disjoint() {
        let offsets = ModuleContextOffsets::new(&test_module());

        let f0 = offsets.imported_function(FuncIndex::new(0));
        let f1 = offsets.imported_function(FuncIndex::new(1));
        assert_eq!(f0.func_ptr, 0);
        assert_eq!(f0.module_ctx, 8);
        assert_eq!(f0.type_id, 16);
        assert_eq!(f1.func_ptr, 24);

        assert_eq!(offsets.local_memory_base(0), 48);
        assert_eq!(offsets.local_memory_len(0), 56);
        assert_eq!(offsets.table(TableIndex::new(0)), 64);
        assert_eq!(offsets.global(GlobalIndex::new(0)), 72);
        assert_eq!(offsets.global(GlobalIndex::new(1)), 80);
        assert_eq!(offsets.type_ids(), 88);
        assert_eq!(offsets.size(), 96);
    }

    #[test]
    fn deterministic() {
        let module = test_module();
        assert_eq!(
            ModuleContextOffsets::new(&module),
            ModuleContextOffsets::new(&module)
        );
    }
}
