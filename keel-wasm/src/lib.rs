//! Translation from WebAssembly function bodies to keel SSA IR.
//!
//! The input is a validated in-memory [`Module`](module::Module): this
//! crate contains no binary decoder or validator for whole modules, only
//! the per-function bytecode reader the lowering pass drives. Each function
//! body is translated in one pass, opcode by opcode, into an SSA
//! control-flow graph built through `keel-frontend`.
//!
//! Two main data structures are used during translation: the value stack
//! and the control stack. The value stack mimics the execution of the
//! WebAssembly stack machine: each instruction result is pushed onto the
//! stack and instruction arguments are popped off. When encountering a
//! control-flow structure, a frame is pushed onto the control stack and
//! popped at the corresponding `end`.
//!
//! The generated code follows the module-context ABI: every function takes
//! the execution context pointer and its module context pointer as leading
//! arguments, reads memories, tables, globals and imported functions at
//! fixed byte offsets from the module context
//! ([`vmoffsets::ModuleContextOffsets`]), and reports traps by exiting to
//! the runtime with a stable [`keel_ir::ExitCode`].

#![deny(missing_docs)]

pub mod code_translator;
pub mod environ;
pub mod func_translator;
pub mod module;
pub mod module_translator;
pub mod operators;
pub mod reader;
pub mod signatures;
pub mod state;
pub mod translation_utils;
pub mod vmoffsets;

pub use crate::environ::{FuncEnvironment, WasmError, WasmResult};
pub use crate::func_translator::FuncTranslator;
pub use crate::module::Module;
pub use crate::module_translator::translate_module;
pub use crate::signatures::SignatureCatalog;
pub use crate::translation_utils::{FuncIndex, GlobalIndex, MemoryIndex, TableIndex, TypeIndex};
pub use crate::vmoffsets::ModuleContextOffsets;
