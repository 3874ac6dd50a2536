//! The validated in-memory module consumed by the translator.
//!
//! Decoding and validating the binary format happen upstream; the
//! translator trusts this structure and treats inconsistencies in it as
//! unrecoverable bugs. Index spaces follow the WebAssembly convention:
//! imports come first in the function, memory, table and global index
//! spaces, followed by the module's own definitions.

use crate::translation_utils::{FuncIndex, GlobalIndex, MemoryIndex, TableIndex, TypeIndex};
use cranelift_entity::EntityRef;

/// A WebAssembly value type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 128-bit vector.
    V128,
    /// Reference to a function.
    FuncRef,
    /// Reference to a host object.
    ExternRef,
}

/// A function type: parameters and results.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct FunctionType {
    /// Parameter types, in order.
    pub params: Vec<ValType>,
    /// Result types, in order.
    pub results: Vec<ValType>,
}

/// A global's type: its value type and mutability.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct GlobalType {
    /// Type of the global's value.
    pub value_type: ValType,
    /// May the global be written after instantiation?
    pub mutable: bool,
}

/// A linear memory's limits, in 64KiB pages.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct MemoryType {
    /// Initial size in pages.
    pub minimum: u32,
    /// Optional maximum size in pages.
    pub maximum: Option<u32>,
}

/// A table's element type and limits.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TableType {
    /// The element type; a reference type.
    pub element: ValType,
    /// Initial size in elements.
    pub minimum: u32,
    /// Optional maximum size in elements.
    pub maximum: Option<u32>,
}

/// What an import provides.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ImportKind {
    /// A function with the given type.
    Function(TypeIndex),
    /// A linear memory.
    Memory(MemoryType),
    /// A table.
    Table(TableType),
    /// A global.
    Global(GlobalType),
}

/// One entry of the import section.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Import {
    /// Name of the module providing the import.
    pub module: String,
    /// Name of the imported item within that module.
    pub field: String,
    /// What is imported.
    pub kind: ImportKind,
}

/// The locals and body of one defined function.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct FunctionBody {
    /// Declared local types, already expanded from the binary format's
    /// run-length encoding. Parameters are not included.
    pub locals: Vec<ValType>,
    /// The body expression: raw bytecode up to and including the final
    /// `end` opcode.
    pub body: Vec<u8>,
}

/// A validated WebAssembly module, reduced to the sections the translator
/// consumes.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// The type section.
    pub types: Vec<FunctionType>,
    /// The import section, in declaration order.
    pub imports: Vec<Import>,
    /// For each defined function, its index into `types`.
    pub functions: Vec<TypeIndex>,
    /// For each defined function, its locals and body.
    pub code: Vec<FunctionBody>,
    /// Defined globals.
    pub globals: Vec<GlobalType>,
    /// Defined memories.
    pub memories: Vec<MemoryType>,
    /// Defined tables.
    pub tables: Vec<TableType>,
}

impl Module {
    /// The number of imported functions.
    pub fn num_imported_funcs(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.kind, ImportKind::Function(_)))
            .count()
    }

    /// The number of imported memories.
    pub fn num_imported_memories(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.kind, ImportKind::Memory(_)))
            .count()
    }

    /// The number of imported tables.
    pub fn num_imported_tables(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.kind, ImportKind::Table(_)))
            .count()
    }

    /// The number of imported globals.
    pub fn num_imported_globals(&self) -> usize {
        self.imports
            .iter()
            .filter(|i| matches!(i.kind, ImportKind::Global(_)))
            .count()
    }

    /// The number of functions in the function index space.
    pub fn num_funcs(&self) -> usize {
        self.num_imported_funcs() + self.functions.len()
    }

    /// The number of globals in the global index space.
    pub fn num_globals(&self) -> usize {
        self.num_imported_globals() + self.globals.len()
    }

    /// The number of memories in the memory index space.
    pub fn num_memories(&self) -> usize {
        self.num_imported_memories() + self.memories.len()
    }

    /// The number of tables in the table index space.
    pub fn num_tables(&self) -> usize {
        self.num_imported_tables() + self.tables.len()
    }

    /// Does the module have a linear memory at all?
    pub fn has_memory(&self) -> bool {
        self.num_memories() > 0
    }

    /// Is the memory at `index` imported?
    pub fn is_imported_memory(&self, index: MemoryIndex) -> bool {
        index.index() < self.num_imported_memories()
    }

    /// The position of `func` among the defined functions, or `None` for
    /// an imported function.
    pub fn defined_func_index(&self, func: FuncIndex) -> Option<usize> {
        func.index().checked_sub(self.num_imported_funcs())
    }

    /// The type index of any function, imported or defined.
    pub fn func_type_index(&self, func: FuncIndex) -> TypeIndex {
        let imported = func.index();
        let mut seen = 0;
        for import in &self.imports {
            if let ImportKind::Function(ty) = import.kind {
                if seen == imported {
                    return ty;
                }
                seen += 1;
            }
        }
        self.functions[func.index() - seen]
    }

    /// The type of any function, imported or defined.
    pub fn func_type(&self, func: FuncIndex) -> &FunctionType {
        &self.types[self.func_type_index(func).index()]
    }

    /// The type of any global, imported or defined.
    pub fn global_type(&self, global: GlobalIndex) -> GlobalType {
        let mut seen = 0;
        for import in &self.imports {
            if let ImportKind::Global(ty) = import.kind {
                if seen == global.index() {
                    return ty;
                }
                seen += 1;
            }
        }
        self.globals[global.index() - seen]
    }

    /// The type of any table, imported or defined.
    pub fn table_type(&self, table: TableIndex) -> TableType {
        let mut seen = 0;
        for import in &self.imports {
            if let ImportKind::Table(ty) = import.kind {
                if seen == table.index() {
                    return ty;
                }
                seen += 1;
            }
        }
        self.tables[table.index() - seen]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_spaces_put_imports_first() {
        let module = Module {
            types: vec![
                FunctionType {
                    params: vec![ValType::I32],
                    results: vec![],
                },
                FunctionType {
                    params: vec![],
                    results: vec![ValType::I64],
                },
            ],
            imports: vec![
                Import {
                    module: "env".to_string(),
                    field: "f".to_string(),
                    kind: ImportKind::Function(TypeIndex::new(0)),
                },
                Import {
                    module: "env".to_string(),
                    field: "g".to_string(),
                    kind: ImportKind::Global(GlobalType {
                        value_type: ValType::I32,
                        mutable: true,
                    }),
                },
            ],
            functions: vec![TypeIndex::new(1)],
            globals: vec![GlobalType {
                value_type: ValType::F64,
                mutable: false,
            }],
            ..Default::default()
        };

        assert_eq!(module.num_imported_funcs(), 1);
        assert_eq!(module.num_funcs(), 2);
        assert_eq!(module.func_type_index(FuncIndex::new(0)), TypeIndex::new(0));
        assert_eq!(module.func_type_index(FuncIndex::new(1)), TypeIndex::new(1));
        assert_eq!(module.defined_func_index(FuncIndex::new(0)), None);
        assert_eq!(module.defined_func_index(FuncIndex::new(1)), Some(0));
        assert!(module.global_type(GlobalIndex::new(0)).mutable);
        assert_eq!(
            module.global_type(GlobalIndex::new(1)).value_type,
            ValType::F64
        );
    }
}
