//! The signature catalog: Wasm function types as IR signatures.
//!
//! Every compiled function takes `(exec_ctx: i64, module_ctx: i64)` ahead
//! of its Wasm parameters; the catalog performs that prepending once per
//! module type so that call sites, indirect call sites and the function
//! prologue all agree. The two runtime trampolines the generated code calls
//! through the execution context get signatures here as well.

use crate::module::{FunctionType, Module};
use crate::translation_utils::{value_type, TypeIndex};
use cranelift_entity::EntityRef;
use keel_ir::{AbiParam, ArgumentPurpose, Signature, Type};

/// The IR signatures of a module's types, plus the trampoline signatures.
#[derive(Clone, Debug)]
pub struct SignatureCatalog {
    sigs: Vec<Signature>,
    memory_grow: Signature,
    check_module_exit: Signature,
}

impl SignatureCatalog {
    /// Build the catalog for `module`.
    pub fn new(module: &Module) -> Self {
        Self {
            sigs: module.types.iter().map(wasm_signature).collect(),
            memory_grow: Signature {
                params: vec![
                    AbiParam::special(Type::I64, ArgumentPurpose::ExecutionContext),
                    AbiParam::new(Type::I32),
                ],
                returns: vec![AbiParam::new(Type::I32)],
            },
            check_module_exit: Signature {
                params: vec![AbiParam::special(
                    Type::I64,
                    ArgumentPurpose::ExecutionContext,
                )],
                returns: vec![],
            },
        }
    }

    /// The IR signature of module type `index`.
    pub fn signature(&self, index: TypeIndex) -> &Signature {
        &self.sigs[index.index()]
    }

    /// The number of Wasm-level parameters of module type `index`, i.e.
    /// excluding the two context pointers.
    pub fn num_wasm_params(&self, index: TypeIndex) -> usize {
        self.sigs[index.index()].params.len() - 2
    }

    /// The signature of the memory-grow trampoline.
    pub fn memory_grow_signature(&self) -> &Signature {
        &self.memory_grow
    }

    /// The signature of the check-module-exit trampoline.
    pub fn check_module_exit_signature(&self) -> &Signature {
        &self.check_module_exit
    }
}

/// The IR signature of a Wasm function type: the two context pointers
/// followed by the mapped parameter types.
fn wasm_signature(ty: &FunctionType) -> Signature {
    let mut params = Vec::with_capacity(ty.params.len() + 2);
    params.push(AbiParam::special(Type::I64, ArgumentPurpose::ExecutionContext));
    params.push(AbiParam::special(Type::I64, ArgumentPurpose::ModuleContext));
    params.extend(ty.params.iter().map(|&p| AbiParam::new(value_type(p))));
    Signature {
        params,
        returns: ty
            .results
            .iter()
            .map(|&r| AbiParam::new(value_type(r)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ValType;

    #[test]
    fn context_pointers_are_prepended() {
        let module = Module {
            types: vec![FunctionType {
                params: vec![ValType::I32, ValType::F64],
                results: vec![ValType::I64],
            }],
            ..Default::default()
        };
        let catalog = SignatureCatalog::new(&module);
        let sig = catalog.signature(TypeIndex::new(0));
        assert_eq!(
            sig.to_string(),
            "(i64 exec_ctx, i64 module_ctx, i32, f64) -> i64"
        );
        assert_eq!(catalog.num_wasm_params(TypeIndex::new(0)), 2);
        assert_eq!(
            catalog.memory_grow_signature().to_string(),
            "(i64 exec_ctx, i32) -> i32"
        );
        assert_eq!(
            catalog.check_module_exit_signature().to_string(),
            "(i64 exec_ctx)"
        );
    }

    #[test]
    fn vector_types_are_preserved() {
        let module = Module {
            types: vec![FunctionType {
                params: vec![ValType::V128, ValType::FuncRef],
                results: vec![ValType::V128],
            }],
            ..Default::default()
        };
        let catalog = SignatureCatalog::new(&module);
        let sig = catalog.signature(TypeIndex::new(0));
        assert_eq!(sig.params[2].value_type, Type::V128);
        assert_eq!(sig.params[3].value_type, Type::I64);
        assert_eq!(sig.returns[0].value_type, Type::V128);
    }
}
