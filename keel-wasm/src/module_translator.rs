//! Translation skeleton that traverses a whole module and lowers every
//! defined function.

use crate::environ::{FuncEnvironment, WasmResult};
use crate::func_translator::FuncTranslator;
use crate::module::Module;
use crate::signatures::SignatureCatalog;
use crate::translation_utils::FuncIndex;
use crate::vmoffsets::ModuleContextOffsets;
use cranelift_entity::EntityRef;
use keel_ir as ir;

/// Translate every defined function of a validated module into keel IR, in
/// function-index order.
///
/// The offset map and signature catalog are computed once and one
/// translator instance is reused across functions, so the result,
/// entity numbering included, is a deterministic function of the module. With
/// `termination_checks` enabled, every function prologue and loop header
/// calls the runtime's check-module-exit trampoline so that long-running
/// code can be interrupted.
pub fn translate_module(
    module: &Module,
    termination_checks: bool,
) -> WasmResult<Vec<ir::Function>> {
    let offsets = ModuleContextOffsets::new(module);
    let catalog = SignatureCatalog::new(module);
    let mut environ = FuncEnvironment::new(module, &offsets, &catalog);
    if termination_checks {
        environ.enable_termination_checks();
    }

    let num_imports = module.num_imported_funcs();
    let mut translator = FuncTranslator::new();
    let mut functions = Vec::with_capacity(module.functions.len());
    for def_index in 0..module.functions.len() {
        let func_index = FuncIndex::new(num_imports + def_index);
        let mut func = ir::Function::new();
        translator.translate(&mut environ, func_index, &mut func)?;
        functions.push(func);
    }
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FunctionBody, FunctionType, ValType};
    use crate::translation_utils::TypeIndex;

    #[test]
    fn translation_is_deterministic() {
        // (func (param i64) (result i64) local.get 0 local.get 0 i64.mul)
        let module = Module {
            types: vec![FunctionType {
                params: vec![ValType::I64],
                results: vec![ValType::I64],
            }],
            functions: vec![TypeIndex::new(0)],
            code: vec![FunctionBody {
                locals: vec![],
                body: vec![0x20, 0x00, 0x20, 0x00, 0x7e, 0x0b],
            }],
            ..Default::default()
        };
        let first = translate_module(&module, false).unwrap();
        let second = translate_module(&module, false).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(
            first[0].display().to_string(),
            second[0].display().to_string()
        );
    }

    #[test]
    fn termination_checks_call_the_trampoline() {
        // (func (loop br 0))
        let module = Module {
            types: vec![FunctionType::default()],
            functions: vec![TypeIndex::new(0)],
            code: vec![FunctionBody {
                locals: vec![],
                body: vec![0x03, 0x40, 0x0c, 0x00, 0x0b, 0x0b],
            }],
            ..Default::default()
        };
        let plain = translate_module(&module, false).unwrap();
        let checked = translate_module(&module, true).unwrap();
        let plain_text = plain[0].display().to_string();
        let checked_text = checked[0].display().to_string();
        assert!(!plain_text.contains("call_indirect"), "{plain_text}");
        // One check in the prologue, one in the loop header.
        assert_eq!(checked_text.matches("call_indirect").count(), 2, "{checked_text}");
    }
}
