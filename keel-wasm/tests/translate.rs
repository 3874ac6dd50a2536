//! End-to-end translation tests over hand-encoded function bodies.
//!
//! Each test builds a small validated module, lowers it and checks the
//! produced IR, mostly through its stable textual form.

use cranelift_entity::EntityRef;
use keel_ir::verifier::verify_function;
use keel_ir::Function;
use keel_wasm::module::{
    FunctionBody, FunctionType, GlobalType, Import, ImportKind, MemoryType, TableType, ValType,
};
use keel_wasm::translation_utils::TypeIndex;
use keel_wasm::{translate_module, Module};

fn translate(module: &Module) -> Vec<Function> {
    let functions = translate_module(module, false).expect("translation failed");
    for func in &functions {
        verify_function(func).unwrap_or_else(|errors| panic!("{}\n{errors}", func.display()));
    }
    functions
}

fn one_func(ty: FunctionType, locals: Vec<ValType>, body: &[u8]) -> Module {
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

fn ty(params: &[ValType], results: &[ValType]) -> FunctionType {
    FunctionType {
        params: params.to_vec(),
        results: results.to_vec(),
    }
}

#[test]
fn empty_function() {
    // (func)
    let module = one_func(ty(&[], &[]), vec![], &[0x0b]);
    let func = &translate(&module)[0];
    assert_eq!(
        func.display().to_string(),
        "function u0:0(i64 exec_ctx, i64 module_ctx) {\n\
         block0(v0: i64, v1: i64):\n    \
         jump block1\n\
         \n\
         block1:\n    \
         return\n\
         }\n"
    );
}

#[test]
fn add_two_parameters() {
    // (func (param i32 i32) (result i32)
    //     local.get 0  local.get 1  i32.add)
    let module = one_func(
        ty(&[ValType::I32, ValType::I32], &[ValType::I32]),
        vec![],
        &[0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b],
    );
    let func = &translate(&module)[0];
    assert_eq!(
        func.display().to_string(),
        "function u0:0(i64 exec_ctx, i64 module_ctx, i32, i32) -> i32 {\n\
         block0(v0: i64, v1: i64, v2: i32, v3: i32):\n    \
         v5 = iadd v2, v3\n    \
         jump block1(v5)\n\
         \n\
         block1(v4: i32):\n    \
         return v4\n\
         }\n"
    );
}

#[test]
fn infinite_loop() {
    // (func (loop $l (br $l)))
    let module = one_func(ty(&[], &[]), vec![], &[0x03, 0x40, 0x0c, 0x00, 0x0b, 0x0b]);
    let func = &translate(&module)[0];
    // The loop header's predecessors are the entry and its own back edge;
    // everything after the loop is unreachable and never materializes.
    assert_eq!(
        func.display().to_string(),
        "function u0:0(i64 exec_ctx, i64 module_ctx) {\n\
         block0(v0: i64, v1: i64):\n    \
         jump block2\n\
         \n\
         block2:\n    \
         jump block2\n\
         }\n"
    );
}

#[test]
fn if_else_with_result() {
    // (func (result i32)
    //     i32.const 0
    //     if (result i32) i32.const 11 else i32.const 22 end)
    let module = one_func(
        ty(&[], &[ValType::I32]),
        vec![],
        &[0x41, 0x00, 0x04, 0x7f, 0x41, 0x0b, 0x05, 0x41, 0x16, 0x0b, 0x0b],
    );
    let func = &translate(&module)[0];
    assert_eq!(
        func.display().to_string(),
        "function u0:0(i64 exec_ctx, i64 module_ctx) -> i32 {\n\
         block0(v0: i64, v1: i64):\n    \
         v3 = iconst.i32 0\n    \
         brz v3, block3\n    \
         jump block2\n\
         \n\
         block2:\n    \
         v5 = iconst.i32 11\n    \
         jump block4(v5)\n\
         \n\
         block3:\n    \
         v6 = iconst.i32 22\n    \
         jump block4(v6)\n\
         \n\
         block4(v4: i32):\n    \
         jump block1(v4)\n\
         \n\
         block1(v2: i32):\n    \
         return v2\n\
         }\n"
    );
}

#[test]
fn load_emits_bounds_check() {
    // (func (param i32) (result i32) local.get 0 i32.load)
    let mut module = one_func(
        ty(&[ValType::I32], &[ValType::I32]),
        vec![],
        &[0x20, 0x00, 0x28, 0x02, 0x00, 0x0b],
    );
    module.memories.push(MemoryType {
        minimum: 1,
        maximum: None,
    });
    let func = &translate(&module)[0];
    // The length comparison and conditional exit dominate the load, in the
    // same block; the 32-bit length field is read zero-extended.
    assert_eq!(
        func.display().to_string(),
        "function u0:0(i64 exec_ctx, i64 module_ctx, i32) -> i32 {\n\
         block0(v0: i64, v1: i64, v2: i32):\n    \
         v4 = iconst.i64 4\n    \
         v5 = uextend.32_64 v2\n    \
         v6 = uload32.i64 v1+8\n    \
         v7 = iadd v5, v4\n    \
         v8 = icmp ult v6, v7\n    \
         exit_if_true v8, v0, memory_out_of_bounds\n    \
         v9 = load.i64 v1\n    \
         v10 = iadd v9, v5\n    \
         v11 = load.i32 v10\n    \
         jump block1(v11)\n\
         \n\
         block1(v3: i32):\n    \
         return v3\n\
         }\n"
    );
}

#[test]
fn br_table_goes_through_trampolines() {
    // (func (param i32)
    //     (block (block (block
    //         local.get 0
    //         br_table 0 1 2))))
    let module = one_func(
        ty(&[ValType::I32], &[]),
        vec![],
        &[
            0x02, 0x40, // block
            0x02, 0x40, // block
            0x02, 0x40, // block
            0x20, 0x00, // local.get 0
            0x0e, 0x02, 0x00, 0x01, 0x02, // br_table [0 1] default 2
            0x0b, 0x0b, 0x0b, // ends
            0x0b, // end
        ],
    );
    let func = &translate(&module)[0];
    // One trampoline per distinct label (the default first), each holding
    // the only jump to its real target.
    assert_eq!(
        func.display().to_string(),
        "function u0:0(i64 exec_ctx, i64 module_ctx, i32) {\n    \
         jt0 = jump_table [block6, block7], default block5\n\
         \n\
         block0(v0: i64, v1: i64, v2: i32):\n    \
         br_table v2, jt0\n\
         \n\
         block5:\n    \
         jump block2\n\
         \n\
         block6:\n    \
         jump block4\n\
         \n\
         block7:\n    \
         jump block3\n\
         \n\
         block4:\n    \
         jump block3\n\
         \n\
         block3:\n    \
         jump block2\n\
         \n\
         block2:\n    \
         jump block1\n\
         \n\
         block1:\n    \
         return\n\
         }\n"
    );
}

#[test]
fn br_table_with_arguments() {
    // (func (param i32) (result i32)
    //     (block (result i32)
    //         i32.const 7
    //         local.get 0
    //         br_table 0 0))
    let module = one_func(
        ty(&[ValType::I32], &[ValType::I32]),
        vec![],
        &[
            0x02, 0x7f, // block (result i32)
            0x41, 0x07, // i32.const 7
            0x20, 0x00, // local.get 0
            0x0e, 0x01, 0x00, 0x00, // br_table [0] default 0
            0x0b, // end
            0x0b, // end
        ],
    );
    let func = &translate(&module)[0];
    // Both table entries share one trampoline, which carries the block
    // result to the merge point.
    assert_eq!(
        func.display().to_string(),
        "function u0:0(i64 exec_ctx, i64 module_ctx, i32) -> i32 {\n    \
         jt0 = jump_table [block3], default block3\n\
         \n\
         block0(v0: i64, v1: i64, v2: i32):\n    \
         v5 = iconst.i32 7\n    \
         br_table v2, jt0\n\
         \n\
         block3:\n    \
         jump block2(v5)\n\
         \n\
         block2(v4: i32):\n    \
         jump block1(v4)\n\
         \n\
         block1(v3: i32):\n    \
         return v3\n\
         }\n"
    );
}

#[test]
fn loop_with_parameters() {
    // (func (param i32) (result i32) local.get 0 (loop (type 0)))
    // The loop's block type is (param i32) (result i32): the body sees the
    // header's parameter, and the value flows on through the merge points.
    let module = one_func(
        ty(&[ValType::I32], &[ValType::I32]),
        vec![],
        &[0x20, 0x00, 0x03, 0x00, 0x0b, 0x0b],
    );
    let func = &translate(&module)[0];
    assert_eq!(
        func.display().to_string(),
        "function u0:0(i64 exec_ctx, i64 module_ctx, i32) -> i32 {\n\
         block0(v0: i64, v1: i64, v2: i32):\n    \
         jump block2(v2)\n\
         \n\
         block2(v4: i32):\n    \
         jump block3(v4)\n\
         \n\
         block3(v5: i32):\n    \
         jump block1(v5)\n\
         \n\
         block1(v3: i32):\n    \
         return v3\n\
         }\n"
    );
}

#[test]
fn br_if_carries_arguments() {
    // (func (param i32) (result i32)
    //     i32.const 5  local.get 0  br_if 0  drop  i32.const 6)
    let module = one_func(
        ty(&[ValType::I32], &[ValType::I32]),
        vec![],
        &[0x41, 0x05, 0x20, 0x00, 0x0d, 0x00, 0x1a, 0x41, 0x06, 0x0b],
    );
    let func = &translate(&module)[0];
    let text = func.display().to_string();
    // The conditional branch to the return block carries the would-be
    // result; the fallthrough continues in a fresh block.
    assert!(text.contains("brnz v2, block1(v4)"), "{text}");
    assert!(text.contains("jump block2"), "{text}");
}

#[test]
fn unreachable_then_arm_restores_at_else() {
    // (func (result i32)
    //     i32.const 1
    //     if (result i32) i32.const 2 return else i32.const 3 end)
    let module = one_func(
        ty(&[], &[ValType::I32]),
        vec![],
        &[
            0x41, 0x01, // i32.const 1
            0x04, 0x7f, // if (result i32)
            0x41, 0x02, // i32.const 2
            0x0f, // return
            0x05, // else
            0x41, 0x03, // i32.const 3
            0x0b, 0x0b, // end, end
        ],
    );
    let func = &translate(&module)[0];
    let text = func.display().to_string();
    // The consequent ends in a return; the alternative is still reachable
    // through the conditional branch and merges alone.
    assert!(text.contains("return v5"), "{text}");
    assert!(text.contains("jump block4(v6)"), "{text}");
}

#[test]
fn if_without_else_synthesizes_the_empty_arm() {
    // (func (param i32) (result i32) local.get 0 if nop end i32.const 9)
    let module = one_func(
        ty(&[ValType::I32], &[ValType::I32]),
        vec![],
        &[0x20, 0x00, 0x04, 0x40, 0x01, 0x0b, 0x41, 0x09, 0x0b],
    );
    let func = &translate(&module)[0];
    let text = func.display().to_string();
    // Both arms jump to the merge block: the then arm explicitly, the
    // synthesized else arm with the same (empty) arguments.
    assert_eq!(text.matches("jump block4").count(), 2, "{text}");
}

#[test]
fn select_and_trapping_division() {
    // (func (param i32 i32 i32) (result i32)
    //     local.get 0 local.get 1 local.get 2 select)
    let module = one_func(
        ty(
            &[ValType::I32, ValType::I32, ValType::I32],
            &[ValType::I32],
        ),
        vec![],
        &[0x20, 0x00, 0x20, 0x01, 0x20, 0x02, 0x1b, 0x0b],
    );
    let func = &translate(&module)[0];
    let text = func.display().to_string();
    assert!(text.contains("select v4, v2, v3"), "{text}");

    // (func (param i32 i32) (result i32) local.get 0 local.get 1 i32.div_s)
    // Division carries the execution context so the code generator can
    // emit the zero/overflow exits.
    let module = one_func(
        ty(&[ValType::I32, ValType::I32], &[ValType::I32]),
        vec![],
        &[0x20, 0x00, 0x20, 0x01, 0x6d, 0x0b],
    );
    let func = &translate(&module)[0];
    let text = func.display().to_string();
    assert!(text.contains("sdiv v2, v3, v0"), "{text}");
}

#[test]
fn global_reads_are_cached_on_linear_paths() {
    // (func (result i32) global.get 0 global.get 0 i32.add)
    let mut module = one_func(
        ty(&[], &[ValType::I32]),
        vec![],
        &[0x23, 0x00, 0x23, 0x00, 0x6a, 0x0b],
    );
    module.globals.push(GlobalType {
        value_type: ValType::I32,
        mutable: true,
    });
    let func = &translate(&module)[0];
    let text = func.display().to_string();
    // One load of the global instance pointer and one of the value; the
    // second read hits the cache.
    assert_eq!(text.matches("load.i32").count(), 1, "{text}");
}

#[test]
fn calls_reload_mutable_globals() {
    // f0: (func (result i32) global.get 0 drop call 1 global.get 0)
    // f1: (func)
    let module = Module {
        types: vec![ty(&[], &[ValType::I32]), ty(&[], &[])],
        functions: vec![TypeIndex::new(0), TypeIndex::new(1)],
        code: vec![
            FunctionBody {
                locals: vec![],
                body: vec![0x23, 0x00, 0x1a, 0x10, 0x01, 0x23, 0x00, 0x0b],
            },
            FunctionBody {
                locals: vec![],
                body: vec![0x0b],
            },
        ],
        globals: vec![GlobalType {
            value_type: ValType::I32,
            mutable: true,
        }],
        ..Default::default()
    };
    let funcs = translate(&module);
    let text = funcs[0].display().to_string();
    // The module context is stored into the caller slot before the call.
    assert!(text.contains("store v1, v0+8"), "{text}");
    // Direct call of a defined function: context pointers prepended.
    assert!(text.contains("call fn0(v0, v1)"), "{text}");
    // Two value loads: the initial read and the post-call reload; the
    // read after the call hits the reloaded cache.
    assert_eq!(text.matches("load.i32").count(), 2, "{text}");
}

#[test]
fn imported_calls_go_through_the_module_context() {
    // (import "env" "f" (func)) (func call 0)
    let module = Module {
        types: vec![ty(&[], &[])],
        imports: vec![Import {
            module: "env".to_string(),
            field: "f".to_string(),
            kind: ImportKind::Function(TypeIndex::new(0)),
        }],
        functions: vec![TypeIndex::new(0)],
        code: vec![FunctionBody {
            locals: vec![],
            body: vec![0x10, 0x00, 0x0b],
        }],
        ..Default::default()
    };
    let funcs = translate(&module);
    let text = funcs[0].display().to_string();
    // Code pointer and callee module context come from this module's
    // context record; the call passes the callee's context, not ours.
    assert!(text.contains("v2 = load.i64 v1"), "{text}");
    assert!(text.contains("v3 = load.i64 v1+8"), "{text}");
    assert!(text.contains("call_indirect sig0, v2(v0, v3)"), "{text}");
}

#[test]
fn call_indirect_checks_bounds_null_and_type() {
    // (func (param i32) (result i32) local.get 0 call_indirect (type 1))
    let module = Module {
        types: vec![ty(&[ValType::I32], &[ValType::I32]), ty(&[], &[ValType::I32])],
        functions: vec![TypeIndex::new(0)],
        code: vec![FunctionBody {
            locals: vec![],
            body: vec![0x20, 0x00, 0x11, 0x01, 0x00, 0x0b],
        }],
        tables: vec![TableType {
            element: ValType::FuncRef,
            minimum: 4,
            maximum: Some(4),
        }],
        ..Default::default()
    };
    let funcs = translate(&module);
    let text = funcs[0].display().to_string();
    assert!(text.contains("table_out_of_bounds"), "{text}");
    assert!(text.contains("indirect_call_null_pointer"), "{text}");
    assert!(text.contains("indirect_call_type_mismatch"), "{text}");
    // Scaling by 8: shift left by 3.
    assert!(text.contains("ishl"), "{text}");
    // The call goes through the loaded executable pointer with the
    // callee's module context.
    assert!(text.contains("call_indirect sig0"), "{text}");
    let exits = text.matches("exit_if_true").count();
    assert_eq!(exits, 3, "{text}");
}

#[test]
fn memory_size_and_grow() {
    // (func (result i32) i32.const 1 memory.grow)
    let mut module = one_func(
        ty(&[], &[ValType::I32]),
        vec![],
        &[0x41, 0x01, 0x40, 0x00, 0x0b],
    );
    module.memories.push(MemoryType {
        minimum: 1,
        maximum: None,
    });
    let func = &translate(&module)[0];
    let text = func.display().to_string();
    // Grow calls the trampoline loaded from the execution context, after
    // storing the caller module context; base and length are reloaded.
    assert!(text.contains("store v1, v0+8"), "{text}");
    assert!(text.contains("load.i64 v0+16"), "{text}");
    assert!(text.contains("call_indirect sig0"), "{text}");
    assert!(text.contains("uload32.i64 v1+8"), "{text}");

    // (func (result i32) memory.size)
    let mut module = one_func(ty(&[], &[ValType::I32]), vec![], &[0x3f, 0x00, 0x0b]);
    module.memories.push(MemoryType {
        minimum: 1,
        maximum: None,
    });
    let func = &translate(&module)[0];
    let text = func.display().to_string();
    assert!(text.contains("ushr"), "{text}");
    assert!(text.contains("ireduce.i32"), "{text}");
}

#[test]
fn unsupported_operators_are_reported() {
    // (func memory.copy) in a module with a memory.
    let mut module = one_func(
        ty(&[], &[]),
        vec![],
        &[0x41, 0x00, 0x41, 0x00, 0x41, 0x00, 0xfc, 0x0a, 0x00, 0x00, 0x0b],
    );
    module.memories.push(MemoryType {
        minimum: 1,
        maximum: None,
    });
    let err = translate_module(&module, false).unwrap_err();
    assert!(err.to_string().contains("bulk memory"), "{err}");
}
