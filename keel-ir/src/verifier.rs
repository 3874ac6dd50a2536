//! Structural verification of IR functions.
//!
//! The verifier checks the block-level invariants the rest of the pipeline
//! relies on: a single entry block whose parameters match the signature,
//! every inserted block ending in exactly one terminator, branch arguments
//! matching destination parameters in count and type, and call arguments
//! matching their signatures. It does not compute dominance; operand
//! availability is the IR builder's contract.

use crate::entities::Block;
use crate::function::Function;
use crate::instructions::InstructionData;
use crate::types::Type;
use core::fmt;

/// The accumulated complaints of a failed verification.
#[derive(Debug)]
pub struct VerifierErrors(pub Vec<String>);

impl fmt::Display for VerifierErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Verify the structural invariants of `func`.
pub fn verify_function(func: &Function) -> Result<(), VerifierErrors> {
    let mut errors = Vec::new();

    if let Some(entry) = func.layout.entry_block() {
        let entry_types: Vec<Type> = func
            .dfg
            .block_params(entry)
            .iter()
            .map(|&v| func.dfg.value_type(v))
            .collect();
        let sig_types: Vec<Type> = func.signature.params.iter().map(|p| p.value_type).collect();
        if entry_types != sig_types {
            errors.push(format!(
                "entry {entry} parameters {entry_types:?} do not match signature {sig_types:?}"
            ));
        }
    } else {
        errors.push("function has no entry block".to_string());
    }

    for block in func.layout.blocks() {
        verify_block(func, block, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(VerifierErrors(errors))
    }
}

fn verify_block(func: &Function, block: Block, errors: &mut Vec<String>) {
    let insts = func.layout.block_insts(block);
    match insts.last() {
        None => {
            errors.push(format!("{block} is in the layout but empty"));
            return;
        }
        Some(&last) => {
            if !func.dfg.inst_data(last).opcode().is_terminator() {
                errors.push(format!(
                    "{block} ends in non-terminator {}",
                    func.dfg.inst_data(last).opcode()
                ));
            }
        }
    }
    for &inst in &insts[..insts.len() - 1] {
        if func.dfg.inst_data(inst).opcode().is_terminator() {
            errors.push(format!(
                "{block} has terminator {} before its end",
                func.dfg.inst_data(inst).opcode()
            ));
        }
    }

    for &inst in insts {
        let data = func.dfg.inst_data(inst);
        match data {
            InstructionData::Jump {
                destination, args, ..
            } => {
                verify_branch_args(func, block, *destination, args, errors);
            }
            InstructionData::Branch {
                destination, args, ..
            } => {
                verify_branch_args(func, block, *destination, &args[1..], errors);
            }
            InstructionData::BranchTable { table, .. } => {
                for target in func.jump_tables[*table].all_targets() {
                    if !func.dfg.block_params(target).is_empty() {
                        errors.push(format!(
                            "{block}: jump table target {target} has parameters"
                        ));
                    }
                }
            }
            InstructionData::Call { func_ref, args, .. } => {
                let sig = func.dfg.ext_funcs[*func_ref].signature;
                verify_call_args(func, block, args, sig, errors);
            }
            InstructionData::CallIndirect { sig_ref, args, .. } => {
                if func.dfg.value_type(args[0]) != Type::I64 {
                    errors.push(format!("{block}: call_indirect callee is not i64"));
                }
                verify_call_args(func, block, &args[1..], *sig_ref, errors);
            }
            InstructionData::MultiAry { args, .. } => {
                let want: Vec<Type> = func
                    .signature
                    .returns
                    .iter()
                    .map(|p| p.value_type)
                    .collect();
                let got: Vec<Type> = args.iter().map(|&v| func.dfg.value_type(v)).collect();
                if want != got {
                    errors.push(format!(
                        "{block}: return of {got:?} does not match signature {want:?}"
                    ));
                }
            }
            InstructionData::Exit { ctx, .. } => {
                if func.dfg.value_type(*ctx) != Type::I64 {
                    errors.push(format!("{block}: exit context is not i64"));
                }
            }
            InstructionData::ExitIfTrue { args, .. } => {
                if func.dfg.value_type(args[1]) != Type::I64 {
                    errors.push(format!("{block}: exit_if_true context is not i64"));
                }
            }
            _ => {}
        }
    }
}

fn verify_branch_args(
    func: &Function,
    block: Block,
    destination: Block,
    args: &[crate::entities::Value],
    errors: &mut Vec<String>,
) {
    let params = func.dfg.block_params(destination);
    if params.len() != args.len() {
        errors.push(format!(
            "{block}: branch to {destination} has {} arguments for {} parameters",
            args.len(),
            params.len()
        ));
        return;
    }
    for (i, (&arg, &param)) in args.iter().zip(params).enumerate() {
        let arg_ty = func.dfg.value_type(arg);
        let param_ty = func.dfg.value_type(param);
        if arg_ty != param_ty {
            errors.push(format!(
                "{block}: branch argument {i} to {destination} is {arg_ty}, expected {param_ty}"
            ));
        }
    }
}

fn verify_call_args(
    func: &Function,
    block: Block,
    args: &[crate::entities::Value],
    sig: crate::entities::SigRef,
    errors: &mut Vec<String>,
) {
    let params = &func.dfg.signatures[sig].params;
    if params.len() != args.len() {
        errors.push(format!(
            "{block}: call with {} arguments for signature {sig} with {} parameters",
            args.len(),
            params.len()
        ));
        return;
    }
    for (i, (&arg, param)) in args.iter().zip(params).enumerate() {
        let arg_ty = func.dfg.value_type(arg);
        if arg_ty != param.value_type {
            errors.push(format!(
                "{block}: call argument {i} is {arg_ty}, expected {}",
                param.value_type
            ));
        }
    }
}
