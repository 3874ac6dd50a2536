//! Converting IR functions to their stable textual form.
//!
//! The output is deterministic for a given construction sequence: entity
//! numbers are insertion-ordered and nothing here depends on hashing.
//! Downstream caches key on this text, and the test suites compare against
//! it literally.

use crate::dfg::DataFlowGraph;
use crate::entities::{Block, Inst, Value};
use crate::function::Function;
use crate::instructions::{InstructionData, Opcode};
use core::fmt::{self, Write};

/// Write `func` to `w` in the textual format.
pub fn write_function(w: &mut impl Write, func: &Function) -> fmt::Result {
    writeln!(w, "function {}{} {{", func.name, func.signature)?;
    let mut any_preamble = false;
    for (sig_ref, sig) in func.dfg.signatures.iter() {
        writeln!(w, "    {sig_ref} = {sig}")?;
        any_preamble = true;
    }
    for (func_ref, data) in func.dfg.ext_funcs.iter() {
        writeln!(w, "    {func_ref} = {data}")?;
        any_preamble = true;
    }
    for (jt, data) in func.jump_tables.iter() {
        writeln!(w, "    {jt} = {data}")?;
        any_preamble = true;
    }
    if any_preamble {
        writeln!(w)?;
    }
    let mut first = true;
    for block in func.layout.blocks() {
        if !first {
            writeln!(w)?;
        }
        first = false;
        write_block(w, func, block)?;
    }
    writeln!(w, "}}")
}

fn write_block(w: &mut impl Write, func: &Function, block: Block) -> fmt::Result {
    write!(w, "{block}")?;
    let params = func.dfg.block_params(block);
    if !params.is_empty() {
        write!(w, "(")?;
        for (i, &param) in params.iter().enumerate() {
            if i != 0 {
                write!(w, ", ")?;
            }
            write!(w, "{param}: {}", func.dfg.value_type(param))?;
        }
        write!(w, ")")?;
    }
    writeln!(w, ":")?;
    for &inst in func.layout.block_insts(block) {
        write!(w, "    ")?;
        write_inst(w, &func.dfg, inst)?;
        writeln!(w)?;
    }
    Ok(())
}

/// Does this opcode's textual form carry a result-type annotation?
///
/// Only opcodes whose result type cannot be read off their operands are
/// annotated, which keeps the text minimal without being ambiguous.
fn annotate_result_type(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Iconst
            | Opcode::Ireduce
            | Opcode::FcvtFromSint
            | Opcode::FcvtFromUint
            | Opcode::FcvtToSint
            | Opcode::FcvtToUint
            | Opcode::FcvtToSintSat
            | Opcode::FcvtToUintSat
            | Opcode::Fpromote
            | Opcode::Fdemote
            | Opcode::Bitcast
            | Opcode::Load
            | Opcode::Uload8
            | Opcode::Sload8
            | Opcode::Uload16
            | Opcode::Sload16
            | Opcode::Uload32
            | Opcode::Sload32
    )
}

fn write_value(w: &mut impl Write, dfg: &DataFlowGraph, val: Value) -> fmt::Result {
    write!(w, "{}", dfg.resolve_aliases(val))
}

fn write_value_list(w: &mut impl Write, dfg: &DataFlowGraph, vals: &[Value]) -> fmt::Result {
    for (i, &val) in vals.iter().enumerate() {
        if i != 0 {
            write!(w, ", ")?;
        }
        write_value(w, dfg, val)?;
    }
    Ok(())
}

fn write_inst(w: &mut impl Write, dfg: &DataFlowGraph, inst: Inst) -> fmt::Result {
    let results = dfg.inst_results(inst);
    if !results.is_empty() {
        write_value_list(w, dfg, results)?;
        write!(w, " = ")?;
    }
    let data = dfg.inst_data(inst);
    let opcode = data.opcode();
    write!(w, "{opcode}")?;
    if annotate_result_type(opcode) {
        write!(w, ".{}", dfg.value_type(dfg.first_result(inst)))?;
    }
    match data {
        InstructionData::UnaryImm { imm, .. } => write!(w, " {imm}"),
        InstructionData::UnaryIeee32 { imm, .. } => write!(w, " {imm}"),
        InstructionData::UnaryIeee64 { imm, .. } => write!(w, " {imm}"),
        InstructionData::Unary { arg, .. } => {
            write!(w, " ")?;
            write_value(w, dfg, *arg)
        }
        InstructionData::Binary { args, .. } => {
            write!(w, " ")?;
            write_value_list(w, dfg, args)
        }
        InstructionData::Ternary { args, .. } => {
            write!(w, " ")?;
            write_value_list(w, dfg, args)
        }
        InstructionData::IntCompare { cond, args, .. } => {
            write!(w, " {cond} ")?;
            write_value_list(w, dfg, args)
        }
        InstructionData::FloatCompare { cond, args, .. } => {
            write!(w, " {cond} ")?;
            write_value_list(w, dfg, args)
        }
        InstructionData::Extend {
            arg,
            from_bits,
            to_bits,
            ..
        } => {
            write!(w, ".{from_bits}_{to_bits} ")?;
            write_value(w, dfg, *arg)
        }
        InstructionData::Load { arg, offset, .. } => {
            write!(w, " ")?;
            write_value(w, dfg, *arg)?;
            if *offset != 0 {
                write!(w, "+{offset}")?;
            }
            Ok(())
        }
        InstructionData::Store { args, offset, .. } => {
            write!(w, " ")?;
            write_value(w, dfg, args[0])?;
            write!(w, ", ")?;
            write_value(w, dfg, args[1])?;
            if *offset != 0 {
                write!(w, "+{offset}")?;
            }
            Ok(())
        }
        InstructionData::Call { func_ref, args, .. } => {
            write!(w, " {func_ref}(")?;
            write_value_list(w, dfg, args)?;
            write!(w, ")")
        }
        InstructionData::CallIndirect { sig_ref, args, .. } => {
            write!(w, " {sig_ref}, ")?;
            write_value(w, dfg, args[0])?;
            write!(w, "(")?;
            write_value_list(w, dfg, &args[1..])?;
            write!(w, ")")
        }
        InstructionData::Jump {
            destination, args, ..
        } => {
            write!(w, " {destination}")?;
            if !args.is_empty() {
                write!(w, "(")?;
                write_value_list(w, dfg, args)?;
                write!(w, ")")?;
            }
            Ok(())
        }
        InstructionData::Branch {
            destination, args, ..
        } => {
            write!(w, " ")?;
            write_value(w, dfg, args[0])?;
            write!(w, ", {destination}")?;
            if args.len() > 1 {
                write!(w, "(")?;
                write_value_list(w, dfg, &args[1..])?;
                write!(w, ")")?;
            }
            Ok(())
        }
        InstructionData::BranchTable { arg, table, .. } => {
            write!(w, " ")?;
            write_value(w, dfg, *arg)?;
            write!(w, ", {table}")
        }
        InstructionData::MultiAry { args, .. } => {
            if !args.is_empty() {
                write!(w, " ")?;
                write_value_list(w, dfg, args)?;
            }
            Ok(())
        }
        InstructionData::Exit { ctx, code, .. } => {
            write!(w, " ")?;
            write_value(w, dfg, *ctx)?;
            write!(w, ", {code}")
        }
        InstructionData::ExitIfTrue { args, code, .. } => {
            write!(w, " ")?;
            write_value_list(w, dfg, args)?;
            write!(w, ", {code}")
        }
    }
}
