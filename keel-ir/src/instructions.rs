//! Instruction opcodes and operand formats.
//!
//! Every instruction is stored as an `InstructionData` enum variant: one
//! variant per operand format, with the opcode repeated inside so that
//! format and operation can be matched independently. Variable-length
//! argument lists (calls, branch arguments) are stored inline; branch
//! arguments in particular must support appending after creation because
//! on-the-fly SSA construction discovers block parameters late.

use crate::condcodes::{FloatCC, IntCC};
use crate::entities::{Block, FuncRef, JumpTable, SigRef, Value};
use crate::exit_code::ExitCode;
use crate::immediates::{Ieee32, Ieee64, Imm64};
use core::fmt;

/// An instruction opcode.
///
/// `Jump`, `BrTable`, `Return` and `Exit` are terminators: they must be the
/// last instruction of a block. `Brz`/`Brnz` are conditional branches that
/// may appear before the terminator; control falls through to the next
/// instruction when the condition does not transfer.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[allow(missing_docs)]
pub enum Opcode {
    // Constants.
    Iconst,
    F32const,
    F64const,

    // Integer arithmetic. The division and remainder instructions carry the
    // execution context as a third operand; the code generator uses it to
    // emit the division-by-zero / overflow exit checks.
    Iadd,
    Isub,
    Imul,
    Sdiv,
    Udiv,
    Srem,
    Urem,

    // Bitwise operations. Shift and rotate amounts are interpreted modulo
    // the operand width.
    Band,
    Bor,
    Bxor,
    Ishl,
    Sshr,
    Ushr,
    Rotl,
    Rotr,
    Clz,
    Ctz,
    Popcnt,

    // Float arithmetic. `Fmin`/`Fmax` propagate NaN per IEEE 754-2019
    // minimum/maximum (a NaN operand produces NaN).
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fmin,
    Fmax,
    Fcopysign,
    Fabs,
    Fneg,
    Sqrt,
    Ceil,
    Floor,
    Trunc,
    Nearest,

    // Comparisons, producing an I32 that is 0 or 1.
    Icmp,
    Fcmp,

    Select,

    // Width changes and conversions. `FcvtToSint`/`FcvtToUint` trap on NaN
    // and out-of-range inputs and carry the execution context; the `Sat`
    // variants saturate instead.
    Sextend,
    Uextend,
    Ireduce,
    FcvtFromSint,
    FcvtFromUint,
    FcvtToSint,
    FcvtToUint,
    FcvtToSintSat,
    FcvtToUintSat,
    Fpromote,
    Fdemote,
    Bitcast,

    // Memory. The byte-offset immediate is added (zero-extended) to the
    // 64-bit address operand. All accesses are little-endian.
    Load,
    Uload8,
    Sload8,
    Uload16,
    Sload16,
    Uload32,
    Sload32,
    Store,
    Istore8,
    Istore16,
    Istore32,

    // Calls.
    Call,
    CallIndirect,

    // Control transfer.
    Jump,
    Brz,
    Brnz,
    BrTable,
    Return,

    // Runtime exits. `Exit` is an unconditional terminator; `ExitIfTrue`
    // checks its condition and falls through when it is zero.
    Exit,
    ExitIfTrue,
}

impl Opcode {
    /// True for instructions that must end a block.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Jump | Self::BrTable | Self::Return | Self::Exit
        )
    }

    /// True for instructions that can transfer control to another block.
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Jump | Self::Brz | Self::Brnz | Self::BrTable)
    }

    /// The lowercase name used in the textual format.
    pub fn name(self) -> &'static str {
        match self {
            Self::Iconst => "iconst",
            Self::F32const => "f32const",
            Self::F64const => "f64const",
            Self::Iadd => "iadd",
            Self::Isub => "isub",
            Self::Imul => "imul",
            Self::Sdiv => "sdiv",
            Self::Udiv => "udiv",
            Self::Srem => "srem",
            Self::Urem => "urem",
            Self::Band => "band",
            Self::Bor => "bor",
            Self::Bxor => "bxor",
            Self::Ishl => "ishl",
            Self::Sshr => "sshr",
            Self::Ushr => "ushr",
            Self::Rotl => "rotl",
            Self::Rotr => "rotr",
            Self::Clz => "clz",
            Self::Ctz => "ctz",
            Self::Popcnt => "popcnt",
            Self::Fadd => "fadd",
            Self::Fsub => "fsub",
            Self::Fmul => "fmul",
            Self::Fdiv => "fdiv",
            Self::Fmin => "fmin",
            Self::Fmax => "fmax",
            Self::Fcopysign => "fcopysign",
            Self::Fabs => "fabs",
            Self::Fneg => "fneg",
            Self::Sqrt => "sqrt",
            Self::Ceil => "ceil",
            Self::Floor => "floor",
            Self::Trunc => "trunc",
            Self::Nearest => "nearest",
            Self::Icmp => "icmp",
            Self::Fcmp => "fcmp",
            Self::Select => "select",
            Self::Sextend => "sextend",
            Self::Uextend => "uextend",
            Self::Ireduce => "ireduce",
            Self::FcvtFromSint => "fcvt_from_sint",
            Self::FcvtFromUint => "fcvt_from_uint",
            Self::FcvtToSint => "fcvt_to_sint",
            Self::FcvtToUint => "fcvt_to_uint",
            Self::FcvtToSintSat => "fcvt_to_sint_sat",
            Self::FcvtToUintSat => "fcvt_to_uint_sat",
            Self::Fpromote => "fpromote",
            Self::Fdemote => "fdemote",
            Self::Bitcast => "bitcast",
            Self::Load => "load",
            Self::Uload8 => "uload8",
            Self::Sload8 => "sload8",
            Self::Uload16 => "uload16",
            Self::Sload16 => "sload16",
            Self::Uload32 => "uload32",
            Self::Sload32 => "sload32",
            Self::Store => "store",
            Self::Istore8 => "istore8",
            Self::Istore16 => "istore16",
            Self::Istore32 => "istore32",
            Self::Call => "call",
            Self::CallIndirect => "call_indirect",
            Self::Jump => "jump",
            Self::Brz => "brz",
            Self::Brnz => "brnz",
            Self::BrTable => "br_table",
            Self::Return => "return",
            Self::Exit => "exit",
            Self::ExitIfTrue => "exit_if_true",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The contents of an instruction: opcode, operands and immediates.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[allow(missing_docs)]
pub enum InstructionData {
    /// An integer constant; the controlling type picks i32 vs i64.
    UnaryImm { opcode: Opcode, imm: Imm64 },
    /// A 32-bit float constant.
    UnaryIeee32 { opcode: Opcode, imm: Ieee32 },
    /// A 64-bit float constant.
    UnaryIeee64 { opcode: Opcode, imm: Ieee64 },
    /// One value operand.
    Unary { opcode: Opcode, arg: Value },
    /// Two value operands. Also used by the trapping float-to-int
    /// conversions, whose second operand is the execution context.
    Binary { opcode: Opcode, args: [Value; 2] },
    /// Three value operands: `select` (condition first) and the trapping
    /// integer division family (execution context last).
    Ternary { opcode: Opcode, args: [Value; 3] },
    /// Integer comparison.
    IntCompare {
        opcode: Opcode,
        cond: IntCC,
        args: [Value; 2],
    },
    /// Float comparison.
    FloatCompare {
        opcode: Opcode,
        cond: FloatCC,
        args: [Value; 2],
    },
    /// Integer width extension with explicit source and destination widths
    /// in bits; the source width may be narrower than the operand's type
    /// (`sextend.8_32` reinterprets the low 8 bits of an i32).
    Extend {
        opcode: Opcode,
        arg: Value,
        from_bits: u8,
        to_bits: u8,
    },
    /// A memory load; the result type is the controlling type.
    Load {
        opcode: Opcode,
        arg: Value,
        offset: u32,
    },
    /// A memory store; `args` is `[stored value, address]`.
    Store {
        opcode: Opcode,
        args: [Value; 2],
        offset: u32,
    },
    /// A direct call.
    Call {
        opcode: Opcode,
        func_ref: FuncRef,
        args: Vec<Value>,
    },
    /// An indirect call; `args[0]` is the callee code pointer.
    CallIndirect {
        opcode: Opcode,
        sig_ref: SigRef,
        args: Vec<Value>,
    },
    /// An unconditional jump carrying destination arguments.
    Jump {
        opcode: Opcode,
        destination: Block,
        args: Vec<Value>,
    },
    /// A conditional branch; `args[0]` is the condition, the rest are
    /// destination arguments.
    Branch {
        opcode: Opcode,
        destination: Block,
        args: Vec<Value>,
    },
    /// An indexed branch through a jump table. Table targets carry no
    /// arguments.
    BranchTable {
        opcode: Opcode,
        arg: Value,
        table: JumpTable,
    },
    /// A return carrying the function results.
    MultiAry { opcode: Opcode, args: Vec<Value> },
    /// An unconditional transfer to the runtime with an exit code; the
    /// operand is the execution context.
    Exit {
        opcode: Opcode,
        ctx: Value,
        code: ExitCode,
    },
    /// A conditional transfer to the runtime; `args` is
    /// `[condition, execution context]`.
    ExitIfTrue {
        opcode: Opcode,
        args: [Value; 2],
        code: ExitCode,
    },
}

impl InstructionData {
    /// The instruction's opcode.
    pub fn opcode(&self) -> Opcode {
        match *self {
            Self::UnaryImm { opcode, .. }
            | Self::UnaryIeee32 { opcode, .. }
            | Self::UnaryIeee64 { opcode, .. }
            | Self::Unary { opcode, .. }
            | Self::Binary { opcode, .. }
            | Self::Ternary { opcode, .. }
            | Self::IntCompare { opcode, .. }
            | Self::FloatCompare { opcode, .. }
            | Self::Extend { opcode, .. }
            | Self::Load { opcode, .. }
            | Self::Store { opcode, .. }
            | Self::Call { opcode, .. }
            | Self::CallIndirect { opcode, .. }
            | Self::Jump { opcode, .. }
            | Self::Branch { opcode, .. }
            | Self::BranchTable { opcode, .. }
            | Self::MultiAry { opcode, .. }
            | Self::Exit { opcode, .. }
            | Self::ExitIfTrue { opcode, .. } => opcode,
        }
    }

    /// All value operands, in order.
    pub fn arguments(&self) -> &[Value] {
        match self {
            Self::UnaryImm { .. } | Self::UnaryIeee32 { .. } | Self::UnaryIeee64 { .. } => &[],
            Self::Unary { arg, .. } | Self::Load { arg, .. } | Self::BranchTable { arg, .. } => {
                core::slice::from_ref(arg)
            }
            Self::Binary { args, .. }
            | Self::IntCompare { args, .. }
            | Self::FloatCompare { args, .. }
            | Self::Store { args, .. }
            | Self::ExitIfTrue { args, .. } => args,
            Self::Ternary { args, .. } => args,
            Self::Extend { arg, .. } => core::slice::from_ref(arg),
            Self::Call { args, .. }
            | Self::CallIndirect { args, .. }
            | Self::Jump { args, .. }
            | Self::Branch { args, .. }
            | Self::MultiAry { args, .. } => args,
            Self::Exit { ctx, .. } => core::slice::from_ref(ctx),
        }
    }

    /// The destination of a single-target branch, if this is one.
    pub fn branch_destination(&self) -> Option<Block> {
        match *self {
            Self::Jump { destination, .. } | Self::Branch { destination, .. } => Some(destination),
            _ => None,
        }
    }

    /// The destination arguments of a single-target branch (excluding the
    /// condition of a conditional branch).
    pub fn branch_arguments(&self) -> &[Value] {
        match self {
            Self::Jump { args, .. } => args,
            Self::Branch { args, .. } => &args[1..],
            _ => &[],
        }
    }

    /// Append a destination argument to a `jump`/`brz`/`brnz` instruction.
    ///
    /// Used by SSA construction when a destination block grows a parameter
    /// after its predecessors were emitted.
    pub fn append_branch_argument(&mut self, val: Value) {
        match self {
            Self::Jump { args, .. } | Self::Branch { args, .. } => args.push(val),
            _ => panic!("cannot append a branch argument to {}", self.opcode()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn operand_access() {
        let v = |n| Value::new(n);
        let block = Block::new(0);

        let add = InstructionData::Binary {
            opcode: Opcode::Iadd,
            args: [v(0), v(1)],
        };
        assert_eq!(add.opcode(), Opcode::Iadd);
        assert_eq!(add.arguments(), &[v(0), v(1)]);
        assert_eq!(add.branch_destination(), None);

        let mut br = InstructionData::Branch {
            opcode: Opcode::Brnz,
            destination: block,
            args: vec![v(2)],
        };
        assert_eq!(br.branch_destination(), Some(block));
        assert_eq!(br.branch_arguments(), &[]);
        br.append_branch_argument(v(3));
        assert_eq!(br.branch_arguments(), &[v(3)]);
        assert_eq!(br.arguments(), &[v(2), v(3)]);

        assert!(Opcode::Jump.is_terminator());
        assert!(Opcode::Brnz.is_branch());
        assert!(!Opcode::Brnz.is_terminator());
        assert!(!Opcode::ExitIfTrue.is_branch());
    }
}
