//! Decoded WebAssembly operators.
//!
//! The translator dispatches on fully decoded operators: all immediates are
//! consumed from the bytecode at decode time, which is what keeps
//! unreachable-code handling honest. An operator skipped for
//! unreachability still advances the reader past its immediates.
//!
//! The enumeration covers WebAssembly core 2.0's numeric, parametric,
//! variable, memory and control instructions plus the sign-extension and
//! non-trapping float-to-int conversion operators. Bulk-memory, table
//! mutation and `ref.func` decode to variants the translator rejects as
//! unsupported; the vector and atomics prefixes are rejected at decode
//! time.

use crate::environ::{WasmError, WasmResult};
use crate::module::ValType;
use crate::reader::BytecodeReader;

/// The type of a `block`, `loop` or `if`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BlockType {
    /// No parameters, no results.
    Empty,
    /// No parameters, one result.
    Value(ValType),
    /// A (params, results) type from the type section.
    Func(u32),
}

/// The `(align, offset)` immediate of a memory access.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct MemArg {
    /// The alignment hint; ignored by the translator.
    pub align: u32,
    /// The static byte offset added to the address operand.
    pub offset: u32,
}

/// A decoded WebAssembly operator.
#[derive(Clone, PartialEq, Debug)]
#[allow(missing_docs)]
pub enum Operator {
    // Control.
    Unreachable,
    Nop,
    Block { block_type: BlockType },
    Loop { block_type: BlockType },
    If { block_type: BlockType },
    Else,
    End,
    Br { relative_depth: u32 },
    BrIf { relative_depth: u32 },
    BrTable { targets: Vec<u32>, default: u32 },
    Return,
    Call { function_index: u32 },
    CallIndirect { type_index: u32, table_index: u32 },

    // Parametric.
    Drop,
    Select,

    // Variables.
    LocalGet { local_index: u32 },
    LocalSet { local_index: u32 },
    LocalTee { local_index: u32 },
    GlobalGet { global_index: u32 },
    GlobalSet { global_index: u32 },

    // Tables (unsupported by the translator).
    TableGet { table_index: u32 },
    TableSet { table_index: u32 },

    // Memory.
    I32Load { memarg: MemArg },
    I64Load { memarg: MemArg },
    F32Load { memarg: MemArg },
    F64Load { memarg: MemArg },
    I32Load8S { memarg: MemArg },
    I32Load8U { memarg: MemArg },
    I32Load16S { memarg: MemArg },
    I32Load16U { memarg: MemArg },
    I64Load8S { memarg: MemArg },
    I64Load8U { memarg: MemArg },
    I64Load16S { memarg: MemArg },
    I64Load16U { memarg: MemArg },
    I64Load32S { memarg: MemArg },
    I64Load32U { memarg: MemArg },
    I32Store { memarg: MemArg },
    I64Store { memarg: MemArg },
    F32Store { memarg: MemArg },
    F64Store { memarg: MemArg },
    I32Store8 { memarg: MemArg },
    I32Store16 { memarg: MemArg },
    I64Store8 { memarg: MemArg },
    I64Store16 { memarg: MemArg },
    I64Store32 { memarg: MemArg },
    MemorySize { memory: u32 },
    MemoryGrow { memory: u32 },

    // Constants.
    I32Const { value: i32 },
    I64Const { value: i64 },
    F32Const { bits: u32 },
    F64Const { bits: u64 },

    // Comparisons.
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,

    // Integer arithmetic.
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    // Float arithmetic.
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    // Conversions.
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,

    // Sign extension.
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    // References.
    RefNull,
    RefIsNull,
    RefFunc { function_index: u32 },

    // Non-trapping float-to-int conversions (0xfc prefix).
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,

    // Bulk memory and tables (0xfc prefix; unsupported by the translator).
    MemoryInit { data_index: u32, memory: u32 },
    DataDrop { data_index: u32 },
    MemoryCopy { dst: u32, src: u32 },
    MemoryFill { memory: u32 },
    TableInit { elem_index: u32, table: u32 },
    ElemDrop { elem_index: u32 },
    TableCopy { dst_table: u32, src_table: u32 },
    TableGrow { table: u32 },
    TableSize { table: u32 },
    TableFill { table: u32 },
}

impl<'a> BytecodeReader<'a> {
    /// Decode the next operator, consuming its immediates.
    pub fn read_operator(&mut self) -> WasmResult<Operator> {
        let pos = self.position();
        let opcode = self.read_byte()?;
        Ok(match opcode {
            0x00 => Operator::Unreachable,
            0x01 => Operator::Nop,
            0x02 => Operator::Block {
                block_type: self.read_block_type()?,
            },
            0x03 => Operator::Loop {
                block_type: self.read_block_type()?,
            },
            0x04 => Operator::If {
                block_type: self.read_block_type()?,
            },
            0x05 => Operator::Else,
            0x0b => Operator::End,
            0x0c => Operator::Br {
                relative_depth: self.read_var_u32()?,
            },
            0x0d => Operator::BrIf {
                relative_depth: self.read_var_u32()?,
            },
            0x0e => {
                let count = self.read_var_u32()?;
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    targets.push(self.read_var_u32()?);
                }
                Operator::BrTable {
                    targets,
                    default: self.read_var_u32()?,
                }
            }
            0x0f => Operator::Return,
            0x10 => Operator::Call {
                function_index: self.read_var_u32()?,
            },
            0x11 => {
                let type_index = self.read_var_u32()?;
                let table_index = self.read_var_u32()?;
                Operator::CallIndirect {
                    type_index,
                    table_index,
                }
            }
            0x1a => Operator::Drop,
            0x1b => Operator::Select,
            0x1c => {
                // Typed select: the type annotation adds nothing once the
                // module is validated.
                let count = self.read_var_u32()?;
                for _ in 0..count {
                    self.read_val_type()?;
                }
                Operator::Select
            }
            0x20 => Operator::LocalGet {
                local_index: self.read_var_u32()?,
            },
            0x21 => Operator::LocalSet {
                local_index: self.read_var_u32()?,
            },
            0x22 => Operator::LocalTee {
                local_index: self.read_var_u32()?,
            },
            0x23 => Operator::GlobalGet {
                global_index: self.read_var_u32()?,
            },
            0x24 => Operator::GlobalSet {
                global_index: self.read_var_u32()?,
            },
            0x25 => Operator::TableGet {
                table_index: self.read_var_u32()?,
            },
            0x26 => Operator::TableSet {
                table_index: self.read_var_u32()?,
            },
            0x28 => Operator::I32Load {
                memarg: self.read_operator_memarg()?,
            },
            0x29 => Operator::I64Load {
                memarg: self.read_operator_memarg()?,
            },
            0x2a => Operator::F32Load {
                memarg: self.read_operator_memarg()?,
            },
            0x2b => Operator::F64Load {
                memarg: self.read_operator_memarg()?,
            },
            0x2c => Operator::I32Load8S {
                memarg: self.read_operator_memarg()?,
            },
            0x2d => Operator::I32Load8U {
                memarg: self.read_operator_memarg()?,
            },
            0x2e => Operator::I32Load16S {
                memarg: self.read_operator_memarg()?,
            },
            0x2f => Operator::I32Load16U {
                memarg: self.read_operator_memarg()?,
            },
            0x30 => Operator::I64Load8S {
                memarg: self.read_operator_memarg()?,
            },
            0x31 => Operator::I64Load8U {
                memarg: self.read_operator_memarg()?,
            },
            0x32 => Operator::I64Load16S {
                memarg: self.read_operator_memarg()?,
            },
            0x33 => Operator::I64Load16U {
                memarg: self.read_operator_memarg()?,
            },
            0x34 => Operator::I64Load32S {
                memarg: self.read_operator_memarg()?,
            },
            0x35 => Operator::I64Load32U {
                memarg: self.read_operator_memarg()?,
            },
            0x36 => Operator::I32Store {
                memarg: self.read_operator_memarg()?,
            },
            0x37 => Operator::I64Store {
                memarg: self.read_operator_memarg()?,
            },
            0x38 => Operator::F32Store {
                memarg: self.read_operator_memarg()?,
            },
            0x39 => Operator::F64Store {
                memarg: self.read_operator_memarg()?,
            },
            0x3a => Operator::I32Store8 {
                memarg: self.read_operator_memarg()?,
            },
            0x3b => Operator::I32Store16 {
                memarg: self.read_operator_memarg()?,
            },
            0x3c => Operator::I64Store8 {
                memarg: self.read_operator_memarg()?,
            },
            0x3d => Operator::I64Store16 {
                memarg: self.read_operator_memarg()?,
            },
            0x3e => Operator::I64Store32 {
                memarg: self.read_operator_memarg()?,
            },
            0x3f => Operator::MemorySize {
                memory: self.read_var_u32()?,
            },
            0x40 => Operator::MemoryGrow {
                memory: self.read_var_u32()?,
            },
            0x41 => Operator::I32Const {
                value: self.read_var_i32()?,
            },
            0x42 => Operator::I64Const {
                value: self.read_var_i64()?,
            },
            0x43 => Operator::F32Const {
                bits: self.read_f32_bits()?,
            },
            0x44 => Operator::F64Const {
                bits: self.read_f64_bits()?,
            },
            0x45 => Operator::I32Eqz,
            0x46 => Operator::I32Eq,
            0x47 => Operator::I32Ne,
            0x48 => Operator::I32LtS,
            0x49 => Operator::I32LtU,
            0x4a => Operator::I32GtS,
            0x4b => Operator::I32GtU,
            0x4c => Operator::I32LeS,
            0x4d => Operator::I32LeU,
            0x4e => Operator::I32GeS,
            0x4f => Operator::I32GeU,
            0x50 => Operator::I64Eqz,
            0x51 => Operator::I64Eq,
            0x52 => Operator::I64Ne,
            0x53 => Operator::I64LtS,
            0x54 => Operator::I64LtU,
            0x55 => Operator::I64GtS,
            0x56 => Operator::I64GtU,
            0x57 => Operator::I64LeS,
            0x58 => Operator::I64LeU,
            0x59 => Operator::I64GeS,
            0x5a => Operator::I64GeU,
            0x5b => Operator::F32Eq,
            0x5c => Operator::F32Ne,
            0x5d => Operator::F32Lt,
            0x5e => Operator::F32Gt,
            0x5f => Operator::F32Le,
            0x60 => Operator::F32Ge,
            0x61 => Operator::F64Eq,
            0x62 => Operator::F64Ne,
            0x63 => Operator::F64Lt,
            0x64 => Operator::F64Gt,
            0x65 => Operator::F64Le,
            0x66 => Operator::F64Ge,
            0x67 => Operator::I32Clz,
            0x68 => Operator::I32Ctz,
            0x69 => Operator::I32Popcnt,
            0x6a => Operator::I32Add,
            0x6b => Operator::I32Sub,
            0x6c => Operator::I32Mul,
            0x6d => Operator::I32DivS,
            0x6e => Operator::I32DivU,
            0x6f => Operator::I32RemS,
            0x70 => Operator::I32RemU,
            0x71 => Operator::I32And,
            0x72 => Operator::I32Or,
            0x73 => Operator::I32Xor,
            0x74 => Operator::I32Shl,
            0x75 => Operator::I32ShrS,
            0x76 => Operator::I32ShrU,
            0x77 => Operator::I32Rotl,
            0x78 => Operator::I32Rotr,
            0x79 => Operator::I64Clz,
            0x7a => Operator::I64Ctz,
            0x7b => Operator::I64Popcnt,
            0x7c => Operator::I64Add,
            0x7d => Operator::I64Sub,
            0x7e => Operator::I64Mul,
            0x7f => Operator::I64DivS,
            0x80 => Operator::I64DivU,
            0x81 => Operator::I64RemS,
            0x82 => Operator::I64RemU,
            0x83 => Operator::I64And,
            0x84 => Operator::I64Or,
            0x85 => Operator::I64Xor,
            0x86 => Operator::I64Shl,
            0x87 => Operator::I64ShrS,
            0x88 => Operator::I64ShrU,
            0x89 => Operator::I64Rotl,
            0x8a => Operator::I64Rotr,
            0x8b => Operator::F32Abs,
            0x8c => Operator::F32Neg,
            0x8d => Operator::F32Ceil,
            0x8e => Operator::F32Floor,
            0x8f => Operator::F32Trunc,
            0x90 => Operator::F32Nearest,
            0x91 => Operator::F32Sqrt,
            0x92 => Operator::F32Add,
            0x93 => Operator::F32Sub,
            0x94 => Operator::F32Mul,
            0x95 => Operator::F32Div,
            0x96 => Operator::F32Min,
            0x97 => Operator::F32Max,
            0x98 => Operator::F32Copysign,
            0x99 => Operator::F64Abs,
            0x9a => Operator::F64Neg,
            0x9b => Operator::F64Ceil,
            0x9c => Operator::F64Floor,
            0x9d => Operator::F64Trunc,
            0x9e => Operator::F64Nearest,
            0x9f => Operator::F64Sqrt,
            0xa0 => Operator::F64Add,
            0xa1 => Operator::F64Sub,
            0xa2 => Operator::F64Mul,
            0xa3 => Operator::F64Div,
            0xa4 => Operator::F64Min,
            0xa5 => Operator::F64Max,
            0xa6 => Operator::F64Copysign,
            0xa7 => Operator::I32WrapI64,
            0xa8 => Operator::I32TruncF32S,
            0xa9 => Operator::I32TruncF32U,
            0xaa => Operator::I32TruncF64S,
            0xab => Operator::I32TruncF64U,
            0xac => Operator::I64ExtendI32S,
            0xad => Operator::I64ExtendI32U,
            0xae => Operator::I64TruncF32S,
            0xaf => Operator::I64TruncF32U,
            0xb0 => Operator::I64TruncF64S,
            0xb1 => Operator::I64TruncF64U,
            0xb2 => Operator::F32ConvertI32S,
            0xb3 => Operator::F32ConvertI32U,
            0xb4 => Operator::F32ConvertI64S,
            0xb5 => Operator::F32ConvertI64U,
            0xb6 => Operator::F32DemoteF64,
            0xb7 => Operator::F64ConvertI32S,
            0xb8 => Operator::F64ConvertI32U,
            0xb9 => Operator::F64ConvertI64S,
            0xba => Operator::F64ConvertI64U,
            0xbb => Operator::F64PromoteF32,
            0xbc => Operator::I32ReinterpretF32,
            0xbd => Operator::I64ReinterpretF64,
            0xbe => Operator::F32ReinterpretI32,
            0xbf => Operator::F64ReinterpretI64,
            0xc0 => Operator::I32Extend8S,
            0xc1 => Operator::I32Extend16S,
            0xc2 => Operator::I64Extend8S,
            0xc3 => Operator::I64Extend16S,
            0xc4 => Operator::I64Extend32S,
            0xd0 => {
                // Heap type immediate.
                self.read_byte()?;
                Operator::RefNull
            }
            0xd1 => Operator::RefIsNull,
            0xd2 => Operator::RefFunc {
                function_index: self.read_var_u32()?,
            },
            0xfc => self.read_misc_operator()?,
            0xfd => {
                return Err(WasmError::Unsupported(format!(
                    "vector opcode at offset {pos}"
                )))
            }
            0xfe => {
                return Err(WasmError::Unsupported(format!(
                    "atomic opcode at offset {pos}"
                )))
            }
            _ => {
                return Err(WasmError::InvalidBytecode {
                    message: format!("unknown opcode 0x{opcode:02x}"),
                    offset: pos,
                })
            }
        })
    }

    fn read_operator_memarg(&mut self) -> WasmResult<MemArg> {
        let (align, offset) = self.read_memarg()?;
        Ok(MemArg { align, offset })
    }

    fn read_misc_operator(&mut self) -> WasmResult<Operator> {
        let pos = self.position();
        let subopcode = self.read_var_u32()?;
        Ok(match subopcode {
            0 => Operator::I32TruncSatF32S,
            1 => Operator::I32TruncSatF32U,
            2 => Operator::I32TruncSatF64S,
            3 => Operator::I32TruncSatF64U,
            4 => Operator::I64TruncSatF32S,
            5 => Operator::I64TruncSatF32U,
            6 => Operator::I64TruncSatF64S,
            7 => Operator::I64TruncSatF64U,
            8 => {
                let data_index = self.read_var_u32()?;
                let memory = self.read_var_u32()?;
                Operator::MemoryInit { data_index, memory }
            }
            9 => Operator::DataDrop {
                data_index: self.read_var_u32()?,
            },
            10 => {
                let dst = self.read_var_u32()?;
                let src = self.read_var_u32()?;
                Operator::MemoryCopy { dst, src }
            }
            11 => Operator::MemoryFill {
                memory: self.read_var_u32()?,
            },
            12 => {
                let elem_index = self.read_var_u32()?;
                let table = self.read_var_u32()?;
                Operator::TableInit { elem_index, table }
            }
            13 => Operator::ElemDrop {
                elem_index: self.read_var_u32()?,
            },
            14 => {
                let dst_table = self.read_var_u32()?;
                let src_table = self.read_var_u32()?;
                Operator::TableCopy {
                    dst_table,
                    src_table,
                }
            }
            15 => Operator::TableGrow {
                table: self.read_var_u32()?,
            },
            16 => Operator::TableSize {
                table: self.read_var_u32()?,
            },
            17 => Operator::TableFill {
                table: self.read_var_u32()?,
            },
            _ => {
                return Err(WasmError::InvalidBytecode {
                    message: format!("unknown misc opcode {subopcode}"),
                    offset: pos,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_arithmetic_sequence() {
        // local.get 0; i32.const 1; i32.add; end
        let mut r = BytecodeReader::new(&[0x20, 0x00, 0x41, 0x01, 0x6a, 0x0b]);
        assert_eq!(
            r.read_operator().unwrap(),
            Operator::LocalGet { local_index: 0 }
        );
        assert_eq!(r.read_operator().unwrap(), Operator::I32Const { value: 1 });
        assert_eq!(r.read_operator().unwrap(), Operator::I32Add);
        assert_eq!(r.read_operator().unwrap(), Operator::End);
        assert!(r.eof());
    }

    #[test]
    fn decode_memarg_and_br_table() {
        // i32.load align=2 offset=16; br_table [0 1] default=2
        let mut r = BytecodeReader::new(&[0x28, 0x02, 0x10, 0x0e, 0x02, 0x00, 0x01, 0x02]);
        assert_eq!(
            r.read_operator().unwrap(),
            Operator::I32Load {
                memarg: MemArg {
                    align: 2,
                    offset: 16
                }
            }
        );
        assert_eq!(
            r.read_operator().unwrap(),
            Operator::BrTable {
                targets: vec![0, 1],
                default: 2
            }
        );
    }

    #[test]
    fn decode_trunc_sat() {
        let mut r = BytecodeReader::new(&[0xfc, 0x00, 0xfc, 0x07]);
        assert_eq!(r.read_operator().unwrap(), Operator::I32TruncSatF32S);
        assert_eq!(r.read_operator().unwrap(), Operator::I64TruncSatF64U);
    }

    #[test]
    fn vector_prefix_is_unsupported() {
        let mut r = BytecodeReader::new(&[0xfd, 0x00]);
        assert!(matches!(
            r.read_operator(),
            Err(WasmError::Unsupported(_))
        ));
    }
}
