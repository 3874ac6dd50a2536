//! Exit codes carried by `exit` and `exit_if_true` instructions.

use core::fmt;

/// The reason generated code transfers control back to the runtime.
///
/// The numeric values are part of the ABI between compiled code and the
/// host runtime and must never change. Code 0 is reserved for normal
/// completion and never appears on an instruction.
///
/// `IntegerDivisionByZero`, `IntegerOverflow` and
/// `InvalidConversionToInteger` are emitted by the code generator when
/// expanding the trapping division/remainder and float-to-int conversion
/// instructions (which carry the execution context as an operand for this
/// purpose); the frontend emits the rest explicitly.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum ExitCode {
    /// The `unreachable` instruction was executed.
    Unreachable = 1,
    /// A linear-memory access was out of bounds.
    MemoryOutOfBounds = 2,
    /// A table access was out of bounds.
    TableOutOfBounds = 3,
    /// An indirect call went through a null table entry.
    IndirectCallNullPointer = 4,
    /// An indirect call's type ID did not match the expected type ID.
    IndirectCallTypeMismatch = 5,
    /// Integer division or remainder by zero.
    IntegerDivisionByZero = 6,
    /// Signed integer division overflow (`i32::MIN / -1` and the like).
    IntegerOverflow = 7,
    /// Float-to-integer conversion of NaN or an out-of-range value.
    InvalidConversionToInteger = 8,
}

impl ExitCode {
    /// The stable numeric value reported to the runtime.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Unreachable => "unreachable",
            Self::MemoryOutOfBounds => "memory_out_of_bounds",
            Self::TableOutOfBounds => "table_out_of_bounds",
            Self::IndirectCallNullPointer => "indirect_call_null_pointer",
            Self::IndirectCallTypeMismatch => "indirect_call_type_mismatch",
            Self::IntegerDivisionByZero => "integer_division_by_zero",
            Self::IntegerOverflow => "integer_overflow",
            Self::InvalidConversionToInteger => "invalid_conversion_to_integer",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_values() {
        // ABI constants; a change here breaks deployed runtimes.
        assert_eq!(ExitCode::Unreachable.as_u32(), 1);
        assert_eq!(ExitCode::MemoryOutOfBounds.as_u32(), 2);
        assert_eq!(ExitCode::TableOutOfBounds.as_u32(), 3);
        assert_eq!(ExitCode::IndirectCallNullPointer.as_u32(), 4);
        assert_eq!(ExitCode::IndirectCallTypeMismatch.as_u32(), 5);
        assert_eq!(ExitCode::IntegerDivisionByZero.as_u32(), 6);
        assert_eq!(ExitCode::IntegerOverflow.as_u32(), 7);
        assert_eq!(ExitCode::InvalidConversionToInteger.as_u32(), 8);
    }
}
