//! Condition codes for comparison instructions.

use core::fmt;

/// Condition code for integer comparisons (`icmp`).
///
/// Equality is signedness-agnostic; the ordered comparisons come in signed
/// and unsigned variants.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum IntCC {
    /// `==`.
    Equal,
    /// `!=`.
    NotEqual,
    /// Signed `<`.
    SignedLessThan,
    /// Signed `>=`.
    SignedGreaterThanOrEqual,
    /// Signed `>`.
    SignedGreaterThan,
    /// Signed `<=`.
    SignedLessThanOrEqual,
    /// Unsigned `<`.
    UnsignedLessThan,
    /// Unsigned `>=`.
    UnsignedGreaterThanOrEqual,
    /// Unsigned `>`.
    UnsignedGreaterThan,
    /// Unsigned `<=`.
    UnsignedLessThanOrEqual,
}

impl fmt::Display for IntCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::SignedLessThan => "slt",
            Self::SignedGreaterThanOrEqual => "sge",
            Self::SignedGreaterThan => "sgt",
            Self::SignedLessThanOrEqual => "sle",
            Self::UnsignedLessThan => "ult",
            Self::UnsignedGreaterThanOrEqual => "uge",
            Self::UnsignedGreaterThan => "ugt",
            Self::UnsignedLessThanOrEqual => "ule",
        })
    }
}

/// Condition code for float comparisons (`fcmp`).
///
/// All comparisons except `NotEqual` are "ordered": they are false when
/// either operand is NaN. `NotEqual` is "unordered": true when either
/// operand is NaN. This matches IEEE-754 and Wasm semantics.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FloatCC {
    /// Ordered `==`.
    Equal,
    /// Unordered `!=`.
    NotEqual,
    /// Ordered `<`.
    LessThan,
    /// Ordered `<=`.
    LessThanOrEqual,
    /// Ordered `>`.
    GreaterThan,
    /// Ordered `>=`.
    GreaterThanOrEqual,
}

impl fmt::Display for FloatCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "le",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "ge",
        })
    }
}
