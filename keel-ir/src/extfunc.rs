//! External function calls.
//!
//! To a keel IR function, all functions are "external". Directly called
//! functions must be declared in the preamble, and all function calls must
//! have a signature.

use crate::entities::SigRef;
use crate::types::Type;
use core::fmt;

/// The special meaning of a function parameter, if any.
///
/// Every compiled function takes the execution context pointer and the
/// module context pointer as its first two arguments, ahead of the source
/// language's own parameters. Marking them lets consumers (and the Wasm
/// frontend's local binding logic) tell them apart from normal parameters
/// without positional conventions.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ArgumentPurpose {
    /// A normal source-language parameter or result.
    Normal,
    /// The execution context pointer shared across a call chain.
    ExecutionContext,
    /// The callee's module context pointer.
    ModuleContext,
}

impl fmt::Display for ArgumentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::ExecutionContext => "exec_ctx",
            Self::ModuleContext => "module_ctx",
        })
    }
}

/// Function parameter or return value descriptor.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct AbiParam {
    /// Type of the parameter value.
    pub value_type: Type,
    /// Special meaning of the parameter, if any.
    pub purpose: ArgumentPurpose,
}

impl AbiParam {
    /// Create a parameter with default flags.
    pub fn new(value_type: Type) -> Self {
        Self {
            value_type,
            purpose: ArgumentPurpose::Normal,
        }
    }

    /// Create a special-purpose parameter that is not part of the source
    /// language's arguments.
    pub fn special(value_type: Type, purpose: ArgumentPurpose) -> Self {
        Self {
            value_type,
            purpose,
        }
    }
}

impl fmt::Display for AbiParam {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value_type)?;
        if self.purpose != ArgumentPurpose::Normal {
            write!(f, " {}", self.purpose)?;
        }
        Ok(())
    }
}

/// A function signature: the types of a function's parameters and results.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Signature {
    /// The arguments passed to the function.
    pub params: Vec<AbiParam>,
    /// Values returned from the function.
    pub returns: Vec<AbiParam>,
}

impl Signature {
    /// Create a new blank signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the signature so it is as if `new()` was called.
    pub fn clear(&mut self) {
        self.params.clear();
        self.returns.clear();
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ")")?;
        if !self.returns.is_empty() {
            write!(f, " -> ")?;
            for (i, r) in self.returns.iter().enumerate() {
                if i != 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{r}")?;
            }
        }
        Ok(())
    }
}

/// The name of an external function, stable across compilations.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ExternalName {
    /// A name in a `(namespace, index)` scheme decided by the embedder.
    /// The Wasm frontend uses namespace 0 for function-index space.
    User {
        /// Embedder-defined namespace.
        namespace: u32,
        /// Index within the namespace.
        index: u32,
    },
    /// A test case name, used by unit tests and the textual format.
    Testcase(String),
}

impl ExternalName {
    /// Create a `(namespace, index)` name.
    pub fn user(namespace: u32, index: u32) -> Self {
        Self::User { namespace, index }
    }

    /// Create a test case name.
    pub fn testcase(name: impl Into<String>) -> Self {
        Self::Testcase(name.into())
    }
}

impl Default for ExternalName {
    fn default() -> Self {
        Self::user(0, 0)
    }
}

impl fmt::Display for ExternalName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::User { namespace, index } => write!(f, "u{namespace}:{index}"),
            Self::Testcase(name) => write!(f, "%{name}"),
        }
    }
}

/// An external function declared in the preamble, ready to be called
/// directly.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ExtFuncData {
    /// Name of the external function.
    pub name: ExternalName,
    /// Call signature, declared in the same preamble.
    pub signature: SigRef,
}

impl fmt::Display for ExtFuncData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_display() {
        let mut sig = Signature::new();
        sig.params
            .push(AbiParam::special(Type::I64, ArgumentPurpose::ExecutionContext));
        sig.params
            .push(AbiParam::special(Type::I64, ArgumentPurpose::ModuleContext));
        sig.params.push(AbiParam::new(Type::I32));
        sig.returns.push(AbiParam::new(Type::I32));
        assert_eq!(
            sig.to_string(),
            "(i64 exec_ctx, i64 module_ctx, i32) -> i32"
        );
    }

    #[test]
    fn names() {
        assert_eq!(ExternalName::user(0, 13).to_string(), "u0:13");
        assert_eq!(ExternalName::testcase("add").to_string(), "%add");
    }
}
