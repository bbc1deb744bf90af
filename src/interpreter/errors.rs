//! Runtime error types for the interpreter
//!
//! This module defines [`RuntimeError`], which represents all errors that can occur
//! during evaluation (as opposed to parse errors).
//!
//! All runtime errors are fatal - they halt evaluation and report the offending
//! source location. A pattern that fails to match is *not* an error: it is the
//! engine's unwinding status and never surfaces as a `RuntimeError`.

use crate::memory::heap::HeapFault;
use crate::parser::ast::SourceLocation;
use thiserror::Error;

/// Runtime errors that can occur during evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Reference to a name bound in no enclosing scope
    #[error("Undefined variable '{name}' at line {}", .location.line)]
    UndefinedVariable {
        name: String,
        location: SourceLocation,
    },

    /// Missing object field or node property
    #[error("Undefined property '{name}' on {on} at line {}", .location.line)]
    UndefinedProperty {
        name: String,
        on: String,
        location: SourceLocation,
    },

    /// Operand of the wrong type
    #[error("Type error at line {}: expected {expected}, got {got}", .location.line)]
    TypeError {
        expected: String,
        got: String,
        location: SourceLocation,
    },

    /// Index outside a list, string or bit list
    #[error("Index {index} out of bounds for length {len} at line {}", .location.line)]
    IndexOutOfBounds {
        index: i64,
        len: usize,
        location: SourceLocation,
    },

    /// Division or modulo by zero
    #[error("{operation} at line {}", .location.line)]
    DivisionError {
        operation: String,
        location: SourceLocation,
    },

    /// Function argument count mismatch
    #[error(
        "Function '{function}' expects {expected} argument(s), got {got} at line {}",
        .location.line
    )]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        got: usize,
        location: SourceLocation,
    },

    /// Calling a value that is not a function
    #[error("'{name}' is not callable at line {}", .location.line)]
    NotCallable {
        name: String,
        location: SourceLocation,
    },

    /// Using a function that is not a rule as a pattern, or the reverse
    #[error("'{name}' is not a rule at line {}", .location.line)]
    NotARule {
        name: String,
        location: SourceLocation,
    },

    /// A language mutator applied to a frozen value
    #[error("Cannot modify frozen {kind} at line {}", .location.line)]
    FrozenModification {
        kind: String,
        location: SourceLocation,
    },

    /// Checked integer arithmetic overflowed
    #[error("Integer overflow in {operation} at line {}", .location.line)]
    IntegerOverflow {
        operation: String,
        location: SourceLocation,
    },

    /// `return`, `break` or `continue` with nowhere to go
    #[error("'{statement}' outside of a {expected} at line {}", .location.line)]
    InvalidControlFlow {
        statement: &'static str,
        expected: &'static str,
        location: SourceLocation,
    },

    /// Heap invariant violation
    #[error("Heap fault at line {}: {source}", .location.line)]
    Heap {
        source: HeapFault,
        location: SourceLocation,
    },

    /// Frame stack deeper than the configured limit
    #[error("Frame limit of {limit} exceeded at line {} (runaway recursion?)", .location.line)]
    FrameLimitExceeded {
        limit: usize,
        location: SourceLocation,
    },

    /// Evaluation ran longer than the configured step budget
    #[error("Step limit of {limit} exceeded at line {}", .location.line)]
    StepLimitExceeded {
        limit: u64,
        location: SourceLocation,
    },

    /// Engine state that should be unreachable
    #[error("Internal error at line {}: {message}", .location.line)]
    Internal {
        message: String,
        location: SourceLocation,
    },
}

impl RuntimeError {
    pub fn location(&self) -> &SourceLocation {
        match self {
            RuntimeError::UndefinedVariable { location, .. }
            | RuntimeError::UndefinedProperty { location, .. }
            | RuntimeError::TypeError { location, .. }
            | RuntimeError::IndexOutOfBounds { location, .. }
            | RuntimeError::DivisionError { location, .. }
            | RuntimeError::ArgumentCountMismatch { location, .. }
            | RuntimeError::NotCallable { location, .. }
            | RuntimeError::NotARule { location, .. }
            | RuntimeError::FrozenModification { location, .. }
            | RuntimeError::IntegerOverflow { location, .. }
            | RuntimeError::InvalidControlFlow { location, .. }
            | RuntimeError::Heap { location, .. }
            | RuntimeError::FrameLimitExceeded { location, .. }
            | RuntimeError::StepLimitExceeded { location, .. }
            | RuntimeError::Internal { location, .. } => location,
        }
    }

    pub(crate) fn type_error(expected: &str, got: String, location: SourceLocation) -> Self {
        RuntimeError::TypeError {
            expected: expected.to_string(),
            got,
            location,
        }
    }

    pub(crate) fn internal(message: impl Into<String>, location: SourceLocation) -> Self {
        RuntimeError::Internal {
            message: message.into(),
            location,
        }
    }
}

/// Attach a source location to a heap fault
pub(crate) trait AtLocation<T> {
    fn at(self, location: SourceLocation) -> Result<T, RuntimeError>;
}

impl<T> AtLocation<T> for Result<T, HeapFault> {
    fn at(self, location: SourceLocation) -> Result<T, RuntimeError> {
        self.map_err(|source| RuntimeError::Heap { source, location })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_line() {
        let err = RuntimeError::ArgumentCountMismatch {
            function: "push".to_string(),
            expected: 2,
            got: 1,
            location: SourceLocation::new(7, 3),
        };
        assert_eq!(
            err.to_string(),
            "Function 'push' expects 2 argument(s), got 1 at line 7"
        );

        let fault: Result<(), HeapFault> = Err(HeapFault::Dangling(4));
        let err = fault.at(SourceLocation::new(2, 1)).unwrap_err();
        assert_eq!(err.location().line, 2);
        assert!(err.to_string().contains("dangling handle #4"));
    }
}
