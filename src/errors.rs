/// Dicer error types
///
/// One failure enum shared by the sampler and the symbolic compiler. Every
/// variant aborts the current run or compilation; a failed `observe` is not
/// an error (the sampler discards the trial, the compiler folds it into the
/// observation marginal).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiceError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiceError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeKind { expected: String, found: String },

    #[error("identifier not defined: '{name}'")]
    UnboundIdent { name: String },

    #[error("arity mismatch calling '{function}': expected {expected} args, found {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("range error: {message}")]
    Range { message: String },

    #[error("duplicate function definition: '{name}'")]
    DuplicateFunction { name: String },

    #[error("recursion or mutual recursion detected involving '{function}'")]
    RecursionDetected { function: String },

    #[error("infeasible observation: the observed event has probability zero")]
    InfeasibleObservation,
}

impl DiceError {
    pub fn type_kind(expected: impl Into<String>, found: impl Into<String>) -> Self {
        DiceError::TypeKind {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        DiceError::UnboundIdent { name: name.into() }
    }

    pub fn range(message: impl Into<String>) -> Self {
        DiceError::Range {
            message: message.into(),
        }
    }
}
