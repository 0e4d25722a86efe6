//! Crate-wide error taxonomy.
//!
//! Cancellation is deliberately *not* a variant here: it is a normal value
//! returned alongside the best-effort result (see `pipeline`), never an
//! `Err`. Everything that is a genuine failure to make forward progress
//! lives in `Error`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BudgetKind {
    Memory,
    Time,
}

impl std::fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetKind::Memory => write!(f, "memory"),
            BudgetKind::Time => write!(f, "time"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed input at line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("SAT oracle unavailable")]
    OracleUnavailable,

    #[error("{kind} budget exceeded")]
    BudgetExceeded { kind: BudgetKind },
}

pub type Result<T> = std::result::Result<T, Error>;
