use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Invalid constraint: {field} — {reason}")]
    InvalidConstraint { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Infeasible problem: {0}")]
    Infeasible(String),

    #[error("Numerical instability in {context}")]
    NumericalInstability { context: String },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse grouping of errors for presentation layers that render
/// different guidance for "no data", "bad constraints" and "math broke".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NoData,
    InfeasibleConstraints,
    NumericalBreakdown,
    InvalidRequest,
}

impl OptimizerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OptimizerError::InsufficientData(_) => ErrorCategory::NoData,
            OptimizerError::InvalidConstraint { .. } | OptimizerError::Infeasible(_) => {
                ErrorCategory::InfeasibleConstraints
            }
            OptimizerError::NumericalInstability { .. } | OptimizerError::DivisionByZero { .. } => {
                ErrorCategory::NumericalBreakdown
            }
            OptimizerError::InvalidInput { .. }
            | OptimizerError::DateError(_)
            | OptimizerError::SerializationError(_) => ErrorCategory::InvalidRequest,
        }
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(e: serde_json::Error) -> Self {
        OptimizerError::SerializationError(e.to_string())
    }
}
