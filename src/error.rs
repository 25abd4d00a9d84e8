//! Error types for cuantizar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuantError {
    #[error("Invalid quantization config: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Shape error: {0}")]
    ShapeError(String),

    #[error("Non-finite input: {count} of {len} values are NaN or infinite")]
    NonFiniteInput { count: usize, len: usize },

    #[error("Invalid einsum equation: {0}")]
    InvalidEquation(String),

    #[error(
        "Accumulator overflow: contraction of {contraction} with |lhs| <= {lhs_max} and |rhs| <= {rhs_max} exceeds i64"
    )]
    AccumulatorOverflow {
        contraction: usize,
        lhs_max: i64,
        rhs_max: i64,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, QuantError>;
