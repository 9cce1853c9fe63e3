// src/error.rs

use crate::eigen::arnoldi::ArnoldiError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or inconsistent parameters, or a call made before its inputs exist.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: String,
        expected: String,
        got: String,
    },

    /// Input that would otherwise produce NaN/Inf (zero Ms, zero vectors, ...).
    #[error("degenerate input: {0}")]
    Degenerate(String),

    #[error("iterative eigensolver failed: {0}")]
    Arnoldi(#[from] ArnoldiError),

    #[error("factorization failed: {0}")]
    Factorization(String),

    /// Two mode sets that should describe the same spectrum do not.
    #[error("mode sets are not equivalent: {0}")]
    NotEquivalent(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plotting error: {0}")]
    Plot(String),
}

impl Error {
    pub(crate) fn shape(what: &str, expected: impl std::fmt::Display, got: impl std::fmt::Display) -> Self {
        Error::ShapeMismatch {
            what: what.to_string(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}
