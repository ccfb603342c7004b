//! Error types for causal discovery
//!
//! Statistical routines return [`CausalError`]; binaries wrap it in
//! `anyhow` at the edges.

use thiserror::Error;

/// Errors raised by the statistics, discovery and I/O layers.
#[derive(Debug, Error)]
pub enum CausalError {
    /// Not enough observations for the requested test.
    #[error("insufficient data: need more than {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Design matrix is rank deficient.
    #[error("singular design matrix: {0}")]
    Singular(String),

    /// Constant or otherwise unusable series.
    #[error("degenerate series: {0}")]
    DegenerateSeries(String),

    /// Matrices or panels that should line up do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, CausalError>;
