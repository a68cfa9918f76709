use thiserror::Error;

/// Errors raised while wiring up or evaluating gradients and preconditioners.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("branch-rate gradient is not yet implemented for {count} traits (expected 1)")]
    UnsupportedTraitCount { count: usize },

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("node {node} maps to parameter index {index}, outside dimension {dimension}")]
    ParameterIndexOutOfRange {
        node: usize,
        index: usize,
        dimension: usize,
    },

    #[error("index {index} is outside dimension {dimension}")]
    IndexOutOfRange { index: usize, dimension: usize },

    #[error("parameter index {index} is assigned to more than one branch")]
    DuplicateParameterIndex { index: usize },

    #[error("matrix is not symmetric positive definite")]
    NotPositiveDefinite,

    #[error("unknown preconditioning type: {0}")]
    UnknownPreconditioning(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn dimension(what: &'static str, expected: usize, found: usize) -> Self {
        Error::DimensionMismatch {
            what,
            expected,
            found,
        }
    }
}
