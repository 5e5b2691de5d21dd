//! Error taxonomy for the density-fitting J/K engine

use thiserror::Error;

/// Failures surfaced by fitting and contraction.
///
/// None of these are retried internally; every call is a pure computation the
/// caller can repeat after fixing its inputs.
#[derive(Debug, Error)]
pub enum DfError {
    /// Unknown auxiliary basis, unusable auxiliary metric or invalid parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The memory budget cannot hold even the smallest streaming buffer.
    #[error("memory budget of {budget} bytes is too small, at least {required} bytes are needed")]
    Resource { required: usize, budget: usize },

    /// Shape mismatch between tensor, density or source data.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    Dimension {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// The temporary backing store of an out-of-core tensor failed.
    #[error("out-of-core store failure: {0}")]
    Io(#[from] std::io::Error),

    /// Rows of an out-of-core tensor could not be encoded or decoded.
    #[error("out-of-core row encoding failure: {0}")]
    Codec(#[from] bincode::Error),
}

impl DfError {
    pub(crate) fn dimension(
        what: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        DfError::Dimension {
            what,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DfError>;

/// Fails with [`DfError::Dimension`] unless `matrix` is `n x n`.
pub(crate) fn ensure_square<T: nalgebra::Scalar>(
    what: &'static str,
    matrix: &nalgebra::DMatrix<T>,
    n: usize,
) -> Result<()> {
    if matrix.nrows() != n || matrix.ncols() != n {
        return Err(DfError::dimension(
            what,
            format!("{n}x{n}"),
            format!("{}x{}", matrix.nrows(), matrix.ncols()),
        ));
    }
    Ok(())
}
