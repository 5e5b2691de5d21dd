//! Positive/negative eigen-split of symmetric density matrices
//!
//! A density handed to the J/K builder is not necessarily positive
//! semi-definite: incremental Fock builds pass density *differences*. The
//! exchange contraction `Σ_P L_P D L_P` is evaluated as `Σ_P (L_P C)(L_P C)ᵀ`,
//! which needs `D = C Cᵀ`. Splitting `D = C₊C₊ᵀ − C₋C₋ᵀ` keeps that form for
//! indefinite matrices.

use nalgebra::DMatrix;
use tracing::debug;

/// Eigenvalues with `|e| <= OCCDROP` are dropped from both sets.
///
/// This is a numerical-stability cut that removes columns contributing only
/// round-off, not a physical truncation of the density.
pub const OCCDROP: f64 = 1e-12;

/// Scaled eigenvector columns of a symmetric density
#[derive(Debug, Clone)]
pub struct EigenSplit {
    /// `v · sqrt(e)` for every eigenvalue `e > OCCDROP`.
    pub cpos: DMatrix<f64>,
    /// `v · sqrt(−e)` for every eigenvalue `e < −OCCDROP`.
    pub cneg: DMatrix<f64>,
}

impl EigenSplit {
    pub fn npos(&self) -> usize {
        self.cpos.ncols()
    }

    pub fn nneg(&self) -> usize {
        self.cneg.ncols()
    }

    /// `cpos·cposᵀ − cneg·cnegᵀ`
    pub fn reconstruct(&self) -> DMatrix<f64> {
        &self.cpos * self.cpos.transpose() - &self.cneg * self.cneg.transpose()
    }
}

pub struct DensitySplitter;

impl DensitySplitter {
    /// Split the symmetric part `½(D + Dᵀ)` of `dm`.
    ///
    /// Returns `None` when no eigenvalue lies outside the `OCCDROP` band, in
    /// which case the caller should use the direct contraction.
    pub fn split(dm: &DMatrix<f64>) -> Option<EigenSplit> {
        let n = dm.nrows();
        let symmetric = (dm + dm.transpose()) * 0.5;
        let eig = symmetric.symmetric_eigen();

        let pos: Vec<usize> = (0..n).filter(|&i| eig.eigenvalues[i] > OCCDROP).collect();
        let neg: Vec<usize> = (0..n).filter(|&i| eig.eigenvalues[i] < -OCCDROP).collect();
        debug!(
            "Density eigen-split: {} positive, {} negative, {} dropped",
            pos.len(),
            neg.len(),
            n - pos.len() - neg.len()
        );

        if pos.is_empty() && neg.is_empty() {
            return None;
        }

        let scaled_columns = |selected: &[usize]| {
            DMatrix::from_fn(n, selected.len(), |row, col| {
                let k = selected[col];
                eig.eigenvectors[(row, k)] * eig.eigenvalues[k].abs().sqrt()
            })
        };

        Some(EigenSplit {
            cpos: scaled_columns(&pos),
            cneg: scaled_columns(&neg),
        })
    }
}
