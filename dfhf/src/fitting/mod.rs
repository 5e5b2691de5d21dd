//! Construction of Cholesky-factorized three-index tensors
//!
//! Given raw three-centre integrals `R[P, ij] = (P|ij)` and the auxiliary
//! metric `V[P, Q] = (P|Q) = L Lᵀ`, the fitted tensor is `X = L⁻¹ R`, so that
//! `Xᵀ X = Rᵀ V⁻¹ R` approximates the four-index tensor.
//!
//! The fitter picks one of two storage strategies from a byte estimate:
//!
//! - in-core: a single triangular solve over the whole auxiliary range;
//! - out-of-core: block forward substitution
//!   `X_b = L_bb⁻¹ (R_b − Σ_{c<b} L_bc X_c)`, where earlier blocks are read back
//!   from a temporary file and each finished block is appended to it.
//!
//! Both strategies yield the same rows up to round-off.

mod store;
mod tensor;

pub use store::BlockStore;
pub use tensor::{Block, FittedTensor, TensorStorage};

use crate::basis::AuxiliaryBasis;
use crate::config::DfParams;
use crate::error::{DfError, Result};
use crate::relativistic::RelativisticFittedTensor;
use crate::source::{BlockScalar, IntegralEngine, SpinorIntegralEngine, ThreeCenterSource};
use nalgebra::linalg::Cholesky;
use nalgebra::DMatrix;
use std::time::Instant;
use tracing::{debug, info};

/// Half-open ranges `[i, min(i + step, end))` covering `[start, end)`.
pub fn prange(start: usize, end: usize, step: usize) -> impl Iterator<Item = (usize, usize)> {
    let step = step.max(1);
    (start..end)
        .step_by(step)
        .map(move |i| (i, (i + step).min(end)))
}

/// Builds fitted tensors for one auxiliary basis under a memory budget
#[derive(Debug, Clone)]
pub struct AuxiliaryFitter {
    auxbasis: AuxiliaryBasis,
    memory_budget: usize,
    block_size: usize,
}

impl AuxiliaryFitter {
    /// Validate the parameters and resolve the auxiliary basis name.
    pub fn new(params: &DfParams) -> Result<Self> {
        params.validate()?;
        let auxbasis = AuxiliaryBasis::parse(params.auxbasis())?;
        Ok(AuxiliaryFitter {
            auxbasis,
            memory_budget: params.memory_budget(),
            block_size: params.block_size(),
        })
    }

    pub fn auxbasis(&self) -> &AuxiliaryBasis {
        &self.auxbasis
    }

    pub fn memory_budget(&self) -> usize {
        self.memory_budget
    }

    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Fit the non-relativistic tensor for `engine`'s molecule and basis.
    pub fn build<E: IntegralEngine>(&self, engine: &E) -> Result<FittedTensor<f64>> {
        let source = engine.three_center(&self.auxbasis)?;
        if source.nao() != engine.nao() {
            return Err(DfError::dimension(
                "three-centre source orbitals",
                engine.nao(),
                source.nao(),
            ));
        }
        self.factorize(&source, self.memory_budget)
    }

    /// Fit the large-large and small-small spinor tensors.
    ///
    /// The memory budget is shared evenly between the two tensors.
    pub fn build_spinor<E: SpinorIntegralEngine>(
        &self,
        engine: &E,
    ) -> Result<RelativisticFittedTensor> {
        let (ll_source, ss_source) = engine.three_center_spinor(&self.auxbasis)?;
        for source in [&ll_source, &ss_source] {
            if source.nao() != engine.n2c() {
                return Err(DfError::dimension(
                    "three-centre spinor source",
                    engine.n2c(),
                    source.nao(),
                ));
            }
        }
        let budget = self.memory_budget / 2;
        let ll = self.factorize(&ll_source, budget)?;
        let ss = self.factorize(&ss_source, budget)?;
        RelativisticFittedTensor::new(ll, ss)
    }

    /// Factorize one source, choosing the storage strategy from `budget`.
    pub fn factorize<S: ThreeCenterSource>(
        &self,
        source: &S,
        budget: usize,
    ) -> Result<FittedTensor<S::Scalar>> {
        let start = Instant::now();
        let nao = source.nao();
        let naux = source.naux();
        let npair = source.npair();

        let required = npair * naux * S::Scalar::BYTES;
        let tensor = if required < budget {
            info!(
                "Fitting {} auxiliary functions in-core ({:.3} MB needed, budget {:.3} MB)",
                naux,
                required as f64 * 1e-6,
                budget as f64 * 1e-6
            );
            let lower = metric_cholesky(source)?;
            self.factorize_incore(source, &lower)?
        } else {
            info!(
                "Fitting {} auxiliary functions out-of-core ({:.3} MB needed, budget {:.3} MB)",
                naux,
                required as f64 * 1e-6,
                budget as f64 * 1e-6
            );
            let rows_per_block = self.outcore_rows(npair * S::Scalar::BYTES, budget)?;
            let lower = metric_cholesky(source)?;
            self.factorize_outcore(source, &lower, rows_per_block)?
        };

        debug_assert_eq!(tensor.nao(), nao);
        info!(
            "Fitted tensor with auxiliary basis {} built in {:.3?}",
            self.auxbasis,
            start.elapsed()
        );
        Ok(tensor)
    }

    fn factorize_incore<S: ThreeCenterSource>(
        &self,
        source: &S,
        lower: &DMatrix<S::Scalar>,
    ) -> Result<FittedTensor<S::Scalar>> {
        let naux = source.naux();
        let raw = source.raw_block(0, naux);
        check_raw_block(&raw, naux, source.npair())?;

        let rows = lower
            .solve_lower_triangular(&raw)
            .ok_or_else(singular_metric)?;
        FittedTensor::from_rows(source.nao(), rows)
    }

    fn factorize_outcore<S: ThreeCenterSource>(
        &self,
        source: &S,
        lower: &DMatrix<S::Scalar>,
        rows_per_block: usize,
    ) -> Result<FittedTensor<S::Scalar>> {
        let naux = source.naux();
        let npair = source.npair();

        let mut store = BlockStore::<S::Scalar>::create(npair)?;
        for (b0, b1) in prange(0, naux, rows_per_block) {
            let nb = b1 - b0;
            let mut rhs = source.raw_block(b0, b1);
            check_raw_block(&rhs, nb, npair)?;

            for (c0, c1) in prange(0, b0, rows_per_block) {
                let solved = store.read(c0, c1)?;
                rhs -= lower.view((b0, c0), (nb, c1 - c0)) * &solved;
            }

            let diagonal = lower.view((b0, b0), (nb, nb)).clone_owned();
            let block = diagonal
                .solve_lower_triangular(&rhs)
                .ok_or_else(singular_metric)?;
            store.append(&block)?;
            debug!("Stored fitted rows {}..{}", b0, b1);
        }

        Ok(FittedTensor::from_store(source.nao(), store))
    }

    /// Auxiliary rows per out-of-core step: one raw buffer plus one
    /// read-back buffer must fit in `budget`.
    fn outcore_rows(&self, row_bytes: usize, budget: usize) -> Result<usize> {
        let rows_per_block = if row_bytes == 0 {
            self.block_size
        } else {
            self.block_size.min(budget / (2 * row_bytes))
        };
        if rows_per_block == 0 {
            return Err(DfError::Resource {
                required: 2 * row_bytes,
                budget,
            });
        }
        debug!(
            "Out-of-core fitting uses blocks of {} auxiliary rows",
            rows_per_block
        );
        Ok(rows_per_block)
    }
}

/// Lower Cholesky factor of the auxiliary metric, promoted to the tensor scalar.
fn metric_cholesky<S: ThreeCenterSource>(source: &S) -> Result<DMatrix<S::Scalar>> {
    let naux = source.naux();
    let metric = source.metric();
    if metric.nrows() != naux || metric.ncols() != naux {
        return Err(DfError::dimension(
            "auxiliary metric",
            format!("{naux}x{naux}"),
            format!("{}x{}", metric.nrows(), metric.ncols()),
        ));
    }

    let cholesky = Cholesky::new(metric).ok_or_else(|| {
        DfError::Configuration(
            "auxiliary metric is not positive definite; the auxiliary basis is linearly dependent"
                .to_string(),
        )
    })?;
    Ok(cholesky.l().map(<S::Scalar as nalgebra::ComplexField>::from_real))
}

fn check_raw_block<T: BlockScalar>(raw: &DMatrix<T>, rows: usize, npair: usize) -> Result<()> {
    if raw.nrows() != rows || raw.ncols() != npair {
        return Err(DfError::dimension(
            "raw three-centre block",
            format!("{rows}x{npair}"),
            format!("{}x{}", raw.nrows(), raw.ncols()),
        ));
    }
    Ok(())
}

fn singular_metric() -> DfError {
    DfError::Configuration("auxiliary metric factor is singular".to_string())
}
