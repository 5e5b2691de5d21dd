//! Block-streamed contraction of a fitted tensor with density matrices
//!
//! With `L_P` the unpacked pair matrix of auxiliary function `P`:
//!
//! - `J = Σ_P L_P tr(L_P D)`
//! - `K = Σ_P L_P D L_P`
//!
//! The auxiliary dimension is walked in blocks of `block_size` rows. Every
//! block contributes an independent partial J and K, so blocks may be summed
//! in any order and, in parallel mode, on different threads with private
//! accumulators.


use crate::basis::{pack_tril, unpack_tril};
use crate::config::{DfParams, BLOCKDIM};
use crate::error::{ensure_square, Result};
use crate::fitting::{prange, FittedTensor};
use crate::split::{DensitySplitter, EigenSplit};
use nalgebra::{DMatrix, DMatrixView, DVector, Scalar};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Whether the density may be assumed equal to its (conjugate) transpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hermiticity {
    Hermitian,
    NonHermitian,
}

/// Coulomb and exchange matrices for one density
#[derive(Debug, Clone, PartialEq)]
pub struct JkMatrices<T: Scalar> {
    pub vj: DMatrix<T>,
    pub vk: DMatrix<T>,
}

/// How K is contracted for one density
enum Kernel<'a> {
    /// Hermitian density expressed through scaled eigenvector columns.
    Split { dmtril: DVector<f64>, split: EigenSplit },
    /// Raw density, no symmetry assumed.
    Direct { dm: &'a DMatrix<f64> },
}

/// Partial J (packed) and K from a range of auxiliary blocks
struct Accumulator {
    vj: DVector<f64>,
    vk: DMatrix<f64>,
}

impl Accumulator {
    fn zeros(nao: usize) -> Self {
        Accumulator {
            vj: DVector::zeros(nao * (nao + 1) / 2),
            vk: DMatrix::zeros(nao, nao),
        }
    }

    fn merge(mut self, other: Accumulator) -> Self {
        self.vj += other.vj;
        self.vk += other.vk;
        self
    }
}

/// Non-relativistic J/K contraction engine
#[derive(Debug, Clone)]
pub struct BlockContractor {
    block_size: usize,
    parallel: bool,
}

impl Default for BlockContractor {
    fn default() -> Self {
        BlockContractor::new(BLOCKDIM)
    }
}

impl BlockContractor {
    pub fn new(block_size: usize) -> Self {
        BlockContractor {
            block_size: block_size.max(1),
            parallel: false,
        }
    }

    pub fn from_params(params: &DfParams) -> Self {
        BlockContractor::new(params.block_size()).with_parallel(params.parallel())
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// J and K for a single density.
    pub fn contract(
        &self,
        tensor: &FittedTensor<f64>,
        dm: &DMatrix<f64>,
        hermi: Hermiticity,
    ) -> Result<JkMatrices<f64>> {
        let start = Instant::now();
        let ranges: Vec<(usize, usize)> = prange(0, tensor.naux(), self.block_size).collect();
        let jk = self.contract_ranges(tensor, dm, hermi, &ranges)?;
        info!("vj and vk built in {:.3?}", start.elapsed());
        Ok(jk)
    }

    /// J and K for every density of a batch, in input order.
    pub fn contract_batch(
        &self,
        tensor: &FittedTensor<f64>,
        dms: &[DMatrix<f64>],
        hermi: Hermiticity,
    ) -> Result<Vec<JkMatrices<f64>>> {
        let start = Instant::now();
        let ranges: Vec<(usize, usize)> = prange(0, tensor.naux(), self.block_size).collect();
        let results = if self.parallel {
            dms.par_iter()
                .map(|dm| self.contract_ranges(tensor, dm, hermi, &ranges))
                .collect::<Result<Vec<_>>>()?
        } else {
            dms.iter()
                .map(|dm| self.contract_ranges(tensor, dm, hermi, &ranges))
                .collect::<Result<Vec<_>>>()?
        };
        info!(
            "vj and vk for {} densities built in {:.3?}",
            dms.len(),
            start.elapsed()
        );
        Ok(results)
    }

    /// Contract the given auxiliary ranges, in the given order.
    pub(crate) fn contract_ranges(
        &self,
        tensor: &FittedTensor<f64>,
        dm: &DMatrix<f64>,
        hermi: Hermiticity,
        ranges: &[(usize, usize)],
    ) -> Result<JkMatrices<f64>> {
        let nao = tensor.nao();
        ensure_square("density matrix", dm, nao)?;

        let kernel = match hermi {
            Hermiticity::Hermitian => match DensitySplitter::split(dm) {
                Some(split) => Kernel::Split {
                    dmtril: packed_pair_density(dm),
                    split,
                },
                None => {
                    debug!("No significant eigenvalues, using the direct contraction");
                    Kernel::Direct { dm }
                }
            },
            Hermiticity::NonHermitian => Kernel::Direct { dm },
        };

        let acc = if self.parallel {
            ranges
                .par_iter()
                .map(|&(b0, b1)| -> Result<Accumulator> {
                    let block = tensor.load_block(b0, b1)?;
                    let mut acc = Accumulator::zeros(nao);
                    accumulate_block(&kernel, block.view(), nao, &mut acc);
                    Ok(acc)
                })
                .try_reduce(|| Accumulator::zeros(nao), |a, b| Ok(a.merge(b)))?
        } else {
            let mut acc = Accumulator::zeros(nao);
            for &(b0, b1) in ranges {
                let block = tensor.load_block(b0, b1)?;
                accumulate_block(&kernel, block.view(), nao, &mut acc);
            }
            acc
        };

        Ok(JkMatrices {
            vj: unpack_tril(|k| acc.vj[k], nao),
            vk: acc.vk,
        })
    }
}

/// `pack(D + Dᵀ)` with the diagonal halved, so that `L_P · dmtril = tr(L_P D)`.
fn packed_pair_density(dm: &DMatrix<f64>) -> DVector<f64> {
    let mut dmtril = pack_tril(&(dm + dm.transpose()));
    for i in 0..dm.nrows() {
        dmtril[i * (i + 1) / 2 + i] *= 0.5;
    }
    dmtril
}

fn accumulate_block(
    kernel: &Kernel<'_>,
    block: DMatrixView<'_, f64>,
    nao: usize,
    acc: &mut Accumulator,
) {
    let nb = block.nrows();
    let unpack_row = |p: usize| unpack_tril(|k| block[(p, k)], nao);

    match kernel {
        Kernel::Split { dmtril, split } => {
            let rho = &block * dmtril;
            acc.vj += block.tr_mul(&rho);

            for (columns, sign) in [(&split.cpos, 1.0), (&split.cneg, -1.0)] {
                let m = columns.ncols();
                if m == 0 {
                    continue;
                }
                let mut buf = DMatrix::<f64>::zeros(nb * m, nao);
                for p in 0..nb {
                    let half = columns.tr_mul(&unpack_row(p));
                    buf.view_mut((p * m, 0), (m, nao)).copy_from(&half);
                }
                acc.vk += buf.tr_mul(&buf) * sign;
            }
        }
        Kernel::Direct { dm } => {
            let mut rho = DVector::<f64>::zeros(nb);
            let mut copy = DMatrix::<f64>::zeros(nao, nb * nao);
            let mut buf = DMatrix::<f64>::zeros(nb * nao, nao);
            // [L_0 L_1 ..] x [D L_0; D L_1; ..] = Σ_P L_P D L_P
            for p in 0..nb {
                let lp = unpack_row(p);
                let half = *dm * &lp;
                rho[p] = half.trace();
                copy.view_mut((0, p * nao), (nao, nao)).copy_from(&lp);
                buf.view_mut((p * nao, 0), (nao, nao)).copy_from(&half);
            }
            acc.vj += block.tr_mul(&rho);
            acc.vk += copy * buf;
        }
    }
}
