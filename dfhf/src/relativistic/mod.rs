//! Four-component (Dirac) density-fitted J/K
//!
//! The spinor density is split into large/small quadrants. Two fitted tensors
//! over the same auxiliary basis are used, one for large-large spinor products
//! (`LL_P`) and one for small-small products (`SS_P`). With `c1 = 1 / (2c)`:
//!
//! - `ρ_P = tr(LL_P D_LL) + c1² tr(SS_P D_SS)`
//! - `J_LL = Σ ρ_P LL_P`, `J_SS = c1² Σ ρ_P SS_P`
//! - `K_LL = Σ LL_P D_LL LL_P`, `K_LS = c1² Σ LL_P D_LS SS_P`,
//!   `K_SL = c1² Σ SS_P D_SL LL_P`, `K_SS = c1⁴ Σ SS_P D_SS SS_P`
//!
//! For Hermitian densities `K_SL = K_LSᴴ` and is not contracted separately.


use crate::basis::unpack_full;
use crate::config::{DfParams, BLOCKDIM, LIGHT_SPEED};
use crate::contract::{Hermiticity, JkMatrices};
use crate::error::{ensure_square, DfError, Result};
use crate::fitting::{prange, FittedTensor};
use nalgebra::{DMatrix, DMatrixView, DVector};
use num_complex::Complex64;
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

/// Large-large and small-small fitted spinor tensors
pub struct RelativisticFittedTensor {
    pub ll: FittedTensor<Complex64>,
    pub ss: FittedTensor<Complex64>,
}

impl RelativisticFittedTensor {
    pub fn new(ll: FittedTensor<Complex64>, ss: FittedTensor<Complex64>) -> Result<Self> {
        if ll.nao() != ss.nao() {
            return Err(DfError::dimension("small-small spinor count", ll.nao(), ss.nao()));
        }
        if ll.naux() != ss.naux() {
            return Err(DfError::dimension(
                "small-small auxiliary count",
                ll.naux(),
                ss.naux(),
            ));
        }
        Ok(RelativisticFittedTensor { ll, ss })
    }

    pub fn n2c(&self) -> usize {
        self.ll.nao()
    }

    pub fn naux(&self) -> usize {
        self.ll.naux()
    }

    pub fn is_out_of_core(&self) -> bool {
        self.ll.is_out_of_core() || self.ss.is_out_of_core()
    }
}

/// Density quadrants with the coupling scalings applied
struct Quadrants {
    ll: DMatrix<Complex64>,
    ls: DMatrix<Complex64>,
    sl: DMatrix<Complex64>,
    ss: DMatrix<Complex64>,
}

struct Accumulator {
    vj_ll: DVector<Complex64>,
    vj_ss: DVector<Complex64>,
    vk_ll: DMatrix<Complex64>,
    vk_ls: DMatrix<Complex64>,
    vk_sl: DMatrix<Complex64>,
    vk_ss: DMatrix<Complex64>,
}

impl Accumulator {
    fn zeros(n2c: usize) -> Self {
        Accumulator {
            vj_ll: DVector::zeros(n2c * n2c),
            vj_ss: DVector::zeros(n2c * n2c),
            vk_ll: DMatrix::zeros(n2c, n2c),
            vk_ls: DMatrix::zeros(n2c, n2c),
            vk_sl: DMatrix::zeros(n2c, n2c),
            vk_ss: DMatrix::zeros(n2c, n2c),
        }
    }

    fn merge(mut self, other: Accumulator) -> Self {
        self.vj_ll += other.vj_ll;
        self.vj_ss += other.vj_ss;
        self.vk_ll += other.vk_ll;
        self.vk_ls += other.vk_ls;
        self.vk_sl += other.vk_sl;
        self.vk_ss += other.vk_ss;
        self
    }
}

/// Four-component J/K contraction engine
#[derive(Debug, Clone)]
pub struct RelativisticBlockContractor {
    block_size: usize,
    parallel: bool,
    light_speed: f64,
}

impl Default for RelativisticBlockContractor {
    fn default() -> Self {
        RelativisticBlockContractor::new(BLOCKDIM)
    }
}

impl RelativisticBlockContractor {
    pub fn new(block_size: usize) -> Self {
        RelativisticBlockContractor {
            block_size: block_size.max(1),
            parallel: false,
            light_speed: LIGHT_SPEED,
        }
    }

    pub fn from_params(params: &DfParams) -> Self {
        RelativisticBlockContractor::new(params.block_size())
            .with_parallel(params.parallel())
            .with_light_speed(params.light_speed())
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_light_speed(mut self, light_speed: f64) -> Self {
        self.light_speed = light_speed;
        self
    }

    /// Small-component coupling `1 / (2c)`.
    pub fn c1(&self) -> f64 {
        0.5 / self.light_speed
    }

    pub fn contract(
        &self,
        tensor: &RelativisticFittedTensor,
        dm: &DMatrix<Complex64>,
        hermi: Hermiticity,
    ) -> Result<JkMatrices<Complex64>> {
        let start = Instant::now();
        let jk = self.contract_one(tensor, dm, hermi)?;
        info!("Relativistic vj and vk built in {:.3?}", start.elapsed());
        Ok(jk)
    }

    pub fn contract_batch(
        &self,
        tensor: &RelativisticFittedTensor,
        dms: &[DMatrix<Complex64>],
        hermi: Hermiticity,
    ) -> Result<Vec<JkMatrices<Complex64>>> {
        let start = Instant::now();
        let results = if self.parallel {
            dms.par_iter()
                .map(|dm| self.contract_one(tensor, dm, hermi))
                .collect::<Result<Vec<_>>>()?
        } else {
            dms.iter()
                .map(|dm| self.contract_one(tensor, dm, hermi))
                .collect::<Result<Vec<_>>>()?
        };
        info!(
            "Relativistic vj and vk for {} densities built in {:.3?}",
            dms.len(),
            start.elapsed()
        );
        Ok(results)
    }

    fn contract_one(
        &self,
        tensor: &RelativisticFittedTensor,
        dm: &DMatrix<Complex64>,
        hermi: Hermiticity,
    ) -> Result<JkMatrices<Complex64>> {
        let n2c = tensor.n2c();
        ensure_square("spinor density matrix", dm, 2 * n2c)?;

        let c1 = self.c1();
        let quadrant = |r: usize, c: usize, scale: f64| {
            dm.view((r, c), (n2c, n2c)).clone_owned() * Complex64::new(scale, 0.0)
        };
        let quadrants = Quadrants {
            ll: quadrant(0, 0, 1.0),
            ls: quadrant(0, n2c, c1),
            sl: quadrant(n2c, 0, c1),
            ss: quadrant(n2c, n2c, c1 * c1),
        };
        let with_sl = hermi == Hermiticity::NonHermitian;

        let ranges: Vec<(usize, usize)> = prange(0, tensor.naux(), self.block_size).collect();
        let block_pass = |&(b0, b1): &(usize, usize)| -> Result<Accumulator> {
            let ll = tensor.ll.load_block(b0, b1)?;
            let ss = tensor.ss.load_block(b0, b1)?;
            let mut acc = Accumulator::zeros(n2c);
            accumulate_block(ll.view(), ss.view(), &quadrants, c1, with_sl, n2c, &mut acc);
            Ok(acc)
        };

        let acc = if self.parallel {
            ranges
                .par_iter()
                .map(block_pass)
                .try_reduce(|| Accumulator::zeros(n2c), |a, b| Ok(a.merge(b)))?
        } else {
            let mut acc = Accumulator::zeros(n2c);
            for range in &ranges {
                acc = acc.merge(block_pass(range)?);
            }
            acc
        };

        let vk_sl = if with_sl {
            acc.vk_sl
        } else {
            acc.vk_ls.adjoint()
        };

        let mut vj = DMatrix::<Complex64>::zeros(2 * n2c, 2 * n2c);
        let mut vk = DMatrix::<Complex64>::zeros(2 * n2c, 2 * n2c);
        vj.view_mut((0, 0), (n2c, n2c))
            .copy_from(&unpack_full(|k| acc.vj_ll[k], n2c));
        vj.view_mut((n2c, n2c), (n2c, n2c))
            .copy_from(&unpack_full(|k| acc.vj_ss[k], n2c));
        vk.view_mut((0, 0), (n2c, n2c)).copy_from(&acc.vk_ll);
        vk.view_mut((0, n2c), (n2c, n2c)).copy_from(&acc.vk_ls);
        vk.view_mut((n2c, 0), (n2c, n2c)).copy_from(&vk_sl);
        vk.view_mut((n2c, n2c), (n2c, n2c)).copy_from(&acc.vk_ss);

        Ok(JkMatrices { vj, vk })
    }
}

fn accumulate_block(
    ll: DMatrixView<'_, Complex64>,
    ss: DMatrixView<'_, Complex64>,
    dm: &Quadrants,
    c1: f64,
    with_sl: bool,
    n2c: usize,
    acc: &mut Accumulator,
) {
    let c1 = Complex64::new(c1, 0.0);
    let c1sq = c1 * c1;
    let nb = ll.nrows();

    let mut rho = DVector::<Complex64>::zeros(nb);
    for p in 0..nb {
        let ll_p = unpack_full(|k| ll[(p, k)], n2c);
        let ss_p = unpack_full(|k| ss[(p, k)], n2c);

        let ll_d = &ll_p * &dm.ll;
        let ss_d = &ss_p * &dm.ss;
        rho[p] = ll_d.trace() + ss_d.trace();

        acc.vk_ll += &ll_d * &ll_p;
        acc.vk_ls += (&ll_p * &dm.ls * &ss_p) * c1;
        acc.vk_ss += (&ss_d * &ss_p) * c1sq;
        if with_sl {
            acc.vk_sl += (&ss_p * &dm.sl * &ll_p) * c1;
        }
    }

    acc.vj_ll += ll.tr_mul(&rho);
    acc.vj_ss += ss.tr_mul(&rho) * c1sq;
}
