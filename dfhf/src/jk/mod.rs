//! J/K builder strategies held by the SCF driver
//!
//! The SCF loop talks to a [`JKBuilder`] and never needs to know whether J and
//! K come from the exact four-index integrals or from a fitted tensor. The
//! strategy is picked when the builder is constructed.

#[cfg(test)]
mod tests;

use crate::config::DfParams;
use crate::contract::{BlockContractor, Hermiticity, JkMatrices};
use crate::error::{ensure_square, Result};
use crate::fitting::{AuxiliaryFitter, FittedTensor};
use crate::relativistic::{RelativisticBlockContractor, RelativisticFittedTensor};
use crate::source::{IntegralEngine, SpinorIntegralEngine};
use nalgebra::{DMatrix, Scalar};
use num_complex::Complex64;
use rayon::prelude::*;
use tracing::info;

/// Capability to turn density matrices into Coulomb and exchange matrices
pub trait JKBuilder {
    type Scalar: Scalar;

    fn get_jk(
        &mut self,
        dm: &DMatrix<Self::Scalar>,
        hermi: Hermiticity,
    ) -> Result<JkMatrices<Self::Scalar>>;

    /// One result per density, in input order.
    fn get_jk_batch(
        &mut self,
        dms: &[DMatrix<Self::Scalar>],
        hermi: Hermiticity,
    ) -> Result<Vec<JkMatrices<Self::Scalar>>> {
        dms.iter().map(|dm| self.get_jk(dm, hermi)).collect()
    }
}

/// Density-fitted J/K with a lazily built, cached fitted tensor
pub struct FittedJKBuilder<E: IntegralEngine> {
    engine: E,
    fitter: AuxiliaryFitter,
    contractor: BlockContractor,
    cderi: Option<FittedTensor<f64>>,
}

impl<E: IntegralEngine> FittedJKBuilder<E> {
    /// Fails with a configuration error for unknown auxiliary bases.
    pub fn new(engine: E, params: &DfParams) -> Result<Self> {
        let fitter = AuxiliaryFitter::new(params)?;
        info!("Density fitting enabled with auxiliary basis {}", fitter.auxbasis());
        Ok(FittedJKBuilder {
            engine,
            fitter,
            contractor: BlockContractor::from_params(params),
            cderi: None,
        })
    }

    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.fitter = self.fitter.with_memory_budget(bytes);
        self.cderi = None;
        self
    }

    /// Build the fitted tensor unless it is already cached.
    pub fn ensure_built(&mut self) -> Result<&FittedTensor<f64>> {
        let tensor = match self.cderi.take() {
            Some(tensor) => tensor,
            None => self.fitter.build(&self.engine)?,
        };
        Ok(self.cderi.insert(tensor))
    }

    /// Drop the cached tensor; the next J/K request rebuilds it.
    pub fn invalidate(&mut self) {
        if self.cderi.take().is_some() {
            info!("Fitted tensor invalidated");
        }
    }

    /// Switch to a new molecule or basis.
    pub fn rebind(&mut self, engine: E) {
        self.engine = engine;
        self.invalidate();
    }

    pub fn is_built(&self) -> bool {
        self.cderi.is_some()
    }

    pub fn fitted_tensor(&self) -> Option<&FittedTensor<f64>> {
        self.cderi.as_ref()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: IntegralEngine> JKBuilder for FittedJKBuilder<E> {
    type Scalar = f64;

    fn get_jk(&mut self, dm: &DMatrix<f64>, hermi: Hermiticity) -> Result<JkMatrices<f64>> {
        let contractor = self.contractor.clone();
        let tensor = self.ensure_built()?;
        contractor.contract(tensor, dm, hermi)
    }

    fn get_jk_batch(
        &mut self,
        dms: &[DMatrix<f64>],
        hermi: Hermiticity,
    ) -> Result<Vec<JkMatrices<f64>>> {
        let contractor = self.contractor.clone();
        let tensor = self.ensure_built()?;
        contractor.contract_batch(tensor, dms, hermi)
    }
}

/// Four-component density-fitted J/K
pub struct RelativisticFittedJKBuilder<E: SpinorIntegralEngine> {
    engine: E,
    fitter: AuxiliaryFitter,
    contractor: RelativisticBlockContractor,
    cderi: Option<RelativisticFittedTensor>,
}

impl<E: SpinorIntegralEngine> RelativisticFittedJKBuilder<E> {
    pub fn new(engine: E, params: &DfParams) -> Result<Self> {
        let fitter = AuxiliaryFitter::new(params)?;
        info!(
            "Relativistic density fitting enabled with auxiliary basis {}",
            fitter.auxbasis()
        );
        Ok(RelativisticFittedJKBuilder {
            engine,
            fitter,
            contractor: RelativisticBlockContractor::from_params(params),
            cderi: None,
        })
    }

    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.fitter = self.fitter.with_memory_budget(bytes);
        self.cderi = None;
        self
    }

    pub fn ensure_built(&mut self) -> Result<&RelativisticFittedTensor> {
        let tensor = match self.cderi.take() {
            Some(tensor) => tensor,
            None => self.fitter.build_spinor(&self.engine)?,
        };
        Ok(self.cderi.insert(tensor))
    }

    pub fn invalidate(&mut self) {
        if self.cderi.take().is_some() {
            info!("Relativistic fitted tensors invalidated");
        }
    }

    pub fn rebind(&mut self, engine: E) {
        self.engine = engine;
        self.invalidate();
    }

    pub fn is_built(&self) -> bool {
        self.cderi.is_some()
    }

    pub fn fitted_tensor(&self) -> Option<&RelativisticFittedTensor> {
        self.cderi.as_ref()
    }
}

impl<E: SpinorIntegralEngine> JKBuilder for RelativisticFittedJKBuilder<E> {
    type Scalar = Complex64;

    fn get_jk(
        &mut self,
        dm: &DMatrix<Complex64>,
        hermi: Hermiticity,
    ) -> Result<JkMatrices<Complex64>> {
        let contractor = self.contractor.clone();
        let tensor = self.ensure_built()?;
        contractor.contract(tensor, dm, hermi)
    }

    fn get_jk_batch(
        &mut self,
        dms: &[DMatrix<Complex64>],
        hermi: Hermiticity,
    ) -> Result<Vec<JkMatrices<Complex64>>> {
        let contractor = self.contractor.clone();
        let tensor = self.ensure_built()?;
        contractor.contract_batch(tensor, dms, hermi)
    }
}

/// Exact J/K from a four-index integral function `(ij|kl)`
pub struct DirectJKBuilder<F>
where
    F: Fn(usize, usize, usize, usize) -> f64 + Sync,
{
    nao: usize,
    eri: F,
}

impl<F> DirectJKBuilder<F>
where
    F: Fn(usize, usize, usize, usize) -> f64 + Sync,
{
    pub fn new(nao: usize, eri: F) -> Self {
        DirectJKBuilder { nao, eri }
    }
}

impl<F> JKBuilder for DirectJKBuilder<F>
where
    F: Fn(usize, usize, usize, usize) -> f64 + Sync,
{
    type Scalar = f64;

    /// `J_ij = Σ_kl (ij|kl) D_lk`, `K_ij = Σ_kl (ik|lj) D_kl`
    fn get_jk(&mut self, dm: &DMatrix<f64>, _hermi: Hermiticity) -> Result<JkMatrices<f64>> {
        let n = self.nao;
        ensure_square("density matrix", dm, n)?;

        // Create a vector of (i, j) pairs for parallel iteration
        let ij_pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .collect();

        let eri = &self.eri;
        let values: Vec<(f64, f64)> = ij_pairs
            .par_iter()
            .map(|&(i, j)| {
                let mut j_ij = 0.0;
                let mut k_ij = 0.0;
                for k in 0..n {
                    for l in 0..n {
                        j_ij += eri(i, j, k, l) * dm[(l, k)];
                        k_ij += eri(i, k, l, j) * dm[(k, l)];
                    }
                }
                (j_ij, k_ij)
            })
            .collect();

        let mut vj = DMatrix::zeros(n, n);
        let mut vk = DMatrix::zeros(n, n);
        for (&(i, j), &(j_ij, k_ij)) in ij_pairs.iter().zip(values.iter()) {
            vj[(i, j)] = j_ij;
            vk[(i, j)] = k_ij;
        }
        Ok(JkMatrices { vj, vk })
    }
}
