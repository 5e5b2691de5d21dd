//! Deterministic model integral engines
//!
//! [`GaussianChain`] places normalized one-dimensional Gaussians along a line
//! and fits their pair products with an auxiliary Gaussian grid in the
//! overlap metric, so every integral has a closed form. It stands in for a
//! real integral library in the driver and in tests. [`DenseIntegrals`] wraps
//! integrals that are already available as matrices.

use crate::basis::{AuxiliaryBasis, PairLayout};
use crate::error::{DfError, Result};
use crate::source::{BlockScalar, IntegralEngine, SpinorIntegralEngine, ThreeCenterSource};
use nalgebra::DMatrix;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Exponents cycled over the orbitals sitting on one chain site.
const ORBITAL_EXPONENTS: [f64; 2] = [1.2, 0.4];

#[derive(Debug, Clone, Copy)]
struct Gaussian {
    exponent: f64,
    center: f64,
    norm: f64,
}

impl Gaussian {
    fn normalized(exponent: f64, center: f64) -> Self {
        Gaussian {
            exponent,
            center,
            norm: (2.0 * exponent / PI).powf(0.25),
        }
    }
}

/// `∫ exp(-a(x-A)²) exp(-b(x-B)²) dx`
fn overlap(a: f64, ca: f64, b: f64, cb: f64) -> f64 {
    let p = a + b;
    (PI / p).sqrt() * (-a * b / p * (ca - cb).powi(2)).exp()
}

/// `∫ g_P χ_i χ_j dx` for normalized Gaussians.
fn three_center_overlap(aux: &Gaussian, i: &Gaussian, j: &Gaussian) -> f64 {
    let p = i.exponent + j.exponent;
    let center = (i.exponent * i.center + j.exponent * j.center) / p;
    let prefactor = (-i.exponent * j.exponent / p * (i.center - j.center).powi(2)).exp();
    aux.norm * i.norm * j.norm * prefactor * overlap(aux.exponent, aux.center, p, center)
}

/// Linear chain of Gaussian orbitals
#[derive(Debug, Clone)]
pub struct GaussianChain {
    orbitals: Vec<Gaussian>,
    naux: usize,
}

impl GaussianChain {
    /// `nao` orbitals, two per site, sites `spacing` apart; `naux` auxiliary
    /// functions for tabulated auxiliary families.
    pub fn new(nao: usize, naux: usize, spacing: f64) -> Self {
        let orbitals = (0..nao)
            .map(|i| {
                let exponent = ORBITAL_EXPONENTS[i % ORBITAL_EXPONENTS.len()];
                Gaussian::normalized(exponent, (i / 2) as f64 * spacing)
            })
            .collect();
        GaussianChain { orbitals, naux }
    }

    /// Same chain with all orbital exponents multiplied by `factor`.
    pub fn contracted(&self, factor: f64) -> Self {
        let orbitals = self
            .orbitals
            .iter()
            .map(|g| Gaussian::normalized(g.exponent * factor, g.center))
            .collect();
        GaussianChain {
            orbitals,
            naux: self.naux,
        }
    }

    pub fn nao(&self) -> usize {
        self.orbitals.len()
    }

    /// Auxiliary grid spanning the chain with one unit of padding each side.
    ///
    /// Neighbouring functions overlap by `exp(-βh²a/2)`-type factors that keep
    /// the metric positive definite for any `β > 1`.
    fn auxiliary_functions(&self, auxbasis: &AuxiliaryBasis) -> Vec<Gaussian> {
        let naux = self.naux;
        if naux == 0 {
            return Vec::new();
        }
        let lo = self.orbitals.iter().map(|g| g.center).fold(f64::INFINITY, f64::min) - 1.0;
        let hi = self.orbitals.iter().map(|g| g.center).fold(f64::NEG_INFINITY, f64::max) + 1.0;
        let (lo, hi) = if lo.is_finite() { (lo, hi) } else { (-1.0, 1.0) };
        let h = if naux > 1 {
            (hi - lo) / (naux - 1) as f64
        } else {
            1.0
        };
        let beta = match auxbasis {
            AuxiliaryBasis::Named(_) => 2.0,
            AuxiliaryBasis::EvenTempered { beta } => *beta,
        };
        let exponent = beta / (h * h);
        (0..naux)
            .map(|k| Gaussian::normalized(exponent, lo + k as f64 * h))
            .collect()
    }

    fn source(&self, auxbasis: &AuxiliaryBasis) -> ChainSource {
        ChainSource {
            orbitals: self.orbitals.clone(),
            auxiliary: self.auxiliary_functions(auxbasis),
        }
    }
}

impl IntegralEngine for GaussianChain {
    type Source = ChainSource;

    fn nao(&self) -> usize {
        self.orbitals.len()
    }

    fn three_center(&self, auxbasis: &AuxiliaryBasis) -> Result<ChainSource> {
        Ok(self.source(auxbasis))
    }
}

/// Real three-centre overlaps of a [`GaussianChain`] bound to an auxiliary grid
#[derive(Debug, Clone)]
pub struct ChainSource {
    orbitals: Vec<Gaussian>,
    auxiliary: Vec<Gaussian>,
}

impl ChainSource {
    fn value(&self, p: usize, i: usize, j: usize) -> f64 {
        three_center_overlap(&self.auxiliary[p], &self.orbitals[i], &self.orbitals[j])
    }
}

impl ThreeCenterSource for ChainSource {
    type Scalar = f64;

    fn nao(&self) -> usize {
        self.orbitals.len()
    }

    fn naux(&self) -> usize {
        self.auxiliary.len()
    }

    fn metric(&self) -> DMatrix<f64> {
        let naux = self.auxiliary.len();
        DMatrix::from_fn(naux, naux, |p, q| {
            let (gp, gq) = (&self.auxiliary[p], &self.auxiliary[q]);
            gp.norm * gq.norm * overlap(gp.exponent, gp.center, gq.exponent, gq.center)
        })
    }

    fn raw_block(&self, start: usize, end: usize) -> DMatrix<f64> {
        let nao = self.orbitals.len();
        let npair = PairLayout::PackedLower.pair_count(nao);
        let mut block = DMatrix::zeros(end - start, npair);
        for p in start..end {
            for i in 0..nao {
                for j in 0..=i {
                    block[(p - start, i * (i + 1) / 2 + j)] = self.value(p, i, j);
                }
            }
        }
        block
    }
}

/// Spinor model: a large-component chain and a tighter small-component chain
///
/// Spinor `i` carries a phase `exp(iφ_i)`, so each fitted row is a Hermitian
/// but genuinely complex pair matrix.
#[derive(Debug, Clone)]
pub struct SpinorChain {
    large: GaussianChain,
    small: GaussianChain,
    phases: Vec<f64>,
}

impl SpinorChain {
    pub fn new(n2c: usize, naux: usize, spacing: f64) -> Self {
        let large = GaussianChain::new(n2c, naux, spacing);
        let small = large.contracted(1.5);
        let phases = (0..n2c).map(|i| 0.3 * i as f64).collect();
        SpinorChain {
            large,
            small,
            phases,
        }
    }
}

impl SpinorIntegralEngine for SpinorChain {
    type Source = SpinorSource;

    fn n2c(&self) -> usize {
        self.large.nao()
    }

    fn three_center_spinor(
        &self,
        auxbasis: &AuxiliaryBasis,
    ) -> Result<(SpinorSource, SpinorSource)> {
        Ok((
            SpinorSource {
                real: self.large.source(auxbasis),
                phases: self.phases.clone(),
            },
            SpinorSource {
                real: self.small.source(auxbasis),
                phases: self.phases.clone(),
            },
        ))
    }
}

/// Complex three-centre values `(P|ij) exp(i(φ_i − φ_j))`, full pair layout
#[derive(Debug, Clone)]
pub struct SpinorSource {
    real: ChainSource,
    phases: Vec<f64>,
}

impl ThreeCenterSource for SpinorSource {
    type Scalar = Complex64;

    fn nao(&self) -> usize {
        self.real.nao()
    }

    fn naux(&self) -> usize {
        self.real.naux()
    }

    fn metric(&self) -> DMatrix<f64> {
        self.real.metric()
    }

    fn raw_block(&self, start: usize, end: usize) -> DMatrix<Complex64> {
        let n = self.real.nao();
        DMatrix::from_fn(end - start, n * n, |row, pair| {
            let (i, j) = (pair / n, pair % n);
            let phase = Complex64::from_polar(1.0, self.phases[i] - self.phases[j]);
            phase * self.real.value(start + row, i, j)
        })
    }
}

/// Integrals supplied as dense matrices
#[derive(Debug, Clone)]
pub struct DenseIntegrals<T: BlockScalar> {
    nao: usize,
    metric: DMatrix<f64>,
    raw: DMatrix<T>,
}

impl<T: BlockScalar> DenseIntegrals<T> {
    /// `raw` holds one row per auxiliary function in `T::LAYOUT`.
    pub fn new(nao: usize, metric: DMatrix<f64>, raw: DMatrix<T>) -> Result<Self> {
        let npair = T::LAYOUT.pair_count(nao);
        if raw.ncols() != npair {
            return Err(DfError::dimension("dense raw integrals", npair, raw.ncols()));
        }
        if metric.nrows() != raw.nrows() || metric.ncols() != raw.nrows() {
            return Err(DfError::dimension(
                "dense auxiliary metric",
                format!("{0}x{0}", raw.nrows()),
                format!("{}x{}", metric.nrows(), metric.ncols()),
            ));
        }
        Ok(DenseIntegrals { nao, metric, raw })
    }
}

impl<T: BlockScalar> ThreeCenterSource for DenseIntegrals<T> {
    type Scalar = T;

    fn nao(&self) -> usize {
        self.nao
    }

    fn naux(&self) -> usize {
        self.raw.nrows()
    }

    fn metric(&self) -> DMatrix<f64> {
        self.metric.clone()
    }

    fn raw_block(&self, start: usize, end: usize) -> DMatrix<T> {
        self.raw.rows(start, end - start).clone_owned()
    }
}

impl IntegralEngine for DenseIntegrals<f64> {
    type Source = DenseIntegrals<f64>;

    fn nao(&self) -> usize {
        self.nao
    }

    fn three_center(&self, _auxbasis: &AuxiliaryBasis) -> Result<DenseIntegrals<f64>> {
        Ok(self.clone())
    }
}

/// Large-large and small-small dense spinor integrals
#[derive(Debug, Clone)]
pub struct DenseSpinorIntegrals {
    pub ll: DenseIntegrals<Complex64>,
    pub ss: DenseIntegrals<Complex64>,
}

impl SpinorIntegralEngine for DenseSpinorIntegrals {
    type Source = DenseIntegrals<Complex64>;

    fn n2c(&self) -> usize {
        self.ll.nao
    }

    fn three_center_spinor(
        &self,
        _auxbasis: &AuxiliaryBasis,
    ) -> Result<(DenseIntegrals<Complex64>, DenseIntegrals<Complex64>)> {
        Ok((self.ll.clone(), self.ss.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_metric_is_positive_definite() {
        let chain = GaussianChain::new(6, 14, 1.4);
        for auxbasis in ["weigend", "etb:1.5"] {
            let source = chain.three_center(&AuxiliaryBasis::parse(auxbasis).unwrap()).unwrap();
            let eig = source.metric().symmetric_eigen();
            assert!(eig.eigenvalues.min() > 1e-6, "metric for {auxbasis} is near singular");
        }
    }

    #[test]
    fn test_chain_raw_block_matches_pair_symmetry() {
        let chain = GaussianChain::new(4, 6, 1.0);
        let source = chain
            .three_center(&AuxiliaryBasis::parse("weigend").unwrap())
            .unwrap();
        let full = source.raw_block(0, 6);
        let tail = source.raw_block(4, 6);

        assert_eq!(full.ncols(), 10);
        assert_eq!(full.rows(4, 2).clone_owned(), tail);
        assert!((source.value(3, 1, 2) - source.value(3, 2, 1)).abs() < 1e-15);
    }

    #[test]
    fn test_spinor_rows_are_hermitian() {
        let chain = SpinorChain::new(3, 5, 1.2);
        let (ll, _) = chain
            .three_center_spinor(&AuxiliaryBasis::parse("weigend").unwrap())
            .unwrap();
        let block = ll.raw_block(0, 5);
        for p in 0..5 {
            for i in 0..3 {
                for j in 0..3 {
                    let a = block[(p, i * 3 + j)];
                    let b = block[(p, j * 3 + i)].conj();
                    assert!((a - b).norm() < 1e-14);
                }
            }
        }
    }

    #[test]
    fn test_dense_integrals_reject_wrong_pair_count() {
        let metric = DMatrix::identity(1, 1);
        let raw = DMatrix::from_element(1, 2, 1.0);
        assert!(matches!(
            DenseIntegrals::<f64>::new(1, metric, raw),
            Err(DfError::Dimension { .. })
        ));
    }
}
