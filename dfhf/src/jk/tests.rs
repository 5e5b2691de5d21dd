//! Tests for the J/K builder strategies

use super::{DirectJKBuilder, FittedJKBuilder, JKBuilder, RelativisticFittedJKBuilder};
use crate::basis::{tril_index, AuxiliaryBasis};
use crate::config::DfParams;
use crate::contract::{Hermiticity, JkMatrices};
use crate::error::{DfError, Result};
use crate::model::{ChainSource, GaussianChain, SpinorChain};
use crate::source::IntegralEngine;
use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;

/// Gaussian chain that counts how often it is asked for integrals
struct CountingEngine {
    chain: GaussianChain,
    calls: Cell<usize>,
}

impl CountingEngine {
    fn new(chain: GaussianChain) -> Self {
        CountingEngine {
            chain,
            calls: Cell::new(0),
        }
    }
}

impl IntegralEngine for CountingEngine {
    type Source = ChainSource;

    fn nao(&self) -> usize {
        self.chain.nao()
    }

    fn three_center(&self, auxbasis: &AuxiliaryBasis) -> Result<ChainSource> {
        self.calls.set(self.calls.get() + 1);
        self.chain.three_center(auxbasis)
    }
}

fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    (a - b).abs().max()
}

fn random_density(rng: &mut StdRng, n: usize, nocc: usize) -> DMatrix<f64> {
    let c = DMatrix::from_fn(n, nocc, |_, _| rng.gen_range(-0.5..0.5));
    &c * c.transpose() * 2.0
}

#[test]
fn test_tensor_is_built_once_and_reused() {
    let mut rng = StdRng::seed_from_u64(41);
    let engine = CountingEngine::new(GaussianChain::new(5, 12, 1.4));
    let mut builder = FittedJKBuilder::new(engine, &DfParams::default()).unwrap();
    assert!(!builder.is_built());
    assert_eq!(builder.engine().calls.get(), 0);

    let dm = random_density(&mut rng, 5, 2);
    let first = builder.get_jk(&dm, Hermiticity::Hermitian).unwrap();
    let second = builder.get_jk(&dm, Hermiticity::Hermitian).unwrap();
    builder
        .get_jk_batch(&[dm.clone(), dm.clone()], Hermiticity::Hermitian)
        .unwrap();

    assert!(builder.is_built());
    assert_eq!(builder.engine().calls.get(), 1);
    assert_eq!(first, second);
}

#[test]
fn test_invalidate_and_rebind_rebuild_the_tensor() {
    let mut rng = StdRng::seed_from_u64(42);
    let engine = CountingEngine::new(GaussianChain::new(4, 10, 1.4));
    let mut builder = FittedJKBuilder::new(engine, &DfParams::default()).unwrap();
    let dm = random_density(&mut rng, 4, 2);

    let before = builder.get_jk(&dm, Hermiticity::Hermitian).unwrap();
    builder.invalidate();
    assert!(!builder.is_built());
    assert!(builder.fitted_tensor().is_none());

    let after = builder.get_jk(&dm, Hermiticity::Hermitian).unwrap();
    assert_eq!(builder.engine().calls.get(), 2);
    assert!(max_abs_diff(&before.vk, &after.vk) < 1e-14);

    // A tighter chain is a different basis; the old tensor must not be reused.
    builder.rebind(CountingEngine::new(GaussianChain::new(4, 10, 1.4).contracted(2.0)));
    assert!(!builder.is_built());
    let rebound = builder.get_jk(&dm, Hermiticity::Hermitian).unwrap();
    assert_eq!(builder.engine().calls.get(), 1);
    assert!(max_abs_diff(&before.vj, &rebound.vj) > 1e-6);
}

#[test]
fn test_ensure_built_exposes_cached_tensor() {
    let chain = GaussianChain::new(4, 9, 1.4);
    let mut builder = FittedJKBuilder::new(chain, &DfParams::default()).unwrap();
    let naux = builder.ensure_built().unwrap().naux();
    assert_eq!(naux, 9);
    assert_eq!(builder.fitted_tensor().map(|t| t.nao()), Some(4));
}

#[test]
fn test_unknown_auxiliary_basis_fails_at_construction() {
    let params = DfParams {
        auxbasis: Some("made-up-jkfit".to_string()),
        ..DfParams::default()
    };
    let result = FittedJKBuilder::new(GaussianChain::new(2, 4, 1.0), &params);
    assert!(matches!(result, Err(DfError::Configuration(_))));
}

#[test]
fn test_fitted_builder_matches_direct_builder_on_fitted_integrals() {
    let mut rng = StdRng::seed_from_u64(43);
    let nao = 5;
    let mut fitted = FittedJKBuilder::new(GaussianChain::new(nao, 12, 1.4), &DfParams::default())
        .unwrap();
    let rows = fitted.ensure_built().unwrap().to_dense().unwrap();

    // (ij|kl) = Σ_P X[P, ij] X[P, kl]
    let eri = move |i: usize, j: usize, k: usize, l: usize| {
        let (ij, kl) = (tril_index(i, j), tril_index(k, l));
        rows.column(ij).dot(&rows.column(kl))
    };
    let mut direct = DirectJKBuilder::new(nao, eri);

    let symmetric = random_density(&mut rng, nao, 2);
    let general = DMatrix::from_fn(nao, nao, |_, _| rng.gen_range(-1.0..1.0));
    for (dm, hermi) in [
        (&symmetric, Hermiticity::Hermitian),
        (&general, Hermiticity::NonHermitian),
    ] {
        let a = fitted.get_jk(dm, hermi).unwrap();
        let b = direct.get_jk(dm, hermi).unwrap();
        assert!(max_abs_diff(&a.vj, &b.vj) < 1e-10);
        assert!(max_abs_diff(&a.vk, &b.vk) < 1e-10);
    }
}

#[test]
fn test_builders_are_interchangeable_behind_the_trait() {
    let mut rng = StdRng::seed_from_u64(44);
    let nao = 4;
    let chain = GaussianChain::new(nao, 10, 1.4);
    let rows = FittedJKBuilder::new(chain.clone(), &DfParams::default())
        .unwrap()
        .ensure_built()
        .unwrap()
        .to_dense()
        .unwrap();
    let eri = move |i: usize, j: usize, k: usize, l: usize| {
        rows.column(tril_index(i, j)).dot(&rows.column(tril_index(k, l)))
    };

    let mut builders: Vec<Box<dyn JKBuilder<Scalar = f64>>> = vec![
        Box::new(FittedJKBuilder::new(chain, &DfParams::default()).unwrap()),
        Box::new(DirectJKBuilder::new(nao, eri)),
    ];
    let dms: Vec<_> = (0..3).map(|_| random_density(&mut rng, nao, 2)).collect();
    let results: Vec<Vec<JkMatrices<f64>>> = builders
        .iter_mut()
        .map(|b| b.get_jk_batch(&dms, Hermiticity::Hermitian).unwrap())
        .collect();

    for (a, b) in results[0].iter().zip(results[1].iter()) {
        assert!(max_abs_diff(&a.vj, &b.vj) < 1e-10);
        assert!(max_abs_diff(&a.vk, &b.vk) < 1e-10);
    }
}

#[test]
fn test_batch_results_follow_input_order() {
    let mut rng = StdRng::seed_from_u64(45);
    let params = DfParams {
        parallel: Some(true),
        block_size: Some(4),
        ..DfParams::default()
    };
    let mut builder = FittedJKBuilder::new(GaussianChain::new(4, 11, 1.4), &params).unwrap();
    let dms: Vec<_> = (0..4).map(|i| random_density(&mut rng, 4, 1 + i % 3)).collect();

    let batch = builder.get_jk_batch(&dms, Hermiticity::Hermitian).unwrap();
    for (dm, jk) in dms.iter().zip(batch.iter()) {
        let single = builder.get_jk(dm, Hermiticity::Hermitian).unwrap();
        assert!(max_abs_diff(&single.vj, &jk.vj) < 1e-12);
        assert!(max_abs_diff(&single.vk, &jk.vk) < 1e-12);
    }
}

#[test]
fn test_direct_builder_rejects_wrong_density_shape() {
    let mut direct = DirectJKBuilder::new(3, |_, _, _, _| 1.0);
    let result = direct.get_jk(&DMatrix::zeros(2, 3), Hermiticity::NonHermitian);
    assert!(matches!(result, Err(DfError::Dimension { .. })));
}

#[test]
fn test_relativistic_builder_caches_and_invalidates() {
    let mut rng = StdRng::seed_from_u64(46);
    let mut builder =
        RelativisticFittedJKBuilder::new(SpinorChain::new(2, 6, 1.2), &DfParams::default())
            .unwrap();
    let c = DMatrix::from_fn(4, 2, |_, _| {
        Complex64::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5))
    });
    let dm = &c * c.adjoint();

    let first = builder.get_jk(&dm, Hermiticity::Hermitian).unwrap();
    assert!(builder.is_built());
    assert_eq!(builder.fitted_tensor().map(|t| t.naux()), Some(6));

    builder.invalidate();
    assert!(!builder.is_built());
    let second = builder.get_jk(&dm, Hermiticity::Hermitian).unwrap();
    let diff = (&first.vk - &second.vk).iter().map(|z| z.norm()).fold(0.0, f64::max);
    assert!(diff < 1e-14);
}
