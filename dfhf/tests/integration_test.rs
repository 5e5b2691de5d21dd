//! End-to-end tests for the density-fitted J/K builders
//!
//! These tests read the example YAML files, build the model systems they
//! describe and run the builders the way an SCF driver would.

use std::path::PathBuf;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use dfhf::config::{Config, DfParams};
    use dfhf::model::{GaussianChain, SpinorChain};
    use dfhf::{DfError, FittedJKBuilder, Hermiticity, JKBuilder, RelativisticFittedJKBuilder};
    use nalgebra::DMatrix;
    use num_complex::Complex64;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Write;

    /// Helper function to get the path to example files
    fn example_path(filename: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("example")
            .join(filename)
    }

    fn load_config(path: &PathBuf) -> Config {
        let content = std::fs::read_to_string(path).unwrap();
        serde_yml::from_str::<Config>(&content)
            .unwrap()
            .with_defaults()
    }

    fn chain_from(config: &Config) -> GaussianChain {
        let system = &config.system;
        GaussianChain::new(
            system.nao.unwrap(),
            system.naux.unwrap(),
            system.spacing.unwrap(),
        )
    }

    fn random_density(rng: &mut StdRng, n: usize, nocc: usize) -> DMatrix<f64> {
        let c = DMatrix::from_fn(n, nocc, |_, _| rng.gen_range(-0.5..0.5));
        &c * c.transpose() * 2.0
    }

    fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
        (a - b).abs().max()
    }

    #[test]
    fn test_chain_example_incore_and_outcore_agree() {
        let config = load_config(&example_path("chain.yaml"));
        assert!(!config.is_relativistic());
        let chain = chain_from(&config);
        let nao = chain.nao();
        let mut rng = StdRng::seed_from_u64(config.system.seed.unwrap());

        let mut incore = FittedJKBuilder::new(chain.clone(), &config.fitting).unwrap();
        // Room for three packed rows per streaming step.
        let row_bytes = nao * (nao + 1) / 2 * 8;
        let mut outcore = FittedJKBuilder::new(chain, &config.fitting)
            .unwrap()
            .with_memory_budget(2 * row_bytes * 3);

        let dm = random_density(&mut rng, nao, nao / 2);
        let a = incore.get_jk(&dm, Hermiticity::Hermitian).unwrap();
        let b = outcore.get_jk(&dm, Hermiticity::Hermitian).unwrap();

        assert!(!incore.fitted_tensor().unwrap().is_out_of_core());
        assert!(outcore.fitted_tensor().unwrap().is_out_of_core());
        assert!(max_abs_diff(&a.vj, &b.vj) < 1e-9);
        assert!(max_abs_diff(&a.vk, &b.vk) < 1e-9);
    }

    #[test]
    fn test_incremental_exchange_is_linear() {
        let config = load_config(&example_path("chain.yaml"));
        let chain = chain_from(&config);
        let nao = chain.nao();
        let mut rng = StdRng::seed_from_u64(3);
        let mut builder = FittedJKBuilder::new(chain, &config.fitting).unwrap();

        // SCF-style update: K[D_new] = K[D_old] + K[D_new - D_old]
        let old = random_density(&mut rng, nao, 4);
        let new = random_density(&mut rng, nao, 4);
        let delta = &new - &old;
        let results = builder
            .get_jk_batch(&[old, new, delta], Hermiticity::Hermitian)
            .unwrap();

        let summed = &results[0].vk + &results[2].vk;
        assert!(max_abs_diff(&summed, &results[1].vk) < 1e-10);
        let summed = &results[0].vj + &results[2].vj;
        assert!(max_abs_diff(&summed, &results[1].vj) < 1e-10);
    }

    #[test]
    fn test_dirac_example_builds_hermitian_jk() {
        let config = load_config(&example_path("chain_dirac.yaml"));
        assert!(config.is_relativistic());
        let system = &config.system;
        let n2c = system.nao.unwrap();
        let chain = SpinorChain::new(n2c, system.naux.unwrap(), system.spacing.unwrap());
        let mut builder = RelativisticFittedJKBuilder::new(chain, &config.fitting).unwrap();

        let mut rng = StdRng::seed_from_u64(system.seed.unwrap());
        let c = DMatrix::from_fn(2 * n2c, n2c, |_, _| {
            Complex64::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5))
        });
        let dm = &c * c.adjoint();

        let jk = builder.get_jk(&dm, Hermiticity::Hermitian).unwrap();
        assert_eq!(jk.vj.shape(), (2 * n2c, 2 * n2c));
        let vk_err = (&jk.vk - jk.vk.adjoint()).iter().map(|z| z.norm()).fold(0.0, f64::max);
        let vj_err = (&jk.vj - jk.vj.adjoint()).iter().map(|z| z.norm()).fold(0.0, f64::max);
        assert!(vk_err < 1e-10);
        assert!(vj_err < 1e-10);
    }

    #[test]
    fn test_config_file_with_unknown_auxbasis_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fitting:\n  auxbasis: nonsense-fit\nsystem:\n  nao: 4").unwrap();

        let config = load_config(&file.path().to_path_buf());
        assert_eq!(config.fitting.auxbasis(), "nonsense-fit");
        let result = FittedJKBuilder::new(chain_from(&config), &config.fitting);
        assert!(matches!(result, Err(DfError::Configuration(_))));
    }

    #[test]
    fn test_tiny_budget_is_resource_error_on_first_request() {
        let params = DfParams {
            max_memory_mb: Some(1e-6),
            ..DfParams::default()
        };
        let mut builder = FittedJKBuilder::new(GaussianChain::new(6, 12, 1.4), &params).unwrap();
        let dm = DMatrix::identity(6, 6);
        let result = builder.get_jk(&dm, Hermiticity::Hermitian);
        assert!(matches!(result, Err(DfError::Resource { .. })));
        assert!(!builder.is_built());
    }
}
