//! Density-fitting driver command-line interface
//!
//! Runs density-fitted J/K builds on a model Gaussian chain described by a YAML
//! configuration, and checks the in-core and out-of-core paths against each other.

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use dfhf::config::{Args, Config};
use dfhf::model::{GaussianChain, SpinorChain};
use dfhf::{FittedJKBuilder, Hermiticity, JKBuilder, RelativisticFittedJKBuilder};
use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tracing::info;

mod io;

use io::{print_jk_summary, setup_output};

/// Rows kept per streaming step when the out-of-core path is forced.
const FORCED_OUTCORE_ROWS: usize = 4;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_output(args.output.as_ref());

    info!("Reading configuration from: {}", args.config_file);
    let config = load_config(&args)?;
    info!("Configuration loaded:\n{:?}", config);

    if config.is_relativistic() {
        run_relativistic(&config)
    } else {
        run_nonrelativistic(&config)
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults()
        .apply_overrides(args);

    Ok(config)
}

/// Closed-shell density `2 C Cᵀ` from random occupied coefficients.
fn random_density(rng: &mut StdRng, nao: usize, nocc: usize) -> DMatrix<f64> {
    let c = DMatrix::from_fn(nao, nocc, |_, _| rng.gen_range(-0.5..0.5));
    &c * c.transpose() * 2.0
}

fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    (a - b).abs().max()
}

fn run_nonrelativistic(config: &Config) -> Result<()> {
    let system = &config.system;
    let nao = system.nao.unwrap_or(12);
    let naux = system.naux.unwrap_or(36);
    let spacing = system.spacing.unwrap_or(1.4);
    let mut rng = StdRng::seed_from_u64(system.seed.unwrap_or(7));

    let chain = GaussianChain::new(nao, naux, spacing);
    let mut builder: Box<dyn JKBuilder<Scalar = f64>> =
        Box::new(FittedJKBuilder::new(chain.clone(), &config.fitting)?);

    let dm = random_density(&mut rng, nao, (nao / 2).max(1));
    let dm_next = random_density(&mut rng, nao, (nao / 2).max(1));
    let delta = &dm_next - &dm;

    let jk = builder.get_jk(&dm, Hermiticity::Hermitian)?;
    let batch = builder.get_jk_batch(&[dm_next.clone(), delta], Hermiticity::Hermitian)?;

    let mut stdout = std::io::stdout();
    print_jk_summary(&mut stdout, "Density", &jk)?;
    print_jk_summary(&mut stdout, "Next density", &batch[0])?;
    print_jk_summary(&mut stdout, "Density difference", &batch[1])?;

    let incremental = max_abs_diff(&(&jk.vk + &batch[1].vk), &batch[0].vk);
    info!("Incremental K deviation: {:.3e}", incremental);

    let row_bytes = nao * (nao + 1) / 2 * 8;
    let mut streamed = FittedJKBuilder::new(chain, &config.fitting)?
        .with_memory_budget(2 * row_bytes * FORCED_OUTCORE_ROWS);
    let jk_streamed = streamed.get_jk(&dm, Hermiticity::Hermitian)?;
    info!(
        "In-core vs out-of-core: |dJ| = {:.3e}, |dK| = {:.3e}",
        max_abs_diff(&jk.vj, &jk_streamed.vj),
        max_abs_diff(&jk.vk, &jk_streamed.vk)
    );
    Ok(())
}

fn run_relativistic(config: &Config) -> Result<()> {
    let system = &config.system;
    let n2c = system.nao.unwrap_or(12);
    let naux = system.naux.unwrap_or(36);
    let spacing = system.spacing.unwrap_or(1.4);
    let mut rng = StdRng::seed_from_u64(system.seed.unwrap_or(7));

    let chain = SpinorChain::new(n2c, naux, spacing);
    let mut builder = RelativisticFittedJKBuilder::new(chain, &config.fitting)?;

    let n4c = 2 * n2c;
    let nocc = n2c.max(1);
    let c = DMatrix::from_fn(n4c, nocc, |_, _| {
        Complex64::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5))
    });
    let dm = &c * c.adjoint();

    let jk = builder.get_jk(&dm, Hermiticity::Hermitian)?;
    print_jk_summary(&mut std::io::stdout(), "Four-component density", &jk)?;
    Ok(())
}
