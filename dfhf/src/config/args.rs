//! Command-line argument parsing for the density-fitting driver

use clap::Parser;

/// Density-fitted J/K builds on a model system with YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override auxiliary basis name
    #[arg(long)]
    pub auxbasis: Option<String>,

    /// Override memory budget (MB)
    #[arg(long)]
    pub max_memory: Option<f64>,

    /// Override auxiliary block size
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Split the auxiliary block loop across threads
    #[arg(long)]
    pub parallel: bool,

    /// Run the four-component build instead of the non-relativistic one
    #[arg(long)]
    pub relativistic: bool,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,
}
