//! Output operations for the density-fitting driver
//!
//! This module handles logging setup and result summaries.

mod output;

pub use output::{print_jk_summary, setup_output};
