//! Density-fitted Coulomb and exchange matrix builder
//!
//! The four-index electron-repulsion tensor is replaced by a Cholesky-factorized
//! three-index tensor over an auxiliary basis. The tensor is built once per
//! molecule and basis (in memory or streamed through a temporary file) and then
//! contracted block by block with each density matrix the SCF loop supplies.

pub mod basis;
pub mod config;
pub mod contract;
pub mod error;
pub mod fitting;
pub mod jk;
pub mod model;
pub mod relativistic;
pub mod source;
pub mod split;

pub use contract::{BlockContractor, Hermiticity, JkMatrices};
pub use error::{DfError, Result};
pub use fitting::{AuxiliaryFitter, FittedTensor};
pub use jk::{DirectJKBuilder, FittedJKBuilder, JKBuilder, RelativisticFittedJKBuilder};
pub use relativistic::{RelativisticBlockContractor, RelativisticFittedTensor};
pub use split::{DensitySplitter, EigenSplit};
