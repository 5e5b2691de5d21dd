//! Seams to the integral-evaluation collaborator
//!
//! The engine never evaluates integrals itself. A molecule/basis object
//! implements [`IntegralEngine`] (or [`SpinorIntegralEngine`]) and hands out a
//! [`ThreeCenterSource`] bound to one auxiliary basis.

use crate::basis::{AuxiliaryBasis, PairLayout};
use crate::error::Result;
use nalgebra::{ComplexField, DMatrix};
use num_complex::Complex64;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Element type of a factorized tensor.
///
/// Real tensors use the packed lower-triangular pair layout, complex
/// (spinor) tensors keep the full pair matrix. `BYTES` is the width of one
/// element in the out-of-core row encoding.
pub trait BlockScalar: ComplexField<RealField = f64> + Copy + Serialize + DeserializeOwned {
    const BYTES: usize;
    const LAYOUT: PairLayout;
}

impl BlockScalar for f64 {
    const BYTES: usize = 8;
    const LAYOUT: PairLayout = PairLayout::PackedLower;
}

impl BlockScalar for Complex64 {
    const BYTES: usize = 16;
    const LAYOUT: PairLayout = PairLayout::Full;
}

/// Unfactorized three-centre integrals for one (molecule, basis, auxiliary basis)
pub trait ThreeCenterSource {
    type Scalar: BlockScalar;

    /// Number of orbitals (spinors for complex sources).
    fn nao(&self) -> usize;

    /// Number of auxiliary functions.
    fn naux(&self) -> usize;

    /// Two-centre auxiliary metric `(P|Q)`, `naux x naux`, symmetric positive definite.
    fn metric(&self) -> DMatrix<f64>;

    /// Raw `(P|ij)` for `P` in `[start, end)`, one row per auxiliary function
    /// laid out according to `Self::Scalar::LAYOUT`.
    fn raw_block(&self, start: usize, end: usize) -> DMatrix<Self::Scalar>;

    fn npair(&self) -> usize {
        Self::Scalar::LAYOUT.pair_count(self.nao())
    }
}

/// Non-relativistic integral collaborator
pub trait IntegralEngine {
    type Source: ThreeCenterSource<Scalar = f64>;

    fn nao(&self) -> usize;

    /// Bind the engine to an auxiliary basis.
    fn three_center(&self, auxbasis: &AuxiliaryBasis) -> Result<Self::Source>;
}

/// Four-component integral collaborator
///
/// Yields two sources over the same auxiliary basis: one fitted against
/// large-large spinor products, one against small-small products.
pub trait SpinorIntegralEngine {
    type Source: ThreeCenterSource<Scalar = Complex64>;

    /// Number of two-component spinors per (large or small) component.
    fn n2c(&self) -> usize;

    fn three_center_spinor(
        &self,
        auxbasis: &AuxiliaryBasis,
    ) -> Result<(Self::Source, Self::Source)>;
}
