//! Auxiliary basis descriptors and orbital-pair layouts

use crate::error::{DfError, Result};
use nalgebra::{DMatrix, DVector, Scalar};
use std::fmt;

/// Named auxiliary fitting basis families understood by the integral engines.
const KNOWN_FAMILIES: &[&str] = &[
    "weigend",
    "ahlrichs",
    "def2universaljfit",
    "def2universaljkfit",
    "def2svpjkfit",
    "def2tzvpjkfit",
    "def2qzvppjkfit",
    "ccpvdzjkfit",
    "ccpvtzjkfit",
    "ccpvqzjkfit",
    "ccpvdzri",
    "ccpvtzri",
    "ccpvqzri",
    "demon",
];

/// Auxiliary basis used to fit orbital-pair densities
#[derive(Debug, Clone, PartialEq)]
pub enum AuxiliaryBasis {
    /// A tabulated fitting family, stored under its normalized name.
    Named(String),
    /// Even-tempered expansion generated from the orbital basis.
    EvenTempered { beta: f64 },
}

impl AuxiliaryBasis {
    /// Parse an auxiliary basis descriptor.
    ///
    /// Names are matched case-insensitively ignoring `-`, `_` and spaces, so
    /// `"def2-universal-JKFIT"` and `"def2universaljkfit"` are the same
    /// family. `"etb"` and `"etb:<beta>"` select an even-tempered basis with
    /// progression factor `beta > 1` (default 2.0).
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DfError::Configuration(
                "auxiliary basis name is empty".to_string(),
            ));
        }

        let lower = trimmed.to_lowercase();
        if let Some(rest) = lower.strip_prefix("etb") {
            let beta = match rest.strip_prefix(':') {
                None if rest.is_empty() => 2.0,
                Some(value) => value.trim().parse::<f64>().map_err(|_| {
                    DfError::Configuration(format!(
                        "cannot parse even-tempered factor in auxiliary basis '{trimmed}'"
                    ))
                })?,
                None => {
                    return Err(DfError::Configuration(format!(
                        "unknown auxiliary basis '{trimmed}'"
                    )))
                }
            };
            if !(beta > 1.0) {
                return Err(DfError::Configuration(format!(
                    "even-tempered factor must exceed 1, got {beta}"
                )));
            }
            return Ok(AuxiliaryBasis::EvenTempered { beta });
        }

        let normalized: String = lower
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect();
        if KNOWN_FAMILIES.contains(&normalized.as_str()) {
            Ok(AuxiliaryBasis::Named(normalized))
        } else {
            Err(DfError::Configuration(format!(
                "unknown auxiliary basis '{trimmed}'"
            )))
        }
    }
}

impl fmt::Display for AuxiliaryBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuxiliaryBasis::Named(name) => write!(f, "{name}"),
            AuxiliaryBasis::EvenTempered { beta } => write!(f, "etb:{beta}"),
        }
    }
}

/// How the orbital-pair index of one auxiliary row is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairLayout {
    /// Lower triangle of a symmetric matrix, `(i, j)` with `i >= j` at `i(i+1)/2 + j`.
    PackedLower,
    /// Full matrix, `(i, j)` at `i * n + j`.
    Full,
}

impl PairLayout {
    pub fn pair_count(self, n: usize) -> usize {
        match self {
            PairLayout::PackedLower => n * (n + 1) / 2,
            PairLayout::Full => n * n,
        }
    }
}

#[inline]
pub fn tril_index(i: usize, j: usize) -> usize {
    if i >= j {
        i * (i + 1) / 2 + j
    } else {
        j * (j + 1) / 2 + i
    }
}

/// Pack the lower triangle of a square matrix.
pub fn pack_tril<T: Scalar + Copy>(m: &DMatrix<T>) -> DVector<T> {
    let n = m.nrows();
    DVector::from_iterator(
        n * (n + 1) / 2,
        (0..n).flat_map(|i| (0..=i).map(move |j| m[(i, j)])),
    )
}

/// Unpack a lower-triangular row into a symmetric `n x n` matrix.
pub fn unpack_tril<T: Scalar + Copy>(packed: impl Fn(usize) -> T, n: usize) -> DMatrix<T> {
    DMatrix::from_fn(n, n, |i, j| packed(tril_index(i, j)))
}

/// Unpack a full row-major pair row into an `n x n` matrix.
pub fn unpack_full<T: Scalar + Copy>(row: impl Fn(usize) -> T, n: usize) -> DMatrix<T> {
    DMatrix::from_fn(n, n, |i, j| row(i * n + j))
}
