//! Factorized three-index tensor and its block read interface

use super::store::BlockStore;
use crate::basis::PairLayout;
use crate::error::{DfError, Result};
use crate::source::BlockScalar;
use nalgebra::{DMatrix, DMatrixView};

/// Where the factorized rows live
pub enum TensorStorage<T: BlockScalar> {
    InCore(DMatrix<T>),
    OutOfCore(BlockStore<T>),
}

/// One auxiliary range of a fitted tensor, borrowed or freshly loaded
pub enum Block<'a, T: BlockScalar> {
    Borrowed(DMatrixView<'a, T>),
    Owned(DMatrix<T>),
}

impl<'a, T: BlockScalar> Block<'a, T> {
    pub fn view(&self) -> DMatrixView<'_, T> {
        match self {
            Block::Borrowed(view) => view.view((0, 0), view.shape()),
            Block::Owned(matrix) => matrix.view((0, 0), matrix.shape()),
        }
    }

    pub fn nrows(&self) -> usize {
        match self {
            Block::Borrowed(view) => view.nrows(),
            Block::Owned(matrix) => matrix.nrows(),
        }
    }
}

/// Cholesky-factorized three-index tensor `L[P, ij]`
///
/// Row `P` holds the fitted pair matrix of auxiliary function `P`, so that
/// `(ij|kl) ≈ Σ_P L[P, ij] L[P, kl]`. Rows are stored in ascending auxiliary
/// order, each exactly once.
pub struct FittedTensor<T: BlockScalar> {
    nao: usize,
    naux: usize,
    storage: TensorStorage<T>,
}

impl<T: BlockScalar> FittedTensor<T> {
    /// Wrap an already factorized `naux x npair` matrix.
    pub fn from_rows(nao: usize, rows: DMatrix<T>) -> Result<Self> {
        let npair = T::LAYOUT.pair_count(nao);
        if rows.ncols() != npair {
            return Err(DfError::dimension(
                "fitted tensor pair columns",
                npair,
                rows.ncols(),
            ));
        }
        Ok(FittedTensor {
            nao,
            naux: rows.nrows(),
            storage: TensorStorage::InCore(rows),
        })
    }

    pub(crate) fn from_store(nao: usize, store: BlockStore<T>) -> Self {
        FittedTensor {
            nao,
            naux: store.nrows(),
            storage: TensorStorage::OutOfCore(store),
        }
    }

    pub fn nao(&self) -> usize {
        self.nao
    }

    pub fn naux(&self) -> usize {
        self.naux
    }

    pub fn npair(&self) -> usize {
        T::LAYOUT.pair_count(self.nao)
    }

    pub fn layout(&self) -> PairLayout {
        T::LAYOUT
    }

    pub fn is_out_of_core(&self) -> bool {
        matches!(self.storage, TensorStorage::OutOfCore(_))
    }

    /// Load auxiliary rows `[start, end)`.
    pub fn load_block(&self, start: usize, end: usize) -> Result<Block<'_, T>> {
        if start > end || end > self.naux {
            return Err(DfError::dimension(
                "auxiliary block range",
                format!("within 0..{}", self.naux),
                format!("{start}..{end}"),
            ));
        }
        match &self.storage {
            TensorStorage::InCore(rows) => Ok(Block::Borrowed(
                rows.view((start, 0), (end - start, rows.ncols())),
            )),
            TensorStorage::OutOfCore(store) => Ok(Block::Owned(store.read(start, end)?)),
        }
    }

    /// Every row as one dense matrix.
    pub fn to_dense(&self) -> Result<DMatrix<T>> {
        Ok(self.load_block(0, self.naux)?.view().clone_owned())
    }
}
