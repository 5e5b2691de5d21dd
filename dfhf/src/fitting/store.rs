//! Temporary on-disk storage for out-of-core fitted tensors

use crate::error::Result;
use crate::source::BlockScalar;
use nalgebra::DMatrix;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::sync::Mutex;

/// Append-only row store backed by an anonymous temporary file.
///
/// Rows are written in auxiliary order and read back by contiguous range.
/// Elements are bincode-encoded one at a time with fixed-width integers, so a
/// row always occupies `ncols * T::BYTES` bytes. The file is removed by the OS
/// once the store is dropped.
pub struct BlockStore<T: BlockScalar> {
    file: Mutex<File>,
    ncols: usize,
    nrows: usize,
    _marker: PhantomData<T>,
}

impl<T: BlockScalar> BlockStore<T> {
    pub fn create(ncols: usize) -> Result<Self> {
        let file = tempfile::tempfile()?;
        Ok(BlockStore {
            file: Mutex::new(file),
            ncols,
            nrows: 0,
            _marker: PhantomData,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    fn row_bytes(&self) -> usize {
        self.ncols * T::BYTES
    }

    /// Append the rows of `block` after the rows already stored.
    pub fn append(&mut self, block: &DMatrix<T>) -> Result<()> {
        debug_assert_eq!(block.ncols(), self.ncols);
        let mut bytes = Vec::with_capacity(block.nrows() * self.row_bytes());
        for r in 0..block.nrows() {
            for c in 0..self.ncols {
                bincode::serialize_into(&mut bytes, &block[(r, c)])?;
            }
        }

        let offset = (self.nrows * self.row_bytes()) as u64;
        let file = self.file.get_mut().unwrap_or_else(|e| e.into_inner());
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        self.nrows += block.nrows();
        Ok(())
    }

    /// Read rows `[start, end)`.
    pub fn read(&self, start: usize, end: usize) -> Result<DMatrix<T>> {
        debug_assert!(start <= end && end <= self.nrows);
        let row_bytes = self.row_bytes();
        let mut bytes = vec![0u8; (end - start) * row_bytes];
        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            file.seek(SeekFrom::Start((start * row_bytes) as u64))?;
            file.read_exact(&mut bytes)?;
        }

        let values = bytes
            .chunks_exact(T::BYTES)
            .map(bincode::deserialize::<T>)
            .collect::<std::result::Result<Vec<T>, _>>()?;
        Ok(DMatrix::from_row_slice(end - start, self.ncols, &values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_append_then_read_ranges() {
        let mut store = BlockStore::<f64>::create(3).unwrap();
        let first = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let second = DMatrix::from_row_slice(1, 3, &[7.0, 8.0, 9.0]);
        store.append(&first).unwrap();
        store.append(&second).unwrap();

        assert_eq!(store.nrows(), 3);
        let middle = store.read(1, 3).unwrap();
        assert_eq!(middle, DMatrix::from_row_slice(2, 3, &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]));
        assert_eq!(store.read(2, 2).unwrap().nrows(), 0);
    }

    #[test]
    fn test_encoded_width_matches_scalar_bytes() {
        assert_eq!(bincode::serialized_size(&-2.5_f64).unwrap() as usize, f64::BYTES);
        let z = Complex64::new(1.0, -1.0);
        assert_eq!(bincode::serialized_size(&z).unwrap() as usize, Complex64::BYTES);
    }

    #[test]
    fn test_complex_rows_keep_imaginary_part() {
        let mut store = BlockStore::<Complex64>::create(2).unwrap();
        let block = DMatrix::from_row_slice(
            1,
            2,
            &[Complex64::new(1.5, -0.25), Complex64::new(0.0, 3.0)],
        );
        store.append(&block).unwrap();
        assert_eq!(store.read(0, 1).unwrap(), block);
    }
}
