//! Local sparse matrix storage and the distributed matrix-vector product.
//!
//! Each rank stores its own rows in compressed row form. Column ids below
//! [`SparseMatrix::local_rows`] refer to owned rows; ids from `local_rows` up to
//! `local_rows + halo_len` refer to the halo section of a [`Vector`].
//!
//! A freshly generated matrix keeps its rows in natural grid order and only knows
//! the global id of its halo columns. [`optimize_matrix`](crate::optimize::optimize_matrix)
//! gives them local ids and builds the [`HaloPattern`]; until then the matrix can
//! only be applied on a single rank.

use crate::comm::Comm;
use crate::halo::HaloPattern;
use crate::vector::Vector;
use crate::{GlobalInt, HpcgError, HpcgErrorKind, Result};

/// Column id of a halo reference that has not been localized yet.
pub(crate) const UNRESOLVED: usize = usize::MAX;

/// The rows of the system owned by one rank.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    pub(crate) local_rows: usize,
    pub(crate) global_rows: GlobalInt,
    pub(crate) row_ptr: Vec<usize>,
    pub(crate) cols: Vec<usize>,
    pub(crate) global_cols: Vec<GlobalInt>,
    pub(crate) values: Vec<f64>,
    // absolute position of the diagonal entry of each row
    pub(crate) diag: Vec<usize>,
    // absolute position of the first halo entry of each row, or the row end
    pub(crate) halo_start: Vec<usize>,
    pub(crate) local_to_global: Vec<GlobalInt>,
    pub(crate) halo_len: usize,
    // rows with at least one halo entry
    pub(crate) halo_rows: Vec<usize>,
    pub(crate) color_ptr: Vec<usize>,
    pub(crate) pattern: HaloPattern,
    pub(crate) unresolved: usize,
    pub(crate) optimized: bool,
}

impl SparseMatrix {
    /// Number of owned rows.
    pub fn local_rows(&self) -> usize {
        self.local_rows
    }

    /// Number of rows of the whole distributed system.
    pub fn global_rows(&self) -> GlobalInt {
        self.global_rows
    }

    /// Number of stored entries on this rank.
    pub fn local_nnz(&self) -> usize {
        self.values.len()
    }

    /// Number of distinct halo columns.
    pub fn halo_len(&self) -> usize {
        self.halo_len
    }

    /// Global id of every owned row, in storage order.
    pub fn local_to_global(&self) -> &[GlobalInt] {
        &self.local_to_global
    }

    /// Local column ids and values of `row`.
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        (&self.cols[range.clone()], &self.values[range])
    }

    /// Global column ids of `row`, in the same order as [`SparseMatrix::row`].
    pub fn row_global_cols(&self, row: usize) -> &[GlobalInt] {
        &self.global_cols[self.row_ptr[row]..self.row_ptr[row + 1]]
    }

    /// Number of entries in `row`, the diagonal included.
    pub fn row_len(&self, row: usize) -> usize {
        self.row_ptr[row + 1] - self.row_ptr[row]
    }

    /// Diagonal value of `row`.
    pub fn diagonal(&self, row: usize) -> f64 {
        self.values[self.diag[row]]
    }

    /// Number of halo entries in `row`.
    pub fn row_halo_len(&self, row: usize) -> usize {
        self.row_ptr[row + 1] - self.halo_start[row]
    }

    /// Number of color classes rows are grouped in. An unoptimized matrix has a
    /// single class holding every row.
    pub fn num_colors(&self) -> usize {
        self.color_ptr.len() - 1
    }

    /// Rows of color `color`.
    pub fn color_range(&self, color: usize) -> std::ops::Range<usize> {
        self.color_ptr[color]..self.color_ptr[color + 1]
    }

    /// The neighbor exchange this matrix needs.
    pub fn pattern(&self) -> &HaloPattern {
        &self.pattern
    }

    /// `true` once [`optimize_matrix`](crate::optimize::optimize_matrix) has run.
    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    /// Fails if some column has no local id yet.
    pub(crate) fn check_ready(&self) -> Result<()> {
        if self.unresolved > 0 {
            return Err(HpcgError::new(HpcgErrorKind::InvariantViolation,
                format!("matrix has {} unresolved halo references; optimize it before use", self.unresolved)));
        }
        Ok(())
    }

    /// Fails unless `x` has an owned section of `local_rows` entries and room for
    /// every halo column.
    pub(crate) fn check_input(&self, name: &str, x: &Vector) -> Result<()> {
        if x.local_len() != self.local_rows || x.halo_len() < self.halo_len {
            return Err(HpcgError::new(HpcgErrorKind::DimensionMismatch,
                format!("{} has {}+{} entries, matrix needs {}+{}",
                    name, x.local_len(), x.halo_len(), self.local_rows, self.halo_len)));
        }
        Ok(())
    }

    pub(crate) fn check_output(&self, name: &str, y: &Vector) -> Result<()> {
        if y.local_len() != self.local_rows {
            return Err(HpcgError::new(HpcgErrorKind::DimensionMismatch,
                format!("{} has {} entries, matrix has {} rows", name, y.local_len(), self.local_rows)));
        }
        Ok(())
    }

    /// Computes the matrix-vector product, `y = Ax`.
    ///
    /// The halo section of `x` is refreshed from the neighbors as part of the call.
    /// The owned-column part of every row is computed while the exchange is in
    /// flight, and the halo-column terms are added once it completes. Each row sums
    /// its terms in storage order, so results are bitwise reproducible.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let geom = Geometry::new(1, 0, 3, 3, 3).unwrap();
    /// let mut problem = Problem::generate(&geom).unwrap();
    /// optimize_problem(&geom, &mut problem).unwrap();
    ///
    /// let mut ones = Vector::with_halo(27, problem.a.halo_len());
    /// ones.set_all(1.0);
    /// let mut y = Vector::new(27);
    /// problem.a.mult(&SerialComm, &mut ones, &mut y).unwrap();
    /// assert_eq!(y.as_slice(), problem.b.as_slice());
    /// ```
    pub fn mult(&self, world: &dyn Comm, x: &mut Vector, y: &mut Vector) -> Result<()> {
        self.check_ready()?;
        self.check_input("x", x)?;
        self.check_output("y", y)?;

        let (owned, halo) = x.split_mut();
        let owned: &[f64] = owned;
        let halo = &mut halo[..self.halo_len];
        let y = y.as_mut_slice();

        world.exchange_halo(&self.pattern, owned, halo, &mut || self.mult_owned(owned, y))?;
        self.add_halo_terms(halo, y);
        Ok(())
    }

    /// Computes `y = Ax` from whatever the halo section of `x` currently holds,
    /// without communicating.
    pub fn mult_local(&self, x: &Vector, y: &mut Vector) -> Result<()> {
        self.check_ready()?;
        self.check_input("x", x)?;
        self.check_output("y", y)?;

        let (owned, halo) = x.full().split_at(self.local_rows);
        let y = y.as_mut_slice();
        self.mult_owned(owned, y);
        self.add_halo_terms(&halo[..self.halo_len], y);
        Ok(())
    }

    fn mult_owned(&self, owned: &[f64], y: &mut [f64]) {
        for (row, y) in y.iter_mut().enumerate() {
            let mut sum = 0.0;
            for k in self.row_ptr[row]..self.halo_start[row] {
                sum += self.values[k] * owned[self.cols[k]];
            }
            *y = sum;
        }
    }

    fn add_halo_terms(&self, halo: &[f64], y: &mut [f64]) {
        for &row in &self.halo_rows {
            let mut sum = y[row];
            for k in self.halo_start[row]..self.row_ptr[row + 1] {
                sum += self.values[k] * halo[self.cols[k] - self.local_rows];
            }
            y[row] = sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn unoptimized_single_rank_matrix_is_usable() {
        let geom = Geometry::new(1, 0, 2, 3, 2).unwrap();
        let problem = Problem::generate(&geom).unwrap();
        assert!(!problem.a.is_optimized());
        assert_eq!(problem.a.num_colors(), 1);

        let mut ones = Vector::new(12);
        ones.set_all(1.0);
        let mut y = Vector::new(12);
        problem.a.mult_local(&ones, &mut y).unwrap();
        assert_eq!(y, problem.b);
    }

    #[test]
    fn unoptimized_multi_rank_matrix_is_rejected() {
        let geom = Geometry::new(2, 0, 2, 2, 2).unwrap();
        let problem = Problem::generate(&geom).unwrap();
        let mut x = Vector::new(8);
        let mut y = Vector::new(8);
        let err = problem.a.mult(&SerialComm, &mut x, &mut y).unwrap_err();
        assert_eq!(err.kind(), HpcgErrorKind::InvariantViolation);
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        let geom = Geometry::new(1, 0, 2, 2, 2).unwrap();
        let problem = Problem::generate(&geom).unwrap();
        let mut x = Vector::new(7);
        let mut y = Vector::new(8);
        let err = problem.a.mult(&SerialComm, &mut x, &mut y).unwrap_err();
        assert_eq!(err.kind(), HpcgErrorKind::DimensionMismatch);
        let mut x = Vector::new(8);
        let mut y = Vector::new(9);
        assert!(problem.a.mult(&SerialComm, &mut x, &mut y).is_err());
    }
}
