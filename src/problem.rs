//! Generation of the 27-point stencil system.

use crate::geometry::Geometry;
use crate::halo::HaloPattern;
use crate::mat::{SparseMatrix, UNRESOLVED};
use crate::vector::Vector;
use crate::Result;

/// Maximum number of entries in a row.
pub const STENCIL_POINTS: usize = 27;
/// Value of every diagonal entry, boundary rows included.
pub const DIAGONAL_VALUE: f64 = 26.0;
/// Value of every off-diagonal entry.
pub const OFF_DIAGONAL_VALUE: f64 = -1.0;

/// The linear system of one rank together with its vectors.
///
/// `xexact` is all ones and `b` is chosen so that `A·xexact = b` holds exactly.
#[derive(Debug, Clone)]
pub struct Problem {
    pub a: SparseMatrix,
    pub x: Vector,
    pub b: Vector,
    pub xexact: Vector,
}

impl Problem {
    /// Builds this rank's rows of the system.
    ///
    /// Every local grid point becomes one row, coupled to each of its (up to 26)
    /// neighbors that lie inside the global domain. Rows are emitted in natural local
    /// order. Columns owned by another rank keep only their global id until the
    /// matrix is [optimized](crate::optimize::optimize_problem).
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let geom = Geometry::new(1, 0, 4, 4, 4).unwrap();
    /// let problem = Problem::generate(&geom).unwrap();
    /// assert_eq!(problem.a.local_rows(), 64);
    /// // a corner point has 7 neighbors
    /// assert_eq!(problem.a.row_len(0), 8);
    /// assert_eq!(problem.b[0], 19.0);
    /// ```
    pub fn generate(geom: &Geometry) -> Result<Self> {
        let n = geom.local_rows();
        let first = geom.owned_range().start;

        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut cols = Vec::with_capacity(n * STENCIL_POINTS);
        let mut global_cols = Vec::with_capacity(n * STENCIL_POINTS);
        let mut values = Vec::with_capacity(n * STENCIL_POINTS);
        let mut diag = Vec::with_capacity(n);
        let mut b = Vec::with_capacity(n);
        let mut unresolved = 0;
        row_ptr.push(0);

        for iz in 0..geom.nz {
            for iy in 0..geom.ny {
                for ix in 0..geom.nx {
                    let (gx, gy, gz) = geom.to_global_coords(ix, iy, iz);
                    let mut offdiag = 0;
                    for dz in -1i64..=1 {
                        for dy in -1i64..=1 {
                            for dx in -1i64..=1 {
                                let (cx, cy, cz) = (gx as i64 + dx, gy as i64 + dy, gz as i64 + dz);
                                if !geom.in_domain(cx, cy, cz) {
                                    continue;
                                }
                                let (cx, cy, cz) = (cx as usize, cy as usize, cz as usize);
                                let global = geom.global_index(cx, cy, cz);

                                if (dx, dy, dz) == (0, 0, 0) {
                                    diag.push(values.len());
                                    values.push(DIAGONAL_VALUE);
                                } else {
                                    values.push(OFF_DIAGONAL_VALUE);
                                    offdiag += 1;
                                }
                                global_cols.push(global);
                                if geom.owner_of(cx, cy, cz) == geom.rank {
                                    cols.push((global - first) as usize);
                                } else {
                                    cols.push(UNRESOLVED);
                                    unresolved += 1;
                                }
                            }
                        }
                    }
                    row_ptr.push(values.len());
                    b.push(DIAGONAL_VALUE + OFF_DIAGONAL_VALUE * offdiag as f64);
                }
            }
        }

        // Until the optimizer sorts owned and halo entries apart, every row counts
        // as owned-only; an unresolved matrix refuses to be applied anyway.
        let halo_start = row_ptr[1..].to_vec();

        log::debug!("rank {}: generated {} rows, {} entries, {} off-rank references",
            geom.rank, n, values.len(), unresolved);

        let a = SparseMatrix {
            local_rows: n,
            global_rows: geom.global_rows(),
            row_ptr,
            cols,
            global_cols,
            values,
            diag,
            halo_start,
            local_to_global: geom.owned_range().collect(),
            halo_len: 0,
            halo_rows: vec![],
            color_ptr: vec![0, n],
            pattern: HaloPattern::default(),
            unresolved,
            optimized: false,
        };

        let mut xexact = Vector::new(n);
        xexact.set_all(1.0);

        Ok(Problem { a, x: Vector::new(n), b: Vector::from_values(b), xexact })
    }

    /// Zeroes the solution vector, halo slots included.
    pub fn reset_solution(&mut self) {
        self.x.set_all(0.0);
    }
}
