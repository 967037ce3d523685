//! Writing a generated problem to disk for inspection.
//!
//! Each rank writes its own file set into the target directory:
//! * `A_<rank>.mtx`: the local rows in coordinate format with global ids,
//! * `x_<rank>.txt`, `b_<rank>.txt`, `xexact_<rank>.txt`: one value per line, in
//!   natural grid order (x fastest), independent of any reordering.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array3;

use crate::geometry::Geometry;
use crate::mat::SparseMatrix;
use crate::problem::Problem;
use crate::vector::Vector;
use crate::{HpcgError, HpcgErrorKind, Result};

/// Lays the owned entries of `v` out on this rank's grid block, indexed `[iz, iy, ix]`.
///
/// ```
/// # use hpcg_rs::prelude::*;
/// let geom = Geometry::new(1, 0, 3, 2, 2).unwrap();
/// let mut problem = Problem::generate(&geom).unwrap();
/// optimize_problem(&geom, &mut problem).unwrap();
/// let grid = hpcg_rs::dump::to_grid(&geom, &problem.a, &problem.b).unwrap();
/// assert_eq!(grid.dim(), (2, 2, 3));
/// // corner of a 3x2x2 block: 7 neighbors
/// assert_eq!(grid[[0, 0, 0]], 19.0);
/// ```
pub fn to_grid(geom: &Geometry, a: &SparseMatrix, v: &Vector) -> Result<Array3<f64>> {
    if v.local_len() != a.local_rows() {
        return Err(HpcgError::new(HpcgErrorKind::DimensionMismatch,
            format!("vector has {} entries, matrix has {} rows", v.local_len(), a.local_rows())));
    }
    let (x0, y0, z0) = geom.offsets();
    let mut grid = Array3::zeros((geom.nz, geom.ny, geom.nx));
    for (row, &g) in a.local_to_global().iter().enumerate() {
        let (gx, gy, gz) = geom.global_coords(g);
        grid[[gz - z0, gy - y0, gx - x0]] = v[row];
    }
    Ok(grid)
}

/// Writes this rank's part of `problem` into `dir`, creating it if needed.
pub fn write_problem(dir: &Path, geom: &Geometry, problem: &Problem) -> Result<()> {
    fs::create_dir_all(dir)?;
    let a = &problem.a;

    let mut out = BufWriter::new(File::create(dir.join(format!("A_{}.mtx", geom.rank)))?);
    writeln!(out, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(out, "% rows {}..{} of rank {}", geom.owned_range().start, geom.owned_range().end, geom.rank)?;
    writeln!(out, "{} {} {}", a.global_rows(), a.global_rows(), a.local_nnz())?;
    for (row, &g) in a.local_to_global().iter().enumerate() {
        let (_, values) = a.row(row);
        for (&col, &v) in a.row_global_cols(row).iter().zip(values) {
            writeln!(out, "{} {} {}", g + 1, col + 1, v)?;
        }
    }
    out.flush()?;

    for (name, v) in [("x", &problem.x), ("b", &problem.b), ("xexact", &problem.xexact)].iter() {
        let grid = to_grid(geom, a, v)?;
        let mut out = BufWriter::new(File::create(dir.join(format!("{}_{}.txt", name, geom.rank)))?);
        for value in grid.iter() {
            writeln!(out, "{}", value)?;
        }
        out.flush()?;
    }

    log::info!("rank {}: wrote problem to {}", geom.rank, dir.display());
    Ok(())
}
