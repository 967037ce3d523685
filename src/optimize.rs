//! Reordering of a generated matrix for multicolor smoothing and halo exchange.
//!
//! Optimization runs once, after [`Problem::generate`](crate::problem::Problem::generate)
//! and before the first solve. It
//! 1. colors rows by the parity of their global grid coordinate and permutes them so
//!    that each color is a contiguous block of rows,
//! 2. gives every halo column a local id past the owned rows, grouped by owning rank
//!    and then by global id,
//! 3. reorders each row to diagonal first, then the remaining owned columns, then the
//!    halo columns, and
//! 4. builds the [`HaloPattern`] the matrix-vector product and the preconditioner
//!    exchange through.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::geometry::Geometry;
use crate::halo::{HaloPattern, Neighbor};
use crate::mat::SparseMatrix;
use crate::problem::Problem;
use crate::{GlobalInt, HpcgError, HpcgErrorKind, Result};

/// Number of color classes.
pub const NUM_COLORS: usize = 8;

/// Color of the global grid point `(gx, gy, gz)`.
///
/// Two points coupled by the 27-point stencil differ by one in at least one
/// coordinate, so they never share a color.
///
/// ```
/// # use hpcg_rs::optimize::color_of;
/// assert_eq!(color_of(0, 0, 0), 0);
/// assert_eq!(color_of(3, 0, 1), 5);
/// assert_ne!(color_of(4, 7, 2), color_of(5, 6, 2));
/// ```
pub fn color_of(gx: usize, gy: usize, gz: usize) -> usize {
    (gx & 1) + 2 * (gy & 1) + 4 * (gz & 1)
}

fn violation(msg: String) -> HpcgError {
    HpcgError::new(HpcgErrorKind::InvariantViolation, msg)
}

/// Optimizes `a` in place and returns the row permutation applied: new row `i` is
/// old row `perm[i]`. Vectors that belong to `a` must be permuted the same way, see
/// [`optimize_problem`].
///
/// Fails with [`HpcgErrorKind::InvariantViolation`] if the matrix was already
/// optimized, or references a column that no neighboring rank can own.
pub fn optimize_matrix(geom: &Geometry, a: &mut SparseMatrix) -> Result<Vec<usize>> {
    if a.optimized {
        return Err(violation("matrix is already optimized".into()));
    }
    if a.local_rows != geom.local_rows() || a.global_rows != geom.global_rows() {
        return Err(violation(format!("matrix with {} local rows does not match a {}x{}x{} block",
            a.local_rows, geom.nx, geom.ny, geom.nz)));
    }
    let n = a.local_rows;
    let first = geom.owned_range().start;

    // Colors, and a stable counting sort of the rows by color.
    let colors = a.local_to_global.iter()
        .map(|&g| {
            let (gx, gy, gz) = geom.global_coords(g);
            color_of(gx, gy, gz)
        })
        .collect::<Vec<_>>();
    let mut color_ptr = vec![0; NUM_COLORS + 1];
    for &c in &colors {
        color_ptr[c + 1] += 1;
    }
    for c in 0..NUM_COLORS {
        color_ptr[c + 1] += color_ptr[c];
    }
    let mut next = color_ptr.clone();
    let mut perm = vec![0; n];
    for (old, &c) in colors.iter().enumerate() {
        perm[next[c]] = old;
        next[c] += 1;
    }
    let mut inv_perm = vec![0; n];
    for (new, &old) in perm.iter().enumerate() {
        inv_perm[old] = new;
    }

    // Classify every off-rank reference by its owner.
    let mut recv: BTreeMap<usize, BTreeSet<GlobalInt>> = BTreeMap::new();
    let mut send: BTreeMap<usize, BTreeSet<(GlobalInt, usize)>> = BTreeMap::new();
    for row in 0..n {
        let row_global = a.local_to_global[row];
        for &g in &a.global_cols[a.row_ptr[row]..a.row_ptr[row + 1]] {
            if g >= a.global_rows {
                return Err(violation(format!("row {} references column {} outside of {} rows",
                    row_global, g, a.global_rows)));
            }
            let owner = geom.owner_of_index(g);
            if owner == geom.rank {
                continue;
            }
            if !geom.is_neighbor_rank(owner) {
                return Err(violation(format!("row {} references column {} on rank {}, which is not a neighbor of rank {}",
                    row_global, g, owner, geom.rank)));
            }
            recv.entry(owner).or_default().insert(g);
            send.entry(owner).or_default().insert((row_global, row));
        }
    }
    if !recv.keys().eq(send.keys()) {
        return Err(violation(format!("rank {} sends to and receives from different neighbor sets", geom.rank)));
    }

    // Halo slots: by owner rank, then by global id.
    let mut halo_ids: HashMap<GlobalInt, usize> = HashMap::new();
    for g in recv.values().flat_map(|set| set.iter()) {
        let slot = n + halo_ids.len();
        halo_ids.insert(*g, slot);
    }
    let halo_len = halo_ids.len();
    let local_col = |g: GlobalInt| -> Result<usize> {
        if geom.owned_range().contains(&g) {
            Ok(inv_perm[(g - first) as usize])
        } else {
            halo_ids.get(&g).copied()
                .ok_or_else(|| violation(format!("column {} has no halo slot on rank {}", g, geom.rank)))
        }
    };

    // Rebuild the rows in permuted order.
    let nnz = a.values.len();
    let mut row_ptr = Vec::with_capacity(n + 1);
    let mut cols = Vec::with_capacity(nnz);
    let mut global_cols = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    let mut diag = Vec::with_capacity(n);
    let mut halo_start = Vec::with_capacity(n);
    let mut halo_rows = Vec::new();
    row_ptr.push(0);
    for (new_row, &old) in perm.iter().enumerate() {
        let range = a.row_ptr[old]..a.row_ptr[old + 1];
        let mut entries = range.clone()
            .map(|k| -> Result<(usize, GlobalInt, f64)> {
                Ok((local_col(a.global_cols[k])?, a.global_cols[k], a.values[k]))
            })
            .collect::<Result<Vec<_>>>()?;
        let diag_pos = entries.iter().position(|e| e.0 == new_row)
            .ok_or_else(|| violation(format!("row {} has no diagonal entry", a.local_to_global[old])))?;
        let d = entries.remove(diag_pos);
        entries.sort_by_key(|e| e.0);

        diag.push(values.len());
        cols.push(d.0);
        global_cols.push(d.1);
        values.push(d.2);
        let mut start = None;
        for (col, g, v) in entries {
            if col >= n && start.is_none() {
                start = Some(values.len());
            }
            cols.push(col);
            global_cols.push(g);
            values.push(v);
        }
        if start.is_some() {
            halo_rows.push(new_row);
        }
        halo_start.push(start.unwrap_or(values.len()));
        row_ptr.push(values.len());
    }

    let neighbors = recv.into_iter().zip(send.into_iter())
        .map(|((rank, recv_globals), (_, sends))| {
            let (send_globals, send_rows): (Vec<_>, Vec<_>) = sends.into_iter()
                .map(|(g, old)| (g, inv_perm[old]))
                .unzip();
            Neighbor::new(rank, send_rows, send_globals, recv_globals.into_iter().collect())
        })
        .collect::<Vec<_>>();
    let pattern = HaloPattern::from_neighbors(neighbors);

    log::debug!("rank {}: {} halo columns from {} neighbors, {} values sent per exchange, {} boundary rows",
        geom.rank, halo_len, pattern.neighbors().len(), pattern.send_len(), halo_rows.len());

    a.local_to_global = perm.iter().map(|&old| a.local_to_global[old]).collect();
    a.row_ptr = row_ptr;
    a.cols = cols;
    a.global_cols = global_cols;
    a.values = values;
    a.diag = diag;
    a.halo_start = halo_start;
    a.halo_len = halo_len;
    a.halo_rows = halo_rows;
    a.color_ptr = color_ptr;
    a.pattern = pattern;
    a.unresolved = 0;
    a.optimized = true;

    Ok(perm)
}

/// Optimizes the matrix of `problem` and carries its vectors along: `b`, `x` and
/// `xexact` are permuted like the rows, and `x` gets room for the halo.
///
/// ```
/// # use hpcg_rs::prelude::*;
/// let geom = Geometry::new(1, 0, 4, 4, 4).unwrap();
/// let mut problem = Problem::generate(&geom).unwrap();
/// optimize_problem(&geom, &mut problem).unwrap();
/// assert_eq!(problem.a.num_colors(), 8);
/// assert_eq!(problem.a.color_range(0), 0..8);
/// assert!(optimize_problem(&geom, &mut problem).is_err());
/// ```
pub fn optimize_problem(geom: &Geometry, problem: &mut Problem) -> Result<()> {
    let perm = optimize_matrix(geom, &mut problem.a)?;
    problem.b.permute(&perm)?;
    problem.x.permute(&perm)?;
    problem.xexact.permute(&perm)?;
    problem.x.resize_halo(problem.a.halo_len());
    log::info!("rank {}: optimized {} rows into {} colors", geom.rank, problem.a.local_rows(), NUM_COLORS);
    Ok(())
}
