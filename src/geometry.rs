//! Domain decomposition: the Cartesian process grid and each rank's local sub-block.
//!
//! The global domain is a `gnx × gny × gnz` grid of points, `gnx = npx·nx` and so on,
//! split into `npx × npy × npz` equally sized sub-blocks of `nx × ny × nz` points.
//! Ranks are laid out over the process grid in row-major order, x fastest.
//!
//! Global rows are numbered process-contiguously: rank `r` owns
//! `r·(nx·ny·nz) .. (r+1)·(nx·ny·nz)`, and inside a sub-block points are numbered
//! x fastest, then y, then z. All mappings between grid coordinates, global indices
//! and owning ranks are pure functions of the [`Geometry`]; every rank computes the
//! same answers without communicating.

use std::ops::Range;

use serde::Serialize;

use crate::{GlobalInt, HpcgError, HpcgErrorKind, Result};

/// Process grid and local sub-block of one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    /// Number of ranks.
    pub size: usize,
    /// This rank.
    pub rank: usize,
    /// Process grid dimensions, `npx·npy·npz == size`.
    pub npx: usize,
    pub npy: usize,
    pub npz: usize,
    /// This rank's coordinate in the process grid.
    pub ipx: usize,
    pub ipy: usize,
    pub ipz: usize,
    /// Local sub-block dimensions.
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

/// Factors `size` into a process grid `(npx, npy, npz)` that is as close to a cube as
/// possible.
///
/// Among all factorizations with `npx ≥ npy ≥ npz` this picks the one with the
/// smallest `npx − npz`, then the smallest `npx`.
///
/// ```
/// # use hpcg_rs::geometry::factor_process_grid;
/// assert_eq!(factor_process_grid(1).unwrap(), (1, 1, 1));
/// assert_eq!(factor_process_grid(8).unwrap(), (2, 2, 2));
/// assert_eq!(factor_process_grid(12).unwrap(), (3, 2, 2));
/// assert_eq!(factor_process_grid(7).unwrap(), (7, 1, 1));
/// ```
pub fn factor_process_grid(size: usize) -> Result<(usize, usize, usize)> {
    if size == 0 {
        return Err(HpcgError::new(HpcgErrorKind::Configuration,
            "cannot build a process grid for zero processes"));
    }

    let mut best: Option<(usize, usize, usize)> = None;
    let mut pz = 1;
    while pz * pz * pz <= size {
        if size % pz == 0 {
            let rest = size / pz;
            let mut py = pz;
            while py * py <= rest {
                if rest % py == 0 {
                    let cand = (rest / py, py, pz);
                    let better = match best {
                        None => true,
                        Some(b) => (cand.0 - cand.2, cand.0) < (b.0 - b.2, b.0),
                    };
                    if better {
                        best = Some(cand);
                    }
                }
                py += 1;
            }
        }
        pz += 1;
    }

    // pz = 1, py = 1 always qualifies
    best.ok_or_else(|| HpcgError::new(HpcgErrorKind::Configuration,
        format!("no process grid for {} processes", size)))
}

impl Geometry {
    /// Computes the process grid for `size` ranks and places `rank` in it.
    ///
    /// # Parameters
    /// * `size` - number of cooperating ranks
    /// * `rank` - this rank, in `0..size`
    /// * `nx, ny, nz` - local sub-block dimensions, all positive
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let geom = Geometry::new(8, 5, 16, 16, 16).unwrap();
    /// assert_eq!((geom.npx, geom.npy, geom.npz), (2, 2, 2));
    /// assert_eq!((geom.ipx, geom.ipy, geom.ipz), (1, 0, 1));
    /// assert_eq!(geom.global_rows(), 8 * 16 * 16 * 16);
    /// ```
    pub fn new(size: usize, rank: usize, nx: usize, ny: usize, nz: usize) -> Result<Self> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(HpcgError::new(HpcgErrorKind::Configuration,
                format!("local dimensions must be positive, got {}x{}x{}", nx, ny, nz)));
        }
        if rank >= size {
            return Err(HpcgError::new(HpcgErrorKind::Configuration,
                format!("rank {} is outside of a {} process group", rank, size)));
        }
        let (npx, npy, npz) = factor_process_grid(size)?;

        let overflow = || HpcgError::new(HpcgErrorKind::Configuration,
            format!("{} processes of {}x{}x{} points overflow the global index type", size, nx, ny, nz));
        (size as GlobalInt).checked_mul(nx as GlobalInt)
            .and_then(|v| v.checked_mul(ny as GlobalInt))
            .and_then(|v| v.checked_mul(nz as GlobalInt))
            .ok_or_else(overflow)?;
        nx.checked_mul(ny).and_then(|v| v.checked_mul(nz)).ok_or_else(overflow)?;

        let mut geom = Geometry { size, rank, npx, npy, npz, ipx: 0, ipy: 0, ipz: 0, nx, ny, nz };
        let (ipx, ipy, ipz) = geom.coords_of_rank(rank);
        geom.ipx = ipx;
        geom.ipy = ipy;
        geom.ipz = ipz;

        log::debug!("rank {}: process grid {}x{}x{}, coordinate ({}, {}, {}), local block {}x{}x{}",
            rank, npx, npy, npz, ipx, ipy, ipz, nx, ny, nz);

        Ok(geom)
    }

    /// Number of rows owned by each rank.
    pub fn local_rows(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Number of rows of the whole system.
    pub fn global_rows(&self) -> GlobalInt {
        self.size as GlobalInt * self.local_rows() as GlobalInt
    }

    /// Global grid dimensions `(gnx, gny, gnz)`.
    pub fn global_dims(&self) -> (usize, usize, usize) {
        (self.npx * self.nx, self.npy * self.ny, self.npz * self.nz)
    }

    /// Global grid coordinate of this rank's local point `(0, 0, 0)`.
    pub fn offsets(&self) -> (usize, usize, usize) {
        (self.ipx * self.nx, self.ipy * self.ny, self.ipz * self.nz)
    }

    /// Global indices owned by this rank.
    pub fn owned_range(&self) -> Range<GlobalInt> {
        let n = self.local_rows() as GlobalInt;
        self.rank as GlobalInt * n..(self.rank as GlobalInt + 1) * n
    }

    /// Process grid coordinate of `rank`.
    pub fn coords_of_rank(&self, rank: usize) -> (usize, usize, usize) {
        (rank % self.npx, (rank / self.npx) % self.npy, rank / (self.npx * self.npy))
    }

    /// Rank at process grid coordinate `(ipx, ipy, ipz)`.
    pub fn rank_of_coords(&self, ipx: usize, ipy: usize, ipz: usize) -> usize {
        ipx + self.npx * (ipy + self.npy * ipz)
    }

    /// Index of local point `(ix, iy, iz)` in this rank's natural ordering.
    pub fn local_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        ix + self.nx * (iy + self.ny * iz)
    }

    /// Inverse of [`Geometry::local_index`].
    pub fn local_coords(&self, local: usize) -> (usize, usize, usize) {
        (local % self.nx, (local / self.nx) % self.ny, local / (self.nx * self.ny))
    }

    /// `true` if the (possibly out of range) global coordinate lies inside the domain.
    pub fn in_domain(&self, gx: i64, gy: i64, gz: i64) -> bool {
        let (gnx, gny, gnz) = self.global_dims();
        gx >= 0 && gy >= 0 && gz >= 0 && (gx as usize) < gnx && (gy as usize) < gny && (gz as usize) < gnz
    }

    /// Rank owning global grid point `(gx, gy, gz)`.
    pub fn owner_of(&self, gx: usize, gy: usize, gz: usize) -> usize {
        self.rank_of_coords(gx / self.nx, gy / self.ny, gz / self.nz)
    }

    /// Rank owning global row `global`.
    pub fn owner_of_index(&self, global: GlobalInt) -> usize {
        (global / self.local_rows() as GlobalInt) as usize
    }

    /// Global row of grid point `(gx, gy, gz)`.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let geom = Geometry::new(2, 0, 2, 2, 2).unwrap();
    /// // rank 1 sits next to rank 0 in x and owns rows 8..16
    /// assert_eq!(geom.global_index(2, 0, 0), 8);
    /// assert_eq!(geom.global_coords(8), (2, 0, 0));
    /// ```
    pub fn global_index(&self, gx: usize, gy: usize, gz: usize) -> GlobalInt {
        let owner = self.owner_of(gx, gy, gz);
        let local = self.local_index(gx % self.nx, gy % self.ny, gz % self.nz);
        owner as GlobalInt * self.local_rows() as GlobalInt + local as GlobalInt
    }

    /// Grid point of global row `global`. Inverse of [`Geometry::global_index`].
    pub fn global_coords(&self, global: GlobalInt) -> (usize, usize, usize) {
        let n = self.local_rows() as GlobalInt;
        let owner = (global / n) as usize;
        let (lx, ly, lz) = self.local_coords((global % n) as usize);
        let (px, py, pz) = self.coords_of_rank(owner);
        (px * self.nx + lx, py * self.ny + ly, pz * self.nz + lz)
    }

    /// Global grid coordinate of this rank's local point `(ix, iy, iz)`.
    pub fn to_global_coords(&self, ix: usize, iy: usize, iz: usize) -> (usize, usize, usize) {
        let (x0, y0, z0) = self.offsets();
        (x0 + ix, y0 + iy, z0 + iz)
    }

    /// `true` if `other` is this rank or one of its (up to 26) geometric neighbors.
    pub fn is_neighbor_rank(&self, other: usize) -> bool {
        if other >= self.size {
            return false;
        }
        let (ox, oy, oz) = self.coords_of_rank(other);
        let d = |a: usize, b: usize| if a > b { a - b } else { b - a };
        d(ox, self.ipx) <= 1 && d(oy, self.ipy) <= 1 && d(oz, self.ipz) <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factorization_multiplies_back() {
        for size in 1..=128 {
            let (px, py, pz) = factor_process_grid(size).unwrap();
            assert_eq!(px * py * pz, size);
            assert!(px >= py && py >= pz && pz >= 1);
        }
        assert_eq!(factor_process_grid(27).unwrap(), (3, 3, 3));
        assert_eq!(factor_process_grid(6).unwrap(), (3, 2, 1));
    }

    #[test]
    fn rejects_degenerate_input() {
        assert_eq!(Geometry::new(0, 0, 4, 4, 4).unwrap_err().kind(), HpcgErrorKind::Configuration);
        assert_eq!(Geometry::new(4, 4, 4, 4, 4).unwrap_err().kind(), HpcgErrorKind::Configuration);
        assert_eq!(Geometry::new(4, 0, 0, 4, 4).unwrap_err().kind(), HpcgErrorKind::Configuration);
    }

    #[test]
    fn rank_coordinates_round_trip() {
        let geom = Geometry::new(12, 0, 3, 2, 2).unwrap();
        for rank in 0..12 {
            let (x, y, z) = geom.coords_of_rank(rank);
            assert_eq!(geom.rank_of_coords(x, y, z), rank);
        }
        // x fastest
        assert_eq!(geom.coords_of_rank(1), (1, 0, 0));
        assert_eq!(geom.coords_of_rank(geom.npx), (0, 1, 0));
    }

    #[test]
    fn global_index_round_trips_over_domain() {
        let geom = Geometry::new(6, 4, 3, 2, 2).unwrap();
        let (gnx, gny, gnz) = geom.global_dims();
        let mut seen = vec![false; geom.global_rows() as usize];
        for gz in 0..gnz {
            for gy in 0..gny {
                for gx in 0..gnx {
                    let g = geom.global_index(gx, gy, gz);
                    assert!(!seen[g as usize]);
                    seen[g as usize] = true;
                    assert_eq!(geom.global_coords(g), (gx, gy, gz));
                    assert_eq!(geom.owner_of_index(g), geom.owner_of(gx, gy, gz));
                }
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn neighbor_ranks() {
        let geom = Geometry::new(27, 13, 2, 2, 2).unwrap();
        assert_eq!((geom.ipx, geom.ipy, geom.ipz), (1, 1, 1));
        assert_eq!((0..27).filter(|&r| geom.is_neighbor_rank(r)).count(), 27);
        let corner = Geometry::new(27, 0, 2, 2, 2).unwrap();
        assert_eq!((0..27).filter(|&r| corner.is_neighbor_rank(r)).count(), 8);
    }
}
