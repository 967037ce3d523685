//! Shared helpers for the hpcg-rs integration tests.

#![allow(dead_code)]

use hpcg_rs::prelude::*;

/// Generates and optimizes the problem of `rank` out of `size` ranks.
pub fn optimized(size: usize, rank: usize, (nx, ny, nz): (usize, usize, usize)) -> (Geometry, Problem) {
    let geom = Geometry::new(size, rank, nx, ny, nz).unwrap();
    let mut problem = Problem::generate(&geom).unwrap();
    optimize_problem(&geom, &mut problem).unwrap();
    (geom, problem)
}

/// [`optimized`] for every rank of a `size` rank group. Generation and optimization
/// never communicate, so this runs sequentially.
pub fn all_ranks(size: usize, dims: (usize, usize, usize)) -> Vec<(Geometry, Problem)> {
    (0..size).map(|rank| optimized(size, rank, dims)).collect()
}

/// Euclidean distance between two slices.
pub fn l2_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Runs a CG solve with the given settings on each rank of `size` thread ranks.
pub fn threaded_cg(size: usize, dims: (usize, usize, usize), tolerance: f64, max_iters: usize,
    pc_type: PcType) -> Vec<CgResult>
{
    Hpcg::run_threaded(size, |hpcg| {
        let (_, mut problem) = optimized(hpcg.size(), hpcg.rank(), dims);
        let mut cg = hpcg.cg_create();
        cg.set_pc_type(pc_type);
        cg.set_operators(&problem.a).unwrap();
        cg.set_tolerances(tolerance, max_iters);
        cg.solve(&problem.b, &mut problem.x).unwrap()
    }).unwrap()
}
