//! The benchmark report: problem description, iteration counts, timings and rates.

use std::convert::TryInto;
use std::fmt;

use serde::Serialize;

use crate::cg::CgResult;
use crate::geometry::Geometry;
use crate::mat::SparseMatrix;
use crate::pc::PcType;
use crate::timing::{Timings, NUM_PHASES};
use crate::{GlobalInt, Hpcg, HpcgError, HpcgErrorKind, Result};

/// Floating point operation counts, or rates in GFLOP/s, per kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Flops {
    pub dot: f64,
    pub waxpby: f64,
    pub spmv: f64,
    pub precond: f64,
    pub total: f64,
}

/// Flat, read-only record of a benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub comm: &'static str,
    pub ranks: usize,
    pub process_grid: (usize, usize, usize),
    pub local_dims: (usize, usize, usize),
    pub global_dims: (usize, usize, usize),
    pub global_rows: GlobalInt,
    pub global_nnz: u64,
    pub pc_type: PcType,
    pub cg_calls: usize,
    /// Iterations over all CG calls.
    pub total_iterations: usize,
    /// Iterations of the last CG call.
    pub final_iterations: usize,
    /// Residual norm at the end of the last CG call.
    pub final_residual: f64,
    pub scaled_residual: f64,
    /// Largest `|x − xexact|` over all ranks, if it was computed.
    pub solution_error: Option<f64>,
    /// Per phase maximum over ranks of the time summed over all CG calls.
    pub timings: Timings,
    /// `timings` as the flat array `[total, dot, waxpby, spmv, reduce, precond,
    /// overhead, optimize]`.
    pub timing_array: [f64; NUM_PHASES],
    pub flops: Flops,
    pub gflops: Flops,
}

impl BenchmarkReport {
    /// Builds the report from the results of every CG call.
    ///
    /// Reduces the nonzero count and the timings over all ranks, so it must be called
    /// on every rank.
    pub fn new(hpcg: &Hpcg, geom: &Geometry, a: &SparseMatrix, results: &[CgResult],
        optimize_time: f64) -> Result<Self>
    {
        let last = results.last().ok_or_else(|| HpcgError::new(HpcgErrorKind::Usage,
            "a report needs at least one CG call"))?;
        let world = hpcg.world();

        let global_nnz = world.all_reduce_count(a.local_nnz() as u64)?;

        let mut local = Timings::default();
        for res in results {
            local += res.timings;
        }
        local.optimize = optimize_time;
        let timings = Timings::from_array(local.as_array().iter()
            .map(|&t| world.all_reduce_max(t))
            .collect::<Result<Vec<_>>>()?
            .try_into()
            .map_err(|_| HpcgError::new(HpcgErrorKind::Communication, "timing reduction lost a slot"))?);

        let n = geom.global_rows() as f64;
        let nnz = global_nnz as f64;
        let mut flops = Flops::default();
        for res in results {
            let k = res.iterations as f64;
            flops.dot += (3.0 * k + 1.0) * 2.0 * n;
            flops.waxpby += (3.0 * k + 1.0) * 2.0 * n;
            flops.spmv += (k + 1.0) * 2.0 * nnz;
            if res.pc_type == PcType::SymGs {
                flops.precond += k * 4.0 * nnz;
            }
        }
        flops.total = flops.dot + flops.waxpby + flops.spmv + flops.precond;

        let rate = |f: f64, t: f64| if t > 0.0 { f / t * 1.0e-9 } else { 0.0 };
        let gflops = Flops {
            dot: rate(flops.dot, timings.dot + timings.reduce),
            waxpby: rate(flops.waxpby, timings.waxpby),
            spmv: rate(flops.spmv, timings.spmv),
            precond: rate(flops.precond, timings.precond),
            total: rate(flops.total, timings.total),
        };

        Ok(BenchmarkReport {
            comm: world.name(),
            ranks: geom.size,
            process_grid: (geom.npx, geom.npy, geom.npz),
            local_dims: (geom.nx, geom.ny, geom.nz),
            global_dims: geom.global_dims(),
            global_rows: geom.global_rows(),
            global_nnz,
            pc_type: last.pc_type,
            cg_calls: results.len(),
            total_iterations: results.iter().map(|r| r.iterations).sum(),
            final_iterations: last.iterations,
            final_residual: last.normr,
            scaled_residual: last.scaled_residual(),
            solution_error: None,
            timings,
            timing_array: timings.as_array(),
            flops,
            gflops,
        })
    }

    /// Attaches the distance to the exact solution.
    pub fn with_solution_error(mut self, error: f64) -> Self {
        self.solution_error = Some(error);
        self
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (npx, npy, npz) = self.process_grid;
        let (nx, ny, nz) = self.local_dims;
        let (gnx, gny, gnz) = self.global_dims;
        writeln!(f, "Communicator: {} ({} ranks)", self.comm, self.ranks)?;
        writeln!(f, "Process grid: {}x{}x{}", npx, npy, npz)?;
        writeln!(f, "Local domain: {}x{}x{}", nx, ny, nz)?;
        writeln!(f, "Global domain: {}x{}x{}", gnx, gny, gnz)?;
        writeln!(f, "Linear system: {} rows, {} nonzeros", self.global_rows, self.global_nnz)?;
        writeln!(f, "Preconditioner: {:?}", self.pc_type)?;
        writeln!(f, "CG calls: {}, iterations: {} ({} in the last call)", self.cg_calls,
            self.total_iterations, self.final_iterations)?;
        writeln!(f, "Final residual: {:e} (scaled {:e})", self.final_residual, self.scaled_residual)?;
        if let Some(err) = self.solution_error {
            writeln!(f, "Difference from exact solution: {:e}", err)?;
        }
        writeln!(f, "Timings (s):")?;
        for (name, t) in Timings::PHASE_NAMES.iter().zip(self.timing_array.iter()) {
            writeln!(f, "  {:<9} {:.6}", name, t)?;
        }
        writeln!(f, "GFLOP/s:")?;
        writeln!(f, "  dot       {:.4}", self.gflops.dot)?;
        writeln!(f, "  waxpby    {:.4}", self.gflops.waxpby)?;
        writeln!(f, "  spmv      {:.4}", self.gflops.spmv)?;
        writeln!(f, "  precond   {:.4}", self.gflops.precond)?;
        write!(f, "  total     {:.4}", self.gflops.total)
    }
}
