//! The benchmark driver: generate, optimize, solve repeatedly, report.

use std::path::PathBuf;

use serde::Serialize;

use crate::cg::{CgResult, DEFAULT_MAX_ITERS};
use crate::dump;
use crate::geometry::Geometry;
use crate::optimize::optimize_problem;
use crate::pc::PcType;
use crate::problem::Problem;
use crate::report::BenchmarkReport;
use crate::{hpcg_println, Hpcg, HpcgError, HpcgErrorKind, Result};

/// Parameters of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchParams {
    /// Local sub-block dimensions.
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub max_iters: usize,
    /// Number of CG solves, each from `x = 0`.
    pub cg_calls: usize,
    /// Zero makes every solve run `max_iters` iterations.
    pub tolerance: f64,
    pub pc_type: PcType,
    /// Write the optimized problem here before solving.
    pub dump_dir: Option<PathBuf>,
}

impl BenchParams {
    /// Parameters for an `nx × ny × nz` block per rank with the default solver
    /// settings: 50 iterations, one call, tolerance zero, symmetric Gauss-Seidel.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        BenchParams { nx, ny, nz, max_iters: DEFAULT_MAX_ITERS, cg_calls: 1, tolerance: 0.0,
            pc_type: PcType::default(), dump_dir: None }
    }

    /// Rejects settings that could not produce a report.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let mut params = BenchParams::new(4, 4, 4);
    /// assert!(params.validate().is_ok());
    /// params.cg_calls = 0;
    /// assert_eq!(params.validate().unwrap_err().kind(), HpcgErrorKind::Usage);
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(HpcgError::new(HpcgErrorKind::Usage,
                format!("local block {}x{}x{} is empty", self.nx, self.ny, self.nz)));
        }
        if self.cg_calls == 0 {
            return Err(HpcgError::new(HpcgErrorKind::Usage, "at least one CG call is needed"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(HpcgError::new(HpcgErrorKind::Usage,
                format!("tolerance {} is not a finite non-negative number", self.tolerance)));
        }
        Ok(())
    }
}

/// Everything a benchmark run produced on this rank.
#[derive(Debug, Clone)]
pub struct BenchOutcome {
    pub geometry: Geometry,
    pub results: Vec<CgResult>,
    pub report: BenchmarkReport,
}

/// Runs the benchmark on every rank of `hpcg`.
///
/// ```
/// # use hpcg_rs::prelude::*;
/// let hpcg = Hpcg::init_no_args().unwrap();
/// let mut params = BenchParams::new(4, 4, 4);
/// params.max_iters = 10;
/// params.cg_calls = 2;
/// let outcome = run_benchmark(&hpcg, &params).unwrap();
/// assert_eq!(outcome.results.len(), 2);
/// assert_eq!(outcome.report.total_iterations, 20);
/// assert_eq!(outcome.report.final_iterations, 10);
/// assert_eq!(outcome.results[0].residual_history, outcome.results[1].residual_history);
/// ```
pub fn run_benchmark(hpcg: &Hpcg, params: &BenchParams) -> Result<BenchOutcome> {
    params.validate()?;
    let geom = Geometry::new(hpcg.size(), hpcg.rank(), params.nx, params.ny, params.nz)?;
    let (gnx, gny, gnz) = geom.global_dims();
    hpcg_println!(hpcg, "Process grid {}x{}x{}, global domain {}x{}x{}",
        geom.npx, geom.npy, geom.npz, gnx, gny, gnz);

    let mut problem = Problem::generate(&geom)?;
    let mut optimize_time = 0.0;
    timed!(optimize_time, optimize_problem(&geom, &mut problem))?;

    if let Some(dir) = &params.dump_dir {
        dump::write_problem(dir, &geom, &problem)?;
    }

    let mut cg = hpcg.cg_create();
    cg.set_pc_type(params.pc_type);
    cg.set_operators(&problem.a)?;
    cg.set_tolerances(params.tolerance, params.max_iters);

    let mut results = Vec::with_capacity(params.cg_calls);
    for i in 0..params.cg_calls {
        problem.x.set_all(0.0); // same as Problem::reset_solution, as a disjoint field borrow
        let res = cg.solve(&problem.b, &mut problem.x)?;
        hpcg_println!(hpcg, "Call [{}] Residual [{:e}]", i, res.normr);
        results.push(res);
    }

    let error = hpcg.global_residual(&problem.x, &problem.xexact)?;
    hpcg_println!(hpcg, "Difference between computed and exact = {:e}", error);

    let report = BenchmarkReport::new(hpcg, &geom, &problem.a, &results, optimize_time)?
        .with_solution_error(error);
    log::info!("rank {}: benchmark done, {} iterations in {:.3}s", hpcg.rank(),
        report.total_iterations, report.timings.total);

    Ok(BenchOutcome { geometry: geom, results, report })
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn zero_calls_fail_before_setup() {
        let hpcg = Hpcg::init_no_args().unwrap();
        let mut params = BenchParams::new(2, 2, 2);
        params.cg_calls = 0;
        // never reached
        params.dump_dir = Some("/nonexistent/hpcg-dump".into());
        let err = run_benchmark(&hpcg, &params).unwrap_err();
        assert_eq!(err.kind(), HpcgErrorKind::Usage);
        assert!(err.to_string().contains("at least one CG call"));
    }

    #[test]
    fn bad_tolerances_are_rejected() {
        for &tol in &[-1.0, f64::NAN, f64::INFINITY] {
            let mut params = BenchParams::new(2, 2, 2);
            params.tolerance = tol;
            assert!(params.validate().is_err());
        }
        assert!(BenchParams::new(0, 2, 2).validate().is_err());
    }

    #[test]
    fn each_call_starts_from_zero() {
        let hpcg = Hpcg::init_no_args().unwrap();
        let mut params = BenchParams::new(3, 3, 3);
        params.max_iters = 5;
        params.cg_calls = 3;
        let outcome = run_benchmark(&hpcg, &params).unwrap();
        let first = &outcome.results[0];
        for res in &outcome.results[1..] {
            assert_eq!(res.normr0, first.normr0);
            assert_eq!(res.normr, first.normr);
        }
        assert_eq!(outcome.report.final_iterations, 5);
    }
}
