//! The preconditioned conjugate gradient solver.
//!
//! A [`CgSolver`] borrows its operator and communication layer from the caller, owns
//! its [preconditioner](crate::pc) and scratch vectors, and returns everything it
//! measured in a [`CgResult`].
//!
//! ```
//! # use hpcg_rs::prelude::*;
//! let hpcg = Hpcg::init_no_args().unwrap();
//! let geom = Geometry::new(1, 0, 4, 4, 4).unwrap();
//! let mut problem = Problem::generate(&geom).unwrap();
//! optimize_problem(&geom, &mut problem).unwrap();
//!
//! let mut cg = hpcg.cg_create();
//! cg.set_operators(&problem.a).unwrap();
//! cg.set_tolerances(0.0, 7);
//! let res = cg.solve(&problem.b, &mut problem.x).unwrap();
//! assert_eq!(res.status, CgStatus::MaxIterExceeded);
//! assert_eq!(res.iterations, 7);
//! assert_eq!(res.residual_history.len(), 8);
//! ```

use std::time::Instant;

use serde::Serialize;

use crate::comm::Comm;
use crate::mat::SparseMatrix;
use crate::pc::{PC, PcType};
use crate::timing::Timings;
use crate::vector::Vector;
use crate::{HpcgError, HpcgErrorKind, Result};

/// Default iteration cap.
pub const DEFAULT_MAX_ITERS: usize = 50;

/// State of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CgStatus {
    /// Initial residual computed, no iteration yet.
    Init,
    Iterating,
    /// Residual dropped below the tolerance.
    Converged,
    /// Stopped at the iteration cap. Not an error: a tolerance of zero always ends here.
    MaxIterExceeded,
}

/// Outcome of one [`CgSolver::solve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CgResult {
    pub status: CgStatus,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Norm of the initial residual `b − A·x₀`.
    pub normr0: f64,
    /// Norm of the final residual.
    pub normr: f64,
    /// Residual norm before the first and after every iteration.
    pub residual_history: Vec<f64>,
    /// Preconditioner the solve ran with.
    pub pc_type: PcType,
    pub timings: Timings,
}

impl CgResult {
    /// `normr / normr0`, or 0 if the initial residual already vanished.
    pub fn scaled_residual(&self) -> f64 {
        if self.normr0 > 0.0 { self.normr / self.normr0 } else { 0.0 }
    }
}

/// Preconditioned conjugate gradient solver.
pub struct CgSolver<'a> {
    world: &'a dyn Comm,
    pc: PC<'a>,
    amat: Option<&'a SparseMatrix>,
    max_iters: usize,
    tolerance: f64,
}

impl<'a> CgSolver<'a> {
    /// Same as [`Hpcg::cg_create()`](crate::Hpcg::cg_create).
    pub fn create(world: &'a dyn Comm) -> Self {
        CgSolver { world, pc: PC::create(world), amat: None, max_iters: DEFAULT_MAX_ITERS, tolerance: 0.0 }
    }

    /// Sets the matrix of the linear system, which is also the matrix the
    /// preconditioner is built from.
    pub fn set_operators(&mut self, a_mat: &'a SparseMatrix) -> Result<()> {
        self.pc.set_operators(a_mat)?;
        self.amat = Some(a_mat);
        Ok(())
    }

    /// Sets the relative tolerance and the iteration cap.
    ///
    /// A solve has converged once `‖r‖ ≤ tolerance·‖r₀‖`. With a tolerance of zero
    /// every solve runs exactly `max_iters` iterations.
    pub fn set_tolerances(&mut self, tolerance: f64, max_iters: usize) {
        self.tolerance = tolerance;
        self.max_iters = max_iters;
    }

    /// Sets the iteration cap only.
    pub fn set_max_iters(&mut self, max_iters: usize) {
        self.max_iters = max_iters;
    }

    /// Returns `(tolerance, max_iters)`.
    pub fn get_tolerances(&self) -> (f64, usize) {
        (self.tolerance, self.max_iters)
    }

    /// Selects the preconditioner. Same as `cg.get_pc_mut().set_type(pc_type)`.
    pub fn set_pc_type(&mut self, pc_type: PcType) {
        self.pc.set_type(pc_type);
    }

    /// Returns a reference to the preconditioner context.
    pub fn get_pc(&self) -> &PC<'a> {
        &self.pc
    }

    /// Returns a mutable reference to the preconditioner context.
    pub fn get_pc_mut(&mut self) -> &mut PC<'a> {
        &mut self.pc
    }

    /// Solves `A x = b` starting from the current `x`.
    ///
    /// `x` must have room for the matrix's halo, as left by
    /// [`optimize_problem`](crate::optimize::optimize_problem).
    pub fn solve(&self, b: &Vector, x: &mut Vector) -> Result<CgResult> {
        let a = self.amat.ok_or_else(|| HpcgError::new(HpcgErrorKind::Configuration,
            "solve called before an operator was set"))?;
        a.check_output("b", b)?;
        a.check_input("x", x)?;

        let start = Instant::now();
        let mut t = Timings::default();
        let n = a.local_rows();
        let h = a.halo_len();
        let mut r = Vector::new(n);
        let mut z = Vector::with_halo(n, h);
        let mut p = Vector::with_halo(n, h);
        let mut ap = Vector::new(n);

        // r = b - Ax
        timed!(t.spmv, a.mult(self.world, x, &mut ap))?;
        timed!(t.waxpby, r.waxpby(1.0, b, -1.0, &ap))?;
        let normr0 = self.norm(&r, &mut t)?;
        let mut normr = normr0;
        let mut history = vec![normr0];
        let mut iterations = 0;
        let mut status = CgStatus::Init;
        log::debug!("CG: {:?}, residual {:e}", status, normr0);

        if self.tolerance > 0.0 && normr0 <= self.tolerance {
            status = CgStatus::Converged;
        } else {
            status = CgStatus::Iterating;
            let mut rtz = 0.0;
            for k in 1..=self.max_iters {
                timed!(t.precond, self.pc.apply(&r, &mut z))?;

                let old_rtz = rtz;
                rtz = self.dot(&r, &z, &mut t)?;
                if k == 1 {
                    timed!(t.waxpby, p.copy_from(&z))?;
                } else {
                    let beta = if old_rtz == 0.0 { 0.0 } else { rtz / old_rtz };
                    timed!(t.waxpby, p.axpby(1.0, &z, beta))?;
                }

                timed!(t.spmv, a.mult(self.world, &mut p, &mut ap))?;
                let pap = self.dot(&p, &ap, &mut t)?;
                let alpha = if pap == 0.0 { 0.0 } else { rtz / pap };
                timed!(t.waxpby, x.axpby(alpha, &p, 1.0))?;
                timed!(t.waxpby, r.axpby(-alpha, &ap, 1.0))?;

                normr = self.norm(&r, &mut t)?;
                history.push(normr);
                iterations = k;
                log::trace!("CG: iteration {} residual {:e}", k, normr);

                if self.tolerance > 0.0 && normr <= self.tolerance * normr0 {
                    status = CgStatus::Converged;
                    break;
                }
            }
            if status == CgStatus::Iterating {
                status = CgStatus::MaxIterExceeded;
                if self.tolerance > 0.0 {
                    log::warn!("CG: no convergence to {:e} within {} iterations (residual {:e})",
                        self.tolerance, self.max_iters, normr);
                }
            }
        }

        t.total = start.elapsed().as_secs_f64();
        t.settle_overhead();
        log::debug!("CG: {:?} after {} iterations, residual {:e}", status, iterations, normr);

        Ok(CgResult { status, iterations, normr0, normr, residual_history: history,
            pc_type: self.pc.get_type(), timings: t })
    }

    fn dot(&self, u: &Vector, v: &Vector, t: &mut Timings) -> Result<f64> {
        let local = timed!(t.dot, u.dot_local(v))?;
        timed!(t.reduce, self.world.all_reduce_sum(local))
    }

    fn norm(&self, r: &Vector, t: &mut Timings) -> Result<f64> {
        Ok(self.dot(r, r, t)?.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    fn setup(n: usize) -> Problem {
        let geom = Geometry::new(1, 0, n, n, n).unwrap();
        let mut problem = Problem::generate(&geom).unwrap();
        optimize_problem(&geom, &mut problem).unwrap();
        problem
    }

    #[test]
    fn converges_with_tolerance() {
        let mut problem = setup(4);
        let mut cg = CgSolver::create(&SerialComm);
        cg.set_operators(&problem.a).unwrap();
        cg.set_tolerances(1.0e-10, 50);
        let res = cg.solve(&problem.b, &mut problem.x).unwrap();
        assert_eq!(res.status, CgStatus::Converged);
        assert!(res.iterations <= 50);
        assert!(res.scaled_residual() <= 1.0e-10);
        assert_eq!(res.residual_history.len(), res.iterations + 1);
        assert!(compute_residual(&problem.x, &problem.xexact).unwrap() < 1.0e-8);
    }

    #[test]
    fn converged_at_init_when_already_solved() {
        let mut problem = setup(2);
        problem.x.as_mut_slice().copy_from_slice(problem.xexact.as_slice());
        let mut cg = CgSolver::create(&SerialComm);
        cg.set_operators(&problem.a).unwrap();
        cg.set_tolerances(1.0e-12, 10);
        let res = cg.solve(&problem.b, &mut problem.x).unwrap();
        assert_eq!(res.status, CgStatus::Converged);
        assert_eq!(res.iterations, 0);
        assert_eq!(res.normr0, 0.0);
    }

    #[test]
    fn zero_residual_with_zero_tolerance_stays_finite() {
        let mut problem = setup(2);
        problem.x.as_mut_slice().copy_from_slice(problem.xexact.as_slice());
        let mut cg = CgSolver::create(&SerialComm);
        cg.set_operators(&problem.a).unwrap();
        cg.set_tolerances(0.0, 3);
        let res = cg.solve(&problem.b, &mut problem.x).unwrap();
        assert_eq!(res.status, CgStatus::MaxIterExceeded);
        assert_eq!(res.iterations, 3);
        assert!(problem.x.as_slice().iter().all(|v| v.is_finite()));
        assert_eq!(res.normr, 0.0);
    }

    #[test]
    fn unpreconditioned_solve_also_converges() {
        let mut problem = setup(3);
        let mut cg = CgSolver::create(&SerialComm);
        cg.set_pc_type(PcType::None);
        cg.set_operators(&problem.a).unwrap();
        cg.set_tolerances(1.0e-8, 200);
        let res = cg.solve(&problem.b, &mut problem.x).unwrap();
        assert_eq!(res.status, CgStatus::Converged);
        assert_eq!(res.pc_type, PcType::None);
    }

    #[test]
    fn mismatched_vectors_are_rejected() {
        let problem = setup(2);
        let mut cg = CgSolver::create(&SerialComm);
        cg.set_operators(&problem.a).unwrap();
        let b = Vector::new(5);
        let mut x = Vector::new(8);
        let err = cg.solve(&b, &mut x).unwrap_err();
        assert_eq!(err.kind(), HpcgErrorKind::DimensionMismatch);
        assert!(err.is_fatal());
    }

    #[test]
    fn solve_without_operator_fails() {
        let cg = CgSolver::create(&SerialComm);
        let b = Vector::new(1);
        let mut x = Vector::new(1);
        assert_eq!(cg.solve(&b, &mut x).unwrap_err().kind(), HpcgErrorKind::Configuration);
    }

    #[test]
    fn timings_are_populated() {
        let mut problem = setup(3);
        let mut cg = CgSolver::create(&SerialComm);
        cg.set_operators(&problem.a).unwrap();
        cg.set_tolerances(0.0, 5);
        let res = cg.solve(&problem.b, &mut problem.x).unwrap();
        let t = res.timings;
        assert!(t.total > 0.0);
        assert!(t.total + 1e-12 >= t.dot + t.waxpby + t.spmv + t.reduce + t.precond);
        assert_eq!(t.optimize, 0.0);
    }

    #[test]
    fn settings_are_kept() {
        let problem = setup(2);
        let hpcg = Hpcg::init_no_args().unwrap();
        let mut cg = hpcg.cg_create();
        assert_eq!(cg.get_tolerances(), (0.0, crate::cg::DEFAULT_MAX_ITERS));
        cg.set_tolerances(1.0e-6, 20);
        cg.set_max_iters(7);
        assert_eq!(cg.get_tolerances(), (1.0e-6, 7));

        cg.set_pc_type(PcType::None);
        cg.set_operators(&problem.a).unwrap();
        let pc = cg.get_pc();
        assert_eq!(pc.get_type(), PcType::None);
        assert!(std::ptr::eq(pc.try_get_operators().unwrap(), &problem.a));
    }
}
