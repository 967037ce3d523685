//! The preconditioner used by the [CG solver](crate::cg).
//!
//! Users can choose the preconditioner directly with [`PC::set_type()`], or first
//! extract the PC context from the solver with
//! [`CgSolver::get_pc_mut()`](crate::cg::CgSolver::get_pc_mut()).

use serde::Serialize;

use crate::comm::Comm;
use crate::mat::SparseMatrix;
use crate::vector::Vector;
use crate::{HpcgError, HpcgErrorKind, Result};

/// [`PC`] Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PcType {
    /// `z = r`.
    None,
    /// One symmetric Gauss-Seidel sweep, see [`symgs`].
    SymGs,
}

impl Default for PcType {
    fn default() -> Self {
        PcType::SymGs
    }
}

/// Preconditioner context: applies `z = M⁻¹r` for the operator set with
/// [`PC::set_operators()`].
pub struct PC<'a> {
    world: &'a dyn Comm,
    pc_type: PcType,
    amat: Option<&'a SparseMatrix>,
}

impl<'a> PC<'a> {
    /// Creates a preconditioner context.
    ///
    /// You will most likely get a preconditioner context from a
    /// [`CgSolver`](crate::cg::CgSolver) with
    /// [`CgSolver::get_pc_mut()`](crate::cg::CgSolver::get_pc_mut()).
    pub fn create(world: &'a dyn Comm) -> Self {
        PC { world, pc_type: PcType::default(), amat: None }
    }

    /// Builds [`PC`] for a particular preconditioner type.
    pub fn set_type(&mut self, pc_type: PcType) {
        self.pc_type = pc_type;
    }

    /// The preconditioner type.
    pub fn get_type(&self) -> PcType {
        self.pc_type
    }

    /// Sets the matrix the preconditioner is built from.
    pub fn set_operators(&mut self, a_mat: &'a SparseMatrix) -> Result<()> {
        if self.pc_type == PcType::SymGs {
            a_mat.check_ready()?;
        }
        self.amat = Some(a_mat);
        Ok(())
    }

    /// The matrix set with [`PC::set_operators()`], if any.
    pub fn try_get_operators(&self) -> Option<&'a SparseMatrix> {
        self.amat
    }

    /// Applies the preconditioner to a vector.
    ///
    /// `z` must have room for the matrix's halo.
    pub fn apply(&self, r: &Vector, z: &mut Vector) -> Result<()> {
        match self.pc_type {
            PcType::None => z.copy_from(r),
            PcType::SymGs => {
                let a = self.amat.ok_or_else(|| HpcgError::new(HpcgErrorKind::Configuration,
                    "preconditioner applied before an operator was set"))?;
                symgs(self.world, a, r, z)
            },
        }
    }
}

/// One symmetric Gauss-Seidel sweep on `A z = r`, starting from `z = 0`.
///
/// The halo of `z` is refreshed, then rows are relaxed color by color, `0..8`, each
/// color in row order. After a second halo refresh the sweep runs backwards: colors
/// in reverse order, rows within a color in reverse. Relaxing row `i` sets
///
/// `z_i = (r_i − Σ_{j≠i} a_ij z_j) / a_ii`.
///
/// Rows of one color never couple, so the result doesn't depend on the order within
/// a color.
pub fn symgs(world: &dyn Comm, a: &SparseMatrix, r: &Vector, z: &mut Vector) -> Result<()> {
    a.check_ready()?;
    a.check_output("r", r)?;
    a.check_input("z", z)?;

    let rhs = r.as_slice();
    z.set_all(0.0);

    refresh_halo(world, a, z)?;
    for color in 0..a.num_colors() {
        for row in a.color_range(color) {
            relax(a, rhs, z.full_mut(), row);
        }
    }

    refresh_halo(world, a, z)?;
    for color in (0..a.num_colors()).rev() {
        for row in a.color_range(color).rev() {
            relax(a, rhs, z.full_mut(), row);
        }
    }
    Ok(())
}

fn refresh_halo(world: &dyn Comm, a: &SparseMatrix, z: &mut Vector) -> Result<()> {
    let (owned, halo) = z.split_mut();
    world.exchange_halo(a.pattern(), owned, &mut halo[..a.halo_len()], &mut || ())
}

#[inline]
fn relax(a: &SparseMatrix, rhs: &[f64], z: &mut [f64], row: usize) {
    let diag = a.diag[row];
    let mut sum = rhs[row];
    for k in a.row_ptr[row]..a.row_ptr[row + 1] {
        if k != diag {
            sum -= a.values[k] * z[a.cols[k]];
        }
    }
    z[row] = sum / a.values[diag];
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use approx::assert_relative_eq;

    fn problem(n: usize) -> (Geometry, Problem) {
        let geom = Geometry::new(1, 0, n, n, n).unwrap();
        let mut problem = Problem::generate(&geom).unwrap();
        optimize_problem(&geom, &mut problem).unwrap();
        (geom, problem)
    }

    #[test]
    fn identity_copies() {
        let (_, problem) = problem(2);
        let mut pc = PC::create(&SerialComm);
        pc.set_type(PcType::None);
        pc.set_operators(&problem.a).unwrap();
        let mut z = Vector::new(8);
        pc.apply(&problem.b, &mut z).unwrap();
        assert_eq!(z.as_slice(), problem.b.as_slice());
    }

    #[test]
    fn symgs_reduces_the_error() {
        let (_, problem) = problem(4);
        let a = &problem.a;
        let mut z = Vector::new(64);
        pc::symgs(&SerialComm, a, &problem.b, &mut z).unwrap();

        // one sweep from zero gets much closer to the all-ones solution
        let err = z.as_slice().iter().map(|v| (v - 1.0).abs()).fold(0.0, f64::max);
        assert!(err < 1.0);

        let mut az = Vector::new(64);
        a.mult_local(&z, &mut az).unwrap();
        let res = az.as_slice().iter().zip(problem.b.as_slice()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt();
        let res0 = problem.b.norm(&SerialComm).unwrap();
        assert!(res < res0);
    }

    #[test]
    fn symgs_of_diagonal_row() {
        // on a 1x1x1 grid the matrix is just [26]
        let (_, problem) = problem(1);
        let mut z = Vector::new(1);
        let r = Vector::from_values(vec![13.0]);
        pc::symgs(&SerialComm, &problem.a, &r, &mut z).unwrap();
        assert_relative_eq!(z[0], 0.5);
    }

    #[test]
    fn missing_operator_is_an_error() {
        let pc = PC::create(&SerialComm);
        let r = Vector::new(2);
        let mut z = Vector::new(2);
        assert_eq!(pc.apply(&r, &mut z).unwrap_err().kind(), HpcgErrorKind::Configuration);
    }

    #[test]
    fn operators_are_kept_by_reference() {
        let hpcg = Hpcg::init_no_args().unwrap();
        let (_, problem) = problem(2);
        let mut pc = hpcg.pc_create();
        assert_eq!(pc.get_type(), PcType::SymGs);
        assert!(pc.try_get_operators().is_none());
        pc.set_operators(&problem.a).unwrap();
        assert!(std::ptr::eq(pc.try_get_operators().unwrap(), &problem.a));

        let mut z = Vector::new(8);
        pc.apply(&problem.b, &mut z).unwrap();
        let mut expected = Vector::new(8);
        crate::preconditioner::symgs(hpcg.world(), &problem.a, &problem.b, &mut expected).unwrap();
        assert_eq!(z.as_slice(), expected.as_slice());
    }
}
