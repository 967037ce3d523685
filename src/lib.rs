//! A distributed conjugate gradient benchmark kernel.
//!
//! The crate generates a synthetic 3-D 27-point stencil system partitioned across a
//! Cartesian grid of cooperating ranks, reorders it for communication and multicolor
//! smoothing, and solves it repeatedly with a preconditioned conjugate gradient
//! iteration while timing each phase.
//!
//! The pieces, leaves first:
//! [`Geometry`](crate::geometry::Geometry) →
//! [`Problem::generate`](crate::problem::Problem::generate) →
//! [`optimize_problem`](crate::optimize::optimize_problem) →
//! [`CgSolver`](crate::cg::CgSolver) (which calls [`SparseMatrix::mult`](crate::mat::SparseMatrix::mult)
//! and the [symmetric Gauss-Seidel preconditioner](crate::pc)).
//!
//! ```
//! # use hpcg_rs::prelude::*;
//! let hpcg = Hpcg::init_no_args().unwrap();
//! let geom = Geometry::new(hpcg.size(), hpcg.rank(), 4, 4, 4).unwrap();
//! let mut problem = Problem::generate(&geom).unwrap();
//! optimize_problem(&geom, &mut problem).unwrap();
//!
//! let mut cg = hpcg.cg_create();
//! cg.set_operators(&problem.a).unwrap();
//! cg.set_tolerances(1.0e-8, 100);
//! let res = cg.solve(&problem.b, &mut problem.x).unwrap();
//! assert_eq!(res.status, CgStatus::Converged);
//! ```

use std::fmt;

#[macro_use]
mod internal_macros;

pub mod comm;
pub mod geometry;
pub mod vector;
pub mod halo;
pub mod mat;
pub mod problem;
pub mod optimize;
mod preconditioner;
pub mod pc { pub use crate::preconditioner::*; }
pub mod cg;
pub mod residual;
pub mod timing;
pub mod report;
pub mod dump;
pub mod bench;

pub mod prelude {
    pub use crate::{
        Hpcg,
        HpcgBuilder,
        HpcgError,
        HpcgErrorKind,
        CommKind,
        GlobalInt,
        hpcg_println,
        comm::{self, Comm, SerialComm, ThreadComm, },
        geometry::{self, Geometry, },
        vector::{self, Vector, },
        halo::{HaloPattern, Neighbor, },
        mat::{self, SparseMatrix, },
        problem::{self, Problem, },
        optimize::{optimize_problem, optimize_matrix, },
        pc::{self, PC, PcType, },
        cg::{self, CgSolver, CgResult, CgStatus, },
        residual::compute_residual,
        timing::Timings,
        report::BenchmarkReport,
        bench::{BenchParams, BenchOutcome, run_benchmark, },
    };
    pub(crate) use crate::Result;
}

use prelude::*;

/// Global row/column index type. Local indices are `usize`.
pub type GlobalInt = u64;

/// Prints to standard out, only from rank 0 of the communicator.
/// Calls from other ranks are ignored.
#[macro_export]
macro_rules! hpcg_println {
    ($hpcg:ident) => ($hpcg.print("\n")?);
    ($hpcg:ident, $($arg:tt)*) => ({
        $hpcg.print(format_args!($($arg)*))?;
        $hpcg.print("\n")?;
    })
}

/// hpcg-rs result
pub type Result<T> = std::result::Result<T, HpcgError>;

/// The class of an [`HpcgError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpcgErrorKind {
    /// Invalid process grid, bad local dimensions, unsupported communicator.
    Configuration,
    /// Bad command line.
    Usage,
    /// A defect in problem generation or optimization, e.g. a halo reference
    /// that no neighbor owns.
    InvariantViolation,
    /// Vector lengths that disagree with the matrix.
    DimensionMismatch,
    /// A rank went away or sent something unexpected.
    Communication,
    /// Reading or writing a dump or report failed.
    Io,
}

impl fmt::Display for HpcgErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HpcgErrorKind::Configuration => "configuration error",
            HpcgErrorKind::Usage => "usage error",
            HpcgErrorKind::InvariantViolation => "invariant violation",
            HpcgErrorKind::DimensionMismatch => "dimension mismatch",
            HpcgErrorKind::Communication => "communication error",
            HpcgErrorKind::Io => "i/o error",
        };
        f.write_str(s)
    }
}

/// hpcg-rs Error.
/// Can created with [`Hpcg::set_error`] or [`HpcgError::new`].
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {error}")]
pub struct HpcgError {
    pub(crate) kind: HpcgErrorKind,
    pub(crate) error: Box<dyn std::error::Error + Send + Sync>,
}

impl HpcgError {
    pub fn new<E>(kind: HpcgErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>
    {
        HpcgError { kind, error: error.into() }
    }

    /// The class of this error.
    pub fn kind(&self) -> HpcgErrorKind {
        self.kind
    }

    /// Configuration errors and invariant violations are not recoverable; the
    /// benchmark terminates on them.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, HpcgErrorKind::Configuration | HpcgErrorKind::Usage
            | HpcgErrorKind::InvariantViolation | HpcgErrorKind::DimensionMismatch)
    }
}

impl From<std::io::Error> for HpcgError {
    fn from(e: std::io::Error) -> Self {
        HpcgError::new(HpcgErrorKind::Io, e)
    }
}

/// Which communication layer an [`Hpcg`] context runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommKind {
    /// One process, halo exchange is a no-op.
    Serial,
    /// `MPI_COMM_WORLD`. Only available when built with the `mpi` feature.
    Mpi,
}

impl Default for CommKind {
    fn default() -> Self {
        CommKind::Serial
    }
}

/// Allows you to build an [`Hpcg`] context with optional parameters.
/// Must call [`HpcgBuilder::init`] to get [`Hpcg`].
///
/// ```
/// # use hpcg_rs::prelude::*;
/// let hpcg = Hpcg::builder()
///     .comm(CommKind::Serial)
///     .init().unwrap();
/// assert_eq!(hpcg.size(), 1);
/// ```
#[derive(Default)]
pub struct HpcgBuilder {
    comm: Option<CommKind>,
}

impl HpcgBuilder {
    /// Selects the communication layer. Defaults to [`CommKind::Serial`].
    pub fn comm(mut self, kind: CommKind) -> Self {
        self.comm = Some(kind);
        self
    }

    /// Brings up the communication layer. For [`CommKind::Mpi`] this initializes MPI,
    /// which is finalized again when the returned [`Hpcg`] is dropped.
    pub fn init(self) -> Result<Hpcg> {
        match self.comm.unwrap_or_default() {
            CommKind::Serial => Ok(Hpcg::from_comm(SerialComm)),
            #[cfg(feature = "mpi")]
            CommKind::Mpi => Ok(Hpcg::from_comm(comm::MpiComm::new()?)),
            #[cfg(not(feature = "mpi"))]
            CommKind::Mpi => Err(HpcgError::new(HpcgErrorKind::Configuration,
                "hpcg-rs was built without the `mpi` feature")),
        }
    }
}

/// An `Hpcg` owns the communication layer for one rank. Solver objects borrow it.
pub struct Hpcg {
    pub(crate) world: Box<dyn Comm>,
}

impl Hpcg {
    /// Creates an [`HpcgBuilder`] which allows you to specify the communication layer.
    pub fn builder() -> HpcgBuilder {
        HpcgBuilder::default()
    }

    /// Single process context.
    ///
    /// ```
    /// let hpcg = hpcg_rs::Hpcg::init_no_args().unwrap();
    /// assert_eq!(hpcg.rank(), 0);
    /// ```
    pub fn init_no_args() -> Result<Self> {
        Hpcg::builder().init()
    }

    /// Wraps an existing communicator, e.g. one rank of a [`ThreadComm::world`].
    pub fn from_comm<C: Comm + 'static>(comm: C) -> Self {
        log::debug!("rank {} of {} up on {} communicator", comm.rank(), comm.size(), comm.name());
        Hpcg { world: Box::new(comm) }
    }

    /// Runs `f` on `size` in-process ranks, one thread per rank, and returns the
    /// per-rank results in rank order.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let sums = Hpcg::run_threaded(3, |hpcg| {
    ///     hpcg.world().all_reduce_sum(hpcg.rank() as f64).unwrap()
    /// }).unwrap();
    /// assert_eq!(sums, vec![3.0, 3.0, 3.0]);
    /// ```
    pub fn run_threaded<F, R>(size: usize, f: F) -> Result<Vec<R>>
    where
        F: Fn(Hpcg) -> R + Sync,
        R: Send,
    {
        if size == 0 {
            return Err(HpcgError::new(HpcgErrorKind::Configuration, "cannot run on zero ranks"));
        }
        let comms = ThreadComm::world(size);
        let f = &f;
        let joined = crossbeam::thread::scope(|s| {
            let handles = comms.into_iter()
                .map(|comm| s.spawn(move |_| f(Hpcg::from_comm(comm))))
                .collect::<Vec<_>>();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        }).map_err(|_| HpcgError::new(HpcgErrorKind::Communication, "rank thread scope panicked"))?;

        joined.into_iter().enumerate()
            .map(|(rank, res)| res.map_err(|_| HpcgError::new(HpcgErrorKind::Communication,
                format!("rank {} panicked", rank))))
            .collect()
    }

    /// The communication layer of this rank.
    pub fn world(&self) -> &dyn Comm {
        &*self.world
    }

    /// This rank, in `0..size`.
    pub fn rank(&self) -> usize {
        self.world.rank()
    }

    /// Number of cooperating ranks.
    pub fn size(&self) -> usize {
        self.world.size()
    }

    /// Function to call when an error has been detected.
    /// Logs the error and will always return an `Err`.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let hpcg = Hpcg::init_no_args().unwrap();
    /// let err = hpcg.set_error(HpcgErrorKind::Configuration, "bad grid").unwrap_err();
    /// assert_eq!(err.kind(), HpcgErrorKind::Configuration);
    /// ```
    pub fn set_error<E>(&self, error_kind: HpcgErrorKind, err_msg: E) -> Result<()>
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>
    {
        let error = HpcgError::new(error_kind, err_msg);
        log::error!("[rank {}] {}", self.rank(), error);
        Err(error)
    }

    /// Prints to standard out, only from rank 0. You can also use the [`hpcg_println`] macro
    /// to have string formatting.
    #[doc(hidden)]
    pub fn print<T: fmt::Display>(&self, msg: T) -> Result<()> {
        use std::io::Write;
        if self.rank() == 0 {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write!(lock, "{}", msg)?;
            lock.flush()?;
        }
        Ok(())
    }

    /// Creates a conjugate gradient solver on this context.
    pub fn cg_create(&self) -> CgSolver<'_> {
        CgSolver::create(self.world())
    }

    /// Creates a preconditioner context on this context.
    pub fn pc_create(&self) -> PC<'_> {
        PC::create(self.world())
    }

    /// Largest absolute difference between `x` and `xexact` over all ranks.
    pub fn global_residual(&self, x: &Vector, xexact: &Vector) -> Result<f64> {
        let local = compute_residual(x, xexact)?;
        self.world.all_reduce_max(local)
    }
}
