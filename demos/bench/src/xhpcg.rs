//! Concepts: CG^preconditioned, symmetric Gauss-Seidel
//! Concepts: 27-point stencil, 3d
//! Processors: n
//!
//! To run:
//! ```text
//! $ cargo build --bin xhpcg
//! $ target/debug/xhpcg 16 16 16
//! $ target/debug/xhpcg 16 16 16 --threads 8 --cg-calls 3
//! $ cargo build --bin xhpcg --features mpi
//! $ mpiexec -n 8 target/debug/xhpcg 32 32 32 --mpi --report report.json
//! ```

static HELP_MSG: &str = "Runs the distributed conjugate gradient benchmark.
nx, ny and nz are the dimensions of the sub-block owned by each rank.";

use std::path::PathBuf;

use hpcg_rs::prelude::*;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "xhpcg", about = HELP_MSG)]
struct Opt {
    /// local sub-block points in x
    nx: usize,

    /// local sub-block points in y
    ny: usize,

    /// local sub-block points in z
    nz: usize,

    /// iteration cap of each CG call
    #[structopt(long, default_value = "50")]
    max_iters: usize,

    /// relative residual reduction to stop at; 0 always runs max-iters iterations
    #[structopt(long, default_value = "0.0")]
    tolerance: f64,

    /// number of CG calls, each from a zero initial guess
    #[structopt(long, default_value = "1")]
    cg_calls: usize,

    /// preconditioner
    #[structopt(long, default_value = "symgs", possible_values = &["symgs", "none"])]
    pc: String,

    /// run this many ranks as threads of one process
    #[structopt(long, conflicts_with = "mpi")]
    threads: Option<usize>,

    /// run on MPI_COMM_WORLD (build with `--features mpi`)
    #[structopt(long)]
    mpi: bool,

    /// write the optimized problem of each rank into this directory
    #[structopt(long, parse(from_os_str))]
    dump: Option<PathBuf>,

    /// write the report as JSON to this file
    #[structopt(long, parse(from_os_str))]
    report: Option<PathBuf>,

    /// log setup details
    #[structopt(short, long)]
    verbose: bool,
}

impl Opt {
    fn params(&self) -> BenchParams {
        let mut params = BenchParams::new(self.nx, self.ny, self.nz);
        params.max_iters = self.max_iters;
        params.tolerance = self.tolerance;
        params.cg_calls = self.cg_calls;
        params.pc_type = if self.pc == "none" { PcType::None } else { PcType::SymGs };
        params.dump_dir = self.dump.clone();
        params
    }
}

fn write_report(report: &BenchmarkReport, path: Option<&PathBuf>) -> hpcg_rs::Result<()> {
    println!("{}", report);
    if let Some(path) = path {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| HpcgError::new(HpcgErrorKind::Io, e))?;
        std::fs::write(path, json)?;
        log::info!("report written to {}", path.display());
    }
    Ok(())
}

fn main() -> hpcg_rs::Result<()> {
    let opt = Opt::from_args();

    let level = if opt.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .map_err(|e| HpcgError::new(HpcgErrorKind::Configuration, e))?;

    let params = opt.params();
    params.validate()?;

    if let Some(threads) = opt.threads {
        let outcomes = Hpcg::run_threaded(threads, |hpcg| run_benchmark(&hpcg, &params))?
            .into_iter()
            .collect::<hpcg_rs::Result<Vec<_>>>()?;
        if let Some(outcome) = outcomes.first() {
            write_report(&outcome.report, opt.report.as_ref())?;
        }
    } else {
        let kind = if opt.mpi { CommKind::Mpi } else { CommKind::Serial };
        let hpcg = Hpcg::builder()
            .comm(kind)
            .init()?;

        let outcome = run_benchmark(&hpcg, &params)?;
        if hpcg.rank() == 0 {
            write_report(&outcome.report, opt.report.as_ref())?;
        }
    }

    // return
    Ok(())
}
