//! Integration tests for the distributed kernels on in-process thread ranks.

mod helpers;

use approx::assert_relative_eq;
use hpcg_rs::prelude::*;

use helpers::{l2_diff, optimized, threaded_cg};

#[test]
fn spmv_reproduces_rhs_on_any_rank_count() {
    for &size in &[1, 2, 4, 8] {
        let diffs = Hpcg::run_threaded(size, |hpcg| {
            let (_, problem) = optimized(hpcg.size(), hpcg.rank(), (3, 4, 2));
            let a = &problem.a;
            let mut x = Vector::with_halo(a.local_rows(), a.halo_len());
            x.as_mut_slice().copy_from_slice(problem.xexact.as_slice());
            let mut y = Vector::new(a.local_rows());
            a.mult(hpcg.world(), &mut x, &mut y).unwrap();
            // every halo slot was filled from xexact
            assert!(x.halo().iter().all(|&v| v == 1.0));
            l2_diff(y.as_slice(), problem.b.as_slice())
        }).unwrap();
        assert!(diffs.iter().all(|&d| d == 0.0), "{} ranks: {:?}", size, diffs);
    }
}

#[test]
fn spmv_matches_a_single_rank_product() {
    // 2x1x1 ranks of 2x2x2 against one rank of 4x2x2: same global system, different numbering
    let (serial_geom, serial) = optimized(1, 0, (4, 2, 2));
    let mut x_serial = Vector::new(16);
    for (row, &g) in serial.a.local_to_global().iter().enumerate() {
        let (gx, gy, gz) = serial_geom.global_coords(g);
        x_serial[row] = (gx + 10 * gy + 100 * gz) as f64;
    }
    let mut y_serial = Vector::new(16);
    serial.a.mult(&SerialComm, &mut x_serial, &mut y_serial).unwrap();
    let by_coords = serial.a.local_to_global().iter().enumerate()
        .map(|(row, &g)| (serial_geom.global_coords(g), y_serial[row]))
        .collect::<std::collections::HashMap<_, _>>();

    let per_rank = Hpcg::run_threaded(2, |hpcg| {
        let (geom, problem) = optimized(2, hpcg.rank(), (2, 2, 2));
        let a = &problem.a;
        let mut x = Vector::with_halo(8, a.halo_len());
        for (row, &g) in a.local_to_global().iter().enumerate() {
            let (gx, gy, gz) = geom.global_coords(g);
            x[row] = (gx + 10 * gy + 100 * gz) as f64;
        }
        let mut y = Vector::new(8);
        a.mult(hpcg.world(), &mut x, &mut y).unwrap();
        a.local_to_global().iter().enumerate()
            .map(|(row, &g)| (geom.global_coords(g), y[row]))
            .collect::<Vec<_>>()
    }).unwrap();

    for (coords, value) in per_rank.into_iter().flatten() {
        assert_eq!(by_coords[&coords], value);
    }
}

#[test]
fn zero_tolerance_runs_exactly_max_iters() {
    for &k in &[1, 5, 13] {
        for res in threaded_cg(4, (3, 3, 3), 0.0, k, PcType::SymGs) {
            assert_eq!(res.iterations, k);
            assert_eq!(res.status, CgStatus::MaxIterExceeded);
            assert_eq!(res.residual_history.len(), k + 1);
        }
    }
}

#[test]
fn nonzero_tolerance_converges_within_the_cap() {
    let results = threaded_cg(8, (4, 4, 4), 1.0e-9, 50, PcType::SymGs);
    for res in &results {
        assert_eq!(res.status, CgStatus::Converged);
        assert!(res.iterations <= 50);
        assert!(res.normr <= 1.0e-9 * res.normr0);
        let before = res.residual_history[res.iterations - 1];
        assert!(before > 1.0e-9 * res.normr0);
    }
    // every rank sees the same global quantities
    assert!(results.windows(2).all(|w| w[0].residual_history == w[1].residual_history));
}

#[test]
fn tight_cap_is_reported_not_failed() {
    for res in threaded_cg(2, (4, 4, 4), 1.0e-14, 2, PcType::SymGs) {
        assert_eq!(res.status, CgStatus::MaxIterExceeded);
        assert_eq!(res.iterations, 2);
    }
}

#[test]
fn repeated_solves_after_reset_are_identical() {
    let histories = Hpcg::run_threaded(4, |hpcg| {
        let (_, mut problem) = optimized(hpcg.size(), hpcg.rank(), (3, 2, 4));
        let mut cg = hpcg.cg_create();
        cg.set_operators(&problem.a).unwrap();
        cg.set_tolerances(0.0, 12);
        let mut histories = vec![];
        for _ in 0..3 {
            problem.x.set_all(0.0);
            histories.push(cg.solve(&problem.b, &mut problem.x).unwrap().residual_history);
        }
        histories
    }).unwrap();
    for per_rank in &histories {
        assert_eq!(per_rank[0], per_rank[1]);
        assert_eq!(per_rank[1], per_rank[2]);
    }
    assert_eq!(threaded_cg(4, (3, 2, 4), 0.0, 12, PcType::SymGs)[0].residual_history, histories[0][0]);
}

#[test]
fn one_thread_rank_matches_serial() {
    let threaded = threaded_cg(1, (4, 3, 2), 0.0, 10, PcType::SymGs).remove(0);

    let hpcg = Hpcg::init_no_args().unwrap();
    let (_, mut problem) = optimized(1, 0, (4, 3, 2));
    let mut cg = hpcg.cg_create();
    cg.set_operators(&problem.a).unwrap();
    cg.set_tolerances(0.0, 10);
    let serial = cg.solve(&problem.b, &mut problem.x).unwrap();
    assert_eq!(threaded.residual_history, serial.residual_history);
}

#[test]
fn unpreconditioned_cg_is_independent_of_the_partition() {
    // without a preconditioner CG is the same iteration on any partition of the system
    let distributed = threaded_cg(4, (2, 2, 3), 0.0, 8, PcType::None).remove(0);

    let hpcg = Hpcg::init_no_args().unwrap();
    let (_, mut problem) = optimized(1, 0, (4, 4, 3));
    let mut cg = hpcg.cg_create();
    cg.set_pc_type(PcType::None);
    cg.set_operators(&problem.a).unwrap();
    cg.set_tolerances(0.0, 8);
    let serial = cg.solve(&problem.b, &mut problem.x).unwrap();

    for (d, s) in distributed.residual_history.iter().zip(&serial.residual_history) {
        assert_relative_eq!(*d, *s, max_relative = 1.0e-9);
    }
}

#[test]
fn distributed_solution_error_is_reduced_globally() {
    let errors = Hpcg::run_threaded(4, |hpcg| {
        let (_, mut problem) = optimized(hpcg.size(), hpcg.rank(), (3, 3, 3));
        // spoil a single entry on the last rank
        if hpcg.rank() == 3 {
            problem.x.set_all(1.0);
            problem.x[0] = 1.5;
        } else {
            problem.x.set_all(1.0);
        }
        hpcg.global_residual(&problem.x, &problem.xexact).unwrap()
    }).unwrap();
    assert_eq!(errors, vec![0.5; 4]);
}

#[test]
fn benchmark_driver_runs_on_threads() {
    let outcomes = Hpcg::run_threaded(2, |hpcg| {
        let mut params = BenchParams::new(3, 3, 3);
        params.max_iters = 6;
        params.cg_calls = 2;
        run_benchmark(&hpcg, &params).unwrap()
    }).unwrap();
    for outcome in &outcomes {
        let report = &outcome.report;
        assert_eq!(report.ranks, 2);
        assert_eq!(report.global_rows, 54);
        assert_eq!(report.total_iterations, 12);
        assert_eq!(report.final_iterations, 6);
        assert_eq!(report.comm, "thread");
        assert!(report.solution_error.unwrap() > 0.0);
    }
    assert_eq!(outcomes[0].report.global_nnz, outcomes[1].report.global_nnz);
    assert_eq!(outcomes[0].report.timing_array, outcomes[1].report.timing_array);
}
