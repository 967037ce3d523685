//! Phase timings of a benchmark run.
//!
//! A [`CgResult`](crate::cg::CgResult) carries the timings of one solve by value; a
//! run over several solves sums them with `+=`.

/// Number of slots in the flat timing array.
pub const NUM_PHASES: usize = 8;

define_timing_phases! {
    total, "Total time spent in CG.";
    dot, "Local part of dot products and norms.";
    waxpby, "Vector updates.";
    spmv, "Sparse matrix-vector products, including the overlapped halo exchange.";
    reduce, "Global reductions for dot products and norms.";
    precond, "Preconditioner applications, including their halo refreshes.";
    overhead, "Time in CG not attributed to any other phase.";
    optimize, "Matrix reordering and communication pattern setup.";
}

impl Timings {
    /// Sets `overhead` to whatever part of `total` the other CG phases don't explain.
    pub(crate) fn settle_overhead(&mut self) {
        let accounted = self.dot + self.waxpby + self.spmv + self.reduce + self.precond;
        self.overhead = (self.total - accounted).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_follows_declaration_order() {
        let t = Timings { total: 1.0, dot: 2.0, waxpby: 3.0, spmv: 4.0, reduce: 5.0,
            precond: 6.0, overhead: 7.0, optimize: 8.0 };
        assert_eq!(t.as_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(Timings::PHASE_NAMES[3], "spmv");
        assert_eq!(Timings::PHASE_NAMES[7], "optimize");
    }

    #[test]
    fn accumulates_and_settles_overhead() {
        let mut t = Timings { total: 1.0, dot: 0.25, spmv: 0.25, ..Default::default() };
        t += Timings { total: 1.0, precond: 0.5, ..Default::default() };
        t.settle_overhead();
        assert_eq!(t.total, 2.0);
        assert_eq!(t.overhead, 1.0);
    }
}
