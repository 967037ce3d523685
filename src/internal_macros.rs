//! Macros for internal use.
//!
//! These are for things that shouldn't be exposed to crate users.

#![macro_use]

/// Runs an expression and adds its wall-clock time, in seconds, to a `f64` slot.
///
/// The value of the expression is returned unchanged, so `?` can be applied outside:
///
/// ```ignore
/// timed!(timings.spmv, a.mult(world, &mut p, &mut ap))?;
/// ```
macro_rules! timed {
    ($slot:expr, $body:expr) => {{
        let __start = ::std::time::Instant::now();
        let __out = $body;
        $slot += __start.elapsed().as_secs_f64();
        __out
    }};
}

/// Internal macro used to define the per-phase timing record.
///
/// Each line names a phase field and its doc string. Fields are listed in the order of
/// the flat timing array handed to reporting. The macro generates the struct, `as_array`,
/// `PHASE_NAMES`, and `AddAssign` so repeated solves can be accumulated.
///
/// ```ignore
/// define_timing_phases! {
///     total, "Total time spent in CG.";
/// //    ^      ^
/// //  field    └─ doc string
/// }
/// ```
macro_rules! define_timing_phases {
    {$(
        $field:ident, $doc:literal;
    )*} => {
        /// Wall-clock seconds spent in each phase of the benchmark.
        #[derive(Debug, Clone, Copy, Default, PartialEq, ::serde::Serialize)]
        pub struct Timings {
        $(
            #[doc = $doc]
            pub $field: f64,
        )*
        }

        impl Timings {
            /// Phase names, in the same order as [`Timings::as_array`].
            pub const PHASE_NAMES: [&'static str; NUM_PHASES] = [$( stringify!($field), )*];

            /// The flat timing array handed to reporting.
            pub fn as_array(&self) -> [f64; NUM_PHASES] {
                [$( self.$field, )*]
            }

            /// Inverse of [`Timings::as_array`].
            pub fn from_array(array: [f64; NUM_PHASES]) -> Self {
                let [$( $field, )*] = array;
                Timings { $( $field, )* }
            }
        }

        impl ::std::ops::AddAssign for Timings {
            fn add_assign(&mut self, other: Self) {
                $( self.$field += other.$field; )*
            }
        }
    };
}
