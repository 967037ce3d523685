//! Distance between a computed and the exact solution.

use crate::vector::Vector;
use crate::{HpcgError, HpcgErrorKind, Result};

/// Largest absolute difference `max_i |x_i − xexact_i|` over the owned entries of
/// this rank. Use [`Hpcg::global_residual`](crate::Hpcg::global_residual) for the
/// maximum over all ranks.
///
/// ```
/// # use hpcg_rs::prelude::*;
/// let x = Vector::from_values(vec![1.0, 0.75, 1.25]);
/// let xexact = Vector::from_values(vec![1.0; 3]);
/// assert_eq!(compute_residual(&x, &xexact).unwrap(), 0.25);
/// ```
pub fn compute_residual(x: &Vector, xexact: &Vector) -> Result<f64> {
    if x.local_len() != xexact.local_len() {
        return Err(HpcgError::new(HpcgErrorKind::DimensionMismatch,
            format!("solution has {} entries, exact solution {}", x.local_len(), xexact.local_len())));
    }
    Ok(x.as_slice().iter().zip(xexact.as_slice())
        .map(|(x, e)| (x - e).abs())
        .fold(0.0, f64::max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_mismatched() {
        assert_eq!(compute_residual(&Vector::new(0), &Vector::new(0)).unwrap(), 0.0);
        let err = compute_residual(&Vector::new(2), &Vector::new(3)).unwrap_err();
        assert_eq!(err.kind(), HpcgErrorKind::DimensionMismatch);
    }

    #[test]
    fn halo_is_ignored() {
        let mut x = Vector::with_halo(2, 1);
        x[2] = 100.0;
        let xexact = Vector::new(2);
        assert_eq!(compute_residual(&x, &xexact).unwrap(), 0.0);
    }
}
