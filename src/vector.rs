//! Dense local vectors.
//!
//! A [`Vector`] holds this rank's owned entries followed by an optional halo section,
//! the slots that receive neighbor-owned values before a matrix-vector product or a
//! preconditioner sweep. Kernels in this module only ever touch the owned part;
//! the halo section is written exclusively by the halo exchange.

use std::ops::{Index, IndexMut};

use crate::{HpcgError, HpcgErrorKind, Result};
use crate::comm::Comm;

/// Local part of a distributed vector, with room for halo values.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    values: Vec<f64>,
    local_len: usize,
}

impl Vector {
    /// A zero vector with `local_len` owned entries and no halo section.
    pub fn new(local_len: usize) -> Self {
        Vector::with_halo(local_len, 0)
    }

    /// A zero vector with `local_len` owned entries followed by `halo_len` halo slots.
    pub fn with_halo(local_len: usize, halo_len: usize) -> Self {
        Vector { values: vec![0.0; local_len + halo_len], local_len }
    }

    /// A vector owning exactly `values`, without a halo section.
    pub fn from_values(values: Vec<f64>) -> Self {
        let local_len = values.len();
        Vector { values, local_len }
    }

    /// Number of owned entries.
    pub fn local_len(&self) -> usize {
        self.local_len
    }

    /// Number of halo slots.
    pub fn halo_len(&self) -> usize {
        self.values.len() - self.local_len
    }

    /// Owned entries.
    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.local_len]
    }

    /// Owned entries, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values[..self.local_len]
    }

    /// Halo slots.
    pub fn halo(&self) -> &[f64] {
        &self.values[self.local_len..]
    }

    /// Owned entries followed by the halo slots, indexed by local column id.
    pub fn full(&self) -> &[f64] {
        &self.values
    }

    /// Owned entries followed by the halo slots, mutably.
    pub fn full_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Splits into the owned entries and the halo slots.
    pub fn split_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        self.values.split_at_mut(self.local_len)
    }

    /// Sets every entry, halo slots included, to `alpha`.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let mut v = Vector::with_halo(3, 2);
    /// v.set_all(1.5);
    /// assert_eq!(v.full(), &[1.5; 5]);
    /// ```
    pub fn set_all(&mut self, alpha: f64) {
        self.values.iter_mut().for_each(|v| *v = alpha);
    }

    /// Gets owned values at the given local positions.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let v = Vector::from_values(vec![1.1, 2.2, 3.3, 4.4]);
    /// assert_eq!(v.get_values(vec![3, 0]), vec![4.4, 1.1]);
    /// assert_eq!(v.get_values(1..3), vec![2.2, 3.3]);
    /// ```
    pub fn get_values<T>(&self, ix: T) -> Vec<f64>
    where
        T: IntoIterator<Item = usize>,
    {
        ix.into_iter().map(|i| self.as_slice()[i]).collect()
    }

    /// Copies the owned entries of `other` into `self`.
    pub fn copy_from(&mut self, other: &Vector) -> Result<()> {
        check_same_len("copy_from", self, other)?;
        self.as_mut_slice().copy_from_slice(other.as_slice());
        Ok(())
    }

    /// Reorders the owned entries so that the new entry `i` is the old entry `perm[i]`.
    pub fn permute(&mut self, perm: &[usize]) -> Result<()> {
        if perm.len() != self.local_len {
            return Err(HpcgError::new(HpcgErrorKind::DimensionMismatch,
                format!("permutation of length {} applied to a vector of length {}", perm.len(), self.local_len)));
        }
        let old = self.as_slice().to_vec();
        for (new, &src) in self.as_mut_slice().iter_mut().zip(perm) {
            *new = old[src];
        }
        Ok(())
    }

    /// Resizes the halo section to `halo_len` slots, zeroing it.
    pub fn resize_halo(&mut self, halo_len: usize) {
        self.values.truncate(self.local_len);
        self.values.resize(self.local_len + halo_len, 0.0);
    }

    /// Local dot product over the owned entries.
    pub fn dot_local(&self, other: &Vector) -> Result<f64> {
        check_same_len("dot", self, other)?;
        Ok(dot(self.as_slice(), other.as_slice()))
    }

    /// Global dot product.
    pub fn dot(&self, world: &dyn Comm, other: &Vector) -> Result<f64> {
        world.all_reduce_sum(self.dot_local(other)?)
    }

    /// Global 2-norm.
    pub fn norm(&self, world: &dyn Comm) -> Result<f64> {
        Ok(self.dot(world, self)?.sqrt())
    }

    /// Computes `self = alpha * x + beta * self` over the owned entries.
    pub fn axpby(&mut self, alpha: f64, x: &Vector, beta: f64) -> Result<()> {
        check_same_len("axpby", self, x)?;
        if beta == 1.0 {
            self.as_mut_slice().iter_mut().zip(x.as_slice()).for_each(|(s, &x)| *s += alpha * x);
        } else {
            self.as_mut_slice().iter_mut().zip(x.as_slice()).for_each(|(s, &x)| *s = alpha * x + beta * *s);
        }
        Ok(())
    }

    /// Computes `self = alpha * x + beta * y` over the owned entries.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let x = Vector::from_values(vec![1.0, 2.0]);
    /// let y = Vector::from_values(vec![10.0, 20.0]);
    /// let mut w = Vector::new(2);
    /// w.waxpby(2.0, &x, -1.0, &y).unwrap();
    /// assert_eq!(w.as_slice(), &[-8.0, -16.0]);
    /// ```
    pub fn waxpby(&mut self, alpha: f64, x: &Vector, beta: f64, y: &Vector) -> Result<()> {
        check_same_len("waxpby", self, x)?;
        check_same_len("waxpby", self, y)?;
        let w = &mut self.values[..self.local_len];
        for ((w, &x), &y) in w.iter_mut().zip(x.as_slice()).zip(y.as_slice()) {
            *w = alpha * x + beta * y;
        }
        Ok(())
    }
}

impl Index<usize> for Vector {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.values[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.values[i]
    }
}

/// Dot product of two equally long slices, summed left to right.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn check_same_len(op: &str, a: &Vector, b: &Vector) -> Result<()> {
    if a.local_len != b.local_len {
        return Err(HpcgError::new(HpcgErrorKind::DimensionMismatch,
            format!("{}: vectors of length {} and {}", op, a.local_len, b.local_len)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;

    #[test]
    fn halo_is_separate_from_owned() {
        let mut v = Vector::with_halo(3, 2);
        {
            let (owned, halo) = v.split_mut();
            owned.copy_from_slice(&[1.0, 2.0, 3.0]);
            halo.copy_from_slice(&[7.0, 8.0]);
        }
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(v.halo(), &[7.0, 8.0]);
        assert_eq!(v.norm(&SerialComm).unwrap(), 14.0f64.sqrt());
        v.resize_halo(1);
        assert_eq!(v.full(), &[1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn permute_gathers() {
        let mut v = Vector::from_values(vec![10.0, 11.0, 12.0]);
        v.permute(&[2, 0, 1]).unwrap();
        assert_eq!(v.as_slice(), &[12.0, 10.0, 11.0]);
        assert!(v.permute(&[0]).is_err());
    }

    #[test]
    fn length_mismatch_is_reported() {
        let a = Vector::new(2);
        let b = Vector::new(3);
        let err = a.dot_local(&b).unwrap_err();
        assert_eq!(err.kind(), HpcgErrorKind::DimensionMismatch);
    }

    #[test]
    fn axpby_in_place() {
        let mut p = Vector::from_values(vec![1.0, 1.0]);
        let z = Vector::from_values(vec![2.0, 3.0]);
        p.axpby(1.0, &z, 0.5).unwrap();
        assert_eq!(p.as_slice(), &[2.5, 3.5]);
        p.axpby(-1.0, &z, 1.0).unwrap();
        assert_eq!(p.as_slice(), &[0.5, 0.5]);
    }
}
