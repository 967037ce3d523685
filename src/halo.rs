//! Communication pattern for halo (ghost) exchange.
//!
//! A [`HaloPattern`] is built once by the [matrix optimizer](crate::optimize) and is
//! immutable afterwards. For every neighboring rank it records which local rows are
//! sent there, and which slots of the halo section of a vector are filled from there.
//!
//! Both lists are ordered by ascending global index. The stencil is symmetric, so the
//! rows rank `p` sends to rank `q` are exactly the halo columns `q` receives from `p`,
//! and ordering both by global index makes the sender's send order identical to the
//! receiver's fill order without any negotiation.

use std::ops::Range;

use crate::GlobalInt;

/// One neighboring rank of a [`HaloPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    /// Rank of the neighbor.
    pub rank: usize,
    /// Local rows whose values the neighbor needs, in send order.
    pub send_rows: Vec<usize>,
    /// Global index of each entry of `send_rows`.
    pub send_globals: Vec<GlobalInt>,
    /// First halo slot filled from this neighbor.
    pub recv_offset: usize,
    /// Number of halo slots filled from this neighbor.
    pub recv_len: usize,
    /// Global index of each received value, in fill order.
    pub recv_globals: Vec<GlobalInt>,
}

impl Neighbor {
    /// A neighbor whose receive slots have not been placed yet; see
    /// [`HaloPattern::from_neighbors`]. `send_rows` and `send_globals` must have the
    /// same length.
    pub fn new(rank: usize, send_rows: Vec<usize>, send_globals: Vec<GlobalInt>,
        recv_globals: Vec<GlobalInt>) -> Self
    {
        debug_assert_eq!(send_rows.len(), send_globals.len());
        Neighbor { rank, send_rows, send_globals, recv_offset: 0, recv_len: recv_globals.len(), recv_globals }
    }

    /// Halo slots filled from this neighbor.
    pub fn recv_range(&self) -> Range<usize> {
        self.recv_offset..self.recv_offset + self.recv_len
    }

    /// Gathers the values this neighbor needs from the owned part of a vector.
    pub fn pack(&self, owned: &[f64]) -> Vec<f64> {
        self.send_rows.iter().map(|&row| owned[row]).collect()
    }
}

/// Per-neighbor send and receive lists of one rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaloPattern {
    neighbors: Vec<Neighbor>,
    halo_len: usize,
}

impl HaloPattern {
    /// Orders `neighbors` by rank and lays their receive slots out back to back.
    ///
    /// ```
    /// # use hpcg_rs::prelude::*;
    /// let pattern = HaloPattern::from_neighbors(vec![
    ///     Neighbor::new(3, vec![0], vec![0], vec![40, 41]),
    ///     Neighbor::new(1, vec![2], vec![2], vec![17]),
    /// ]);
    /// assert_eq!(pattern.halo_len(), 3);
    /// assert_eq!(pattern.neighbors()[0].rank, 1);
    /// assert_eq!(pattern.neighbor(3).unwrap().recv_range(), 1..3);
    /// ```
    pub fn from_neighbors(mut neighbors: Vec<Neighbor>) -> Self {
        neighbors.sort_by_key(|n| n.rank);
        let mut offset = 0;
        for nbr in neighbors.iter_mut() {
            nbr.recv_offset = offset;
            offset += nbr.recv_len;
        }
        HaloPattern { neighbors, halo_len: offset }
    }

    /// Neighbors in ascending rank order.
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// The neighbor with the given rank, if any.
    pub fn neighbor(&self, rank: usize) -> Option<&Neighbor> {
        self.neighbors.binary_search_by_key(&rank, |n| n.rank).ok().map(|i| &self.neighbors[i])
    }

    /// Total number of halo slots.
    pub fn halo_len(&self) -> usize {
        self.halo_len
    }

    /// Total number of values sent per exchange.
    pub fn send_len(&self) -> usize {
        self.neighbors.iter().map(|n| n.send_rows.len()).sum()
    }

    /// `true` if this rank has no neighbors.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Global index held by each halo slot.
    pub fn recv_globals(&self) -> impl Iterator<Item = GlobalInt> + '_ {
        self.neighbors.iter().flat_map(|n| n.recv_globals.iter().copied())
    }
}
