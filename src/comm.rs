//! The communication layer the distributed kernels run on.
//!
//! Everything that crosses a rank boundary goes through [`Comm`]: global reductions
//! for the CG dot products and the neighbor-to-neighbor halo exchange used by the
//! matrix-vector product and the preconditioner. There is never a broadcast to all
//! ranks; a rank talks to at most its 26 geometric neighbors.
//!
//! Implementations:
//! * [`SerialComm`]: one process, the exchange is a no-op.
//! * [`ThreadComm`]: several ranks inside one process, one thread per rank.
//! * [`MpiComm`]: `MPI_COMM_WORLD` (requires the `mpi` feature).

use crossbeam::channel::{self, Receiver, Sender};

use crate::halo::HaloPattern;
use crate::{HpcgError, HpcgErrorKind, Result};

#[cfg(feature = "mpi")]
pub use self::mpi_comm::MpiComm;

/// Abstraction over inter-rank communication.
pub trait Comm {
    /// This rank, in `0..size`.
    fn rank(&self) -> usize;

    /// Number of ranks.
    fn size(&self) -> usize;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Sum a local scalar across all ranks. The combination order is fixed for a
    /// given number of ranks, so results are reproducible run to run.
    fn all_reduce_sum(&self, local: f64) -> Result<f64>;

    /// Sum a local count across all ranks.
    fn all_reduce_count(&self, local: u64) -> Result<u64>;

    /// Max of a local scalar across all ranks.
    fn all_reduce_max(&self, local: f64) -> Result<f64>;

    /// Synchronization barrier.
    fn barrier(&self) -> Result<()>;

    /// Exchanges halo values with every neighbor in `pattern`.
    ///
    /// Receives are posted into `halo` and this rank's boundary values (read from
    /// `owned`) are sent. `overlap` is run while the messages are in flight, and the
    /// call returns once every receive has landed in its slot of `halo`.
    fn exchange_halo(&self, pattern: &HaloPattern, owned: &[f64], halo: &mut [f64],
        overlap: &mut dyn FnMut()) -> Result<()>;
}

/// No-op communication layer for a single process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }

    fn size(&self) -> usize { 1 }

    fn name(&self) -> &'static str { "serial" }

    fn all_reduce_sum(&self, local: f64) -> Result<f64> { Ok(local) }

    fn all_reduce_count(&self, local: u64) -> Result<u64> { Ok(local) }

    fn all_reduce_max(&self, local: f64) -> Result<f64> { Ok(local) }

    fn barrier(&self) -> Result<()> { Ok(()) }

    fn exchange_halo(&self, pattern: &HaloPattern, _owned: &[f64], _halo: &mut [f64],
        overlap: &mut dyn FnMut()) -> Result<()>
    {
        if !pattern.is_empty() {
            return Err(HpcgError::new(HpcgErrorKind::InvariantViolation,
                "single process matrix has halo neighbors"));
        }
        overlap();
        Ok(())
    }
}

/// Message between two in-process ranks.
#[derive(Debug)]
enum Packet {
    Values(Vec<f64>),
    Count(u64),
    Sync,
}

/// In-process communication layer: each rank is a thread, connected to every other
/// rank by one FIFO channel per direction.
///
/// Every rank performs the same sequence of exchanges and reductions, so the FIFO
/// order on each channel is enough to match messages. Reductions gather all
/// contributions and combine them in rank order, which makes them deterministic.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    // indexed by destination rank
    senders: Vec<Sender<Packet>>,
    // indexed by source rank
    receivers: Vec<Receiver<Packet>>,
}

impl ThreadComm {
    /// Creates `size` connected ranks. Move each one onto its own thread, e.g. with
    /// [`Hpcg::run_threaded`](crate::Hpcg::run_threaded).
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let mut senders: Vec<Vec<Sender<Packet>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Receiver<Packet>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        for src in 0..size {
            for dst in 0..size {
                let (tx, rx) = channel::unbounded();
                senders[src].push(tx);
                receivers[dst].push(rx);
            }
        }

        senders.into_iter().zip(receivers).enumerate()
            .map(|(rank, (senders, receivers))| ThreadComm { rank, size, senders, receivers })
            .collect()
    }

    fn send(&self, dst: usize, packet: Packet) -> Result<()> {
        self.senders[dst].send(packet).map_err(|_| HpcgError::new(HpcgErrorKind::Communication,
            format!("rank {} is gone (send from {})", dst, self.rank)))
    }

    fn recv(&self, src: usize) -> Result<Packet> {
        self.receivers[src].recv().map_err(|_| HpcgError::new(HpcgErrorKind::Communication,
            format!("rank {} is gone (recv on {})", src, self.rank)))
    }

    /// Sends `packet` to every other rank, then collects one packet from every rank
    /// (this rank's own contribution included) in rank order.
    fn all_gather<T, F, G>(&self, local: T, mut pack: F, mut unpack: G) -> Result<Vec<T>>
    where
        T: Copy,
        F: FnMut(T) -> Packet,
        G: FnMut(Packet) -> Option<T>,
    {
        for dst in (0..self.size).filter(|&r| r != self.rank) {
            self.send(dst, pack(local))?;
        }
        (0..self.size).map(|src| {
            if src == self.rank {
                return Ok(local);
            }
            let packet = self.recv(src)?;
            unpack(packet).ok_or_else(|| HpcgError::new(HpcgErrorKind::Communication,
                format!("unexpected message from rank {} during a reduction", src)))
        }).collect()
    }

    fn gather_values(&self, local: f64) -> Result<Vec<f64>> {
        self.all_gather(local, |v| Packet::Values(vec![v]), |p| match p {
            Packet::Values(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        })
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize { self.rank }

    fn size(&self) -> usize { self.size }

    fn name(&self) -> &'static str { "thread" }

    fn all_reduce_sum(&self, local: f64) -> Result<f64> {
        Ok(self.gather_values(local)?.into_iter().sum())
    }

    fn all_reduce_count(&self, local: u64) -> Result<u64> {
        let counts = self.all_gather(local, Packet::Count, |p| match p {
            Packet::Count(c) => Some(c),
            _ => None,
        })?;
        Ok(counts.into_iter().sum())
    }

    fn all_reduce_max(&self, local: f64) -> Result<f64> {
        Ok(self.gather_values(local)?.into_iter().fold(f64::NEG_INFINITY, f64::max))
    }

    fn barrier(&self) -> Result<()> {
        self.all_gather((), |_| Packet::Sync, |p| match p {
            Packet::Sync => Some(()),
            _ => None,
        }).map(|_| ())
    }

    fn exchange_halo(&self, pattern: &HaloPattern, owned: &[f64], halo: &mut [f64],
        overlap: &mut dyn FnMut()) -> Result<()>
    {
        // Channels are unbounded, so every send completes immediately.
        for nbr in pattern.neighbors() {
            self.send(nbr.rank, Packet::Values(nbr.pack(owned)))?;
        }

        overlap();

        for nbr in pattern.neighbors() {
            match self.recv(nbr.rank)? {
                Packet::Values(values) if values.len() == nbr.recv_len => {
                    halo[nbr.recv_range()].copy_from_slice(&values);
                },
                _ => return Err(HpcgError::new(HpcgErrorKind::Communication,
                    format!("rank {} expected {} halo values from rank {}", self.rank, nbr.recv_len, nbr.rank))),
            }
        }
        Ok(())
    }
}

#[cfg(feature = "mpi")]
mod mpi_comm {
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    use super::Comm;
    use crate::halo::HaloPattern;
    use crate::{HpcgError, HpcgErrorKind, Result};

    const HALO_TAG: i32 = 99;

    /// `MPI_COMM_WORLD` communication layer.
    ///
    /// Owns the MPI universe, so MPI is finalized when this is dropped.
    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
    }

    impl MpiComm {
        /// Initializes MPI. Fails if MPI was already initialized.
        pub fn new() -> Result<Self> {
            let universe = mpi::initialize().ok_or_else(|| HpcgError::new(HpcgErrorKind::Configuration,
                "MPI could not be initialized (already initialized?)"))?;
            let world = universe.world();
            Ok(MpiComm { _universe: universe, world })
        }
    }

    impl Comm for MpiComm {
        fn rank(&self) -> usize { self.world.rank() as usize }

        fn size(&self) -> usize { self.world.size() as usize }

        fn name(&self) -> &'static str { "mpi" }

        fn all_reduce_sum(&self, local: f64) -> Result<f64> {
            let mut global = 0.0f64;
            self.world.all_reduce_into(&local, &mut global, SystemOperation::sum());
            Ok(global)
        }

        fn all_reduce_count(&self, local: u64) -> Result<u64> {
            let mut global = 0u64;
            self.world.all_reduce_into(&local, &mut global, SystemOperation::sum());
            Ok(global)
        }

        fn all_reduce_max(&self, local: f64) -> Result<f64> {
            let mut global = 0.0f64;
            self.world.all_reduce_into(&local, &mut global, SystemOperation::max());
            Ok(global)
        }

        fn barrier(&self) -> Result<()> {
            self.world.barrier();
            Ok(())
        }

        fn exchange_halo(&self, pattern: &HaloPattern, owned: &[f64], halo: &mut [f64],
            overlap: &mut dyn FnMut()) -> Result<()>
        {
            let send_bufs = pattern.neighbors().iter().map(|nbr| nbr.pack(owned)).collect::<Vec<_>>();

            // Receive slots are contiguous and in neighbor order.
            let mut recv_bufs = Vec::with_capacity(pattern.neighbors().len());
            let mut rest = halo;
            for nbr in pattern.neighbors() {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(nbr.recv_len);
                recv_bufs.push(head);
                rest = tail;
            }

            mpi::request::scope(|scope| {
                let recvs = pattern.neighbors().iter().zip(recv_bufs)
                    .map(|(nbr, buf)| self.world.process_at_rank(nbr.rank as i32)
                        .immediate_receive_into_with_tag(scope, buf, HALO_TAG))
                    .collect::<Vec<_>>();
                let sends = pattern.neighbors().iter().zip(send_bufs.iter())
                    .map(|(nbr, buf)| self.world.process_at_rank(nbr.rank as i32)
                        .immediate_send_with_tag(scope, &buf[..], HALO_TAG))
                    .collect::<Vec<_>>();

                overlap();

                for req in recvs {
                    req.wait();
                }
                for req in sends {
                    req.wait();
                }
            });
            Ok(())
        }
    }
}
