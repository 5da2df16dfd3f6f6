//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices*. Sends never block on the receiver and
//! receives are polled with [`Communicator::try_recv`]; waiting, timeouts and
//! retries live one level up in [`exchange`](crate::algs::exchange). Messages
//! from one source with one tag arrive in the order they were sent.

use crate::amr_error::AmrError;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Message tag; each boundary message kind uses its own tag.
pub type CommTag = u16;

/// Point-to-point, non-blocking communication interface (minimal by design).
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Queue `buf` for `peer`.
    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), AmrError>;

    /// Next message from `peer` with `tag`, if one has arrived.
    fn try_recv(&self, peer: usize, tag: CommTag) -> Result<Option<Bytes>, AmrError>;
}

fn no_such_rank(peer: usize, size: usize) -> AmrError {
    AmrError::CommError {
        neighbor: peer,
        source: format!("rank {peer} outside communicator of size {size}").into(),
    }
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, peer: usize, _tag: CommTag, _buf: &[u8]) -> Result<(), AmrError> {
        Err(no_such_rank(peer, 1))
    }

    fn try_recv(&self, _peer: usize, _tag: CommTag) -> Result<Option<Bytes>, AmrError> {
        Ok(None)
    }
}

// --- LocalComm: intra-process / multi-thread ---
type Key = (usize, usize, CommTag); // (src, dst, tag)

/// In-process communicator: every rank of a universe shares one mailbox.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<DashMap<Key, VecDeque<Bytes>>>,
}

impl LocalComm {
    /// One handle per rank of a fresh `size`-rank universe.
    pub fn universe(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    /// Messages queued for this rank and not yet received.
    pub fn pending(&self) -> usize {
        self.mailbox
            .iter()
            .filter(|e| e.key().1 == self.rank)
            .map(|e| e.value().len())
            .sum()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), AmrError> {
        if peer >= self.size {
            return Err(no_such_rank(peer, self.size));
        }
        self.mailbox
            .entry((self.rank, peer, tag))
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        Ok(())
    }

    fn try_recv(&self, peer: usize, tag: CommTag) -> Result<Option<Bytes>, AmrError> {
        if peer >= self.size {
            return Err(no_such_rank(peer, self.size));
        }
        Ok(self
            .mailbox
            .get_mut(&(peer, self.rank, tag))
            .and_then(|mut q| q.pop_front()))
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// MPI communicator over `MPI_COMM_WORLD`.
    ///
    /// Sends are immediate; while a send is in flight the inbox is pumped so two
    /// ranks sending large messages to each other cannot deadlock.
    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        inbox: Mutex<HashMap<(usize, CommTag), VecDeque<Bytes>>>,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, AmrError> {
            let universe = mpi::initialize().ok_or_else(|| AmrError::CommError {
                neighbor: 0,
                source: "MPI already initialized".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
                inbox: Mutex::new(HashMap::new()),
            })
        }

        fn pump(&self) {
            while let Some((msg, status)) = self.world.any_process().immediate_matched_probe() {
                let (data, _) = msg.matched_receive_vec::<u8>();
                let key = (status.source_rank() as usize, status.tag() as CommTag);
                self.inbox
                    .lock()
                    .entry(key)
                    .or_default()
                    .push_back(Bytes::from(data));
            }
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), AmrError> {
            if peer >= self.size {
                return Err(no_such_rank(peer, self.size));
            }
            mpi::request::scope(|scope| {
                let mut req = self
                    .world
                    .process_at_rank(peer as i32)
                    .immediate_send_with_tag(scope, buf, tag as i32);
                loop {
                    match req.test() {
                        Ok(_) => break,
                        Err(pending) => {
                            req = pending;
                            self.pump();
                        }
                    }
                }
            });
            Ok(())
        }

        fn try_recv(&self, peer: usize, tag: CommTag) -> Result<Option<Bytes>, AmrError> {
            self.pump();
            Ok(self
                .inbox
                .lock()
                .get_mut(&(peer, tag))
                .and_then(VecDeque::pop_front))
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
