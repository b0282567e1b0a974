//! Thin façade over intra-process (threads) or inter-process (MPI) message
//! passing.
//!
//! Messages are contiguous byte buffers; layouts are packed before a send
//! and unpacked after a receive completes. Every handle is waitable and
//! testable, and nothing is delivered to the caller until `wait` returns.
//!
//! Matching follows the usual point-to-point rules: a receive posted for
//! `(source, tag)` is matched with the sends from `source` carrying `tag` in
//! the order both sides were posted.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Barrier};

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(base: u16) -> Self {
        CommTag(base)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Derived tag `base + k`, wrapping.
    #[inline]
    pub const fn offset(self, k: u16) -> Self {
        CommTag(self.0.wrapping_add(k))
    }
}

/// Non-blocking communication interface.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait + Send;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait + Send;

    /// Start sending a copy of `buf` to `peer`.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Start receiving at most `len` bytes from `peer`; longer messages are
    /// truncated.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Block until every rank has reached the barrier.
    fn barrier(&self) {}

    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
    /// Poll for completion without blocking.
    fn test(&mut self) -> bool;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }

    fn test(&mut self) -> bool {
        true
    }
}

/// Compile-time no-op comm for serial runs: rank 0 of 1.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- ThreadComm: one rank per thread, one process ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Channel {
    /// Messages not yet claimed, by send sequence number.
    pending: BTreeMap<u64, Bytes>,
    sent: u64,
    posted: u64,
}

struct Shared {
    size: usize,
    channels: Mutex<HashMap<Key, Channel>>,
    arrived: Condvar,
    barrier: Barrier,
}

/// In-process transport: every rank is a handle onto shared mailboxes.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Handles for ranks `0..size`, in rank order.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Shared {
            size,
            channels: Mutex::new(HashMap::new()),
            arrived: Condvar::new(),
            barrier: Barrier::new(size.max(1)),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

/// Pending receive on a [`ThreadComm`].
pub struct ThreadRecv {
    key: Key,
    ticket: u64,
    len: usize,
    shared: Arc<Shared>,
    done: Option<Bytes>,
}

impl ThreadRecv {
    fn claim(&mut self, channels: &mut HashMap<Key, Channel>) -> bool {
        if self.done.is_none() {
            self.done = channels
                .get_mut(&self.key)
                .and_then(|ch| ch.pending.remove(&self.ticket));
        }
        self.done.is_some()
    }

    fn finish(&self) -> Option<Vec<u8>> {
        self.done.as_ref().map(|b| {
            if b.len() > self.len {
                log::trace!("truncating {}-byte message to {} bytes", b.len(), self.len);
            }
            b.slice(..b.len().min(self.len)).to_vec()
        })
    }
}

impl Wait for ThreadRecv {
    fn wait(mut self) -> Option<Vec<u8>> {
        let shared = Arc::clone(&self.shared);
        let mut channels = shared.channels.lock();
        while !self.claim(&mut channels) {
            shared.arrived.wait(&mut channels);
        }
        drop(channels);
        self.finish()
    }

    fn test(&mut self) -> bool {
        let shared = Arc::clone(&self.shared);
        let mut channels = shared.channels.lock();
        self.claim(&mut channels)
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = ThreadRecv;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        let mut channels = self.shared.channels.lock();
        let ch = channels.entry(key).or_default();
        let seq = ch.sent;
        ch.sent += 1;
        ch.pending.insert(seq, Bytes::copy_from_slice(buf));
        drop(channels);
        log::trace!("rank {} -> {peer} tag {tag:#x}: {} bytes", self.rank, buf.len());
        self.shared.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> ThreadRecv {
        let key = (peer, self.rank, tag);
        let mut channels = self.shared.channels.lock();
        let ch = channels.entry(key).or_default();
        let ticket = ch.posted;
        ch.posted += 1;
        ThreadRecv {
            key,
            ticket,
            len,
            shared: Arc::clone(&self.shared),
            done: None,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::grid_error::GridError;
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::Arc;

    /// `mpi` crate backend over `MPI_COMM_WORLD`.
    pub struct MpiComm {
        _universe: Arc<Universe>,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    // The world communicator is only used from the thread that owns the
    // handle; MPI is initialised with the default threading level.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn new() -> Result<Self, GridError> {
            let universe = mpi::initialize()
                .ok_or_else(|| GridError::TransportUnavailable("MPI already initialised".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(MpiComm {
                _universe: Arc::new(universe),
                world,
                rank,
                size,
            })
        }
    }

    /// Outstanding `MPI_Isend`; owns the send buffer until completion.
    pub struct MpiSend {
        req: Option<Request<'static, [u8], StaticScope>>,
        buf: *mut [u8],
    }

    unsafe impl Send for MpiSend {}

    impl MpiSend {
        fn release(&mut self) {
            // SAFETY: `buf` came from `Box::leak` and the request using it
            // has completed.
            drop(unsafe { Box::from_raw(self.buf) });
        }
    }

    impl Wait for MpiSend {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(req) = self.req.take() {
                req.wait();
                self.release();
            }
            None
        }

        fn test(&mut self) -> bool {
            match self.req.take() {
                None => true,
                Some(req) => match req.test() {
                    Ok(_) => {
                        self.release();
                        true
                    }
                    Err(req) => {
                        self.req = Some(req);
                        false
                    }
                },
            }
        }
    }

    /// Outstanding receive; matched when waited on.
    pub struct MpiRecv {
        world: SimpleCommunicator,
        peer: i32,
        tag: i32,
        len: usize,
    }

    unsafe impl Send for MpiRecv {}

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.len);
            Some(data)
        }

        fn test(&mut self) -> bool {
            self.world
                .process_at_rank(self.peer)
                .immediate_probe_with_tag(self.tag)
                .is_some()
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSend;
        type RecvHandle = MpiRecv;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSend {
            let leaked: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = leaked;
            // SAFETY: the leaked buffer outlives the request; it is
            // reclaimed only after completion.
            let shared: &'static [u8] = unsafe { &*ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, shared, tag as i32);
            MpiSend {
                req: Some(req),
                buf: ptr,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, len: usize) -> MpiRecv {
            MpiRecv {
                world: SimpleCommunicator::world(),
                peer: peer as i32,
                tag: tag as i32,
                len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_roundtrip_two_ranks() {
        let world = ThreadComm::world(2);
        let tag = CommTag::new(7);
        let recv = world[1].irecv(0, tag.as_u16(), 4);
        world[0].isend(1, tag.as_u16(), &[1, 2, 3, 4]);
        assert_eq!(recv.wait(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn receives_match_in_posting_order() {
        let world = ThreadComm::world(2);
        let first = world[1].irecv(0, 3, 1);
        let mut second = world[1].irecv(0, 3, 1);
        assert!(!second.test());
        world[0].isend(1, 3, &[10]);
        world[0].isend(1, 3, &[20]);
        assert!(second.test());
        assert_eq!(second.wait(), Some(vec![20]));
        assert_eq!(first.wait(), Some(vec![10]));
    }

    #[test]
    fn tags_are_isolated_and_truncate() {
        let world = ThreadComm::world(2);
        let a = world[0].irecv(1, 0xA, 2);
        let b = world[0].irecv(1, 0xB, 8);
        world[1].isend(0, 0xB, &[9; 3]);
        world[1].isend(0, 0xA, &[1, 2, 3, 4]);
        assert_eq!(a.wait(), Some(vec![1, 2]));
        assert_eq!(b.wait(), Some(vec![9, 9, 9]));
    }

    #[test]
    fn blocking_wait_across_threads() {
        let world = ThreadComm::world(2);
        std::thread::scope(|s| {
            let c1 = &world[1];
            let h = s.spawn(move || c1.irecv(0, 1, 5).wait());
            world[0].isend(1, 1, b"hello");
            assert_eq!(h.join().unwrap(), Some(b"hello".to_vec()));
        });
    }

    #[test]
    fn no_comm_is_serial() {
        let comm = NoComm;
        assert!(comm.is_no_comm());
        assert_eq!((comm.rank(), comm.size()), (0, 1));
        let mut h = comm.irecv(0, 1, 8);
        assert!(h.test());
        assert!(h.wait().is_none());
    }

    #[test]
    fn tag_offsets_wrap() {
        assert_eq!(CommTag::new(0xFFFF).offset(2), CommTag(1));
    }
}
