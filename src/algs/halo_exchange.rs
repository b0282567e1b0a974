//! Split-phase halo exchange for [`DistributedGrid`].
//!
//! One round posts, for every dimension `d`:
//!
//! * towards the lower neighbour (`shift(d, -1)`): the left border is sent
//!   to the destination and the right mirror is received from the source,
//!   on tag `base + 2d`;
//! * towards the upper neighbour (`shift(d, +1)`): the right border is sent
//!   and the left mirror received, on tag `base + 2d + 1`.
//!
//! Missing neighbours at non-periodic edges are skipped. Between
//! [`start_halo_exchange`] and [`HaloExchange::wait`] the caller may update
//! interior cells that do not read mirror cells; mirror cells are written
//! only by `wait`.
//!
//! ```rust,no_run
//! # use halo_grid::prelude::*;
//! # fn step(comm: &ThreadComm, top: &CartesianTopology, g: &mut DistributedGrid<2, f64>) -> Result<(), GridError> {
//! let round = start_halo_exchange(comm, top, g, CommTag::new(0x4A10))?;
//! // ... interior-only work on `g` ...
//! round.wait(g)?;
//! # Ok(())
//! # }
//! ```

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::p2p::{RecvRequest, SendRequest};
use crate::datatype::TypeMap;
use crate::grid::DistributedGrid;
use crate::grid_error::GridError;
use crate::topology::ProcessGrid;
use bytemuck::Pod;
use std::sync::Arc;

/// Which halo of a dimension a message fills.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Tag of the message that fills this side's mirror along `d`.
    pub fn tag(self, base: CommTag, d: usize) -> CommTag {
        let dir = match self {
            Side::Right => 0,
            Side::Left => 1,
        };
        base.offset((2 * d + dir) as u16)
    }
}

struct LocalCopy {
    map: Arc<TypeMap>,
    bytes: Vec<u8>,
}

/// One in-flight halo round.
#[must_use = "a halo exchange must be completed with wait"]
pub struct HaloExchange<T, C: Communicator> {
    sends: Vec<SendRequest<C::SendHandle>>,
    recvs: Vec<RecvRequest<T, C::RecvHandle>>,
    local: Vec<LocalCopy>,
}

/// Post every send and receive of one halo round.
pub fn start_halo_exchange<const D: usize, T, C, G>(
    comm: &C,
    topology: &G,
    grid: &DistributedGrid<D, T>,
    tag: CommTag,
) -> Result<HaloExchange<T, C>, GridError>
where
    T: Pod,
    C: Communicator,
    G: ProcessGrid + ?Sized,
{
    if topology.size() != comm.size() {
        return Err(GridError::InvalidSize {
            expected: comm.size(),
            found: topology.size(),
        });
    }
    if topology.rank() != comm.rank() {
        return Err(GridError::InvalidRank {
            rank: topology.rank(),
            size: comm.size(),
        });
    }
    let me = comm.rank();

    // validate and pack everything before posting
    struct Planned {
        tag: CommTag,
        dest: Option<usize>,
        source: Option<usize>,
        payload: Vec<u8>,
        mirror: Arc<TypeMap>,
    }
    let mut plan = Vec::with_capacity(2 * D);
    for d in 0..D {
        for (disp, side) in [(-1isize, Side::Right), (1, Side::Left)] {
            let ranks = topology.shift(d, disp);
            let (border, mirror) = match side {
                Side::Right => (grid.left_border_layout(d), grid.right_mirror_layout(d)),
                Side::Left => (grid.right_border_layout(d), grid.left_mirror_layout(d)),
            };
            let payload = match ranks.destination {
                Some(_) => border.pack(grid.data())?,
                None => Vec::new(),
            };
            plan.push(Planned {
                tag: side.tag(tag, d),
                dest: ranks.destination,
                source: ranks.source,
                payload,
                mirror: mirror.transfer_map()?,
            });
        }
    }

    let mut round = HaloExchange {
        sends: Vec::new(),
        recvs: Vec::new(),
        local: Vec::new(),
    };
    for p in plan {
        if let Some(src) = p.source.filter(|&s| s != me) {
            let h = comm.irecv(src, p.tag.as_u16(), p.mirror.size());
            round.recvs.push(RecvRequest::new(h, Arc::clone(&p.mirror), 0, src));
        }
        match p.dest {
            Some(dst) if dst == me => {
                // a periodic dimension with a single process wraps onto itself
                round.local.push(LocalCopy {
                    map: p.mirror,
                    bytes: p.payload,
                });
            }
            Some(dst) => {
                round.sends.push(SendRequest::new(comm.isend(dst, p.tag.as_u16(), &p.payload)));
            }
            None => {}
        }
    }
    log::trace!(
        "rank {me}: halo round posted {} sends, {} receives",
        round.sends.len(),
        round.recvs.len()
    );
    Ok(round)
}

impl<T: Pod, C: Communicator> HaloExchange<T, C> {
    /// True once every message of the round has completed.
    pub fn test(&mut self) -> bool {
        let recvs_done = self.recvs.iter_mut().fold(true, |acc, r| r.test() && acc);
        let sends_done = self.sends.iter_mut().fold(true, |acc, s| s.test() && acc);
        recvs_done && sends_done
    }

    /// Number of remote messages in the round.
    pub fn len(&self) -> usize {
        self.sends.len() + self.recvs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complete the round, writing every received halo into `grid`.
    ///
    /// `grid` must be the grid the round was started on (or one of the same
    /// shape). Every request is completed even if one fails; the first
    /// failure is returned.
    pub fn wait<const D: usize>(self, grid: &mut DistributedGrid<D, T>) -> Result<(), GridError> {
        let mut maybe_err = None;
        for copy in self.local {
            if let Err(e) = copy.map.unpack(&copy.bytes, bytemuck::cast_slice_mut(grid.data_mut()), 0) {
                maybe_err.get_or_insert(e);
            }
        }
        for r in self.recvs {
            let source = r.source();
            if let Err(e) = r.wait_into(grid.data_mut()) {
                if maybe_err.is_none() {
                    maybe_err = Some(e);
                } else {
                    log::warn!("halo exchange: further failure from rank {source}: {e}");
                }
            }
        }
        for s in self.sends {
            s.wait();
        }
        match maybe_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Blocking halo round.
pub fn exchange_halos<const D: usize, T, C, G>(
    comm: &C,
    topology: &G,
    grid: &mut DistributedGrid<D, T>,
    tag: CommTag,
) -> Result<(), GridError>
where
    T: Pod,
    C: Communicator,
    G: ProcessGrid + ?Sized,
{
    start_halo_exchange(comm, topology, grid, tag)?.wait(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::grid::SizeOverlap;
    use crate::topology::{CartesianDimensions, CartesianTopology, Periodicity};

    #[test]
    fn single_periodic_process_wraps_onto_itself() {
        let mut dims = CartesianDimensions::new();
        dims.add(1, Periodicity::Periodic);
        let top = CartesianTopology::new(dims, 0).unwrap();
        let mut g = DistributedGrid::<1, i32>::new(&top, [SizeOverlap::new(6, 2)]).unwrap();
        for i in g.begin(0)..g.end(0) {
            g[[i]] = g.gindex(0, i) as i32;
        }
        let round = start_halo_exchange(&NoComm, &top, &g, CommTag::new(0x10)).unwrap();
        assert_eq!(round.len(), 0);
        round.wait(&mut g).unwrap();
        let cells: Vec<i32> = (g.obegin(0)..g.oend(0)).map(|i| g[[i]]).collect();
        assert_eq!(cells, vec![4, 5, 0, 1, 2, 3, 4, 5, 0, 1]);
    }

    #[test]
    fn non_periodic_single_process_is_a_no_op() {
        let mut dims = CartesianDimensions::new();
        dims.add(1, Periodicity::NonPeriodic);
        let top = CartesianTopology::new(dims, 0).unwrap();
        let mut g = DistributedGrid::<1, u8>::new(&top, [SizeOverlap::new(4, 1)]).unwrap();
        g.fill(7);
        g[[0]] = 0;
        let mut round = start_halo_exchange(&NoComm, &top, &g, CommTag::new(0x20)).unwrap();
        assert!(round.is_empty());
        assert!(round.test());
        round.wait(&mut g).unwrap();
        assert_eq!(g[[0]], 0);
    }

    #[test]
    fn tags_are_distinct_per_dimension_and_side() {
        let base = CommTag::new(0x100);
        let mut tags: Vec<CommTag> = (0..4)
            .flat_map(|d| [Side::Left.tag(base, d), Side::Right.tag(base, d)])
            .collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), 8);
    }
}
