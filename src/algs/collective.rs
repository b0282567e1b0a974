//! Variable-layout collectives built on point-to-point messages.
//!
//! Every participant describes, per peer rank, the layout of the data it
//! sends to and receives from that peer. Per-rank sequences must have
//! exactly `comm.size()` entries. Traffic a rank sends to itself is copied
//! locally and never reaches the transport.
//!
//! All layouts are validated and all payloads packed before the first
//! message is posted, so a rejected call leaves no request behind. Once
//! messages are in flight every request is completed, even when one of them
//! fails; the first failure is returned afterwards.
//!
//! Collectives use the reserved tags [`SCATTER_TAG`], [`GATHER_TAG`] and
//! [`ALLTOALL_TAG`].

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::p2p::{check_rank, complete_bytes};
use crate::datatype::TypeMap;
use crate::grid_error::GridError;
use crate::layout::{ContiguousLayouts, Displacements, Layout, Layouts};
use bytemuck::Pod;
use std::sync::Arc;

pub const SCATTER_TAG: CommTag = CommTag::new(0x5CA7);
pub const GATHER_TAG: CommTag = CommTag::new(0x6A7E);
pub const ALLTOALL_TAG: CommTag = CommTag::new(0xA11A);

struct Outgoing {
    dest: usize,
    bytes: Vec<u8>,
}

struct Incoming {
    source: usize,
    map: Arc<TypeMap>,
    byte_offset: isize,
}

fn check_len(found: usize, expected: usize) -> Result<(), GridError> {
    if found != expected {
        return Err(GridError::InvalidSize { expected, found });
    }
    Ok(())
}

/// Post, complete and unpack one round of messages.
fn exchange<C: Communicator>(
    comm: &C,
    tag: CommTag,
    mut outgoing: Vec<Outgoing>,
    mut incoming: Vec<Incoming>,
    recv_buf: &mut [u8],
) -> Result<(), GridError> {
    let me = comm.rank();
    let own_out = outgoing.iter().position(|o| o.dest == me).map(|i| outgoing.swap_remove(i));
    let own_in = incoming.iter().position(|i| i.source == me).map(|i| incoming.swap_remove(i));

    // 1) post all receives
    let pending_recvs: Vec<_> = incoming
        .into_iter()
        .map(|inc| {
            let h = comm.irecv(inc.source, tag.as_u16(), inc.map.size());
            (inc, h)
        })
        .collect();

    // 2) post all sends
    let pending_sends: Vec<_> = outgoing
        .iter()
        .map(|out| comm.isend(out.dest, tag.as_u16(), &out.bytes))
        .collect();

    // 3) local copy
    let mut maybe_err = match (own_out, own_in) {
        (Some(out), Some(inc)) => inc.map.unpack(&out.bytes, recv_buf, inc.byte_offset).err(),
        (None, None) => None,
        (Some(_), None) | (None, Some(_)) => Some(GridError::layout(
            "self message has no matching counterpart",
        )),
    };

    // 4) wait for all recvs (but do not early-return)
    for (inc, h) in pending_recvs {
        let res = complete_bytes(h, inc.map.size(), inc.source)
            .and_then(|bytes| inc.map.unpack(&bytes, recv_buf, inc.byte_offset));
        if let Err(e) = res {
            if maybe_err.is_none() {
                maybe_err = Some(e);
            } else {
                log::warn!("collective: further failure from rank {}: {e}", inc.source);
            }
        }
    }

    // 5) always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn outgoing_to_all<T: Pod>(
    data: &[T],
    layouts: &Layouts<T>,
    displs: Option<&Displacements>,
) -> Result<Vec<Outgoing>, GridError> {
    layouts
        .iter()
        .enumerate()
        .map(|(dest, l)| {
            let off = displs.and_then(|d| d.get(dest)).unwrap_or(0);
            Ok(Outgoing {
                dest,
                bytes: l.pack_at(data, off)?,
            })
        })
        .collect()
}

fn incoming_from_all<T>(layouts: &Layouts<T>, displs: Option<&Displacements>) -> Result<Vec<Incoming>, GridError> {
    layouts
        .iter()
        .enumerate()
        .map(|(source, l)| {
            Ok(Incoming {
                source,
                map: l.transfer_map()?,
                byte_offset: displs.and_then(|d| d.get(source)).unwrap_or(0),
            })
        })
        .collect()
}

/// Root side of a scatter: rank `r` receives `send_layouts[r]` of
/// `send_data`; the root's own share lands in `recv_buf` through
/// `recv_layout`.
pub fn scatterv_root<C, T>(
    comm: &C,
    send_data: &[T],
    send_layouts: &Layouts<T>,
    recv_buf: &mut [T],
    recv_layout: &Layout<T>,
) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    check_len(send_layouts.len(), comm.size())?;
    let outgoing = outgoing_to_all(send_data, send_layouts, None)?;
    let incoming = vec![Incoming {
        source: comm.rank(),
        map: recv_layout.transfer_map()?,
        byte_offset: 0,
    }];
    exchange(comm, SCATTER_TAG, outgoing, incoming, bytemuck::cast_slice_mut(recv_buf))
}

/// Root side of a scatter over a dense buffer cut into consecutive shares:
/// rank `r` receives the `counts.sizes()[r]` elements that follow the
/// shares of ranks `0..r`. The root's own share is copied to the front of
/// `recv_buf`. Other ranks call [`scatterv`] with a contiguous layout of
/// their count.
pub fn scatterv_counts_root<C, T>(
    comm: &C,
    send_data: &[T],
    counts: &ContiguousLayouts<T>,
    recv_buf: &mut [T],
) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    check_len(counts.len(), comm.size())?;
    let displs = counts.displacements()?;
    let outgoing = outgoing_to_all(send_data, counts.as_layouts(), Some(&displs))?;
    let own = &counts[comm.rank()];
    let incoming = vec![Incoming {
        source: comm.rank(),
        map: own.transfer_map()?,
        byte_offset: 0,
    }];
    exchange(comm, SCATTER_TAG, outgoing, incoming, bytemuck::cast_slice_mut(recv_buf))
}

/// Non-root side of a scatter.
pub fn scatterv<C, T>(comm: &C, root: usize, recv_buf: &mut [T], recv_layout: &Layout<T>) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    check_rank(comm, root)?;
    let incoming = vec![Incoming {
        source: root,
        map: recv_layout.transfer_map()?,
        byte_offset: 0,
    }];
    exchange(comm, SCATTER_TAG, Vec::new(), incoming, bytemuck::cast_slice_mut(recv_buf))
}

/// Root side of a gather: rank `r`'s contribution is unpacked into
/// `recv_buf` through `recv_layouts[r]`.
pub fn gatherv_root<C, T>(
    comm: &C,
    send_data: &[T],
    send_layout: &Layout<T>,
    recv_buf: &mut [T],
    recv_layouts: &Layouts<T>,
) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    check_len(recv_layouts.len(), comm.size())?;
    let incoming = incoming_from_all(recv_layouts, None)?;
    let outgoing = vec![Outgoing {
        dest: comm.rank(),
        bytes: send_layout.pack(send_data)?,
    }];
    exchange(comm, GATHER_TAG, outgoing, incoming, bytemuck::cast_slice_mut(recv_buf))
}

/// Root side of a gather into a dense buffer: rank `r`'s
/// `counts.sizes()[r]` elements land right after those of ranks `0..r`.
/// The root contributes the front of `send_data`.
pub fn gatherv_counts_root<C, T>(
    comm: &C,
    send_data: &[T],
    counts: &ContiguousLayouts<T>,
    recv_buf: &mut [T],
) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    check_len(counts.len(), comm.size())?;
    let displs = counts.displacements()?;
    let incoming = incoming_from_all(counts.as_layouts(), Some(&displs))?;
    let outgoing = vec![Outgoing {
        dest: comm.rank(),
        bytes: counts[comm.rank()].pack(send_data)?,
    }];
    exchange(comm, GATHER_TAG, outgoing, incoming, bytemuck::cast_slice_mut(recv_buf))
}

/// Non-root side of a gather.
pub fn gatherv<C, T>(comm: &C, root: usize, send_data: &[T], send_layout: &Layout<T>) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    check_rank(comm, root)?;
    let outgoing = vec![Outgoing {
        dest: root,
        bytes: send_layout.pack(send_data)?,
    }];
    exchange(comm, GATHER_TAG, outgoing, Vec::new(), &mut [])
}

/// Every rank sends `send_layouts[r]` to rank `r` and receives
/// `recv_layouts[r]` from it.
pub fn alltoallv<C, T>(
    comm: &C,
    send_data: &[T],
    send_layouts: &Layouts<T>,
    recv_buf: &mut [T],
    recv_layouts: &Layouts<T>,
) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    check_len(send_layouts.len(), comm.size())?;
    check_len(recv_layouts.len(), comm.size())?;
    let outgoing = outgoing_to_all(send_data, send_layouts, None)?;
    let incoming = incoming_from_all(recv_layouts, None)?;
    exchange(comm, ALLTOALL_TAG, outgoing, incoming, bytemuck::cast_slice_mut(recv_buf))
}

/// [`alltoallv`] with a per-rank byte displacement applied to each layout.
pub fn alltoallw<C, T>(
    comm: &C,
    send_data: &[T],
    send_layouts: &Layouts<T>,
    send_displs: &Displacements,
    recv_buf: &mut [T],
    recv_layouts: &Layouts<T>,
    recv_displs: &Displacements,
) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    let n = comm.size();
    check_len(send_layouts.len(), n)?;
    check_len(send_displs.len(), n)?;
    check_len(recv_layouts.len(), n)?;
    check_len(recv_displs.len(), n)?;
    let outgoing = outgoing_to_all(send_data, send_layouts, Some(send_displs))?;
    let incoming = incoming_from_all(recv_layouts, Some(recv_displs))?;
    exchange(comm, ALLTOALL_TAG, outgoing, incoming, bytemuck::cast_slice_mut(recv_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn serial_scatter_is_a_local_copy() {
        let comm = NoComm;
        let src = [1u16, 2, 3, 4];
        let send = Layouts::filled(1, &Layout::strided_vector(2, 1, 2).unwrap());
        let mut dst = [0u16; 2];
        scatterv_root(&comm, &src, &send, &mut dst, &Layout::contiguous(2).unwrap()).unwrap();
        assert_eq!(dst, [1, 3]);
    }

    #[test]
    fn wrong_layout_count_is_rejected() {
        let comm = NoComm;
        let ls = Layouts::filled(2, &Layout::<u8>::contiguous(1).unwrap());
        let err = alltoallv(&comm, &[0u8], &ls, &mut [0u8], &ls).unwrap_err();
        assert_eq!(err, GridError::InvalidSize { expected: 1, found: 2 });
    }

    #[test]
    fn own_share_size_mismatch_is_reported() {
        let comm = NoComm;
        let send = Layouts::filled(1, &Layout::<u8>::contiguous(3).unwrap());
        let mut dst = [0u8; 2];
        let err = scatterv_root(&comm, &[1, 2, 3], &send, &mut dst, &Layout::contiguous(2).unwrap());
        assert!(matches!(err, Err(GridError::InvalidSize { expected: 2, found: 3 })));
    }

    #[test]
    fn serial_counts_scatter_and_gather_copy_the_front() {
        let comm = NoComm;
        let counts = ContiguousLayouts::<i32>::from_counts(&[3]).unwrap();
        let mut dst = [0i32; 4];
        scatterv_counts_root(&comm, &[7, 8, 9, 10], &counts, &mut dst).unwrap();
        assert_eq!(dst, [7, 8, 9, 0]);

        let mut back = [0i32; 3];
        gatherv_counts_root(&comm, &dst, &counts, &mut back).unwrap();
        assert_eq!(back, [7, 8, 9]);
    }
}
