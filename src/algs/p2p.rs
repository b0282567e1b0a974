//! Point-to-point transfers of layout-described data.
//!
//! Sends pack their layout when they are started, so the source buffer is
//! free again as soon as `isend` returns. Receives hold on to the layout's
//! type map and unpack only when [`RecvRequest::wait_into`] is given the
//! destination buffer.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::datatype::TypeMap;
use crate::grid_error::GridError;
use crate::layout::Layout;
use bytemuck::Pod;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) fn check_rank<C: Communicator + ?Sized>(comm: &C, rank: usize) -> Result<(), GridError> {
    if rank >= comm.size() {
        return Err(GridError::InvalidRank {
            rank,
            size: comm.size(),
        });
    }
    Ok(())
}

/// Wait on a raw receive handle and check the payload length.
pub(crate) fn complete_bytes<H: Wait>(handle: H, expected: usize, source: usize) -> Result<Vec<u8>, GridError> {
    match handle.wait() {
        Some(data) if data.len() == expected => Ok(data),
        Some(data) => Err(GridError::CommError {
            neighbor: source,
            message: format!("expected {expected} bytes, got {}", data.len()),
        }),
        None => Err(GridError::CommError {
            neighbor: source,
            message: "receive completed without data".into(),
        }),
    }
}

/// In-flight send.
#[must_use = "a send request must be waited on"]
pub struct SendRequest<H> {
    handle: H,
}

impl<H: Wait> SendRequest<H> {
    pub(crate) fn new(handle: H) -> Self {
        SendRequest { handle }
    }

    pub fn wait(self) {
        let _ = self.handle.wait();
    }

    pub fn test(&mut self) -> bool {
        self.handle.test()
    }
}

/// In-flight receive of one layout item from `source`.
#[must_use = "a receive request must be completed with wait_into"]
pub struct RecvRequest<T, H> {
    handle: H,
    map: Arc<TypeMap>,
    byte_offset: isize,
    source: usize,
    _elem: PhantomData<fn() -> T>,
}

impl<T: Pod, H: Wait> RecvRequest<T, H> {
    pub(crate) fn new(handle: H, map: Arc<TypeMap>, byte_offset: isize, source: usize) -> Self {
        RecvRequest {
            handle,
            map,
            byte_offset,
            source,
            _elem: PhantomData,
        }
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn test(&mut self) -> bool {
        self.handle.test()
    }

    /// Block until the message arrives and unpack it into `buf`.
    pub fn wait_into(self, buf: &mut [T]) -> Result<(), GridError> {
        let RecvRequest {
            handle,
            map,
            byte_offset,
            source,
            ..
        } = self;
        let bytes = complete_bytes(handle, map.size(), source)?;
        map.unpack(&bytes, bytemuck::cast_slice_mut(buf), byte_offset)
    }
}

/// Start sending one `layout` item of `data` to `dest`.
pub fn isend<C, T>(
    comm: &C,
    data: &[T],
    layout: &Layout<T>,
    dest: usize,
    tag: CommTag,
) -> Result<SendRequest<C::SendHandle>, GridError>
where
    C: Communicator,
    T: Pod,
{
    isend_at(comm, data, layout, 0, dest, tag)
}

pub(crate) fn isend_at<C, T>(
    comm: &C,
    data: &[T],
    layout: &Layout<T>,
    byte_offset: isize,
    dest: usize,
    tag: CommTag,
) -> Result<SendRequest<C::SendHandle>, GridError>
where
    C: Communicator,
    T: Pod,
{
    check_rank(comm, dest)?;
    let payload = layout.pack_at(data, byte_offset)?;
    Ok(SendRequest::new(comm.isend(dest, tag.as_u16(), &payload)))
}

/// Post a receive for one `layout` item from `source`.
pub fn irecv<C, T>(
    comm: &C,
    layout: &Layout<T>,
    source: usize,
    tag: CommTag,
) -> Result<RecvRequest<T, C::RecvHandle>, GridError>
where
    C: Communicator,
    T: Pod,
{
    irecv_at(comm, layout, 0, source, tag)
}

pub(crate) fn irecv_at<C, T>(
    comm: &C,
    layout: &Layout<T>,
    byte_offset: isize,
    source: usize,
    tag: CommTag,
) -> Result<RecvRequest<T, C::RecvHandle>, GridError>
where
    C: Communicator,
    T: Pod,
{
    check_rank(comm, source)?;
    let map = layout.transfer_map()?;
    let handle = comm.irecv(source, tag.as_u16(), map.size());
    Ok(RecvRequest::new(handle, map, byte_offset, source))
}

/// Blocking send.
pub fn send<C, T>(comm: &C, data: &[T], layout: &Layout<T>, dest: usize, tag: CommTag) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    isend(comm, data, layout, dest, tag)?.wait();
    Ok(())
}

/// Blocking receive into `buf`.
pub fn recv<C, T>(comm: &C, buf: &mut [T], layout: &Layout<T>, source: usize, tag: CommTag) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    irecv(comm, layout, source, tag)?.wait_into(buf)
}

/// Send to `dest` and receive from `source` without risking a deadlock
/// between ranks that send to each other.
#[allow(clippy::too_many_arguments)]
pub fn sendrecv<C, T>(
    comm: &C,
    send_data: &[T],
    send_layout: &Layout<T>,
    dest: usize,
    send_tag: CommTag,
    recv_buf: &mut [T],
    recv_layout: &Layout<T>,
    source: usize,
    recv_tag: CommTag,
) -> Result<(), GridError>
where
    C: Communicator,
    T: Pod,
{
    let rx = irecv(comm, recv_layout, source, recv_tag)?;
    let tx = isend(comm, send_data, send_layout, dest, send_tag)?;
    let res = rx.wait_into(recv_buf);
    // drain the send even if the receive failed
    tx.wait();
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::ThreadComm;

    #[test]
    fn strided_column_to_contiguous_row() {
        let world = ThreadComm::world(2);
        let tag = CommTag::new(0x50);
        let data: Vec<i64> = (0..12).collect();
        let column = Layout::<i64>::strided_vector(3, 1, 4).unwrap();
        let row = Layout::<i64>::contiguous(3).unwrap();
        send(&world[0], &data, &column, 1, tag).unwrap();
        let mut out = [0i64; 3];
        recv(&world[1], &mut out, &row, 0, tag).unwrap();
        assert_eq!(out, [0, 4, 8]);
    }

    #[test]
    fn size_mismatch_is_a_comm_error() {
        let world = ThreadComm::world(2);
        let tag = CommTag::new(0x51);
        send(&world[0], &[1u32, 2], &Layout::contiguous(2).unwrap(), 1, tag).unwrap();
        let mut out = [0u32; 4];
        let err = recv(&world[1], &mut out, &Layout::contiguous(4).unwrap(), 0, tag).unwrap_err();
        assert!(matches!(err, GridError::CommError { neighbor: 0, .. }));
    }

    #[test]
    fn bad_rank_and_null_layout_rejected() {
        let world = ThreadComm::world(2);
        let tag = CommTag::new(0x52);
        let l = Layout::<u8>::contiguous(1).unwrap();
        assert_eq!(
            isend(&world[0], &[1u8], &l, 2, tag).err(),
            Some(GridError::InvalidRank { rank: 2, size: 2 })
        );
        assert_eq!(
            irecv(&world[0], &Layout::<u8>::null(), 1, tag).err(),
            Some(GridError::NullLayout)
        );
    }

    #[test]
    fn sendrecv_swaps_between_two_ranks() {
        let world = ThreadComm::world(2);
        let tag = CommTag::new(0x53);
        let l = Layout::<f32>::contiguous(2).unwrap();
        std::thread::scope(|s| {
            for comm in &world {
                let l = &l;
                s.spawn(move || {
                    let me = comm.rank();
                    let other = 1 - me;
                    let mine = [me as f32; 2];
                    let mut theirs = [-1.0f32; 2];
                    sendrecv(comm, &mine, l, other, tag, &mut theirs, l, other, tag).unwrap();
                    assert_eq!(theirs, [other as f32; 2]);
                });
            }
        });
    }
}
