//! Block-partitioned N-dimensional grids.
//!
//! A [`DistributedGrid`] is one process's slab of a global array, padded by
//! halo cells in every dimension; a [`LocalGrid`] is the whole array held at
//! a single process. Both store their elements first-index-fastest, and both
//! derive their per-rank boxes from [`partition`], so the interior of rank
//! `r`'s distributed grid and the `r`-th sub-layout of a local grid cover the
//! same global indices.

pub mod distributed;
pub mod local;
pub mod partition;

pub use distributed::{DistributedGrid, SizeOverlap};
pub use local::LocalGrid;

use crate::grid_error::GridError;
use crate::topology::ProcessGrid;

/// Largest supported grid dimensionality.
pub const MAX_DIM: usize = 4;

/// `D` must lie in `1..=MAX_DIM` and match the process grid.
pub(crate) fn check_dimensionality<const D: usize, G: ProcessGrid + ?Sized>(
    grid: &G,
) -> Result<(), GridError> {
    if !(1..=MAX_DIM).contains(&D) {
        return Err(GridError::InvalidDimension {
            expected: MAX_DIM,
            found: D,
        });
    }
    if grid.dimensionality() != D {
        return Err(GridError::InvalidDimension {
            expected: D,
            found: grid.dimensionality(),
        });
    }
    Ok(())
}

/// Flat offset of `idx` in a first-index-fastest array of `shape`.
#[inline]
pub(crate) fn flat_index<const D: usize>(shape: &[usize; D], idx: &[isize; D]) -> Option<usize> {
    let mut flat = 0usize;
    for d in (0..D).rev() {
        let i = usize::try_from(idx[d]).ok().filter(|&i| i < shape[d])?;
        flat = flat * shape[d] + i;
    }
    Some(flat)
}
