//! Moving whole arrays between a root's [`LocalGrid`] and the ranks'
//! [`DistributedGrid`] interiors.
//!
//! Both sides must be built from the same process grid and the same global
//! sizes; the root's sub-layout for rank `r` then matches rank `r`'s
//! interior element for element. Halo cells are neither read nor written.

use crate::algs::collective::{gatherv, gatherv_root, scatterv, scatterv_root};
use crate::algs::communicator::Communicator;
use crate::grid::{DistributedGrid, LocalGrid};
use crate::grid_error::GridError;
use bytemuck::Pod;

/// Root side of a scatter: every rank's interior is filled from `local`.
pub fn scatter_root<const D: usize, T, C>(
    comm: &C,
    local: &LocalGrid<D, T>,
    grid: &mut DistributedGrid<D, T>,
) -> Result<(), GridError>
where
    T: Pod,
    C: Communicator,
{
    let (data, interior) = grid.data_with_interior();
    scatterv_root(comm, local.data(), local.sub_layouts(), data, interior)
}

/// Non-root side of a scatter.
pub fn scatter<const D: usize, T, C>(comm: &C, root: usize, grid: &mut DistributedGrid<D, T>) -> Result<(), GridError>
where
    T: Pod,
    C: Communicator,
{
    let (data, interior) = grid.data_with_interior();
    scatterv(comm, root, data, interior)
}

/// Root side of a gather: every rank's interior is copied into `local`.
pub fn gather_root<const D: usize, T, C>(
    comm: &C,
    grid: &DistributedGrid<D, T>,
    local: &mut LocalGrid<D, T>,
) -> Result<(), GridError>
where
    T: Pod,
    C: Communicator,
{
    let (data, layouts) = local.data_with_sub_layouts();
    gatherv_root(comm, grid.data(), grid.interior_layout(), data, layouts)
}

/// Non-root side of a gather.
pub fn gather<const D: usize, T, C>(comm: &C, root: usize, grid: &DistributedGrid<D, T>) -> Result<(), GridError>
where
    T: Pod,
    C: Communicator,
{
    gatherv(comm, root, grid.data(), grid.interior_layout())
}
