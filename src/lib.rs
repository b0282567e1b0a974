#![cfg_attr(docsrs, feature(doc_cfg))]
//! # halo-grid
//!
//! halo-grid describes non-contiguous memory with typed layouts and uses them
//! to move block-partitioned N-dimensional grids between processes: halo
//! exchange between neighbouring blocks, and scatter/gather between one
//! process holding the whole array and the processes holding its blocks.
//!
//! ## Features
//! - [`Layout`](layout::Layout): contiguous, strided, indexed, indexed-block,
//!   subarray, iterator-built and heterogeneous layouts, each owning exactly
//!   one committed native datatype handle
//! - Balanced block partitioning and Cartesian process topologies
//! - [`DistributedGrid`](grid::DistributedGrid) with precomputed halo layouts
//!   and [`LocalGrid`](grid::LocalGrid) with per-rank sub-layouts
//! - Split-phase halo exchange, variable-layout collectives, grid
//!   scatter/gather
//! - Pluggable transports: serial (`NoComm`), in-process threads
//!   (`ThreadComm`), and MPI (`MpiComm`, feature `mpi-support`)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! halo-grid = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "check-invariants"]
//! ```
//!
//! See `demos/heat_equation.rs` for a complete Jacobi solver over four
//! in-process ranks.

pub mod algs;
pub mod datatype;
pub mod debug_invariants;
pub mod grid;
pub mod grid_error;
pub mod layout;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, ThreadComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::halo_exchange::{HaloExchange, exchange_halos, start_halo_exchange};
    pub use crate::algs::redistribute::{gather, gather_root, scatter, scatter_root};
    pub use crate::datatype::ArrayOrder;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::grid::{DistributedGrid, LocalGrid, SizeOverlap};
    pub use crate::grid_error::GridError;
    pub use crate::layout::{
        ContiguousLayouts, HeterogeneousLayout, HeterogeneousParameter, IndexedBlockParameter,
        IndexedParameter, IteratorParameter, Layout, Layouts, SubarrayParameter,
    };
    pub use crate::topology::{
        CartesianDimensions, CartesianTopology, Periodicity, ProcessGrid, dims_create,
    };
}
