//! Re-export public algorithms.

pub mod collective;
pub mod communicator;
pub mod halo_exchange;
pub mod p2p;
pub mod redistribute;

pub use collective::{
    alltoallv, alltoallw, gatherv, gatherv_counts_root, gatherv_root, scatterv, scatterv_counts_root, scatterv_root,
};
pub use halo_exchange::{HaloExchange, Side, exchange_halos, start_halo_exchange};
pub use redistribute::{gather, gather_root, scatter, scatter_root};
