//! GridError: Unified error type for halo-grid public APIs
//!
//! Every fallible operation in the crate (layout construction, grid
//! construction, packing, transfers) reports through this type. Errors are
//! detected at construction or call time and surfaced immediately; nothing in
//! the crate retries.

use thiserror::Error;

/// Unified error type for layout, grid and transfer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Dimensionality of a process grid (or index tuple) does not match the
    /// dimensionality of the object being built against it.
    #[error("invalid dimension: expected {expected}, found {found}")]
    InvalidDimension { expected: usize, found: usize },
    /// A structural layout description cannot be represented.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    /// A per-rank sequence (layouts, displacements, ...) has the wrong length.
    #[error("invalid size: expected {expected}, found {found}")]
    InvalidSize { expected: usize, found: usize },
    /// Rank outside of `0..size`.
    #[error("invalid rank {rank} for a process group of size {size}")]
    InvalidRank { rank: usize, size: usize },
    /// A byte bound is not a whole number of elements.
    #[error("byte bound {bytes} is not a multiple of the element size {element_size}")]
    InvalidDatatypeBound { bytes: isize, element_size: usize },
    /// The layout addresses bytes outside of the supplied buffer.
    #[error("layout touches bytes [{lower}, {upper}) outside a buffer of {len} bytes")]
    BufferOutOfBounds { lower: isize, upper: isize, len: usize },
    /// The null layout carries no native handle and cannot be transferred.
    #[error("operation on the null layout")]
    NullLayout,
    /// The transport reported a failure talking to `neighbor`.
    #[error("communication with rank {neighbor} failed: {message}")]
    CommError { neighbor: usize, message: String },
    /// The transport could not be initialised.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
}

impl GridError {
    pub(crate) fn layout(msg: impl Into<String>) -> Self {
        GridError::InvalidLayout(msg.into())
    }
}
