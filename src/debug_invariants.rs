//! Structural self-checks for type maps and grids.
//!
//! `TypeMap`, `DistributedGrid` and `LocalGrid` validate themselves right
//! after construction: block coalescing and bound ordering for type maps,
//! storage shape against the partition for grids, and full tiling of the
//! global array by a local grid's per-rank sub-layouts. The checks run under
//! `debug_assertions`, or in any build with the `check-invariants` feature.

use crate::grid_error::GridError;

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), GridError>;
}

/// Helper macro to run a fallible check and panic on error when invariant
/// checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
