//! Process-grid contexts: how ranks map onto coordinates of a process grid.

pub mod cartesian;

pub use cartesian::{CartesianDimensions, CartesianTopology, dims_create};

use serde::{Deserialize, Serialize};

/// Whether a process-grid dimension wraps around.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Periodicity {
    #[default]
    NonPeriodic,
    Periodic,
}

/// Neighbours returned by [`ProcessGrid::shift`]; `None` marks a missing
/// neighbour at a non-periodic edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShiftRanks {
    pub source: Option<usize>,
    pub destination: Option<usize>,
}

/// What grids and the halo protocol need to know about the process grid.
pub trait ProcessGrid {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn dimensionality(&self) -> usize;
    /// Number of processes along dimension `d`.
    fn dim_size(&self, d: usize) -> usize;
    /// Coordinates of `rank`, one entry per dimension.
    fn coordinates(&self, rank: usize) -> Vec<usize>;
    /// Ranks `disp` steps below (source) and above (destination) this
    /// process along dimension `d`.
    fn shift(&self, d: usize, disp: isize) -> ShiftRanks;

    fn own_coords(&self) -> Vec<usize> {
        self.coordinates(self.rank())
    }
}
