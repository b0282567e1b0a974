//! Structural parameters for block-list and subarray layouts.
//!
//! The same parameter types serve the element-unit variants
//! (`indexed`, `indexed_block`) and the byte-unit variants (`hindexed`,
//! `hindexed_block`); the constructor decides the unit.

use crate::datatype::ArrayOrder;
use crate::grid_error::GridError;
use serde::{Deserialize, Serialize};

/// Ordered list of `(blocklength, displacement)` pairs.
///
/// No ordering is imposed: blocks may be unsorted or overlap.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIndexedParameter")]
pub struct IndexedParameter {
    blocklengths: Vec<usize>,
    displacements: Vec<isize>,
}

#[derive(Deserialize)]
struct RawIndexedParameter {
    blocklengths: Vec<usize>,
    displacements: Vec<isize>,
}

impl TryFrom<RawIndexedParameter> for IndexedParameter {
    type Error = GridError;

    fn try_from(raw: RawIndexedParameter) -> Result<Self, GridError> {
        Self::from_parts(raw.blocklengths, raw.displacements)
    }
}

impl IndexedParameter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel lists; fails if their lengths differ.
    pub fn from_parts(blocklengths: Vec<usize>, displacements: Vec<isize>) -> Result<Self, GridError> {
        if blocklengths.len() != displacements.len() {
            return Err(GridError::layout(format!(
                "{} block lengths but {} displacements",
                blocklengths.len(),
                displacements.len()
            )));
        }
        Ok(Self {
            blocklengths,
            displacements,
        })
    }

    pub fn add(&mut self, blocklength: usize, displacement: isize) -> &mut Self {
        self.blocklengths.push(blocklength);
        self.displacements.push(displacement);
        self
    }

    pub fn len(&self) -> usize {
        self.displacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displacements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, isize)> + '_ {
        self.blocklengths
            .iter()
            .copied()
            .zip(self.displacements.iter().copied())
    }
}

impl FromIterator<(usize, isize)> for IndexedParameter {
    fn from_iter<I: IntoIterator<Item = (usize, isize)>>(iter: I) -> Self {
        let mut par = Self::new();
        for (len, disp) in iter {
            par.add(len, disp);
        }
        par
    }
}

/// Displacements of equally sized blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedBlockParameter {
    displacements: Vec<isize>,
}

impl IndexedBlockParameter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, displacement: isize) -> &mut Self {
        self.displacements.push(displacement);
        self
    }

    pub fn displacements(&self) -> &[isize] {
        &self.displacements
    }

    pub fn len(&self) -> usize {
        self.displacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displacements.is_empty()
    }
}

impl FromIterator<isize> for IndexedBlockParameter {
    fn from_iter<I: IntoIterator<Item = isize>>(iter: I) -> Self {
        Self {
            displacements: iter.into_iter().collect(),
        }
    }
}

/// Per-dimension `(size, subsize, start)` triples plus the storage order.
///
/// Dimensions are listed in the order of the array's index tuple; with
/// [`ArrayOrder::C`] the last listed dimension is contiguous in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubarrayParameter {
    sizes: Vec<usize>,
    subsizes: Vec<usize>,
    starts: Vec<usize>,
    order: ArrayOrder,
}

impl SubarrayParameter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, size: usize, subsize: usize, start: usize) -> &mut Self {
        self.sizes.push(size);
        self.subsizes.push(subsize);
        self.starts.push(start);
        self
    }

    pub fn set_order(&mut self, order: ArrayOrder) -> &mut Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> ArrayOrder {
        self.order
    }

    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn subsizes(&self) -> &[usize] {
        &self.subsizes
    }

    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// `(size, subsize, start)` per dimension, in listed order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        itertools::izip!(
            self.sizes.iter().copied(),
            self.subsizes.iter().copied(),
            self.starts.iter().copied()
        )
    }

    /// Number of elements inside the box.
    pub fn volume(&self) -> usize {
        self.subsizes.iter().product()
    }
}

impl FromIterator<(usize, usize, usize)> for SubarrayParameter {
    fn from_iter<I: IntoIterator<Item = (usize, usize, usize)>>(iter: I) -> Self {
        let mut par = Self::new();
        for (size, subsize, start) in iter {
            par.add(size, subsize, start);
        }
        par
    }
}
