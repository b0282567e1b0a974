//! DistributedGrid: one process's block of a global array plus halo cells.
//!
//! Along dimension `d` the storage holds, in order: `overlap(d)` left mirror
//! cells, `size(d)` interior cells, and `overlap(d)` right mirror cells.
//! Local indices therefore run over `obegin(d)..oend(d)` with the interior at
//! `begin(d)..end(d)`, and translate to global indices by
//! `gindex(d, i) = gbegin(d) + i - overlap(d)`.
//!
//! All halo layouts are built once at construction:
//!
//! | layout            | box along `d`                  |
//! |-------------------|--------------------------------|
//! | left mirror       | `[0, overlap)`                 |
//! | left border       | `[overlap, 2 overlap)`         |
//! | right border      | `[size, size + overlap)`       |
//! | right mirror      | `[size + overlap, oend)`       |
//!
//! and span the interior in every other dimension.

use super::partition;
use super::{check_dimensionality, flat_index};
use crate::datatype::ArrayOrder;
use crate::debug_invariants::DebugInvariants;
use crate::grid_error::GridError;
use crate::layout::{Layout, SubarrayParameter};
use crate::topology::ProcessGrid;
use bytemuck::Pod;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Global size and halo width of one grid dimension.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeOverlap {
    pub size: usize,
    pub overlap: usize,
}

impl SizeOverlap {
    pub const fn new(size: usize, overlap: usize) -> Self {
        SizeOverlap { size, overlap }
    }
}

#[derive(Clone, Debug)]
struct HaloLayouts<T> {
    left_mirror: Layout<T>,
    right_mirror: Layout<T>,
    left_border: Layout<T>,
    right_border: Layout<T>,
}

/// One process's slab of a `D`-dimensional global array.
#[derive(Clone, Debug)]
pub struct DistributedGrid<const D: usize, T> {
    gsize: [usize; D],
    gbegin: [usize; D],
    gend: [usize; D],
    size: [usize; D],
    overlap: [usize; D],
    osize: [usize; D],
    data: Vec<T>,
    halos: Vec<HaloLayouts<T>>,
    interior: Layout<T>,
}

impl<const D: usize, T: Pod> DistributedGrid<D, T> {
    /// Build this process's block of a global array described by `dims`.
    ///
    /// The block boundaries follow [`partition::local_range`] over the
    /// process grid's coordinates of this rank. Fails with
    /// `InvalidDimension` if `grid` is not `D`-dimensional.
    pub fn new<G: ProcessGrid + ?Sized>(grid: &G, dims: [SizeOverlap; D]) -> Result<Self, GridError> {
        check_dimensionality::<D, G>(grid)?;
        let coords = grid.own_coords();
        let mut gsize = [0; D];
        let mut gbegin = [0; D];
        let mut gend = [0; D];
        let mut size = [0; D];
        let mut overlap = [0; D];
        let mut osize = [0; D];
        for d in 0..D {
            let range = partition::local_range(dims[d].size, grid.dim_size(d), coords[d]);
            gsize[d] = dims[d].size;
            gbegin[d] = range.start;
            gend[d] = range.end;
            size[d] = range.len();
            overlap[d] = dims[d].overlap;
            osize[d] = size[d]
                .checked_add(2 * overlap[d])
                .ok_or_else(|| GridError::layout("grid dimension overflows usize"))?;
        }
        let volume = osize
            .iter()
            .try_fold(1usize, |acc, &s| acc.checked_mul(s))
            .ok_or_else(|| GridError::layout("grid volume overflows usize"))?;

        // every other dimension spans the interior
        let slab = |d: usize, count: usize, start: usize| -> Result<Layout<T>, GridError> {
            let mut par = SubarrayParameter::new();
            for j in 0..D {
                if j == d {
                    par.add(osize[j], count, start);
                } else {
                    par.add(osize[j], size[j], overlap[j]);
                }
            }
            par.set_order(ArrayOrder::Fortran);
            Layout::subarray(&par)
        };
        let mut halos = Vec::with_capacity(D);
        for d in 0..D {
            let (s, o) = (size[d], overlap[d]);
            halos.push(HaloLayouts {
                left_mirror: slab(d, o, 0)?,
                right_mirror: slab(d, o, s + o)?,
                left_border: slab(d, o, o)?,
                right_border: slab(d, o, s)?,
            });
        }
        let mut par = SubarrayParameter::new();
        for j in 0..D {
            par.add(osize[j], size[j], overlap[j]);
        }
        par.set_order(ArrayOrder::Fortran);
        let interior = Layout::subarray(&par)?;

        log::debug!(
            "rank {}: grid block [{}] of {}, halo {:?}",
            grid.rank(),
            gbegin.iter().zip(&gend).map(|(b, e)| format!("{b}..{e}")).join(", "),
            gsize.iter().join("x"),
            overlap
        );
        let grid = DistributedGrid {
            gsize,
            gbegin,
            gend,
            size,
            overlap,
            osize,
            data: vec![T::zeroed(); volume],
            halos,
            interior,
        };
        grid.debug_assert_invariants();
        Ok(grid)
    }

    /// Set every cell, halo included, to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<const D: usize, T> DistributedGrid<D, T> {
    /// Global size of dimension `d`.
    #[inline]
    pub fn gsize(&self, d: usize) -> usize {
        self.gsize[d]
    }

    #[inline]
    pub fn gbegin(&self, d: usize) -> usize {
        self.gbegin[d]
    }

    #[inline]
    pub fn gend(&self, d: usize) -> usize {
        self.gend[d]
    }

    /// Number of interior cells along `d`.
    #[inline]
    pub fn size(&self, d: usize) -> usize {
        self.size[d]
    }

    #[inline]
    pub fn overlap(&self, d: usize) -> usize {
        self.overlap[d]
    }

    /// First interior index along `d`.
    #[inline]
    pub fn begin(&self, d: usize) -> isize {
        self.overlap[d] as isize
    }

    /// One past the last interior index along `d`.
    #[inline]
    pub fn end(&self, d: usize) -> isize {
        (self.overlap[d] + self.size[d]) as isize
    }

    /// First storage index along `d` (the first left mirror cell).
    #[inline]
    pub fn obegin(&self, _d: usize) -> isize {
        0
    }

    /// One past the last storage index along `d`.
    #[inline]
    pub fn oend(&self, d: usize) -> isize {
        self.osize[d] as isize
    }

    /// Global index of local index `i` along `d`. Not clamped: halo cells
    /// past the domain edge map outside `0..gsize(d)`.
    #[inline]
    pub fn gindex(&self, d: usize, i: isize) -> isize {
        self.gbegin[d] as isize + i - self.overlap[d] as isize
    }

    /// Storage shape including halo.
    pub fn storage_shape(&self) -> [usize; D] {
        self.osize
    }

    pub fn get(&self, idx: [isize; D]) -> Option<&T> {
        flat_index(&self.osize, &idx).map(|i| &self.data[i])
    }

    pub fn get_mut(&mut self, idx: [isize; D]) -> Option<&mut T> {
        flat_index(&self.osize, &idx).map(move |i| &mut self.data[i])
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn left_mirror_layout(&self, d: usize) -> &Layout<T> {
        &self.halos[d].left_mirror
    }

    pub fn right_mirror_layout(&self, d: usize) -> &Layout<T> {
        &self.halos[d].right_mirror
    }

    pub fn left_border_layout(&self, d: usize) -> &Layout<T> {
        &self.halos[d].left_border
    }

    pub fn right_border_layout(&self, d: usize) -> &Layout<T> {
        &self.halos[d].right_border
    }

    /// The interior box, halo excluded.
    pub fn interior_layout(&self) -> &Layout<T> {
        &self.interior
    }

    /// Mutable storage together with the interior layout describing it.
    pub(crate) fn data_with_interior(&mut self) -> (&mut [T], &Layout<T>) {
        (&mut self.data, &self.interior)
    }

    /// Exchange contents and shape with `other` in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }
}

impl<const D: usize, T> Index<[isize; D]> for DistributedGrid<D, T> {
    type Output = T;

    fn index(&self, idx: [isize; D]) -> &T {
        match flat_index(&self.osize, &idx) {
            Some(i) => &self.data[i],
            None => panic!("index {idx:?} outside grid storage {:?}", self.osize),
        }
    }
}

impl<const D: usize, T> IndexMut<[isize; D]> for DistributedGrid<D, T> {
    fn index_mut(&mut self, idx: [isize; D]) -> &mut T {
        match flat_index(&self.osize, &idx) {
            Some(i) => &mut self.data[i],
            None => panic!("index {idx:?} outside grid storage {:?}", self.osize),
        }
    }
}

impl<const D: usize, T> DebugInvariants for DistributedGrid<D, T> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "DistributedGrid");
    }

    fn validate_invariants(&self) -> Result<(), GridError> {
        for d in 0..D {
            if self.osize[d] != self.size[d] + 2 * self.overlap[d] {
                return Err(GridError::InvalidSize {
                    expected: self.size[d] + 2 * self.overlap[d],
                    found: self.osize[d],
                });
            }
            if self.gend[d] - self.gbegin[d] != self.size[d] || self.gend[d] > self.gsize[d] {
                return Err(GridError::layout(format!(
                    "block {}..{} inconsistent with size {} in dimension {d}",
                    self.gbegin[d], self.gend[d], self.size[d]
                )));
            }
        }
        let volume: usize = self.osize.iter().product();
        if self.data.len() != volume {
            return Err(GridError::InvalidSize {
                expected: volume,
                found: self.data.len(),
            });
        }
        Ok(())
    }
}
