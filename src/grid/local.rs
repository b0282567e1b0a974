//! LocalGrid: a whole global array held at one process, with the subarray
//! layout of every rank's block.

use super::partition;
use super::{check_dimensionality, flat_index};
use crate::datatype::ArrayOrder;
use crate::debug_invariants::DebugInvariants;
use crate::grid_error::GridError;
use crate::layout::{Layout, Layouts, SubarrayParameter};
use crate::topology::ProcessGrid;
use bytemuck::Pod;
use std::ops::{Index, IndexMut};

/// Dense `D`-dimensional array without halo.
#[derive(Clone, Debug)]
pub struct LocalGrid<const D: usize, T> {
    gsize: [usize; D],
    data: Vec<T>,
    sub_layouts: Layouts<T>,
}

impl<const D: usize, T: Pod> LocalGrid<D, T> {
    /// Allocate a zeroed array of `gsize` and derive, for every rank of
    /// `grid`, the layout of the block that rank owns.
    pub fn new<G: ProcessGrid + ?Sized>(grid: &G, gsize: [usize; D]) -> Result<Self, GridError> {
        check_dimensionality::<D, G>(grid)?;
        let volume = gsize
            .iter()
            .try_fold(1usize, |acc, &s| acc.checked_mul(s))
            .ok_or_else(|| GridError::layout("grid volume overflows usize"))?;
        let sub_layouts = (0..grid.size())
            .map(|rank| {
                let coords = grid.coordinates(rank);
                let mut par = SubarrayParameter::new();
                for d in 0..D {
                    let r = partition::local_range(gsize[d], grid.dim_size(d), coords[d]);
                    par.add(gsize[d], r.len(), r.start);
                }
                par.set_order(ArrayOrder::Fortran);
                Layout::subarray(&par)
            })
            .collect::<Result<Layouts<T>, GridError>>()?;
        let grid = LocalGrid {
            gsize,
            data: vec![T::zeroed(); volume],
            sub_layouts,
        };
        grid.debug_assert_invariants();
        Ok(grid)
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<const D: usize, T> LocalGrid<D, T> {
    #[inline]
    pub fn size(&self, d: usize) -> usize {
        self.gsize[d]
    }

    #[inline]
    pub fn begin(&self, _d: usize) -> isize {
        0
    }

    #[inline]
    pub fn end(&self, d: usize) -> isize {
        self.gsize[d] as isize
    }

    pub fn get(&self, idx: [isize; D]) -> Option<&T> {
        flat_index(&self.gsize, &idx).map(|i| &self.data[i])
    }

    pub fn get_mut(&mut self, idx: [isize; D]) -> Option<&mut T> {
        flat_index(&self.gsize, &idx).map(move |i| &mut self.data[i])
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Layout of rank `r`'s block at index `r`.
    pub fn sub_layouts(&self) -> &Layouts<T> {
        &self.sub_layouts
    }

    pub fn sub_layout(&self, rank: usize) -> Option<&Layout<T>> {
        self.sub_layouts.get(rank)
    }

    pub(crate) fn data_with_sub_layouts(&mut self) -> (&mut [T], &Layouts<T>) {
        (&mut self.data, &self.sub_layouts)
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }
}

impl<const D: usize, T> Index<[isize; D]> for LocalGrid<D, T> {
    type Output = T;

    fn index(&self, idx: [isize; D]) -> &T {
        match flat_index(&self.gsize, &idx) {
            Some(i) => &self.data[i],
            None => panic!("index {idx:?} outside grid of size {:?}", self.gsize),
        }
    }
}

impl<const D: usize, T> IndexMut<[isize; D]> for LocalGrid<D, T> {
    fn index_mut(&mut self, idx: [isize; D]) -> &mut T {
        match flat_index(&self.gsize, &idx) {
            Some(i) => &mut self.data[i],
            None => panic!("index {idx:?} outside grid of size {:?}", self.gsize),
        }
    }
}

impl<const D: usize, T> DebugInvariants for LocalGrid<D, T> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LocalGrid");
    }

    /// The per-rank blocks must add up to the whole array.
    fn validate_invariants(&self) -> Result<(), GridError> {
        let volume: usize = self.gsize.iter().product();
        if self.data.len() != volume {
            return Err(GridError::InvalidSize {
                expected: volume,
                found: self.data.len(),
            });
        }
        let covered: usize = self.sub_layouts.iter().map(Layout::byte_size).sum();
        let bytes = volume * std::mem::size_of::<T>();
        if covered != bytes {
            return Err(GridError::InvalidSize {
                expected: bytes,
                found: covered,
            });
        }
        Ok(())
    }
}
