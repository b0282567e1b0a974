//! Layouts over elements picked out by references.
//!
//! An [`IteratorParameter`] records where each referenced element lies
//! relative to the *first* one, merging runs of neighbouring elements into
//! blocks. The resulting layout is therefore packed against a buffer that
//! starts at the first referenced element, or with [`Layout::pack_at`] at
//! that element's byte offset when the buffer starts earlier.

use super::{Layout, LayoutKind};
use crate::datatype::TypeMap;
use crate::grid_error::GridError;
use bytemuck::Pod;
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;

/// Blocks of consecutive `T` elements at byte displacements from the first
/// referenced element.
pub struct IteratorParameter<T> {
    blocklengths: Vec<usize>,
    displacements: Vec<isize>,
    _elem: PhantomData<fn() -> T>,
}

impl<T> IteratorParameter<T> {
    /// No elements.
    pub fn new() -> Self {
        IteratorParameter {
            blocklengths: Vec::new(),
            displacements: Vec::new(),
            _elem: PhantomData,
        }
    }

    /// Record every element yielded by `items`, in order. The references
    /// must all point into one allocation for the layout to be usable.
    pub fn from_refs<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut par = Self::new();
        let mut first: Option<isize> = None;
        for item in items {
            let addr = item as *const T as isize;
            let base = *first.get_or_insert(addr);
            par.push(addr.wrapping_sub(base));
        }
        par
    }

    fn push(&mut self, displacement: isize) {
        let elem = size_of::<T>() as isize;
        if let (Some(&last), Some(len)) = (self.displacements.last(), self.blocklengths.last_mut()) {
            if last.wrapping_add(*len as isize * elem) == displacement {
                *len += 1;
                return;
            }
        }
        self.displacements.push(displacement);
        self.blocklengths.push(1);
    }

    /// Number of merged blocks.
    pub fn len(&self) -> usize {
        self.displacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displacements.is_empty()
    }

    /// `(blocklength, byte displacement)` per block.
    pub fn iter(&self) -> impl Iterator<Item = (usize, isize)> + '_ {
        self.blocklengths
            .iter()
            .copied()
            .zip(self.displacements.iter().copied())
    }
}

impl<T> Default for IteratorParameter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for IteratorParameter<T> {
    fn clone(&self) -> Self {
        IteratorParameter {
            blocklengths: self.blocklengths.clone(),
            displacements: self.displacements.clone(),
            _elem: PhantomData,
        }
    }
}

impl<T> fmt::Debug for IteratorParameter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Pod> Layout<T> {
    /// Layout of the elements recorded in `par`.
    pub fn iterator(par: &IteratorParameter<T>) -> Result<Self, GridError> {
        Self::iterator_of(par, &Self::element_layout())
    }

    /// Like [`iterator`](Self::iterator), with one item of `l` at every
    /// recorded element position.
    pub fn iterator_of(par: &IteratorParameter<T>, l: &Layout<T>) -> Result<Self, GridError> {
        let blocks: Vec<_> = par.iter().collect();
        let map = TypeMap::hindexed(&blocks, l.type_map()?)?;
        Ok(Self::from_map(LayoutKind::Iterator { blocks: par.len() }, map))
    }

    /// Shorthand for `Layout::iterator(&IteratorParameter::from_refs(items))`.
    pub fn from_refs<'a, I>(items: I) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        Self::iterator(&IteratorParameter::from_refs(items))
    }
}
