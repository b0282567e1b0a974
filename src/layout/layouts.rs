//! Per-rank sequences of layouts and byte displacements.

use super::Layout;
use crate::grid_error::GridError;
use bytemuck::Pod;
use std::mem::size_of;
use std::ops::Index;

/// Ordered collection of layouts, one entry per rank in collective calls.
///
/// Cloning deep-copies every entry (each copy owns its own native handle).
#[derive(Debug)]
pub struct Layouts<T> {
    items: Vec<Layout<T>>,
}

impl<T> Layouts<T> {
    pub fn new() -> Self {
        Layouts { items: Vec::new() }
    }

    /// `n` copies of `layout`.
    pub fn filled(n: usize, layout: &Layout<T>) -> Self {
        Layouts {
            items: std::iter::repeat_with(|| layout.clone()).take(n).collect(),
        }
    }

    pub fn push(&mut self, layout: Layout<T>) {
        self.items.push(layout);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Layout<T>> {
        self.items.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Layout<T>> {
        self.items.iter()
    }
}

impl<T: Pod> Layouts<T> {
    /// `n` empty layouts.
    pub fn with_empty(n: usize) -> Self {
        Layouts {
            items: (0..n).map(|_| Layout::empty()).collect(),
        }
    }
}

impl<T> Default for Layouts<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Layouts<T> {
    fn clone(&self) -> Self {
        Layouts {
            items: self.items.clone(),
        }
    }
}

impl<T> Index<usize> for Layouts<T> {
    type Output = Layout<T>;

    fn index(&self, i: usize) -> &Layout<T> {
        &self.items[i]
    }
}

impl<T> FromIterator<Layout<T>> for Layouts<T> {
    fn from_iter<I: IntoIterator<Item = Layout<T>>>(iter: I) -> Self {
        Layouts {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Layouts<T> {
    type Item = Layout<T>;
    type IntoIter = std::vec::IntoIter<Layout<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Layouts<T> {
    type Item = &'a Layout<T>;
    type IntoIter = std::slice::Iter<'a, Layout<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Per-rank contiguous layouts that remember their element counts.
///
/// The counts give each rank's share of one dense buffer, so
/// [`displacements`](Self::displacements) are the running byte offsets of
/// those shares.
#[derive(Debug)]
pub struct ContiguousLayouts<T> {
    layouts: Layouts<T>,
    counts: Vec<usize>,
}

impl<T: Pod> ContiguousLayouts<T> {
    pub fn new() -> Self {
        ContiguousLayouts {
            layouts: Layouts::new(),
            counts: Vec::new(),
        }
    }

    /// `n` entries of zero elements.
    pub fn with_empty(n: usize) -> Self {
        ContiguousLayouts {
            layouts: Layouts::with_empty(n),
            counts: vec![0; n],
        }
    }

    pub fn from_counts(counts: &[usize]) -> Result<Self, GridError> {
        let mut out = Self::new();
        for &count in counts {
            out.push(count)?;
        }
        Ok(out)
    }

    /// Append an entry of `count` consecutive elements.
    pub fn push(&mut self, count: usize) -> Result<(), GridError> {
        self.layouts.push(Layout::contiguous(count)?);
        self.counts.push(count);
        Ok(())
    }

    /// Element count per entry.
    pub fn sizes(&self) -> &[usize] {
        &self.counts
    }

    /// Byte offset of each entry when the entries are laid end to end.
    pub fn displacements(&self) -> Result<Displacements, GridError> {
        let elem = Layout::<T>::element_bytes()?;
        let mut at: isize = 0;
        self.counts
            .iter()
            .map(|&count| {
                let here = at;
                at = isize::try_from(count)
                    .ok()
                    .and_then(|c| c.checked_mul(elem))
                    .and_then(|bytes| at.checked_add(bytes))
                    .ok_or_else(|| GridError::layout("displacement overflows isize"))?;
                Ok(here)
            })
            .collect()
    }

    /// Total element count over all entries.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

impl<T> ContiguousLayouts<T> {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Layout<T>> {
        self.layouts.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Layout<T>> {
        self.layouts.iter()
    }

    pub fn as_layouts(&self) -> &Layouts<T> {
        &self.layouts
    }
}

impl<T: Pod> Default for ContiguousLayouts<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ContiguousLayouts<T> {
    fn clone(&self) -> Self {
        ContiguousLayouts {
            layouts: self.layouts.clone(),
            counts: self.counts.clone(),
        }
    }
}

impl<T> Index<usize> for ContiguousLayouts<T> {
    type Output = Layout<T>;

    fn index(&self, i: usize) -> &Layout<T> {
        &self.layouts[i]
    }
}

/// Per-rank byte displacements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Displacements(Vec<isize>);

impl Displacements {
    pub fn zeros(n: usize) -> Self {
        Displacements(vec![0; n])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<isize> {
        self.0.get(i).copied()
    }

    pub fn as_slice(&self) -> &[isize] {
        &self.0
    }
}

impl From<Vec<isize>> for Displacements {
    fn from(v: Vec<isize>) -> Self {
        Displacements(v)
    }
}

impl FromIterator<isize> for Displacements {
    fn from_iter<I: IntoIterator<Item = isize>>(iter: I) -> Self {
        Displacements(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::is_live;

    #[test]
    fn clones_own_distinct_handles() {
        let l = Layout::<f32>::contiguous(4).unwrap();
        let ls = Layouts::filled(3, &l);
        let ids: Vec<u64> = ls.iter().filter_map(|l| l.native_handle().map(|h| h.id())).collect();
        assert_eq!(ids.len(), 3);
        let copy = ls.clone();
        let copy_ids: Vec<u64> = copy.iter().filter_map(|l| l.native_handle().map(|h| h.id())).collect();
        assert!(ids.iter().all(|id| !copy_ids.contains(id)));
        drop(ls);
        assert!(ids.iter().all(|&id| !is_live(id)));
        assert!(copy_ids.iter().all(|&id| is_live(id)));
        assert_eq!(copy[2].size(), 4);
    }

    #[test]
    fn contiguous_layouts_track_counts() {
        let mut ls = ContiguousLayouts::<f64>::from_counts(&[3, 0, 2]).unwrap();
        ls.push(4).unwrap();
        assert_eq!(ls.len(), 4);
        assert_eq!(ls.sizes(), &[3, 0, 2, 4]);
        assert_eq!(ls.total(), 9);
        assert_eq!(ls.displacements().unwrap().as_slice(), &[0, 24, 24, 40]);
        assert_eq!(ls[3].size(), 4);
        assert_eq!(ls.as_layouts().len(), 4);

        let zeros = ContiguousLayouts::<u8>::with_empty(2);
        assert_eq!(zeros.sizes(), &[0, 0]);
        assert_eq!(zeros.displacements().unwrap(), Displacements::zeros(2));
    }
}
