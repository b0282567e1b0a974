//! Layout: typed, shape-only descriptions of message payloads.
//!
//! A [`Layout<T>`] describes which elements of a `[T]` buffer take part in a
//! message, without owning or borrowing that buffer. Each live layout owns
//! exactly one committed [`NativeHandle`]; cloning a layout duplicates the
//! handle and dropping it releases the handle, so layouts can be copied into
//! containers such as [`Layouts`] without double release or leaks.
//!
//! The variants form a closed set, see [`LayoutKind`]. Every structural
//! constructor has an `_of` form that uses another layout as the element
//! type, stepping by that layout's extent.
//!
//! ```rust
//! # fn try_main() -> Result<(), halo_grid::grid_error::GridError> {
//! use halo_grid::layout::Layout;
//! // every third double, four times
//! let column = Layout::<f64>::strided_vector(4, 1, 3)?;
//! assert_eq!(column.size(), 4);
//! assert_eq!(column.extent()?, 10);
//! let data: Vec<f64> = (0..12).map(f64::from).collect();
//! let bytes = column.pack(&data)?;
//! assert_eq!(bytemuck::pod_collect_to_vec::<u8, f64>(&bytes), vec![0.0, 3.0, 6.0, 9.0]);
//! # Ok(())
//! # }
//! ```

pub mod heterogeneous;
pub mod iterator;
pub mod layouts;
pub mod parameter;

pub use heterogeneous::{AbsoluteData, HeterogeneousLayout, HeterogeneousParameter, make_absolute};
pub use iterator::IteratorParameter;
pub use layouts::{ContiguousLayouts, Displacements, Layouts};
pub use parameter::{IndexedBlockParameter, IndexedParameter, SubarrayParameter};

use crate::datatype::{ArrayOrder, NativeHandle, TypeMap};
use crate::grid_error::GridError;
use bytemuck::Pod;
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

/// Structural description of a layout. Immutable after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutKind {
    /// No native handle at all.
    Null,
    /// Zero elements, zero extent.
    Empty,
    /// `count` consecutive elements.
    Contiguous { count: usize },
    /// `count` consecutive elements, without contiguous bookkeeping.
    Vector { count: usize },
    /// `count` blocks of `blocklength` elements, `stride` elements apart.
    StridedVector {
        count: usize,
        blocklength: usize,
        stride: isize,
    },
    /// Variable blocks at element displacements.
    Indexed(IndexedParameter),
    /// Variable blocks at byte displacements.
    HIndexed(IndexedParameter),
    /// Equal blocks at element displacements.
    IndexedBlock {
        blocklength: usize,
        displacements: IndexedBlockParameter,
    },
    /// Equal blocks at byte displacements.
    HIndexedBlock {
        blocklength: usize,
        displacements: IndexedBlockParameter,
    },
    /// Box inside a dense N-dimensional array.
    Subarray(SubarrayParameter),
    /// Elements picked out by reference, merged into `blocks` runs.
    Iterator { blocks: usize },
    /// Mixed-type composite; `absolute` members carry addresses.
    Heterogeneous { members: usize, absolute: bool },
}

/// Memory layout of one message item over a `[T]` buffer.
pub struct Layout<T> {
    kind: LayoutKind,
    handle: Option<NativeHandle>,
    _elem: PhantomData<fn() -> T>,
}

static_assertions::assert_impl_all!(Layout<f64>: Send, Sync, Clone);

impl<T> Layout<T> {
    /// The null layout: no handle, cannot be transferred.
    pub fn null() -> Self {
        Layout {
            kind: LayoutKind::Null,
            handle: None,
            _elem: PhantomData,
        }
    }

    pub(crate) fn from_map(kind: LayoutKind, map: TypeMap) -> Self {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        {
            use crate::debug_invariants::DebugInvariants;
            map.debug_assert_invariants();
        }
        Layout {
            kind,
            handle: Some(NativeHandle::commit(map)),
            _elem: PhantomData,
        }
    }

    #[inline]
    pub fn kind(&self) -> &LayoutKind {
        &self.kind
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.handle.is_none()
    }

    /// The committed handle, `None` for the null layout.
    #[inline]
    pub fn native_handle(&self) -> Option<&NativeHandle> {
        self.handle.as_ref()
    }

    pub fn type_map(&self) -> Result<&TypeMap, GridError> {
        self.handle
            .as_ref()
            .map(NativeHandle::type_map)
            .ok_or(GridError::NullLayout)
    }

    /// Number of data bytes carried by one item (0 for the null layout).
    pub fn byte_size(&self) -> usize {
        self.handle.as_ref().map_or(0, |h| h.type_map().size())
    }

    /// Number of `T` elements carried by one item.
    pub fn size(&self) -> usize {
        self.byte_size() / size_of::<T>().max(1)
    }

    pub fn byte_extent(&self) -> Result<isize, GridError> {
        Ok(self.type_map()?.extent())
    }

    pub fn byte_lower_bound(&self) -> Result<isize, GridError> {
        Ok(self.type_map()?.lb())
    }

    pub fn byte_upper_bound(&self) -> Result<isize, GridError> {
        Ok(self.type_map()?.ub())
    }

    pub fn true_byte_extent(&self) -> Result<isize, GridError> {
        Ok(self.type_map()?.true_extent())
    }

    pub fn true_byte_lower_bound(&self) -> Result<isize, GridError> {
        Ok(self.type_map()?.true_lb())
    }

    pub fn true_byte_upper_bound(&self) -> Result<isize, GridError> {
        Ok(self.type_map()?.true_ub())
    }

    fn to_elements(bytes: isize) -> Result<isize, GridError> {
        let element_size = size_of::<T>();
        if element_size == 0 || bytes % element_size as isize != 0 {
            return Err(GridError::InvalidDatatypeBound {
                bytes,
                element_size,
            });
        }
        Ok(bytes / element_size as isize)
    }

    /// Extent in elements of `T`.
    pub fn extent(&self) -> Result<isize, GridError> {
        Self::to_elements(self.byte_extent()?)
    }

    pub fn lower_bound(&self) -> Result<isize, GridError> {
        Self::to_elements(self.byte_lower_bound()?)
    }

    pub fn upper_bound(&self) -> Result<isize, GridError> {
        Self::to_elements(self.byte_upper_bound()?)
    }

    pub fn true_extent(&self) -> Result<isize, GridError> {
        Self::to_elements(self.true_byte_extent()?)
    }

    pub fn true_lower_bound(&self) -> Result<isize, GridError> {
        Self::to_elements(self.true_byte_lower_bound()?)
    }

    pub fn true_upper_bound(&self) -> Result<isize, GridError> {
        Self::to_elements(self.true_byte_upper_bound()?)
    }

    /// Override the byte envelope used when this layout is repeated or
    /// nested. The block structure is untouched. No-op on the null layout.
    /// A negative `extent` is rejected and leaves the layout unchanged.
    pub fn byte_resize(&mut self, lb: isize, extent: isize) -> Result<(), GridError> {
        if let Some(old) = self.handle.as_ref() {
            let map = old.type_map().resized(lb, extent)?;
            // the previous handle is released by the assignment
            *self = Self::from_map(self.kind.clone(), map);
        }
        Ok(())
    }

    /// [`byte_resize`](Self::byte_resize) in units of `T`.
    pub fn resize(&mut self, lb: isize, extent: isize) -> Result<(), GridError> {
        let s = size_of::<T>() as isize;
        let overflow = || GridError::layout("resize bounds overflow isize");
        self.byte_resize(
            lb.checked_mul(s).ok_or_else(overflow)?,
            extent.checked_mul(s).ok_or_else(overflow)?,
        )
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    fn check_transferable(&self) -> Result<&TypeMap, GridError> {
        if let LayoutKind::Heterogeneous { absolute: true, .. } = self.kind {
            return Err(GridError::layout(
                "absolute heterogeneous layouts are packed with pack_absolute",
            ));
        }
        self.type_map()
    }

    /// Shared type map for requests that outlive the borrow of `self`.
    pub(crate) fn transfer_map(&self) -> Result<Arc<TypeMap>, GridError> {
        self.check_transferable()?;
        self.handle
            .as_ref()
            .map(NativeHandle::shared_map)
            .ok_or(GridError::NullLayout)
    }
}

impl<T: Pod> Layout<T> {
    fn element() -> TypeMap {
        TypeMap::primitive(size_of::<T>())
    }

    /// Zero elements, zero extent.
    pub fn empty() -> Self {
        Self::from_map(LayoutKind::Empty, TypeMap::empty())
    }

    /// `count` consecutive elements.
    pub fn contiguous(count: usize) -> Result<Self, GridError> {
        Self::contiguous_of(count, &Self::element_layout())
    }

    pub fn contiguous_of(count: usize, l: &Layout<T>) -> Result<Self, GridError> {
        let map = TypeMap::contiguous(count, l.type_map()?)?;
        Ok(Self::from_map(LayoutKind::Contiguous { count }, map))
    }

    /// `count` consecutive elements.
    pub fn vector(count: usize) -> Result<Self, GridError> {
        let map = TypeMap::contiguous(count, &Self::element())?;
        Ok(Self::from_map(LayoutKind::Vector { count }, map))
    }

    pub fn vector_of(count: usize, l: &Layout<T>) -> Result<Self, GridError> {
        let map = TypeMap::contiguous(count, l.type_map()?)?;
        Ok(Self::from_map(LayoutKind::Vector { count }, map))
    }

    /// `count` blocks of `blocklength` elements with block starts `stride`
    /// elements apart. Blocks longer than the stride are rejected.
    pub fn strided_vector(count: usize, blocklength: usize, stride: isize) -> Result<Self, GridError> {
        Self::strided_vector_of(count, blocklength, stride, &Self::element_layout())
    }

    pub fn strided_vector_of(
        count: usize,
        blocklength: usize,
        stride: isize,
        l: &Layout<T>,
    ) -> Result<Self, GridError> {
        if count > 1 && blocklength > stride.unsigned_abs() {
            return Err(GridError::layout(format!(
                "block length {blocklength} exceeds stride {stride}"
            )));
        }
        let old = l.type_map()?;
        let byte_stride = stride
            .checked_mul(old.extent())
            .ok_or_else(|| GridError::layout("stride overflows isize"))?;
        let map = TypeMap::hvector(count, blocklength, byte_stride, old)?;
        Ok(Self::from_map(
            LayoutKind::StridedVector {
                count,
                blocklength,
                stride,
            },
            map,
        ))
    }

    /// Variable-length blocks at element displacements.
    pub fn indexed(par: &IndexedParameter) -> Result<Self, GridError> {
        Self::indexed_of(par, &Self::element_layout())
    }

    pub fn indexed_of(par: &IndexedParameter, l: &Layout<T>) -> Result<Self, GridError> {
        let old = l.type_map()?;
        let ext = old.extent();
        let blocks = par
            .iter()
            .map(|(len, d)| {
                d.checked_mul(ext)
                    .map(|bytes| (len, bytes))
                    .ok_or_else(|| GridError::layout("displacement overflows isize"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let map = TypeMap::hindexed(&blocks, old)?;
        Ok(Self::from_map(LayoutKind::Indexed(par.clone()), map))
    }

    /// Variable-length blocks at byte displacements.
    pub fn hindexed(par: &IndexedParameter) -> Result<Self, GridError> {
        Self::hindexed_of(par, &Self::element_layout())
    }

    pub fn hindexed_of(par: &IndexedParameter, l: &Layout<T>) -> Result<Self, GridError> {
        let blocks: Vec<_> = par.iter().collect();
        let map = TypeMap::hindexed(&blocks, l.type_map()?)?;
        Ok(Self::from_map(LayoutKind::HIndexed(par.clone()), map))
    }

    /// Blocks of `blocklength` elements at element displacements.
    pub fn indexed_block(blocklength: usize, par: &IndexedBlockParameter) -> Result<Self, GridError> {
        Self::indexed_block_of(blocklength, par, &Self::element_layout())
    }

    pub fn indexed_block_of(
        blocklength: usize,
        par: &IndexedBlockParameter,
        l: &Layout<T>,
    ) -> Result<Self, GridError> {
        let old = l.type_map()?;
        let ext = old.extent();
        let disps = par
            .displacements()
            .iter()
            .map(|d| {
                d.checked_mul(ext)
                    .ok_or_else(|| GridError::layout("displacement overflows isize"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let map = TypeMap::hindexed_block(blocklength, &disps, old)?;
        Ok(Self::from_map(
            LayoutKind::IndexedBlock {
                blocklength,
                displacements: par.clone(),
            },
            map,
        ))
    }

    /// Blocks of `blocklength` elements at byte displacements.
    pub fn hindexed_block(blocklength: usize, par: &IndexedBlockParameter) -> Result<Self, GridError> {
        Self::hindexed_block_of(blocklength, par, &Self::element_layout())
    }

    pub fn hindexed_block_of(
        blocklength: usize,
        par: &IndexedBlockParameter,
        l: &Layout<T>,
    ) -> Result<Self, GridError> {
        let map = TypeMap::hindexed_block(blocklength, par.displacements(), l.type_map()?)?;
        Ok(Self::from_map(
            LayoutKind::HIndexedBlock {
                blocklength,
                displacements: par.clone(),
            },
            map,
        ))
    }

    /// A box inside a dense array; zero-volume boxes give an empty layout.
    pub fn subarray(par: &SubarrayParameter) -> Result<Self, GridError> {
        Self::subarray_of(par, &Self::element_layout())
    }

    pub fn subarray_of(par: &SubarrayParameter, l: &Layout<T>) -> Result<Self, GridError> {
        let map = TypeMap::subarray(
            par.sizes(),
            par.subsizes(),
            par.starts(),
            par.order(),
            l.type_map()?,
        )?;
        Ok(Self::from_map(LayoutKind::Subarray(par.clone()), map))
    }

    /// Shorthand for a C-ordered subarray from `(size, subsize, start)`
    /// triples.
    pub fn subarray_c(dims: &[(usize, usize, usize)]) -> Result<Self, GridError> {
        let mut par: SubarrayParameter = dims.iter().copied().collect();
        par.set_order(ArrayOrder::C);
        Self::subarray(&par)
    }

    fn element_layout() -> Layout<T> {
        Self::from_map(LayoutKind::Contiguous { count: 1 }, Self::element())
    }

    /// Gather one item starting at element 0 of `data`.
    pub fn pack(&self, data: &[T]) -> Result<Vec<u8>, GridError> {
        self.pack_at(data, 0)
    }

    /// Gather one item starting `byte_offset` bytes into `data`.
    pub fn pack_at(&self, data: &[T], byte_offset: isize) -> Result<Vec<u8>, GridError> {
        self.check_transferable()?
            .pack(bytemuck::cast_slice(data), byte_offset)
    }

    /// Scatter one packed item into `data` starting at element 0.
    pub fn unpack(&self, bytes: &[u8], data: &mut [T]) -> Result<(), GridError> {
        self.unpack_at(bytes, data, 0)
    }

    pub fn unpack_at(&self, bytes: &[u8], data: &mut [T], byte_offset: isize) -> Result<(), GridError> {
        self.check_transferable()?
            .unpack(bytes, bytemuck::cast_slice_mut(data), byte_offset)
    }

    /// Element size in bytes, as a signed count.
    pub fn element_bytes() -> Result<isize, GridError> {
        isize::try_from(size_of::<T>()).map_err(|_| GridError::layout("element too large"))
    }
}

impl<T> Clone for Layout<T> {
    fn clone(&self) -> Self {
        Layout {
            kind: self.kind.clone(),
            handle: self.handle.clone(),
            _elem: PhantomData,
        }
    }
}

impl<T: Pod> Default for Layout<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> fmt::Debug for Layout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::is_live;

    fn ints(n: i32) -> Vec<i32> {
        (0..n).collect()
    }

    fn unpacked(bytes: &[u8]) -> Vec<i32> {
        bytemuck::pod_collect_to_vec(bytes)
    }

    #[test]
    fn contiguous_reports_size() {
        let l = Layout::<i32>::contiguous(7).unwrap();
        assert_eq!(l.size(), 7);
        assert_eq!(l.extent().unwrap(), 7);
        assert_eq!(l.byte_size(), 28);
    }

    #[test]
    fn strided_vector_rejects_overlapping_blocks() {
        assert!(Layout::<i32>::strided_vector(3, 4, 2).is_err());
        // a single block may be longer than the stride
        assert!(Layout::<i32>::strided_vector(1, 4, 2).is_ok());
    }

    #[test]
    fn indexed_keeps_block_order() {
        let par: IndexedParameter = [(2, 5), (1, 0)].into_iter().collect();
        let l = Layout::<i32>::indexed(&par).unwrap();
        assert_eq!(unpacked(&l.pack(&ints(8)).unwrap()), vec![5, 6, 0]);
        assert_eq!(l.lower_bound().unwrap(), 0);
        assert_eq!(l.upper_bound().unwrap(), 7);
    }

    #[test]
    fn indexed_block_and_hindexed_agree() {
        let par: IndexedBlockParameter = [6, 1].into_iter().collect();
        let a = Layout::<i32>::indexed_block(2, &par).unwrap();
        let hpar: IndexedBlockParameter = [24, 4].into_iter().collect();
        let b = Layout::<i32>::hindexed_block(2, &hpar).unwrap();
        assert_eq!(a.type_map().unwrap(), b.type_map().unwrap());
        assert_eq!(unpacked(&a.pack(&ints(8)).unwrap()), vec![6, 7, 1, 2]);
    }

    #[test]
    fn layout_of_layout_steps_by_extent() {
        let pair = Layout::<i32>::strided_vector(2, 1, 2).unwrap(); // elements 0, 2
        assert_eq!(pair.extent().unwrap(), 3);
        let rep = Layout::contiguous_of(3, &pair).unwrap();
        assert_eq!(unpacked(&rep.pack(&ints(9)).unwrap()), vec![0, 2, 3, 5, 6, 8]);
    }

    #[test]
    fn resize_preserves_leading_hole() {
        let par: IndexedParameter = [(1, 1)].into_iter().collect();
        let mut second = Layout::<i32>::indexed(&par).unwrap();
        assert_eq!(second.lower_bound().unwrap(), 1);
        let before = second.native_handle().map(|h| h.id()).unwrap();
        second.resize(0, 2).unwrap();
        assert!(!is_live(before));
        assert_eq!(second.kind(), &LayoutKind::Indexed(par));
        let every_other = Layout::contiguous_of(3, &second).unwrap();
        assert_eq!(unpacked(&every_other.pack(&ints(6)).unwrap()), vec![1, 3, 5]);
    }

    #[test]
    fn negative_resize_keeps_the_old_layout() {
        let mut l = Layout::<i32>::contiguous(3).unwrap();
        let before = l.native_handle().map(|h| h.id()).unwrap();
        assert!(matches!(l.resize(0, -1), Err(GridError::InvalidLayout(_))));
        assert!(is_live(before));
        assert_eq!(l.extent().unwrap(), 3);
        assert!(l.type_map().unwrap().lb() <= l.type_map().unwrap().ub());
    }

    #[test]
    fn huge_offsets_do_not_overflow() {
        let l = Layout::<i32>::strided_vector(2, 1, 2).unwrap();
        assert!(matches!(
            l.pack_at(&ints(4), isize::MAX - 1),
            Err(GridError::BufferOutOfBounds { .. })
        ));
        let mut out = ints(4);
        assert!(matches!(
            l.unpack_at(&[0; 8], &mut out, isize::MIN),
            Err(GridError::BufferOutOfBounds { .. })
        ));
    }

    #[test]
    fn null_layout_cannot_pack() {
        let l = Layout::<i32>::null();
        assert_eq!(l.size(), 0);
        assert_eq!(l.pack(&ints(2)), Err(GridError::NullLayout));
        let mut l2 = l.clone();
        l2.resize(0, 4).unwrap();
        assert!(l2.is_null());
    }

    #[test]
    fn element_bounds_must_divide() {
        let par: IndexedParameter = [(1, 2)].into_iter().collect();
        let l = Layout::<u32>::hindexed(&par).unwrap();
        assert_eq!(l.byte_lower_bound().unwrap(), 2);
        assert!(matches!(
            l.lower_bound(),
            Err(GridError::InvalidDatatypeBound { bytes: 2, element_size: 4 })
        ));
    }

    #[test]
    fn zero_volume_subarray_has_size_zero() {
        let l = Layout::<f64>::subarray_c(&[(5, 0, 5), (3, 3, 0)]).unwrap();
        assert_eq!(l.size(), 0);
        assert!(!l.is_null());
        assert!(l.pack(&[]).unwrap().is_empty());
    }
}
