//! Heterogeneous (mixed-type) layouts.
//!
//! A heterogeneous layout places members of different element types at byte
//! displacements. In relative mode the displacements are measured from the
//! start of a record, and the layout packs and unpacks that record's bytes.
//! In absolute mode every member carries the address of its own data; such
//! layouts can only be moved through the `unsafe` absolute entry points.

use super::{Layout, LayoutKind};
use crate::datatype::TypeMap;
use crate::grid_error::GridError;
use bytemuck::Pod;
use std::mem::size_of;
use std::sync::Arc;

/// Heterogeneous layouts are byte-typed.
pub type HeterogeneousLayout = Layout<u8>;

/// A layout bound to the address of the data it describes.
#[derive(Clone, Debug)]
pub struct AbsoluteData {
    addr: isize,
    map: Arc<TypeMap>,
}

impl AbsoluteData {
    pub fn address(&self) -> isize {
        self.addr
    }
}

/// Bind `layout` to the object at `ptr`.
///
/// The pointer is only recorded here; it is dereferenced by
/// [`Layout::pack_absolute`] and [`Layout::unpack_absolute`].
pub fn make_absolute<V>(ptr: *const V, layout: &Layout<V>) -> Result<AbsoluteData, GridError> {
    let handle = layout.native_handle().ok_or(GridError::NullLayout)?;
    Ok(AbsoluteData {
        addr: ptr as isize,
        map: handle.shared_map(),
    })
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Relative,
    Absolute,
}

/// Ordered `(byte displacement, member type)` entries of a heterogeneous
/// layout.
#[derive(Clone, Debug, Default)]
pub struct HeterogeneousParameter {
    members: Vec<(isize, Arc<TypeMap>)>,
    mode: Option<Mode>,
}

impl HeterogeneousParameter {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&mut self, mode: Mode) -> Result<(), GridError> {
        match self.mode {
            Some(m) if m != mode => Err(GridError::layout(
                "relative and absolute members cannot be mixed",
            )),
            _ => {
                self.mode = Some(mode);
                Ok(())
            }
        }
    }

    /// One value of type `V` at `byte_offset` from the record start.
    pub fn add_value<V: Pod>(&mut self, byte_offset: isize) -> Result<&mut Self, GridError> {
        self.enter(Mode::Relative)?;
        self.members
            .push((byte_offset, Arc::new(TypeMap::primitive(size_of::<V>()))));
        Ok(self)
    }

    /// The field `field` of `record`, located by address.
    pub fn add_field<R, F: Pod>(&mut self, record: &R, field: &F) -> Result<&mut Self, GridError> {
        let base = record as *const R as isize;
        let offset = (field as *const F as isize).wrapping_sub(base);
        let fits = offset >= 0 && offset as usize + size_of::<F>() <= size_of::<R>();
        if !fits {
            return Err(GridError::layout(format!(
                "field at offset {offset} does not lie inside a {}-byte record",
                size_of::<R>()
            )));
        }
        self.add_value::<F>(offset)
    }

    /// One item of `layout` at `byte_offset` from the record start.
    pub fn add_layout<V>(&mut self, byte_offset: isize, layout: &Layout<V>) -> Result<&mut Self, GridError> {
        let handle = layout.native_handle().ok_or(GridError::NullLayout)?;
        self.enter(Mode::Relative)?;
        self.members.push((byte_offset, handle.shared_map()));
        Ok(self)
    }

    pub fn add_absolute(&mut self, data: AbsoluteData) -> Result<&mut Self, GridError> {
        self.enter(Mode::Absolute)?;
        self.members.push((data.addr, data.map));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.mode == Some(Mode::Absolute)
    }
}

impl Layout<u8> {
    /// Build a heterogeneous layout; its extent spans all members.
    pub fn heterogeneous(par: &HeterogeneousParameter) -> Result<Self, GridError> {
        let members: Vec<(isize, &TypeMap)> = par
            .members
            .iter()
            .map(|(disp, map)| (*disp, map.as_ref()))
            .collect();
        let map = TypeMap::structure(&members)?;
        Ok(Self::from_map(
            LayoutKind::Heterogeneous {
                members: par.len(),
                absolute: par.is_absolute(),
            },
            map,
        ))
    }

    fn absolute_map(&self) -> Result<&TypeMap, GridError> {
        match self.kind() {
            LayoutKind::Heterogeneous { absolute: true, .. } => self.type_map(),
            _ => Err(GridError::layout("layout does not use absolute addresses")),
        }
    }

    /// Pack the bytes of `record` described by a relative layout.
    pub fn pack_record<R: Pod>(&self, record: &R) -> Result<Vec<u8>, GridError> {
        self.pack(bytemuck::bytes_of(record))
    }

    /// Unpack `bytes` into `record` through a relative layout.
    pub fn unpack_record<R: Pod>(&self, bytes: &[u8], record: &mut R) -> Result<(), GridError> {
        self.unpack(bytes, bytemuck::bytes_of_mut(record))
    }

    /// Gather every member of an absolute layout.
    ///
    /// # Safety
    /// Every address passed to [`make_absolute`] must still point to live,
    /// readable data of the bound layout's shape.
    pub unsafe fn pack_absolute(&self) -> Result<Vec<u8>, GridError> {
        let map = self.absolute_map()?;
        // SAFETY: forwarded to the caller.
        Ok(unsafe { map.pack_absolute() })
    }

    /// Scatter `bytes` into every member of an absolute layout.
    ///
    /// # Safety
    /// Every address passed to [`make_absolute`] must still point to live,
    /// writable data that no reference observes during the call.
    pub unsafe fn unpack_absolute(&self, bytes: &[u8]) -> Result<(), GridError> {
        let map = self.absolute_map()?;
        // SAFETY: forwarded to the caller.
        unsafe { map.unpack_absolute(bytes) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
    struct Particle {
        x: f64,
        id: u32,
        tag: u32,
    }

    #[test]
    fn relative_layout_skips_unlisted_fields() {
        let p = Particle { x: 1.5, id: 7, tag: 9 };
        let mut par = HeterogeneousParameter::new();
        par.add_field(&p, &p.x).unwrap().add_field(&p, &p.tag).unwrap();
        let l = HeterogeneousLayout::heterogeneous(&par).unwrap();
        assert_eq!(l.byte_size(), 12);
        let bytes = l.pack_record(&p).unwrap();
        let mut q = Particle::default();
        l.unpack_record(&bytes, &mut q).unwrap();
        assert_eq!(q, Particle { x: 1.5, id: 0, tag: 9 });
    }

    #[test]
    fn add_field_rejects_foreign_field() {
        let p = Particle::default();
        let other = 3u32;
        let mut par = HeterogeneousParameter::new();
        assert!(par.add_field(&p, &other).is_err());
    }

    #[test]
    fn modes_do_not_mix() {
        let v = [1i32, 2, 3];
        let l = Layout::<i32>::contiguous(3).unwrap();
        let mut par = HeterogeneousParameter::new();
        par.add_value::<u64>(0).unwrap();
        let abs = make_absolute(v.as_ptr(), &l).unwrap();
        assert!(matches!(par.add_absolute(abs), Err(GridError::InvalidLayout(_))));
    }

    #[test]
    fn absolute_layout_round_trip() {
        let a = [1.0f64, 2.0];
        let b = 42u16;
        let mut par = HeterogeneousParameter::new();
        par.add_absolute(make_absolute(a.as_ptr(), &Layout::<f64>::contiguous(2).unwrap()).unwrap())
            .unwrap()
            .add_absolute(make_absolute(&b as *const u16, &Layout::<u16>::contiguous(1).unwrap()).unwrap())
            .unwrap();
        let l = HeterogeneousLayout::heterogeneous(&par).unwrap();
        assert!(l.pack(&[0u8; 64]).is_err());
        let bytes = unsafe { l.pack_absolute() }.unwrap();
        assert_eq!(bytes.len(), 18);

        let mut a2 = [0.0f64; 2];
        let mut b2 = 0u16;
        let mut par2 = HeterogeneousParameter::new();
        par2.add_absolute(make_absolute(a2.as_mut_ptr().cast_const(), &Layout::<f64>::contiguous(2).unwrap()).unwrap())
            .unwrap()
            .add_absolute(make_absolute(&mut b2 as *mut u16 as *const u16, &Layout::<u16>::contiguous(1).unwrap()).unwrap())
            .unwrap();
        let l2 = HeterogeneousLayout::heterogeneous(&par2).unwrap();
        unsafe { l2.unpack_absolute(&bytes) }.unwrap();
        assert_eq!(a2, a);
        assert_eq!(b2, 42);
    }
}
