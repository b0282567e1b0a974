//! TypeMap: the flattened, byte-exact description of a derived datatype.
//!
//! A `TypeMap` is what a committed native datatype boils down to: an ordered
//! list of byte blocks at signed offsets relative to a base address, plus the
//! lower/upper bound markers used when the type is repeated or nested inside
//! another type. Block order is message order (the order in which bytes are
//! packed), not address order.
//!
//! Bound rules follow the usual derived-datatype semantics: for every placed
//! instance of an element type at displacement `d`, the new lower bound is
//! `min(d + lb_old)` and the new upper bound is `max(d + ub_old)`. Subarray
//! types span the whole enclosing array (`lb = 0`, `extent = Π sizes · ext`).

use crate::debug_invariants::DebugInvariants;
use crate::grid_error::GridError;
use serde::{Deserialize, Serialize};

/// A run of `len` bytes starting at `offset` bytes from the base address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub offset: isize,
    pub len: usize,
}

impl Block {
    #[inline]
    pub fn end(&self) -> isize {
        self.offset + self.len as isize
    }
}

/// Storage order of a multi-dimensional array.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayOrder {
    /// Row-major: the last dimension varies fastest.
    #[default]
    C,
    /// Column-major: the first dimension varies fastest.
    Fortran,
}

/// Flattened datatype: byte blocks in message order plus bound markers.
///
/// # Invariants
/// - every block has `len > 0`,
/// - adjacent blocks in message order are never address-contiguous
///   (they are coalesced on construction),
/// - `lb <= ub`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeMap {
    blocks: Vec<Block>,
    lb: isize,
    ub: isize,
}

fn overflow() -> GridError {
    GridError::layout("displacement arithmetic overflows isize")
}

fn to_isize(v: usize) -> Result<isize, GridError> {
    isize::try_from(v).map_err(|_| overflow())
}

fn mul(a: isize, b: isize) -> Result<isize, GridError> {
    a.checked_mul(b).ok_or_else(overflow)
}

fn add(a: isize, b: isize) -> Result<isize, GridError> {
    a.checked_add(b).ok_or_else(overflow)
}

/// Accumulates placed element instances into a new `TypeMap`.
#[derive(Default)]
struct Assembler {
    blocks: Vec<Block>,
    bounds: Option<(isize, isize)>,
}

impl Assembler {
    fn push(&mut self, offset: isize, len: usize) {
        if len == 0 {
            return;
        }
        if let Some(last) = self.blocks.last_mut() {
            if last.end() == offset {
                last.len += len;
                return;
            }
        }
        self.blocks.push(Block { offset, len });
    }

    fn widen(&mut self, lo: isize, hi: isize) {
        self.bounds = Some(match self.bounds {
            None => (lo, hi),
            Some((l, h)) => (l.min(lo), h.max(hi)),
        });
    }

    /// Place `n` consecutive instances of `old`, the first at `disp`.
    fn place_run(&mut self, old: &TypeMap, disp: isize, n: usize) -> Result<(), GridError> {
        if n == 0 {
            return Ok(());
        }
        let ext = old.extent();
        let last = add(disp, mul(to_isize(n - 1)?, ext)?)?;
        if old.is_dense() {
            let bytes = old.size().checked_mul(n).ok_or_else(overflow)?;
            self.push(add(disp, old.lb)?, bytes);
        } else {
            for k in 0..n {
                let d = disp + k as isize * ext;
                for b in &old.blocks {
                    self.push(add(b.offset, d)?, b.len);
                }
            }
        }
        // extents are never negative, so the last instance bounds the top
        self.widen(add(disp, old.lb)?, add(last, old.ub)?);
        Ok(())
    }

    fn finish(self) -> TypeMap {
        let (lb, ub) = self.bounds.unwrap_or((0, 0));
        TypeMap {
            blocks: self.blocks,
            lb,
            ub,
        }
    }
}

impl TypeMap {
    /// One opaque element of `size` bytes.
    pub fn primitive(size: usize) -> Self {
        let mut a = Assembler::default();
        a.push(0, size);
        TypeMap {
            blocks: a.blocks,
            lb: 0,
            ub: size as isize,
        }
    }

    /// No data, zero extent.
    pub fn empty() -> Self {
        TypeMap {
            blocks: Vec::new(),
            lb: 0,
            ub: 0,
        }
    }

    /// `count` consecutive copies of `old`.
    pub fn contiguous(count: usize, old: &TypeMap) -> Result<Self, GridError> {
        let mut a = Assembler::default();
        a.place_run(old, 0, count)?;
        Ok(a.finish())
    }

    /// `count` blocks of `blocklength` copies of `old`, successive blocks
    /// starting `stride` *bytes* apart.
    pub fn hvector(
        count: usize,
        blocklength: usize,
        stride: isize,
        old: &TypeMap,
    ) -> Result<Self, GridError> {
        let mut a = Assembler::default();
        for i in 0..count {
            a.place_run(old, mul(to_isize(i)?, stride)?, blocklength)?;
        }
        Ok(a.finish())
    }

    /// Variable-length blocks of `old` at byte displacements.
    pub fn hindexed(blocks: &[(usize, isize)], old: &TypeMap) -> Result<Self, GridError> {
        let mut a = Assembler::default();
        for &(len, disp) in blocks {
            a.place_run(old, disp, len)?;
        }
        Ok(a.finish())
    }

    /// Equal-length blocks of `old` at byte displacements.
    pub fn hindexed_block(
        blocklength: usize,
        displacements: &[isize],
        old: &TypeMap,
    ) -> Result<Self, GridError> {
        let mut a = Assembler::default();
        for &disp in displacements {
            a.place_run(old, disp, blocklength)?;
        }
        Ok(a.finish())
    }

    /// A `subsizes` box at `starts` inside a dense `sizes` array of `old`.
    ///
    /// A box with zero volume yields [`TypeMap::empty`].
    pub fn subarray(
        sizes: &[usize],
        subsizes: &[usize],
        starts: &[usize],
        order: ArrayOrder,
        old: &TypeMap,
    ) -> Result<Self, GridError> {
        let n = sizes.len();
        if n == 0 {
            return Err(GridError::layout("subarray needs at least one dimension"));
        }
        if subsizes.len() != n || starts.len() != n {
            return Err(GridError::layout(format!(
                "subarray parameter lengths differ: sizes {}, subsizes {}, starts {}",
                n,
                subsizes.len(),
                starts.len()
            )));
        }
        if subsizes.iter().any(|&s| s == 0) {
            return Ok(TypeMap::empty());
        }
        for d in 0..n {
            let end = starts[d].checked_add(subsizes[d]).ok_or_else(overflow)?;
            if end > sizes[d] {
                return Err(GridError::layout(format!(
                    "subarray box [{}, {}) exceeds size {} in dimension {}",
                    starts[d], end, sizes[d], d
                )));
            }
        }
        // axes ordered fastest first
        let axes: Vec<usize> = match order {
            ArrayOrder::C => (0..n).rev().collect(),
            ArrayOrder::Fortran => (0..n).collect(),
        };
        let mut stride = vec![0isize; n];
        let mut acc: isize = 1;
        for &ax in &axes {
            stride[ax] = acc;
            acc = mul(acc, to_isize(sizes[ax])?)?;
        }
        let total = acc;
        let ext = old.extent();
        let fast = axes[0];

        let mut a = Assembler::default();
        let mut idx = vec![0usize; n];
        'rows: loop {
            let mut elem = 0isize;
            for d in 0..n {
                let at = if d == fast { starts[d] } else { starts[d] + idx[d] };
                elem = add(elem, mul(to_isize(at)?, stride[d])?)?;
            }
            a.place_run(old, mul(elem, ext)?, subsizes[fast])?;
            for &ax in &axes[1..] {
                idx[ax] += 1;
                if idx[ax] < subsizes[ax] {
                    continue 'rows;
                }
                idx[ax] = 0;
            }
            break;
        }
        let mut map = a.finish();
        map.lb = 0;
        map.ub = mul(total, ext)?;
        Ok(map)
    }

    /// Heterogeneous composite: each member placed once at its byte
    /// displacement.
    pub fn structure(members: &[(isize, &TypeMap)]) -> Result<Self, GridError> {
        let mut a = Assembler::default();
        for &(disp, old) in members {
            a.place_run(old, disp, 1)?;
        }
        Ok(a.finish())
    }

    /// Same blocks, new bound markers. `extent` must not be negative.
    pub fn resized(&self, lb: isize, extent: isize) -> Result<Self, GridError> {
        if extent < 0 {
            return Err(GridError::layout(format!("negative extent {extent}")));
        }
        Ok(TypeMap {
            blocks: self.blocks.clone(),
            lb,
            ub: add(lb, extent)?,
        })
    }

    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[inline]
    pub fn lb(&self) -> isize {
        self.lb
    }

    #[inline]
    pub fn ub(&self) -> isize {
        self.ub
    }

    #[inline]
    pub fn extent(&self) -> isize {
        self.ub - self.lb
    }

    /// Lowest byte actually touched (0 for a type without data).
    pub fn true_lb(&self) -> isize {
        self.blocks.iter().map(|b| b.offset).min().unwrap_or(0)
    }

    /// One past the highest byte actually touched (0 for a type without data).
    pub fn true_ub(&self) -> isize {
        self.blocks.iter().map(Block::end).max().unwrap_or(0)
    }

    pub fn true_extent(&self) -> isize {
        self.true_ub() - self.true_lb()
    }

    /// Number of data bytes carried by one instance.
    pub fn size(&self) -> usize {
        self.blocks.iter().map(|b| b.len).sum()
    }

    /// A single block exactly spanning `[lb, ub)`.
    pub fn is_dense(&self) -> bool {
        match self.blocks.as_slice() {
            [b] => b.offset == self.lb && b.end() == self.ub,
            _ => false,
        }
    }

    /// Check that one instance placed at `base` stays inside `len` bytes.
    pub fn check_bounds(&self, base: isize, len: usize) -> Result<(), GridError> {
        if self.blocks.is_empty() {
            return Ok(());
        }
        let (lower, upper) = match (base.checked_add(self.true_lb()), base.checked_add(self.true_ub())) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => {
                return Err(GridError::BufferOutOfBounds {
                    lower: base.saturating_add(self.true_lb()),
                    upper: base.saturating_add(self.true_ub()),
                    len,
                });
            }
        };
        if lower < 0 || upper > len as isize {
            return Err(GridError::BufferOutOfBounds { lower, upper, len });
        }
        Ok(())
    }

    /// Append the bytes of one instance at `base` inside `src` to `out`.
    pub fn pack_into(&self, src: &[u8], base: isize, out: &mut Vec<u8>) -> Result<(), GridError> {
        self.check_bounds(base, src.len())?;
        out.reserve(self.size());
        for b in &self.blocks {
            let start = (base + b.offset) as usize;
            out.extend_from_slice(&src[start..start + b.len]);
        }
        Ok(())
    }

    /// Gather one instance at `base` inside `src` into a fresh buffer.
    pub fn pack(&self, src: &[u8], base: isize) -> Result<Vec<u8>, GridError> {
        let mut out = Vec::with_capacity(self.size());
        self.pack_into(src, base, &mut out)?;
        Ok(out)
    }

    /// Scatter packed `bytes` into one instance at `base` inside `dst`.
    pub fn unpack(&self, bytes: &[u8], dst: &mut [u8], base: isize) -> Result<(), GridError> {
        if bytes.len() != self.size() {
            return Err(GridError::InvalidSize {
                expected: self.size(),
                found: bytes.len(),
            });
        }
        self.check_bounds(base, dst.len())?;
        let mut cursor = 0usize;
        for b in &self.blocks {
            let start = (base + b.offset) as usize;
            dst[start..start + b.len].copy_from_slice(&bytes[cursor..cursor + b.len]);
            cursor += b.len;
        }
        Ok(())
    }

    /// Gather bytes from absolute addresses (block offsets are addresses).
    ///
    /// # Safety
    /// Every block must describe readable memory that stays valid for the
    /// duration of the call.
    pub unsafe fn pack_absolute(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        for b in &self.blocks {
            // SAFETY: guaranteed by the caller.
            let src = unsafe { std::slice::from_raw_parts(b.offset as *const u8, b.len) };
            out.extend_from_slice(src);
        }
        out
    }

    /// Scatter bytes to absolute addresses (block offsets are addresses).
    ///
    /// # Safety
    /// Every block must describe writable memory that is not aliased by a
    /// live reference for the duration of the call.
    pub unsafe fn unpack_absolute(&self, bytes: &[u8]) -> Result<(), GridError> {
        if bytes.len() != self.size() {
            return Err(GridError::InvalidSize {
                expected: self.size(),
                found: bytes.len(),
            });
        }
        let mut cursor = 0usize;
        for b in &self.blocks {
            // SAFETY: guaranteed by the caller.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes[cursor..].as_ptr(),
                    b.offset as *mut u8,
                    b.len,
                );
            }
            cursor += b.len;
        }
        Ok(())
    }
}

impl DebugInvariants for TypeMap {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "TypeMap");
    }

    fn validate_invariants(&self) -> Result<(), GridError> {
        if self.lb > self.ub {
            return Err(GridError::layout(format!(
                "lower bound {} above upper bound {}",
                self.lb, self.ub
            )));
        }
        for w in self.blocks.windows(2) {
            if w[0].end() == w[1].offset {
                return Err(GridError::layout("adjacent blocks were not coalesced"));
            }
        }
        if self.blocks.iter().any(|b| b.len == 0) {
            return Err(GridError::layout("zero-length block"));
        }
        Ok(())
    }
}
