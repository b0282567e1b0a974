//! Committed native datatype handles.
//!
//! Every [`NativeHandle`] is registered in a process-wide table when it is
//! committed and removed exactly once when it is dropped. Cloning a handle
//! duplicates it: the clone gets its own registry entry and its own lifetime,
//! so releasing one copy never invalidates another.

use super::typemap::TypeMap;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static REGISTRY: Lazy<DashMap<u64, Arc<TypeMap>>> = Lazy::new(DashMap::new);
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Owning handle to a committed datatype.
pub struct NativeHandle {
    id: u64,
    map: Arc<TypeMap>,
}

impl NativeHandle {
    /// Commit `map` and acquire a fresh handle for it.
    pub fn commit(map: TypeMap) -> Self {
        Self::register(Arc::new(map))
    }

    fn register(map: Arc<TypeMap>) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        REGISTRY.insert(id, Arc::clone(&map));
        log::trace!("commit datatype #{id} ({} bytes)", map.size());
        NativeHandle { id, map }
    }

    /// Acquire an independent handle describing the same type.
    pub fn dup(&self) -> Self {
        Self::register(Arc::clone(&self.map))
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn type_map(&self) -> &TypeMap {
        &self.map
    }

    pub(crate) fn shared_map(&self) -> Arc<TypeMap> {
        Arc::clone(&self.map)
    }
}

impl Clone for NativeHandle {
    fn clone(&self) -> Self {
        self.dup()
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if REGISTRY.remove(&self.id).is_none() {
            log::warn!("datatype #{} released twice", self.id);
        } else {
            log::trace!("free datatype #{}", self.id);
        }
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("id", &self.id)
            .field("bytes", &self.map.size())
            .finish()
    }
}

/// Whether the handle with `id` is still committed.
pub fn is_live(id: u64) -> bool {
    REGISTRY.contains_key(&id)
}
