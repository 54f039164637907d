//! GC-managed object model: headers, type tags, and the pointer types
//! used to address objects inside a hierarchical heap.

pub mod header;

pub use header::{Header, ObjectFields, TypeTag, HEADER_SIZE, OBJECT_ALIGNMENT};

use std::num::NonZeroUsize;

/// An address inside a worker's heap reservation. Wrapped rather than a
/// raw pointer so the copying collector's pointer-rewriting passes are
/// forced through explicit, auditable `unsafe` conversions instead of
/// letting raw pointers flow silently through safe APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapPointer(NonZeroUsize);

impl HeapPointer {
    /// # Safety
    /// `addr` must be a nonzero address of a live object header inside
    /// some worker's heap.
    pub unsafe fn from_addr(addr: usize) -> Self {
        HeapPointer(NonZeroUsize::new(addr).expect("heap pointer must be nonzero"))
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0.get()
    }

    /// # Safety
    /// The returned pointer is only valid as long as the owning heap
    /// region is alive and this object hasn't been forwarded away.
    pub unsafe fn as_header(self) -> *const Header {
        self.0.get() as *const Header
    }

    /// # Safety
    /// Same caveats as `as_header`, plus the usual aliasing requirements
    /// of an exclusive reference.
    pub unsafe fn as_header_mut(self) -> *mut Header {
        self.0.get() as *mut Header
    }

    #[inline]
    pub fn data_start(self) -> usize {
        self.0.get() + HEADER_SIZE
    }
}
