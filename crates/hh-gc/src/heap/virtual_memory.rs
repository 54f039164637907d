//! Per-worker virtual memory reservation.
//!
//! Each worker reserves one contiguous mapping up front
//! (`HhConfig::max_heap_size_per_worker`) and carves blocks out of it by
//! bump-allocating a block-index counter; there is no per-chunk `mmap`
//! call, and no commit/uncommit bookkeeping, because a worker's heap is
//! never shared and never needs to return pages to the OS mid-run. This
//! is a deliberate simplification of a concurrent collector's
//! reserve/commit/uncommit/multi-map lifecycle down to the single-owner
//! model this runtime needs.

use crate::error::{HhError, Result};
use crate::util::Alignment;
use memmap2::MmapMut;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single worker's heap reservation.
pub struct VirtualMemory {
    mapping: MmapMut,
    reserved_size: usize,
    next_free: AtomicUsize,
}

impl VirtualMemory {
    /// Reserves `size` bytes, rounded up to the system page size.
    pub fn reserve(size: usize) -> Result<Self> {
        let aligned = Alignment::align_up(size, page_size::get());
        let mapping = MmapMut::map_anon(aligned).map_err(|e| {
            HhError::OutOfHeap { requested: aligned, available: 0 }
                .context_from_io(e)
        })?;

        Ok(VirtualMemory {
            mapping,
            reserved_size: aligned,
            next_free: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn base_address(&self) -> usize {
        self.mapping.as_ptr() as usize
    }

    #[inline]
    pub fn reserved_size(&self) -> usize {
        self.reserved_size
    }

    /// Bump-allocates `size` bytes (aligned to `align`) from the
    /// reservation. Returns the absolute address of the new region.
    pub fn carve(&self, size: usize, align: usize) -> Result<usize> {
        let mut current = self.next_free.load(Ordering::Relaxed);
        loop {
            let aligned_offset = Alignment::align_up(current, align);
            let end = aligned_offset.saturating_add(size);
            if end > self.reserved_size {
                return Err(HhError::OutOfHeap {
                    requested: size,
                    available: self.reserved_size.saturating_sub(current),
                });
            }

            match self.next_free.compare_exchange_weak(
                current,
                end,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(self.base_address() + aligned_offset),
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    pub fn committed(&self) -> usize {
        self.next_free.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.reserved_size.saturating_sub(self.committed())
    }
}

trait WithIoContext {
    fn context_from_io(self, e: std::io::Error) -> Self;
}

impl WithIoContext for HhError {
    fn context_from_io(self, e: std::io::Error) -> Self {
        match self {
            HhError::OutOfHeap { requested, .. } => {
                log::error!("mmap reservation failed: {e}");
                HhError::OutOfHeap { requested, available: 0 }
            }
            other => other,
        }
    }
}
