//! Mutator bump allocator.
//!
//! `MutatorAllocator` caches `(frontier, limit, limitPlusSlop)` from the
//! current hierarchical heap so the fast path is a single
//! compare-and-advance with no lock and no indirection through the HH.
//! `SEQUENCE_METADATA_SIZE` bytes of slack are held back below the
//! chunk's true limit (`limitPlusSlop`) so a sequence allocation that
//! would otherwise straddle the chunk boundary is pushed onto the slow
//! path instead of silently overrunning it.

use crate::error::{HhError, Result};
use crate::heap::hh::HierarchicalHeap;
use crate::util::Alignment;

/// Bytes of slack reserved below a chunk's true end; see module docs.
pub const SEQUENCE_METADATA_SIZE: usize = 32;

pub struct MutatorAllocator {
    frontier: usize,
    limit: usize,
    limit_plus_slop: usize,
    /// Bytes requested by the allocation currently in the slow path, if
    /// any — mirrors the thread object's `bytesNeeded` field so the
    /// collector driver can re-check the invariant after a collection.
    bytes_needed: usize,
}

impl MutatorAllocator {
    pub fn new() -> Self {
        MutatorAllocator { frontier: 0, limit: 0, limit_plus_slop: 0, bytes_needed: 0 }
    }

    /// Fast path: a correctly aligned pointer is returned iff the bump
    /// advance fits below `limit_plus_slop`. `align` must be a power of
    /// two; callers validate object sizes before allocating.
    pub fn try_allocate(&mut self, n_bytes: usize, align: usize) -> Option<usize> {
        let aligned = Alignment::align_up(self.frontier, align);
        let end = aligned.checked_add(n_bytes)?;
        if end > self.limit_plus_slop {
            return None;
        }
        self.frontier = end;
        Some(aligned)
    }

    #[inline]
    pub fn frontier(&self) -> usize {
        self.frontier
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Non-mutating check: would `n_bytes` at `align` fit below
    /// `limitPlusSlop` without advancing the frontier? Lets a caller
    /// decide whether to collect before committing to an allocation.
    pub fn fits(&self, n_bytes: usize, align: usize) -> bool {
        let aligned = Alignment::align_up(self.frontier, align);
        aligned.checked_add(n_bytes).map(|end| end <= self.limit_plus_slop).unwrap_or(false)
    }

    /// Loads `(frontier, limit, limitPlusSlop)` from `hh`'s last
    /// allocated chunk. Called by `WorkerGc::enter_local_heap` and again
    /// after a collection or extension changes `last_allocated_chunk`.
    pub fn refresh_from(&mut self, hh: &HierarchicalHeap) -> Result<()> {
        let chunk_id = hh.last_allocated_chunk.ok_or_else(|| {
            HhError::InvariantViolated("no allocated chunk to refresh mutator frontier from".into())
        })?;
        let chunk = hh.arena.chunk(chunk_id);
        debug_assert!(
            chunk.might_contain_multiple_objects,
            "frontier must live in a chunk that allows multiple objects"
        );

        self.frontier = chunk.frontier;
        self.limit = chunk.limit;
        self.limit_plus_slop = chunk.limit.saturating_sub(SEQUENCE_METADATA_SIZE);
        Ok(())
    }

    /// Writes the cached frontier back into the owning chunk. Called by
    /// `WorkerGc::exit_local_heap` so the HH's view of the chunk stays
    /// consistent once the mutator stops allocating into it.
    pub fn flush_into(&self, hh: &mut HierarchicalHeap) -> Result<()> {
        let chunk_id = hh.last_allocated_chunk.ok_or_else(|| {
            HhError::InvariantViolated("no allocated chunk to flush mutator frontier into".into())
        })?;
        hh.arena.chunk_mut(chunk_id).frontier = self.frontier;
        Ok(())
    }

    pub fn set_bytes_needed(&mut self, n: usize) {
        self.bytes_needed = n;
    }

    pub fn bytes_needed(&self) -> usize {
        self.bytes_needed
    }

    /// `bytesNeeded ≤ limitPlusSlop − frontier` — the first invariant
    /// named in SPEC_FULL.md §3.
    pub fn invariant_holds(&self) -> bool {
        self.bytes_needed <= self.limit_plus_slop.saturating_sub(self.frontier)
    }
}

impl Default for MutatorAllocator {
    fn default() -> Self {
        Self::new()
    }
}
