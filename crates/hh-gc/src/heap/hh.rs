//! The hierarchical heap: a per-worker array of chunk lists indexed by
//! fork-join depth.

use crate::config::{HhConfig, MAX_DEPTH};
use crate::error::{HhError, Result};
use crate::heap::chunk::{ChunkArena, ChunkId, ChunkListId};
use crate::heap::virtual_memory::VirtualMemory;
use crate::util::Alignment;

/// A per-worker array `levels[0..MAX_DEPTH)` of optional chunk lists.
/// At most one `HierarchicalHeap` is current per worker; the collector
/// and allocator both address it through the worker's thread-local
/// handle (`crate::world::WorkerGc`), never through a shared reference.
pub struct HierarchicalHeap {
    worker_id: u32,
    levels: Vec<Option<ChunkListId>>,
    pub arena: ChunkArena,
    memory: VirtualMemory,
    block_size: usize,
    /// Tail of the highest non-empty level; the mutator's bump allocator
    /// caches its frontier/limit from this chunk.
    pub last_allocated_chunk: Option<ChunkId>,
    pub collection_threshold: usize,
    pub bytes_allocated_since_last_collection: usize,
}

impl HierarchicalHeap {
    pub fn new(worker_id: u32, config: &HhConfig) -> Result<Self> {
        let memory = VirtualMemory::reserve(config.max_heap_size_per_worker)?;
        Ok(HierarchicalHeap {
            worker_id,
            levels: vec![None; MAX_DEPTH as usize],
            arena: ChunkArena::new(),
            memory,
            block_size: config.block_size,
            last_allocated_chunk: None,
            collection_threshold: config.block_size * 4,
            bytes_allocated_since_last_collection: 0,
        })
    }

    #[inline]
    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn level(&self, depth: u8) -> Option<ChunkListId> {
        self.levels[depth as usize]
    }

    /// Ensures `levels[depth]` exists, creating an empty chunk list owned
    /// by this worker if necessary.
    pub fn ensure_level(&mut self, depth: u8) -> Result<ChunkListId> {
        if depth as usize >= self.levels.len() {
            return Err(HhError::ForkDepthExceeded { attempted: depth, max: MAX_DEPTH });
        }

        if let Some(id) = self.levels[depth as usize] {
            return Ok(id);
        }

        let id = self.arena.new_list(depth, self.worker_id);
        self.levels[depth as usize] = Some(id);
        Ok(id)
    }

    /// Replaces `levels[depth]` wholesale — used by the collector driver
    /// to swap a freshly-forwarded to-space in for the old level list.
    pub fn set_level(&mut self, depth: u8, list: Option<ChunkListId>) {
        self.levels[depth as usize] = list;
    }

    /// The deepest depth currently holding a non-empty chunk list.
    pub fn current_depth(&self) -> u8 {
        for depth in (0..self.levels.len()).rev() {
            if let Some(id) = self.levels[depth] {
                if !self.arena.list(id).is_empty() {
                    return depth as u8;
                }
            }
        }
        0
    }

    /// Extends the heap to at least `depth`, failing with
    /// `ForkDepthExceeded` past `MAX_DEPTH`. Corresponds to the fork-side
    /// half of the HH lifecycle: a new child scope gets its own level.
    pub fn extend_to_depth(&mut self, depth: u8) -> Result<()> {
        if depth >= MAX_DEPTH {
            return Err(HhError::ForkDepthExceeded { attempted: depth, max: MAX_DEPTH });
        }
        self.ensure_level(depth)?;
        Ok(())
    }

    /// Carves a fresh chunk sized to cover at least `min_bytes` (plus
    /// block alignment) from the worker's reservation and appends it to
    /// `levels[depth]`. Fails with `OutOfHeap` if the reservation itself
    /// is exhausted; see SPEC_FULL.md §4.A.
    pub fn allocate_chunk(&mut self, depth: u8, min_bytes: usize) -> Result<ChunkId> {
        let list = self.ensure_level(depth)?;
        let chunk_id = self.allocate_chunk_in(list, min_bytes)?;
        self.last_allocated_chunk = Some(chunk_id);
        Ok(chunk_id)
    }

    /// Carves a chunk directly into `list`, regardless of which level (if
    /// any) currently owns it. Used by the forwarding engine to grow a
    /// to-space list that isn't yet installed as `levels[depth]`.
    pub fn allocate_chunk_in(&mut self, list: ChunkListId, min_bytes: usize) -> Result<ChunkId> {
        let single_object = min_bytes > self.block_size;
        let span = Alignment::align_up(min_bytes.max(self.block_size), self.block_size);
        let start = self.memory.carve(span, self.block_size)?;
        Ok(self.arena.push_chunk(list, start, start + span, single_object))
    }

    /// Resolves the depth owning `addr`'s containing chunk, or `None` if
    /// `addr` isn't inside any of this worker's levels (the "global/root
    /// heap" case the forwarding engine treats as opaque). A production
    /// implementation would index blocks by address for O(log n)
    /// resolution; this scans chunk lists directly, which is fine given
    /// the small chunk counts a local collection actually touches.
    pub fn depth_of(&self, addr: usize) -> Option<u8> {
        self.chunk_containing(addr).map(|id| self.arena.list(self.arena.chunk(id).owner).depth)
    }

    /// Finds the chunk (from any level, not just this HH's own — the
    /// search also covers in-progress to-space lists reachable through
    /// `arena`) whose span contains `addr`.
    pub fn chunk_containing(&self, addr: usize) -> Option<ChunkId> {
        for slot in self.levels.iter() {
            let Some(list) = slot else { continue };
            for (id, chunk) in self.arena.iter_chunks(*list) {
                if addr >= chunk.start && addr < chunk.limit {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Unlinks `chunk` from whatever list currently owns it, without
    /// touching its interior — used by the single-object chunk move
    /// optimization and by level-list teardown.
    pub fn unlink_chunk(&mut self, chunk: ChunkId) {
        let (prev, next, owner) = {
            let c = self.arena.chunk(chunk);
            (c.prev, c.next, c.owner)
        };
        match prev {
            Some(p) => self.arena.chunk_mut(p).next = next,
            None => self.arena.list_mut(owner).first_chunk = next,
        }
        match next {
            Some(n) => self.arena.chunk_mut(n).prev = prev,
            None => self.arena.list_mut(owner).last_chunk = prev,
        }
        self.arena.chunk_mut(chunk).prev = None;
        self.arena.chunk_mut(chunk).next = None;
    }

    /// Appends an already-allocated chunk to the tail of `list` (used
    /// after `unlink_chunk` to re-home a moved chunk).
    pub fn append_chunk(&mut self, list: ChunkListId, chunk: ChunkId) {
        let tail = self.arena.list(list).last_chunk;
        match tail {
            Some(t) => {
                self.arena.chunk_mut(t).next = Some(chunk);
                self.arena.chunk_mut(chunk).prev = Some(t);
            }
            None => self.arena.list_mut(list).first_chunk = Some(chunk),
        }
        self.arena.list_mut(list).last_chunk = Some(chunk);
        let span = self.arena.chunk(chunk).limit - self.arena.chunk(chunk).start;
        self.arena.list_mut(list).total_bytes += span;
        self.arena.chunk_mut(chunk).owner = list;
    }

    /// Splices every chunk in `src` onto the tail of `dst`, in order,
    /// emptying `src`. See `ChunkArena::append_chunk_list` for the
    /// owner-fixup cost this carries.
    pub fn append_chunk_list(&mut self, dst: ChunkListId, src: ChunkListId) {
        self.arena.append_chunk_list(dst, src);
    }

    pub fn stats(&self) -> HhStats {
        let mut chunk_counts = [0u32; MAX_DEPTH as usize];
        for (depth, slot) in self.levels.iter().enumerate() {
            if let Some(id) = slot {
                chunk_counts[depth] = self.arena.iter_chunks(*id).count() as u32;
            }
        }
        HhStats {
            bytes_allocated_since_last_collection: self.bytes_allocated_since_last_collection,
            heap_committed: self.memory.committed(),
            heap_available: self.memory.available(),
            chunk_counts,
        }
    }
}

impl std::fmt::Debug for HierarchicalHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let occupied: Vec<u8> = self
            .levels
            .iter()
            .enumerate()
            .filter_map(|(d, l)| l.map(|_| d as u8))
            .collect();
        f.debug_struct("HierarchicalHeap")
            .field("worker_id", &self.worker_id)
            .field("occupied_levels", &occupied)
            .field("current_depth", &self.current_depth())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HhStats {
    pub bytes_allocated_since_last_collection: usize,
    pub heap_committed: usize,
    pub heap_available: usize,
    pub chunk_counts: [u32; MAX_DEPTH as usize],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HhConfig;

    fn test_config() -> HhConfig {
        let mut cfg = HhConfig::default();
        cfg.block_size = page_size::get();
        cfg.max_heap_size_per_worker = page_size::get() * 64;
        cfg
    }

    #[test]
    fn test_allocate_chunk_creates_level_and_tracks_tail() {
        let mut hh = HierarchicalHeap::new(0, &test_config()).unwrap();
        let chunk = hh.allocate_chunk(0, 64).unwrap();
        assert_eq!(hh.last_allocated_chunk, Some(chunk));
        assert!(hh.level(0).is_some());
    }

    #[test]
    fn test_extend_to_depth_rejects_past_max() {
        let mut hh = HierarchicalHeap::new(0, &test_config()).unwrap();
        assert!(hh.extend_to_depth(MAX_DEPTH).is_err());
        assert!(hh.extend_to_depth(MAX_DEPTH - 1).is_ok());
    }

    #[test]
    fn test_current_depth_reflects_highest_nonempty_level() {
        let mut hh = HierarchicalHeap::new(0, &test_config()).unwrap();
        hh.allocate_chunk(0, 64).unwrap();
        hh.allocate_chunk(3, 64).unwrap();
        assert_eq!(hh.current_depth(), 3);
    }
}
