//! Chunks and chunk lists.
//!
//! A chunk is one or more contiguous blocks managed as a single bump-
//! allocation arena. Chunks are threaded into doubly-linked chunk lists
//! sharing a depth; a level-head chunk list additionally owns a
//! remembered set (itself a chunk list) and tracks whether it is
//! currently a to-space under construction.
//!
//! Ownership here is cyclic by nature — a chunk points back to the level
//! head it belongs to, and a level head points forward to its first and
//! last chunk — which doesn't fit naturally into Rust's ownership model
//! as raw pointers or `Rc`. Per the design notes, both are addressed by
//! arena index instead: `Chunk`/`ChunkList` live in flat `Vec`s owned by
//! the `HierarchicalHeap`, and `ChunkId`/`ChunkListId` are `Copy` handles
//! into those vecs, so "ownership" is just index validity, checked by the
//! arena rather than the borrow checker.

pub const CHUNK_MAGIC: u32 = 0xC807_5E17;

/// Sentinel owner used by a level list that belongs to the collector
/// itself rather than any mutator-visible `HierarchicalHeap` — used
/// while a to-space is still under construction and has not yet been
/// swapped into its owning HH.
pub const COPY_OBJECT_HH: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkListId(pub u32);

/// One contiguous allocation arena spanning one or more blocks.
#[derive(Debug)]
pub struct Chunk {
    pub magic: u32,
    pub start: usize,
    pub limit: usize,
    pub frontier: usize,
    pub prev: Option<ChunkId>,
    pub next: Option<ChunkId>,
    /// `false` for a chunk dedicated to a single object larger than one
    /// block — such chunks are never split and are relocated by pointer
    /// move rather than memcpy (the "single-object chunk move"
    /// optimization).
    pub might_contain_multiple_objects: bool,
    /// Back-link to the level-head chunk list this chunk is threaded
    /// into.
    pub owner: ChunkListId,
}

impl Chunk {
    pub fn new(start: usize, limit: usize, owner: ChunkListId, single_object: bool) -> Self {
        Chunk {
            magic: CHUNK_MAGIC,
            start,
            limit,
            frontier: start,
            prev: None,
            next: None,
            might_contain_multiple_objects: !single_object,
            owner,
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.frontier)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.limit - self.start
    }

    #[inline]
    pub fn bytes_used(&self) -> usize {
        self.frontier - self.start
    }
}

/// A sequence of chunks sharing a depth. Level heads additionally carry
/// depth, owning-HH, to-space status, and an optional remembered set.
#[derive(Debug)]
pub struct ChunkList {
    pub depth: u8,
    /// Worker id of the owning `HierarchicalHeap`, or `COPY_OBJECT_HH`
    /// while this list is an in-progress to-space not yet installed.
    pub owning_hh: u32,
    pub is_in_to_space: bool,
    pub remembered_set: Option<ChunkListId>,
    pub first_chunk: Option<ChunkId>,
    pub last_chunk: Option<ChunkId>,
    pub total_bytes: usize,
}

impl ChunkList {
    pub fn new(depth: u8, owning_hh: u32) -> Self {
        ChunkList {
            depth,
            owning_hh,
            is_in_to_space: false,
            remembered_set: None,
            first_chunk: None,
            last_chunk: None,
            total_bytes: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_chunk.is_none()
    }
}

/// Entry recorded in a remembered set: a down-pointer from a shallower
/// level's field into a deeper level's object.
#[derive(Debug, Clone, Copy)]
pub struct RemSetEntry {
    pub source: crate::object::HeapPointer,
    /// Byte offset of the pointer field within `source`.
    pub field_offset: usize,
    pub target: crate::object::HeapPointer,
}

/// Flat arena owning every chunk and chunk list belonging to one worker's
/// heap. Indices are stable for the lifetime of the arena; entries are
/// never removed, only unlinked from their list and left for reuse by
/// `ChunkArena::recycle` (appended to the allocator's free list rather
/// than freed, so discarded old lists become the first thing reused by
/// the next chunk request).
#[derive(Debug, Default)]
pub struct ChunkArena {
    chunks: Vec<Chunk>,
    lists: Vec<ChunkList>,
    free_chunks: Vec<ChunkId>,
}

impl ChunkArena {
    pub fn new() -> Self {
        ChunkArena::default()
    }

    pub fn new_list(&mut self, depth: u8, owning_hh: u32) -> ChunkListId {
        let id = ChunkListId(self.lists.len() as u32);
        self.lists.push(ChunkList::new(depth, owning_hh));
        id
    }

    pub fn list(&self, id: ChunkListId) -> &ChunkList {
        &self.lists[id.0 as usize]
    }

    pub fn list_mut(&mut self, id: ChunkListId) -> &mut ChunkList {
        &mut self.lists[id.0 as usize]
    }

    pub fn chunk(&self, id: ChunkId) -> &Chunk {
        &self.chunks[id.0 as usize]
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> &mut Chunk {
        &mut self.chunks[id.0 as usize]
    }

    /// Appends a new chunk spanning `[start, limit)` to `list`.
    pub fn push_chunk(
        &mut self,
        list: ChunkListId,
        start: usize,
        limit: usize,
        single_object: bool,
    ) -> ChunkId {
        let id = if let Some(reused) = self.free_chunks.pop() {
            *self.chunk_mut(reused) = Chunk::new(start, limit, list, single_object);
            reused
        } else {
            let id = ChunkId(self.chunks.len() as u32);
            self.chunks.push(Chunk::new(start, limit, list, single_object));
            id
        };

        let tail = self.list(list).last_chunk;
        if let Some(tail_id) = tail {
            self.chunk_mut(tail_id).next = Some(id);
            self.chunk_mut(id).prev = Some(tail_id);
        } else {
            self.list_mut(list).first_chunk = Some(id);
        }
        self.list_mut(list).last_chunk = Some(id);
        self.list_mut(list).total_bytes += limit - start;

        id
    }

    /// Unlinks every chunk in `list` and returns them to the free pool,
    /// leaving `list` empty. Called when a level list is discarded after
    /// a collection swaps in its to-space.
    pub fn recycle_list(&mut self, list: ChunkListId) {
        let mut cursor = self.list(list).first_chunk;
        while let Some(id) = cursor {
            cursor = self.chunk(id).next;
            self.free_chunks.push(id);
        }
        let entry = self.list_mut(list);
        entry.first_chunk = None;
        entry.last_chunk = None;
        entry.total_bytes = 0;
    }

    /// Iterates a chunk list's chunks from head to tail.
    pub fn iter_chunks(&self, list: ChunkListId) -> ChunkIter<'_> {
        ChunkIter { arena: self, cursor: self.list(list).first_chunk }
    }

    /// Moves every chunk in `src` onto the tail of `dst`, in order,
    /// leaving `src` empty. The head/tail relinking is O(1); each moved
    /// chunk's `owner` back-link is also repointed to `dst` so a later
    /// `unlink_chunk`/`depth_of` call doesn't walk into `src`'s now-stale
    /// head/tail fields, which costs O(chunks in src) — the same
    /// small-chunk-count tradeoff `HierarchicalHeap::chunk_containing`
    /// already makes.
    pub fn append_chunk_list(&mut self, dst: ChunkListId, src: ChunkListId) {
        let Some(src_first) = self.list(src).first_chunk else { return };
        let src_last = self.list(src).last_chunk.expect("non-empty list must have a last_chunk");
        let src_bytes = self.list(src).total_bytes;

        let mut cursor = Some(src_first);
        while let Some(id) = cursor {
            cursor = self.chunk(id).next;
            self.chunk_mut(id).owner = dst;
        }

        match self.list(dst).last_chunk {
            Some(tail) => {
                self.chunk_mut(tail).next = Some(src_first);
                self.chunk_mut(src_first).prev = Some(tail);
            }
            None => {
                self.list_mut(dst).first_chunk = Some(src_first);
            }
        }
        self.list_mut(dst).last_chunk = Some(src_last);
        self.list_mut(dst).total_bytes += src_bytes;

        let src_list = self.list_mut(src);
        src_list.first_chunk = None;
        src_list.last_chunk = None;
        src_list.total_bytes = 0;
    }
}

pub struct ChunkIter<'a> {
    arena: &'a ChunkArena,
    cursor: Option<ChunkId>,
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = (ChunkId, &'a Chunk);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let chunk = self.arena.chunk(id);
        self.cursor = chunk.next;
        Some((id, chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_chunk_links_tail() {
        let mut arena = ChunkArena::new();
        let list = arena.new_list(0, 0);
        let a = arena.push_chunk(list, 0x1000, 0x2000, false);
        let b = arena.push_chunk(list, 0x2000, 0x3000, false);

        assert_eq!(arena.chunk(a).next, Some(b));
        assert_eq!(arena.chunk(b).prev, Some(a));
        assert_eq!(arena.list(list).first_chunk, Some(a));
        assert_eq!(arena.list(list).last_chunk, Some(b));
        assert_eq!(arena.list(list).total_bytes, 0x2000);
    }

    #[test]
    fn test_recycle_list_empties_and_frees() {
        let mut arena = ChunkArena::new();
        let list = arena.new_list(2, 0);
        arena.push_chunk(list, 0, 0x1000, false);
        arena.push_chunk(list, 0x1000, 0x2000, false);

        arena.recycle_list(list);
        assert!(arena.list(list).is_empty());
        assert_eq!(arena.list(list).total_bytes, 0);

        // freed chunk ids get reused by subsequent pushes
        let other = arena.new_list(3, 0);
        let reused = arena.push_chunk(other, 0x5000, 0x6000, false);
        assert!(reused.0 < 2);
    }

    #[test]
    fn test_iter_chunks_visits_head_to_tail() {
        let mut arena = ChunkArena::new();
        let list = arena.new_list(1, 0);
        let a = arena.push_chunk(list, 0, 0x1000, false);
        let b = arena.push_chunk(list, 0x1000, 0x2000, false);
        let ids: Vec<_> = arena.iter_chunks(list).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_append_chunk_list_splices_in_order_and_empties_src() {
        let mut arena = ChunkArena::new();
        let dst = arena.new_list(0, 0);
        let src = arena.new_list(0, 0);
        let a = arena.push_chunk(dst, 0x1000, 0x2000, false);
        let b = arena.push_chunk(src, 0x2000, 0x3000, false);
        let c = arena.push_chunk(src, 0x3000, 0x4000, false);

        arena.append_chunk_list(dst, src);

        let ids: Vec<_> = arena.iter_chunks(dst).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(arena.list(dst).last_chunk, Some(c));
        assert_eq!(arena.list(dst).total_bytes, 0x3000);
        assert_eq!(arena.chunk(b).owner, dst);
        assert_eq!(arena.chunk(c).owner, dst);
        assert!(arena.list(src).is_empty());
        assert_eq!(arena.list(src).total_bytes, 0);
    }

    #[test]
    fn test_append_chunk_list_onto_empty_dst_installs_head() {
        let mut arena = ChunkArena::new();
        let dst = arena.new_list(0, 0);
        let src = arena.new_list(0, 0);
        let a = arena.push_chunk(src, 0, 0x1000, false);

        arena.append_chunk_list(dst, src);

        assert_eq!(arena.list(dst).first_chunk, Some(a));
        assert_eq!(arena.list(dst).last_chunk, Some(a));
        assert_eq!(arena.chunk(a).owner, dst);
    }
}
