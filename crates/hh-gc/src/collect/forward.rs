//! The forwarding engine — copies one reachable object into to-space and
//! installs a forwarding pointer, or retargets the caller's reference if
//! the object has already moved.
//!
//! Single-threaded per worker: no CAS is needed to claim an object for
//! forwarding, and `Header::set_forwarded` is a plain store (see
//! `object::header`'s module docs). The state machine this function
//! drives is still exactly Fresh → Forwarded, one-way.

use crate::collect::{CollectStats, CollectWindow, ToSpace};
use crate::error::{HhError, Result};
use crate::heap::hh::HierarchicalHeap;
use crate::object::{Header, HeapPointer, TypeTag, HEADER_SIZE, OBJECT_ALIGNMENT};
use crate::util::Alignment;

const POINTER_SIZE: usize = std::mem::size_of::<usize>();

/// Computes the total on-heap size (including header) of a fresh object,
/// by type tag. `SEQUENCE` and `STACK` objects reuse the header's
/// `non_ptr_bytes`/`n_ptrs` fields with a type-specific meaning (element
/// size and length for sequences; reserved bytes and live pointer-slot
/// count for stacks) rather than carrying separate metadata words, since
/// this crate models a single generic header rather than a per-type
/// layout description.
fn object_size(tag: TypeTag, non_ptr_bytes: usize, n_ptrs: usize) -> usize {
    let body = match tag {
        TypeTag::Normal | TypeTag::Weak => non_ptr_bytes + n_ptrs * POINTER_SIZE,
        TypeTag::Sequence => non_ptr_bytes * n_ptrs, // element_size * length
        TypeTag::Stack => non_ptr_bytes + n_ptrs * POINTER_SIZE, // reserved + live slots
    };
    HEADER_SIZE + Alignment::align_up(body, OBJECT_ALIGNMENT)
}

/// Forwards `obj`, returning the address the caller's field should now
/// point at. Returns `obj` unchanged for objects outside the window or
/// in the global/root heap — callers should only rewrite the field when
/// the returned pointer differs from `obj`, though rewriting
/// unconditionally is also safe since a no-op forward returns its input.
pub fn forward(
    hh: &mut HierarchicalHeap,
    obj: HeapPointer,
    window: CollectWindow,
    to_space: &mut ToSpace,
    stats: &mut CollectStats,
) -> Result<HeapPointer> {
    let mut current = obj;

    let level = loop {
        let Some(level) = hh.depth_of(current.addr()) else {
            // Not a heap pointer we manage, or it lives in the global
            // (root) heap: spec.md §4.G step 1, "do nothing".
            return Ok(current);
        };

        if level > window.max {
            return Err(HhError::Entanglement { from_level: window.max, to_level: level });
        }
        if level < window.min {
            return Ok(current);
        }

        let header = unsafe { &*current.as_header() };
        if header.is_forwarded() {
            current = unsafe { HeapPointer::from_addr(header.forwarding_target()) };
            continue;
        }

        let chunk_id = hh
            .chunk_containing(current.addr())
            .expect("depth_of resolved a level but chunk_containing found nothing");
        if hh.arena.list(hh.arena.chunk(chunk_id).owner).is_in_to_space {
            // Already relocated into to-space by an earlier visit in
            // this same collection (e.g. via the single-object chunk
            // move, which never sets the forwarded bit).
            return Ok(current);
        }

        break level;
    };

    copy_object(hh, current, level, to_space, stats)
}

fn copy_object(
    hh: &mut HierarchicalHeap,
    src: HeapPointer,
    level: u8,
    to_space: &mut ToSpace,
    stats: &mut CollectStats,
) -> Result<HeapPointer> {
    let header = unsafe { &*src.as_header() };
    let fields = header.fields();

    if fields.tag == TypeTag::Weak {
        return Err(HhError::WeakDuringLocal { level });
    }

    let src_chunk = hh
        .chunk_containing(src.addr())
        .expect("object must live in a tracked chunk");

    let object_bytes = object_size(fields.tag, fields.non_ptr_bytes, fields.n_ptrs);

    if !hh.arena.chunk(src_chunk).might_contain_multiple_objects {
        // Single-object chunk move: relocate the chunk itself rather
        // than copying bytes. The object's address never changes.
        let list = ensure_to_space_list(hh, to_space, level);
        hh.unlink_chunk(src_chunk);
        hh.append_chunk(list, src_chunk);

        // Preserve "a multi-object chunk sits at the tail" by giving
        // this to-space list a fresh trailing chunk.
        hh.allocate_chunk_in(list, hh.block_size())?;
        stats.record_moved(object_bytes);
        return Ok(src);
    }

    let copy_bytes = object_bytes;
    let dst_addr = allocate_in_to_space(hh, to_space, level, copy_bytes)?;

    unsafe {
        std::ptr::copy_nonoverlapping(src.addr() as *const u8, dst_addr as *mut u8, copy_bytes);
    }

    header.set_forwarded(dst_addr);
    stats.record_copied(copy_bytes);
    Ok(unsafe { HeapPointer::from_addr(dst_addr) })
}

/// Ensures `to_space` has a chunk list for `level`, creating one owned
/// by the `COPY_OBJECT_HH` sentinel if absent.
fn ensure_to_space_list(
    hh: &mut HierarchicalHeap,
    to_space: &mut ToSpace,
    level: u8,
) -> crate::heap::ChunkListId {
    if let Some(list) = to_space.get(level) {
        return list;
    }
    let list = hh.arena.new_list(level, crate::heap::chunk::COPY_OBJECT_HH);
    hh.arena.list_mut(list).is_in_to_space = true;
    to_space.set(level, list);
    list
}

fn allocate_in_to_space(
    hh: &mut HierarchicalHeap,
    to_space: &mut ToSpace,
    level: u8,
    bytes: usize,
) -> Result<usize> {
    let list = ensure_to_space_list(hh, to_space, level);

    let tail = hh.arena.list(list).last_chunk;
    if let Some(tail_id) = tail {
        let chunk = hh.arena.chunk(tail_id);
        if chunk.remaining() >= bytes {
            let dst = chunk.frontier;
            hh.arena.chunk_mut(tail_id).frontier += bytes;
            return Ok(dst);
        }
    }

    let new_chunk = hh.allocate_chunk_in(list, bytes)?;
    let dst = hh.arena.chunk(new_chunk).frontier;
    hh.arena.chunk_mut(new_chunk).frontier += bytes;
    Ok(dst)
}
