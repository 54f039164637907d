//! The local collector driver: `collect_local`, orchestrating deferred
//! promotion and forwarding into one pass over a worker's hierarchical
//! heap.
//!
//! Releasing the claimed local scope (§4.F, step 11 of the algorithm) is
//! the caller's responsibility — `collect_local` only touches the heap,
//! not the deque that scopes collection windows — see
//! `world::Thread::run_collection` for the full claim → collect → release
//! sequence.

use crate::collect::forward::forward;
use crate::collect::promote::run_deferred_promotion;
use crate::collect::{CollectStats, CollectWindow, ToSpace};
use crate::config::HhConfig;
use crate::error::Result;
use crate::heap::hh::HierarchicalHeap;
use crate::logging::{log_event, GcEvent};
use crate::object::{HeapPointer, TypeTag, HEADER_SIZE};
use crate::stats::GcTimer;
use crate::util::Alignment;

/// Every pointer the mutator could currently reach that isn't discovered
/// by tracing from some other root: stack contents, thread-object
/// fields, the thread pointer itself, and anything still queued on the
/// work-stealing deque.
pub struct Roots<'a> {
    pub stack_contents: &'a [HeapPointer],
    pub thread_contents: &'a [HeapPointer],
    pub thread_pointer: Option<HeapPointer>,
    pub deque_contents: &'a [HeapPointer],
}

/// Forwarded roots, returned in the same order/shape as the `Roots`
/// passed in, so the caller can rewrite its own stack/thread/deque
/// storage.
pub struct ForwardedRoots {
    pub stack_contents: Vec<HeapPointer>,
    pub thread_contents: Vec<HeapPointer>,
    pub thread_pointer: Option<HeapPointer>,
    pub deque_contents: Vec<HeapPointer>,
}

pub enum CollectOutcome {
    /// A precondition wasn't met; collection did not run. Not an error —
    /// spec.md §4.I calls these conditions a plain early return, not a
    /// failure.
    Skipped(&'static str),
    Completed { stats: CollectStats, roots: ForwardedRoots },
}

/// Runs one local collection over `[desired_min, current_depth]`,
/// clamped to the configured window bounds.
///
/// Preconditions (return `Skipped` rather than erroring):
/// - `!force && current_depth <= 1` — still in the sequential section.
/// - `desired_min > current_depth` — nothing to collect.
/// - the clamped window ends up empty.
pub fn collect_local(
    hh: &mut HierarchicalHeap,
    config: &HhConfig,
    current_depth: u8,
    desired_min: u8,
    force: bool,
    roots: Roots,
    worker_id: u32,
    cycle: u64,
) -> Result<CollectOutcome> {
    if !force && current_depth <= 1 {
        return Ok(CollectOutcome::Skipped("sequential section"));
    }
    if desired_min > current_depth {
        return Ok(CollectOutcome::Skipped("claimed_min > current_depth"));
    }

    let min = desired_min.max(config.min_local_level);
    let max = current_depth.min(config.hh_collection_level);
    if min > max {
        return Ok(CollectOutcome::Skipped("clamped window is empty"));
    }
    let window = CollectWindow { min, max };

    if config.verbose {
        log_event(GcEvent::CycleStart { worker_id, cycle, min: window.min, max: window.max });
    }

    let mut to_space = ToSpace::new(crate::config::MAX_DEPTH as usize);
    let mut stats = CollectStats::default();

    // Step 2: deferred promotion.
    let phase_timer = phase_start(config, worker_id, cycle, "deferred_promotion");
    let global_down_ptrs = run_deferred_promotion(hh, window, &mut to_space, &mut stats)?;
    phase_end(config, worker_id, cycle, "deferred_promotion", phase_timer);
    if !global_down_ptrs.is_empty() {
        log_event(GcEvent::Promoted { worker_id, count: global_down_ptrs.len() });
    }

    // Step 4: forward roots, in the order the algorithm specifies.
    let phase_timer = phase_start(config, worker_id, cycle, "forward_roots");
    let stack_contents = forward_all(hh, roots.stack_contents, window, &mut to_space, &mut stats)?;
    let thread_contents =
        forward_all(hh, roots.thread_contents, window, &mut to_space, &mut stats)?;
    let thread_pointer = roots
        .thread_pointer
        .map(|p| forward(hh, p, window, &mut to_space, &mut stats))
        .transpose()?;
    let deque_contents = forward_all(hh, roots.deque_contents, window, &mut to_space, &mut stats)?;
    for edge in &global_down_ptrs {
        forward(hh, edge.target, window, &mut to_space, &mut stats)?;
    }
    phase_end(config, worker_id, cycle, "forward_roots", phase_timer);

    // Step 5: scan to-space copy-in-place, deepest level first.
    let phase_timer = phase_start(config, worker_id, cycle, "scan_to_space");
    for depth in (window.min..=window.max).rev() {
        let Some(list) = to_space.get(depth) else { continue };
        let chunk_ids: Vec<_> = hh.arena.iter_chunks(list).map(|(id, _)| id).collect();
        for chunk_id in chunk_ids {
            scan_chunk(hh, chunk_id, window, &mut to_space, &mut stats)?;
        }
    }
    phase_end(config, worker_id, cycle, "scan_to_space", phase_timer);

    // Step 6 (debug only): poison old chunks before they're recycled.
    #[cfg(debug_assertions)]
    poison_old_chunks(hh, window);

    // Step 7: old level lists and remembered sets return to the free list.
    for depth in window.min..=window.max {
        if let Some(list) = hh.level(depth) {
            if let Some(remset) = hh.arena.list(list).remembered_set {
                hh.arena.recycle_list(remset);
            }
            hh.arena.recycle_list(list);
        }
    }

    // Step 8: install to-space as the new levels. An occupied slot (its
    // old, now-emptied list from step 7) keeps its identity and gets the
    // to-space chunks appended onto it; only a level with no prior list
    // gets the to-space list installed outright.
    for depth in window.min..=window.max {
        let Some(to_space_list) = to_space.get(depth) else { continue };
        match hh.level(depth) {
            Some(existing) => hh.append_chunk_list(existing, to_space_list),
            None => hh.set_level(depth, Some(to_space_list)),
        }
    }

    // Step 9: recompute lastAllocatedChunk and extend if it's single-object.
    let highest_nonempty = (0..=window.max).rev().find(|&d| {
        hh.level(d).map(|l| !hh.arena.list(l).is_empty()).unwrap_or(false)
    });
    if let Some(depth) = highest_nonempty {
        let list = hh.level(depth).unwrap();
        let tail = hh.arena.list(list).last_chunk;
        hh.last_allocated_chunk = tail;
        if let Some(tail_id) = tail {
            if !hh.arena.chunk(tail_id).might_contain_multiple_objects {
                hh.allocate_chunk(depth, hh.block_size())?;
            }
        }
    }

    // Step 10: update survival/allocation counters.
    hh.bytes_allocated_since_last_collection = 0;

    Ok(CollectOutcome::Completed {
        stats,
        roots: ForwardedRoots { stack_contents, thread_contents, thread_pointer, deque_contents },
    })
}

/// Starts a phase timer iff `detailed_gc_time` is enabled; `phase_end`
/// turns the returned timer into a `PhaseEnd` event.
fn phase_start(config: &HhConfig, worker_id: u32, cycle: u64, phase: &str) -> Option<GcTimer> {
    if !config.detailed_gc_time {
        return None;
    }
    log_event(GcEvent::PhaseStart { worker_id, cycle, phase: phase.to_string() });
    Some(GcTimer::new())
}

fn phase_end(config: &HhConfig, worker_id: u32, cycle: u64, phase: &str, timer: Option<GcTimer>) {
    if !config.detailed_gc_time {
        return;
    }
    if let Some(timer) = timer {
        log_event(GcEvent::PhaseEnd {
            worker_id,
            cycle,
            phase: phase.to_string(),
            duration_ms: timer.elapsed_ms(),
        });
    }
}

fn forward_all(
    hh: &mut HierarchicalHeap,
    pointers: &[HeapPointer],
    window: CollectWindow,
    to_space: &mut ToSpace,
    stats: &mut CollectStats,
) -> Result<Vec<HeapPointer>> {
    pointers.iter().map(|&p| forward(hh, p, window, to_space, stats)).collect()
}

/// Forwards every pointer field found in one to-space chunk, skipping
/// stack and thread objects (identified by their header's type tag —
/// those are handled as explicit roots, not traced generically).
fn scan_chunk(
    hh: &mut HierarchicalHeap,
    chunk_id: crate::heap::ChunkId,
    window: CollectWindow,
    to_space: &mut ToSpace,
    stats: &mut CollectStats,
) -> Result<()> {
    let (start, frontier) = {
        let chunk = hh.arena.chunk(chunk_id);
        (chunk.start, chunk.frontier)
    };

    let mut cursor = start;
    while cursor < frontier {
        let header = unsafe { &*(cursor as *const crate::object::Header) };
        if header.is_forwarded() {
            // Shouldn't happen for an object that already lives in
            // to-space, but guards against double-scanning a chunk that
            // was also the target of a single-object move.
            break;
        }
        let fields = header.fields();
        let size = object_footprint(fields.tag, fields.non_ptr_bytes, fields.n_ptrs);

        if fields.tag == TypeTag::Normal {
            let ptr_region = cursor + HEADER_SIZE + fields.non_ptr_bytes;
            for i in 0..fields.n_ptrs {
                let field_addr = ptr_region + i * std::mem::size_of::<usize>();
                rewrite_field(hh, field_addr, window, to_space, stats)?;
            }
        } else if fields.tag == TypeTag::Sequence
            && fields.non_ptr_bytes == std::mem::size_of::<usize>()
        {
            let ptr_region = cursor + HEADER_SIZE;
            for i in 0..fields.n_ptrs {
                let field_addr = ptr_region + i * std::mem::size_of::<usize>();
                rewrite_field(hh, field_addr, window, to_space, stats)?;
            }
        }
        // TypeTag::Stack and TypeTag::Weak objects are not traced here:
        // stacks are handled through the explicit root set, and a WEAK
        // object reaching this point is already a bug the forwarding
        // engine would have rejected on copy.

        cursor += size;
    }
    Ok(())
}

fn rewrite_field(
    hh: &mut HierarchicalHeap,
    field_addr: usize,
    window: CollectWindow,
    to_space: &mut ToSpace,
    stats: &mut CollectStats,
) -> Result<()> {
    let raw = unsafe { *(field_addr as *const usize) };
    if raw == 0 {
        return Ok(());
    }
    let ptr = unsafe { HeapPointer::from_addr(raw) };
    // `forward` attributes bytes_copied/bytes_moved itself, inside
    // `copy_object`, the only place that knows whether this object took
    // the single-object-chunk move or the memcpy path.
    let forwarded = forward(hh, ptr, window, to_space, stats)?;
    unsafe { *(field_addr as *mut usize) = forwarded.addr() };
    Ok(())
}

fn object_footprint(tag: TypeTag, non_ptr_bytes: usize, n_ptrs: usize) -> usize {
    let body = match tag {
        TypeTag::Normal | TypeTag::Weak => non_ptr_bytes + n_ptrs * std::mem::size_of::<usize>(),
        TypeTag::Sequence => non_ptr_bytes * n_ptrs,
        TypeTag::Stack => non_ptr_bytes + n_ptrs * std::mem::size_of::<usize>(),
    };
    HEADER_SIZE + Alignment::align_up(body, crate::object::OBJECT_ALIGNMENT)
}

#[cfg(debug_assertions)]
fn poison_old_chunks(hh: &mut HierarchicalHeap, window: CollectWindow) {
    for depth in window.min..=window.max {
        let Some(list) = hh.level(depth) else { continue };
        let chunk_ids: Vec<_> = hh.arena.iter_chunks(list).map(|(id, _)| id).collect();
        for id in chunk_ids {
            let chunk = hh.arena.chunk(id);
            let (start, used) = (chunk.start, chunk.bytes_used());
            unsafe { std::ptr::write_bytes(start as *mut u8, 0xBF, used) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HhConfig;

    fn test_hh() -> HierarchicalHeap {
        let mut cfg = HhConfig::default();
        cfg.block_size = page_size::get();
        cfg.max_heap_size_per_worker = page_size::get() * 64;
        HierarchicalHeap::new(0, &cfg).unwrap()
    }

    #[test]
    fn test_skips_when_depth_too_shallow_and_not_forced() {
        let mut hh = test_hh();
        let cfg = HhConfig::default();
        let outcome = collect_local(
            &mut hh,
            &cfg,
            1,
            0,
            false,
            Roots { stack_contents: &[], thread_contents: &[], thread_pointer: None, deque_contents: &[] },
            0,
            1,
        )
        .unwrap();
        assert!(matches!(outcome, CollectOutcome::Skipped(_)));
    }

    #[test]
    fn test_skips_when_claimed_min_exceeds_current_depth() {
        let mut hh = test_hh();
        let cfg = HhConfig::default();
        let outcome = collect_local(
            &mut hh,
            &cfg,
            2,
            5,
            true,
            Roots { stack_contents: &[], thread_contents: &[], thread_pointer: None, deque_contents: &[] },
            0,
            1,
        )
        .unwrap();
        assert!(matches!(outcome, CollectOutcome::Skipped(_)));
    }

    #[test]
    fn test_completes_and_clears_allocation_counter_with_no_roots() {
        let mut hh = test_hh();
        hh.allocate_chunk(2, 64).unwrap();
        hh.bytes_allocated_since_last_collection = 4096;
        let cfg = HhConfig::default();

        let outcome = collect_local(
            &mut hh,
            &cfg,
            2,
            1,
            true,
            Roots { stack_contents: &[], thread_contents: &[], thread_pointer: None, deque_contents: &[] },
            0,
            1,
        )
        .unwrap();

        assert!(matches!(outcome, CollectOutcome::Completed { .. }));
        assert_eq!(hh.bytes_allocated_since_last_collection, 0);
    }

    #[test]
    fn test_collect_local_accounts_bytes_copied_for_a_reachable_object() {
        let mut hh = test_hh();
        hh.allocate_chunk(2, page_size::get() * 2).unwrap();
        let chunk_id = hh.last_allocated_chunk.unwrap();
        // Force a multi-object chunk so the object takes the memcpy path,
        // not the single-object-chunk move.
        hh.arena.chunk_mut(chunk_id).might_contain_multiple_objects = true;
        let obj_addr = hh.arena.chunk(chunk_id).frontier;
        let non_ptr_bytes = 16;
        unsafe {
            (obj_addr as *mut crate::object::Header)
                .write(crate::object::Header::new(TypeTag::Normal, non_ptr_bytes, 0));
        }
        hh.arena.chunk_mut(chunk_id).frontier += HEADER_SIZE + non_ptr_bytes;
        let obj = unsafe { HeapPointer::from_addr(obj_addr) };
        let cfg = HhConfig::default();

        let outcome = collect_local(
            &mut hh,
            &cfg,
            2,
            1,
            true,
            Roots {
                stack_contents: &[obj],
                thread_contents: &[],
                thread_pointer: None,
                deque_contents: &[],
            },
            0,
            1,
        )
        .unwrap();

        let CollectOutcome::Completed { stats, .. } = outcome else {
            panic!("expected a completed collection")
        };
        assert_eq!(stats.bytes_copied, HEADER_SIZE + non_ptr_bytes);
        assert_eq!(stats.bytes_moved, 0);
    }

    #[test]
    fn test_detailed_gc_time_emits_phase_events() {
        crate::logging::configure_logger(crate::logging::GcLoggerConfig {
            level: crate::logging::LogLevel::Debug,
            route_to_log_crate: false,
            ..Default::default()
        });
        let mut hh = test_hh();
        hh.allocate_chunk(2, 64).unwrap();
        let mut cfg = HhConfig::default();
        cfg.detailed_gc_time = true;

        collect_local(
            &mut hh,
            &cfg,
            2,
            1,
            true,
            Roots { stack_contents: &[], thread_contents: &[], thread_pointer: None, deque_contents: &[] },
            0,
            1,
        )
        .unwrap();

        assert!(crate::logging::get_event_count() >= 3);
    }
}
