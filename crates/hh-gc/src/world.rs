//! World and thread lifecycle: the mutator-facing entry points a
//! compiled program calls at startup, at each fork, and at every
//! allocation slow path.
//!
//! Each worker OS thread owns exactly one `WorkerGc`, mirroring §5's
//! "thread-local `GC_state` containing the frontier triple, current
//! thread pointer, and deque handles" — kept as a `thread_local!` handle
//! (see the module-level `CURRENT` cell below) rather than indexed out of
//! a process-wide registry, the way the teacher's `faxc-runtime::gc`
//! reaches its single `Runtime` through a `static OnceLock` instead of
//! threading a handle through every call site.

use std::cell::RefCell;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::alloc::MutatorAllocator;
use crate::collect::{self, CollectOutcome};
use crate::config::HhConfig;
use crate::deque::{Deque, Task};
use crate::error::{HhError, Result};
use crate::stats::{GcStats, GcTimer};
use crate::heap::hh::HierarchicalHeap;
use crate::object::{Header, HeapPointer, TypeTag};

/// Per-thread GC bookkeeping, rolled into the worker's `GcStats` snapshot
/// (SPEC_FULL.md §4.J's supplement).
#[derive(Debug, Clone, Default)]
pub struct ThreadStats {
    pub bytes_allocated_since_last_collection: usize,
    pub bytes_survived_last_collection: usize,
    pub num_collections_local: u64,
}

/// A mutator thread's heap-visible identity: the address of its `Thread`
/// object (forwarded like any other object during collection) and the
/// fork depth it was created at.
#[derive(Debug, Clone, Copy)]
pub struct Thread {
    pub obj: HeapPointer,
    pub level: u8,
}

/// The fixed root vector allocated once at depth 0 during `init_world`.
/// Every collection whose window includes depth 0 scans it unconditionally.
#[derive(Debug, Default)]
pub struct Globals {
    pub roots: Vec<HeapPointer>,
}

static GLOBALS: OnceLock<Mutex<Globals>> = OnceLock::new();

fn globals() -> &'static Mutex<Globals> {
    GLOBALS.get_or_init(|| Mutex::new(Globals::default()))
}

/// One worker's complete GC-visible state: its hierarchical heap, the
/// mutator bump allocator's cached frontier triple, its work-stealing
/// deque, and the thread currently running on it.
pub struct WorkerGc {
    pub worker_id: u32,
    pub config: HhConfig,
    pub hh: HierarchicalHeap,
    pub allocator: MutatorAllocator,
    pub deque: Deque<Task>,
    pub current_thread: Option<Thread>,
    pub stats: ThreadStats,
    pub gc_stats: GcStats,
}

impl WorkerGc {
    pub fn new(worker_id: u32, config: HhConfig) -> Result<Self> {
        config.validate().map_err(|e| HhError::Configuration(e.to_string()))?;
        let mut hh = HierarchicalHeap::new(worker_id, &config)?;
        hh.allocate_chunk(0, config.block_size)?;
        let mut allocator = MutatorAllocator::new();
        allocator.refresh_from(&hh)?;
        let deque = Deque::with_capacity(config.deque_capacity);

        Ok(WorkerGc {
            worker_id,
            config,
            hh,
            allocator,
            deque,
            current_thread: None,
            stats: ThreadStats::default(),
            gc_stats: GcStats::new(),
        })
    }

    /// `enter_local_heap()`: load the frontier triple from the HH's last
    /// allocated chunk. Called on every return into mutator code after a
    /// collection or heap extension may have moved `lastAllocatedChunk`.
    pub fn enter_local_heap(&mut self) -> Result<()> {
        self.allocator.refresh_from(&self.hh)
    }

    /// `exit_local_heap()`: write the cached frontier back into the HH
    /// before control leaves mutator code (entering the collector, or
    /// suspending at a safepoint).
    pub fn exit_local_heap(&mut self) -> Result<()> {
        self.allocator.flush_into(&mut self.hh)
    }

    /// `allocate(n)`: bump-allocate `n_bytes`, running the collector on
    /// the slow path if the fast path doesn't fit.
    pub fn allocate(&mut self, n_bytes: usize) -> Result<HeapPointer> {
        if let Some(addr) = self.allocator.try_allocate(n_bytes, crate::object::OBJECT_ALIGNMENT) {
            self.stats.bytes_allocated_since_last_collection += n_bytes;
            self.hh.bytes_allocated_since_last_collection += n_bytes;
            return Ok(unsafe { HeapPointer::from_addr(addr) });
        }

        self.allocator.set_bytes_needed(n_bytes);
        self.gc_if_needed(n_bytes, false, None)?;

        match self.allocator.try_allocate(n_bytes, crate::object::OBJECT_ALIGNMENT) {
            Some(addr) => Ok(unsafe { HeapPointer::from_addr(addr) }),
            None => {
                let available = self.hh.stats().heap_available;
                crate::logging::log_event(crate::logging::GcEvent::AllocationFailure {
                    worker_id: self.worker_id,
                    requested: n_bytes,
                    available,
                });
                Err(HhError::OutOfHeap { requested: n_bytes, available })
            }
        }
    }

    /// `gc_if_needed(n, force, ensure_current_depth)`: ensures `n_bytes`
    /// will fit and, if `ensure_current_depth` is given, that the heap is
    /// extended to that depth, collecting first if either condition isn't
    /// already met. Per SPEC_FULL.md §4.D a collection also runs whenever
    /// `bytesAllocatedSinceLastCollection >= collectionThreshold`, batching
    /// local collections instead of only ever reacting to chunk exhaustion.
    pub fn gc_if_needed(
        &mut self,
        n_bytes: usize,
        force: bool,
        ensure_current_depth: Option<u8>,
    ) -> Result<()> {
        if let Some(depth) = ensure_current_depth {
            self.hh.extend_to_depth(depth)?;
        }

        let should_collect =
            force || self.hh.bytes_allocated_since_last_collection >= self.hh.collection_threshold;

        if !should_collect && self.allocator.fits(n_bytes, crate::object::OBJECT_ALIGNMENT) {
            return Ok(());
        }

        self.exit_local_heap()?;

        let current_depth = self.hh.current_depth();
        let claimed_min = match self.deque.try_claim_local_scope() {
            Some(min) => min.clamp(0, current_depth as isize) as u8,
            None => {
                // no depths could be claimed; nothing to collect, but the
                // request still needs somewhere to land.
                self.enter_local_heap()?;
                return self.ensure_chunk_fits(n_bytes);
            }
        };

        let roots = collect::driver::Roots {
            stack_contents: &[],
            thread_contents: &[],
            thread_pointer: self.current_thread.map(|t| t.obj),
            deque_contents: &[],
        };

        let timer = GcTimer::new();
        let cycle = self.stats.num_collections_local + 1;
        let outcome = collect::collect_local(
            &mut self.hh,
            &self.config,
            current_depth,
            claimed_min,
            should_collect,
            roots,
            self.worker_id,
            cycle,
        );

        self.deque.release_local_scope(claimed_min as isize + 1);

        if let Err(HhError::Entanglement { from_level, to_level }) = &outcome {
            crate::logging::log_event(crate::logging::GcEvent::Entangled {
                worker_id: self.worker_id,
                from_level: *from_level,
                to_level: *to_level,
            });
        }

        match outcome? {
            CollectOutcome::Skipped(reason) => {
                if self.config.stats_enabled {
                    self.gc_stats.record_skip();
                }
                crate::logging::log_event(crate::logging::GcEvent::Skipped {
                    worker_id: self.worker_id,
                    reason: reason.to_string(),
                });
            }
            CollectOutcome::Completed { stats, roots } => {
                self.stats.bytes_survived_last_collection = stats.bytes_copied + stats.bytes_moved;
                self.stats.num_collections_local += 1;
                if self.config.stats_enabled {
                    self.gc_stats.record_collection(stats.bytes_copied, stats.bytes_moved, timer.elapsed());
                }
                if self.config.verbose {
                    crate::logging::log_event(crate::logging::GcEvent::CycleEnd {
                        worker_id: self.worker_id,
                        cycle: self.stats.num_collections_local,
                        duration_ms: timer.elapsed_ms(),
                        bytes_copied: stats.bytes_copied,
                        bytes_moved: stats.bytes_moved,
                    });
                    let heap_stats = self.hh.stats();
                    crate::logging::log_event(crate::logging::GcEvent::HeapStats {
                        worker_id: self.worker_id,
                        committed_bytes: heap_stats.heap_committed,
                        available_bytes: heap_stats.heap_available,
                    });
                }
                if let (Some(obj), Some(thread)) = (roots.thread_pointer, self.current_thread.as_mut()) {
                    thread.obj = obj;
                }
            }
        }

        self.enter_local_heap()?;
        self.ensure_chunk_fits(n_bytes)
    }

    /// Carves a fresh chunk sized to `n_bytes` at the current depth if the
    /// frontier just loaded by `enter_local_heap` can't satisfy it —
    /// SPEC_FULL.md §4.D's "extends the HH if the current chunk cannot
    /// satisfy bytes" step, needed whether or not a collection actually
    /// ran above (a skip leaves the old, possibly too-small, chunk in
    /// place just as much as a completed collection can).
    fn ensure_chunk_fits(&mut self, n_bytes: usize) -> Result<()> {
        if self.allocator.fits(n_bytes, crate::object::OBJECT_ALIGNMENT) {
            return Ok(());
        }
        let depth = self.hh.current_depth();
        self.exit_local_heap()?;
        self.hh.allocate_chunk(depth, n_bytes)?;
        self.enter_local_heap()
    }

    /// `new_thread_with_heap(stack_reserved, level)`: allocates a stack
    /// object of `stack_reserved` bytes at `level` and returns the new
    /// thread's heap-visible handle.
    pub fn new_thread_with_heap(&mut self, stack_reserved: usize, level: u8) -> Result<Thread> {
        self.exit_local_heap()?;
        // The stack object must live in `level`'s own chunk, not wherever
        // the mutator's frontier currently sits — allocate the chunk
        // directly rather than going through the generic bump allocator.
        self.hh.allocate_chunk(level, crate::object::HEADER_SIZE + stack_reserved)?;
        self.enter_local_heap()?;

        let total = crate::object::HEADER_SIZE + stack_reserved;
        let addr = self
            .allocator
            .try_allocate(total, crate::object::OBJECT_ALIGNMENT)
            .map(|addr| unsafe { HeapPointer::from_addr(addr) })
            .ok_or(HhError::OutOfHeap { requested: total, available: self.hh.stats().heap_available })?;

        // SAFETY: freshly allocated, not yet visible to any other thread.
        unsafe {
            addr.as_header_mut().write(Header::new(TypeTag::Stack, stack_reserved, 0));
        }
        Ok(Thread { obj: addr, level })
    }

    /// `switch_to_thread(obj)`: installs `thread` as this worker's current
    /// thread register.
    pub fn switch_to_thread(&mut self, thread: Thread) {
        self.current_thread = Some(thread);
    }
}

/// `init_world()`: one-time per-process setup. Installs this thread as
/// worker 0, allocates the `Globals` root vector at depth 0, and returns
/// the thread handle for the process's initial mutator thread.
///
/// Idempotent only in the sense that the `Globals` vector is shared
/// process-wide via `OnceLock`; calling this twice on two different
/// threads each installs its own `WorkerGc`, as `duplicate_world` does
/// for every subsequently spawned worker.
pub fn init_world(config: HhConfig) -> Result<(WorkerGc, Thread)> {
    let _ = globals();
    let mut worker = WorkerGc::new(0, config)?;
    let thread = worker.new_thread_with_heap(4096, 0)?;
    worker.switch_to_thread(thread);
    Ok((worker, thread))
}

/// `duplicate_world(dst, src)`: the per-worker fork that runs when a new
/// OS worker thread starts up. Builds a fresh depth-1 `WorkerGc` for
/// `dst_worker_id`, carrying over `src_stats` as the new worker's starting
/// point (spec.md's "copy stats" — a worker inherits its spawner's view
/// of how much it has allocated and survived so far, since the two
/// threads are about to cooperate on the same fork-join tree).
pub fn duplicate_world(
    dst_worker_id: u32,
    config: HhConfig,
    src_stats: ThreadStats,
) -> Result<(WorkerGc, Thread)> {
    let mut worker = WorkerGc::new(dst_worker_id, config)?;
    worker.stats = src_stats;
    let thread = worker.new_thread_with_heap(4096, 1)?;
    worker.switch_to_thread(thread);
    Ok((worker, thread))
}

/// Registers `root` into the process-wide `Globals` vector. Not named as
/// a standalone entry point in spec.md's table, but required for
/// `init_world`'s "allocate the initial globals" contract to mean
/// anything beyond an empty vector.
pub fn register_global_root(root: HeapPointer) {
    globals().lock().roots.push(root);
}

pub fn global_roots() -> Vec<HeapPointer> {
    globals().lock().roots.clone()
}

thread_local! {
    /// The thread-local slot a scheduler installs its `WorkerGc` into
    /// once, at thread startup, via `install_current`.
    static CURRENT: RefCell<Option<WorkerGc>> = const { RefCell::new(None) };
}

/// Installs `worker` as this OS thread's current `WorkerGc`. Called once
/// per thread, immediately after `init_world`/`duplicate_world`.
pub fn install_current(worker: WorkerGc) {
    CURRENT.with(|cell| *cell.borrow_mut() = Some(worker));
}

/// Runs `f` against this thread's installed `WorkerGc`.
///
/// # Panics
/// Panics if no `WorkerGc` has been installed on this thread yet — a
/// caller reaching the mutator-facing API before `install_current` is a
/// scheduler bug, not a recoverable runtime condition.
pub fn with_current<R>(f: impl FnOnce(&mut WorkerGc) -> R) -> R {
    CURRENT.with(|cell| {
        let mut guard = cell.borrow_mut();
        let worker = guard.as_mut().expect("WorkerGc not installed on this thread");
        f(worker)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HhConfig {
        let mut cfg = HhConfig::default();
        cfg.block_size = page_size::get();
        cfg.max_heap_size_per_worker = page_size::get() * 64;
        cfg
    }

    #[test]
    fn test_new_worker_gc_starts_with_a_depth_zero_chunk() {
        let worker = WorkerGc::new(0, test_config()).unwrap();
        assert!(worker.hh.level(0).is_some());
    }

    #[test]
    fn test_allocate_advances_frontier_and_records_stats() {
        let mut worker = WorkerGc::new(0, test_config()).unwrap();
        let before = worker.stats.bytes_allocated_since_last_collection;
        worker.allocate(64).unwrap();
        assert!(worker.stats.bytes_allocated_since_last_collection > before);
    }

    #[test]
    fn test_new_thread_with_heap_extends_to_requested_level() {
        let mut worker = WorkerGc::new(0, test_config()).unwrap();
        let thread = worker.new_thread_with_heap(256, 3).unwrap();
        assert_eq!(thread.level, 3);
        assert!(worker.hh.level(3).is_some());
    }

    #[test]
    fn test_switch_to_thread_updates_current_thread() {
        let mut worker = WorkerGc::new(0, test_config()).unwrap();
        let thread = worker.new_thread_with_heap(256, 1).unwrap();
        worker.switch_to_thread(thread);
        assert_eq!(worker.current_thread.unwrap().obj.addr(), thread.obj.addr());
    }

    #[test]
    fn test_allocate_carves_a_dedicated_chunk_for_oversized_requests() {
        let mut worker = WorkerGc::new(0, test_config()).unwrap();
        let block_size = worker.hh.block_size();
        let ptr = worker.allocate(block_size * 3).unwrap();
        let chunk_id = worker.hh.chunk_containing(ptr.addr()).unwrap();
        assert!(!worker.hh.arena.chunk(chunk_id).might_contain_multiple_objects);
    }

    #[test]
    fn test_duplicate_world_carries_over_stats() {
        let src_stats = ThreadStats { num_collections_local: 7, ..Default::default() };
        let (worker, _thread) = duplicate_world(1, test_config(), src_stats).unwrap();
        assert_eq!(worker.stats.num_collections_local, 7);
    }

    #[test]
    fn test_install_and_run_against_current_worker() {
        let worker = WorkerGc::new(0, test_config()).unwrap();
        install_current(worker);
        let id = with_current(|w| w.worker_id);
        assert_eq!(id, 0);
    }

    #[test]
    fn test_gc_if_needed_collects_once_allocation_threshold_is_reached() {
        let mut worker = WorkerGc::new(0, test_config()).unwrap();
        // Push past depth 1 so collect_local isn't skipped as "still in
        // the sequential section" (§4.I's `current_depth <= 1` guard), and
        // give the deque something to claim a local scope out of.
        worker.new_thread_with_heap(256, 2).unwrap();
        worker.deque.push_bot(crate::deque::Task {
            handle: std::num::NonZeroUsize::new(1).unwrap(),
            depth: 2,
        });
        worker.hh.collection_threshold = 1;
        worker.hh.bytes_allocated_since_last_collection = 2;

        let before = worker.stats.num_collections_local;
        worker.gc_if_needed(8, false, None).unwrap();

        assert!(worker.stats.num_collections_local > before);
        assert_eq!(worker.hh.bytes_allocated_since_last_collection, 0);
    }

    #[test]
    fn test_gc_if_needed_skips_collection_below_threshold_when_allocation_fits() {
        let mut worker = WorkerGc::new(0, test_config()).unwrap();
        worker.hh.collection_threshold = usize::MAX;
        worker.hh.bytes_allocated_since_last_collection = 0;

        let before = worker.stats.num_collections_local;
        worker.gc_if_needed(8, false, None).unwrap();

        assert_eq!(worker.stats.num_collections_local, before);
    }
}
