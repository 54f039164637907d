//! `extern "C"` shim exposing `hh_gc`'s mutator- and scheduler-facing API
//! (SPEC_FULL.md §6) to generated code.
//!
//! Structurally this mirrors the teacher's `faxc-runtime::gc`, which wraps
//! a single `fgc::Runtime` behind a process-wide `OnceLock`. There is no
//! single `Runtime` here: every entry point below operates on *the calling
//! OS thread's own* `WorkerGc`, installed once via [`hh_init_world`] (the
//! process's first worker) or [`hh_duplicate_world`] (every worker spawned
//! after it) — see `hh_gc::world`'s module docs for why a thread-local
//! handle replaces the teacher's global singleton.
//!
//! Every `HhError` this crate can raise is fatal per SPEC_FULL.md §7; FFI
//! entry points that can only fail by hitting one report it with
//! [`log::error!`] and abort the process rather than returning a null or
//! sentinel the caller might silently ignore.

use hh_gc::config::HhConfig;
use hh_gc::deque::Task;
use hh_gc::error::HhError;
use hh_gc::world::{self, Thread, ThreadStats, WorkerGc};
use std::num::NonZeroUsize;
use std::os::raw::c_void;
use std::panic::AssertUnwindSafe;

/// Reports a fatal `HhError` and aborts the process. Every allocation and
/// collection path in this crate checks for failure and aborts with a
/// structured message per SPEC_FULL.md §7 — there is no recoverable path
/// to return to generated code.
fn fatal(err: HhError) -> ! {
    log::error!("hh-gc: fatal: {err}");
    eprintln!("hh-gc: fatal: {err}");
    std::process::abort();
}

/// Runs `f` against the calling thread's installed `WorkerGc`, turning an
/// internal panic (e.g. `Deque::set_depth` on a non-empty deque) into a
/// process abort instead of letting it unwind across the `extern "C"`
/// boundary, which is undefined behavior.
fn with_worker<R>(f: impl FnOnce(&mut WorkerGc) -> R) -> R {
    match std::panic::catch_unwind(AssertUnwindSafe(|| world::with_current(f))) {
        Ok(r) => r,
        Err(_) => {
            eprintln!("hh-gc: fatal: worker panicked");
            std::process::abort();
        }
    }
}

/// A thread's heap-visible identity, laid out for FFI: the address of its
/// `Thread` object and the fork depth it was created at.
#[repr(C)]
pub struct CThread {
    pub obj: usize,
    pub level: u8,
}

impl From<Thread> for CThread {
    fn from(t: Thread) -> Self {
        CThread { obj: t.obj.addr(), level: t.level }
    }
}

/// Snapshot of `world::ThreadStats`, passed from a spawning worker to the
/// worker it spawns so `hh_duplicate_world` can carry it over — see
/// `world::duplicate_world`'s "copy stats" contract.
#[repr(C)]
pub struct CThreadStats {
    pub bytes_allocated_since_last_collection: usize,
    pub bytes_survived_last_collection: usize,
    pub num_collections_local: u64,
}

impl From<ThreadStats> for CThreadStats {
    fn from(s: ThreadStats) -> Self {
        CThreadStats {
            bytes_allocated_since_last_collection: s.bytes_allocated_since_last_collection,
            bytes_survived_last_collection: s.bytes_survived_last_collection,
            num_collections_local: s.num_collections_local,
        }
    }
}

impl From<CThreadStats> for ThreadStats {
    fn from(s: CThreadStats) -> Self {
        ThreadStats {
            bytes_allocated_since_last_collection: s.bytes_allocated_since_last_collection,
            bytes_survived_last_collection: s.bytes_survived_last_collection,
            num_collections_local: s.num_collections_local,
        }
    }
}

/// One slot dequeued from the work-stealing deque, laid out for FFI.
/// `found` is `false` when the deque had nothing to return; `handle`/
/// `depth` are only meaningful when `found` is `true`.
#[repr(C)]
pub struct CTaskSlot {
    pub found: bool,
    pub handle: usize,
    pub depth: u8,
}

impl CTaskSlot {
    const EMPTY: CTaskSlot = CTaskSlot { found: false, handle: 0, depth: 0 };
}

impl From<Option<Task>> for CTaskSlot {
    fn from(task: Option<Task>) -> Self {
        match task {
            Some(t) => CTaskSlot { found: true, handle: t.handle.get(), depth: t.depth },
            None => CTaskSlot::EMPTY,
        }
    }
}

// ---------------------------------------------------------------------
// World & thread lifecycle (SPEC_FULL.md §6, mutator-facing table)
// ---------------------------------------------------------------------

/// `init_world()`: one-time per-process setup, called once by the first
/// (depth-0) worker thread. Installs this thread as worker 0 and allocates
/// the `Globals` root vector. Returns the initial thread's handle.
#[no_mangle]
pub extern "C" fn hh_init_world() -> CThread {
    match world::init_world(HhConfig::from_env()) {
        Ok((worker, thread)) => {
            world::install_current(worker);
            thread.into()
        }
        Err(e) => fatal(e),
    }
}

/// `duplicate_world(dst, src)`: called by a newly spawned worker OS thread
/// on itself, carrying over the spawning worker's `ThreadStats` snapshot
/// (obtained from `hh_current_thread_stats` on the spawning thread before
/// the new thread started).
#[no_mangle]
pub extern "C" fn hh_duplicate_world(dst_worker_id: u32, src_stats: CThreadStats) -> CThread {
    match world::duplicate_world(dst_worker_id, HhConfig::from_env(), src_stats.into()) {
        Ok((worker, thread)) => {
            world::install_current(worker);
            thread.into()
        }
        Err(e) => fatal(e),
    }
}

/// Snapshot of the calling thread's `ThreadStats`, to be handed to the
/// worker it is about to spawn via `hh_duplicate_world`.
#[no_mangle]
pub extern "C" fn hh_current_thread_stats() -> CThreadStats {
    with_worker(|w| w.stats.clone()).into()
}

/// `new_thread_with_heap(stack_reserved, level)`.
#[no_mangle]
pub extern "C" fn hh_new_thread_with_heap(stack_reserved: usize, level: u8) -> CThread {
    with_worker(|w| w.new_thread_with_heap(stack_reserved, level)).unwrap_or_else(|e| fatal(e)).into()
}

/// `switch_to_thread(obj)`.
#[no_mangle]
pub extern "C" fn hh_switch_to_thread(obj: usize, level: u8) {
    let Some(addr) = NonZeroUsize::new(obj) else {
        fatal(HhError::InvariantViolated("switch_to_thread with null thread pointer".into()))
    };
    let thread = Thread { obj: unsafe { hh_gc::object::HeapPointer::from_addr(addr.get()) }, level };
    with_worker(|w| w.switch_to_thread(thread));
}

/// The calling worker's id, for scheduler bookkeeping.
#[no_mangle]
pub extern "C" fn hh_worker_id() -> u32 {
    with_worker(|w| w.worker_id)
}

// ---------------------------------------------------------------------
// Mutator allocation (SPEC_FULL.md §4.D)
// ---------------------------------------------------------------------

/// `allocate(n)`: bump-allocate `n_bytes`, collecting on the slow path if
/// needed. Aborts on `OutOfHeap` rather than returning null — see the
/// module docs.
#[no_mangle]
pub extern "C" fn hh_allocate(n_bytes: usize) -> *mut c_void {
    with_worker(|w| w.allocate(n_bytes)).unwrap_or_else(|e| fatal(e)).addr() as *mut c_void
}

/// `gc_if_needed(n, force, ensure_current_depth)`. `ensure_current_depth`
/// of `-1` means "no depth requirement" (Rust's `Option::None`).
#[no_mangle]
pub extern "C" fn hh_gc_if_needed(n_bytes: usize, force: bool, ensure_current_depth: i32) {
    let ensure = if ensure_current_depth < 0 { None } else { Some(ensure_current_depth as u8) };
    with_worker(|w| w.gc_if_needed(n_bytes, force, ensure)).unwrap_or_else(|e| fatal(e));
}

/// `enter_local_heap()`.
#[no_mangle]
pub extern "C" fn hh_enter_local_heap() {
    with_worker(|w| w.enter_local_heap()).unwrap_or_else(|e| fatal(e));
}

/// `exit_local_heap()`.
#[no_mangle]
pub extern "C" fn hh_exit_local_heap() {
    with_worker(|w| w.exit_local_heap()).unwrap_or_else(|e| fatal(e));
}

// ---------------------------------------------------------------------
// Chase-Lev deque (SPEC_FULL.md §6, scheduler-facing table)
// ---------------------------------------------------------------------

/// `deque_push_bot(task)`: owner-only. Returns `false` on a full deque
/// (`ForkDepthExceeded`) — the scheduler, not this shim, decides whether
/// that is fatal for its caller.
#[no_mangle]
pub extern "C" fn hh_deque_push_bot(handle: usize, depth: u8) -> bool {
    let Some(handle) = NonZeroUsize::new(handle) else {
        fatal(HhError::InvariantViolated("push_bot with a null task handle".into()))
    };
    with_worker(|w| w.deque.push_bot(Task { handle, depth }))
}

/// `deque_try_pop_bot()`: owner-only.
#[no_mangle]
pub extern "C" fn hh_deque_try_pop_bot() -> CTaskSlot {
    with_worker(|w| w.deque.try_pop_bot()).into()
}

/// `deque_try_pop_top()`: any thief.
#[no_mangle]
pub extern "C" fn hh_deque_try_pop_top() -> CTaskSlot {
    with_worker(|w| w.deque.try_pop_top()).into()
}

/// `deque_set_depth(d)`: precondition — deque empty; violating this
/// aborts the process (see `with_worker`'s panic-to-abort translation).
#[no_mangle]
pub extern "C" fn hh_deque_set_depth(depth: isize) {
    with_worker(|w| w.deque.set_depth(depth));
}

/// Current value of the deque's `bot` cursor (doubles as "current
/// depth"); exposed so a scheduler can observe the claim state without
/// popping.
#[no_mangle]
pub extern "C" fn hh_deque_depth() -> isize {
    with_worker(|w| w.deque.depth())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hh_gc::config::HhConfig;

    /// Installs a small, isolated `WorkerGc` on the calling (test) thread,
    /// mirroring what `hh_init_world` does in production but with a
    /// heap small enough for a unit test to reserve cheaply.
    fn install_test_worker() {
        let mut cfg = HhConfig::default();
        cfg.block_size = page_size::get();
        cfg.max_heap_size_per_worker = page_size::get() * 64;
        let worker = WorkerGc::new(0, cfg).unwrap();
        world::install_current(worker);
    }

    #[test]
    fn test_allocate_returns_nonnull_pointer() {
        install_test_worker();
        let ptr = hh_allocate(64);
        assert!(!ptr.is_null());
    }

    #[test]
    fn test_new_thread_with_heap_reports_requested_level() {
        install_test_worker();
        let thread = hh_new_thread_with_heap(256, 2);
        assert_eq!(thread.level, 2);
        assert_ne!(thread.obj, 0);
    }

    #[test]
    fn test_switch_to_thread_round_trips_through_worker_state() {
        install_test_worker();
        let thread = hh_new_thread_with_heap(256, 1);
        hh_switch_to_thread(thread.obj, thread.level);
        let current = with_worker(|w| w.current_thread.unwrap());
        assert_eq!(current.obj.addr(), thread.obj);
    }

    #[test]
    fn test_deque_push_then_pop_bot_round_trips() {
        install_test_worker();
        assert!(hh_deque_push_bot(0xABCD, 3));
        let slot = hh_deque_try_pop_bot();
        assert!(slot.found);
        assert_eq!(slot.handle, 0xABCD);
        assert_eq!(slot.depth, 3);
    }

    #[test]
    fn test_deque_pop_top_steals_oldest_first() {
        install_test_worker();
        hh_deque_push_bot(1, 0);
        hh_deque_push_bot(2, 0);
        let stolen = hh_deque_try_pop_top();
        assert!(stolen.found);
        assert_eq!(stolen.handle, 1);
    }

    #[test]
    fn test_deque_push_bot_rejects_null_handle() {
        install_test_worker();
        let result = std::panic::catch_unwind(|| hh_deque_push_bot(0, 0));
        assert!(result.is_err());
    }

    #[test]
    fn test_worker_id_reflects_installed_worker() {
        install_test_worker();
        assert_eq!(hh_worker_id(), 0);
    }

    #[test]
    fn test_current_thread_stats_starts_at_zero() {
        install_test_worker();
        let stats = hh_current_thread_stats();
        assert_eq!(stats.num_collections_local, 0);
    }
}
