//! # hh-gc — per-worker hierarchical-heap collector
//!
//! `hh-gc` implements a local, copying garbage collector for a
//! fork-join parallel runtime's per-worker hierarchical heaps (HH): each
//! worker thread owns an array of chunk lists indexed by fork depth, and
//! a worker can collect the depths it currently owns — and only those —
//! without stopping any other worker.
//!
//! ## Overview
//!
//! - **Hierarchical heap** (`heap`): a per-worker `levels[0..MAX_DEPTH)`
//!   array of chunk lists, each chunk carved from a single `mmap`
//!   reservation (`heap::virtual_memory`).
//! - **Object model** (`object`): a one-word header encoding type tag,
//!   mark bits, and the Fresh → Forwarded state machine.
//! - **Work-stealing deque** (`deque`): the exact Chase–Lev contract a
//!   fork-join scheduler needs, extended with a co-located depth cursor
//!   used to claim a local collection scope.
//! - **Mutator allocator** (`alloc`): a bump allocator whose frontier
//!   triple is cached outside the HH and flushed back across an RAII
//!   guard.
//! - **Collector** (`collect`): deferred promotion, object forwarding,
//!   and the `collect_local` driver that ties both into one pass.
//! - **World & thread lifecycle** (`world`): the mutator-facing entry
//!   points a compiled program calls at startup, at each fork, and on
//!   every allocation slow path.
//!
//! ## Quick Start
//!
//! ```rust
//! use hh_gc::config::HhConfig;
//! use hh_gc::world;
//!
//! fn main() -> hh_gc::error::Result<()> {
//!     let (worker, _thread) = world::init_world(HhConfig::default())?;
//!     world::install_current(worker);
//!
//!     let obj = world::with_current(|w| w.allocate(64))?;
//!     let _ = obj;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency model
//!
//! One `WorkerGc` per OS thread, addressed through a `thread_local!`
//! handle rather than a shared `Arc` — see `world`'s module docs. A
//! worker's heap is exclusively its own except for depths a thief has
//! claimed via the deque; cross-owner pointers are a program error,
//! reported as a fatal `Entanglement` during collection rather than
//! synchronized away.
//!
//! ## Safety
//!
//! This crate uses `unsafe` internally (raw heap addresses, header
//! bit-packing, `mmap`-backed memory) but exposes a safe surface at the
//! `world` module boundary. Callers embedding this crate directly
//! (rather than through `hh-runtime`'s FFI shim) must still uphold:
//!
//! 1. Register every reachable root before calling anything that may
//!    collect — an unregistered pointer may be collected out from under
//!    the caller.
//! 2. Never dereference a `HeapPointer` captured before a collection
//!    without first re-resolving it through the collector's forwarded
//!    roots — objects move.
//! 3. Respect `OBJECT_ALIGNMENT`: all allocations are 8-byte aligned.
//!
//! ## Modules
//!
//! - [`config`]: runtime configuration and validation.
//! - [`error`]: the `HhError` taxonomy — every error kind here is fatal.
//! - [`object`]: object headers and the `HeapPointer` address type.
//! - [`heap`]: blocks, chunks, chunk lists, and the hierarchical heap.
//! - [`deque`]: the Chase–Lev work-stealing deque.
//! - [`alloc`]: the mutator's bump allocator and its RAII scope guard.
//! - [`collect`]: forwarding, deferred promotion, and the collector driver.
//! - [`world`]: world/thread lifecycle and the thread-local worker handle.
//! - [`logging`]: structured collector event logging.
//! - [`stats`]: per-worker collection statistics.
//! - [`util`]: small shared helpers (alignment arithmetic).

pub mod alloc;
pub mod collect;
pub mod config;
pub mod deque;
pub mod error;
pub mod heap;
pub mod logging;
pub mod object;
pub mod stats;
pub mod util;
pub mod world;

pub use config::HhConfig;
pub use error::{HhError, Result};
pub use world::{WorkerGc, Thread};

/// `hh-gc`'s version string, from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes the world with a default configuration and installs the
/// calling thread as the process's initial worker.
///
/// # Examples
///
/// ```rust
/// let worker = hh_gc::init()?;
/// hh_gc::world::install_current(worker);
/// # Ok::<(), hh_gc::HhError>(())
/// ```
pub fn init() -> Result<WorkerGc> {
    let (worker, _thread) = world::init_world(HhConfig::default())?;
    Ok(worker)
}

/// Initializes the world with a caller-supplied configuration.
pub fn init_with_config(config: HhConfig) -> Result<WorkerGc> {
    let (worker, _thread) = world::init_world(config)?;
    Ok(worker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_default() {
        assert!(init().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(HhConfig::default().validate().is_ok());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
