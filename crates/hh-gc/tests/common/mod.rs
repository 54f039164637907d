//! Shared fixtures for the `hh-gc` integration suite.
//!
//! A `HhFixture` wraps a `WorkerGc` sized for fast, deterministic tests
//! (page-sized blocks, a handful of pages of reservation) rather than the
//! production defaults (1MB blocks, 512MB reservation), the way the
//! teacher's `GcFixture` trims its default heap down to a test-friendly
//! size while keeping every invariant the production config enforces.

use hh_gc::config::HhConfig;
use hh_gc::object::{Header, HeapPointer, TypeTag, HEADER_SIZE};
use hh_gc::world::WorkerGc;
use std::collections::HashSet;

/// Default block size used by fixtures: one OS page, so a handful of
/// small objects already spans several chunks.
pub fn test_config() -> HhConfig {
    let mut cfg = HhConfig::default();
    cfg.block_size = page_size::get();
    cfg.max_heap_size_per_worker = page_size::get() * 256;
    cfg
}

/// A ready-to-use worker with its depth-0 chunk already carved.
pub struct HhFixture {
    pub worker: WorkerGc,
}

impl HhFixture {
    pub fn new() -> Self {
        let worker = WorkerGc::new(0, test_config()).expect("worker init should succeed");
        HhFixture { worker }
    }

    pub fn with_config(config: HhConfig) -> Self {
        let worker = WorkerGc::new(0, config).expect("worker init should succeed");
        HhFixture { worker }
    }

    /// Extends the heap to `depth` and writes a fresh `Normal` object with
    /// `n_ptrs` zeroed pointer fields there, returning its address.
    pub fn alloc_normal(&mut self, depth: u8, non_ptr_bytes: usize, n_ptrs: usize) -> HeapPointer {
        self.worker.hh.extend_to_depth(depth).expect("extend_to_depth");
        let total = HEADER_SIZE + non_ptr_bytes + n_ptrs * std::mem::size_of::<usize>();
        let chunk = self.worker.hh.allocate_chunk(depth, total).expect("allocate_chunk");
        let addr = self.worker.hh.arena.chunk(chunk).frontier;
        self.worker.hh.arena.chunk_mut(chunk).frontier += total;
        unsafe {
            (addr as *mut Header).write(Header::new(TypeTag::Normal, non_ptr_bytes, n_ptrs));
        }
        unsafe { HeapPointer::from_addr(addr) }
    }

    /// Writes `target`'s address into `source`'s `index`-th pointer field.
    pub fn set_field(&self, source: HeapPointer, index: usize, target: HeapPointer) {
        let fields = unsafe { &*source.as_header() }.fields();
        let field_addr =
            source.data_start() + fields.non_ptr_bytes + index * std::mem::size_of::<usize>();
        unsafe { *(field_addr as *mut usize) = target.addr() };
    }

    pub fn read_field(&self, source: HeapPointer, index: usize) -> usize {
        let fields = unsafe { &*source.as_header() }.fields();
        let field_addr =
            source.data_start() + fields.non_ptr_bytes + index * std::mem::size_of::<usize>();
        unsafe { *(field_addr as *const usize) }
    }
}

impl Default for HhFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Asserts every address in `addresses` is distinct.
///
/// **Bug this finds:** a bump allocator that reissues an address it
/// already handed out, e.g. from a frontier that wasn't advanced.
#[track_caller]
pub fn assert_all_addresses_unique(addresses: &[usize], context: &str) {
    let unique: HashSet<_> = addresses.iter().collect();
    assert_eq!(
        unique.len(),
        addresses.len(),
        "{context}: {} duplicate address(es) out of {} allocations",
        addresses.len() - unique.len(),
        addresses.len()
    );
}

#[track_caller]
pub fn assert_aligned(address: usize, alignment: usize, context: &str) {
    assert_eq!(address % alignment, 0, "{context}: {address:#x} is not {alignment}-byte aligned");
}
