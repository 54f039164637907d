//! The local copying collector: forwarding, deferred promotion, and the
//! driver that orchestrates both into one `collect_local` pass.

pub mod driver;
pub mod forward;
pub mod promote;

pub use driver::{collect_local, CollectOutcome};
pub use forward::forward;
pub use promote::run_deferred_promotion;

use crate::heap::ChunkListId;
use crate::object::HeapPointer;

/// The `[min, max]` depth window a single local collection is scoped to.
#[derive(Debug, Clone, Copy)]
pub struct CollectWindow {
    pub min: u8,
    pub max: u8,
}

impl CollectWindow {
    pub fn contains(&self, depth: u8) -> bool {
        depth >= self.min && depth <= self.max
    }
}

/// The to-space under construction for one collection: one optional
/// chunk list per depth, indexed the same way `HierarchicalHeap::levels`
/// is. Lists are created lazily as `forward` first needs to copy into
/// them and carry the `COPY_OBJECT_HH` sentinel owner until the driver
/// installs them.
#[derive(Debug, Default)]
pub struct ToSpace {
    lists: Vec<Option<ChunkListId>>,
}

impl ToSpace {
    pub fn new(max_depth: usize) -> Self {
        ToSpace { lists: vec![None; max_depth] }
    }

    pub fn get(&self, depth: u8) -> Option<ChunkListId> {
        self.lists[depth as usize]
    }

    pub fn set(&mut self, depth: u8, list: ChunkListId) {
        self.lists[depth as usize] = Some(list);
    }
}

/// A down-pointer edge lifted out of the collection window by deferred
/// promotion, to be re-processed as a root by the driver.
#[derive(Debug, Clone, Copy)]
pub struct GlobalDownPtr {
    pub source: HeapPointer,
    pub field_offset: usize,
    pub target: HeapPointer,
}

/// Running totals for one `collect_local` pass. Bytes are attributed
/// exactly once per object, at the point `forward::copy_object` actually
/// relocates it — every other caller (root forwarding, deferred
/// promotion, to-space scanning) shares this accumulator instead of
/// inferring the copied/moved split from its own vantage point, since
/// `forward` is the only place that knows whether an object took the
/// single-object-chunk move or the memcpy path.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectStats {
    pub bytes_copied: usize,
    pub bytes_moved: usize,
}

impl CollectStats {
    pub fn record_copied(&mut self, bytes: usize) {
        self.bytes_copied += bytes;
    }

    pub fn record_moved(&mut self, bytes: usize) {
        self.bytes_moved += bytes;
    }
}
