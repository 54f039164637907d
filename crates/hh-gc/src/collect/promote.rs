//! Deferred promotion: lifts down-pointers that cross out of the
//! collection window before tracing begins, so the forwarding engine
//! never has to special-case an edge mid-copy.

use crate::collect::{forward, CollectStats, CollectWindow, GlobalDownPtr, ToSpace};
use crate::error::Result;
use crate::heap::hh::HierarchicalHeap;

/// Walks every level's remembered set inside `window`. For each
/// `(src, &field, dst)` triple where `level(src) >= window.min`:
///
/// - if `level(dst) < window.min`, the edge crosses out of the window:
///   `src` is forwarded into to-space and the edge is recorded in the
///   returned `globalDownPtrs` list, to be re-processed as a root.
/// - otherwise the edge stays inside the window and survives via normal
///   tracing in the scan pass.
pub fn run_deferred_promotion(
    hh: &mut HierarchicalHeap,
    window: CollectWindow,
    to_space: &mut ToSpace,
    stats: &mut CollectStats,
) -> Result<Vec<GlobalDownPtr>> {
    let mut global_down_ptrs = Vec::new();

    for depth in window.min..=window.max {
        let Some(list) = hh.level(depth) else { continue };
        let Some(remset) = hh.arena.list(list).remembered_set else { continue };

        let entries: Vec<_> = hh
            .arena
            .iter_chunks(remset)
            .flat_map(|(_, chunk)| read_remset_chunk(chunk))
            .collect();

        for entry in entries {
            let src_level = hh.depth_of(entry.source.addr());
            if src_level.map(|l| l < window.min).unwrap_or(true) {
                continue;
            }

            let dst_level = hh.depth_of(entry.target.addr());
            if dst_level.map(|l| l < window.min).unwrap_or(false) {
                let forwarded_src = forward(hh, entry.source, window, to_space, stats)?;
                global_down_ptrs.push(GlobalDownPtr {
                    source: forwarded_src,
                    field_offset: entry.field_offset,
                    target: entry.target,
                });
            }
        }
    }

    Ok(global_down_ptrs)
}

/// Decodes the `(source, field_offset, target)` triples packed into one
/// remembered-set chunk. Entries are written back-to-back as they're
/// recorded by the write barrier (not modeled in this crate — the
/// barrier is outside this spec's scope — so this function assumes
/// whatever produced the chunk used `RemSetEntry`'s native layout).
fn read_remset_chunk(chunk: &crate::heap::Chunk) -> Vec<crate::heap::RemSetEntry> {
    let entry_size = std::mem::size_of::<crate::heap::RemSetEntry>();
    let count = chunk.bytes_used() / entry_size;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let addr = chunk.start + i * entry_size;
        let entry = unsafe { *(addr as *const crate::heap::RemSetEntry) };
        out.push(entry);
    }
    out
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
    fn test_promotion_is_empty_when_no_remembered_sets_exist() {
        let mut hh = test_hh();
        hh.allocate_chunk(2, 64).unwrap();
        let mut to_space = ToSpace::new(256);
        let mut stats = CollectStats::default();
        let window = CollectWindow { min: 1, max: 5 };
        let edges = run_deferred_promotion(&mut hh, window, &mut to_space, &mut stats).unwrap();
        assert!(edges.is_empty());
    }
}
