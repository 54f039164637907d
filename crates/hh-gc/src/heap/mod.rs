//! Heap module — chunk/block allocation and the hierarchical heap data
//! structure.
//!
//! A worker's heap is a fixed-size virtual memory reservation carved into
//! blocks, blocks grouped into chunks, and chunks threaded into per-depth
//! chunk lists (`HierarchicalHeap::levels`). Unlike a region-based
//! collector with shared, concurrently-relocated regions, every type in
//! this module is owned exclusively by the one worker collecting it —
//! there is no cross-worker sharing to synchronize.

pub mod block;
pub mod chunk;
pub mod hh;
pub mod virtual_memory;

pub use block::{containing_block, BlockHeader, BLOCK_MAGIC};
pub use chunk::{Chunk, ChunkArena, ChunkId, ChunkList, ChunkListId, RemSetEntry, CHUNK_MAGIC};
pub use hh::{HhStats, HierarchicalHeap};
pub use virtual_memory::VirtualMemory;
