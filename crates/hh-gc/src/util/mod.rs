//! Shared helpers used across the chunk allocator, mutator, and
//! collector.

pub mod alignment;

pub use alignment::Alignment;
