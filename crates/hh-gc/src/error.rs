//! Error taxonomy for the hierarchical-heap runtime.
//!
//! Every variant here is fatal: a local collection that hits one of these
//! conditions cannot make progress and aborts the collecting worker. There
//! is no recoverable-error path in this crate the way a general-purpose
//! allocator might retry with a smaller request — `OutOfHeap` means the
//! reservation is exhausted, not that a free list came up empty.

use thiserror::Error;

/// Errors produced by the hierarchical-heap allocator and collector.
#[derive(Debug, Error)]
pub enum HhError {
    /// The per-worker heap reservation is exhausted and no further chunks
    /// can be committed to satisfy an allocation.
    #[error("out of heap: requested {requested} bytes, {available} available")]
    OutOfHeap { requested: usize, available: usize },

    /// A fork nested past `MAX_DEPTH` local scopes.
    #[error("fork depth exceeded: attempted depth {attempted}, max is {max}")]
    ForkDepthExceeded { attempted: u8, max: u8 },

    /// An object at a shallower level was found to point into a deeper,
    /// sibling-private level during forwarding — the heap-separation
    /// invariant has been violated.
    #[error("entanglement detected: object at level {from_level} references level {to_level}")]
    Entanglement { from_level: u8, to_level: u8 },

    /// A weak reference was encountered while collecting a local scope.
    /// Weak objects may only be allocated at depth 0; see `HhConfig` and
    /// the collector's Open Question resolution in DESIGN.md.
    #[error("weak reference encountered during local collection at level {level}")]
    WeakDuringLocal { level: u8 },

    /// A debug-only consistency check failed. Compiled out of release
    /// builds; never expect to observe this outside `debug_assertions`.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// The configuration supplied to `HhConfig::validate` is internally
    /// inconsistent.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl HhError {
    /// Every `HhError` is fatal to the worker that raised it. This method
    /// exists for parity with the diagnostic surface other collectors in
    /// this codebase's lineage expose, not because callers are expected to
    /// retry.
    pub fn is_recoverable(&self) -> bool {
        false
    }

    /// True for conditions that indicate a bug in this crate (as opposed
    /// to resource exhaustion or a mutator-level protocol violation).
    pub fn is_bug(&self) -> bool {
        matches!(self, HhError::InvariantViolated(_) | HhError::Entanglement { .. })
    }
}

pub type Result<T> = std::result::Result<T, HhError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_heap_is_not_recoverable() {
        let err = HhError::OutOfHeap { requested: 4096, available: 0 };
        assert!(!err.is_recoverable());
        assert!(!err.is_bug());
    }

    #[test]
    fn test_entanglement_is_a_bug() {
        let err = HhError::Entanglement { from_level: 1, to_level: 3 };
        assert!(err.is_bug());
    }

    #[test]
    fn test_weak_during_local_formats_level() {
        let err = HhError::WeakDuringLocal { level: 2 };
        assert_eq!(err.to_string(), "weak reference encountered during local collection at level 2");
    }
}
