//! Runtime configuration.
//!
//! `HhConfig` gathers every tunable named by the external interface table:
//! the collection window bounds (`hh_collection_level`, `min_local_level`),
//! the deferred-promotion switch (fixed `true`, kept as a field for
//! forward-compatibility rather than a free-floating constant), and the
//! ambient sizing/observability knobs a deployed runtime needs but which
//! the core algorithm description left as "configuration" without
//! prescribing defaults.

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// Maximum fork-nesting depth a hierarchical heap can be extended to.
/// See SPEC_FULL.md §3 ("Addressing").
pub const MAX_DEPTH: u8 = 256;

#[derive(Debug, Clone)]
pub struct HhConfig {
    /// Size of one block, the unit the chunk allocator carves from the
    /// worker's mmap reservation.
    ///
    /// Default: 1MB
    pub block_size: usize,

    /// Upper bound on the mmap reservation backing one worker's heap.
    /// Exceeding this while allocating chunks raises `OutOfHeap`.
    ///
    /// Default: 512MB
    pub max_heap_size_per_worker: usize,

    /// Below this level, collections never run: the mutator is still in
    /// the "shallow" part of the fork tree where a copy is unlikely to pay
    /// for itself. Corresponds to `min_local_level` in the external
    /// interface table.
    ///
    /// Default: 1
    pub min_local_level: u8,

    /// The deepest level a single local collection is allowed to span
    /// (the window's `max`, before the caller's own depth bounds it
    /// further). Corresponds to `hh_collection_level`.
    ///
    /// Default: `MAX_DEPTH`
    pub hh_collection_level: u8,

    /// Deferred promotion is always enabled; this field exists so the
    /// configuration surface matches spec.md §6's table entry rather than
    /// hiding the behavior behind an undocumented constant. Setting it to
    /// `false` is rejected by `validate`.
    ///
    /// Default: true
    pub deferred_promotion: bool,

    /// Fixed capacity, in tasks, of each worker's Chase-Lev deque. Unlike
    /// a general-purpose work queue this never grows: pushing past
    /// capacity returns `false` (`ForkDepthExceeded`), per SPEC_FULL.md
    /// §4.E — more nested live forks than this allows is a scheduler
    /// configuration error, not something to paper over by reallocating a
    /// ring buffer another thief might be mid-steal on.
    ///
    /// Default: 1024
    pub deque_capacity: usize,

    /// Emit per-phase timing into the collector's event log
    /// (`GcEvent::PhaseStart`/`PhaseEnd`). Costs an `Instant::now()` call
    /// per phase; cheap relative to a collection, but skippable.
    ///
    /// Default: true
    pub detailed_gc_time: bool,

    /// Route collector events through `log::debug!`/`info!` in addition
    /// to the in-process event buffer.
    ///
    /// Default: false
    pub verbose: bool,

    /// Collect per-worker `GcStats` (cycle counts, bytes copied, pause
    /// histogram). Disabling avoids the histogram's bucket-update cost on
    /// the hot allocation path.
    ///
    /// Default: true
    pub stats_enabled: bool,
}

impl Default for HhConfig {
    fn default() -> Self {
        HhConfig {
            block_size: MB,
            max_heap_size_per_worker: 512 * MB,
            min_local_level: 1,
            hh_collection_level: MAX_DEPTH,
            deferred_promotion: true,
            deque_capacity: 1024,
            detailed_gc_time: true,
            verbose: false,
            stats_enabled: true,
        }
    }
}

impl HhConfig {
    /// Checks internal consistency. Called once at `World::init` and
    /// whenever a config is rebuilt from the environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0
            || self.block_size % page_size::get() != 0
            || !self.block_size.is_power_of_two()
        {
            return Err(ConfigError::InvalidBlockSize(format!(
                "block_size must be a nonzero power-of-two multiple of the page size ({})",
                page_size::get()
            )));
        }

        if self.max_heap_size_per_worker < self.block_size {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_size_per_worker must be at least one block".to_string(),
            ));
        }

        if self.max_heap_size_per_worker > 64 * GB {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_size_per_worker exceeds the supported range".to_string(),
            ));
        }

        if self.hh_collection_level < self.min_local_level {
            return Err(ConfigError::InvalidLevelBounds(format!(
                "hh_collection_level ({}) must be >= min_local_level ({})",
                self.hh_collection_level, self.min_local_level
            )));
        }

        if !self.deferred_promotion {
            return Err(ConfigError::DeferredPromotionRequired);
        }

        if self.deque_capacity == 0 || !self.deque_capacity.is_power_of_two() {
            return Err(ConfigError::InvalidDequeCapacity(
                "deque_capacity must be a nonzero power of two".to_string(),
            ));
        }

        Ok(())
    }

    /// Builds configuration from environment variables, overriding
    /// defaults:
    ///
    /// - `HH_MAX_HEAP`
    /// - `HH_BLOCK_SIZE`
    /// - `HH_COLLECTION_LEVEL`
    /// - `HH_MIN_LOCAL_LEVEL`
    /// - `HH_VERBOSE`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("HH_MAX_HEAP") {
            if let Ok(size) = val.parse::<usize>() {
                config.max_heap_size_per_worker = size;
            }
        }

        if let Ok(val) = std::env::var("HH_BLOCK_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.block_size = size;
            }
        }

        if let Ok(val) = std::env::var("HH_COLLECTION_LEVEL") {
            if let Ok(level) = val.parse::<u8>() {
                config.hh_collection_level = level;
            }
        }

        if let Ok(val) = std::env::var("HH_MIN_LOCAL_LEVEL") {
            if let Ok(level) = val.parse::<u8>() {
                config.min_local_level = level;
            }
        }

        if let Ok(val) = std::env::var("HH_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Errors raised by `HhConfig::validate`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid block size: {0}")]
    InvalidBlockSize(String),
    #[error("invalid heap size: {0}")]
    InvalidHeapSize(String),
    #[error("invalid level bounds: {0}")]
    InvalidLevelBounds(String),
    #[error("deferred promotion cannot be disabled")]
    DeferredPromotionRequired,
    #[error("invalid deque capacity: {0}")]
    InvalidDequeCapacity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(HhConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_heap_smaller_than_block() {
        let mut cfg = HhConfig::default();
        cfg.block_size = MB;
        cfg.max_heap_size_per_worker = 1024;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_level_bounds() {
        let mut cfg = HhConfig::default();
        cfg.min_local_level = 10;
        cfg.hh_collection_level = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_non_power_of_two_deque_capacity() {
        let mut cfg = HhConfig::default();
        cfg.deque_capacity = 100;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_disabling_deferred_promotion() {
        let mut cfg = HhConfig::default();
        cfg.deferred_promotion = false;
        assert!(cfg.validate().is_err());
    }
}
