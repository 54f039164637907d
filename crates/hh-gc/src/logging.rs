//! Collector event logging.
//!
//! Structured `GcEvent`s feed both an in-process ring the test suite can
//! inspect and, when `HhConfig::verbose` is set, `log::debug!`/`info!`
//! call sites bracketed `"[worker N] ..."`, the way a fork-join scheduler
//! brackets its own per-worker diagnostics.
//!
//! Log Levels:
//! - ERROR: fatal collector errors (`Entangled`, `AllocationFailure`)
//! - INFO: cycle start/end, heap stats
//! - DEBUG: per-phase timing
//! - TRACE: promotion counts

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// A collector event, emitted at the points `collect::driver::collect_local`
/// and `world::WorkerGc::gc_if_needed` already have the relevant numbers
/// in hand.
#[derive(Debug, Clone, serde::Serialize)]
pub enum GcEvent {
    /// A local collection started on `worker_id`, scoped to `[min, max]`.
    CycleStart { worker_id: u32, cycle: u64, min: u8, max: u8 },

    /// One phase of a cycle started (promotion, forward-roots, scan).
    PhaseStart { worker_id: u32, cycle: u64, phase: String },

    /// One phase of a cycle completed.
    PhaseEnd { worker_id: u32, cycle: u64, phase: String, duration_ms: f64 },

    /// A local collection completed.
    CycleEnd { worker_id: u32, cycle: u64, duration_ms: f64, bytes_copied: usize, bytes_moved: usize },

    /// A precondition wasn't met; collection did not run.
    Skipped { worker_id: u32, reason: String },

    /// Deferred promotion lifted `count` down-pointers out of the window.
    Promoted { worker_id: u32, count: usize },

    /// Forwarding reached an object deeper than the collection window —
    /// fatal, reported just before the process aborts.
    Entangled { worker_id: u32, from_level: u8, to_level: u8 },

    /// A snapshot of one worker's heap occupancy.
    HeapStats { worker_id: u32, committed_bytes: usize, available_bytes: usize },

    /// An allocation could not be satisfied even after collecting.
    AllocationFailure { worker_id: u32, requested: usize, available: usize },
}

impl GcEvent {
    fn level(&self) -> LogLevel {
        match self {
            GcEvent::AllocationFailure { .. } | GcEvent::Entangled { .. } => LogLevel::Error,
            GcEvent::CycleStart { .. } | GcEvent::CycleEnd { .. } | GcEvent::HeapStats { .. } => {
                LogLevel::Info
            }
            GcEvent::Skipped { .. } | GcEvent::PhaseStart { .. } | GcEvent::PhaseEnd { .. } => {
                LogLevel::Debug
            }
            GcEvent::Promoted { .. } => LogLevel::Trace,
        }
    }

    fn worker_id(&self) -> u32 {
        match self {
            GcEvent::CycleStart { worker_id, .. }
            | GcEvent::PhaseStart { worker_id, .. }
            | GcEvent::PhaseEnd { worker_id, .. }
            | GcEvent::CycleEnd { worker_id, .. }
            | GcEvent::Skipped { worker_id, .. }
            | GcEvent::Promoted { worker_id, .. }
            | GcEvent::Entangled { worker_id, .. }
            | GcEvent::HeapStats { worker_id, .. }
            | GcEvent::AllocationFailure { worker_id, .. } => *worker_id,
        }
    }

    fn describe(&self) -> String {
        match self {
            GcEvent::CycleStart { cycle, min, max, .. } => {
                format!("cycle {cycle} started, window [{min}, {max}]")
            }
            GcEvent::PhaseStart { cycle, phase, .. } => format!("cycle {cycle}: {phase} started"),
            GcEvent::PhaseEnd { cycle, phase, duration_ms, .. } => {
                format!("cycle {cycle}: {phase} completed ({duration_ms:.2}ms)")
            }
            GcEvent::CycleEnd { cycle, duration_ms, bytes_copied, bytes_moved, .. } => format!(
                "cycle {cycle} completed ({duration_ms:.2}ms, {bytes_copied} bytes copied, {bytes_moved} bytes moved)"
            ),
            GcEvent::Skipped { reason, .. } => format!("collection skipped: {reason}"),
            GcEvent::Promoted { count, .. } => format!("deferred promotion lifted {count} down-pointers"),
            GcEvent::Entangled { from_level, to_level, .. } => {
                format!("entanglement: forward reached depth {to_level} outside window max {from_level}")
            }
            GcEvent::HeapStats { committed_bytes, available_bytes, .. } => {
                format!("heap: {committed_bytes} committed, {available_bytes} available")
            }
            GcEvent::AllocationFailure { requested, available, .. } => {
                format!("allocation failure: requested {requested}, available {available}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    pub level: LogLevel,
    pub route_to_log_crate: bool,
    pub json: bool,
    /// Prefix JSON console output with a wall-clock timestamp. The `log`
    /// crate route already has its own timestamp layer, so this only
    /// affects the `json` path.
    pub timestamps: bool,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        GcLoggerConfig {
            level: LogLevel::Info,
            route_to_log_crate: true,
            json: false,
            timestamps: true,
        }
    }
}

/// Collects `GcEvent`s into an in-process ring (for tests and inline
/// inspection) and, when configured, routes them through the `log` crate.
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<Vec<(Instant, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    pub fn new(config: GcLoggerConfig) -> Self {
        GcLogger { config, events: Mutex::new(Vec::new()), enabled: AtomicBool::new(true) }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() || event.level() > self.config.level {
            return;
        }

        if self.config.route_to_log_crate {
            let worker_id = event.worker_id();
            let message = event.describe();
            match event.level() {
                LogLevel::Error => log::error!("[worker {worker_id}] {message}"),
                LogLevel::Warn => log::warn!("[worker {worker_id}] {message}"),
                LogLevel::Info => log::info!("[worker {worker_id}] {message}"),
                LogLevel::Debug => log::debug!("[worker {worker_id}] {message}"),
                LogLevel::Trace => log::trace!("[worker {worker_id}] {message}"),
            }
        }

        if self.config.json {
            if let Ok(json) = serde_json::to_string(&event) {
                if self.config.timestamps {
                    let now = chrono::Local::now();
                    println!("[{}] {json}", now.format("%Y-%m-%d %H:%M:%S%.3f"));
                } else {
                    println!("{json}");
                }
            }
        }

        if let Ok(mut events) = self.events.lock() {
            events.push((Instant::now(), event));
        }
    }

    pub fn get_events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

static GLOBAL_LOGGER: OnceLock<Mutex<GcLogger>> = OnceLock::new();

fn global_logger() -> &'static Mutex<GcLogger> {
    GLOBAL_LOGGER.get_or_init(|| Mutex::new(GcLogger::default()))
}

pub fn log_event(event: GcEvent) {
    if let Ok(logger) = global_logger().lock() {
        logger.log(event);
    }
}

pub fn configure_logger(config: GcLoggerConfig) {
    if let Ok(mut logger) = global_logger().lock() {
        *logger = GcLogger::new(config);
    }
}

pub fn get_event_count() -> usize {
    global_logger().lock().map(|l| l.event_count()).unwrap_or(0)
}
