//! Thin `extern "C"` shim exposing `hh_gc`'s world/thread lifecycle,
//! mutator allocation, and work-stealing deque entry points to generated
//! code, statically or dynamically linked per `[lib] crate-type`.

mod gc;

pub use gc::*;
