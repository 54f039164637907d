//! Chase–Lev work-stealing deque, extended with a co-located `depth`
//! field used for local-scope claiming during collection.
//!
//! This is the one component in the crate where precision matters more
//! than idiom: every operation below implements the exact memory-ordering
//! contract from SPEC_FULL.md §4.E, not a generic `crossbeam-deque`
//! substitute — this crate needs the deque's `bot` cursor to double as
//! "next depth to collect" (§4.F), a use `crossbeam-deque` was never
//! designed for.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicIsize, Ordering};

/// One task entry: an opaque handle to a forked computation, plus the
/// depth it runs at. `set_depth`/`try_claim_local_scope` operate on the
/// depth carried by the deque's cursors, not on this field — `depth`
/// here is the payload a thief or owner actually wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    pub handle: std::num::NonZeroUsize,
    pub depth: u8,
}

/// A single slot in the deque's ring buffer.
struct Slot<T>(UnsafeCell<Option<T>>);

unsafe impl<T: Send> Sync for Slot<T> {}

/// Fixed-capacity Chase–Lev deque. Capacity must be a power of two so
/// `index mod CAP` reduces to a mask.
pub struct Deque<T> {
    bot: CachePadded<AtomicIsize>,
    top: CachePadded<AtomicIsize>,
    buffer: Box<[Slot<T>]>,
    mask: isize,
}

impl<T: Copy> Deque<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "deque capacity must be a power of two");
        let buffer = (0..capacity).map(|_| Slot(UnsafeCell::new(None))).collect::<Vec<_>>().into_boxed_slice();
        Deque {
            bot: CachePadded::new(AtomicIsize::new(0)),
            top: CachePadded::new(AtomicIsize::new(0)),
            buffer,
            mask: capacity as isize - 1,
        }
    }

    #[inline]
    fn slot(&self, index: isize) -> &Slot<T> {
        &self.buffer[(index & self.mask) as usize]
    }

    /// Owner-only. Pushes `task` onto the bottom of the deque. Returns
    /// `false` (instead of growing) when the deque is full — callers
    /// treat this as the fatal "fork depth exceeded" condition, since a
    /// full deque here means more nested forks are live than the
    /// configured capacity allows.
    pub fn push_bot(&self, task: T) -> bool {
        let b = self.bot.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);

        if b - t >= self.mask + 1 {
            return false;
        }

        unsafe { *self.slot(b).0.get() = Some(task) };
        std::sync::atomic::fence(Ordering::Release);
        self.bot.store(b + 1, Ordering::Relaxed);
        true
    }

    /// Owner-only. Pops from the bottom. Returns `None` if the deque was
    /// empty, or if the last element was lost to a racing thief.
    pub fn try_pop_bot(&self) -> Option<T> {
        let b = self.bot.load(Ordering::Relaxed) - 1;
        self.bot.store(b, Ordering::Relaxed);
        std::sync::atomic::fence(Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);

        if t > b {
            // Deque was empty; restore bot.
            self.bot.store(b + 1, Ordering::Relaxed);
            return None;
        }

        let task = unsafe { *self.slot(b).0.get() };

        if t < b {
            // Clear win, no contest with thieves.
            return task;
        }

        // t == b: the last element. Race a thief for it via the top CAS.
        let won = self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.bot.store(b + 1, Ordering::Relaxed);
        if won {
            task
        } else {
            None
        }
    }

    /// Any thief. Steals from the top. Spurious `None` on a lost race
    /// against the owner or another thief is permitted and expected.
    pub fn try_pop_top(&self) -> Option<T> {
        let t = self.top.load(Ordering::Acquire);
        std::sync::atomic::fence(Ordering::SeqCst);
        let b = self.bot.load(Ordering::Acquire);

        if t >= b {
            return None;
        }

        let task = unsafe { *self.slot(t).0.get() };

        match self.top.compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => task,
            Err(_) => None,
        }
    }

    /// Sets the depth cursor directly. Precondition: the deque must be
    /// empty (`top == bot`); violating this is a logic bug in the caller,
    /// not a runtime condition, so it panics rather than returning a
    /// recoverable error.
    pub fn set_depth(&self, depth: isize) {
        let t = self.top.load(Ordering::SeqCst);
        let b = self.bot.load(Ordering::SeqCst);
        assert_eq!(t, b, "set_depth requires an empty deque");

        // Intermediate observers must still see an empty deque, so widen
        // from whichever side moves outward first.
        if depth < b {
            self.bot.store(depth, Ordering::SeqCst);
            self.top.store(depth, Ordering::SeqCst);
        } else {
            self.top.store(depth, Ordering::SeqCst);
            self.bot.store(depth, Ordering::SeqCst);
        }
    }

    #[inline]
    pub fn depth(&self) -> isize {
        self.bot.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        let b = self.bot.load(Ordering::SeqCst);
        let t = self.top.load(Ordering::SeqCst);
        t >= b
    }

    /// Attempts to claim the current depth as an exclusive local
    /// collection scope: a `try_pop_bot` whose success means this depth
    /// is now reserved for the caller. Returns the claimed depth.
    pub fn try_claim_local_scope(&self) -> Option<isize> {
        let before = self.bot.load(Ordering::Relaxed);
        self.try_pop_bot().map(|_| before - 1)
    }

    /// Restores `bot` to `original_bot`, releasing a scope claimed by
    /// `try_claim_local_scope`.
    pub fn release_local_scope(&self, original_bot: isize) {
        self.bot.store(original_bot, Ordering::SeqCst);
    }
}

unsafe impl<T: Send> Send for Deque<T> {}
unsafe impl<T: Send> Sync for Deque<T> {}
