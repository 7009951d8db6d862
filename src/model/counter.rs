//! Thread-safe integer counter.

use std::sync::atomic::{AtomicI64, Ordering};

/// A bidirectional counter with capped increment and decrement.
///
/// Used for per-destination in-flight request tracking.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicI64,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Add one and return the new value.
    pub fn increment(&self) -> i64 {
        self.value.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Subtract one and return the new value.
    pub fn decrement(&self) -> i64 {
        self.value.fetch_sub(1, Ordering::Relaxed) - 1
    }

    /// Add `delta` and return the new value.
    pub fn add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::Relaxed) + delta
    }

    /// Increment unless the value has already reached `max`.
    pub fn increment_capped(&self, max: i64) -> bool {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            if current >= max {
                return false;
            }
            match self.value.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Decrement unless the value has already reached `min`.
    pub fn decrement_capped(&self, min: i64) -> bool {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            if current <= min {
                return false;
            }
            match self.value.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}
