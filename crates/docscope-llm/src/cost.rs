//! Shared cost accumulator.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing USD cost accumulator.
///
/// Shared by reference across every concurrent service call of one logical
/// operation. The `f64` total is stored as raw bits and updated with a
/// compare-and-swap loop.
#[derive(Debug, Default)]
pub struct CostTracker {
    bits: AtomicU64,
}

impl CostTracker {
    /// Create a tracker at zero.
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Add a non-negative amount. Negative and non-finite amounts are ignored.
    pub fn add(&self, amount: f64) {
        if !(amount.is_finite() && amount > 0.0) {
            return;
        }
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + amount).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Total accumulated so far.
    pub fn total(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
