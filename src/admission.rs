// ABOUTME: Per-process admission control for concurrent streams
// ABOUTME: Slots are RAII guards so every exit path releases exactly once

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts in-flight streams against a fixed ceiling.
///
/// Not shared across instances; each process enforces its own ceiling.
#[derive(Debug)]
pub struct Admission {
    max: usize,
    in_flight: AtomicUsize,
}

impl Admission {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            max,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Check-and-increment. Returns false once the ceiling is reached.
    pub fn try_acquire(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Decrement, floored at zero.
    pub fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Acquire a slot that is released when dropped
    pub fn acquire_slot(self: &Arc<Self>) -> Option<AdmissionSlot> {
        self.try_acquire().then(|| AdmissionSlot {
            admission: Arc::clone(self),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// One unit of stream capacity
#[derive(Debug)]
pub struct AdmissionSlot {
    admission: Arc<Admission>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.admission.release();
    }
}
