//! Admission control for fetches.
//!
//! A counting semaphore with capacity `concurrency` gates every fetch. Each
//! admitted fetch holds an `AdmissionPermit` until its response has been
//! handed downstream; dropping the permit frees the slot. The controller
//! also keeps an in-flight gauge and its high-water mark so the monitor and
//! tests can observe how many fetches actually overlapped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of concurrently in-flight fetches.
#[derive(Debug)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// One admitted slot. Released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    controller: Arc<AdmissionController>,
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(AdmissionController {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    /// Waits for a free slot.
    ///
    /// Infallible: the semaphore is private to the controller and is never
    /// closed, so the only outcome is a permit.
    pub async fn acquire(self: &Arc<Self>) -> AdmissionPermit {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("admission semaphore is never closed"),
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        AdmissionPermit {
            _permit: permit,
            controller: Arc::clone(self),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously admitted fetches seen so far.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        // Decrement before the semaphore permit is returned so the gauge
        // never reads above capacity.
        self.controller.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
