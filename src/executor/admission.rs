//! Process-wide gate bounding how many sandboxes run at once.
//!
//! A counting semaphore gives the same acquire/release contract as an atomic
//! counter polled in a loop, without the polling latency: the increment is
//! strictly gated below the ceiling, and the slot is released exactly once
//! via RAII no matter which path the request exits on.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use anyhow::Context;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ExecError;

#[derive(Clone)]
pub struct AdmissionController {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

/// One unit of concurrency capacity. Dropping it frees the slot.
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl AdmissionController {
    pub fn new(ceiling: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(ceiling.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Suspends until a slot is free. No fairness guarantee beyond the
    /// semaphore's own waiter ordering.
    pub async fn acquire(&self) -> Result<AdmissionSlot, ExecError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("admission semaphore closed")?;
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Ok(AdmissionSlot {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}
