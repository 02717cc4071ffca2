use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    submitted_total: AtomicU64,
    completed_total: AtomicU64,
    rejected_total: AtomicU64,
    failed_total: AtomicU64,
    timed_out_total: AtomicU64,
    sandboxes_in_flight: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) {
        self.submitted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sandbox_started(&self) {
        self.sandboxes_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sandbox_finished(&self) {
        self.decrement_in_flight();
    }

    pub fn completed(&self) {
        self.completed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timed_out(&self) {
        self.timed_out_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        format!(
            concat!(
                "# TYPE execution_submitted_total counter\n",
                "execution_submitted_total {}\n",
                "# TYPE execution_completed_total counter\n",
                "execution_completed_total {}\n",
                "# TYPE execution_rejected_total counter\n",
                "execution_rejected_total {}\n",
                "# TYPE execution_failed_total counter\n",
                "execution_failed_total {}\n",
                "# TYPE execution_timed_out_total counter\n",
                "execution_timed_out_total {}\n",
                "# TYPE sandboxes_in_flight gauge\n",
                "sandboxes_in_flight {}\n"
            ),
            self.submitted_total.load(Ordering::Relaxed),
            self.completed_total.load(Ordering::Relaxed),
            self.rejected_total.load(Ordering::Relaxed),
            self.failed_total.load(Ordering::Relaxed),
            self.timed_out_total.load(Ordering::Relaxed),
            self.sandboxes_in_flight.load(Ordering::Relaxed),
        )
    }

    fn decrement_in_flight(&self) {
        let mut current = self.sandboxes_in_flight.load(Ordering::Relaxed);
        while current > 0 {
            match self.sandboxes_in_flight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}
