// src/ingest/scheduler.rs
use std::time::Duration;

use tokio::time::Instant;

/// Fixed-interval job schedule checked from the poll loop.
///
/// The next run is due `interval` after the previous run *finished*, so a slow
/// job never queues back-to-back runs.
#[derive(Clone, Copy, Debug)]
pub struct JobSchedule {
    interval: Duration,
    next_run: Instant,
}

impl JobSchedule {
    /// First run due one `interval` from now.
    pub fn every(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, registered: Instant) -> Self {
        Self {
            interval,
            next_run: registered + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_run(&self) -> Instant {
        self.next_run
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_run
    }

    pub fn mark_ran(&mut self, finished: Instant) {
        self.next_run = finished + self.interval;
    }
}
