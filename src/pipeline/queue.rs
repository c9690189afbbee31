// src/pipeline/queue.rs

//! Bounded work queue between discovery and enrichment.
//!
//! FIFO, thread-safe. `enqueue` suspends while the queue is full so a slow
//! enrichment side applies backpressure to discovery instead of dropping
//! references; `dequeue` never blocks.

use std::collections::VecDeque;
use std::sync::Mutex;

use prometheus::Gauge;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::metrics::MetricsHub;
use crate::models::JobReference;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Thread-safe bounded FIFO of job references.
pub struct JobQueue {
    items: Mutex<VecDeque<JobReference>>,
    capacity: usize,
    space: Notify,
    size_gauge: Gauge,
}

impl JobQueue {
    /// Create a queue with the given capacity (0 falls back to the default).
    pub fn new(capacity: usize, hub: &MetricsHub) -> Result<Self> {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        let size_gauge = hub.gauge(
            "job_reference_queue_size",
            "The size of the job reference queue",
        )?;
        Ok(Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            space: Notify::new(),
            size_gauge,
        })
    }

    /// Add a reference, waiting for space when the queue is full.
    ///
    /// Returns `AppError::Cancelled` when the ambient scope is cancelled
    /// before space becomes available.
    pub async fn enqueue(&self, job: JobReference, cancel: &CancellationToken) -> Result<()> {
        let mut job = Some(job);
        loop {
            // Arm the notification before checking so a concurrent dequeue
            // between the check and the await cannot be missed.
            let notified = self.space.notified();
            {
                let mut items = self.items.lock().unwrap();
                if items.len() < self.capacity {
                    items.push_back(job.take().unwrap());
                    self.size_gauge.set(items.len() as f64);
                    return Ok(());
                }
            }

            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
            }
        }
    }

    /// Remove and return the next reference, or `None` when empty.
    pub fn dequeue(&self) -> Option<JobReference> {
        let mut items = self.items.lock().unwrap();
        let job = items.pop_front();
        if job.is_some() {
            self.size_gauge.set(items.len() as f64);
            self.space.notify_one();
        }
        job
    }

    /// Current number of queued references.
    pub fn size(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
