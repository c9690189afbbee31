// src/models/pipeline.rs

//! Pipeline status, processing results and aggregate metrics.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{JobDetails, JobReference};

/// Terminal state of a single processed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Success,
    Failed,
    Duplicate,
}

/// Outcome of processing one job reference end to end.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub reference: JobReference,
    pub status: ProcessingStatus,
    pub details: Option<JobDetails>,
    pub error: Option<String>,
    pub processing_time: Duration,
}

/// Aggregate counters for the pipeline; updated exactly once per terminal
/// state transition.
#[derive(Debug, Clone, Default)]
pub struct ProcessingMetrics {
    pub discovery_cycles: u64,
    pub last_discovery_at: Option<DateTime<Utc>>,
    pub jobs_discovered: u64,

    pub jobs_processed: u64,
    pub jobs_successful: u64,
    pub jobs_failed: u64,
    pub jobs_duplicate: u64,

    pub total_processing_time: Duration,
    pub average_processing_time: Duration,

    pub success_rate: f64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl ProcessingMetrics {
    /// Record one terminal transition.
    pub fn record(&mut self, status: ProcessingStatus, duration: Duration) {
        self.jobs_processed += 1;
        match status {
            ProcessingStatus::Success => self.jobs_successful += 1,
            ProcessingStatus::Failed => self.jobs_failed += 1,
            ProcessingStatus::Duplicate => self.jobs_duplicate += 1,
        }

        self.total_processing_time += duration;
        self.average_processing_time = self.total_processing_time / self.jobs_processed as u32;
        self.success_rate = self.calculate_success_rate();
        self.last_processed_at = Some(Utc::now());
    }

    /// Record one completed discovery cycle.
    pub fn record_discovery(&mut self, discovered: usize) {
        self.discovery_cycles += 1;
        self.jobs_discovered += discovered as u64;
        self.last_discovery_at = Some(Utc::now());
    }

    /// Percentage of processed references that reached the success state.
    pub fn calculate_success_rate(&self) -> f64 {
        if self.jobs_processed == 0 {
            return 0.0;
        }
        self.jobs_successful as f64 / self.jobs_processed as f64 * 100.0
    }
}

/// Snapshot of the orchestrator's view of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub queue_size: usize,
    pub discovery_sources: usize,
    pub enrichment_scrapers: usize,
    pub start_time: DateTime<Utc>,
    pub uptime: Duration,
    pub metrics: ProcessingMetrics,
}
