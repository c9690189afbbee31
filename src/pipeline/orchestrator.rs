// src/pipeline/orchestrator.rs

//! Pipeline orchestrator.
//!
//! Owns the two long-lived activities: a periodic discovery tick that fills
//! the work queue, and the enrichment loop that drains it through dedup,
//! enrichment and persistence. Both observe one cancellation token.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{
    JobReference, PipelineStatus, ProcessingMetrics, ProcessingResult, ProcessingStatus,
};
use crate::pipeline::JobQueue;
use crate::services::{DedupFilter, Discoverer, Enricher, Persister};

/// Timing knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How often a discovery cycle runs
    pub discovery_interval: Duration,
    /// Idle delay between polls of an empty queue
    pub poll_delay: Duration,
    /// How long `stop` waits for both activities to exit
    pub drain_window: Duration,
    /// Number of enrichment workers drawing from the queue
    pub workers: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(10 * 60),
            poll_delay: Duration::from_millis(100),
            drain_window: Duration::from_secs(10),
            workers: 1,
        }
    }
}

/// Coordinates the discover → dedupe → enrich → persist pipeline.
pub struct Orchestrator {
    config: OrchestratorConfig,
    discovery: Arc<dyn Discoverer>,
    enrichment: Arc<dyn Enricher>,
    persistence: Arc<dyn Persister>,
    dedup: Arc<DedupFilter>,
    queue: Arc<JobQueue>,
    cancel: CancellationToken,
    metrics: Mutex<ProcessingMetrics>,
    start_time: DateTime<Utc>,
    started: Instant,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given stages.
    ///
    /// The cancellation token is provided by the caller and flows into every
    /// stage operation.
    pub fn new(
        config: OrchestratorConfig,
        discovery: Arc<dyn Discoverer>,
        enrichment: Arc<dyn Enricher>,
        persistence: Arc<dyn Persister>,
        dedup: Arc<DedupFilter>,
        queue: Arc<JobQueue>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            discovery,
            enrichment,
            persistence,
            dedup,
            queue,
            cancel,
            metrics: Mutex::new(ProcessingMetrics::default()),
            start_time: Utc::now(),
            started: Instant::now(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the discovery ticker and the enrichment workers.
    pub fn start(self: &Arc<Self>) {
        tracing::info!("Starting job processing pipeline");

        let this = Arc::clone(self);
        let discovery_task = tokio::spawn(async move { this.run_discovery_worker().await });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(discovery_task);

        for worker in 0..self.config.workers.max(1) {
            let this = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                this.run_enrichment_worker(worker).await;
            }));
        }

        tracing::info!("Job processing pipeline started successfully");
    }

    /// Signal shutdown and wait for both activities within the drain window.
    ///
    /// The persistence buffer is flushed best-effort before returning.
    pub async fn stop(&self) {
        tracing::info!("Stopping job processing pipeline");
        self.cancel.cancel();

        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        let drain = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(self.config.drain_window, drain)
            .await
            .is_err()
        {
            tracing::warn!(
                "Pipeline did not drain within {:?}",
                self.config.drain_window
            );
        }

        if let Err(e) = self.persistence.flush().await {
            tracing::error!("Failed to flush persistence buffer on shutdown: {e}");
        }
    }

    /// Snapshot of queue depth, configured stages and processing metrics.
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            queue_size: self.queue.size(),
            discovery_sources: self.discovery.source_count(),
            enrichment_scrapers: self.enrichment.scraper_count(),
            start_time: self.start_time,
            uptime: self.started.elapsed(),
            metrics: self.metrics(),
        }
    }

    /// Snapshot of the processing metrics.
    pub fn metrics(&self) -> ProcessingMetrics {
        self.metrics.lock().unwrap().clone()
    }

    async fn run_discovery_worker(&self) {
        // The first tick completes immediately, giving one cycle at startup
        let mut ticker = tokio::time::interval(self.config.discovery_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Discovery worker shutting down");
                    return;
                }
                _ = ticker.tick() => self.run_discovery_cycle().await,
            }
        }
    }

    async fn run_discovery_cycle(&self) {
        tracing::info!("Starting job discovery cycle");
        let start = Instant::now();

        let references = self.discovery.discover_all(&self.cancel).await;

        let mut enqueued = 0usize;
        for reference in references {
            // Only complete references may enter the queue
            if !reference.is_valid() {
                tracing::warn!(
                    "Skipping incomplete reference from {}: {:?}",
                    reference.company_name,
                    reference.external_id
                );
                continue;
            }
            if self.queue.enqueue(reference, &self.cancel).await.is_err() {
                tracing::info!("Discovery cycle interrupted by shutdown");
                return;
            }
            enqueued += 1;
        }

        self.metrics.lock().unwrap().record_discovery(enqueued);
        tracing::info!(
            "Discovery cycle completed in {:?} - added {enqueued} job references to queue",
            start.elapsed()
        );
    }

    async fn run_enrichment_worker(&self, worker: usize) {
        tracing::info!("Starting enrichment worker {worker}");

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Enrichment worker {worker} shutting down");
                return;
            }

            let Some(reference) = self.queue.dequeue() else {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
                continue;
            };

            let start = Instant::now();
            match self.process_reference(reference).await {
                Some(mut result) => {
                    result.processing_time = start.elapsed();
                    self.metrics
                        .lock()
                        .unwrap()
                        .record(result.status, result.processing_time);
                    log_result(&result);
                }
                // Cancelled mid-flight; not a terminal state
                None => return,
            }
        }
    }

    /// Run one reference through dedup, enrichment and persistence.
    ///
    /// Returns `None` when the ambient scope was cancelled mid-processing;
    /// cancellation is not classified as a failure.
    async fn process_reference(&self, reference: JobReference) -> Option<ProcessingResult> {
        if !self.dedup.mark(&reference.external_id) {
            tracing::debug!("Job reference already processed: {}", reference.external_id);
            return Some(ProcessingResult {
                reference,
                status: ProcessingStatus::Duplicate,
                details: None,
                error: None,
                processing_time: Duration::ZERO,
            });
        }

        let mut details = match self.enrichment.enrich(&reference, &self.cancel).await {
            Ok(details) => details,
            Err(AppError::Cancelled) => return None,
            Err(err) => {
                return Some(ProcessingResult {
                    reference,
                    status: ProcessingStatus::Failed,
                    details: None,
                    error: Some(err.to_string()),
                    processing_time: Duration::ZERO,
                })
            }
        };

        match self.persistence.save(&mut details).await {
            Ok(()) => Some(ProcessingResult {
                reference,
                status: ProcessingStatus::Success,
                details: Some(details),
                error: None,
                processing_time: Duration::ZERO,
            }),
            Err(AppError::Cancelled) => None,
            Err(err) => Some(ProcessingResult {
                reference,
                status: ProcessingStatus::Failed,
                details: None,
                error: Some(err.to_string()),
                processing_time: Duration::ZERO,
            }),
        }
    }
}

fn log_result(result: &ProcessingResult) {
    match result.status {
        ProcessingStatus::Success => tracing::debug!(
            "Successfully processed job {} in {:?}",
            result.reference.external_id,
            result.processing_time
        ),
        ProcessingStatus::Failed => tracing::error!(
            "Failed to process job {} ({}): {}",
            result.reference.external_id,
            result.reference.url,
            result.error.as_deref().unwrap_or("unknown error")
        ),
        ProcessingStatus::Duplicate => {
            tracing::debug!("Skipped duplicate job {}", result.reference.external_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::Result;
    use crate::metrics::MetricsHub;
    use crate::models::{content_hash, JobDetails};
    use crate::services::{PersistenceConfig, PersistenceService};
    use crate::storage::MemoryStore;

    fn reference(id: &str) -> JobReference {
        JobReference {
            external_id: id.to_string(),
            url: format!("https://ex.com/jobs/{id}/"),
            company_name: "Example".to_string(),
        }
    }

    /// Emits a fixed reference list on the first cycle, then nothing.
    struct StubDiscoverer {
        references: Mutex<Vec<JobReference>>,
    }

    #[async_trait]
    impl Discoverer for StubDiscoverer {
        async fn discover_all(&self, _cancel: &CancellationToken) -> Vec<JobReference> {
            std::mem::take(&mut *self.references.lock().unwrap())
        }

        fn source_count(&self) -> usize {
            1
        }
    }

    /// Succeeds for every reference except ids starting with "bad".
    struct StubEnricher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Enricher for StubEnricher {
        async fn enrich(
            &self,
            reference: &JobReference,
            _cancel: &CancellationToken,
        ) -> Result<JobDetails> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if reference.external_id.starts_with("bad") {
                return Err(AppError::extraction("could not extract job title"));
            }
            Ok(JobDetails {
                external_id: reference.external_id.clone(),
                company_name: reference.company_name.clone(),
                url: reference.url.clone(),
                title: "Title".to_string(),
                location: "Paris".to_string(),
                description: "body".to_string(),
                hash: content_hash("Title", "Paris", "body"),
                ..Default::default()
            })
        }

        fn scraper_count(&self) -> usize {
            1
        }
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        enricher_calls: Arc<StubEnricher>,
        store: Arc<MemoryStore>,
    }

    fn harness(references: Vec<JobReference>) -> Harness {
        let hub = MetricsHub::new();
        let store = Arc::new(MemoryStore::new());
        let enricher = Arc::new(StubEnricher {
            calls: AtomicUsize::new(0),
        });
        let persistence = Arc::new(PersistenceService::new(
            store.clone(),
            PersistenceConfig::default(),
        ));
        let queue = Arc::new(JobQueue::new(100, &hub).unwrap());

        let orchestrator = Arc::new(Orchestrator::new(
            OrchestratorConfig {
                poll_delay: Duration::from_millis(5),
                drain_window: Duration::from_secs(2),
                ..Default::default()
            },
            Arc::new(StubDiscoverer {
                references: Mutex::new(references),
            }),
            enricher.clone(),
            persistence,
            Arc::new(DedupFilter::new()),
            queue,
            CancellationToken::new(),
        ));

        Harness {
            orchestrator,
            enricher_calls: enricher,
            store,
        }
    }

    async fn wait_for_processed(orchestrator: &Orchestrator, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while orchestrator.metrics().jobs_processed < count {
            assert!(Instant::now() < deadline, "pipeline did not process {count} jobs in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_duplicate_references_short_circuit() {
        let h = harness(vec![reference("r42"), reference("r42")]);
        h.orchestrator.start();
        wait_for_processed(&h.orchestrator, 2).await;
        h.orchestrator.stop().await;

        let metrics = h.orchestrator.metrics();
        assert_eq!(metrics.jobs_successful, 1);
        assert_eq!(metrics.jobs_duplicate, 1);
        assert_eq!(metrics.jobs_failed, 0);
        // The duplicate never reached the enrichment fetch
        assert_eq!(h.enricher_calls.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_counts_add_up_across_outcomes() {
        let h = harness(vec![
            reference("r1"),
            reference("bad-1"),
            reference("r2"),
            reference("r1"),
        ]);
        h.orchestrator.start();
        wait_for_processed(&h.orchestrator, 4).await;
        h.orchestrator.stop().await;

        let metrics = h.orchestrator.metrics();
        assert_eq!(metrics.jobs_processed, 4);
        assert_eq!(
            metrics.jobs_processed,
            metrics.jobs_successful + metrics.jobs_failed + metrics.jobs_duplicate
        );
        assert_eq!(metrics.jobs_successful, 2);
        assert_eq!(metrics.jobs_failed, 1);
        assert_eq!(metrics.jobs_duplicate, 1);
        assert_eq!(metrics.discovery_cycles, 1);
        assert_eq!(metrics.jobs_discovered, 4);
    }

    #[tokio::test]
    async fn test_stop_exits_within_drain_window() {
        let h = harness(vec![]);
        h.orchestrator.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let begin = Instant::now();
        h.orchestrator.stop().await;
        assert!(begin.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_status_reports_queue_and_stage_counts() {
        let h = harness(vec![]);
        let status = h.orchestrator.status();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.discovery_sources, 1);
        assert_eq!(status.enrichment_scrapers, 1);
        assert_eq!(status.metrics.jobs_processed, 0);
    }
}
