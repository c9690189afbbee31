//! Stage services for the ingestion pipeline.
//!
//! Each stage is exposed behind a narrow trait so the orchestrator (and its
//! tests) depend on behavior, not on concrete service types:
//! - Discovery (`DiscoveryService`): source index -> job references
//! - Enrichment (`EnrichmentService`): job reference -> job details
//! - Persistence (`PersistenceService`): job details -> store
//! - Deduplication (`DedupFilter`): at-most-once admission

mod dedup;
mod discovery;
mod enrichment;
mod persistence;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{JobDetails, JobReference};

pub use dedup::DedupFilter;
pub use discovery::DiscoveryService;
pub use enrichment::EnrichmentService;
pub use persistence::{spawn_flusher, PersistenceConfig, PersistenceService};

/// Finds job references from configured company career indexes.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Discover references from every enabled source. Per-source failures
    /// are absorbed; the cycle always returns what it could find.
    async fn discover_all(&self, cancel: &CancellationToken) -> Vec<JobReference>;

    /// Number of enabled discovery sources.
    fn source_count(&self) -> usize;
}

/// Enriches a job reference with full details.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(
        &self,
        reference: &JobReference,
        cancel: &CancellationToken,
    ) -> Result<JobDetails>;

    /// Number of enabled enrichment scrapers.
    fn scraper_count(&self) -> usize;
}

/// Persists job details.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Validate and save one record. The record's `id` is populated on return
    /// when the save is unbuffered.
    async fn save(&self, details: &mut JobDetails) -> Result<()>;

    /// Flush any buffered records. A no-op for unbuffered persisters.
    async fn flush(&self) -> Result<()>;
}
