// src/storage/mod.rs

//! Storage abstraction for job persistence.
//!
//! The pipeline writes through the `JobStore` trait; Postgres is the
//! production backend, with an in-memory store for tests and local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::JobDetails;

/// Upsert-oriented store for enriched job postings.
///
/// Conflict semantics (shared by both operations): a record conflicts on
/// `external_id`; on conflict `last_seen_at` advances, and `description` and
/// `hash` are rewritten only when the stored hash differs from the new one.
/// Title and location are never updated on conflict.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or update one record; populates `job.id` on return.
    async fn upsert(&self, job: &mut JobDetails) -> Result<()>;

    /// Insert or update a batch in one atomic unit; populates ids on return.
    async fn upsert_batch(&self, jobs: &mut [JobDetails]) -> Result<()>;
}

pub use memory::MemoryStore;
pub use postgres::PgJobStore;
