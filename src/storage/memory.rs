// src/storage/memory.rs

//! In-memory job store.
//!
//! Mirrors the Postgres conflict semantics so pipeline behavior can be
//! exercised without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;
use crate::models::JobDetails;
use crate::storage::JobStore;

#[derive(Default)]
struct Inner {
    rows: HashMap<String, JobDetails>,
    next_id: i64,
}

/// Map-backed `JobStore` keyed by external id.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch a stored row by external id.
    pub fn get(&self, external_id: &str) -> Option<JobDetails> {
        self.inner.lock().unwrap().rows.get(external_id).cloned()
    }

    fn apply(inner: &mut Inner, job: &mut JobDetails) {
        let now = Utc::now();
        match inner.rows.get_mut(&job.external_id) {
            Some(existing) => {
                existing.last_seen_at = Some(now);
                if existing.hash != job.hash {
                    existing.description = job.description.clone();
                    existing.hash = job.hash.clone();
                }
                job.id = existing.id;
            }
            None => {
                inner.next_id += 1;
                job.id = inner.next_id;
                let mut row = job.clone();
                row.first_seen_at = Some(now);
                row.last_seen_at = Some(now);
                inner.rows.insert(job.external_id.clone(), row);
            }
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn upsert(&self, job: &mut JobDetails) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::apply(&mut inner, job);
        Ok(())
    }

    async fn upsert_batch(&self, jobs: &mut [JobDetails]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for job in jobs {
            Self::apply(&mut inner, job);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content_hash;

    fn details(id: &str, title: &str, description: &str) -> JobDetails {
        JobDetails {
            external_id: id.to_string(),
            company_name: "Example".to_string(),
            url: format!("https://ex.com/jobs/{id}/"),
            title: title.to_string(),
            location: "Paris".to_string(),
            description: description.to_string(),
            hash: content_hash(title, "Paris", description),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_then_identical_upsert_only_bumps_last_seen() {
        let store = MemoryStore::new();

        let mut first = details("r1", "Title", "body");
        store.upsert(&mut first).await.unwrap();
        let inserted = store.get("r1").unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let mut second = details("r1", "Title", "body");
        store.upsert(&mut second).await.unwrap();
        let updated = store.get("r1").unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(updated.description, inserted.description);
        assert_eq!(updated.hash, inserted.hash);
        assert_eq!(updated.first_seen_at, inserted.first_seen_at);
        assert!(updated.last_seen_at > inserted.last_seen_at);
    }

    #[tokio::test]
    async fn test_content_change_rewrites_description_and_hash_only() {
        let store = MemoryStore::new();

        let mut first = details("r1", "Title A", "old body");
        store.upsert(&mut first).await.unwrap();

        let mut second = details("r1", "Title B", "new body");
        store.upsert(&mut second).await.unwrap();

        let row = store.get("r1").unwrap();
        // Title is never updated by the upsert path
        assert_eq!(row.title, "Title A");
        assert_eq!(row.description, "new body");
        assert_eq!(row.hash, second.hash);
    }

    #[tokio::test]
    async fn test_batch_matches_sequential_upserts() {
        let batch_store = MemoryStore::new();
        let single_store = MemoryStore::new();

        let mut batch = vec![
            details("r1", "A", "a"),
            details("r2", "B", "b"),
            details("r1", "A2", "a-changed"),
        ];
        batch_store.upsert_batch(&mut batch).await.unwrap();

        for job in [
            details("r1", "A", "a"),
            details("r2", "B", "b"),
            details("r1", "A2", "a-changed"),
        ] {
            let mut job = job;
            single_store.upsert(&mut job).await.unwrap();
        }

        for id in ["r1", "r2"] {
            let a = batch_store.get(id).unwrap();
            let b = single_store.get(id).unwrap();
            assert_eq!(a.title, b.title);
            assert_eq!(a.description, b.description);
            assert_eq!(a.hash, b.hash);
        }
    }
}
