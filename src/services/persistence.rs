// src/services/persistence.rs

//! Persistence stage.
//!
//! Validates enriched records and hands them to the job store, either one
//! at a time or through a bounded write buffer flushed on size, deadline
//! and shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::JobDetails;
use crate::services::Persister;
use crate::storage::JobStore;

/// Buffering policy for the persistence stage.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// When false, every save is a single upsert
    pub buffered: bool,
    /// Flush when the buffer reaches this many records
    pub buffer_size: usize,
    /// Flush at least this often while buffering
    pub flush_interval: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            buffered: false,
            buffer_size: 50,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Saves job details into the store with validation and optional buffering.
pub struct PersistenceService {
    store: Arc<dyn JobStore>,
    config: PersistenceConfig,
    buffer: Mutex<Vec<JobDetails>>,
}

impl PersistenceService {
    pub fn new(store: Arc<dyn JobStore>, config: PersistenceConfig) -> Self {
        Self {
            store,
            config,
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Save a batch in one atomic unit.
    pub async fn save_batch(&self, details: &mut [JobDetails]) -> Result<()> {
        if details.is_empty() {
            return Ok(());
        }
        for job in details.iter() {
            if !job.is_valid() {
                return Err(AppError::validation(format!(
                    "invalid job details in batch: missing required fields for job {}",
                    job.external_id
                )));
            }
        }
        self.store.upsert_batch(details).await
    }

    fn buffered_count(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }
}

#[async_trait]
impl Persister for PersistenceService {
    async fn save(&self, details: &mut JobDetails) -> Result<()> {
        if !details.is_valid() {
            return Err(AppError::validation(
                "invalid job details: missing required fields",
            ));
        }

        if !self.config.buffered {
            return self.store.upsert(details).await;
        }

        let full = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(details.clone());
            buffer.len() >= self.config.buffer_size
        };
        if full {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Swap the buffer out so the lock is not held across the store call
        let mut batch = {
            let mut buffer = self.buffer.lock().unwrap();
            std::mem::take(&mut *buffer)
        };
        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!("Flushing {} buffered job details", batch.len());
        self.store.upsert_batch(&mut batch).await
    }
}

/// Run the deadline flusher until cancellation, then flush one final time.
pub fn spawn_flusher(
    service: Arc<PersistenceService>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let interval = service.config.flush_interval;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = service.flush().await {
                        tracing::error!("Periodic flush failed: {e}");
                    }
                }
                _ = cancel.cancelled() => {
                    if let Err(e) = service.flush().await {
                        tracing::error!("Shutdown flush failed: {e}");
                    }
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content_hash;
    use crate::storage::MemoryStore;

    fn details(id: &str, title: &str) -> JobDetails {
        JobDetails {
            external_id: id.to_string(),
            company_name: "Example".to_string(),
            url: format!("https://ex.com/jobs/{id}/"),
            title: title.to_string(),
            location: "Paris".to_string(),
            description: format!("<p>{title}</p>"),
            hash: content_hash(title, "Paris", &format!("<p>{title}</p>")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_records() {
        let store = Arc::new(MemoryStore::new());
        let service = PersistenceService::new(store.clone(), PersistenceConfig::default());

        let mut invalid = details("r1", "Title");
        invalid.title = String::new();

        let err = service.save(&mut invalid).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_unbuffered_save_assigns_id() {
        let store = Arc::new(MemoryStore::new());
        let service = PersistenceService::new(store.clone(), PersistenceConfig::default());

        let mut job = details("r1", "Title");
        service.save(&mut job).await.unwrap();
        assert!(job.id > 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_buffer_flushes_at_capacity() {
        let store = Arc::new(MemoryStore::new());
        let service = PersistenceService::new(
            store.clone(),
            PersistenceConfig {
                buffered: true,
                buffer_size: 3,
                flush_interval: Duration::from_secs(3600),
            },
        );

        for i in 0..2 {
            let mut job = details(&format!("r{i}"), "Title");
            service.save(&mut job).await.unwrap();
        }
        assert_eq!(store.len(), 0);
        assert_eq!(service.buffered_count(), 2);

        let mut job = details("r2", "Title");
        service.save(&mut job).await.unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(service.buffered_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_remaining_buffer() {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(PersistenceService::new(
            store.clone(),
            PersistenceConfig {
                buffered: true,
                buffer_size: 100,
                flush_interval: Duration::from_secs(3600),
            },
        ));

        let mut job = details("r1", "Title");
        service.save(&mut job).await.unwrap();
        assert_eq!(store.len(), 0);

        let cancel = CancellationToken::new();
        let flusher = spawn_flusher(service.clone(), cancel.clone());
        cancel.cancel();
        flusher.await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_validates_every_record() {
        let store = Arc::new(MemoryStore::new());
        let service = PersistenceService::new(store.clone(), PersistenceConfig::default());

        let mut batch = vec![details("r1", "Title"), details("", "No id")];
        let err = service.save_batch(&mut batch).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // Atomic: nothing from the batch landed
        assert_eq!(store.len(), 0);
    }
}
