// src/storage/postgres.rs

//! Postgres job store.
//!
//! Upserts keyed on `external_id`. Timestamps rely on the table defaults:
//! `first_seen_at`/`last_seen_at` default to `now()` on insert, and the
//! conflict path advances `last_seen_at` while rewriting `description` and
//! `hash` only when the content hash changed.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::config::PostgresConfig;
use crate::error::Result;
use crate::models::JobDetails;
use crate::storage::JobStore;

/// Default number of rows per batch statement.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

const UPSERT_SQL: &str = "\
INSERT INTO jobs (title, description, company_name, location, url, external_id, hash) \
VALUES ($1, $2, $3, $4, $5, $6, $7) \
ON CONFLICT (external_id) DO UPDATE SET \
    last_seen_at = NOW(), \
    description = CASE WHEN jobs.hash <> EXCLUDED.hash THEN EXCLUDED.description ELSE jobs.description END, \
    hash = CASE WHEN jobs.hash <> EXCLUDED.hash THEN EXCLUDED.hash ELSE jobs.hash END \
RETURNING id";

/// Create the shared connection pool.
pub async fn connect(config: &PostgresConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(25)
        .min_connections(5)
        .max_lifetime(Duration::from_secs(5 * 60))
        .connect(&config.url())
        .await?;

    tracing::info!("Successfully connected to database");
    Ok(pool)
}

/// `JobStore` backed by the `jobs` table.
pub struct PgJobStore {
    pool: PgPool,
    batch_size: usize,
}

impl PgJobStore {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };
        Self { pool, batch_size }
    }

    fn batch_sql(rows: usize) -> String {
        let placeholders: Vec<String> = (0..rows)
            .map(|i| {
                let p = i * 7;
                format!(
                    "(${}, ${}, ${}, ${}, ${}, ${}, ${})",
                    p + 1,
                    p + 2,
                    p + 3,
                    p + 4,
                    p + 5,
                    p + 6,
                    p + 7
                )
            })
            .collect();

        format!(
            "INSERT INTO jobs (title, description, company_name, location, url, external_id, hash) \
             VALUES {} \
             ON CONFLICT (external_id) DO UPDATE SET \
                 last_seen_at = NOW(), \
                 description = CASE WHEN jobs.hash <> EXCLUDED.hash THEN EXCLUDED.description ELSE jobs.description END, \
                 hash = CASE WHEN jobs.hash <> EXCLUDED.hash THEN EXCLUDED.hash ELSE jobs.hash END \
             RETURNING id",
            placeholders.join(", ")
        )
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn upsert(&self, job: &mut JobDetails) -> Result<()> {
        let id: i64 = sqlx::query_scalar(UPSERT_SQL)
            .bind(&job.title)
            .bind(&job.description)
            .bind(&job.company_name)
            .bind(&job.location)
            .bind(&job.url)
            .bind(&job.external_id)
            .bind(&job.hash)
            .fetch_one(&self.pool)
            .await?;

        job.id = id;
        Ok(())
    }

    async fn upsert_batch(&self, jobs: &mut [JobDetails]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        // All chunks commit together or not at all
        let mut tx = self.pool.begin().await?;

        let mut assigned = 0;
        for start in (0..jobs.len()).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(jobs.len());
            let sql = Self::batch_sql(end - start);

            let mut query = sqlx::query(&sql);
            for job in &jobs[start..end] {
                query = query
                    .bind(&job.title)
                    .bind(&job.description)
                    .bind(&job.company_name)
                    .bind(&job.location)
                    .bind(&job.url)
                    .bind(&job.external_id)
                    .bind(&job.hash);
            }

            let rows = query.fetch_all(&mut *tx).await?;
            for row in rows {
                let id: i64 = row.try_get(0)?;
                if assigned < jobs.len() {
                    jobs[assigned].id = id;
                    assigned += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
