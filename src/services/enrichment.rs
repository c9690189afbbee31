// src/services/enrichment.rs

//! Enrichment stage.
//!
//! Resolves the scraper config for a reference URL, fetches the detail page
//! under the retry policy and extracts title, location and description with
//! the configured CSS selectors.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use prometheus::{CounterVec, GaugeVec};
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::fetch::{with_retry, HttpFetcher, RetryPolicy, ENRICHMENT_TIMEOUT};
use crate::metrics::MetricsHub;
use crate::models::{content_hash, JobDetails, JobReference, ScraperConfig, ScraperRegistry};
use crate::services::Enricher;

struct EnrichmentMetrics {
    scrape_duration: GaugeVec,
    scrape_total: CounterVec,
    scrape_errors: CounterVec,
}

/// Enriches job references with full details scraped from the detail page.
pub struct EnrichmentService {
    fetcher: Arc<HttpFetcher>,
    registry: Arc<ScraperRegistry>,
    retry: RetryPolicy,
    metrics: EnrichmentMetrics,
}

impl EnrichmentService {
    pub fn new(
        fetcher: Arc<HttpFetcher>,
        registry: Arc<ScraperRegistry>,
        retry: RetryPolicy,
        hub: &MetricsHub,
    ) -> Result<Self> {
        let metrics = EnrichmentMetrics {
            scrape_duration: hub.gauge_vec(
                "scraper_scrape_duration_seconds",
                "Duration of job detail scrape in seconds",
                &["company"],
            )?,
            scrape_total: hub.counter_vec(
                "scraper_scrape_total",
                "Total number of scrape operations",
                &["company"],
            )?,
            scrape_errors: hub.counter_vec(
                "scraper_scrape_errors_total",
                "Total number of scrape errors",
                &["company", "error_type"],
            )?,
        };

        Ok(Self {
            fetcher,
            registry,
            retry,
            metrics,
        })
    }

    async fn attempt_scrape(
        &self,
        reference: &JobReference,
        config: &ScraperConfig,
    ) -> Result<JobDetails> {
        let page = self
            .fetcher
            .get_page(&reference.url, ENRICHMENT_TIMEOUT)
            .await?;
        extract_details(&page, reference, config)
    }
}

/// Extract the three configured fields from a fetched detail page.
///
/// Title and location are the trimmed text of the first matching node;
/// description is the trimmed inner HTML of the first matching node.
fn extract_details(
    page: &str,
    reference: &JobReference,
    config: &ScraperConfig,
) -> Result<JobDetails> {
    let title_sel = parse_selector(&config.selectors.title)?;
    let location_sel = parse_selector(&config.selectors.location)?;
    let description_sel = parse_selector(&config.selectors.description)?;

    let document = Html::parse_document(page);

    let title = document
        .select(&title_sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    if title.is_empty() {
        return Err(AppError::extraction(format!(
            "could not extract job title using selector: {}",
            config.selectors.title
        )));
    }

    let location = document
        .select(&location_sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let description = document
        .select(&description_sel)
        .next()
        .map(|e| e.inner_html().trim().to_string())
        .unwrap_or_default();

    let hash = content_hash(&title, &location, &description);

    Ok(JobDetails {
        external_id: reference.external_id.clone(),
        company_name: config.name.clone(),
        url: reference.url.clone(),
        title,
        location,
        description,
        hash,
        ..Default::default()
    })
}

fn parse_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| AppError::selector(raw, format!("{e:?}")))
}

#[async_trait]
impl Enricher for EnrichmentService {
    async fn enrich(
        &self,
        reference: &JobReference,
        cancel: &CancellationToken,
    ) -> Result<JobDetails> {
        if !reference.is_valid() {
            return Err(AppError::validation(
                "invalid job reference: missing required fields",
            ));
        }

        let config = self
            .registry
            .scraper_for(&reference.url)
            .ok_or_else(|| AppError::NoScraper(reference.url.clone()))?;

        let start = Instant::now();
        self.metrics
            .scrape_total
            .with_label_values(&[&config.name])
            .inc();

        let result = with_retry(&self.retry, cancel, || {
            self.attempt_scrape(reference, config)
        })
        .await;

        self.metrics
            .scrape_duration
            .with_label_values(&[&config.name])
            .set(start.elapsed().as_secs_f64());

        if let Err(err) = &result {
            if !matches!(err, AppError::Cancelled) {
                self.metrics
                    .scrape_errors
                    .with_label_values(&[&config.name, err.metric_label()])
                    .inc();
            }
        }

        result
    }

    fn scraper_count(&self) -> usize {
        self.registry.len()
    }
}
