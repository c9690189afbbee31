// src/services/discovery.rs

//! Discovery stage.
//!
//! Turns each enabled source's index (sitemap XML, HTML listing or JSON API)
//! into `JobReference` records. A failure of one source never aborts the
//! remaining sources in the same cycle.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use prometheus::{CounterVec, GaugeVec};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::fetch::{HttpFetcher, DISCOVERY_TIMEOUT};
use crate::metrics::MetricsHub;
use crate::models::{DiscoverySource, FetchKind, JobReference, SourceRegistry};
use crate::services::Discoverer;

/// Sitemap document shape: `<urlset><url><loc>…</loc></url>…</urlset>`.
#[derive(Debug, Deserialize)]
struct Urlset {
    #[serde(rename = "url", default)]
    urls: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlEntry {
    #[serde(default)]
    loc: String,
}

struct DiscoveryMetrics {
    fetch_duration: GaugeVec,
    fetch_total: CounterVec,
    fetch_errors: CounterVec,
    jobs_found: GaugeVec,
}

/// Finds job references from configured company career indexes.
pub struct DiscoveryService {
    fetcher: Arc<HttpFetcher>,
    registry: Arc<SourceRegistry>,
    metrics: DiscoveryMetrics,
}

impl DiscoveryService {
    pub fn new(
        fetcher: Arc<HttpFetcher>,
        registry: Arc<SourceRegistry>,
        hub: &MetricsHub,
    ) -> Result<Self> {
        let metrics = DiscoveryMetrics {
            fetch_duration: hub.gauge_vec(
                "fetcher_fetch_duration_seconds",
                "Duration of job listing fetch in seconds",
                &["company", "fetch_type"],
            )?,
            fetch_total: hub.counter_vec(
                "fetcher_fetch_total",
                "Total number of fetch operations",
                &["company", "fetch_type"],
            )?,
            fetch_errors: hub.counter_vec(
                "fetcher_fetch_errors_total",
                "Total number of fetch errors",
                &["company", "fetch_type", "error_type"],
            )?,
            jobs_found: hub.gauge_vec(
                "fetcher_jobs_found",
                "Number of jobs found per company",
                &["company"],
            )?,
        };

        Ok(Self {
            fetcher,
            registry,
            metrics,
        })
    }

    /// Discover references for a single source.
    pub async fn discover_source(&self, source: &DiscoverySource) -> Result<Vec<JobReference>> {
        let fetch_type = source.kind.label();
        let start = Instant::now();
        self.metrics
            .fetch_total
            .with_label_values(&[&source.name, fetch_type])
            .inc();

        let result = match &source.kind {
            FetchKind::Sitemap => self.fetch_from_sitemap(source).await,
            FetchKind::Html { link_selector } => self.fetch_from_html(source, link_selector).await,
            FetchKind::Api { .. } => self.fetch_from_api(source).await,
        };

        self.metrics
            .fetch_duration
            .with_label_values(&[&source.name, fetch_type])
            .set(start.elapsed().as_secs_f64());

        match result {
            Ok(references) => {
                self.metrics
                    .jobs_found
                    .with_label_values(&[&source.name])
                    .set(references.len() as f64);
                Ok(references)
            }
            Err(err) => {
                self.metrics
                    .fetch_errors
                    .with_label_values(&[&source.name, fetch_type, err.metric_label()])
                    .inc();
                Err(err)
            }
        }
    }

    async fn fetch_from_sitemap(&self, source: &DiscoverySource) -> Result<Vec<JobReference>> {
        let body = self.fetcher.get_bytes(&source.url, DISCOVERY_TIMEOUT).await?;
        let text = String::from_utf8_lossy(&body);
        let sitemap: Urlset = quick_xml::de::from_str(&text)
            .map_err(|e| AppError::parse(format!("sitemap {}", source.url), e))?;

        let references = sitemap
            .urls
            .iter()
            .filter_map(|entry| {
                source.extract_id(&entry.loc).map(|external_id| JobReference {
                    external_id,
                    url: entry.loc.clone(),
                    company_name: source.name.clone(),
                })
            })
            .collect();

        Ok(references)
    }

    async fn fetch_from_html(
        &self,
        source: &DiscoverySource,
        link_selector: &str,
    ) -> Result<Vec<JobReference>> {
        let body = self.fetcher.get_page(&source.url, DISCOVERY_TIMEOUT).await?;
        extract_html_references(&body, source, link_selector)
    }

    async fn fetch_from_api(&self, source: &DiscoverySource) -> Result<Vec<JobReference>> {
        let FetchKind::Api {
            method,
            headers,
            request_body,
            ..
        } = &source.kind
        else {
            return Err(AppError::config(format!(
                "source {} is not an api source",
                source.key
            )));
        };

        let body = self
            .fetcher
            .execute(
                method,
                &source.url,
                headers,
                request_body.as_deref(),
                DISCOVERY_TIMEOUT,
            )
            .await?;

        parse_api_response(&body, source)
    }
}

/// Extract references from an HTML listing page.
///
/// Relative hrefs are resolved against the source URL so every reference
/// carries an absolute detail-page URL.
fn extract_html_references(
    html: &str,
    source: &DiscoverySource,
    link_selector: &str,
) -> Result<Vec<JobReference>> {
    let selector = Selector::parse(link_selector)
        .map_err(|e| AppError::selector(link_selector, format!("{e:?}")))?;
    let base = Url::parse(&source.url)
        .map_err(|e| AppError::parse(format!("source url {}", source.url), e))?;

    let document = Html::parse_document(html);
    let mut references = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(external_id) = source.extract_id(href) else {
            continue;
        };
        let url = base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string());

        references.push(JobReference {
            external_id,
            url,
            company_name: source.name.clone(),
        });
    }

    Ok(references)
}

/// Parse a JSON API response into references.
fn parse_api_response(body: &[u8], source: &DiscoverySource) -> Result<Vec<JobReference>> {
    let FetchKind::Api {
        jobs_path,
        id_field,
        url_template,
        ..
    } = &source.kind
    else {
        return Err(AppError::config(format!(
            "source {} is not an api source",
            source.key
        )));
    };

    let data: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::parse(format!("api response from {}", source.url), e))?;

    let jobs = nested_value(&data, jobs_path)
        .ok_or_else(|| {
            AppError::parse(source.url.as_str(), format!("no value at path '{jobs_path}'"))
        })?;
    let jobs = jobs.as_array().ok_or_else(|| {
        AppError::parse(
            source.url.as_str(),
            format!("value at path '{jobs_path}' is not an array"),
        )
    })?;

    let mut references = Vec::new();
    for job in jobs {
        let Some(object) = job.as_object() else {
            continue;
        };
        let Some(id_value) = object.get(id_field) else {
            continue;
        };
        let Some(external_id) = stringify_id(id_value) else {
            continue;
        };

        references.push(JobReference {
            url: url_template.replace("{id}", &external_id),
            external_id,
            company_name: source.name.clone(),
        });
    }

    Ok(references)
}

/// Navigate nested objects using dot notation (e.g. `data.postings`).
fn nested_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(data);
    }
    let mut current = data;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Accept string ids and numeric ids losslessly convertible to integers.
fn stringify_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                // Floats are accepted only when they are whole numbers
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| (f as i64).to_string())
            }
        }
        _ => None,
    }
}

#[async_trait]
impl Discoverer for DiscoveryService {
    async fn discover_all(&self, cancel: &CancellationToken) -> Vec<JobReference> {
        let mut all = Vec::new();

        for source in self.registry.sources() {
            if cancel.is_cancelled() {
                break;
            }

            tracing::info!("Fetching job listings from {}", source.name);
            match self.discover_source(source).await {
                Ok(references) => {
                    tracing::info!(
                        "Found {} job listings from {}",
                        references.len(),
                        source.name
                    );
                    all.extend(references);
                }
                Err(err) => {
                    tracing::warn!("Error fetching job listings from {}: {err}", source.name);
                }
            }
        }

        all
    }

    fn source_count(&self) -> usize {
        self.registry.len()
    }
}
