// src/models/source.rs

//! Discovery source configuration.
//!
//! Each configured company maps to one discovery recipe: an index URL plus
//! a strategy for turning the index into `(external_id, url)` pairs.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Discovery strategy, dispatched once per source per cycle.
#[derive(Debug, Clone)]
pub enum FetchKind {
    /// Fetch an XML sitemap and regex each `<loc>` entry
    Sitemap,
    /// Fetch an HTML listing page and regex each matching link's `href`
    Html { link_selector: String },
    /// Call a JSON API and read ids out of the response
    Api {
        method: String,
        headers: HashMap<String, String>,
        request_body: Option<String>,
        /// Dotted path to the jobs array; empty means the root is the array
        jobs_path: String,
        id_field: String,
        /// Detail-page URL template containing `{id}`
        url_template: String,
    },
}

impl FetchKind {
    /// Label used for the `fetch_type` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            FetchKind::Sitemap => "sitemap",
            FetchKind::Html { .. } => "html",
            FetchKind::Api { .. } => "api",
        }
    }
}

/// A validated per-company discovery recipe.
///
/// The id pattern is compiled once at load and never recompiled per request.
#[derive(Debug, Clone)]
pub struct DiscoverySource {
    pub key: String,
    pub name: String,
    pub url: String,
    pub kind: FetchKind,
    id_pattern: Option<Regex>,
}

impl DiscoverySource {
    /// Apply the configured id pattern to a URL, returning the captured id.
    ///
    /// Returns `None` when the pattern does not match; such index entries
    /// are skipped silently.
    pub fn extract_id(&self, url: &str) -> Option<String> {
        let pattern = self.id_pattern.as_ref()?;
        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Raw YAML entry, prior to validation. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct SourceEntry {
    name: String,
    fetch_type: String,
    url: String,
    #[serde(default)]
    id_pattern: Option<String>,
    #[serde(default)]
    link_selector: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    request_body: Option<String>,
    #[serde(default)]
    jobs_path: Option<String>,
    #[serde(default)]
    id_field: Option<String>,
    #[serde(default)]
    url_template: Option<String>,
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    companies: BTreeMap<String, SourceEntry>,
}

/// Immutable lookup table of enabled discovery sources, keyed by company.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<DiscoverySource>,
}

impl SourceRegistry {
    /// Load and validate the discovery config file.
    ///
    /// Disabled entries are skipped with a log line; any validation error
    /// is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("failed to read sources config {path:?}: {e}"))
        })?;
        Self::from_yaml(&data)
    }

    /// Parse and validate discovery config from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let file: SourcesFile = serde_yaml::from_str(data)
            .map_err(|e| AppError::config(format!("failed to parse sources config: {e}")))?;

        let mut sources = Vec::new();
        for (key, entry) in file.companies {
            if !entry.enabled {
                tracing::info!("Source {key} is disabled, skipping");
                continue;
            }
            sources.push(validate_entry(&key, entry)?);
        }

        Ok(Self { sources })
    }

    /// Enabled sources, in stable (key-sorted) order.
    pub fn sources(&self) -> &[DiscoverySource] {
        &self.sources
    }

    /// Look up a source by company key.
    pub fn source(&self, key: &str) -> Option<&DiscoverySource> {
        self.sources.iter().find(|s| s.key == key)
    }

    /// Number of enabled sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn validate_entry(key: &str, entry: SourceEntry) -> Result<DiscoverySource> {
    if entry.name.is_empty() {
        return Err(AppError::config(format!("source {key}: name is required")));
    }
    if entry.url.is_empty() {
        return Err(AppError::config(format!("source {key}: url is required")));
    }

    let id_pattern = entry
        .id_pattern
        .as_deref()
        .map(|raw| compile_id_pattern(key, raw))
        .transpose()?;

    let kind = match entry.fetch_type.as_str() {
        "sitemap" => {
            if id_pattern.is_none() {
                return Err(AppError::config(format!(
                    "source {key}: id_pattern is required for sitemap fetch type"
                )));
            }
            FetchKind::Sitemap
        }
        "html" => {
            if id_pattern.is_none() {
                return Err(AppError::config(format!(
                    "source {key}: id_pattern is required for html fetch type"
                )));
            }
            let link_selector = entry.link_selector.filter(|s| !s.is_empty()).ok_or_else(
                || AppError::config(format!("source {key}: link_selector is required for html fetch type")),
            )?;
            scraper::Selector::parse(&link_selector).map_err(|e| {
                AppError::config(format!("source {key}: invalid link_selector: {e:?}"))
            })?;
            FetchKind::Html { link_selector }
        }
        "api" => {
            let method = entry.method.filter(|m| !m.is_empty()).ok_or_else(|| {
                AppError::config(format!("source {key}: method is required for api fetch type"))
            })?;
            let url_template = entry.url_template.filter(|t| !t.is_empty()).ok_or_else(
                || AppError::config(format!("source {key}: url_template is required for api fetch type")),
            )?;
            if !url_template.contains("{id}") {
                return Err(AppError::config(format!(
                    "source {key}: url_template must contain {{id}}"
                )));
            }
            FetchKind::Api {
                method,
                headers: entry.headers,
                request_body: entry.request_body,
                jobs_path: entry.jobs_path.unwrap_or_default(),
                id_field: entry.id_field.unwrap_or_else(|| "id".to_string()),
                url_template,
            }
        }
        other => {
            return Err(AppError::config(format!(
                "source {key}: invalid fetch type: {other}"
            )))
        }
    };

    Ok(DiscoverySource {
        key: key.to_string(),
        name: entry.name,
        url: entry.url,
        kind,
        id_pattern,
    })
}

fn compile_id_pattern(key: &str, raw: &str) -> Result<Regex> {
    let pattern = Regex::new(raw)
        .map_err(|e| AppError::config(format!("source {key}: invalid id_pattern: {e}")))?;
    // captures_len counts the implicit whole-match group
    if pattern.captures_len() != 2 {
        return Err(AppError::config(format!(
            "source {key}: id_pattern must have exactly one capturing group"
        )));
    }
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
companies:
  example:
    name: Example
    fetch_type: sitemap
    url: https://ex.com/sm.xml
    id_pattern: '/jobs/(r\d+)/'
    enabled: true
  listing:
    name: Listing
    fetch_type: html
    url: https://listing.io/careers
    link_selector: '.job a'
    id_pattern: '/p/([a-z0-9-]+)'
    enabled: true
  feed:
    name: Feed
    fetch_type: api
    url: https://feed.dev/api/postings
    method: GET
    jobs_path: data.postings
    id_field: req_id
    url_template: 'https://feed.dev/p/{id}'
    enabled: true
  dormant:
    name: Dormant
    fetch_type: sitemap
    url: https://dormant.org/sitemap.xml
    id_pattern: '/jobs/(\d+)'
    enabled: false
"#;

    #[test]
    fn test_load_skips_disabled_sources() {
        let registry = SourceRegistry::from_yaml(SAMPLE).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.source("dormant").is_none());
        assert!(registry.source("example").is_some());
    }

    #[test]
    fn test_sources_are_in_stable_order() {
        let registry = SourceRegistry::from_yaml(SAMPLE).unwrap();
        let keys: Vec<_> = registry.sources().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["example", "feed", "listing"]);
    }

    #[test]
    fn test_extract_id_from_sitemap_url() {
        let registry = SourceRegistry::from_yaml(SAMPLE).unwrap();
        let source = registry.source("example").unwrap();
        assert_eq!(
            source.extract_id("https://ex.com/jobs/r42/"),
            Some("r42".to_string())
        );
        assert_eq!(source.extract_id("https://ex.com/about/"), None);
    }

    #[test]
    fn test_api_defaults() {
        let registry = SourceRegistry::from_yaml(SAMPLE).unwrap();
        let source = registry.source("feed").unwrap();
        match &source.kind {
            FetchKind::Api {
                jobs_path,
                id_field,
                ..
            } => {
                assert_eq!(jobs_path, "data.postings");
                assert_eq!(id_field, "req_id");
            }
            other => panic!("expected api source, got {other:?}"),
        }
    }

    #[test]
    fn test_html_requires_link_selector() {
        let yaml = r#"
companies:
  broken:
    name: Broken
    fetch_type: html
    url: https://broken.io/careers
    id_pattern: '/p/([a-z]+)'
    enabled: true
"#;
        let err = SourceRegistry::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("link_selector"));
    }

    #[test]
    fn test_pattern_must_have_one_capture_group() {
        let yaml = r#"
companies:
  broken:
    name: Broken
    fetch_type: sitemap
    url: https://broken.io/sitemap.xml
    id_pattern: '/jobs/(r\d+)/(extra)'
    enabled: true
"#;
        let err = SourceRegistry::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("capturing group"));
    }

    #[test]
    fn test_invalid_regex_is_fatal() {
        let yaml = r#"
companies:
  broken:
    name: Broken
    fetch_type: sitemap
    url: https://broken.io/sitemap.xml
    id_pattern: '([unclosed'
    enabled: true
"#;
        assert!(SourceRegistry::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let yaml = r#"
companies:
  example:
    name: Example
    fetch_type: sitemap
    url: https://ex.com/sm.xml
    id_pattern: '/jobs/(r\d+)/'
    enabled: true
    some_future_knob: 12
"#;
        assert_eq!(SourceRegistry::from_yaml(yaml).unwrap().len(), 1);
    }

    #[test]
    fn test_url_template_must_contain_id() {
        let yaml = r#"
companies:
  feed:
    name: Feed
    fetch_type: api
    url: https://feed.dev/api/postings
    method: GET
    url_template: 'https://feed.dev/p/static'
    enabled: true
"#;
        let err = SourceRegistry::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("{id}"));
    }
}
