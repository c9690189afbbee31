// src/models/scraper.rs

//! Detail-page scraper configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};

/// CSS selectors for the three extracted fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSet {
    pub title: String,
    pub location: String,
    pub description: String,
}

/// A per-company detail-page recipe.
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    pub name: String,
    pub url_patterns: Vec<String>,
    pub selectors: SelectorSet,
    #[serde(default)]
    pub enabled: bool,
}

impl ScraperConfig {
    /// A URL matches iff any configured pattern is a substring of it.
    pub fn matches_url(&self, url: &str) -> bool {
        self.url_patterns.iter().any(|p| url.contains(p))
    }

    fn validate(&self, key: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(AppError::config(format!("scraper {key}: name is required")));
        }
        if self.url_patterns.is_empty() {
            return Err(AppError::config(format!(
                "scraper {key}: at least one URL pattern is required"
            )));
        }
        for (field, selector) in [
            ("title", &self.selectors.title),
            ("location", &self.selectors.location),
            ("description", &self.selectors.description),
        ] {
            if selector.is_empty() {
                return Err(AppError::config(format!(
                    "scraper {key}: {field} selector is required"
                )));
            }
            scraper::Selector::parse(selector).map_err(|e| {
                AppError::config(format!("scraper {key}: invalid {field} selector: {e:?}"))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ScrapersFile {
    scrapers: BTreeMap<String, ScraperConfig>,
}

/// Immutable lookup table of enabled scrapers.
///
/// Resolution is deterministic over the configured iteration order; on
/// ambiguity the first match wins.
#[derive(Debug, Default)]
pub struct ScraperRegistry {
    scrapers: Vec<ScraperConfig>,
}

impl ScraperRegistry {
    /// Load and validate the scrapers config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("failed to read scrapers config {path:?}: {e}"))
        })?;
        Self::from_yaml(&data)
    }

    /// Parse and validate scrapers config from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let file: ScrapersFile = serde_yaml::from_str(data)
            .map_err(|e| AppError::config(format!("failed to parse scrapers config: {e}")))?;

        let mut scrapers = Vec::new();
        for (key, config) in file.scrapers {
            if !config.enabled {
                tracing::info!("Scraper for {key} is disabled, skipping");
                continue;
            }
            config.validate(&key)?;
            scrapers.push(config);
        }

        Ok(Self { scrapers })
    }

    /// Resolve the scraper for a detail-page URL; first substring match wins.
    pub fn scraper_for(&self, url: &str) -> Option<&ScraperConfig> {
        self.scrapers.iter().find(|s| s.matches_url(url))
    }

    /// Number of enabled scrapers.
    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
scrapers:
  alpha:
    name: Alpha
    url_patterns: ["alpha.com/jobs"]
    selectors:
      title: "h1.job-title"
      location: ".job-location"
      description: ".job-description"
    enabled: true
  beta:
    name: Beta
    url_patterns: ["beta.io/careers", "jobs.beta.io"]
    selectors:
      title: "h1"
      location: ".location"
      description: "#description"
    enabled: true
  off:
    name: Off
    url_patterns: ["off.org"]
    selectors:
      title: "h1"
      location: ".loc"
      description: ".desc"
    enabled: false
"##;

    #[test]
    fn test_substring_matching() {
        let registry = ScraperRegistry::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            registry
                .scraper_for("https://beta.io/careers/123")
                .map(|s| s.name.as_str()),
            Some("Beta")
        );
        assert_eq!(
            registry
                .scraper_for("https://jobs.beta.io/view/9")
                .map(|s| s.name.as_str()),
            Some("Beta")
        );
        assert!(registry.scraper_for("https://unrelated.net/x").is_none());
    }

    #[test]
    fn test_first_match_wins_deterministically() {
        let yaml = r#"
scrapers:
  a-first:
    name: First
    url_patterns: ["shared.com"]
    selectors: { title: "h1", location: ".loc", description: ".desc" }
    enabled: true
  b-second:
    name: Second
    url_patterns: ["shared.com/jobs"]
    selectors: { title: "h2", location: ".loc", description: ".desc" }
    enabled: true
"#;
        let registry = ScraperRegistry::from_yaml(yaml).unwrap();
        // Both match; resolution must pick the first configured entry every time
        for _ in 0..10 {
            assert_eq!(
                registry
                    .scraper_for("https://shared.com/jobs/42")
                    .map(|s| s.name.as_str()),
                Some("First")
            );
        }
    }

    #[test]
    fn test_disabled_scrapers_are_skipped() {
        let registry = ScraperRegistry::from_yaml(SAMPLE).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.scraper_for("https://off.org/jobs/1").is_none());
    }

    #[test]
    fn test_missing_patterns_are_rejected() {
        let yaml = r#"
scrapers:
  broken:
    name: Broken
    url_patterns: []
    selectors: { title: "h1", location: ".loc", description: ".desc" }
    enabled: true
"#;
        let err = ScraperRegistry::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("URL pattern"));
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let yaml = r#"
scrapers:
  broken:
    name: Broken
    url_patterns: ["broken.io"]
    selectors: { title: "[[oops", location: ".loc", description: ".desc" }
    enabled: true
"#;
        let err = ScraperRegistry::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("title selector"));
    }
}
