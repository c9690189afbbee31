//! Domain models for the ingestion pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod job;
mod pipeline;
mod scraper;
mod source;

// Re-export all public types
pub use job::{content_hash, JobDetails, JobReference};
pub use pipeline::{PipelineStatus, ProcessingMetrics, ProcessingResult, ProcessingStatus};
pub use scraper::{ScraperConfig, ScraperRegistry, SelectorSet};
pub use source::{DiscoverySource, FetchKind, SourceRegistry};
