// src/models/job.rs

//! Job reference and job detail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A reference to a job posting found during discovery.
///
/// Contains the minimal information needed to locate and identify a posting;
/// created by the discovery stage and consumed by enrichment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobReference {
    /// Unique identifier from the company's system
    pub external_id: String,

    /// Direct link to the job posting page
    pub url: String,

    /// Name of the company offering the job
    pub company_name: String,
}

impl JobReference {
    /// Check that all required fields are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.external_id.is_empty() && !self.url.is_empty() && !self.company_name.is_empty()
    }
}

/// Complete information about a job posting, produced by enrichment
/// and written by persistence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobDetails {
    /// Store-assigned row identifier, populated on upsert
    pub id: i64,
    pub external_id: String,
    pub company_name: String,
    pub url: String,
    pub title: String,
    pub location: String,
    pub description: String,
    /// Content fingerprint over normalized title, location and description
    pub hash: String,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl JobDetails {
    /// Check that all required fields are non-empty and timestamps are ordered.
    pub fn is_valid(&self) -> bool {
        let fields_ok = !self.external_id.is_empty()
            && !self.company_name.is_empty()
            && !self.url.is_empty()
            && !self.title.is_empty();

        let timestamps_ok = match (self.first_seen_at, self.last_seen_at) {
            (Some(first), Some(last)) => first <= last,
            _ => true,
        };

        fields_ok && timestamps_ok
    }
}

/// Compute a content fingerprint for change detection.
///
/// Fields are trimmed before hashing so trailing-whitespace churn on the
/// detail page does not register as a content change. Truncated to 128 bits.
pub fn content_hash(title: &str, location: &str, description: &str) -> String {
    let normalized = format!(
        "{}|{}|{}",
        title.trim(),
        location.trim(),
        description.trim()
    );
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(&digest[..16])
}
