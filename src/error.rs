// src/error.rs

//! Unified error handling for the ingestion pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error at load time; fatal
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport failure (connect/read timeout, reset)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from an upstream site
    #[error("Received non-OK status code {code} from {url}")]
    Status { code: u16, url: String },

    /// XML/HTML/JSON structure mismatch
    #[error("Parse error for {context}: {message}")]
    Parse { context: String, message: String },

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Selector matched nothing or produced an empty required field
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// No scraper configuration matches the reference URL
    #[error("No scraper configuration found for URL: {0}")]
    NoScraper(String),

    /// Produced record violates data invariants
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database operation failed
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Ambient scope was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create an extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the enrichment retry loop may attempt this operation again.
    ///
    /// Transport-level failures and 5xx responses are worth retrying; 403/404,
    /// missing scraper configuration, empty extraction results, invalid
    /// records and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Http(_) => true,
            AppError::Status { code, .. } => !matches!(code, 403 | 404),
            AppError::Parse { .. }
            | AppError::Selector { .. }
            | AppError::Extraction(_)
            | AppError::NoScraper(_)
            | AppError::Validation(_)
            | AppError::Config(_)
            | AppError::Store(_)
            | AppError::Cancelled => false,
        }
    }

    /// Short label used as the `error_type` metric dimension.
    pub fn metric_label(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Http(_) => "transport",
            AppError::Status { .. } => "status",
            AppError::Parse { .. } => "parse",
            AppError::Selector { .. } => "selector",
            AppError::Extraction(_) => "extraction",
            AppError::NoScraper(_) => "no_scraper",
            AppError::Validation(_) => "validation",
            AppError::Store(_) => "store",
            AppError::Cancelled => "cancelled",
        }
    }
}
