//! Error types for snapshot retrieval and classification
//!
//! This module defines the errors raised before a reconciliation pass starts.

use thiserror::Error;

/// Errors that can occur while fetching a world-state snapshot
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// Upstream answered with a non-2xx status
    #[error("Upstream returned status {0}")]
    Status(u16),

    /// Body could not be decoded as JSON
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid endpoint URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Check if retrying on the next tick has a chance of succeeding
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Decode(_) => true,
            Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors that can occur while classifying raw snapshot entries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// Activation or expiry value could not be parsed
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    /// A single entry did not match the expected shape
    #[error("Malformed entry: {0}")]
    Entry(String),

    /// The snapshot does not contain the section this feed reads
    #[error("Snapshot section '{0}' is missing")]
    MissingSection(String),

    /// No entry qualifies as the feed's current entity
    #[error("No current entity in snapshot: {0}")]
    NoCurrentEntity(String),
}

impl ClassifyError {
    /// Whole-snapshot failures hold the fingerprint; entry failures only drop the entry
    pub fn is_entry_level(&self) -> bool {
        matches!(self, Self::Timestamp(_) | Self::Entry(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_recoverable() {
        assert!(FetchError::Timeout(10).is_recoverable());
        assert!(FetchError::Status(503).is_recoverable());
        assert!(FetchError::Status(429).is_recoverable());
        assert!(!FetchError::Status(404).is_recoverable());
        assert!(!FetchError::InvalidUrl("nope".to_string()).is_recoverable());
    }

    #[test]
    fn test_classify_error_level() {
        assert!(ClassifyError::Timestamp("abc".to_string()).is_entry_level());
        assert!(!ClassifyError::MissingSection("VoidTraders".to_string()).is_entry_level());
    }
}
