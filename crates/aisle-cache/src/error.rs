//! # Cache Error Types
//!
//! Error types for cache routing and storage.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Cache Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Network      │  │     Store       │  │      Request            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Network        │  │  StoreIo        │  │  UncacheableUrl         │ │
//! │  │  Timeout        │  │  Serialization  │  │  InvalidConfig          │ │
//! │  │                 │  │  CorruptEntry   │  │  InvalidMethod          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Network errors trigger fallbacks; the others are surfaced to the      │
//! │  caller because retrying cannot fix them.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache error type covering routing, fetching and storage failures.
#[derive(Debug, Error)]
pub enum CacheError {
    // =========================================================================
    // Network Errors
    // =========================================================================
    /// The network fetch failed (DNS, connect, reset, offline).
    #[error("Network fetch failed: {0}")]
    Network(String),

    /// The network fetch did not complete within the configured timeout.
    #[error("Network fetch timed out")]
    Timeout,

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Reading or writing the partition directories failed.
    #[error("Cache store I/O failed: {0}")]
    StoreIo(#[from] std::io::Error),

    /// Entry metadata failed to encode or decode.
    #[error("Cache entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Request Errors
    // =========================================================================
    /// The URL cannot serve as a cache key (unparseable or non-http scheme).
    #[error("URL not cacheable: {0}")]
    UncacheableUrl(String),

    /// The request method is not a valid HTTP method token.
    #[error("Invalid request method: {0}")]
    InvalidMethod(String),

    /// Router configuration failed validation.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CacheError::Timeout
        } else {
            CacheError::Network(err.to_string())
        }
    }
}

// =============================================================================
// Error Categorization (for fallback logic)
// =============================================================================

impl CacheError {
    /// Returns true when the failure came from the network rather than from
    /// this machine. Only these failures activate cached or offline
    /// fallbacks; everything else propagates.
    pub fn is_network(&self) -> bool {
        matches!(self, CacheError::Network(_) | CacheError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_categorization() {
        assert!(CacheError::Network("connection refused".into()).is_network());
        assert!(CacheError::Timeout.is_network());

        assert!(!CacheError::UncacheableUrl("data:...".into()).is_network());
        assert!(!CacheError::InvalidConfig("empty build tag".into()).is_network());
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::UncacheableUrl("data:text/plain,hi".into());
        assert_eq!(err.to_string(), "URL not cacheable: data:text/plain,hi");
    }
}
