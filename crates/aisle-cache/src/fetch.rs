//! # Network Fetcher
//!
//! The seam between the router and the actual network. Strategies only ever
//! talk to the [`Fetcher`] trait; production wires in [`HttpFetcher`], tests
//! wire in scripted fakes.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, CacheResult};
use crate::request::{FetchRequest, FetchResponse};

// =============================================================================
// Fetcher Trait
// =============================================================================

/// Performs a network fetch.
///
/// Implementations must map transport-level failures (offline, DNS, reset,
/// timeout) to errors whose [`CacheError::is_network`] is true; that is what
/// tells the router a fallback applies.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> CacheResult<FetchResponse>;
}

// =============================================================================
// HTTP Fetcher (reqwest)
// =============================================================================

/// Production fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> CacheResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Network(e.to_string()))?;
        Ok(HttpFetcher { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> CacheResult<FetchResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| CacheError::InvalidMethod(request.method.clone()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(FetchResponse::network(status, headers, body))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_method_is_not_a_network_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let request = FetchRequest {
            method: "NOT A METHOD".to_string(),
            ..FetchRequest::get("https://aisle.example.com/")
        };
        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidMethod(_)));
        assert!(!err.is_network());
    }
}
