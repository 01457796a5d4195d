//! # Request and Response Types
//!
//! The router's own request/response model. Strategies work entirely in
//! these types; the reqwest mapping lives behind the [`crate::Fetcher`]
//! seam, which is what lets tests script the network.

use crate::{STALE_HEADER, STALE_HEADER_VALUE};

// =============================================================================
// Response Source
// =============================================================================

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the network.
    Network,
    /// Served from a cache partition.
    Cache,
    /// Synthesized offline fallback (shell, offline page, generic 503).
    Fallback,
}

// =============================================================================
// Fetch Request
// =============================================================================

/// An outgoing request as the router sees it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// HTTP method, uppercase ("GET", "POST", ...).
    pub method: String,

    /// Absolute request URL.
    pub url: String,

    /// Request headers in send order.
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    /// A GET request with no headers.
    pub fn get(url: &str) -> Self {
        FetchRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: Vec::new(),
        }
    }

    /// Adds a header (builder style).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First header value for `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for GET requests (the only interceptable method).
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// True for http/https URLs. Extension and data URLs, among others,
    /// never enter the cache path.
    pub fn is_http(&self) -> bool {
        url::Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// True when the request asks for an HTML document, which is how
    /// navigations announce themselves.
    pub fn is_navigation(&self) -> bool {
        self.header("accept")
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
    }

    /// URL path, when the URL parses.
    pub fn path(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .map(|u| u.path().to_string())
    }
}

// =============================================================================
// Fetch Response
// =============================================================================

/// A response on its way back to the caller, tagged with provenance.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response headers.
    pub headers: Vec<(String, String)>,

    /// Response body bytes.
    pub body: Vec<u8>,

    /// Where this response came from.
    pub source: ResponseSource,

    /// True when this is a cached copy the router failed to refresh.
    pub stale: bool,
}

impl FetchResponse {
    /// A fresh network response.
    pub fn network(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        FetchResponse {
            status,
            headers,
            body,
            source: ResponseSource::Network,
            stale: false,
        }
    }

    /// The structured offline response for API-shaped requests:
    /// `503` with `{"error": <detail>, "offline": true}`.
    pub fn offline_json(detail: &str) -> Self {
        let body = serde_json::json!({ "error": detail, "offline": true })
            .to_string()
            .into_bytes();
        FetchResponse {
            status: 503,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
            source: ResponseSource::Fallback,
            stale: false,
        }
    }

    /// The last-resort offline response for navigations with nothing cached.
    pub fn offline_text() -> Self {
        FetchResponse {
            status: 503,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: b"Offline".to_vec(),
            source: ResponseSource::Fallback,
            stale: false,
        }
    }

    /// First header value for `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for 2xx statuses. Only these responses are ever cached.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Marks a response as a stale cached copy and stamps the header callers
    /// match on.
    pub fn into_stale(mut self) -> Self {
        self.stale = true;
        self.headers
            .push((STALE_HEADER.to_string(), STALE_HEADER_VALUE.to_string()));
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
