//! # aisle-cache: Cache Strategy Router for Aisle
//!
//! This crate keeps the app usable when the network is not. Every outgoing
//! GET passes through the [`CacheRouter`], which classifies it and applies
//! one of five serving strategies against a set of versioned cache
//! partitions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Aisle Request Path                                 │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Application Code                             │   │
//! │  │         product pages ── store maps ── API calls                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ FetchRequest                           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ aisle-cache (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   classify ──► strategy ──► CacheStore ◄──► disk partitions    │   │
//! │  │                   │                                             │   │
//! │  │                   └──────► Fetcher (reqwest) ──► network       │   │
//! │  │                                                                 │   │
//! │  │   static-{tag}/  dynamic-{tag}/  offline-fallback-{tag}/       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Strategies
//!
//! | Class          | Strategy                                  |
//! |----------------|-------------------------------------------|
//! | `StaticAsset`  | cache-first + background revalidation     |
//! | `LiveApi`      | network-first, stale cache fallback       |
//! | `CacheableApi` | cache-first + background revalidation     |
//! | `Navigation`   | network-first, app shell fallback         |
//! | `Other`        | network-first, generic offline response   |
//!
//! Non-GET and non-http(s) requests bypass the cache entirely.
//!
//! ## Modules
//!
//! - [`classify`] - First-match-wins request classification
//! - [`config`] - Router configuration (build tag, shell assets, patterns)
//! - [`entry`] - Cache entries, partitions, URL normalization
//! - [`fetch`] - The `Fetcher` seam and the reqwest implementation
//! - [`request`] - Request/response types shared by all strategies
//! - [`router`] - The strategies themselves plus install/activate
//! - [`store`] - Disk-backed, memory-indexed partition store
//! - [`error`] - Cache error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod classify;
pub mod config;
pub mod entry;
pub mod error;
pub mod fetch;
pub mod request;
pub mod router;
pub mod store;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use classify::{classify, RequestClass};
pub use config::RouterConfig;
pub use entry::{normalize_url, CacheEntry, PartitionKind};
pub use error::{CacheError, CacheResult};
pub use fetch::{Fetcher, HttpFetcher};
pub use request::{FetchRequest, FetchResponse, ResponseSource};
pub use router::{CacheRouter, InstallReport};
pub use store::CacheStore;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Header added to responses served from cache while the network copy could
/// not be refreshed.
///
/// ## Why a constant?
/// Callers decide how loudly to surface staleness (banner, toast, nothing).
/// They match on this header rather than re-deriving freshness themselves.
pub const STALE_HEADER: &str = "x-aisle-cache";

/// Value of [`STALE_HEADER`] on stale responses.
pub const STALE_HEADER_VALUE: &str = "stale";
