//! # Error Types
//!
//! Domain-specific error types for aisle-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  aisle-core errors (this file)                                         │
//! │  └── CoreError        - Frame decoding, endpoint derivation, parsing   │
//! │                                                                         │
//! │  aisle-cache errors (separate crate)                                   │
//! │  └── CacheError       - Store and fetch failures                       │
//! │                                                                         │
//! │  aisle-sync errors (separate crate)                                    │
//! │  └── SyncError        - Transport and channel failures                 │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → logged (never crosses the facade)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (frame type, origin, etc.)
//! 3. Errors are enum variants, never String
//! 4. A frame with an *unknown* type is NOT an error (forward compatibility);
//!    only structurally invalid input produces one

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors from the pure domain layer.
///
/// These cover everything that can go wrong without touching I/O: decoding
/// wire frames, parsing domain tags, deriving endpoints.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Inbound text was not valid JSON or lacked the required shape.
    ///
    /// ## When This Occurs
    /// - Truncated or corrupted frame
    /// - Server sent a non-JSON text frame
    ///
    /// Note that a *well-formed* frame with an unrecognized `type` is not an
    /// error; it decodes to `InboundFrame::Unknown`.
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// A string did not name a known sync domain.
    #[error("Unknown sync domain: {0}")]
    UnknownDomain(String),

    /// A string did not name a known sync operation.
    #[error("Unknown sync operation: {0}")]
    UnknownOperation(String),

    /// The configured origin cannot be turned into a WebSocket endpoint.
    ///
    /// ## When This Occurs
    /// - Origin is not a parseable URL
    /// - Origin uses a scheme other than http/https/ws/wss
    #[error("Cannot derive sync endpoint from origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
