//! Error types for the BliChat relay
//!
//! Endpoint failures, normalization discards and configuration errors each get
//! their own enum; `RelayError` unifies them for callers that only need to
//! propagate.

use core::time::Duration;

// ----------------------------------------------------------------------------
// Endpoint Errors
// ----------------------------------------------------------------------------

/// Failure reported by one of the external endpoints
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("Network error: {reason}")]
    Network { reason: String },
    #[error("Throttled by upstream{}", retry_after.map(|d| format!(" (retry after {}ms)", d.as_millis())).unwrap_or_default())]
    Throttled { retry_after: Option<Duration> },
    #[error("Request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Rejected by upstream: {reason}")]
    Rejected { reason: String },
    #[error("Endpoint closed")]
    Closed,
}

impl EndpointError {
    /// Whether retrying the same request can succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EndpointError::Network { .. }
                | EndpointError::Throttled { .. }
                | EndpointError::Timeout { .. }
        )
    }

    /// Delay the upstream asked us to observe before retrying, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EndpointError::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Normalization Outcome
// ----------------------------------------------------------------------------

/// Why a raw stream event did not produce a comment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Discard {
    /// Room entries, follows, gifts and other system traffic
    #[error("Not a comment: {kind}")]
    NotAComment { kind: String },
    #[error("Malformed comment payload: {reason}")]
    Malformed { reason: String },
}

impl Discard {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Discard::Malformed { .. })
    }
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("Missing required value: {field}")]
    Missing { field: &'static str },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("Discarded event: {0}")]
    Discarded(#[from] Discard),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Relay shut down: {reason}")]
    Shutdown { reason: String },
}

pub type RelayResult<T> = core::result::Result<T, RelayError>;
