//! Anchoring-specific error types

use thiserror::Error;

/// Anchoring operation errors
#[derive(Debug, Clone, Error)]
pub enum AnchorError {
    /// Network communication error
    #[error("network error: {0}")]
    Network(String),

    /// Calendar returned an error status
    #[error("service error: {0}")]
    ServiceError(String),

    /// Invalid response from the calendar
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request timeout
    #[error("timeout after {0} seconds")]
    Timeout(u64),

    /// Calendar not configured
    #[error("not configured: {0}")]
    NotConfigured(String),
}
