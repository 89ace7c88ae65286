//! Daemon error types

use thiserror::Error;

use crate::anchoring::error::AnchorError;
use crate::chain::ChainError;
use crate::proof::ProofError;
use crate::relay::RelayError;

/// Top-level error for the attestation lifecycle manager
#[derive(Debug, Error)]
pub enum AttestorError {
    /// Record store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Calendar stamp/upgrade failed
    #[error("anchoring error: {0}")]
    Anchor(#[from] AnchorError),

    /// Chain tip fetch failed
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Relay subscription or publish failed
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Stored or received proof blob could not be parsed
    #[error("proof error: {0}")]
    Proof(#[from] ProofError),

    /// Malformed inbound or stored message
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Bounded call did not complete in time
    #[error("{0} timed out after {1} seconds")]
    AttemptTimeout(&'static str, u64),

    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type AttestorResult<T> = Result<T, AttestorError>;

/// Record-store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Artifact not found for an identifier
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// Identifier does not decode to exactly 32 bytes
    #[error("invalid record id: {0}")]
    InvalidId(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AttestorError {
    /// Check if the affected unit of work should be retried on a later pass
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AttestorError::Anchor(AnchorError::Network(_))
                | AttestorError::Anchor(AnchorError::Timeout(_))
                | AttestorError::Anchor(AnchorError::ServiceError(_))
                | AttestorError::Chain(_)
                | AttestorError::Relay(_)
                | AttestorError::AttemptTimeout(..)
        )
    }
}
