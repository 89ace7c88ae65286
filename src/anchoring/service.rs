//! Attestation service boundary

use std::time::Duration;

use async_trait::async_trait;

use crate::anchoring::calendar::CalendarClient;
use crate::anchoring::error::AnchorError;
use crate::proof::Sequence;

/// Narrow interface over the calendar timestamping protocol, so the lifecycle
/// manager can run against deterministic fakes in tests.
#[async_trait]
pub trait AttestationService: Send + Sync {
    /// Submit a digest, returning the initial (pending) sequence
    async fn stamp(&self, digest: &[u8; 32]) -> Result<Sequence, AnchorError>;

    /// Attempt to mature a sequence. Returns the same sequence when no
    /// upgrade is available yet, a more-complete sequence on progress.
    async fn upgrade(
        &self,
        sequence: &Sequence,
        digest: &[u8; 32],
    ) -> Result<Sequence, AnchorError>;
}

/// Calendar-backed attestation service
pub struct CalendarAttestor {
    calendar: CalendarClient,
    calendar_url: String,
}

impl CalendarAttestor {
    pub fn new(calendar_url: &str, timeout: Duration) -> Result<Self, AnchorError> {
        if calendar_url.is_empty() {
            return Err(AnchorError::NotConfigured("calendar url".into()));
        }
        Ok(Self {
            calendar: CalendarClient::new(timeout)?,
            calendar_url: calendar_url.trim_end_matches('/').to_string(),
        })
    }

    fn parse_sequence(bytes: &[u8], digest: &[u8; 32]) -> Result<Sequence, AnchorError> {
        let sequence = Sequence::from_bytes(bytes)
            .map_err(|e| AnchorError::InvalidResponse(format!("bad sequence blob: {e}")))?;
        if sequence.terminal().is_none() {
            return Err(AnchorError::InvalidResponse(
                "sequence has no terminal attestation".into(),
            ));
        }
        // the sequence must chain from our digest
        match sequence.steps.first() {
            Some(first) if !first.output.is_empty() && first.output != digest => {
                Err(AnchorError::InvalidResponse(
                    "sequence does not commit to the submitted digest".into(),
                ))
            }
            _ => Ok(sequence),
        }
    }
}

#[async_trait]
impl AttestationService for CalendarAttestor {
    async fn stamp(&self, digest: &[u8; 32]) -> Result<Sequence, AnchorError> {
        let bytes = self.calendar.submit(&self.calendar_url, digest).await?;
        Self::parse_sequence(&bytes, digest)
    }

    async fn upgrade(
        &self,
        sequence: &Sequence,
        digest: &[u8; 32],
    ) -> Result<Sequence, AnchorError> {
        // already chain-confirmed, nothing to look up
        if sequence.is_confirmed() {
            return Ok(sequence.clone());
        }

        let Some((uri, commitment)) = sequence.pending_commitment() else {
            return Ok(sequence.clone());
        };
        if uri.is_empty() {
            return Ok(sequence.clone());
        }

        match self.calendar.upgrade(uri, commitment).await? {
            None => Ok(sequence.clone()),
            Some(bytes) => Self::parse_sequence(&bytes, digest),
        }
    }
}
