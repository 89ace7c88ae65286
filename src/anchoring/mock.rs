//! Mock attestation service for tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::anchoring::error::AnchorError;
use crate::anchoring::service::AttestationService;
use crate::proof::{Attestation, Sequence, Step};

/// What [`MockAttestationService::upgrade`] hands back
#[derive(Debug, Clone, Copy)]
enum UpgradeBehavior {
    /// Return the input sequence unchanged (calendar has nothing yet)
    Echo,
    /// Replace the terminal pending attestation with a Bitcoin one
    Confirm { height: u64 },
    /// Append a fresh pending step (calendar re-pended the commitment)
    Repend,
}

/// In-memory [`AttestationService`] with scriptable failure modes and call
/// counters, for exercising the ingest and maturation paths without a
/// calendar server.
pub struct MockAttestationService {
    pub stamp_should_fail: AtomicBool,
    pub upgrade_should_fail: AtomicBool,
    pub stamp_calls: AtomicUsize,
    pub upgrade_calls: AtomicUsize,
    calendar_url: String,
    upgrade_behavior: UpgradeBehavior,
}

impl MockAttestationService {
    pub fn new() -> Self {
        Self {
            stamp_should_fail: AtomicBool::new(false),
            upgrade_should_fail: AtomicBool::new(false),
            stamp_calls: AtomicUsize::new(0),
            upgrade_calls: AtomicUsize::new(0),
            calendar_url: "https://mock.calendar.test".to_string(),
            upgrade_behavior: UpgradeBehavior::Echo,
        }
    }

    /// Mock whose calls all fail
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.stamp_should_fail.store(true, Ordering::SeqCst);
        mock.upgrade_should_fail.store(true, Ordering::SeqCst);
        mock
    }

    /// Mock whose upgrades confirm at the given block height
    pub fn with_confirmation(height: u64) -> Self {
        Self {
            upgrade_behavior: UpgradeBehavior::Confirm { height },
            ..Self::new()
        }
    }

    /// Mock whose upgrades come back with a fresh pending commitment
    pub fn with_pending_upgrade() -> Self {
        Self {
            upgrade_behavior: UpgradeBehavior::Repend,
            ..Self::new()
        }
    }

    pub fn stamp_call_count(&self) -> usize {
        self.stamp_calls.load(Ordering::SeqCst)
    }

    pub fn upgrade_call_count(&self) -> usize {
        self.upgrade_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAttestationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttestationService for MockAttestationService {
    async fn stamp(&self, digest: &[u8; 32]) -> Result<Sequence, AnchorError> {
        self.stamp_calls.fetch_add(1, Ordering::SeqCst);
        if self.stamp_should_fail.load(Ordering::SeqCst) {
            return Err(AnchorError::ServiceError("mock stamp failure".into()));
        }
        Ok(Sequence::pending(digest.to_vec(), &self.calendar_url))
    }

    async fn upgrade(
        &self,
        sequence: &Sequence,
        _digest: &[u8; 32],
    ) -> Result<Sequence, AnchorError> {
        self.upgrade_calls.fetch_add(1, Ordering::SeqCst);
        if self.upgrade_should_fail.load(Ordering::SeqCst) {
            return Err(AnchorError::ServiceError("mock upgrade failure".into()));
        }
        if sequence.is_confirmed() {
            return Ok(sequence.clone());
        }
        match self.upgrade_behavior {
            UpgradeBehavior::Echo => Ok(sequence.clone()),
            UpgradeBehavior::Confirm { height } => {
                let mut upgraded = sequence.clone();
                if let Some(last) = upgraded.steps.last_mut() {
                    last.attestation = Some(Attestation::Bitcoin { height });
                }
                Ok(upgraded)
            }
            UpgradeBehavior::Repend => {
                let mut upgraded = sequence.clone();
                upgraded.steps.push(Step {
                    output: vec![0xabu8; 32],
                    attestation: Some(Attestation::Pending {
                        uri: self.calendar_url.clone(),
                    }),
                });
                Ok(upgraded)
            }
        }
    }
}
