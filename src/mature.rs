//! Proof maturation
//!
//! Periodically fetches the chain tip, scans the record store and tries to
//! upgrade each pending proof against its calendar. A proof that reaches a
//! Bitcoin attestation is republished as a completion event to the relay
//! that delivered the original message, and its record is removed only when
//! the relay acknowledges the publish. Every other outcome retains the
//! record for the next cycle.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::anchoring::AttestationService;
use crate::chain::{ChainTip, ChainTipOracle};
use crate::error::{AttestorError, AttestorResult};
use crate::event::{unix_now, Event, UnsignedEvent, KIND_ATTESTATION};
use crate::proof::ProofFile;
use crate::relay::{PublishStatus, Publisher};
use crate::store::{ArtifactKind, RecordId, RecordStore};

/// Maturation loop timing
#[derive(Debug, Clone)]
pub struct MatureConfig {
    /// Pause between cycles
    pub interval: Duration,
    /// Delay before the first cycle, letting relay subscriptions settle
    pub warmup: Duration,
    /// Bound on each network attempt within a cycle
    pub attempt_timeout: Duration,
}

impl Default for MatureConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            warmup: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

/// Per-cycle accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub scanned: usize,
    pub upgraded: usize,
    pub published: usize,
    pub skipped: usize,
}

/// What one maturation pass did with a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// No sequence made progress
    Unchanged,
    /// A sequence advanced but is not chain-confirmed yet
    StillPending,
    /// Confirmed, published and removed
    Published,
    /// Confirmed and persisted, but the relay publish did not succeed
    PublishFailed(String),
}

pub struct Maturer {
    store: Arc<RecordStore>,
    attestor: Arc<dyn AttestationService>,
    oracle: Arc<dyn ChainTipOracle>,
    publisher: Arc<dyn Publisher>,
    config: MatureConfig,
}

impl Maturer {
    pub fn new(
        store: Arc<RecordStore>,
        attestor: Arc<dyn AttestationService>,
        oracle: Arc<dyn ChainTipOracle>,
        publisher: Arc<dyn Publisher>,
        config: MatureConfig,
    ) -> Self {
        Self {
            store,
            attestor,
            oracle,
            publisher,
            config,
        }
    }

    /// Run maturation cycles until shutdown
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.warmup) => {}
            _ = shutdown.recv() => return,
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(stats) => {
                            info!(
                                scanned = stats.scanned,
                                upgraded = stats.upgraded,
                                published = stats.published,
                                skipped = stats.skipped,
                                "maturation cycle complete"
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "maturation cycle failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("maturer shutting down");
                    return;
                }
            }
        }
    }

    /// One full pass: fetch the chain tip, then try every stored record.
    /// A chain tip failure aborts the pass before any record is touched.
    pub async fn run_cycle(&self) -> AttestorResult<CycleStats> {
        let secs = self.config.attempt_timeout.as_secs();
        let tip = timeout(self.config.attempt_timeout, self.oracle.tip())
            .await
            .map_err(|_| AttestorError::AttemptTimeout("chain tip fetch", secs))??;
        info!(height = tip.height, hash = %tip.hash, "chain tip");

        let mut stats = CycleStats::default();
        for id in self.store.scan()? {
            stats.scanned += 1;
            match self.process_record(&id, &tip).await {
                Ok(RecordOutcome::Unchanged) => {}
                Ok(RecordOutcome::StillPending) => stats.upgraded += 1,
                Ok(RecordOutcome::Published) => {
                    stats.upgraded += 1;
                    stats.published += 1;
                }
                Ok(RecordOutcome::PublishFailed(reason)) => {
                    stats.upgraded += 1;
                    warn!(id = %id, reason = %reason, "publish failed, record retained");
                }
                Err(e) => {
                    stats.skipped += 1;
                    warn!(id = %id, error = %e, "record skipped this cycle");
                }
            }
        }
        Ok(stats)
    }

    /// Try to advance one record. The first sequence that yields a usable
    /// upgrade is handled and the rest are left for later cycles.
    pub async fn process_record(
        &self,
        id: &RecordId,
        tip: &ChainTip,
    ) -> AttestorResult<RecordOutcome> {
        let mut proof = ProofFile::from_bytes(&self.store.get(id, ArtifactKind::Proof)?)?;
        let digest = proof.digest;
        let secs = self.config.attempt_timeout.as_secs();

        let mut advanced = None;
        for (index, sequence) in proof.sequences.iter().enumerate() {
            let attempt = timeout(
                self.config.attempt_timeout,
                self.attestor.upgrade(sequence, &digest),
            )
            .await;
            let upgraded = match attempt {
                Ok(Ok(upgraded)) => upgraded,
                Ok(Err(e)) => {
                    warn!(id = %id, error = %e, "sequence upgrade failed");
                    continue;
                }
                Err(_) => {
                    warn!(id = %id, timeout_secs = secs, "sequence upgrade timed out");
                    continue;
                }
            };
            if upgraded == *sequence && !upgraded.is_confirmed() {
                continue;
            }
            advanced = Some((index, upgraded));
            break;
        }

        let Some((index, upgraded)) = advanced else {
            return Ok(RecordOutcome::Unchanged);
        };

        let confirmed = upgraded.is_confirmed();
        proof.sequences[index] = upgraded;
        // persist before publishing, so a crash or publish failure leaves
        // the upgraded proof on disk
        let proof_bytes = proof.to_bytes();
        self.store.put(id, ArtifactKind::Proof, &proof_bytes)?;

        if !confirmed {
            info!(id = %id, "proof upgraded, still pending");
            return Ok(RecordOutcome::StillPending);
        }

        let message: Event = serde_json::from_slice(&self.store.get(id, ArtifactKind::Message)?)
            .map_err(|e| AttestorError::InvalidEvent(format!("stored message: {e}")))?;
        let endpoint_bytes = self.store.get(id, ArtifactKind::Endpoint)?;
        let endpoint = String::from_utf8_lossy(&endpoint_bytes).trim().to_string();

        let completion = completion_event(&message, &endpoint, tip, &proof_bytes);
        let attempt = timeout(
            self.config.attempt_timeout,
            self.publisher.publish(&endpoint, completion),
        )
        .await;

        match attempt {
            Ok(Ok(PublishStatus::Succeeded)) => {
                self.store.delete(id);
                info!(id = %id, endpoint = %endpoint, "matured proof published");
                Ok(RecordOutcome::Published)
            }
            Ok(Ok(PublishStatus::Failed(reason))) => Ok(RecordOutcome::PublishFailed(reason)),
            Ok(Err(e)) => Ok(RecordOutcome::PublishFailed(e.to_string())),
            Err(_) => Ok(RecordOutcome::PublishFailed(format!(
                "publish timed out after {secs} seconds"
            ))),
        }
    }
}

/// Build the completion event for a matured proof: it references the
/// original message and its origin relay, names the block the cycle saw and
/// carries the full proof blob base64-encoded in the content.
pub fn completion_event(
    message: &Event,
    endpoint: &str,
    tip: &ChainTip,
    proof_bytes: &[u8],
) -> UnsignedEvent {
    UnsignedEvent {
        created_at: unix_now(),
        kind: KIND_ATTESTATION,
        tags: vec![
            vec![
                "e".to_string(),
                message.id.clone(),
                endpoint.to_string(),
            ],
            vec!["p".to_string(), message.pubkey.clone()],
            vec![
                "block".to_string(),
                tip.height.to_string(),
                tip.hash.clone(),
            ],
        ],
        content: BASE64.encode(proof_bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::MockAttestationService;
    use crate::chain::MockChainTipOracle;
    use crate::relay::MockPublisher;
    use crate::store::RecordStore;
    use tempfile::TempDir;

    const TIP_HASH: &str = "0000000000000000000123456789abcdef0123456789abcdef0123456789abcd";

    fn tip() -> ChainTip {
        ChainTip {
            height: 812_345,
            hash: TIP_HASH.to_string(),
        }
    }

    fn fast_config() -> MatureConfig {
        MatureConfig {
            interval: Duration::from_millis(50),
            warmup: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn stored_event(digest: [u8; 32]) -> Event {
        Event {
            id: hex::encode(digest),
            pubkey: hex::encode([5u8; 32]),
            created_at: 1_700_000_000,
            kind: 1,
            tags: vec![vec!["t".into(), "prediction".into()]],
            content: "who wins the election?".into(),
            sig: hex::encode([0u8; 64]),
        }
    }

    struct Fixture {
        maturer: Maturer,
        store: Arc<RecordStore>,
        attestor: Arc<MockAttestationService>,
        oracle: Arc<MockChainTipOracle>,
        publisher: Arc<MockPublisher>,
        _dir: TempDir,
    }

    fn fixture(attestor: MockAttestationService, publisher: MockPublisher) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::open(dir.path()).unwrap());
        let attestor = Arc::new(attestor);
        let oracle = Arc::new(MockChainTipOracle::new(812_345, TIP_HASH));
        let publisher = Arc::new(publisher);
        let maturer = Maturer::new(
            Arc::clone(&store),
            Arc::clone(&attestor) as Arc<dyn AttestationService>,
            Arc::clone(&oracle) as Arc<dyn ChainTipOracle>,
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            fast_config(),
        );
        Fixture {
            maturer,
            store,
            attestor,
            oracle,
            publisher,
            _dir: dir,
        }
    }

    async fn seed_record(f: &Fixture, digest: [u8; 32], endpoint: &str) -> RecordId {
        let id = RecordId::from_bytes(digest);
        let event = stored_event(digest);
        f.store
            .put(&id, ArtifactKind::Message, &serde_json::to_vec(&event).unwrap())
            .unwrap();
        f.store
            .put(&id, ArtifactKind::Endpoint, endpoint.as_bytes())
            .unwrap();
        let sequence = f.attestor.stamp(&digest).await.unwrap();
        let proof = ProofFile::new(digest, vec![sequence]);
        f.store
            .put(&id, ArtifactKind::Proof, &proof.to_bytes())
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_unchanged_when_calendar_has_nothing() {
        let f = fixture(MockAttestationService::new(), MockPublisher::new());
        let id = seed_record(&f, [0x41u8; 32], "wss://relay-a.test").await;

        let outcome = f.maturer.process_record(&id, &tip()).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Unchanged);
        assert!(f.store.exists(&id, ArtifactKind::Proof));
        assert!(f.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_still_pending_persists_upgrade_without_publish() {
        let f = fixture(
            MockAttestationService::with_pending_upgrade(),
            MockPublisher::new(),
        );
        let id = seed_record(&f, [0x42u8; 32], "wss://relay-a.test").await;

        let outcome = f.maturer.process_record(&id, &tip()).await.unwrap();
        assert_eq!(outcome, RecordOutcome::StillPending);
        assert!(f.publisher.published().is_empty());

        let proof =
            ProofFile::from_bytes(&f.store.get(&id, ArtifactKind::Proof).unwrap()).unwrap();
        assert!(!proof.is_confirmed());
        assert_eq!(proof.sequences[0].steps.len(), 2);
    }

    #[tokio::test]
    async fn test_confirmed_publishes_and_removes_record() {
        let f = fixture(
            MockAttestationService::with_confirmation(812_000),
            MockPublisher::new(),
        );
        let digest = [0x43u8; 32];
        let id = seed_record(&f, digest, "wss://relay-a.test").await;

        let outcome = f.maturer.process_record(&id, &tip()).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Published);

        for kind in ArtifactKind::ALL {
            assert!(!f.store.exists(&id, kind));
        }

        let published = f.publisher.published();
        assert_eq!(published.len(), 1);
        let (endpoint, event) = &published[0];
        assert_eq!(endpoint, "wss://relay-a.test");
        assert_eq!(event.kind, KIND_ATTESTATION);
        assert_eq!(
            event.tags[0],
            vec!["e".to_string(), hex::encode(digest), "wss://relay-a.test".to_string()]
        );
        assert_eq!(
            event.tags[1],
            vec!["p".to_string(), hex::encode([5u8; 32])]
        );
        assert_eq!(
            event.tags[2],
            vec!["block".to_string(), "812345".to_string(), TIP_HASH.to_string()]
        );

        let proof_bytes = BASE64.decode(&event.content).unwrap();
        let proof = ProofFile::from_bytes(&proof_bytes).unwrap();
        assert!(proof.is_confirmed());
        assert_eq!(proof.digest, digest);
    }

    #[tokio::test]
    async fn test_publish_failure_retains_confirmed_record() {
        let f = fixture(
            MockAttestationService::with_confirmation(812_000),
            MockPublisher::failing(),
        );
        let id = seed_record(&f, [0x44u8; 32], "wss://relay-a.test").await;

        let outcome = f.maturer.process_record(&id, &tip()).await.unwrap();
        assert!(matches!(outcome, RecordOutcome::PublishFailed(_)));

        // the upgraded proof stays on disk for the next cycle
        let proof =
            ProofFile::from_bytes(&f.store.get(&id, ArtifactKind::Proof).unwrap()).unwrap();
        assert!(proof.is_confirmed());
        assert!(f.store.exists(&id, ArtifactKind::Message));
        assert!(f.store.exists(&id, ArtifactKind::Endpoint));
    }

    #[tokio::test]
    async fn test_rejected_publish_retains_record() {
        let f = fixture(
            MockAttestationService::with_confirmation(812_000),
            MockPublisher::rejecting(),
        );
        let id = seed_record(&f, [0x45u8; 32], "wss://relay-a.test").await;

        let outcome = f.maturer.process_record(&id, &tip()).await.unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::PublishFailed("mock rejection".into())
        );
        assert!(f.store.exists(&id, ArtifactKind::Proof));
    }

    #[tokio::test]
    async fn test_cycle_aborts_on_chain_tip_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::open(dir.path()).unwrap());
        let attestor = Arc::new(MockAttestationService::with_confirmation(1));
        let oracle = Arc::new(MockChainTipOracle::failing());
        let publisher = Arc::new(MockPublisher::new());
        let maturer = Maturer::new(
            Arc::clone(&store),
            Arc::clone(&attestor) as Arc<dyn AttestationService>,
            oracle,
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            fast_config(),
        );

        let digest = [0x46u8; 32];
        let id = RecordId::from_bytes(digest);
        let sequence = attestor.stamp(&digest).await.unwrap();
        let before = ProofFile::new(digest, vec![sequence]).to_bytes();
        store.put(&id, ArtifactKind::Proof, &before).unwrap();

        assert!(maturer.run_cycle().await.is_err());
        // no upgrade attempted, proof bytes untouched
        assert_eq!(attestor.upgrade_call_count(), 0);
        assert_eq!(store.get(&id, ArtifactKind::Proof).unwrap(), before);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_counts_outcomes() {
        let f = fixture(
            MockAttestationService::with_confirmation(812_000),
            MockPublisher::new(),
        );
        seed_record(&f, [0x47u8; 32], "wss://relay-a.test").await;
        seed_record(&f, [0x48u8; 32], "wss://relay-b.test").await;

        let stats = f.maturer.run_cycle().await.unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.upgraded, 2);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(f.oracle.call_count(), 1);
        assert_eq!(f.publisher.published().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_publishes_without_restamping() {
        // first cycle confirms but cannot publish, second cycle publishes
        // from the persisted proof without another stamp
        let f = fixture(
            MockAttestationService::with_confirmation(812_000),
            MockPublisher::failing(),
        );
        let id = seed_record(&f, [0x49u8; 32], "wss://relay-a.test").await;
        let stamps_after_seed = f.attestor.stamp_call_count();

        let outcome = f.maturer.process_record(&id, &tip()).await.unwrap();
        assert!(matches!(outcome, RecordOutcome::PublishFailed(_)));

        f.publisher
            .should_fail
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let outcome = f.maturer.process_record(&id, &tip()).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Published);
        assert_eq!(f.attestor.stamp_call_count(), stamps_after_seed);
    }
}
