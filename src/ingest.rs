//! Event ingestion
//!
//! Subscribes to the relay set, records each fresh event's artifacts and
//! submits its id digest to the calendar. The proof artifact doubles as the
//! dedup marker: an event whose proof already exists on disk is skipped, and
//! an event whose stamp failed stays proof-less so a later redelivery
//! retries it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::anchoring::AttestationService;
use crate::error::AttestorResult;
use crate::proof::ProofFile;
use crate::relay::{EventSource, IncomingEvent};
use crate::store::{ArtifactKind, RecordId, RecordStore};

/// What [`Ingestor::handle_event`] did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Artifacts written and digest stamped
    Recorded,
    /// A proof artifact already existed, nothing written
    AlreadyRecorded,
}

pub struct Ingestor {
    store: Arc<RecordStore>,
    attestor: Arc<dyn AttestationService>,
    source: Arc<dyn EventSource>,
    resubscribe_delay: Duration,
}

impl Ingestor {
    pub fn new(
        store: Arc<RecordStore>,
        attestor: Arc<dyn AttestationService>,
        source: Arc<dyn EventSource>,
        resubscribe_delay: Duration,
    ) -> Self {
        Self {
            store,
            attestor,
            source,
            resubscribe_delay,
        }
    }

    /// Record one incoming event and stamp its digest
    pub async fn handle_event(&self, incoming: &IncomingEvent) -> AttestorResult<IngestOutcome> {
        let digest = incoming.event.id_bytes()?;
        let id = RecordId::from_bytes(digest);

        if self.store.exists(&id, ArtifactKind::Proof) {
            return Ok(IngestOutcome::AlreadyRecorded);
        }

        let message = serde_json::to_vec(&incoming.event)
            .map_err(|e| crate::error::AttestorError::InvalidEvent(e.to_string()))?;
        self.store.put(&id, ArtifactKind::Message, &message)?;
        self.store
            .put(&id, ArtifactKind::Endpoint, incoming.endpoint.as_bytes())?;

        // stamp last: a failure leaves the record proof-less and retryable
        let sequence = self.attestor.stamp(&digest).await?;
        let proof = ProofFile::new(digest, vec![sequence]);
        self.store.put(&id, ArtifactKind::Proof, &proof.to_bytes())?;

        info!(id = %id, endpoint = %incoming.endpoint, "event recorded and stamped");
        Ok(IngestOutcome::Recorded)
    }

    /// Subscribe and ingest until shutdown. When every relay connection is
    /// lost the stream closes and we resubscribe after a delay.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let mut rx = match self.source.subscribe().await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(error = %e, "subscription failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(self.resubscribe_delay) => continue,
                        _ = shutdown.recv() => return,
                    }
                }
            };

            loop {
                tokio::select! {
                    incoming = rx.recv() => {
                        let Some(incoming) = incoming else {
                            warn!("all relay connections lost, resubscribing");
                            break;
                        };
                        match self.handle_event(&incoming).await {
                            Ok(IngestOutcome::Recorded) => {}
                            Ok(IngestOutcome::AlreadyRecorded) => {
                                info!(id = %incoming.event.id, "event already recorded");
                            }
                            Err(e) => {
                                error!(id = %incoming.event.id, error = %e, "failed to ingest event");
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("ingestor shutting down");
                        return;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
                _ = shutdown.recv() => return,
            }
        }
    }
}
