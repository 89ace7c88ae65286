//! Attestation lifecycle manager
//!
//! Subscribes to a set of pub/sub relays for messages on a topic,
//! timestamps each message's id against an OpenTimestamps-style calendar
//! server, and periodically matures the stored proofs: once a proof reaches
//! a Bitcoin block attestation it is republished as a kind-1040 completion
//! event to the relay that delivered the original message, and the record
//! is removed.

pub mod anchoring;
pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod keys;
pub mod mature;
pub mod proof;
pub mod relay;
pub mod store;

pub use config::Config;
pub use error::{AttestorError, AttestorResult, StoreError};
pub use event::{Event, UnsignedEvent, KIND_ATTESTATION};
pub use ingest::{IngestOutcome, Ingestor};
pub use keys::Keys;
pub use mature::{CycleStats, MatureConfig, Maturer, RecordOutcome};
pub use proof::{ProofFile, Sequence};
pub use store::{ArtifactKind, RecordId, RecordStore};
