//! Attestation proof model
//!
//! A proof ties a 32-byte digest to one or more attestation sequences. Each
//! sequence is an ordered chain of steps whose terminal step carries either a
//! pending calendar commitment or a concrete Bitcoin block attestation.

mod codec;

pub use codec::ProofError;

/// Terminal marker of an attestation sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attestation {
    /// Calendar commitment awaiting Bitcoin confirmation
    Pending { uri: String },
    /// Concrete Bitcoin block attestation
    Bitcoin { height: u64 },
}

/// One verification step in a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Commitment bytes produced by this step
    pub output: Vec<u8>,
    /// Terminal steps carry an attestation
    pub attestation: Option<Attestation>,
}

/// An ordered chain of verification steps
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    pub steps: Vec<Step>,
}

impl Sequence {
    /// Single-step sequence committing `output` to a calendar
    pub fn pending(output: Vec<u8>, uri: impl Into<String>) -> Self {
        Self {
            steps: vec![Step {
                output,
                attestation: Some(Attestation::Pending { uri: uri.into() }),
            }],
        }
    }

    /// Attestation carried by the terminal step, if any
    pub fn terminal(&self) -> Option<&Attestation> {
        self.steps.last().and_then(|s| s.attestation.as_ref())
    }

    /// Block height when the terminal step is a Bitcoin attestation
    pub fn bitcoin_height(&self) -> Option<u64> {
        match self.terminal() {
            Some(Attestation::Bitcoin { height }) => Some(*height),
            _ => None,
        }
    }

    /// Whether the sequence has reached a chain-confirmed state
    pub fn is_confirmed(&self) -> bool {
        self.bitcoin_height().is_some()
    }

    /// First pending attestation and its step commitment, used for the
    /// calendar lookup when upgrading
    pub fn pending_commitment(&self) -> Option<(&str, &[u8])> {
        self.steps.iter().find_map(|step| match &step.attestation {
            Some(Attestation::Pending { uri }) => Some((uri.as_str(), step.output.as_slice())),
            _ => None,
        })
    }

    /// Serialize the sequence alone (calendar wire form)
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode_sequence(self)
    }

    /// Parse a sequence from its wire form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        codec::decode_sequence_exact(bytes)
    }
}

/// Stored proof artifact: digest plus its attestation sequences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofFile {
    pub digest: [u8; 32],
    pub sequences: Vec<Sequence>,
}

impl ProofFile {
    pub fn new(digest: [u8; 32], sequences: Vec<Sequence>) -> Self {
        Self { digest, sequences }
    }

    /// Whether any sequence has reached a chain-confirmed state
    pub fn is_confirmed(&self) -> bool {
        self.sequences.iter().any(Sequence::is_confirmed)
    }

    /// Serialize to the on-disk blob format
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode_proof(self)
    }

    /// Parse an on-disk blob
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        codec::decode_proof(bytes)
    }
}
