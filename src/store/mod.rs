//! Filesystem-backed record store
//!
//! Each pending attestation keeps three co-located artifacts under the data
//! directory, named by fixed prefix/suffix pairs around the 64-hex-char id:
//! the proof blob, the origin endpoint and the original message. The proof
//! file doubles as the work-queue marker: a record exists for the maturation
//! loop exactly when its proof artifact does.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const PREFIX_PROOF: &str = "time-";
pub const SUFFIX_PROOF: &str = ".ots";
pub const PREFIX_ENDPOINT: &str = "relay-";
pub const SUFFIX_ENDPOINT: &str = ".txt";
pub const PREFIX_MESSAGE: &str = "event-";
pub const SUFFIX_MESSAGE: &str = ".json";

/// 32-byte record identifier, the message digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId([u8; 32]);

impl RecordId {
    /// Parse a 64-hex-character identifier
    pub fn from_hex(s: &str) -> Result<Self, StoreError> {
        if s.len() != 64 {
            return Err(StoreError::InvalidId(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| StoreError::InvalidId(s.to_string()))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::InvalidId(s.to_string()))?;
        Ok(Self(digest))
    }

    pub fn from_bytes(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    pub fn digest(&self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// The three artifact kinds of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Proof,
    Endpoint,
    Message,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Proof,
        ArtifactKind::Endpoint,
        ArtifactKind::Message,
    ];

    fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Proof => PREFIX_PROOF,
            ArtifactKind::Endpoint => PREFIX_ENDPOINT,
            ArtifactKind::Message => PREFIX_MESSAGE,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Proof => SUFFIX_PROOF,
            ArtifactKind::Endpoint => SUFFIX_ENDPOINT,
            ArtifactKind::Message => SUFFIX_MESSAGE,
        }
    }

    /// File name for an identifier, e.g. `time-{id}.ots`
    pub fn file_name(self, id: &RecordId) -> String {
        format!("{}{}{}", self.prefix(), id, self.suffix())
    }
}

/// Filesystem store for pending attestation records
///
/// No locking is provided. The design relies on a single ingestion loop and a
/// single maturation loop: ingestion only creates records, maturation only
/// mutates and deletes them, and a record is not visible to `scan` until its
/// proof write completes.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Open the store, creating the backing directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, id: &RecordId, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.file_name(id))
    }

    /// Write (or overwrite) one artifact
    pub fn put(&self, id: &RecordId, kind: ArtifactKind, bytes: &[u8]) -> Result<(), StoreError> {
        fs::write(self.artifact_path(id, kind), bytes)?;
        Ok(())
    }

    /// Read one artifact
    pub fn get(&self, id: &RecordId, kind: ArtifactKind) -> Result<Vec<u8>, StoreError> {
        match fs::read(self.artifact_path(id, kind)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(kind.file_name(id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, id: &RecordId, kind: ArtifactKind) -> bool {
        self.artifact_path(id, kind).exists()
    }

    /// Remove all three artifacts, best-effort. A partial delete leaves a
    /// record that will simply be reprocessed next cycle.
    pub fn delete(&self, id: &RecordId) {
        for kind in ArtifactKind::ALL {
            if let Err(e) = fs::remove_file(self.artifact_path(id, kind)) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(
                        record_id = %id,
                        artifact = kind.file_name(id),
                        error = %e,
                        "failed to remove artifact"
                    );
                }
            }
        }
    }

    /// Enumerate record identifiers by listing proof artifacts. Entries whose
    /// name does not decode to a 32-byte id are skipped, never an error.
    pub fn scan(&self) -> Result<Vec<RecordId>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(stem) = name
                .strip_prefix(PREFIX_PROOF)
                .and_then(|rest| rest.strip_suffix(SUFFIX_PROOF))
            else {
                continue;
            };
            match RecordId::from_hex(stem) {
                Ok(id) => ids.push(id),
                Err(_) => {
                    tracing::debug!(file = name, "skipping malformed proof file name");
                }
            }
        }
        Ok(ids)
    }
}
