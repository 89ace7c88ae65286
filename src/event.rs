//! Pub/sub event model
//!
//! Events follow the NIP-01 shape: a hex id over a canonical serialization,
//! an x-only public key, unix timestamp, kind, string-array tags, content
//! and a schnorr signature.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AttestorError, AttestorResult};

/// Event kind carrying a matured attestation proof
pub const KIND_ATTESTATION: u16 = 1040;

/// A signed pub/sub event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

/// An event that has not been assigned an id or signature yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl Event {
    /// Decode the event id into the 32-byte digest it represents
    pub fn id_bytes(&self) -> AttestorResult<[u8; 32]> {
        decode_id(&self.id)
    }

    /// First value of the first tag named `name`
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }
}

/// Decode a 64-hex-character event id
pub fn decode_id(id: &str) -> AttestorResult<[u8; 32]> {
    if id.len() != 64 {
        return Err(AttestorError::InvalidEvent(format!(
            "event id must be 64 hex chars, got {}",
            id.len()
        )));
    }
    let bytes = hex::decode(id)
        .map_err(|e| AttestorError::InvalidEvent(format!("event id is not hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| AttestorError::InvalidEvent("event id must decode to 32 bytes".into()))
}

/// Compute the event id: sha256 over the canonical commitment array
pub fn compute_id(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> AttestorResult<[u8; 32]> {
    let commitment = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let serialized = serde_json::to_string(&commitment)
        .map_err(|e| AttestorError::InvalidEvent(format!("failed to serialize commitment: {e}")))?;
    Ok(Sha256::digest(serialized.as_bytes()).into())
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: hex::encode([0xabu8; 32]),
            pubkey: hex::encode([0x11u8; 32]),
            created_at: 1_700_000_000,
            kind: 1,
            tags: vec![vec!["t".into(), "prediction".into()]],
            content: "will it rain tomorrow?".into(),
            sig: hex::encode([0u8; 64]),
        }
    }

    #[test]
    fn test_id_bytes_roundtrip() {
        let event = sample_event();
        assert_eq!(event.id_bytes().unwrap(), [0xabu8; 32]);
    }

    #[test]
    fn test_decode_id_rejects_short() {
        assert!(decode_id("abcd").is_err());
    }

    #[test]
    fn test_decode_id_rejects_non_hex() {
        let id = "zz".repeat(32);
        assert!(decode_id(&id).is_err());
    }

    #[test]
    fn test_tag_value() {
        let event = sample_event();
        assert_eq!(event.tag_value("t"), Some("prediction"));
        assert_eq!(event.tag_value("e"), None);
    }

    #[test]
    fn test_compute_id_deterministic() {
        let tags = vec![vec!["t".to_string(), "prediction".to_string()]];
        let a = compute_id("aa", 1, 1, &tags, "hello").unwrap();
        let b = compute_id("aa", 1, 1, &tags, "hello").unwrap();
        assert_eq!(a, b);

        let c = compute_id("aa", 1, 1, &tags, "hello!").unwrap();
        assert_ne!(a, c);

        let d = compute_id("aa", 2, 1, &tags, "hello").unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn test_event_json_roundtrip() {
        let event = sample_event();
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
