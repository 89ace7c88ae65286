//! Signing keys for completion events

use secp256k1::{All, Keypair, Message, Secp256k1};

use crate::error::{AttestorError, AttestorResult};
use crate::event::{compute_id, Event, UnsignedEvent};

/// Schnorr keypair used to sign outgoing events
#[derive(Clone)]
pub struct Keys {
    secp: Secp256k1<All>,
    keypair: Keypair,
    pubkey_hex: String,
}

impl Keys {
    /// Parse a hex-encoded secret key
    pub fn parse(secret_hex: &str) -> AttestorResult<Self> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_str(&secp, secret_hex.trim())
            .map_err(|e| AttestorError::Config(format!("invalid secret key: {e}")))?;
        let (xonly, _parity) = keypair.x_only_public_key();
        let pubkey_hex = hex::encode(xonly.serialize());
        Ok(Self {
            secp,
            keypair,
            pubkey_hex,
        })
    }

    /// Hex-encoded x-only public key
    pub fn public_key(&self) -> &str {
        &self.pubkey_hex
    }

    /// Assign id and signature to an event
    pub fn sign(&self, event: UnsignedEvent) -> AttestorResult<Event> {
        let id = compute_id(
            &self.pubkey_hex,
            event.created_at,
            event.kind,
            &event.tags,
            &event.content,
        )?;
        let sig = self
            .secp
            .sign_schnorr_no_aux_rand(&Message::from_digest(id), &self.keypair);
        Ok(Event {
            id: hex::encode(id),
            pubkey: self.pubkey_hex.clone(),
            created_at: event.created_at,
            kind: event.kind,
            tags: event.tags,
            content: event.content,
            sig: hex::encode(sig.serialize()),
        })
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("pubkey", &self.pubkey_hex)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::schnorr::Signature;
    use secp256k1::XOnlyPublicKey;

    const TEST_SECRET: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    fn unsigned() -> UnsignedEvent {
        UnsignedEvent {
            created_at: 1_700_000_000,
            kind: 1040,
            tags: vec![vec!["p".into(), "aa".into()]],
            content: "proof".into(),
        }
    }

    #[test]
    fn test_parse_valid_secret() {
        let keys = Keys::parse(TEST_SECRET).unwrap();
        assert_eq!(keys.public_key().len(), 64);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Keys::parse("not-a-key").is_err());
        assert!(Keys::parse("").is_err());
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let keys = Keys::parse(&format!(" {TEST_SECRET}\n")).unwrap();
        assert_eq!(keys.public_key().len(), 64);
    }

    #[test]
    fn test_sign_sets_id_and_signature() {
        let keys = Keys::parse(TEST_SECRET).unwrap();
        let event = keys.sign(unsigned()).unwrap();

        assert_eq!(event.pubkey, keys.public_key());
        assert_eq!(event.id.len(), 64);
        assert_eq!(event.sig.len(), 128);

        let expected = compute_id(
            &event.pubkey,
            event.created_at,
            event.kind,
            &event.tags,
            &event.content,
        )
        .unwrap();
        assert_eq!(event.id, hex::encode(expected));
    }

    #[test]
    fn test_signature_verifies() {
        let keys = Keys::parse(TEST_SECRET).unwrap();
        let event = keys.sign(unsigned()).unwrap();

        let secp = Secp256k1::new();
        let pubkey =
            XOnlyPublicKey::from_slice(&hex::decode(&event.pubkey).unwrap()).unwrap();
        let sig = Signature::from_slice(&hex::decode(&event.sig).unwrap()).unwrap();
        let digest: [u8; 32] = hex::decode(&event.id).unwrap().try_into().unwrap();

        assert!(secp
            .verify_schnorr(&sig, &Message::from_digest(digest), &pubkey)
            .is_ok());
    }
}
