use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::domains::message::MessageContent;
use crate::error::{ChorusError, Result};

pub mod identity_store;

const ENVELOPE_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const KDF_INFO: &[u8] = b"chorus-bridge-e2e-v1";

#[derive(Clone)]
pub struct IdentityKeypair {
    private: StaticSecret,
    public: PublicKey,
}

impl IdentityKeypair {
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(private: StaticSecret) -> Self {
        let public = PublicKey::from(&private);
        Self { private, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.private.to_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    pub version: u8,
    pub sender_public_key: [u8; 32],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Seals message bodies for one counterparty. Both ends derive the same key
/// from their x25519 secret, the other side's public key and the topic.
pub struct ConversationCipher {
    own_public: [u8; 32],
    peer_public: [u8; 32],
    key: Key,
}

impl ConversationCipher {
    pub fn new(identity: &IdentityKeypair, peer_public: [u8; 32], topic: &str) -> Result<Self> {
        let shared = identity
            .private
            .diffie_hellman(&PublicKey::from(peer_public));
        let hk = Hkdf::<Sha256>::new(Some(topic.as_bytes()), shared.as_bytes());
        let mut okm = [0u8; 32];
        hk.expand(KDF_INFO, &mut okm)
            .map_err(|_| ChorusError::Runtime("HKDF expand failed".to_string()))?;
        Ok(Self {
            own_public: identity.public_bytes(),
            peer_public,
            key: Key::from_slice(&okm).to_owned(),
        })
    }

    /// `aad` binds the envelope to its frame (the message id).
    pub fn seal(&self, content: &MessageContent, aad: &[u8]) -> Result<SealedEnvelope> {
        let plaintext =
            serde_json::to_vec(content).map_err(|e| ChorusError::Serialization(e.to_string()))?;
        let cipher = ChaCha20Poly1305::new(&self.key);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &plaintext,
                    aad,
                },
            )
            .map_err(|_| ChorusError::Runtime("encrypt failed".to_string()))?;
        Ok(SealedEnvelope {
            version: ENVELOPE_VERSION,
            sender_public_key: self.own_public,
            nonce: nonce.into(),
            ciphertext,
        })
    }

    pub fn open(&self, envelope: &SealedEnvelope, aad: &[u8]) -> Result<MessageContent> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(ChorusError::Runtime(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        if envelope.sender_public_key != self.peer_public
            && envelope.sender_public_key != self.own_public
        {
            return Err(ChorusError::Runtime(
                "envelope sealed by an unknown key".to_string(),
            ));
        }
        let cipher = ChaCha20Poly1305::new(&self.key);
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&envelope.nonce),
                Payload {
                    msg: envelope.ciphertext.as_ref(),
                    aad,
                },
            )
            .map_err(|_| ChorusError::Runtime("decrypt failed".to_string()))?;
        serde_json::from_slice(&plaintext).map_err(|e| ChorusError::Serialization(e.to_string()))
    }
}
