//! Authenticated public-key box between this node's long-term identity and
//! each peer's published key, and the cache that memoizes one per peer.
//!
//! Static-static X25519 Diffie-Hellman feeds HKDF-SHA256 to derive an
//! AES-256-GCM key; every ciphertext is `nonce (12B) || AEAD ciphertext`,
//! a self-describing frame with no extra envelope. There is no ephemeral
//! ratchet — forward-secret re-keying is an explicit non-goal here.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const HKDF_INFO: &[u8] = b"wireline-session-v1";

/// This node's long-term X25519 keypair.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
}

impl Identity {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_base64(&self) -> String {
        B64.encode(self.public.as_bytes())
    }
}

/// An established authenticated channel to one peer.
pub struct Session {
    cipher: Aes256Gcm,
}

impl Session {
    fn new(shared_key: [u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&shared_key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt `plaintext`, returning `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        // A random 96-bit nonce has negligible collision probability for the
        // volume of messages a single chat session will ever exchange.
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-256-GCM encryption of a bounded plaintext cannot fail");

        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&ciphertext);
        framed
    }

    /// Decrypt a `nonce || ciphertext` frame produced by `encrypt`.
    pub fn decrypt(&self, framed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if framed.len() < NONCE_LEN {
            return Err(CryptoError::ShortCiphertext);
        }
        let (nonce_bytes, ciphertext) = framed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

fn parse_peer_public_key(encoded: &str) -> Result<PublicKey, CryptoError> {
    let bytes = B64
        .decode(encoded)
        .map_err(|_| CryptoError::InvalidEncoding)?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength)?;
    Ok(PublicKey::from(arr))
}

fn derive_session(secret: &StaticSecret, peer_public: &PublicKey) -> Session {
    let shared = secret.diffie_hellman(peer_public);
    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .expect("32-byte output is within HKDF-SHA256's expand limit");
    Session::new(key)
}

/// Owns the local identity and lazily-built, peer-keyed sessions.
pub struct SessionCache {
    identity: Identity,
    sessions: HashMap<String, Session>,
}

impl SessionCache {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            sessions: HashMap::new(),
        }
    }

    pub fn local_public_base64(&self) -> String {
        self.identity.public_base64()
    }

    /// Parse `peer_public_key_b64` and build (or reuse) the session for
    /// `peer_id`. Returns an error, and builds nothing, if the key doesn't
    /// decode to a 32-byte Curve25519 point.
    pub fn get_or_build(
        &mut self,
        peer_id: &str,
        peer_public_key_b64: &str,
    ) -> Result<(), CryptoError> {
        if self.sessions.contains_key(peer_id) {
            return Ok(());
        }
        let peer_public = parse_peer_public_key(peer_public_key_b64)?;
        let session = derive_session(&self.identity.secret, &peer_public);
        self.sessions.insert(peer_id.to_string(), session);
        Ok(())
    }

    pub fn has_session(&self, peer_id: &str) -> bool {
        self.sessions.contains_key(peer_id)
    }

    pub fn encrypt_for(&self, peer_id: &str, plaintext: &[u8]) -> Option<Vec<u8>> {
        self.sessions.get(peer_id).map(|s| s.encrypt(plaintext))
    }

    pub fn decrypt_from(&self, peer_id: &str, framed: &[u8]) -> Option<Result<Vec<u8>, CryptoError>> {
        self.sessions.get(peer_id).map(|s| s.decrypt(framed))
    }

    pub fn drop_session(&mut self, peer_id: &str) {
        self.sessions.remove(peer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_static_session_round_trips() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let alice_session = derive_session(&alice.secret, &bob.public);
        let bob_session = derive_session(&bob.secret, &alice.public);

        let ciphertext = alice_session.encrypt(b"hello from alice");
        let plaintext = bob_session.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello from alice");
    }

    #[test]
    fn wrong_peer_key_produces_different_session_and_fails_to_decrypt() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let mallory = Identity::generate();

        let alice_to_bob = derive_session(&alice.secret, &bob.public);
        let bob_using_mallory = derive_session(&bob.secret, &mallory.public);

        let ciphertext = alice_to_bob.encrypt(b"secret");
        assert!(bob_using_mallory.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn invalid_base64_key_is_rejected() {
        let mut cache = SessionCache::new(Identity::generate());
        let err = cache.get_or_build("peer-1", "not-valid-base64!!").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEncoding));
        assert!(!cache.has_session("peer-1"));
    }

    #[test]
    fn wrong_length_key_is_rejected() {
        let mut cache = SessionCache::new(Identity::generate());
        let short = B64.encode([0u8; 16]);
        let err = cache.get_or_build("peer-1", &short).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength));
    }

    #[test]
    fn cache_memoizes_session_per_peer() {
        let mut cache = SessionCache::new(Identity::generate());
        let peer = Identity::generate();
        let key_b64 = B64.encode(peer.public.as_bytes());

        cache.get_or_build("peer-1", &key_b64).unwrap();
        assert!(cache.has_session("peer-1"));
        // Calling again is a no-op, not an error, and doesn't rebuild.
        cache.get_or_build("peer-1", &key_b64).unwrap();

        cache.drop_session("peer-1");
        assert!(!cache.has_session("peer-1"));
    }

    #[test]
    fn short_ciphertext_is_rejected() {
        let mut cache = SessionCache::new(Identity::generate());
        let peer = Identity::generate();
        let key_b64 = B64.encode(peer.public.as_bytes());
        cache.get_or_build("peer-1", &key_b64).unwrap();

        let result = cache.decrypt_from("peer-1", &[1, 2, 3]).unwrap();
        assert!(matches!(result, Err(CryptoError::ShortCiphertext)));
    }
}
