//! Typed errors for each fallible subsystem.
//!
//! Each subsystem gets its own `thiserror`-derived enum so call sites can
//! match on specific failure modes; the supervisor and binary edge collapse
//! these into `anyhow::Result` once there's nothing left to do but log and
//! continue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StunError {
    #[error("no STUN server responded")]
    NoResponse,
    #[error("response too short to contain XOR-MAPPED-ADDRESS")]
    ShortResponse,
    #[error("fallback IP-echo request failed: {0}")]
    FallbackFailed(String),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },
    #[error("{url} returned HTTP {status}")]
    BadStatus { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("peer public key is not valid base64")]
    InvalidEncoding,
    #[error("peer public key is not a 32-byte Curve25519 point")]
    InvalidKeyLength,
    #[error("ciphertext too short to contain a nonce")]
    ShortCiphertext,
    #[error("authenticated decryption failed")]
    DecryptFailed,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("datagram exceeds the {0}-byte control-message limit")]
    TooLarge(usize),
    #[error("no session for sender at {0}")]
    UnknownSender(std::net::SocketAddr),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    BindFailed {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("recipient '{0}' is not a known peer, or has no established session")]
    NotFound(String),
    #[error("transport error sending to peer: {0}")]
    Transport(std::io::Error),
}

/// Outcome of encrypting and sending one ciphertext datagram
/// (`dispatcher::send_cipher`), distinguishing "nothing to encrypt with"
/// from an actual socket write failure so callers that need to tell them
/// apart can.
#[derive(Debug, Error)]
pub enum SendCipherError {
    #[error("no session established for peer")]
    NoSession,
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}
