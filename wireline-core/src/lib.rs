//! Peer-to-peer transport and session layer for an Internet-facing
//! encrypted messenger: STUN-based NAT traversal, HTTP bootstrap
//! rendezvous, a static-static X25519/AES-256-GCM message box, presence
//! and keepalive, and a best-effort send/receipt pipeline.
//!
//! The crate exposes one entry point, [`supervisor::start`], and one
//! handle type, [`supervisor::NodeHandle`]. Everything else is internal
//! plumbing the supervisor wires together; a collaborator (an interactive
//! CLI, a bot, a test) only ever touches the handle and the event stream
//! it returns.

pub mod bootstrap;
pub mod collaborator;
pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod messaging;
pub mod peer;
pub mod presence;
pub mod stun;
pub mod supervisor;
pub mod wire;

pub use collaborator::NodeEvent;
pub use config::NodeConfig;
pub use error::{
    BootstrapError, CryptoError, DispatchError, SendError, StunError, SupervisorError,
};
pub use supervisor::{start, NodeHandle};
