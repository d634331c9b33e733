//! The Node Supervisor: owns every piece of node state, brings the
//! node up (bind, STUN, bootstrap), spawns the dispatcher and keepalive
//! tasks, and exposes the one interface a collaborator is allowed to
//! touch: [`NodeHandle`].

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bootstrap::{self, SelfDescriptor};
use crate::collaborator::NodeEvent;
use crate::config::NodeConfig;
use crate::crypto::{Identity, SessionCache};
use crate::dispatcher::{self, SharedState};
use crate::error::SupervisorError;
use crate::messaging::{self, PendingMessage, PendingQueue};
use crate::peer::PeerView;
use crate::presence;
use crate::wire::CipherPayload;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_millis(200);

/// A fresh random 8-hex-character user-id, distinct from the UUIDs used
/// for per-message ids.
fn generate_user_id() -> String {
    let bytes: [u8; 4] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Handle to a running node. Cloning is cheap; every clone talks to the
/// same underlying state.
#[derive(Clone)]
pub struct NodeHandle {
    state: Arc<SharedState>,
    running: Arc<AtomicBool>,
}

impl NodeHandle {
    /// Update the display name advertised in future presence broadcasts.
    pub fn set_display_name(&self, name: impl Into<String>) {
        *self.state.display_name.lock().expect("display name mutex poisoned") = name.into();
    }

    pub fn self_user_id(&self) -> &str {
        &self.state.self_user_id
    }

    pub async fn local_public_key_base64(&self) -> String {
        self.state.sessions.lock().await.local_public_base64()
    }

    pub fn list_peers(&self) -> Vec<PeerView> {
        self.state.peers.snapshot()
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.len()
    }

    /// Resolve `to` by display name, encrypt and send a message, and queue
    /// it pending a delivery receipt. Fails if there's no known peer by
    /// that name or no established session with them yet.
    pub async fn send(&self, to: &str, content: &str) -> Result<String, crate::error::SendError> {
        let peer = self
            .state
            .peers
            .lookup_by_name(to)
            .ok_or_else(|| crate::error::SendError::NotFound(to.to_string()))?;

        if !{
            let sessions = self.state.sessions.lock().await;
            sessions.has_session(&peer.user_id)
        } {
            return Err(crate::error::SendError::NotFound(to.to_string()));
        }

        let message_id = Uuid::new_v4().to_string();
        let payload = CipherPayload::Message {
            message_id: message_id.clone(),
            from_user_id: self.state.self_user_id.clone(),
            from_username: self.state.display_name(),
            to_user_id: peer.user_id.clone(),
            to_username: peer.display_name.clone(),
            content: content.to_string(),
            timestamp: messaging::unix_timestamp(),
        };

        self.state.pending.push(PendingMessage {
            message_id: message_id.clone(),
            recipient_user_id: peer.user_id.clone(),
            recipient_display_name: peer.display_name.clone(),
            content: content.to_string(),
            created_at: chrono::Utc::now(),
        });

        // A transport failure here is logged and the message stays queued
        // for whenever the peer is next reachable — it is not un-queued,
        // just reported to the caller as a distinct outcome from "not
        // found" so the caller can tell the two apart.
        match dispatcher::send_cipher(&self.state, &peer.user_id, &payload, peer.addr).await {
            Ok(()) => Ok(message_id),
            Err(crate::error::SendCipherError::NoSession) => {
                Err(crate::error::SendError::NotFound(to.to_string()))
            }
            Err(crate::error::SendCipherError::Io(e)) => {
                tracing::warn!(to, error = %e, "transport error sending message; it stays queued");
                Err(crate::error::SendError::Transport(e))
            }
        }
    }

    /// Broadcast offline presence and stop the background tasks. Blocks
    /// briefly so the offline notice has a chance to reach peers before
    /// the socket goes away.
    pub async fn shutdown(self) {
        self.running.store(false, Ordering::SeqCst);
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    }
}

/// Bring a node fully online: bind the socket, discover the public
/// address via STUN, register with any configured bootstrap directories,
/// and spawn the dispatcher and keepalive tasks. Returns a handle for the
/// collaborator and the event stream it should drain.
pub async fn start(
    config: NodeConfig,
) -> Result<(NodeHandle, mpsc::Receiver<NodeEvent>), SupervisorError> {
    let bind_addr: SocketAddr = config
        .bind_addr
        .parse()
        .unwrap_or_else(|_| "0.0.0.0:0".parse().unwrap());

    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|source| SupervisorError::BindFailed { addr: bind_addr, source })?;

    let local_addr = socket.local_addr().unwrap_or(bind_addr);

    let public_addr = match crate::stun::discover(&socket, &config.stun_servers, config.stun_max_retries).await {
        Ok((ip, port)) => SocketAddr::new(IpAddr::V4(ip), port),
        Err(e) => {
            tracing::warn!(error = %e, "STUN discovery failed entirely; using local bind address");
            local_addr
        }
    };

    let self_user_id = generate_user_id();
    let identity = Identity::generate();
    let sessions = tokio::sync::Mutex::new(SessionCache::new(identity));

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let state = Arc::new(SharedState {
        self_user_id: self_user_id.clone(),
        display_name: std::sync::Mutex::new(config.display_name.clone()),
        socket,
        public_addr,
        peers: crate::peer::PeerTable::new(),
        sessions,
        pending: PendingQueue::new(),
        events: events_tx,
    });

    if !config.bootstrap_urls.is_empty() {
        let http = reqwest::Client::new();
        let descriptor = SelfDescriptor {
            user_id: state.self_user_id.clone(),
            username: state.display_name(),
            ip: public_addr.ip().to_string(),
            port: public_addr.port(),
            pubkey: state.sessions.lock().await.local_public_base64(),
        };
        let discovered = bootstrap::register(&http, &config.bootstrap_urls, &descriptor).await;
        tracing::info!(count = discovered.len(), "bootstrap returned known peers");
        for peer in discovered {
            if let Ok(addr) = format!("{}:{}", peer.ip, peer.port).parse::<SocketAddr>() {
                state
                    .peers
                    .upsert_from_presence(&peer.user_id, &peer.username, addr, &peer.pubkey);
                let mut sessions = state.sessions.lock().await;
                let _ = sessions.get_or_build(&peer.user_id, &peer.pubkey);
                drop(sessions);
                let presence = crate::wire::PlaintextMessage::Presence {
                    user_id: state.self_user_id.clone(),
                    username: state.display_name(),
                    status: crate::wire::PresenceStatus::Online,
                    pubkey: state.sessions.lock().await.local_public_base64(),
                };
                dispatcher::send_plaintext(&state, &presence, addr).await;
            }
        }
    }

    let running = Arc::new(AtomicBool::new(true));

    tokio::spawn(dispatcher::run_receive_loop(state.clone(), running.clone()));
    tokio::spawn(presence::run_keepalive_loop(
        state.clone(),
        running.clone(),
        config.keepalive_interval(),
        config.liveness_ttl(),
        config.bootstrap_urls.clone(),
        config.bootstrap_reregister_interval(),
    ));

    tracing::info!(%self_user_id, %public_addr, "node online");

    Ok((NodeHandle { state, running }, events_rx))
}
