//! Inbound datagram classification and routing.
//!
//! The dispatcher owns the receive side of the shared UDP socket. Every
//! inbound datagram is classified by [`crate::wire::classify`]; plaintext
//! control messages are routed by variant, ciphertext is handed to the
//! session cache keyed by the sender's address (not by any claimed
//! identity in the payload — NATs rewrite addresses, so the datagram's
//! observed source is the only thing trusted for peer-table updates).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::collaborator::NodeEvent;
use crate::crypto::SessionCache;
use crate::error::DispatchError;
use crate::messaging::PendingQueue;
use crate::peer::{PeerTable, UpsertOutcome};
use crate::wire::{self, CipherPayload, Classified, PlaintextMessage, PresenceStatus, ReceiptStatus};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const RECV_BUF_SIZE: usize = 8192;

/// Shared, cloneable state the dispatcher and the presence engine both
/// operate on. Everything mutable here is internally synchronized.
pub struct SharedState {
    pub self_user_id: String,
    pub display_name: std::sync::Mutex<String>,
    pub socket: UdpSocket,
    pub public_addr: SocketAddr,
    pub peers: PeerTable,
    pub sessions: tokio::sync::Mutex<SessionCache>,
    pub pending: PendingQueue,
    pub events: tokio::sync::mpsc::Sender<NodeEvent>,
}

impl SharedState {
    pub fn display_name(&self) -> String {
        self.display_name.lock().expect("display name mutex poisoned").clone()
    }

    async fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event).await;
    }
}

/// Run the receive loop until `running` is cleared. Intended to be spawned
/// as its own task by the Node Supervisor; the 1-second recv timeout lets
/// it notice shutdown promptly without a separate cancellation channel.
pub async fn run_receive_loop(state: Arc<SharedState>, running: Arc<std::sync::atomic::AtomicBool>) {
    let mut buf = vec![0u8; RECV_BUF_SIZE];
    while running.load(std::sync::atomic::Ordering::SeqCst) {
        let received = timeout(RECV_TIMEOUT, state.socket.recv_from(&mut buf)).await;
        let (n, addr) = match received {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "UDP recv error");
                continue;
            }
            Err(_) => continue, // timeout: re-check `running`
        };
        handle_datagram(&state, &buf[..n], addr).await;
    }
}

async fn handle_datagram(state: &SharedState, bytes: &[u8], addr: SocketAddr) {
    match classify_checked(bytes) {
        Ok(Classified::Plaintext(msg)) => handle_plaintext(state, msg, addr).await,
        Ok(Classified::Ciphertext) => handle_ciphertext(state, bytes, addr).await,
        Err(e) => tracing::debug!(%addr, error = %e, "datagram rejected before dispatch"),
    }
}

/// Classify a datagram, rejecting oversized plaintext up front. Ciphertext
/// carries no size cap since it's bounded by the UDP MTU regardless.
fn classify_checked(bytes: &[u8]) -> Result<Classified, DispatchError> {
    let classified = wire::classify(bytes);
    if matches!(classified, Classified::Plaintext(_)) && bytes.len() > wire::MAX_CONTROL_DATAGRAM {
        return Err(DispatchError::TooLarge(wire::MAX_CONTROL_DATAGRAM));
    }
    Ok(classified)
}

async fn handle_plaintext(state: &SharedState, msg: PlaintextMessage, addr: SocketAddr) {
    match msg {
        PlaintextMessage::Presence {
            user_id,
            username,
            status,
            pubkey,
        } => handle_presence(state, user_id, username, status, pubkey, addr).await,
        PlaintextMessage::Ping { .. } => {
            send_plaintext(state, &PlaintextMessage::Pong, addr).await;
        }
        PlaintextMessage::Pong => {
            // No state change. Pongs don't currently feed into liveness
            // tracking; pings and presence already do via touch-on-contact
            // paths elsewhere.
        }
    }
}

async fn handle_presence(
    state: &SharedState,
    user_id: String,
    username: String,
    status: PresenceStatus,
    pubkey: String,
    addr: SocketAddr,
) {
    if user_id == state.self_user_id {
        return;
    }

    match status {
        PresenceStatus::Offline => {
            if state.peers.mark_offline(&user_id) {
                state.sessions.lock().await.drop_session(&user_id);
                state.emit(NodeEvent::PeerOffline { username }).await;
            }
        }
        PresenceStatus::Online => {
            let outcome = state.peers.upsert_from_presence(&user_id, &username, addr, &pubkey);

            let mut sessions = state.sessions.lock().await;
            let session_built = sessions.get_or_build(&user_id, &pubkey).is_ok();
            drop(sessions);

            if !session_built {
                tracing::debug!(%user_id, "peer public key did not parse; no session built");
                return;
            }

            if matches!(outcome, UpsertOutcome::New | UpsertOutcome::AddressChanged) {
                let reply = PlaintextMessage::Presence {
                    user_id: state.self_user_id.clone(),
                    username: state.display_name(),
                    status: PresenceStatus::Online,
                    pubkey: state.sessions.lock().await.local_public_base64(),
                };
                send_plaintext(state, &reply, addr).await;
            }

            // Fire the "peer online" notification for both a brand-new
            // peer and one reappearing at a changed address; a `Refreshed`
            // peer was already known and already announced, so it alone
            // stays silent.
            if matches!(outcome, UpsertOutcome::New | UpsertOutcome::AddressChanged) {
                state.emit(NodeEvent::PeerOnline { username }).await;
            }
        }
    }
}

async fn handle_ciphertext(state: &SharedState, bytes: &[u8], addr: SocketAddr) {
    let Some(sender) = state.peers.find_by_addr(addr) else {
        tracing::debug!(error = %DispatchError::UnknownSender(addr), "dropping ciphertext");
        return;
    };

    let decrypted = {
        let sessions = state.sessions.lock().await;
        sessions.decrypt_from(&sender.user_id, bytes)
    };

    let Some(decrypted) = decrypted else {
        tracing::debug!(user_id = %sender.user_id, "no session for sender; dropping");
        return;
    };
    let plaintext = match decrypted {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(user_id = %sender.user_id, error = %e, "decryption failed; dropping");
            return;
        }
    };

    let payload = match wire::decode_cipher_payload(&plaintext) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "malformed cipher payload; dropping");
            return;
        }
    };

    match payload {
        CipherPayload::Message {
            message_id,
            from_username,
            content,
            to_user_id,
            ..
        } if to_user_id == state.self_user_id => {
            state
                .emit(NodeEvent::MessageReceived {
                    from: from_username,
                    content,
                    at: chrono::Utc::now(),
                })
                .await;

            let receipt = CipherPayload::Receipt {
                message_id,
                status: ReceiptStatus::Delivered,
            };
            if let Err(e) = send_cipher(state, &sender.user_id, &receipt, addr).await {
                tracing::warn!(user_id = %sender.user_id, error = %e, "failed to send delivery receipt");
            }
        }
        CipherPayload::Message { .. } => {
            tracing::debug!("message ciphertext not addressed to self; dropping");
        }
        CipherPayload::Receipt { message_id, .. } => {
            if state.pending.resolve(&message_id).is_some() {
                state
                    .emit(NodeEvent::MessageDelivered { message_id })
                    .await;
            }
        }
    }
}

pub async fn send_plaintext(state: &SharedState, msg: &PlaintextMessage, addr: SocketAddr) {
    let bytes = wire::encode_plaintext(msg);
    if let Err(e) = state.socket.send_to(&bytes, addr).await {
        tracing::warn!(%addr, error = %e, "failed to send plaintext datagram");
    }
}

/// Encrypt `payload` for `peer_id` and send it to `addr`. Returns
/// `Err(SendCipherError::NoSession)` if there's nothing to encrypt with and
/// `Err(SendCipherError::Io)` if the session exists but the socket write
/// itself failed, so a caller that needs to distinguish those can.
pub async fn send_cipher(
    state: &SharedState,
    peer_id: &str,
    payload: &CipherPayload,
    addr: SocketAddr,
) -> Result<(), crate::error::SendCipherError> {
    let plaintext = wire::encode_cipher_payload(payload);
    let framed = {
        let sessions = state.sessions.lock().await;
        sessions.encrypt_for(peer_id, &plaintext)
    };
    let Some(framed) = framed else {
        return Err(crate::error::SendCipherError::NoSession);
    };
    state.socket.send_to(&framed, addr).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Identity;
    use crate::peer::PeerTable;

    async fn state_pair() -> (Arc<SharedState>, Arc<SharedState>, tokio::sync::mpsc::Receiver<NodeEvent>, tokio::sync::mpsc::Receiver<NodeEvent>) {
        let a_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let a_addr = a_socket.local_addr().unwrap();
        let b_addr = b_socket.local_addr().unwrap();

        let (a_tx, a_rx) = tokio::sync::mpsc::channel(16);
        let (b_tx, b_rx) = tokio::sync::mpsc::channel(16);

        let a = Arc::new(SharedState {
            self_user_id: "alice".to_string(),
            display_name: std::sync::Mutex::new("alice".to_string()),
            socket: a_socket,
            public_addr: a_addr,
            peers: PeerTable::new(),
            sessions: tokio::sync::Mutex::new(SessionCache::new(Identity::generate())),
            pending: PendingQueue::new(),
            events: a_tx,
        });
        let b = Arc::new(SharedState {
            self_user_id: "bob".to_string(),
            display_name: std::sync::Mutex::new("bob".to_string()),
            socket: b_socket,
            public_addr: b_addr,
            peers: PeerTable::new(),
            sessions: tokio::sync::Mutex::new(SessionCache::new(Identity::generate())),
            pending: PendingQueue::new(),
            events: b_tx,
        });
        (a, b, a_rx, b_rx)
    }

    #[tokio::test]
    async fn presence_exchange_establishes_sessions_both_ways() {
        let (a, b, _a_rx, mut b_rx) = state_pair().await;
        let a_addr = a.public_addr;

        let presence = PlaintextMessage::Presence {
            user_id: a.self_user_id.clone(),
            username: "alice".to_string(),
            status: PresenceStatus::Online,
            pubkey: a.sessions.lock().await.local_public_base64(),
        };
        handle_plaintext(&b, presence, a_addr).await;

        assert!(b.peers.contains("alice"));
        assert!(b.sessions.lock().await.has_session("alice"));
        assert!(matches!(b_rx.recv().await, Some(NodeEvent::PeerOnline { .. })));
    }

    #[tokio::test]
    async fn ping_elicits_pong_without_state_change() {
        let (a, b, _a_rx, _b_rx) = state_pair().await;
        let ping = PlaintextMessage::Ping {
            user_id: "alice".to_string(),
        };
        handle_plaintext(&b, ping, a.public_addr).await;

        let mut buf = [0u8; 512];
        let (n, _) = a.socket.recv_from(&mut buf).await.unwrap();
        match wire::classify(&buf[..n]) {
            Classified::Plaintext(PlaintextMessage::Pong) => {}
            _ => panic!("expected pong"),
        }
    }

    #[tokio::test]
    async fn ciphertext_from_unknown_address_is_dropped_silently() {
        let (_a, b, _a_rx, mut b_rx) = state_pair().await;
        handle_ciphertext(&b, &[1, 2, 3, 4], "127.0.0.1:1".parse().unwrap()).await;
        assert!(b_rx.try_recv().is_err());
    }
}
