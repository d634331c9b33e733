//! Keepalive sweep, stale-peer eviction, and periodic bootstrap
//! re-registration.
//!
//! One task runs both cadences off a single ticking interval rather than
//! two independent timers, since the keepalive period is the finer of the
//! two and the re-registration countdown is just a multiple of it.

use std::sync::Arc;

use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::bootstrap::{self, SelfDescriptor};
use crate::collaborator::NodeEvent;
use crate::dispatcher::{send_plaintext, SharedState};
use crate::peer::UpsertOutcome;
use crate::wire::PlaintextMessage;

/// Upper bound on how long a single loop iteration waits on the next tick
/// before re-checking `running` — keeps shutdown responsive even when
/// `keepalive_interval` is long.
const SHUTDOWN_POLL: std::time::Duration = std::time::Duration::from_secs(1);

/// Run the presence/keepalive loop until `running` is cleared.
///
/// Each tick: ping every known peer, re-broadcast our own presence to all
/// of them, sweep for and evict stale ones, and every
/// `reregister_every_n_ticks` ticks, re-register with the configured
/// bootstrap directories and merge any newly-learned peers.
pub async fn run_keepalive_loop(
    state: Arc<SharedState>,
    running: Arc<std::sync::atomic::AtomicBool>,
    keepalive_interval: std::time::Duration,
    liveness_ttl: std::time::Duration,
    bootstrap_urls: Vec<String>,
    bootstrap_reregister_interval: std::time::Duration,
) {
    let mut ticker = interval(keepalive_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reregister_every_n_ticks =
        (bootstrap_reregister_interval.as_secs() / keepalive_interval.as_secs().max(1)).max(1);
    let http = reqwest::Client::new();
    let mut ticks: u64 = 0;

    while running.load(std::sync::atomic::Ordering::SeqCst) {
        if timeout(SHUTDOWN_POLL, ticker.tick()).await.is_err() {
            continue; // re-check `running`; the interval's deadline is unaffected
        }
        ticks += 1;

        ping_all_peers(&state).await;
        broadcast_presence(&state).await;

        let evicted = state.peers.evict_stale(liveness_ttl);
        if !evicted.is_empty() {
            let mut sessions = state.sessions.lock().await;
            for peer in &evicted {
                sessions.drop_session(&peer.user_id);
            }
            drop(sessions);
            for peer in evicted {
                tracing::debug!(user_id = %peer.user_id, "peer evicted after liveness TTL expired");
                let _ = state
                    .events
                    .send(NodeEvent::PeerOffline { username: peer.display_name })
                    .await;
            }
        }

        if !bootstrap_urls.is_empty() && ticks % reregister_every_n_ticks == 0 {
            reregister(&state, &http, &bootstrap_urls).await;
        }
    }

    broadcast_offline(&state).await;
}

async fn ping_all_peers(state: &SharedState) {
    let ping = PlaintextMessage::Ping {
        user_id: state.self_user_id.clone(),
    };
    for (_, addr) in state.peers.snapshot_addrs() {
        send_plaintext(state, &ping, addr).await;
    }
}

/// Re-announce ourselves to every known peer. Refreshes remote tables and
/// doubles as a secondary liveness signal alongside the ping sweep.
async fn broadcast_presence(state: &SharedState) {
    let presence = PlaintextMessage::Presence {
        user_id: state.self_user_id.clone(),
        username: state.display_name(),
        status: crate::wire::PresenceStatus::Online,
        pubkey: state.sessions.lock().await.local_public_base64(),
    };
    for (_, addr) in state.peers.snapshot_addrs() {
        send_plaintext(state, &presence, addr).await;
    }
}

async fn reregister(state: &SharedState, http: &reqwest::Client, urls: &[String]) {
    let descriptor = SelfDescriptor {
        user_id: state.self_user_id.clone(),
        username: state.display_name(),
        ip: state.public_addr.ip().to_string(),
        port: state.public_addr.port(),
        pubkey: state.sessions.lock().await.local_public_base64(),
    };

    let discovered = bootstrap::register(http, urls, &descriptor).await;
    for peer in discovered {
        let addr = match format!("{}:{}", peer.ip, peer.port).parse() {
            Ok(addr) => addr,
            Err(_) => {
                tracing::debug!(ip = %peer.ip, "bootstrap returned an unparseable address");
                continue;
            }
        };

        let outcome = state
            .peers
            .upsert_from_presence(&peer.user_id, &peer.username, addr, &peer.pubkey);

        if matches!(outcome, UpsertOutcome::New) {
            let mut sessions = state.sessions.lock().await;
            let _ = sessions.get_or_build(&peer.user_id, &peer.pubkey);
            drop(sessions);

            let presence = PlaintextMessage::Presence {
                user_id: state.self_user_id.clone(),
                username: state.display_name(),
                status: crate::wire::PresenceStatus::Online,
                pubkey: state.sessions.lock().await.local_public_base64(),
            };
            send_plaintext(state, &presence, addr).await;
        }
    }
}

async fn broadcast_offline(state: &SharedState) {
    let offline = PlaintextMessage::Presence {
        user_id: state.self_user_id.clone(),
        username: state.display_name(),
        status: crate::wire::PresenceStatus::Offline,
        pubkey: state.sessions.lock().await.local_public_base64(),
    };
    for (_, addr) in state.peers.snapshot_addrs() {
        send_plaintext(state, &offline, addr).await;
    }
}
