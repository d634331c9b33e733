//! Rendezvous registration against one or more HTTP bootstrap directories.
//!
//! The server side of this is explicitly out of scope; this client
//! is a thin, stateless HTTP POST per configured URL, logging and moving
//! on for any URL that fails rather than aborting the whole registration
//! pass.

use serde::{Deserialize, Serialize};

use crate::error::BootstrapError;

#[derive(Debug, Clone, Serialize)]
pub struct SelfDescriptor {
    pub user_id: String,
    pub username: String,
    pub ip: String,
    pub port: u16,
    pub pubkey: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerDescriptor {
    pub user_id: String,
    pub username: String,
    pub ip: String,
    pub port: u16,
    pub pubkey: String,
}

#[derive(Debug, Deserialize)]
struct BootstrapResponse {
    peers: Vec<PeerDescriptor>,
}

/// Register with every URL in `urls`, merging peer lists from whichever
/// respond with 200. A URL that errors or returns a non-200 status is
/// logged at `warn!` and simply contributes no peers; it never aborts
/// the others.
pub async fn register(
    client: &reqwest::Client,
    urls: &[String],
    descriptor: &SelfDescriptor,
) -> Vec<PeerDescriptor> {
    let mut peers = Vec::new();
    for url in urls {
        match register_one(client, url, descriptor).await {
            Ok(mut fetched) => {
                fetched.retain(|p| p.user_id != descriptor.user_id);
                peers.append(&mut fetched);
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "bootstrap registration failed");
            }
        }
    }
    peers
}

async fn register_one(
    client: &reqwest::Client,
    url: &str,
    descriptor: &SelfDescriptor,
) -> Result<Vec<PeerDescriptor>, BootstrapError> {
    let response = client
        .post(url)
        .json(descriptor)
        .send()
        .await
        .map_err(|source| BootstrapError::Transport {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(BootstrapError::BadStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let body: BootstrapResponse =
        response
            .json()
            .await
            .map_err(|source| BootstrapError::Transport {
                url: url.to_string(),
                source,
            })?;

    Ok(body.peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_descriptor_serializes_to_documented_shape() {
        let descriptor = SelfDescriptor {
            user_id: "abcd1234".to_string(),
            username: "alice".to_string(),
            ip: "203.0.113.7".to_string(),
            port: 4001,
            pubkey: "base64==".to_string(),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["user_id"], "abcd1234");
        assert_eq!(value["port"], 4001);
    }

    #[test]
    fn bootstrap_response_parses_peer_list() {
        let body = r#"{"peers":[{"user_id":"u2","username":"bob","ip":"127.0.0.1","port":5,"pubkey":"k"}]}"#;
        let parsed: BootstrapResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.peers.len(), 1);
        assert_eq!(parsed.peers[0].username, "bob");
    }

    #[tokio::test]
    async fn unreachable_url_yields_no_peers_and_does_not_panic() {
        let client = reqwest::Client::new();
        let descriptor = SelfDescriptor {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            ip: "127.0.0.1".to_string(),
            port: 1,
            pubkey: "k".to_string(),
        };
        // Port 0 never accepts connections; this exercises the error path.
        let peers = register(&client, &["http://127.0.0.1:0/bootstrap".to_string()], &descriptor).await;
        assert!(peers.is_empty());
    }
}
