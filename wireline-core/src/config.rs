//! Node tuning parameters.
//!
//! This struct carries no peer/session/message state — only the knobs a
//! deployment might want to override (STUN servers, bootstrap URLs, the
//! keepalive cadence, the liveness TTL). Persisting *this* across runs is
//! ambient configuration plumbing; persisting any runtime state is out
//! of scope — no state persists across a restart.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_STUN_SERVERS: &[&str] = &[
    "stun.l.google.com:19302",
    "stun1.l.google.com:19302",
    "stun2.l.google.com:19302",
];

pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
pub const DEFAULT_LIVENESS_TTL_SECS: u64 = 300;
pub const DEFAULT_BOOTSTRAP_REREGISTER_SECS: u64 = 300;
pub const DEFAULT_STUN_MAX_RETRIES: u32 = 3;

/// Tunable parameters for one node. Serializable so it can round-trip
/// through a TOML file the way `freeq-tui::config::Config` does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub display_name: String,
    pub bind_addr: String,
    pub stun_servers: Vec<String>,
    pub bootstrap_urls: Vec<String>,
    pub keepalive_interval_secs: u64,
    pub liveness_ttl_secs: u64,
    pub bootstrap_reregister_secs: u64,
    pub stun_max_retries: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            display_name: "anonymous".to_string(),
            bind_addr: "0.0.0.0:0".to_string(),
            stun_servers: DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            bootstrap_urls: Vec::new(),
            keepalive_interval_secs: DEFAULT_KEEPALIVE_SECS,
            liveness_ttl_secs: DEFAULT_LIVENESS_TTL_SECS,
            bootstrap_reregister_secs: DEFAULT_BOOTSTRAP_REREGISTER_SECS,
            stun_max_retries: DEFAULT_STUN_MAX_RETRIES,
        }
    }
}

impl NodeConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn liveness_ttl(&self) -> Duration {
        Duration::from_secs(self.liveness_ttl_secs)
    }

    pub fn bootstrap_reregister_interval(&self) -> Duration {
        Duration::from_secs(self.bootstrap_reregister_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_cadences() {
        let config = NodeConfig::default();
        assert_eq!(config.keepalive_interval().as_secs(), 30);
        assert_eq!(config.liveness_ttl().as_secs(), 300);
    }

    #[test]
    fn round_trips_through_json() {
        let config = NodeConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let restored: NodeConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.display_name, config.display_name);
        assert_eq!(restored.stun_servers, config.stun_servers);
    }
}
