//! Persistent configuration for wireline-node.
//!
//! Config file lives at `~/.config/wireline/node.toml`. Precedence for
//! every field is CLI flag > config file > built-in default, matching the
//! merge layering `freeq-tui` uses for its own settings.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use wireline_core::NodeConfig;

#[derive(Parser, Debug)]
#[command(name = "wireline-node", about = "Run one wireline P2P messenger node")]
pub struct Cli {
    /// Display name advertised to peers.
    #[arg(long, env = "WIRELINE_DISPLAY_NAME")]
    pub display_name: Option<String>,

    /// Local UDP address to bind, e.g. 0.0.0.0:4001.
    #[arg(long, env = "WIRELINE_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// STUN server to use for public address discovery. Repeatable.
    #[arg(long = "stun-server")]
    pub stun_servers: Vec<String>,

    /// Bootstrap directory URL to register with. Repeatable.
    #[arg(long = "bootstrap-url")]
    pub bootstrap_urls: Vec<String>,

    /// Keepalive ping/presence cadence, in seconds.
    #[arg(long)]
    pub keepalive_secs: Option<u64>,

    /// Seconds of silence before a peer is considered offline.
    #[arg(long)]
    pub liveness_ttl_secs: Option<u64>,

    /// Use an alternate config file instead of the default location.
    #[arg(long)]
    pub config_path: Option<PathBuf>,
}

/// The subset of `NodeConfig` a user might want to persist across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub display_name: Option<String>,
    pub bind_addr: Option<String>,
    pub stun_servers: Option<Vec<String>>,
    pub bootstrap_urls: Option<Vec<String>>,
    pub keepalive_interval_secs: Option<u64>,
    pub liveness_ttl_secs: Option<u64>,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wireline")
        .join("node.toml")
}

impl FileConfig {
    pub fn load(path: &PathBuf) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "bad config file, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "can't read config file, using defaults");
                Self::default()
            }
        }
    }
}

/// Merge CLI flags over a loaded file config over `NodeConfig::default()`,
/// producing the config the supervisor actually runs with.
pub fn resolve(cli: &Cli) -> NodeConfig {
    let path = cli.config_path.clone().unwrap_or_else(default_config_path);
    let file = FileConfig::load(&path);
    let defaults = NodeConfig::default();

    NodeConfig {
        display_name: cli
            .display_name
            .clone()
            .or(file.display_name)
            .unwrap_or(defaults.display_name),
        bind_addr: cli.bind_addr.clone().or(file.bind_addr).unwrap_or(defaults.bind_addr),
        stun_servers: if !cli.stun_servers.is_empty() {
            cli.stun_servers.clone()
        } else {
            file.stun_servers.unwrap_or(defaults.stun_servers)
        },
        bootstrap_urls: if !cli.bootstrap_urls.is_empty() {
            cli.bootstrap_urls.clone()
        } else {
            file.bootstrap_urls.unwrap_or(defaults.bootstrap_urls)
        },
        keepalive_interval_secs: cli
            .keepalive_secs
            .or(file.keepalive_interval_secs)
            .unwrap_or(defaults.keepalive_interval_secs),
        liveness_ttl_secs: cli
            .liveness_ttl_secs
            .or(file.liveness_ttl_secs)
            .unwrap_or(defaults.liveness_ttl_secs),
        ..defaults
    }
}
