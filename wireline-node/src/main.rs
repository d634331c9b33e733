mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wireline_core::NodeEvent;

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("WIRELINE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("wireline_node=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = config::Cli::parse();
    let node_config = config::resolve(&cli);

    tracing::info!(bind_addr = %node_config.bind_addr, display_name = %node_config.display_name, "starting node");

    let (handle, mut events) = wireline_core::start(node_config).await?;
    tracing::info!(user_id = handle.self_user_id(), "node online");

    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                NodeEvent::PeerOnline { username } => tracing::info!(%username, "peer online"),
                NodeEvent::PeerOffline { username } => tracing::info!(%username, "peer offline"),
                NodeEvent::MessageReceived { from, content, at } => {
                    println!("[{at}] {from}: {content}");
                }
                NodeEvent::MessageDelivered { message_id } => {
                    tracing::debug!(%message_id, "message delivered");
                }
            }
        }
    });

    run_command_loop(&handle).await;

    handle.shutdown().await;
    event_task.abort();
    Ok(())
}

/// A deliberately thin stdin loop: `/peers`, `/send <name> <text>`, `/quit`.
/// The interactive collaborator proper — history, autocomplete, a TUI — is
/// out of scope here; this exists only to exercise `NodeHandle` by hand.
async fn run_command_loop(handle: &wireline_core::NodeHandle) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "/quit" {
            break;
        } else if line == "/peers" {
            for peer in handle.list_peers() {
                println!("{} (last seen {}s ago)", peer.display_name, peer.seconds_since_last_seen);
            }
        } else if let Some(rest) = line.strip_prefix("/send ") {
            let mut parts = rest.splitn(2, ' ');
            let (Some(to), Some(content)) = (parts.next(), parts.next()) else {
                println!("usage: /send <name> <message>");
                continue;
            };
            match handle.send(to, content).await {
                Ok(message_id) => println!("queued {message_id}"),
                Err(e) => println!("send failed: {e}"),
            }
        } else {
            println!("unknown command: {line}");
        }
    }
}
