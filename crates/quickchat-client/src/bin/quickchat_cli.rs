use clap::Parser;
use quickchat_client::{translate, ChatClient, ClientConfig, ClientError};
use quickchat_common::SendMessageInput;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Terminal client for a QuickChat server.
#[derive(Parser)]
struct Cli {
    /// Identity to sign in as
    #[arg(short, long)]
    user: String,
    /// Preferred reading language
    #[arg(short, long, default_value = "en")]
    language: String,
    /// Conversation to open right away
    #[arg(short, long)]
    peer: Option<String>,
    /// Server base URL (defaults to QUICKCHAT_SERVER_URL)
    #[arg(long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let cli = Cli::parse();
    if !translate::is_supported(&cli.language) {
        anyhow::bail!(
            "unsupported language {:?}, expected one of {:?}",
            cli.language,
            translate::SUPPORTED_LANGUAGES
        );
    }

    let mut config = ClientConfig::default();
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    let (client, events) = ChatClient::connect(&config, &cli.user, &cli.language).await?;
    let client = Arc::new(client);

    let live = client.clone();
    tokio::spawn(async move { live.run_live(events).await });

    print_conversations(&client);
    if let Some(peer) = &cli.peer {
        client.open_conversation(peer).await;
        print_history(&client, peer);
    }

    println!("Commands: /open <peer>, /lang <code>, /list, /history, /quit. Anything else is sent.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/list", _) => {
                client.refresh_conversations().await?;
                print_conversations(&client);
            }
            ("/open", peer) if !peer.trim().is_empty() => {
                let peer = peer.trim();
                client.open_conversation(peer).await;
                print_history(&client, peer);
            }
            ("/lang", code) if translate::is_supported(code.trim()) => {
                client.set_language(code.trim());
            }
            ("/lang", code) => {
                println!(
                    "Unsupported language {:?}, expected one of {:?}",
                    code.trim(),
                    translate::SUPPORTED_LANGUAGES
                );
            }
            ("/history", _) => {
                client.settle_translations().await;
                let open = client.state().open_peer().map(str::to_string);
                match open {
                    Some(peer) => print_history(&client, &peer),
                    None => println!("No conversation open"),
                }
            }
            ("", _) => {}
            _ => {
                let open = client.state().open_peer().map(str::to_string);
                let Some(peer) = open else {
                    println!("Open a conversation first: /open <peer>");
                    continue;
                };
                match client.send(&peer, SendMessageInput::text(line)).await {
                    Ok(message) => info!("Sent {}", message.id),
                    Err(ClientError::Persistence { reason, unsent }) => {
                        warn!("Not sent ({}), draft kept: {:?}", reason, unsent.text);
                    }
                    Err(e) => warn!("Send failed: {}", e),
                }
            }
        }
    }

    client.close_conversation();
    Ok(())
}

fn print_conversations(client: &ChatClient) {
    let state = client.state();
    let mut peers: Vec<_> = state.cache_state().last_messages.keys().cloned().collect();
    peers.sort();
    for peer in peers {
        let preview = state
            .last_message(&peer)
            .and_then(|m| m.text.clone())
            .unwrap_or_else(|| "[image]".to_string());
        let online = if state.is_online(&peer) { "*" } else { " " };
        println!("{} {:<16} ({}) {}", online, peer, state.unseen(&peer), preview);
    }
}

fn print_history(client: &ChatClient, peer: &str) {
    let state = client.state();
    for entry in state.history(peer) {
        let marker = if entry.pending { "…" } else { " " };
        println!(
            "{} {:<12} {}",
            marker,
            entry.message.sender_id,
            entry.display_text().unwrap_or("[image]")
        );
    }
}
