//! End-to-end: two clients against a real server over HTTP and WebSocket.

use quickchat_client::{ChatClient, ClientConfig};
use quickchat_common::SendMessageInput;
use quickchat_server::config::{AppState, ServerConfig};
use quickchat_server::router;
use quickchat_server::store::JsonMessageStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

async fn start_server(dir: &TempDir) -> String {
    let config = ServerConfig::with_base_dir(dir.path().join("server"));
    let store = JsonMessageStore::new(&config).await.unwrap();
    let app = router(AppState::new(config, Arc::new(store)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn sign_in(dir: &TempDir, server_url: &str, identity: &str) -> Arc<ChatClient> {
    let mut config = ClientConfig::with_base_dir(dir.path().join(identity));
    config.server_url = server_url.to_string();
    let (client, events) = ChatClient::connect(&config, identity, "en").await.unwrap();
    let client = Arc::new(client);
    let live = client.clone();
    tokio::spawn(async move { live.run_live(events).await });
    client
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_two_clients_exchange_messages() {
    let dir = TempDir::new().unwrap();
    let server_url = start_server(&dir).await;

    let alice = sign_in(&dir, &server_url, "alice").await;
    let bob = sign_in(&dir, &server_url, "bob").await;

    eventually("presence", || {
        alice.state().is_online("bob") && bob.state().is_online("alice")
    })
    .await;

    // Bob writes while Alice has no conversation open
    bob.open_conversation("alice").await;
    let sent = bob
        .send("alice", SendMessageInput::text("hi alice"))
        .await
        .unwrap();

    eventually("unseen count", || alice.state().unseen("bob") == 1).await;
    assert_eq!(
        alice.state().first_unread("bob").map(str::to_string),
        Some(sent.id.clone())
    );
    assert_eq!(bob.state().history("alice").len(), 1);

    // Opening marks Bob's message seen and tells Bob to refetch
    alice.open_conversation("bob").await;
    assert_eq!(alice.state().unseen("bob"), 0);
    assert_eq!(alice.state().history("bob").len(), 1);

    eventually("seen refetch", || {
        bob.state()
            .history("alice")
            .first()
            .map(|e| e.message.seen)
            .unwrap_or(false)
    })
    .await;

    // Reply shows up exactly once on both sides
    let reply = alice
        .send("bob", SendMessageInput::text("hi bob"))
        .await
        .unwrap();
    eventually("reply relayed", || bob.state().history("alice").len() == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let alice_ids: Vec<String> = alice
        .state()
        .history("bob")
        .iter()
        .map(|e| e.message.id.clone())
        .collect();
    assert_eq!(alice_ids, vec![sent.id.clone(), reply.id.clone()]);
    assert_eq!(bob.state().history("alice").len(), 2);
    assert_eq!(
        bob.state().last_message("alice").map(|m| m.id.clone()),
        Some(reply.id)
    );
}

#[tokio::test]
async fn test_typing_hint_reaches_peer() {
    let dir = TempDir::new().unwrap();
    let server_url = start_server(&dir).await;

    let alice = sign_in(&dir, &server_url, "alice").await;
    let bob = sign_in(&dir, &server_url, "bob").await;
    eventually("presence", || {
        alice.state().is_online("bob") && bob.state().is_online("alice")
    })
    .await;

    alice.notify_typing("bob");
    eventually("typing", || bob.state().is_typing("alice", Instant::now())).await;
}

#[tokio::test]
async fn test_offline_peer_catches_up_from_list() {
    let dir = TempDir::new().unwrap();
    let server_url = start_server(&dir).await;

    let alice = sign_in(&dir, &server_url, "alice").await;
    alice
        .send("carol", SendMessageInput::text("are you there?"))
        .await
        .unwrap();
    alice
        .send("carol", SendMessageInput::text("ping"))
        .await
        .unwrap();

    // Carol signs in afterwards; the initial list seeds her counters
    let carol = sign_in(&dir, &server_url, "carol").await;
    assert_eq!(carol.state().unseen("alice"), 2);
    assert_eq!(
        carol
            .state()
            .last_message("alice")
            .and_then(|m| m.text.clone())
            .as_deref(),
        Some("ping")
    );
}
