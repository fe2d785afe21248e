//! Live event channel over WebSocket
//!
//! `GET /ws?userId=<identity>` upgrades, registers the connection with the
//! hub, then pumps hub events out and client frames in until either side
//! goes away.

use crate::config::AppState;
use crate::error::Error;
use crate::hub::LiveHub;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use quickchat_common::ClientEvent;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// GET /ws
pub async fn live_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(identity) = params
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
    else {
        return Error::BadRequest("userId query parameter is required".to_string())
            .into_response();
    };

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, identity, hub))
}

async fn handle_socket(socket: WebSocket, identity: String, hub: LiveHub) {
    let (mut sink, mut stream) = socket.split();
    let (connection_id, mut events) = hub.connect(&identity);

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("[Live] Failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_hub = hub.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                WsMessage::Text(text) => handle_client_frame(&recv_hub, &recv_identity, text.as_str()),
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.disconnect(&identity, connection_id);
    info!("[Live] Connection {} for {} closed", connection_id, identity);
}

/// Apply one client frame on behalf of the connection owned by `identity`.
pub fn handle_client_frame(hub: &LiveHub, identity: &str, frame: &str) {
    let event = match ClientEvent::from_frame(frame) {
        Ok(event) => event,
        Err(e) => {
            debug!("[Live] Ignoring frame from {}: {}", identity, e);
            return;
        }
    };

    match event {
        ClientEvent::Typing { to } => {
            hub.typing(identity, &to);
        }
        ClientEvent::MarkSeen { from, to } => {
            if from != identity {
                warn!(
                    "[Live] {} sent markSeen on behalf of {}, ignoring",
                    identity, from
                );
                return;
            }
            hub.mark_seen(identity, &to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickchat_common::ServerEvent;

    #[test]
    fn test_client_frames_route_through_hub() {
        let hub = LiveHub::new();
        let (_, _alice_rx) = hub.connect("alice");
        let (_, mut bob_rx) = hub.connect("bob");
        while bob_rx.try_recv().is_ok() {}

        handle_client_frame(&hub, "alice", r#"{"event":"typing","data":{"to":"bob"}}"#);
        handle_client_frame(
            &hub,
            "alice",
            r#"{"event":"markSeen","data":{"from":"alice","to":"bob"}}"#,
        );

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::Typing {
                from: "alice".into()
            }
        );
        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::SeenUpdate {
                user_id: "alice".into()
            }
        );
    }

    #[test]
    fn test_spoofed_and_garbage_frames_ignored() {
        let hub = LiveHub::new();
        let (_, mut bob_rx) = hub.connect("bob");
        while bob_rx.try_recv().is_ok() {}

        handle_client_frame(
            &hub,
            "mallory",
            r#"{"event":"markSeen","data":{"from":"alice","to":"bob"}}"#,
        );
        handle_client_frame(&hub, "mallory", "not json");

        assert!(bob_rx.try_recv().is_err());
    }
}
