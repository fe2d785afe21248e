//! Live channel client
//!
//! One WebSocket per signed-in identity. Pushed frames are decoded into
//! [`ServerEvent`]s; outgoing [`ClientEvent`]s are queued on a channel and
//! written by a dedicated task.

use crate::error::{ClientError, Result};
use futures::{SinkExt, StreamExt};
use quickchat_common::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};
use url::Url;

pub type EventStream = mpsc::UnboundedReceiver<ServerEvent>;
pub type OutgoingSender = mpsc::UnboundedSender<ClientEvent>;

/// Build the live endpoint URL for `identity` from the server base URL.
pub fn ws_url(server_url: &str, identity: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Live(format!("cannot use {} as live endpoint", server_url)))?;
    url.set_path("/ws");
    url.query_pairs_mut().clear().append_pair("userId", identity);
    Ok(url)
}

pub struct LiveChannel {
    pub events: EventStream,
    pub outgoing: OutgoingSender,
}

impl LiveChannel {
    /// Connect and register `identity` with the hub.
    pub async fn connect(server_url: &str, identity: &str) -> Result<Self> {
        let url = ws_url(server_url, identity)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Live(e.to_string()))?;
        info!("[Live] Connected to {} as {}", url, identity);

        let (mut write, mut read) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientEvent>();

        tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                let frame = match event.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("[Live] Failed to encode outgoing event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(WsMessage::Text(frame.into())).await {
                    warn!("[Live] Send failed, closing writer: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match ServerEvent::from_frame(text.as_str()) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!("[Live] Ignoring malformed frame: {}", e),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("[Live] Connection error: {}", e);
                        break;
                    }
                }
            }
            info!("[Live] Connection closed");
        });

        Ok(Self {
            events: event_rx,
            outgoing: out_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url() {
        assert_eq!(
            ws_url("http://localhost:5000", "alice").unwrap().as_str(),
            "ws://localhost:5000/ws?userId=alice"
        );
        assert_eq!(
            ws_url("https://chat.example.com/app", "bob smith").unwrap().as_str(),
            "wss://chat.example.com/ws?userId=bob+smith"
        );
    }
}
