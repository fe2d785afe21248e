//! Live hub
//!
//! Owns the presence registry together with the outbound sink of every open
//! connection. Each operation takes the lock once, mutates the registry,
//! and enqueues the resulting events before releasing it. Nothing in here
//! awaits, so two handlers can never interleave between a registry read and
//! the write that depends on it.

use crate::presence::{Outbound, PresenceRegistry};
use crate::{relay, seen, typing};
use parking_lot::Mutex;
use quickchat_common::{ConnectionId, Message, ServerEvent, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

#[derive(Default)]
struct HubState {
    registry: PresenceRegistry,
    sinks: HashMap<ConnectionId, EventSender>,
}

impl HubState {
    /// Enqueue events; returns how many frames were handed to a sink.
    fn dispatch(&self, outbound: Vec<Outbound>) -> usize {
        let mut delivered = 0;
        for item in outbound {
            match item {
                Outbound::To { connection, event } => {
                    if self.push(connection, event) {
                        delivered += 1;
                    }
                }
                Outbound::Broadcast(event) => {
                    for connection in self.sinks.keys() {
                        if self.push(*connection, event.clone()) {
                            delivered += 1;
                        }
                    }
                }
            }
        }
        delivered
    }

    fn push(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let Some(sink) = self.sinks.get(&connection) else {
            debug!("[Hub] No sink for {}, dropping {}", connection, event.name());
            return false;
        };
        let name = event.name();
        match sink.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!("[Hub] Sink for {} closed, dropping {}", connection, name);
                false
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct LiveHub {
    state: Arc<Mutex<HubState>>,
}

impl LiveHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection for `identity` and register it as its live session.
    pub fn connect(&self, identity: &str) -> (ConnectionId, EventReceiver) {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.state.lock();
        state.sinks.insert(connection_id, tx);
        let outbound = state.registry.register(identity, connection_id);
        state.dispatch(outbound);

        info!("[Hub] {} connected as {}", identity, connection_id);
        (connection_id, rx)
    }

    /// Close `connection_id`. The session is only dropped if it still belongs
    /// to this connection.
    pub fn disconnect(&self, identity: &str, connection_id: ConnectionId) {
        let mut state = self.state.lock();
        state.sinks.remove(&connection_id);
        let outbound = state.registry.unregister(identity, connection_id);
        state.dispatch(outbound);

        info!("[Hub] {} disconnected ({})", identity, connection_id);
    }

    /// Push a persisted message to its live parties.
    pub fn relay(&self, message: &Message) -> usize {
        let state = self.state.lock();
        let outbound = relay::relay_message(&state.registry, message);
        state.dispatch(outbound)
    }

    pub fn typing(&self, from: &str, to: &str) -> usize {
        let state = self.state.lock();
        let outbound = typing::notify_typing(&state.registry, from, to);
        state.dispatch(outbound)
    }

    pub fn mark_seen(&self, viewer: &str, peer: &str) -> usize {
        let state = self.state.lock();
        let outbound = seen::notify_seen(&state.registry, viewer, peer);
        state.dispatch(outbound)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.state.lock().registry.online_users()
    }

    pub fn lookup(&self, identity: &str) -> Option<ConnectionId> {
        self.state.lock().registry.lookup(identity)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().sinks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickchat_common::SendMessageInput;

    fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_connect_broadcasts_online_users_to_everyone() {
        let hub = LiveHub::new();
        let (_, mut alice_rx) = hub.connect("alice");
        let (_, mut bob_rx) = hub.connect("bob");

        let online = ServerEvent::OnlineUsers(vec!["alice".into(), "bob".into()]);
        assert_eq!(drain(&mut alice_rx).last(), Some(&online));
        assert_eq!(drain(&mut bob_rx), vec![online]);
    }

    #[test]
    fn test_fast_reconnect_survives_stale_disconnect() {
        let hub = LiveHub::new();
        let (c1, _rx1) = hub.connect("alice");
        let (c2, mut rx2) = hub.connect("alice");

        hub.disconnect("alice", c1);

        assert_eq!(hub.online_users(), vec!["alice".to_string()]);
        assert_eq!(hub.lookup("alice"), Some(c2));
        assert_eq!(hub.connection_count(), 1);

        drain(&mut rx2);
        let msg = Message::new("bob", "alice", SendMessageInput::text("still there?"));
        assert_eq!(hub.relay(&msg), 1);
        assert_eq!(
            drain(&mut rx2),
            vec![ServerEvent::NewMessage { message: msg }]
        );
    }

    #[test]
    fn test_disconnect_broadcasts_remaining_users() {
        let hub = LiveHub::new();
        let (alice, _alice_rx) = hub.connect("alice");
        let (_, mut bob_rx) = hub.connect("bob");
        drain(&mut bob_rx);

        hub.disconnect("alice", alice);
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::OnlineUsers(vec!["bob".into()])]
        );
    }

    #[test]
    fn test_relay_typing_and_seen_routing() {
        let hub = LiveHub::new();
        let (_, mut alice_rx) = hub.connect("alice");
        let (_, mut bob_rx) = hub.connect("bob");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let msg = Message::new("alice", "bob", SendMessageInput::text("hi"));
        assert_eq!(hub.relay(&msg), 2);
        assert_eq!(hub.typing("alice", "bob"), 1);
        assert_eq!(hub.mark_seen("bob", "alice"), 1);

        assert_eq!(
            drain(&mut alice_rx),
            vec![
                ServerEvent::NewMessage {
                    message: msg.clone()
                },
                ServerEvent::SeenUpdate {
                    user_id: "bob".into()
                },
            ]
        );
        assert_eq!(
            drain(&mut bob_rx),
            vec![
                ServerEvent::NewMessage { message: msg },
                ServerEvent::Typing {
                    from: "alice".into()
                },
            ]
        );
    }

    #[test]
    fn test_closed_receiver_is_skipped() {
        let hub = LiveHub::new();
        let (_, bob_rx) = hub.connect("bob");
        drop(bob_rx);

        assert_eq!(hub.typing("alice", "bob"), 0);
    }
}
