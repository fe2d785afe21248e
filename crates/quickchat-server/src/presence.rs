//! Presence registry
//!
//! Maps each identity to its single live connection. Every operation is a
//! plain synchronous function of `(&mut self, event)` returning the events it
//! wants pushed, so callers can apply it without an await point between the
//! read and the write.

use chrono::{DateTime, Utc};
use quickchat_common::{ConnectionId, ServerEvent, UserId};
use std::collections::BTreeMap;
use tracing::debug;

/// A live connection bound to one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: UserId,
    pub connection_id: ConnectionId,
    pub connected_at: DateTime<Utc>,
}

/// An event the registry (or a component reading it) wants delivered
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    To {
        connection: ConnectionId,
        event: ServerEvent,
    },
    Broadcast(ServerEvent),
}

impl Outbound {
    pub fn event(&self) -> &ServerEvent {
        match self {
            Outbound::To { event, .. } => event,
            Outbound::Broadcast(event) => event,
        }
    }
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// Keyed by identity; ordered so the online list is deterministic.
    sessions: BTreeMap<UserId, Session>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `connection_id`, replacing any earlier connection.
    pub fn register(&mut self, identity: &str, connection_id: ConnectionId) -> Vec<Outbound> {
        let session = Session {
            identity: identity.to_string(),
            connection_id,
            connected_at: Utc::now(),
        };

        if let Some(previous) = self.sessions.insert(identity.to_string(), session) {
            debug!(
                "[Presence] {} re-registered: {} replaces {}",
                identity, connection_id, previous.connection_id
            );
        }

        vec![self.online_broadcast()]
    }

    /// Remove `identity` only if it is still bound to `connection_id`.
    ///
    /// A disconnect for a connection that was already replaced by a newer
    /// registration is a no-op and broadcasts nothing.
    pub fn unregister(&mut self, identity: &str, connection_id: ConnectionId) -> Vec<Outbound> {
        match self.sessions.get(identity) {
            Some(current) if current.connection_id == connection_id => {
                self.sessions.remove(identity);
                vec![self.online_broadcast()]
            }
            Some(current) => {
                debug!(
                    "[Presence] Ignoring stale disconnect of {} for {} (current {})",
                    connection_id, identity, current.connection_id
                );
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub fn lookup(&self, identity: &str) -> Option<ConnectionId> {
        self.sessions.get(identity).map(|s| s.connection_id)
    }

    pub fn session(&self, identity: &str) -> Option<&Session> {
        self.sessions.get(identity)
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    /// Identities with a live session, ascending.
    pub fn online_users(&self) -> Vec<UserId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn online_broadcast(&self) -> Outbound {
        Outbound::Broadcast(ServerEvent::OnlineUsers(self.online_users()))
    }
}
