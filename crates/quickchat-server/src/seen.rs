//! Seen synchronizer
//!
//! Tells `peer` that `viewer` has looked at their conversation. The push is a
//! refetch signal for the peer's client, not a patch.

use crate::presence::{Outbound, PresenceRegistry};
use quickchat_common::ServerEvent;
use tracing::debug;

pub fn notify_seen(registry: &PresenceRegistry, viewer: &str, peer: &str) -> Vec<Outbound> {
    match registry.lookup(peer) {
        Some(connection) => vec![Outbound::To {
            connection,
            event: ServerEvent::SeenUpdate {
                user_id: viewer.to_string(),
            },
        }],
        None => {
            debug!("[Seen] {} offline, dropping seen-update from {}", peer, viewer);
            Vec::new()
        }
    }
}
