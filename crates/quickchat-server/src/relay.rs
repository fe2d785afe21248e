//! Message relay
//!
//! Pushes an already-persisted message to whichever of its two parties are
//! live. An offline party is skipped; it catches up from the history
//! snapshot on its next open.

use crate::presence::{Outbound, PresenceRegistry};
use quickchat_common::{Message, ServerEvent};
use tracing::debug;

pub fn relay_message(registry: &PresenceRegistry, message: &Message) -> Vec<Outbound> {
    let mut parties = vec![message.sender_id.as_str()];
    if message.receiver_id != message.sender_id {
        parties.push(message.receiver_id.as_str());
    }

    parties
        .into_iter()
        .filter_map(|identity| match registry.lookup(identity) {
            Some(connection) => Some(Outbound::To {
                connection,
                event: ServerEvent::NewMessage {
                    message: message.clone(),
                },
            }),
            None => {
                debug!("[Relay] {} offline, skipping push of {}", identity, message.id);
                None
            }
        })
        .collect()
}
