//! Typing hints. Forwarded if the target is live, dropped otherwise.
//! Expiry of the indicator is owned by the receiving client.

use crate::presence::{Outbound, PresenceRegistry};
use quickchat_common::ServerEvent;

pub fn notify_typing(registry: &PresenceRegistry, from: &str, to: &str) -> Vec<Outbound> {
    if from == to {
        return Vec::new();
    }

    registry
        .lookup(to)
        .map(|connection| Outbound::To {
            connection,
            event: ServerEvent::Typing {
                from: from.to_string(),
            },
        })
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickchat_common::ConnectionId;

    #[test]
    fn test_typing_forwarded_to_live_peer() {
        let mut registry = PresenceRegistry::new();
        let bob = ConnectionId::new();
        registry.register("bob", bob);

        let out = notify_typing(&registry, "alice", "bob");
        assert_eq!(
            out,
            vec![Outbound::To {
                connection: bob,
                event: ServerEvent::Typing {
                    from: "alice".into()
                }
            }]
        );
    }

    #[test]
    fn test_typing_to_offline_peer_dropped() {
        let registry = PresenceRegistry::new();
        assert!(notify_typing(&registry, "alice", "bob").is_empty());
    }
}
