use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Rate limit for outgoing typing hints, per peer.
#[derive(Debug)]
pub struct TypingThrottle {
    interval: Duration,
    last_sent: HashMap<String, Instant>,
}

impl TypingThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: HashMap::new(),
        }
    }

    /// True if a hint to `peer` may go out at `now`; records it if so.
    pub fn should_send(&mut self, peer: &str, now: Instant) -> bool {
        match self.last_sent.get(peer) {
            Some(last) if now.saturating_duration_since(*last) < self.interval => false,
            _ => {
                self.last_sent.insert(peer.to_string(), now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttles_per_peer() {
        let mut throttle = TypingThrottle::new(Duration::from_millis(150));
        let start = Instant::now();

        assert!(throttle.should_send("bob", start));
        assert!(!throttle.should_send("bob", start + Duration::from_millis(100)));
        assert!(throttle.should_send("carol", start + Duration::from_millis(100)));
        assert!(throttle.should_send("bob", start + Duration::from_millis(150)));
    }
}
