use std::collections::HashMap;
use std::time::{ Duration, Instant };
use uuid::Uuid;

/// Generate a fresh correlation token for an optimistic send.
pub fn new_token() -> String {
    format!("tmp-{}", Uuid::new_v4())
}

/// What the timeout sweep decided for an expired token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredSend {
    pub token: String,
}

/// Tracks locally-originated messages from optimistic insertion until
/// reconciliation. A token leaves the in-flight set exactly once: on
/// confirmation, on explicit failure, or when its timeout expires. After the
/// timeout the message is optimistically treated as sent; a genuinely late
/// confirmation for the same token is ignored rather than re-applied.
pub struct DeliveryTracker {
    timeout: Duration,
    in_flight: HashMap<String, Instant>,
}

impl DeliveryTracker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, in_flight: HashMap::new() }
    }

    /// Register a token at send time.
    pub fn track(&mut self, token: &str, now: Instant) {
        self.in_flight.insert(token.to_string(), now + self.timeout);
    }

    pub fn is_pending(&self, token: &str) -> bool {
        self.in_flight.contains_key(token)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Server confirmed the send. Returns false when the token is unknown,
    /// which includes the already-timed-out case.
    pub fn confirm(&mut self, token: &str) -> bool {
        self.in_flight.remove(token).is_some()
    }

    /// Server reported an explicit failure. Same idempotence as `confirm`.
    pub fn fail(&mut self, token: &str) -> bool {
        self.in_flight.remove(token).is_some()
    }

    /// Sweep the in-flight set, removing and returning every token whose
    /// confirmation window has elapsed.
    pub fn expire(&mut self, now: Instant) -> Vec<ExpiredSend> {
        let expired: Vec<String> = self.in_flight
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(token, _)| token.clone())
            .collect();
        for token in &expired {
            self.in_flight.remove(token);
        }
        expired
            .into_iter()
            .map(|token| ExpiredSend { token })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(12);

    #[test]
    fn tokens_are_unique() {
        assert_ne!(new_token(), new_token());
        assert!(new_token().starts_with("tmp-"));
    }

    #[test]
    fn confirm_clears_in_flight() {
        let mut tracker = DeliveryTracker::new(TIMEOUT);
        let now = Instant::now();
        tracker.track("tmp-1", now);
        assert!(tracker.is_pending("tmp-1"));
        assert!(tracker.confirm("tmp-1"));
        assert!(!tracker.is_pending("tmp-1"));
    }

    #[test]
    fn expire_fires_exactly_once() {
        let mut tracker = DeliveryTracker::new(TIMEOUT);
        let now = Instant::now();
        tracker.track("tmp-1", now);

        assert!(tracker.expire(now + Duration::from_secs(5)).is_empty());

        let expired = tracker.expire(now + TIMEOUT);
        assert_eq!(expired, vec![ExpiredSend { token: "tmp-1".to_string() }]);

        // Second sweep finds nothing; the fallback transition happened once.
        assert!(tracker.expire(now + TIMEOUT + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn late_confirmation_after_timeout_is_ignored() {
        let mut tracker = DeliveryTracker::new(TIMEOUT);
        let now = Instant::now();
        tracker.track("tmp-1", now);
        assert_eq!(tracker.expire(now + TIMEOUT).len(), 1);
        assert!(!tracker.confirm("tmp-1"));
    }

    #[test]
    fn failure_removes_token_without_expiry() {
        let mut tracker = DeliveryTracker::new(TIMEOUT);
        let now = Instant::now();
        tracker.track("tmp-1", now);
        assert!(tracker.fail("tmp-1"));
        assert!(tracker.expire(now + TIMEOUT).is_empty());
    }

    #[test]
    fn sweep_only_touches_expired_tokens() {
        let mut tracker = DeliveryTracker::new(TIMEOUT);
        let now = Instant::now();
        tracker.track("tmp-old", now);
        tracker.track("tmp-new", now + Duration::from_secs(10));

        let expired = tracker.expire(now + TIMEOUT);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].token, "tmp-old");
        assert!(tracker.is_pending("tmp-new"));
    }
}
