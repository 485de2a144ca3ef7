use std::collections::HashMap;
use std::time::{ Duration, Instant };

/// Which side of the conversation a typing indicator belongs to, as seen
/// from the local participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParticipantClass {
    /// Admin/bot side, shown to customers and guests.
    Operator,
    /// Customer side, shown in the operator console.
    Customer,
}

/// Transient "is typing" state. Indicators auto-clear after a fixed timeout,
/// on a real message from the same side, and on reconnect; they are never
/// part of message history.
pub struct TypingSignaler {
    timeout: Duration,
    deadlines: HashMap<ParticipantClass, Instant>,
}

impl TypingSignaler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, deadlines: HashMap::new() }
    }

    pub fn set_typing(&mut self, class: ParticipantClass, is_typing: bool, now: Instant) {
        if is_typing {
            self.deadlines.insert(class, now + self.timeout);
        } else {
            self.deadlines.remove(&class);
        }
    }

    pub fn is_typing(&self, class: ParticipantClass) -> bool {
        self.deadlines.contains_key(&class)
    }

    /// A message from this side arrived; its indicator is stale.
    pub fn clear(&mut self, class: ParticipantClass) {
        self.deadlines.remove(&class);
    }

    /// Typing state never survives a reconnect.
    pub fn clear_all(&mut self) {
        self.deadlines.clear();
    }

    /// Drop indicators whose timeout elapsed without a follow-up event.
    pub fn expire(&mut self, now: Instant) {
        self.deadlines.retain(|_, deadline| now < *deadline);
    }
}
