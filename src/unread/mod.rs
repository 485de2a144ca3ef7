use std::collections::{ HashMap, HashSet };

/// Per-conversation badge counts for inbound messages arriving while the
/// conversation's view is closed.
///
/// Only live pushes feed this counter; history loads never do, so a message
/// counted while the panel was closed cannot be recounted when the panel
/// later loads full history. Counted ids are remembered until reset so a
/// re-delivered push is not double-counted either.
#[derive(Default)]
pub struct UnreadCounters {
    counts: HashMap<i64, u32>,
    counted: HashMap<i64, HashSet<i64>>,
}

impl UnreadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live inbound message. Returns true when the badge changed.
    /// `view_open` reflects whether this conversation is currently on screen;
    /// `from_local_sender` excludes the operator's own echoes.
    pub fn record(
        &mut self,
        conversation_id: i64,
        message_id: i64,
        view_open: bool,
        from_local_sender: bool
    ) -> bool {
        if view_open || from_local_sender {
            return false;
        }
        let seen = self.counted.entry(conversation_id).or_default();
        if !seen.insert(message_id) {
            return false;
        }
        *self.counts.entry(conversation_id).or_insert(0) += 1;
        true
    }

    pub fn count(&self, conversation_id: i64) -> u32 {
        self.counts.get(&conversation_id).copied().unwrap_or(0)
    }

    /// The conversation's view was opened; its badge drops to zero. Counted
    /// ids are kept, so a later re-delivery of an already-seen message can
    /// never resurrect the badge.
    pub fn reset(&mut self, conversation_id: i64) {
        self.counts.remove(&conversation_id);
    }
}
