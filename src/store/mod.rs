use crate::models::chat::{ ChatMessage, MessageId, MessageStatus };

/// Single source of truth for the displayed message list of the active
/// conversation. Merges locally-optimistic, server-confirmed and
/// inbound-pushed messages into one deduplicated, ordered view.
///
/// All mutation goes through the operations below; nothing splices into the
/// list directly.
#[derive(Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.messages.iter().any(|m| m.id.confirmed() == Some(id))
    }

    /// Add one message, replacing any entry it reconciles with.
    ///
    /// A match is either the same confirmed id, or a correlation-token link in
    /// either direction: the incoming token naming a stored pending entry, or
    /// a stored token naming the incoming (already confirmed) id. The matched
    /// entry is replaced in place with its token cleared; otherwise the
    /// message is appended and the collection re-sorted.
    pub fn add_message(&mut self, incoming: ChatMessage) {
        if let Some(idx) = self.find_match(&incoming) {
            let mut merged = incoming;
            merged.temp_id = None;
            self.messages[idx] = merged;
        } else {
            self.messages.push(incoming);
        }
        self.sort();
    }

    /// Apply a delivery-state transition to the entry keyed by `token`.
    /// `Failed` keeps the pending identity so a user-initiated retry can find
    /// it; every other status swaps in the confirmed id and clears the token.
    pub fn update_status(&mut self, token: &str, new_id: Option<i64>, status: MessageStatus) {
        if let Some(entry) = self.messages.iter_mut().find(|m| Self::keyed_by(m, token)) {
            entry.status = status;
            if status != MessageStatus::Failed {
                if let Some(id) = new_id {
                    entry.id = MessageId::Confirmed(id);
                }
                entry.temp_id = None;
            }
        }
        self.sort();
    }

    /// Wholesale replacement, used by the initial history load.
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.sort();
    }

    /// Splice an older page ahead of the current content, dropping any
    /// message whose confirmed id is already displayed. Live messages that
    /// arrived while the fetch was in flight keep their positions.
    pub fn prepend_older(&mut self, page: Vec<ChatMessage>) {
        let fresh: Vec<ChatMessage> = page
            .into_iter()
            .filter(|m| {
                match m.id.confirmed() {
                    Some(id) => !self.contains_id(id),
                    None => true,
                }
            })
            .collect();
        if fresh.is_empty() {
            return;
        }
        self.messages.extend(fresh);
        self.sort();
    }

    fn find_match(&self, incoming: &ChatMessage) -> Option<usize> {
        self.messages.iter().position(|existing| {
            if let (Some(a), Some(b)) = (existing.id.confirmed(), incoming.id.confirmed()) {
                if a == b {
                    return true;
                }
            }
            if let Some(token) = incoming.temp_id.as_deref() {
                if Self::keyed_by(existing, token) {
                    return true;
                }
            }
            if let Some(token) = incoming.id.pending_token() {
                if Self::keyed_by(existing, token) {
                    return true;
                }
            }
            if let Some(token) = existing.temp_id.as_deref() {
                if incoming.id.pending_token() == Some(token) {
                    return true;
                }
            }
            false
        })
    }

    fn keyed_by(message: &ChatMessage, token: &str) -> bool {
        message.id.pending_token() == Some(token) || message.temp_id.as_deref() == Some(token)
    }

    fn sort(&mut self) {
        self.messages.sort_by_key(|m| m.sort_key());
    }
}
