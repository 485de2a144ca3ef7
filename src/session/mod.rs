use chrono::Utc;
use log::{ debug, info, warn };
use std::sync::Arc;
use std::time::{ Duration, Instant };

use crate::cli::Args;
use crate::connection::{ ConnectionEvent, ConnectionManager };
use crate::delivery::{ self, DeliveryTracker };
use crate::error::ChatError;
use crate::history::HistoryApi;
use crate::identity::{ self, Identity, IdentityResolver };
use crate::models::chat::{ ChatMessage, MessageId, MessageStatus, PageCursor, SenderType };
use crate::models::wire::{ ClientEvent, ServerEvent };
use crate::presence::{ ParticipantClass, TypingSignaler };
use crate::store::MessageStore;
use crate::unread::UnreadCounters;

/// Outbound side of the realtime channel as the session sees it. The
/// connection manager implements this; tests substitute a recorder.
pub trait Channel: Send + Sync {
    fn send_event(&self, event: ClientEvent) -> Result<(), ChatError>;
    fn is_connected(&self) -> bool;
    fn set_conversation(&self, conversation_id: Option<i64>);
}

impl Channel for ConnectionManager {
    fn send_event(&self, event: ClientEvent) -> Result<(), ChatError> {
        self.send(event)
    }

    fn is_connected(&self) -> bool {
        ConnectionManager::is_connected(self)
    }

    fn set_conversation(&self, conversation_id: Option<i64>) {
        ConnectionManager::set_conversation(self, conversation_id)
    }
}

/// Side effects the embedding application may want to react to. The session
/// never raises these as errors; they are drained state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionNotice {
    /// A User/Guest message was confirmed (or optimistically assumed sent),
    /// so an automated reply may be requested. The language logic lives
    /// outside this crate.
    AwaitingReply {
        temp_id: String,
    },
}

/// Tunables lifted from the CLI.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub tenant_id: String,
    pub page_size: u32,
    pub send_timeout: Duration,
    pub typing_timeout: Duration,
    pub spinner_min: Duration,
    pub spinner_max: Duration,
}

impl SessionSettings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            tenant_id: args.tenant_id.clone(),
            page_size: args.page_size,
            send_timeout: Duration::from_secs(args.send_timeout_secs),
            typing_timeout: Duration::from_millis(args.typing_timeout_ms),
            spinner_min: Duration::from_millis(args.spinner_min_ms),
            spinner_max: Duration::from_millis(args.spinner_max_ms),
        }
    }
}

/// Loading indicator with a minimum display time (no flash on fast responses)
/// and a hard cap so a hanging request can never leave the UI spinning.
struct LoadingIndicator {
    min: Duration,
    max: Duration,
    shown_at: Option<Instant>,
    request_done: bool,
}

impl LoadingIndicator {
    fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, shown_at: None, request_done: false }
    }

    fn show(&mut self, now: Instant) {
        self.shown_at = Some(now);
        self.request_done = false;
    }

    fn finish(&mut self) {
        self.request_done = true;
    }

    fn visible(&self) -> bool {
        self.shown_at.is_some()
    }

    fn sweep(&mut self, now: Instant) {
        if let Some(shown_at) = self.shown_at {
            let elapsed = now.duration_since(shown_at);
            if (self.request_done && elapsed >= self.min) || elapsed >= self.max {
                self.shown_at = None;
            }
        }
    }
}

/// The chat core. Owns all mutable chat state and is driven by one event
/// loop: connection events, user actions, and the periodic timer sweep all
/// funnel through the methods below.
pub struct ChatSession {
    identity: Identity,
    resolver: IdentityResolver,
    history: Arc<dyn HistoryApi>,
    channel: Arc<dyn Channel>,
    settings: SessionSettings,

    store: MessageStore,
    cursor: PageCursor,
    delivery: DeliveryTracker,
    typing: TypingSignaler,
    unread: UnreadCounters,

    /// Conversation whose view is currently on screen, if any.
    open_view: Option<i64>,
    has_attempted_initial_load: bool,
    initial_in_flight: bool,
    load_more_in_flight: bool,
    loading: LoadingIndicator,

    notices: Vec<SessionNotice>,
}

impl ChatSession {
    pub fn new(
        identity: Identity,
        resolver: IdentityResolver,
        history: Arc<dyn HistoryApi>,
        channel: Arc<dyn Channel>,
        settings: SessionSettings
    ) -> Self {
        let cursor = PageCursor::new(settings.page_size);
        let delivery = DeliveryTracker::new(settings.send_timeout);
        let typing = TypingSignaler::new(settings.typing_timeout);
        let loading = LoadingIndicator::new(settings.spinner_min, settings.spinner_max);
        Self {
            identity,
            resolver,
            history,
            channel,
            settings,
            store: MessageStore::new(),
            cursor,
            delivery,
            typing,
            unread: UnreadCounters::new(),
            open_view: None,
            has_attempted_initial_load: false,
            initial_in_flight: false,
            load_more_in_flight: false,
            loading,
            notices: Vec::new(),
        }
    }

    /// Load guest-cached messages into the displayed view. No-op for
    /// authenticated identities, whose history comes from the server.
    pub async fn bootstrap(&mut self) -> Result<(), ChatError> {
        if self.identity.is_guest() {
            let cached = self.resolver.load_local_messages().await?;
            if !cached.is_empty() {
                info!("Restored {} locally-cached guest messages", cached.len());
                self.store.replace_all(cached);
            }
        }
        Ok(())
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.visible()
    }

    pub fn has_attempted_initial_load(&self) -> bool {
        self.has_attempted_initial_load
    }

    pub fn unread_count(&self, conversation_id: i64) -> u32 {
        self.unread.count(conversation_id)
    }

    pub fn is_typing(&self, class: ParticipantClass) -> bool {
        self.typing.is_typing(class)
    }

    pub fn take_notices(&mut self) -> Vec<SessionNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Send a chat message. Whitespace-only input is rejected before any
    /// network work, as a quiet no-op. Guests never touch the transport:
    /// their messages are cached locally until login.
    pub async fn send_message(&mut self, text: &str, now: Instant) -> Result<(), ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("Rejecting empty message");
            return Ok(());
        }

        if self.identity.is_guest() {
            return self.send_as_guest(trimmed).await;
        }

        if !self.channel.is_connected() {
            return Err(ChatError::NotConnected);
        }

        let token = delivery::new_token();
        let message = self.build_outgoing(trimmed, &token, MessageStatus::Sending);
        self.store.add_message(message);
        self.delivery.track(&token, now);
        self.emit_send(trimmed, &token)?;
        Ok(())
    }

    async fn send_as_guest(&mut self, text: &str) -> Result<(), ChatError> {
        let token = delivery::new_token();
        let message = self.build_outgoing(text, &token, MessageStatus::Local);
        self.store.add_message(message);
        self.persist_guest_messages().await
    }

    fn build_outgoing(&self, text: &str, token: &str, status: MessageStatus) -> ChatMessage {
        let sender_id = match &self.identity {
            Identity::Guest { .. } => None,
            Identity::User { user_id, .. } => Some(*user_id),
        };
        ChatMessage {
            id: MessageId::Pending(token.to_string()),
            conversation_id: self.identity.conversation_id(),
            session_id: self.identity.session_id().map(str::to_string),
            sender_id,
            sender_type: self.identity.sender_type(),
            message: text.to_string(),
            metadata: serde_json::json!({
                "tenantId": self.settings.tenant_id,
                "isGuest": self.identity.is_guest(),
            }),
            created_at: Utc::now(),
            status,
            temp_id: Some(token.to_string()),
        }
    }

    fn emit_send(&self, text: &str, token: &str) -> Result<(), ChatError> {
        let (sender_id, user_id) = match &self.identity {
            Identity::Guest { .. } => (None, None),
            Identity::User { user_id, .. } => (Some(*user_id), Some(*user_id)),
        };
        self.channel.send_event(ClientEvent::SendMessage {
            message: text.to_string(),
            temp_id: token.to_string(),
            metadata: serde_json::json!({
                "tenantId": self.settings.tenant_id,
                "isGuest": self.identity.is_guest(),
            }),
            conversation_id: self.identity.conversation_id(),
            sender_type: self.identity.sender_type(),
            sender_id,
            tenant_id: self.settings.tenant_id.clone(),
            user_id,
        })
    }

    /// Relay the local participant's typing state. Best-effort; a closed
    /// channel only costs the indicator.
    pub fn send_typing(&self, is_typing: bool) {
        let event = ClientEvent::Typing {
            is_typing,
            conversation_id: self.identity.conversation_id(),
        };
        if let Err(e) = self.channel.send_event(event) {
            debug!("Typing signal dropped: {}", e);
        }
    }

    async fn persist_guest_messages(&self) -> Result<(), ChatError> {
        let local: Vec<ChatMessage> = self.store
            .messages()
            .iter()
            .filter(|m| m.status == MessageStatus::Local)
            .cloned()
            .collect();
        self.resolver.store_local_messages(&local).await
    }

    /// Fetch history. `load_more` prepends the next older page; otherwise the
    /// current view is replaced by page 1. Guarded per mode so concurrent
    /// triggers collapse, and by `has_more` for backward pagination.
    pub async fn load_messages(&mut self, load_more: bool, now: Instant) -> Result<(), ChatError> {
        let Some(conversation_id) = self.identity.conversation_id() else {
            // Guests have no server-side conversation; their view is the
            // local cache loaded at bootstrap.
            if !load_more {
                self.has_attempted_initial_load = true;
            }
            return Ok(());
        };

        if load_more {
            if self.load_more_in_flight || !self.cursor.has_more {
                return Ok(());
            }
            self.load_more_in_flight = true;
        } else {
            if self.initial_in_flight {
                return Ok(());
            }
            self.initial_in_flight = true;
        }
        self.loading.show(now);

        let page_number = if load_more { self.cursor.page + 1 } else { 1 };
        let result = self.history
            .fetch_page(conversation_id, page_number, self.cursor.page_size)
            .await;

        if load_more {
            self.load_more_in_flight = false;
        } else {
            self.initial_in_flight = false;
            // Attempted regardless of outcome: a failed first load must not
            // leave the UI in a perpetual loading state.
            self.has_attempted_initial_load = true;
        }
        self.loading.finish();

        match result {
            Ok(page) => {
                if load_more {
                    self.store.prepend_older(page.messages);
                } else {
                    self.store.replace_all(page.messages);
                }
                self.cursor.page = page_number;
                self.cursor.has_more = page.has_more;
                self.cursor.total_messages = page.total;
            }
            Err(e) => {
                warn!("History fetch failed (page {}): {}", page_number, e);
            }
        }
        Ok(())
    }

    /// One connection or server event, dispatched through the single reducer
    /// so ordering and deduplication decisions live in one place.
    pub async fn handle_event(&mut self, event: ConnectionEvent, now: Instant) {
        match event {
            ConnectionEvent::Connected { resumed } => {
                self.typing.clear_all();
                if resumed {
                    // Messages sent while disconnected may have been missed;
                    // the reload wins over any already-buffered live push.
                    info!("Channel resumed, reloading history");
                    if let Err(e) = self.load_messages(false, now).await {
                        warn!("Post-reconnect reload failed: {}", e);
                    }
                }
            }
            ConnectionEvent::Disconnected => {
                self.typing.clear_all();
            }
            ConnectionEvent::GaveUp => {
                warn!("Realtime channel gave up reconnecting");
            }
            ConnectionEvent::Server(event) => self.handle_server_event(event, now).await,
        }
    }

    async fn handle_server_event(&mut self, event: ServerEvent, now: Instant) {
        match event {
            ServerEvent::SessionInitialized { session_id } => {
                if let Identity::Guest { session_id: current } = &mut self.identity {
                    debug!("Adopting server-issued session id {}", session_id);
                    *current = session_id;
                }
            }
            | ServerEvent::ConversationCreated { conversation_id }
            | ServerEvent::ConversationUpdated { conversation_id } => {
                self.attach_conversation(conversation_id, now).await;
            }
            ServerEvent::Message { message } => {
                self.handle_inbound_message(message);
            }
            ServerEvent::MessageConfirmed { temp_id, message_id } => {
                if self.delivery.confirm(&temp_id) {
                    self.store.update_status(&temp_id, Some(message_id), MessageStatus::Sent);
                    if self.identity.sender_type().triggers_auto_reply() {
                        self.notices.push(SessionNotice::AwaitingReply { temp_id });
                    }
                } else {
                    // Either never ours or already handled by the timeout
                    // fallback; re-applying would double-transition.
                    debug!("Dropping confirmation for unknown token {}", temp_id);
                }
            }
            ServerEvent::MessageFailed { temp_id, error } => {
                if self.delivery.fail(&temp_id) {
                    warn!(
                        "Send {} failed: {}",
                        temp_id,
                        error.as_deref().unwrap_or("unspecified")
                    );
                    self.store.update_status(&temp_id, None, MessageStatus::Failed);
                }
            }
            ServerEvent::Typing { user_id: _, is_typing } => {
                self.typing.set_typing(self.remote_class(), is_typing, now);
            }
        }
    }

    /// The participant class of the other side of this conversation.
    fn remote_class(&self) -> ParticipantClass {
        match &self.identity {
            Identity::User { admin: true, .. } => ParticipantClass::Customer,
            _ => ParticipantClass::Operator,
        }
    }

    async fn attach_conversation(&mut self, conversation_id: i64, now: Instant) {
        if let Identity::User { conversation_id: current, .. } = &mut self.identity {
            *current = Some(conversation_id);
        }
        self.channel.set_conversation(Some(conversation_id));
        if
            let Err(e) = self.channel.send_event(ClientEvent::JoinConversation {
                conversation_id,
            })
        {
            debug!("Join for conversation {} not sent: {}", conversation_id, e);
        }
        self.cursor.reset();
        if let Err(e) = self.load_messages(false, now).await {
            warn!("History load for conversation {} failed: {}", conversation_id, e);
        }
    }

    fn handle_inbound_message(&mut self, message: ChatMessage) {
        let sender_class = match message.sender_type {
            SenderType::User | SenderType::Guest => ParticipantClass::Customer,
            SenderType::Admin | SenderType::Bot | SenderType::Ai => ParticipantClass::Operator,
        };
        self.typing.clear(sender_class);

        if let (Some(conversation_id), Some(message_id)) =
            (message.conversation_id, message.id.confirmed())
        {
            let view_open = self.open_view == Some(conversation_id);
            self.unread.record(
                conversation_id,
                message_id,
                view_open,
                self.is_local_sender(&message)
            );
        }

        if self.belongs_to_active_context(&message) {
            self.store.add_message(message);
        }
    }

    fn is_local_sender(&self, message: &ChatMessage) -> bool {
        match &self.identity {
            Identity::User { user_id, .. } => message.sender_id == Some(*user_id),
            Identity::Guest { session_id } =>
                message.session_id.as_deref() == Some(session_id.as_str()),
        }
    }

    fn belongs_to_active_context(&self, message: &ChatMessage) -> bool {
        match &self.identity {
            Identity::Guest { session_id } =>
                message.session_id.as_deref() == Some(session_id.as_str()),
            Identity::User { conversation_id, .. } =>
                message.conversation_id.is_some() && message.conversation_id == *conversation_id,
        }
    }

    /// Open a conversation's view: its badge clears immediately.
    pub fn open_view(&mut self, conversation_id: i64) {
        self.open_view = Some(conversation_id);
        self.unread.reset(conversation_id);
    }

    pub fn close_view(&mut self) {
        self.open_view = None;
    }

    /// Guest-to-authenticated transition. Clears every guest artifact, then
    /// replays the locally-cached history: user/guest-authored messages go
    /// back through the normal send path under fresh tokens, bot/AI-authored
    /// ones are persisted via the bot-save call. Best effort per message.
    pub async fn login(&mut self, user_id: i64, admin: bool, now: Instant) {
        if !self.identity.is_guest() {
            return;
        }
        info!("Guest authenticated as user {}", user_id);

        let cached = match self.resolver.load_local_messages().await {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Could not read guest cache: {}", e);
                Vec::new()
            }
        };

        self.store.clear();
        self.cursor.reset();
        self.has_attempted_initial_load = false;
        if let Err(e) = self.resolver.clear_guest_state().await {
            warn!("Could not clear guest artifacts: {}", e);
        }
        self.identity = Identity::User { user_id, conversation_id: None, admin };

        let (to_resend, to_persist) = identity::partition_local_messages(cached);
        for message in &to_resend {
            let token = delivery::new_token();
            let optimistic = self.build_outgoing(&message.message, &token, MessageStatus::Sending);
            self.store.add_message(optimistic);
            self.delivery.track(&token, now);
            if let Err(e) = self.emit_send(&message.message, &token) {
                warn!("Migration send failed for \"{}\": {}", message.message, e);
            }
        }
        for message in &to_persist {
            if
                let Err(e) = self.history.save_bot_message(
                    self.identity.conversation_id(),
                    &message.message,
                    message.session_id.as_deref()
                ).await
            {
                warn!("Migration bot-save failed: {}", e);
            }
        }
        if !to_resend.is_empty() || !to_persist.is_empty() {
            info!(
                "Migrated {} guest and {} bot messages to the server",
                to_resend.len(),
                to_persist.len()
            );
        }
    }

    /// Periodic timer pass: delivery timeouts, typing expiry, and the loading
    /// indicator's min/max windows.
    pub fn sweep(&mut self, now: Instant) {
        for expired in self.delivery.expire(now) {
            // Liveness over strict correctness: an unconfirmed send becomes
            // visible as sent instead of sticking in pending forever.
            warn!("No confirmation for {} within window, assuming sent", expired.token);
            self.store.update_status(&expired.token, None, MessageStatus::Sent);
            if self.identity.sender_type().triggers_auto_reply() {
                self.notices.push(SessionNotice::AwaitingReply { temp_id: expired.token });
            }
        }
        self.typing.expire(now);
        self.loading.sweep(now);
    }
}
