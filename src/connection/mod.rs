use futures::{ SinkExt, StreamExt };
use log::{ debug, error, info, warn };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex as StdMutex };
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::error::ChatError;
use crate::identity::Identity;
use crate::models::wire::{ ClientEvent, ServerEvent };

/// Connection lifecycle signals delivered to the session. These are the sole
/// signal other components use to gate sends and pick status text.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Channel is up. `resumed` marks a reconnect after a drop, which forces
    /// a history reload since messages may have been missed.
    Connected {
        resumed: bool,
    },
    Disconnected,
    /// All reconnection attempts exhausted.
    GaveUp,
    Server(ServerEvent),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reconnecting,
}

/// Status line shown to the user; transport failures never surface as
/// anything stronger than this text.
pub fn status_text(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "connected",
        ConnectionState::Reconnecting => "reconnecting…",
        ConnectionState::Disconnected => "disconnected",
    }
}

/// Bounded automatic reconnection: a fixed delay between attempts and a hard
/// attempt cap per disconnection streak.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Build the realtime endpoint with identity query parameters: guests carry
/// their ephemeral session id and a guest flag, authenticated users their
/// numeric id and, for operator consoles, an admin flag.
pub fn build_endpoint(
    ws_url: &str,
    identity: &Identity,
    tenant_id: &str
) -> Result<Url, ChatError> {
    let mut url = Url::parse(ws_url)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("tenantId", tenant_id);
        match identity {
            Identity::Guest { session_id } => {
                query.append_pair("sessionId", session_id);
                query.append_pair("isGuest", "true");
            }
            Identity::User { user_id, admin, .. } => {
                query.append_pair("userId", &user_id.to_string());
                if *admin {
                    query.append_pair("isAdmin", "true");
                }
            }
        }
    }
    Ok(url)
}

/// Owns the single realtime channel for the active participant. All other
/// components talk to the transport only through `send` or the
/// `ConnectionEvent` stream; none hold a channel of their own.
pub struct ConnectionManager {
    policy: ReconnectPolicy,
    connected: Arc<AtomicBool>,
    /// Room to re-join on every (re)connect. The session updates this when a
    /// conversation is created or looked up.
    conversation: Arc<StdMutex<Option<i64>>>,
    outbound_tx: Option<mpsc::UnboundedSender<ClientEvent>>,
    supervisor: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            connected: Arc::new(AtomicBool::new(false)),
            conversation: Arc::new(StdMutex::new(None)),
            outbound_tx: None,
            supervisor: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else if self.supervisor.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn set_conversation(&self, conversation_id: Option<i64>) {
        if let Ok(mut guard) = self.conversation.lock() {
            *guard = conversation_id;
        }
    }

    /// Queue an outbound event. Rejected client-side before touching the
    /// transport when the channel is down.
    pub fn send(&self, event: ClientEvent) -> Result<(), ChatError> {
        if !self.is_connected() {
            return Err(ChatError::NotConnected);
        }
        match &self.outbound_tx {
            Some(tx) => tx.send(event).map_err(|_| ChatError::ChannelClosed),
            None => Err(ChatError::NotConnected),
        }
    }

    /// Open the channel for `identity` and keep it alive under the reconnect
    /// policy. Lifecycle and server events are delivered over `events`.
    pub fn connect(
        &mut self,
        endpoint: Url,
        events: mpsc::UnboundedSender<ConnectionEvent>
    ) {
        self.disconnect();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound_tx = Some(outbound_tx);

        let policy = self.policy;
        let connected = Arc::clone(&self.connected);
        let conversation = Arc::clone(&self.conversation);

        self.supervisor = Some(
            tokio::spawn(async move {
                run_channel(endpoint, policy, connected, conversation, outbound_rx, events).await;
            })
        );
    }

    /// Release the channel. Safe to call repeatedly and on teardown.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
        self.outbound_tx = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_channel(
    endpoint: Url,
    policy: ReconnectPolicy,
    connected: Arc<AtomicBool>,
    conversation: Arc<StdMutex<Option<i64>>>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    events: mpsc::UnboundedSender<ConnectionEvent>
) {
    let mut attempts: u32 = 0;
    let mut ever_connected = false;

    loop {
        match connect_async(endpoint.as_str()).await {
            Ok((mut ws, _)) => {
                info!("Realtime channel connected: {}", endpoint);
                attempts = 0;
                connected.store(true, Ordering::SeqCst);

                // Re-join the known conversation room before anything else so
                // pushes for it are not missed.
                let room = conversation.lock().ok().and_then(|g| *g);
                if let Some(conversation_id) = room {
                    let join = ClientEvent::JoinConversation { conversation_id };
                    if let Ok(json) = serde_json::to_string(&join) {
                        if let Err(e) = ws.send(Message::Text(json)).await {
                            warn!("Failed to join conversation {}: {}", conversation_id, e);
                        }
                    }
                }

                if events.send(ConnectionEvent::Connected { resumed: ever_connected }).is_err() {
                    return;
                }
                ever_connected = true;

                pump(&mut ws, &mut outbound_rx, &events).await;

                connected.store(false, Ordering::SeqCst);
                if events.send(ConnectionEvent::Disconnected).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("Realtime connect failed: {}", e);
            }
        }

        attempts += 1;
        if !policy.should_retry(attempts) {
            error!("Giving up after {} reconnection attempts", attempts);
            let _ = events.send(ConnectionEvent::GaveUp);
            return;
        }
        debug!("Reconnecting in {:?} (attempt {})", policy.delay, attempts);
        tokio::time::sleep(policy.delay).await;
    }
}

/// Drive one live connection: drain outbound events and forward parsed
/// inbound frames until the stream ends or errors.
async fn pump<S>(
    ws: &mut tokio_tungstenite::WebSocketStream<S>,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    events: &mpsc::UnboundedSender<ConnectionEvent>
)
    where S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin
{
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(event) = outbound else { return };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to encode outbound event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws.send(Message::Text(json)).await {
                    error!("Failed to send over channel: {}", e);
                    return;
                }
            }
            inbound = ws.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if events.send(ConnectionEvent::Server(event)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!("Ignoring unparseable server event: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if ws.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Ignoring binary frame from server");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Server closed the realtime channel");
                        return;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!("Channel error: {}", e);
                        return;
                    }
                    None => {
                        info!("Realtime channel ended");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_endpoint_carries_session_and_flag() {
        let identity = Identity::Guest { session_id: "1700-a1b2".to_string() };
        let url = build_endpoint("ws://localhost:4000/chat", &identity, "shop-1").unwrap();
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(query.contains(&("tenantId".to_string(), "shop-1".to_string())));
        assert!(query.contains(&("sessionId".to_string(), "1700-a1b2".to_string())));
        assert!(query.contains(&("isGuest".to_string(), "true".to_string())));
    }

    #[test]
    fn admin_endpoint_carries_user_and_admin_flag() {
        let identity = Identity::User { user_id: 5, conversation_id: None, admin: true };
        let url = build_endpoint("ws://localhost:4000/chat", &identity, "shop-1").unwrap();
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(query.contains(&("userId".to_string(), "5".to_string())));
        assert!(query.contains(&("isAdmin".to_string(), "true".to_string())));
        assert!(!query.iter().any(|(k, _)| k == "sessionId"));
    }

    #[test]
    fn reconnect_policy_is_bounded() {
        let policy = ReconnectPolicy { max_attempts: 3, delay: Duration::from_millis(10) };
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn status_text_covers_every_state() {
        assert_eq!(status_text(ConnectionState::Connected), "connected");
        assert_eq!(status_text(ConnectionState::Reconnecting), "reconnecting…");
        assert_eq!(status_text(ConnectionState::Disconnected), "disconnected");
    }

    #[tokio::test]
    async fn send_while_disconnected_is_rejected() {
        let manager = ConnectionManager::new(ReconnectPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(10),
        });
        let result = manager.send(ClientEvent::Typing { is_typing: true, conversation_id: None });
        assert!(matches!(result, Err(ChatError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut manager = ConnectionManager::new(ReconnectPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(10),
        });
        manager.disconnect();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
