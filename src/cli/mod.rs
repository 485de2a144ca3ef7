use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Endpoint Args ---
    /// WebSocket endpoint of the realtime chat gateway.
    #[arg(long, env = "CHAT_WS_URL", default_value = "ws://127.0.0.1:4000/chat")]
    pub ws_url: String,

    /// Base URL of the REST API serving chat history.
    #[arg(long, env = "CHAT_API_URL", default_value = "http://127.0.0.1:3000/api")]
    pub api_url: String,

    /// Tenant identifier forwarded on every REST call and send event.
    #[arg(long, env = "CHAT_TENANT_ID", default_value = "default")]
    pub tenant_id: String,

    /// Optional bearer token attached to history requests.
    #[arg(long, env = "CHAT_API_TOKEN")]
    pub api_token: Option<String>,

    // --- Identity Args ---
    /// Numeric id of the authenticated user. Unset means guest mode.
    #[arg(long, env = "CHAT_USER_ID")]
    pub user_id: Option<i64>,

    /// Connect as an operator console (admin side of the conversation).
    #[arg(long, env = "CHAT_ADMIN", default_value = "false")]
    pub admin: bool,

    // --- Pagination Args ---
    /// Number of messages fetched per history page.
    #[arg(long, env = "CHAT_PAGE_SIZE", default_value = "20")]
    pub page_size: u32,

    // --- Reconnection Args ---
    /// Maximum automatic reconnection attempts before giving up.
    #[arg(long, env = "CHAT_RECONNECT_ATTEMPTS", default_value = "5")]
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnection attempts, in milliseconds.
    #[arg(long, env = "CHAT_RECONNECT_DELAY_MS", default_value = "2000")]
    pub reconnect_delay_ms: u64,

    // --- Delivery Args ---
    /// Seconds to wait for a send confirmation before the optimistic
    /// sent-anyway fallback kicks in.
    #[arg(long, env = "CHAT_SEND_TIMEOUT_SECS", default_value = "12")]
    pub send_timeout_secs: u64,

    // --- Presence Args ---
    /// Milliseconds an inbound typing indicator stays lit without a follow-up.
    #[arg(long, env = "CHAT_TYPING_TIMEOUT_MS", default_value = "3000")]
    pub typing_timeout_ms: u64,

    // --- Loading Indicator Args ---
    /// Minimum milliseconds the history loading indicator stays visible.
    #[arg(long, env = "CHAT_SPINNER_MIN_MS", default_value = "300")]
    pub spinner_min_ms: u64,

    /// Safety cap in milliseconds after which the loading indicator is
    /// force-cleared even if the request is still hanging.
    #[arg(long, env = "CHAT_SPINNER_MAX_MS", default_value = "10000")]
    pub spinner_max_ms: u64,

    // --- Local Storage Args ---
    /// Client-local storage backend for guest state (file, memory).
    #[arg(long, env = "CHAT_STORAGE_TYPE", default_value = "file")]
    pub storage_type: String,

    /// Path of the file backend holding the guest session id and any
    /// locally-cached unsent messages.
    #[arg(long, env = "CHAT_STORAGE_PATH", default_value = ".support-chat.json")]
    pub storage_path: String,

    /// Enable debug logging/output.
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
