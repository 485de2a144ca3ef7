pub mod cli;
pub mod connection;
pub mod delivery;
pub mod error;
pub mod history;
pub mod identity;
pub mod models;
pub mod presence;
pub mod session;
pub mod storage;
pub mod store;
pub mod unread;

use cli::Args;
use connection::{ ConnectionEvent, ConnectionManager, ReconnectPolicy, build_endpoint, status_text, ConnectionState };
use history::RestHistoryApi;
use identity::IdentityResolver;
use log::info;
use session::{ Channel, ChatSession, SessionSettings };
use std::error::Error;
use std::sync::Arc;
use std::time::{ Duration, Instant };
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::mpsc;

/// Run the terminal chat console: connect with the configured identity,
/// stream the conversation, and send stdin lines as messages.
pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Chat Core Configuration ---");
    info!("Realtime URL: {}", args.ws_url);
    info!("REST API URL: {}", args.api_url);
    info!("Tenant: {}", args.tenant_id);
    info!("Identity: {}", match args.user_id {
        Some(id) if args.admin => format!("admin (user {})", id),
        Some(id) => format!("user {}", id),
        None => "guest".to_string(),
    });
    info!("Page Size: {}", args.page_size);
    info!("Reconnect: {} attempts, {}ms apart", args.reconnect_attempts, args.reconnect_delay_ms);
    info!("Send Timeout: {}s", args.send_timeout_secs);
    info!("Storage: {} ({})", args.storage_type, args.storage_path);
    info!("-------------------------------");

    let storage = storage::create_storage(&args)?;
    let resolver = IdentityResolver::new(storage);
    let identity = resolver.resolve(args.user_id, args.admin).await?;
    let history = Arc::new(RestHistoryApi::new(&args)?);

    let policy = ReconnectPolicy {
        max_attempts: args.reconnect_attempts,
        delay: Duration::from_millis(args.reconnect_delay_ms),
    };
    let endpoint = build_endpoint(&args.ws_url, &identity, &args.tenant_id)?;
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut manager = ConnectionManager::new(policy);
    manager.connect(endpoint, events_tx);
    let manager = Arc::new(manager);

    let mut session = ChatSession::new(
        identity,
        resolver,
        history,
        Arc::clone(&manager) as Arc<dyn Channel>,
        SessionSettings::from_args(&args)
    );
    session.bootstrap().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_millis(250));
    let mut rendered = 0usize;
    let mut viewing: Option<i64> = None;

    println!("Type a message and press enter. /quit to exit.");
    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                match &event {
                    ConnectionEvent::Connected { .. } => {
                        println!("[{}]", status_text(ConnectionState::Connected));
                    }
                    ConnectionEvent::Disconnected => {
                        println!("[{}]", status_text(ConnectionState::Reconnecting));
                    }
                    ConnectionEvent::GaveUp => {
                        println!("[{}]", status_text(ConnectionState::Disconnected));
                    }
                    ConnectionEvent::Server(_) => {}
                }
                session.handle_event(event, Instant::now()).await;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) => {
                        if let Err(e) = session.send_message(&line, Instant::now()).await {
                            println!("[not sent: {}]", e);
                        }
                    }
                    None => break,
                }
            }
            _ = tick.tick() => {
                session.sweep(Instant::now());
            }
        }

        // Keep the console view pinned to the conversation once it exists.
        if viewing.is_none() {
            if let Some(conversation_id) = session.identity().conversation_id() {
                session.open_view(conversation_id);
                viewing = Some(conversation_id);
            }
        }

        let messages = session.messages();
        if messages.len() < rendered {
            rendered = 0;
        }
        for message in &messages[rendered..] {
            println!("{:>8?} | {}", message.sender_type, message.message);
        }
        rendered = messages.len();
    }

    info!("Chat console closed");
    Ok(())
}
