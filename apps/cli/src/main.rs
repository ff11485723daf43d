mod console;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tutorhub_chats::{
    ConversationCache, ConversationEvent, DraftStore, EventOutcome, MessageSink,
    SendMessageRequest, Timeline,
};
use tutorhub_config::{load as load_config, AppConfig};
use tutorhub_runtime::{shutdown_signal, telemetry, ClientServices};

use console::{parse_input, render_conversation, render_message, Input};

#[derive(Parser)]
#[command(name = "tutorhub")]
#[command(about = "Terminal client for Tutorhub conversations")]
struct Cli {
    /// Id of the signed-in user
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Access token; overrides auth settings from the configuration
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a conversation and chat interactively
    Chat { conversation_id: String },
    /// Print every live event for the user until Ctrl-C
    Listen,
    /// List the user's conversations
    Conversations,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;

    let mut config = load_config().context("failed to load configuration")?;
    if let Some(token) = cli.token {
        config.auth.access_token = Some(token);
    }

    let services =
        ClientServices::initialise(&config).context("failed to initialise client services")?;

    let result = match cli.command {
        Commands::Chat { conversation_id } => {
            let user_id = require_user(cli.user_id)?;
            run_chat(&config, &services, &user_id, &conversation_id).await
        }
        Commands::Listen => {
            let user_id = require_user(cli.user_id)?;
            run_listen(&services, &user_id).await
        }
        Commands::Conversations => list_conversations(&services).await,
    };

    services.realtime.close_all();
    result
}

fn require_user(user_id: Option<String>) -> Result<String> {
    user_id.context("--user-id is required for this command")
}

/// Subscribe to the user's socket and funnel payloads into a channel.
///
/// `Ok(None)` when no socket could be opened (signed out, or a handshake for
/// the user is already in progress).
fn subscribe(
    services: &ClientServices,
    user_id: &str,
) -> Result<Option<mpsc::UnboundedReceiver<Value>>> {
    if services.realtime.has_any_websocket(user_id) {
        bail!("a websocket for user {user_id} is already tracked by this process");
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = services
        .realtime
        .create_connection(user_id, move |payload| {
            let _ = tx.send(payload);
        })
        .context("failed to open websocket")?;

    match handle {
        Some(handle) => {
            debug!(%user_id, socket_id = handle.id(), "subscribed to live events");
            Ok(Some(rx))
        }
        None => {
            warn!(%user_id, "live updates unavailable");
            Ok(None)
        }
    }
}

async fn run_chat(
    config: &AppConfig,
    services: &ClientServices,
    user_id: &str,
    conversation_id: &str,
) -> Result<()> {
    let drafts = DraftStore::load(&config.drafts.path, config.drafts.debounce())
        .await
        .with_context(|| format!("failed to load drafts from {}", config.drafts.path))?;

    let mut timeline = Timeline::new(conversation_id, user_id, config.chat.page_size);
    timeline
        .load_initial(&services.api)
        .await
        .context("failed to load message history")?;

    for message in timeline.messages() {
        println!("{}", render_message(message, user_id));
    }
    if let Some(draft) = drafts.get(conversation_id) {
        println!("(draft) {draft}");
    }

    // Without a socket the receiver is closed and its select branch stays disabled.
    let mut events = subscribe(services, user_id)?.unwrap_or_else(|| {
        println!("(live updates unavailable)");
        mpsc::unbounded_channel().1
    });
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(%conversation_id, messages = timeline.len(), "chat open");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::More => {
                        if timeline.is_exhausted() {
                            println!("(no older messages)");
                            continue;
                        }
                        let loaded = timeline
                            .load_more(&services.api)
                            .await
                            .context("failed to load older messages")?;
                        for message in &timeline.messages()[..loaded.prepended] {
                            println!("{}", render_message(message, user_id));
                        }
                        if loaded.exhausted {
                            println!("(start of conversation)");
                        }
                    }
                    Input::Draft(text) => drafts.set(conversation_id, &text),
                    Input::Send(text) => {
                        send(&mut timeline, services, user_id, SendMessageRequest::new(text)).await;
                        drafts.clear(conversation_id);
                    }
                }
            }
            Some(payload) = events.recv() => {
                let event = match ConversationEvent::from_value(payload) {
                    Ok(event) => event,
                    Err(error) => {
                        debug!(%error, "ignoring unrecognised payload");
                        continue;
                    }
                };
                if timeline.apply_event(&event) == EventOutcome::Appended {
                    if let Some(message) = timeline.messages().last() {
                        println!("{}", render_message(message, user_id));
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    services.realtime.close_connection(user_id);
    drafts.flush().await.context("failed to save drafts")?;
    Ok(())
}

async fn send(
    timeline: &mut Timeline,
    services: &ClientServices,
    user_id: &str,
    request: SendMessageRequest,
) {
    let pending = match timeline.begin_send(request) {
        Ok(pending) => pending,
        Err(error) => {
            println!("(not sent: {error})");
            return;
        }
    };
    if let Some(message) = timeline.messages().last() {
        println!("{}", render_message(message, user_id));
    }

    let sent = services
        .api
        .send_message(timeline.conversation_id(), &pending.request)
        .await;
    let outcome = match sent {
        Ok(confirmed) => timeline.confirm_send(&pending.local_id, confirmed),
        Err(error) => {
            warn!(%error, "send failed");
            println!("(send failed: {error})");
            timeline.fail_send(&pending.local_id)
        }
    };
    if let Err(error) = outcome {
        warn!(%error, "optimistic entry went missing");
    }
}

async fn run_listen(services: &ClientServices, user_id: &str) -> Result<()> {
    let mut cache = ConversationCache::new();
    if let Err(error) = cache.refresh(&services.api).await {
        warn!(%error, "conversation list unavailable");
    }

    let mut events = subscribe(services, user_id)?
        .context("cannot listen: no access token or a connection attempt is already in progress")?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            payload = events.recv() => {
                let Some(payload) = payload else {
                    println!("(connection closed)");
                    break;
                };
                let Ok(event) = ConversationEvent::from_value(payload.clone()) else {
                    println!("{payload}");
                    continue;
                };

                if !cache.record_event(&event) {
                    if let Err(error) = cache.ensure_fresh(&services.api).await {
                        warn!(%error, "conversation refresh failed");
                    }
                }
                let title = cache
                    .get(&event.conversation_id)
                    .and_then(|conversation| conversation.title.clone())
                    .unwrap_or_else(|| event.conversation_id.clone());
                println!("[{title}] {}: {}", event.sender, event.content);
            }
            _ = &mut shutdown => break,
        }
    }

    services.realtime.close_connection(user_id);
    Ok(())
}

async fn list_conversations(services: &ClientServices) -> Result<()> {
    let mut cache = ConversationCache::new();
    cache
        .refresh(&services.api)
        .await
        .context("failed to fetch conversations")?;

    if cache.list().is_empty() {
        println!("No conversations");
    }
    for conversation in cache.list() {
        println!("{}", render_conversation(conversation));
    }
    Ok(())
}
