//! A single user socket: the handle callers hold and the task that drives it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{RealtimeError, RealtimeResult};

/// Liveness probe sent after the socket opens.
pub const PING: &str = "ping";
/// Server acknowledgement of `PING`; consumed, never forwarded.
pub const PONG: &str = "pong";

/// Callback receiving every parsed inbound payload except `PONG`.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Lifecycle of a socket, mirroring the browser's `readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SocketState {
    /// Connecting or open.
    pub fn is_live(self) -> bool {
        matches!(self, SocketState::Connecting | SocketState::Open)
    }
}

pub(crate) enum Command {
    Text(String),
    Close,
}

struct SocketShared {
    id: u64,
    user_id: String,
    state: watch::Sender<SocketState>,
    last_pong: Mutex<Option<DateTime<Utc>>>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Cheap handle on one socket. Dropping it does not close the socket.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<SocketShared>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("user_id", &self.shared.user_id)
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionHandle {
    pub(crate) fn new(id: u64, user_id: &str) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SocketState::Connecting);
        let handle = Self {
            shared: Arc::new(SocketShared {
                id,
                user_id: user_id.to_string(),
                state,
                last_pong: Mutex::new(None),
                commands,
            }),
        };
        (handle, receiver)
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn user_id(&self) -> &str {
        &self.shared.user_id
    }

    pub fn state(&self) -> SocketState {
        *self.shared.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SocketState::Open
    }

    /// When the server last answered a liveness probe.
    pub fn last_pong(&self) -> Option<DateTime<Utc>> {
        *self
            .shared
            .last_pong
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a text frame. Fails unless the socket is open.
    pub fn send_text(&self, text: impl Into<String>) -> RealtimeResult<()> {
        let not_open = RealtimeError::NotOpen {
            socket_id: self.shared.id,
        };
        if !self.is_open() {
            return Err(not_open);
        }
        self.shared
            .commands
            .send(Command::Text(text.into()))
            .map_err(|_| not_open)
    }

    /// Begin closing; also abandons a handshake still in progress. Idempotent.
    pub fn close(&self) {
        let started = self.shared.state.send_if_modified(|state| {
            if state.is_live() {
                *state = SocketState::Closing;
                true
            } else {
                false
            }
        });
        if started {
            let _ = self.shared.commands.send(Command::Close);
        }
    }

    /// Resolve once the socket has fully closed.
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|state| *state == SocketState::Closed).await;
    }

    /// Resolve once the socket is open; `false` if it closed instead.
    pub async fn opened(&self) -> bool {
        let mut state = self.shared.state.subscribe();
        let opened = match state
            .wait_for(|state| matches!(state, SocketState::Open | SocketState::Closed))
            .await
        {
            Ok(state) => *state == SocketState::Open,
            Err(_) => false,
        };
        opened
    }

    fn mark_open(&self) -> bool {
        self.shared.state.send_if_modified(|state| {
            if *state == SocketState::Connecting {
                *state = SocketState::Open;
                true
            } else {
                false
            }
        })
    }

    fn mark_closed(&self) {
        self.shared.state.send_replace(SocketState::Closed);
    }

    fn record_pong(&self) {
        *self
            .shared
            .last_pong
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }
}

/// Run one socket until it closes, then report back through `on_finish`.
pub(crate) async fn drive<F>(
    handle: ConnectionHandle,
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    handler: MessageHandler,
    ping_interval: Option<Duration>,
    on_finish: F,
) where
    F: FnOnce(&ConnectionHandle),
{
    let socket_id = handle.id();
    let user_id = handle.user_id().to_string();

    let stream = tokio::select! {
        result = connect_async(url) => match result {
            Ok((stream, _response)) => Some(stream),
            Err(error) => {
                warn!(socket_id, %user_id, %error, "websocket handshake failed");
                None
            }
        },
        _ = closed_while_connecting(&mut commands) => {
            debug!(socket_id, %user_id, "websocket closed before opening");
            None
        }
    };

    if let Some(stream) = stream {
        let (mut sink, mut inbound) = stream.split();

        if handle.mark_open() {
            debug!(socket_id, %user_id, "websocket open");
            let mut keepalive = ping_interval.map(|period| {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                interval
            });

            let mut alive = send_probe(&mut sink, socket_id).await;
            while alive {
                tokio::select! {
                    frame = inbound.next() => match frame {
                        Some(Ok(Message::Text(text))) => dispatch(&handle, &handler, &text),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => dispatch(&handle, &handler, &text),
                            Err(_) => warn!(socket_id, "dropping non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            debug!(socket_id, ?frame, "server closed websocket");
                            alive = false;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            warn!(socket_id, %error, "websocket error");
                            alive = false;
                        }
                        None => alive = false,
                    },
                    command = commands.recv() => match command {
                        Some(Command::Text(text)) => {
                            if let Err(error) = sink.send(Message::Text(text)).await {
                                warn!(socket_id, %error, "failed to send frame");
                                alive = false;
                            }
                        }
                        Some(Command::Close) | None => {
                            let _ = sink.close().await;
                            alive = false;
                        }
                    },
                    _ = tick(&mut keepalive) => {
                        alive = send_probe(&mut sink, socket_id).await;
                    }
                }
            }
        } else {
            // close() won the race against the handshake.
            let _ = sink.close().await;
        }
    }

    handle.mark_closed();
    on_finish(&handle);
    debug!(socket_id, %user_id, "websocket closed");
}

async fn closed_while_connecting(commands: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::Close) | None => return,
            Some(Command::Text(_)) => {}
        }
    }
}

async fn send_probe<S>(sink: &mut S, socket_id: u64) -> bool
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    match sink.send(Message::Text(PING.to_string())).await {
        Ok(()) => {
            trace!(socket_id, "sent liveness probe");
            true
        }
        Err(error) => {
            warn!(socket_id, %error, "failed to send liveness probe");
            false
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle one inbound text frame.
fn dispatch(handle: &ConnectionHandle, handler: &MessageHandler, text: &str) {
    match parse_frame(text) {
        Some(Frame::Pong) => {
            trace!(socket_id = handle.id(), "liveness acknowledged");
            handle.record_pong();
        }
        Some(Frame::Payload(value)) => handler(value),
        None => warn!(socket_id = handle.id(), "dropping non-JSON frame"),
    }
}

#[derive(Debug, PartialEq)]
enum Frame {
    Pong,
    Payload(Value),
}

fn parse_frame(text: &str) -> Option<Frame> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::String(inner)) if inner == PONG => Some(Frame::Pong),
        Ok(value) => Some(Frame::Payload(value)),
        Err(_) if text.trim() == PONG => Some(Frame::Pong),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pong_is_recognised_raw_and_json_encoded() {
        assert_eq!(parse_frame("pong"), Some(Frame::Pong));
        assert_eq!(parse_frame("\"pong\""), Some(Frame::Pong));
        assert_eq!(parse_frame(" pong\n"), Some(Frame::Pong));
    }

    #[test]
    fn other_json_is_forwarded_verbatim() {
        let text = r#"{"conversation_id":"c1","content":"hi","sender":"assistant","timestamp":"2024-03-01T10:00:00Z"}"#;
        assert_eq!(
            parse_frame(text),
            Some(Frame::Payload(serde_json::from_str(text).unwrap()))
        );
        assert_eq!(parse_frame("\"ping\""), Some(Frame::Payload(json!("ping"))));
    }

    #[test]
    fn non_json_is_dropped() {
        assert_eq!(parse_frame("hello there"), None);
    }

    #[test]
    fn close_is_idempotent_and_moves_to_closing() {
        let (handle, mut commands) = ConnectionHandle::new(1, "u1");
        assert_eq!(handle.state(), SocketState::Connecting);

        handle.close();
        handle.close();

        assert_eq!(handle.state(), SocketState::Closing);
        assert!(matches!(commands.try_recv(), Ok(Command::Close)));
        assert!(commands.try_recv().is_err());
    }

    #[test]
    fn send_text_requires_open_socket() {
        let (handle, _commands) = ConnectionHandle::new(7, "u1");
        let error = handle.send_text("hello").unwrap_err();
        assert!(matches!(error, RealtimeError::NotOpen { socket_id: 7 }));
    }

    #[test]
    fn mark_open_does_not_reopen_a_closing_socket() {
        let (handle, _commands) = ConnectionHandle::new(1, "u1");
        handle.close();
        assert!(!handle.mark_open());
        assert_eq!(handle.state(), SocketState::Closing);
    }
}
