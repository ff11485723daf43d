//! At most one live WebSocket per user, shared by everything in the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{RealtimeError, RealtimeResult};
use crate::socket::{self, ConnectionHandle, MessageHandler, SocketState};
use crate::token::TokenProvider;

/// Sockets known for each user.
#[derive(Default)]
struct Registry {
    /// The socket created by the latest `create_connection`
    active: HashMap<String, ConnectionHandle>,
    /// Every socket not yet closed, including handshakes still in progress
    sockets: HashMap<String, Vec<ConnectionHandle>>,
}

impl Registry {
    fn take(&mut self, user_id: &str) -> Vec<ConnectionHandle> {
        let mut handles = self.sockets.remove(user_id).unwrap_or_default();
        if let Some(active) = self.active.remove(user_id) {
            if !handles.iter().any(|handle| handle.id() == active.id()) {
                handles.push(active);
            }
        }
        handles
    }

    fn forget(&mut self, user_id: &str, socket_id: u64) {
        if let Some(handles) = self.sockets.get_mut(user_id) {
            handles.retain(|handle| handle.id() != socket_id);
            if handles.is_empty() {
                self.sockets.remove(user_id);
            }
        }
        if self
            .active
            .get(user_id)
            .is_some_and(|handle| handle.id() == socket_id)
        {
            self.active.remove(user_id);
        }
    }

    fn handshake_in_flight(&self, user_id: &str) -> bool {
        self.sockets.get(user_id).is_some_and(|handles| {
            handles
                .iter()
                .any(|handle| handle.state() == SocketState::Connecting)
        })
    }
}

/// Opens, tracks and tears down per-user sockets.
///
/// Clones share the same registry. Methods that open sockets spawn onto the
/// current tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    ws_base_url: String,
    ping_interval: Option<Duration>,
    tokens: Arc<dyn TokenProvider>,
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionManager {
    pub fn new(ws_base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
            ping_interval: None,
            tokens,
            registry: Arc::new(Mutex::new(Registry::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Repeat the liveness probe every `interval` while a socket is open.
    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Open a fresh socket for `user_id`, closing whatever was there before.
    ///
    /// Returns `Ok(None)` while another handshake for the user is still in
    /// progress, or when no access token is available.
    pub fn create_connection<F>(
        &self,
        user_id: &str,
        on_message: F,
    ) -> RealtimeResult<Option<ConnectionHandle>>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if self.lock().handshake_in_flight(user_id) {
            debug!(%user_id, "connection attempt already in flight");
            return Ok(None);
        }

        // Token providers may block or call back into the manager; keep them
        // outside the registry lock.
        let Some(token) = self.tokens.access_token() else {
            warn!(%user_id, "no access token, not connecting");
            return Ok(None);
        };
        let url = self.socket_url(user_id, &token)?;

        let mut registry = self.lock();
        if registry.handshake_in_flight(user_id) {
            debug!(%user_id, "connection attempt already in flight");
            return Ok(None);
        }

        let previous = registry.take(user_id);
        if !previous.is_empty() {
            debug!(%user_id, count = previous.len(), "closing previous sockets");
        }
        for handle in &previous {
            handle.close();
        }

        let socket_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (handle, commands) = ConnectionHandle::new(socket_id, user_id);
        registry
            .active
            .insert(user_id.to_string(), handle.clone());
        registry
            .sockets
            .entry(user_id.to_string())
            .or_default()
            .push(handle.clone());
        drop(registry);

        let handler: MessageHandler = Arc::new(on_message);
        let registry = Arc::clone(&self.registry);
        let owner = user_id.to_string();
        tokio::spawn(socket::drive(
            handle.clone(),
            url.to_string(),
            commands,
            handler,
            self.ping_interval,
            move |finished: &ConnectionHandle| {
                lock_registry(&registry).forget(&owner, finished.id());
            },
        ));

        info!(%user_id, socket_id, "websocket connecting");
        Ok(Some(handle))
    }

    /// Close the active socket and every other socket still tracked for `user_id`.
    ///
    /// Safe to call when nothing is open.
    pub fn close_connection(&self, user_id: &str) {
        let handles = self.lock().take(user_id);
        if handles.is_empty() {
            return;
        }

        for handle in &handles {
            handle.close();
        }
        info!(%user_id, count = handles.len(), "websocket connections closed");
    }

    /// Close every socket for every user.
    pub fn close_all(&self) {
        let users: Vec<String> = {
            let registry = self.lock();
            registry
                .sockets
                .keys()
                .chain(registry.active.keys())
                .cloned()
                .collect()
        };
        for user_id in users {
            self.close_connection(&user_id);
        }
    }

    /// Whether the user's active socket is open.
    pub fn has_connection(&self, user_id: &str) -> bool {
        self.lock()
            .active
            .get(user_id)
            .is_some_and(ConnectionHandle::is_open)
    }

    /// Whether any socket for the user is connecting or open.
    pub fn has_any_websocket(&self, user_id: &str) -> bool {
        self.lock().sockets.get(user_id).is_some_and(|handles| {
            handles.iter().any(|handle| handle.state().is_live())
        })
    }

    /// The socket created by the latest `create_connection`, if still tracked.
    pub fn connection(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.lock().active.get(user_id).cloned()
    }

    /// `{ws_base}/conversations/ws/user/{user_id}?token={token}`
    pub fn socket_url(&self, user_id: &str, token: &str) -> RealtimeResult<Url> {
        let mut url = Url::parse(&self.ws_base_url)?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(RealtimeError::InvalidUrl(format!(
                    "unsupported scheme {other}"
                )))
            }
        };
        if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
            return Err(RealtimeError::InvalidUrl(format!(
                "cannot use scheme {scheme} for {}",
                self.ws_base_url
            )));
        }

        url.path_segments_mut()
            .map_err(|_| RealtimeError::InvalidUrl(self.ws_base_url.clone()))?
            .pop_if_empty()
            .extend(["conversations", "ws", "user", user_id]);
        url.query_pairs_mut().clear().append_pair("token", token);

        Ok(url)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        lock_registry(&self.registry)
    }
}

fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}
