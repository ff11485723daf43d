//! # Tutorhub Realtime Crate
//!
//! Keeps at most one live WebSocket per signed-in user and hands every
//! parsed push event to a subscriber callback.
//!
//! - On open the client sends `"ping"`; the server's `"pong"` is consumed here.
//! - Every other JSON payload is forwarded verbatim.
//! - A socket that closes or errors drops out of tracking. Nothing reconnects
//!   on its own; the owner calls `create_connection` again.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tutorhub_realtime::{ConnectionManager, StaticToken};
//!
//! let manager = ConnectionManager::new("ws://127.0.0.1:8000/api", Arc::new(StaticToken::new(token)));
//! if !manager.has_any_websocket(&user_id) {
//!     manager.create_connection(&user_id, |payload| println!("{payload}"))?;
//! }
//! ```

pub mod error;
pub mod manager;
pub mod socket;
pub mod token;

pub use error::{RealtimeError, RealtimeResult};
pub use manager::ConnectionManager;
pub use socket::{ConnectionHandle, MessageHandler, SocketState, PING, PONG};
pub use token::{NoToken, StaticToken, TokenFile, TokenProvider};
