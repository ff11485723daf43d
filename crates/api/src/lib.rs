//! # Tutorhub API Crate
//!
//! REST bindings for conversation history, message sending and the
//! conversation list. `ApiClient` implements the source traits from
//! `tutorhub-chats`, so timelines and caches can run against it directly.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
