/// ChatLink - Two-party chat client core
///
/// Conversation synchronization, the send/edit/delete command protocol,
/// and presence inference over a snapshot-pushing remote message store.

pub mod api;
pub mod client;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod message_store;
pub mod presence;
pub mod remote_store;
pub mod roster;
pub mod session;
pub mod sync;
pub mod types;

pub use client::ChatClient;
pub use config::Config;
pub use error::{ChatError, Result};
