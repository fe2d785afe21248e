//! HTTP and live-channel handlers

pub mod live;
pub mod messages;

pub use crate::config::AppState;

pub use live::live_socket;
pub use messages::{get_history, list_conversations, mark_seen, send_message, CallerId};
