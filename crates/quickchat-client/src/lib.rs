//! QuickChat Client Library
//!
//! The reconciliation store that merges REST snapshots, pushed live events
//! and local actions per conversation, together with the adapters it drives:
//! the HTTP message store client, the live channel, translation and the
//! durable peer cache.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod live;
pub mod reconcile;
pub mod throttle;
pub mod translate;

pub use api::{HttpMessageApi, MessageApi};
pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use live::LiveChannel;
pub use reconcile::{ConversationStatus, Effect, HistoryEntry, ReconciliationStore};
pub use translate::{translate_or_original, LibreTranslate, TranslationError, Translator};
