//! Shared types and directory layout for QuickChat
//!
//! Directory layout:
//! ```text
//! quickchat_data/
//! ├── store/           # Reference message store (server)
//! └── cache/           # Per-identity peer cache (client)
//! ```

pub mod events;
pub mod models;

pub use events::{ClientEvent, ServerEvent};
pub use models::{
    ConnectionId, ConversationSummary, Message, MessageId, SendMessageInput, UserId,
    DEFAULT_LANGUAGE,
};

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable overriding the data root.
pub const ROOT_ENV: &str = "QUICKCHAT_ROOT";

#[derive(Deserialize, Debug)]
struct QuickChatConfig {
    data_root: Option<PathBuf>,
}

fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("quickchat").join("config.json"))
}

/// Load the persisted data root, if one was saved.
pub fn load_persistent_root() -> Option<PathBuf> {
    let path = get_config_path()?;
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str::<QuickChatConfig>(&content) {
            Ok(config) => config.data_root,
            Err(e) => {
                warn!("Failed to parse config file at {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read config file at {:?}: {}", path, e);
            None
        }
    }
}

/// Data root from environment, persisted config, or default.
pub fn quickchat_root() -> PathBuf {
    if let Ok(val) = std::env::var(ROOT_ENV) {
        if !val.trim().is_empty() {
            return PathBuf::from(val);
        }
    }

    if let Some(root) = load_persistent_root() {
        return root;
    }

    PathBuf::from("quickchat_data")
}

/// Message store directory under `root`.
pub fn store_dir(root: &Path) -> PathBuf {
    root.join("store")
}

/// Peer cache directory under `root`.
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join("cache")
}
