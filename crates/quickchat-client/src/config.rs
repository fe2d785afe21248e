//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

pub const SERVER_URL_ENV: &str = "QUICKCHAT_SERVER_URL";
pub const TRANSLATE_URL_ENV: &str = "QUICKCHAT_TRANSLATE_URL";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the QuickChat server (REST and live channel)
    pub server_url: String,
    /// Base URL of a LibreTranslate-compatible service
    pub translate_url: String,
    /// Upper bound on a single translation call
    pub translate_timeout: Duration,
    /// Minimum gap between outgoing typing hints to one peer
    pub typing_throttle: Duration,
    /// How long a received typing hint stays visible without renewal
    pub typing_expiry: Duration,
    /// Root data directory (peer cache lives below it)
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: std::env::var(SERVER_URL_ENV)
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),
            translate_url: std::env::var(TRANSLATE_URL_ENV)
                .unwrap_or_else(|_| "http://localhost:5001".to_string()),
            translate_timeout: Duration::from_secs(4),
            typing_throttle: Duration::from_millis(150),
            typing_expiry: Duration::from_millis(3000),
            data_dir: quickchat_common::quickchat_root(),
        }
    }
}

impl ClientConfig {
    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        quickchat_common::cache_dir(&self.data_dir)
    }
}
