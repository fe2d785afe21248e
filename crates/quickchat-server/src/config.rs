//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::hub::LiveHub;
use crate::store::MessageStore;

/// Environment variable holding the listen address.
pub const ADDR_ENV: &str = "QUICKCHAT_ADDR";

const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 5000);

/// Configuration for the QuickChat server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the HTTP + live channel listener binds to
    pub bind_addr: SocketAddr,
    /// Root data directory
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::env::var(ADDR_ENV)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| SocketAddr::from(DEFAULT_ADDR)),
            data_dir: quickchat_common::quickchat_root(),
        }
    }
}

impl ServerConfig {
    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        quickchat_common::store_dir(&self.data_dir)
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(self.store_dir()).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn MessageStore>,
    pub hub: LiveHub,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn MessageStore>) -> Self {
        Self {
            config,
            store,
            hub: LiveHub::new(),
        }
    }
}
