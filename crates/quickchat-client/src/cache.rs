//! Durable per-identity peer cache
//!
//! Unseen counts, last-message previews, first-unread markers and the set of
//! opened peers survive restarts in `<data_root>/cache/<identity>.json`.

use crate::error::Result;
use crate::reconcile::PeerCacheState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Clones share one write lock, so writes to the file never interleave.
#[derive(Clone, Debug)]
pub struct PeerCache {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl PeerCache {
    pub fn for_identity(dir: impl AsRef<Path>, identity: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", file_stem(identity))),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache. A missing or unreadable file yields an empty cache.
    pub async fn load(&self) -> PeerCacheState {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No peer cache at {:?}", self.path);
                return PeerCacheState::default();
            }
            Err(e) => {
                warn!("Failed to read peer cache {:?}: {}", self.path, e);
                return PeerCacheState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => {
                info!("Loaded peer cache from {:?}", self.path);
                state
            }
            Err(e) => {
                warn!("Peer cache {:?} is corrupt, starting empty: {}", self.path, e);
                PeerCacheState::default()
            }
        }
    }

    /// Save the state returned by `snapshot`, taken once the write lock is
    /// held. The last writer always stores the newest state.
    pub async fn save_latest<F>(&self, snapshot: F) -> Result<()>
    where
        F: FnOnce() -> PeerCacheState,
    {
        let _guard = self.write_lock.lock().await;
        let state = snapshot();
        self.write(&state).await
    }

    async fn write(&self, state: &PeerCacheState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(state)?;

        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    pub async fn remove(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Identity reduced to characters safe in a file name.
fn file_stem(identity: &str) -> String {
    let stem: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "anonymous".to_string()
    } else {
        stem
    }
}
