//! Per-staging-path locks.
//!
//! Two writers whose destinations share a staging path (same final path,
//! or same stem in the same directory) take turns instead of interleaving
//! into one temp file. The later writer's rename still wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::staged_path;

/// Held while writing through a staging path.
pub type StagingGuard = OwnedMutexGuard<()>;

/// Registry of staging-path locks, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct StagingLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>>,
}

impl StagingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive use of the staging path of `final_path`.
    pub async fn lock(&self, final_path: &Path) -> StagingGuard {
        let key = staged_path(final_path);
        let slot = {
            let mut map = self.inner.lock().await;
            map.retain(|_, weak| weak.strong_count() > 0);
            match map.get(&key).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    let slot = Arc::new(Mutex::new(()));
                    map.insert(key, Arc::downgrade(&slot));
                    slot
                }
            }
        };
        slot.lock_owned().await
    }

    /// Number of staging paths currently held or awaited.
    pub async fn active(&self) -> usize {
        let map = self.inner.lock().await;
        map.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
