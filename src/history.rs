//! history.rs: persisted reading history and viewed-id exclusion set.
//!
//! Two independent collections, each stored under its own key as a JSON list
//! of strings:
//! - `history_contents`: most-recent-first content fragments, deduplicated by
//!   exact match, capped at `max_history`.
//! - `viewed_post_ids`: oldest-first ids, capped at `max_viewed` with FIFO
//!   eviction.
//!
//! Every read goes through the backend so a fresh process sees what the last
//! one wrote. A single mutex serializes read-modify-write cycles.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{FeedError, Result};
use crate::model::ItemId;
use crate::telemetry::anon_hash;

pub const KEY_HISTORY: &str = "history_contents";
pub const KEY_VIEWED_IDS: &str = "viewed_post_ids";

pub const DEFAULT_MAX_HISTORY: usize = 50;
pub const DEFAULT_MAX_VIEWED: usize = 200;
pub const DEFAULT_HISTORY_FOR_SCORING: usize = 10;

/// Opaque key-value persistence used by the store.
pub trait KvBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn store(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One `<key>.json` file per key under `dir`. Writes go through a temp file
/// and a rename so a crash never leaves a half-written list behind.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(value.as_bytes())?;
        f.sync_all()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local backend for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let m = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(m.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        let mut m = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        m.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut m = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        m.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryLimits {
    pub max_history: usize,
    pub max_viewed: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            max_viewed: DEFAULT_MAX_VIEWED,
        }
    }
}

pub struct HistoryStore {
    backend: Box<dyn KvBackend>,
    limits: HistoryLimits,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(backend: Box<dyn KvBackend>, limits: HistoryLimits) -> Self {
        Self {
            backend,
            limits: HistoryLimits {
                max_history: limits.max_history.max(1),
                max_viewed: limits.max_viewed.max(1),
            },
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()), HistoryLimits::default())
    }

    /// Runs `op` on the blocking pool so backend I/O and the write lock never
    /// stall a runtime worker. Async callers go through this.
    pub async fn blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T>
    where
        F: FnOnce(&HistoryStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| FeedError::Persistence(format!("history task failed: {e}")))?
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `text` at the front, dropping any exact duplicate. Blank input is ignored.
    pub fn record_content(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let _g = self.guard();
        let mut history = self.load_list(KEY_HISTORY)?;
        history.retain(|h| h != text);
        history.insert(0, text.to_string());
        history.truncate(self.limits.max_history);
        self.save_list(KEY_HISTORY, &history)?;
        debug!(
            target: "history",
            id = %anon_hash(text),
            count = history.len(),
            "content recorded"
        );
        Ok(())
    }

    /// Up to `max_items` contents, most recent first.
    pub fn recent_contents(&self, max_items: usize) -> Result<Vec<String>> {
        let mut history = self.load_list(KEY_HISTORY)?;
        history.truncate(max_items);
        Ok(history)
    }

    /// Add `id` to the exclusion set. Re-marking moves the id to the newest slot.
    pub fn mark_viewed(&self, id: &ItemId) -> Result<()> {
        let _g = self.guard();
        let mut ids = self.load_list(KEY_VIEWED_IDS)?;
        ids.retain(|v| v != id.as_str());
        ids.push(id.as_str().to_string());
        if ids.len() > self.limits.max_viewed {
            let excess = ids.len() - self.limits.max_viewed;
            ids.drain(0..excess);
        }
        self.save_list(KEY_VIEWED_IDS, &ids)?;
        debug!(target: "history", %id, viewed = ids.len(), "id marked viewed");
        Ok(())
    }

    pub fn viewed_ids(&self) -> Result<HashSet<ItemId>> {
        Ok(self
            .load_list(KEY_VIEWED_IDS)?
            .into_iter()
            .map(ItemId)
            .collect())
    }

    /// Empty both collections under one lock.
    pub fn clear(&self) -> Result<()> {
        let _g = self.guard();
        self.backend.remove(KEY_HISTORY)?;
        self.backend.remove(KEY_VIEWED_IDS)?;
        debug!(target: "history", "history cleared");
        Ok(())
    }

    pub fn history_count(&self) -> Result<usize> {
        Ok(self.load_list(KEY_HISTORY)?.len())
    }

    pub fn viewed_count(&self) -> Result<usize> {
        Ok(self.load_list(KEY_VIEWED_IDS)?.len())
    }

    fn load_list(&self, key: &str) -> Result<Vec<String>> {
        let Some(raw) = self.backend.load(key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(v) => Ok(v),
            Err(e) => {
                // Corrupt payload reads as empty; the next write replaces it.
                warn!(target: "history", key, error = %e, "discarding unreadable history payload");
                Ok(Vec::new())
            }
        }
    }

    fn save_list(&self, key: &str, list: &[String]) -> Result<()> {
        let json =
            serde_json::to_string(list).map_err(|e| FeedError::Persistence(e.to_string()))?;
        self.backend.store(key, &json)
    }
}
