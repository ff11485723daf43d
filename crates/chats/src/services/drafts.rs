//! Unsent message drafts, persisted to a JSON file with debounced writes.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::types::{ChatResult, ConversationId};

#[derive(Clone)]
pub struct DraftStore {
    inner: Arc<DraftInner>,
}

struct DraftInner {
    path: PathBuf,
    debounce: Duration,
    drafts: Mutex<BTreeMap<ConversationId, String>>,
    generation: AtomicU64,
    write_lock: tokio::sync::Mutex<()>,
}

impl DraftStore {
    /// Open the store at `path`; a missing file is an empty store.
    pub async fn load(path: impl Into<PathBuf>, debounce: Duration) -> ChatResult<Self> {
        let path = path.into();
        let drafts = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };

        debug!(path = %path.display(), count = drafts.len(), "loaded drafts");
        Ok(Self {
            inner: Arc::new(DraftInner {
                path,
                debounce,
                drafts: Mutex::new(drafts),
                generation: AtomicU64::new(0),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn get(&self, conversation_id: &str) -> Option<String> {
        self.inner.lock().get(conversation_id).cloned()
    }

    /// Update the draft now and schedule a write once edits settle.
    ///
    /// Empty text removes the draft. Must be called inside a tokio runtime.
    pub fn set(&self, conversation_id: &str, text: &str) {
        {
            let mut drafts = self.inner.lock();
            if text.is_empty() {
                drafts.remove(conversation_id);
            } else {
                drafts.insert(conversation_id.to_string(), text.to_string());
            }
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(error) = inner.persist().await {
                warn!(path = %inner.path.display(), %error, "failed to persist drafts");
            }
        });
    }

    pub fn clear(&self, conversation_id: &str) {
        self.set(conversation_id, "");
    }

    /// Write immediately, superseding any scheduled write.
    pub async fn flush(&self) -> ChatResult<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.persist().await
    }
}

impl DraftInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ConversationId, String>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn persist(&self) -> ChatResult<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let drafts = self.lock();
            serde_json::to_vec_pretty(&*drafts)?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, snapshot).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        debug!(path = %self.path.display(), "persisted drafts");
        Ok(())
    }
}
