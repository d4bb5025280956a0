//! Durable dedup state: the set of submission identifiers that have already
//! been delivered (or terminally given up on). The engine consults it
//! before processing and commits to it after a terminal delivery outcome.
//!
//! A missed duplicate causes a repeat notification, so false negatives are
//! not tolerated: `commit` only reports success once the identifier is on
//! disk, and rolls the in-memory insert back if the durable write fails.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("dedup state write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("dedup state serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait DedupStore: Send + Sync {
    async fn contains(&self, id: &str) -> bool;
    /// Idempotent. On `Ok` the identifier is durable; on `Err` it is as if
    /// the call never happened.
    async fn commit(&self, id: &str) -> Result<(), DedupError>;
}

/// Eviction floor: a capacity below this would let a still-listed
/// submission be forgotten between cycles.
const MIN_CAPACITY: usize = 1_000;

#[derive(Debug, Default)]
struct State {
    set: HashSet<String>,
    /// Arrival order, for FIFO eviction when capped.
    order: VecDeque<String>,
}

/// File-backed store: a JSON array of identifier strings, loaded fully at
/// startup, rewritten atomically (temp file + rename) on every commit.
/// Flush-per-commit is fine at this volume.
pub struct JsonFileDedupStore {
    path: PathBuf,
    capacity: Option<usize>,
    state: Mutex<State>,
}

impl JsonFileDedupStore {
    /// Load the persisted set. A missing file means a fresh start; an
    /// unreadable or corrupt file is fatal — silently starting empty would
    /// re-notify everything.
    pub async fn open(path: impl Into<PathBuf>, capacity: Option<usize>) -> anyhow::Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let ids: Vec<String> = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt dedup state at {}", path.display()))?;
                let mut state = State::default();
                for id in ids {
                    if state.set.insert(id.clone()) {
                        state.order.push_back(id);
                    }
                }
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading dedup state at {}", path.display()))
            }
        };

        Ok(Self {
            path,
            capacity: capacity.map(|c| c.max(MIN_CAPACITY)),
            state: Mutex::new(state),
        })
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.set.len()
    }

    async fn flush(path: &Path, state: &State) -> Result<(), DedupError> {
        let ids: Vec<&String> = state.order.iter().collect();
        let raw = serde_json::to_vec(&ids)?;
        let tmp = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DedupStore for JsonFileDedupStore {
    async fn contains(&self, id: &str) -> bool {
        self.state.lock().await.set.contains(id)
    }

    async fn commit(&self, id: &str) -> Result<(), DedupError> {
        let mut state = self.state.lock().await;
        if state.set.contains(id) {
            return Ok(());
        }
        state.set.insert(id.to_string());
        state.order.push_back(id.to_string());

        let evicted = match self.capacity {
            Some(cap) if state.order.len() > cap => {
                let old = state.order.pop_front();
                if let Some(ref old_id) = old {
                    state.set.remove(old_id);
                }
                old
            }
            _ => None,
        };

        if let Err(e) = Self::flush(&self.path, &state).await {
            // roll back so a retry next cycle still sees the id as new
            state.set.remove(id);
            state.order.pop_back();
            if let Some(old_id) = evicted {
                state.set.insert(old_id.clone());
                state.order.push_front(old_id);
            }
            return Err(e);
        }
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    state: Mutex<HashSet<String>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> HashSet<String> {
        self.state.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn contains(&self, id: &str) -> bool {
        self.state.lock().await.contains(id)
    }

    async fn commit(&self, id: &str) -> Result<(), DedupError> {
        self.state.lock().await.insert(id.to_string());
        Ok(())
    }
}
