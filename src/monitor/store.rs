use crate::monitor::error::{MonitorError, MonitorResult};
use crate::types::Cursor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Per-venue pagination cursors plus the set of already processed keys.
///
/// Failures are fatal for the calling venue's current pass.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, venue: &str) -> MonitorResult<Option<Cursor>>;

    async fn set(&self, venue: &str, cursor: Option<Cursor>) -> MonitorResult<()>;

    async fn seen(&self, key: &str) -> MonitorResult<bool>;

    /// Record `key` as processed. Returns `true` only for the call that
    /// inserted it, so concurrent callers can use it to claim a key.
    async fn mark_seen(&self, key: &str) -> MonitorResult<bool>;
}

/// Process-local store; everything is lost on restart
#[derive(Default)]
pub struct MemoryStore {
    cursors: Mutex<HashMap<String, Cursor>>,
    seen: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get(&self, venue: &str) -> MonitorResult<Option<Cursor>> {
        Ok(self.cursors.lock().unwrap_or_else(|e| e.into_inner()).get(venue).cloned())
    }

    async fn set(&self, venue: &str, cursor: Option<Cursor>) -> MonitorResult<()> {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        match cursor {
            Some(cursor) => {
                cursors.insert(venue.to_string(), cursor);
            }
            None => {
                cursors.remove(venue);
            }
        }
        Ok(())
    }

    async fn seen(&self, key: &str) -> MonitorResult<bool> {
        Ok(self.seen.lock().unwrap_or_else(|e| e.into_inner()).contains(key))
    }

    async fn mark_seen(&self, key: &str) -> MonitorResult<bool> {
        Ok(self
            .seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string()))
    }
}

/// On-disk cursor document
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    cursors: BTreeMap<String, Cursor>,

    /// Seen keys written by older versions; moved to the journal on open
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    seen: HashSet<String>,
}

struct FileState {
    cursors: BTreeMap<String, Cursor>,
    seen: HashSet<String>,
    journal: tokio::fs::File,
}

/// File-backed store.
///
/// Cursors live in one JSON document that is rewritten through a sibling
/// temp file and a rename on every `set`. Seen keys are appended to a
/// JSON-lines journal next to it (`<name>.seen.jsonl`), one key per line,
/// which is deduplicated and rewritten once when the store is opened.
pub struct JsonFileStore {
    path: PathBuf,
    state: tokio::sync::Mutex<FileState>,
}

impl JsonFileStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> MonitorResult<Self> {
        let path = path.as_ref().to_path_buf();
        let journal_path = journal_path(&path);

        let mut document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoreDocument>(&bytes).map_err(|e| {
                MonitorError::Store(format!("Corrupt store file {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Store {:?} not found, starting empty", path);
                StoreDocument::default()
            }
            Err(e) => return Err(e.into()),
        };

        let legacy = std::mem::take(&mut document.seen);
        let migrated = !legacy.is_empty();
        let mut seen = read_journal(&journal_path).await?;
        seen.extend(legacy);

        compact_journal(&journal_path, &seen).await?;
        if migrated {
            write_document(&path, &document).await?;
            info!("Moved seen keys of {:?} into {:?}", path, journal_path);
        }

        info!(
            "Loaded store {:?}: {} cursors, {} seen keys",
            path,
            document.cursors.len(),
            seen.len()
        );

        let journal = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .await?;

        Ok(Self {
            path,
            state: tokio::sync::Mutex::new(FileState {
                cursors: document.cursors,
                seen,
                journal,
            }),
        })
    }
}

fn journal_path(path: &Path) -> PathBuf {
    path.with_extension("seen.jsonl")
}

/// Load every key of the journal. A line that does not parse is the tail of
/// an interrupted append and is dropped.
async fn read_journal(path: &Path) -> MonitorResult<HashSet<String>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };

    let mut seen = HashSet::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<String>(line) {
            Ok(key) => {
                seen.insert(key);
            }
            Err(e) => warn!("Skipping unreadable journal line in {:?}: {}", path, e),
        }
    }
    Ok(seen)
}

async fn compact_journal(path: &Path, seen: &HashSet<String>) -> MonitorResult<()> {
    let mut text = String::new();
    for key in seen {
        text.push_str(&serde_json::to_string(key)?);
        text.push('\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    tokio::fs::write(&tmp, text).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!("Compacted journal {:?} to {} keys", path, seen.len());
    Ok(())
}

async fn write_document(path: &Path, document: &StoreDocument) -> MonitorResult<()> {
    let bytes = serde_json::to_vec(document)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!("Persisted cursors to {:?}", path);
    Ok(())
}

#[async_trait]
impl CursorStore for JsonFileStore {
    async fn get(&self, venue: &str) -> MonitorResult<Option<Cursor>> {
        Ok(self.state.lock().await.cursors.get(venue).cloned())
    }

    async fn set(&self, venue: &str, cursor: Option<Cursor>) -> MonitorResult<()> {
        let mut state = self.state.lock().await;
        match cursor {
            Some(cursor) => {
                state.cursors.insert(venue.to_string(), cursor);
            }
            None => {
                state.cursors.remove(venue);
            }
        }

        let document = StoreDocument {
            cursors: state.cursors.clone(),
            seen: HashSet::new(),
        };
        write_document(&self.path, &document).await
    }

    async fn seen(&self, key: &str) -> MonitorResult<bool> {
        Ok(self.state.lock().await.seen.contains(key))
    }

    async fn mark_seen(&self, key: &str) -> MonitorResult<bool> {
        let mut state = self.state.lock().await;
        if state.seen.contains(key) {
            return Ok(false);
        }

        let mut line = serde_json::to_string(key)?;
        line.push('\n');
        state.journal.write_all(line.as_bytes()).await?;
        state.journal.flush().await?;

        state.seen.insert(key.to_string());
        Ok(true)
    }
}
