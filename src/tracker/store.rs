//! Persistence behind the status tracker.
//!
//! Events append to a JSON-lines log; auxiliary state (schedules, the
//! active environment) saves as named JSON documents in the same state
//! directory. The in-memory store backs tests and rehearsal runs.

use super::MigrationEvent;
use crate::error::{Result, SyncError};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Where migration events and auxiliary state live.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event to the log.
    async fn append(&self, event: &MigrationEvent) -> Result<()>;

    /// Load the full event log, oldest first.
    async fn load_events(&self) -> Result<Vec<MigrationEvent>>;

    /// Save a named JSON document, replacing any previous version.
    async fn save_document(&self, name: &str, document: &serde_json::Value) -> Result<()>;

    /// Load a named JSON document if it exists.
    async fn load_document(&self, name: &str) -> Result<Option<serde_json::Value>>;
}

/// Volatile store for tests and rehearsal runs.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<Vec<MigrationEvent>>,
    documents: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, event: &MigrationEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn load_events(&self) -> Result<Vec<MigrationEvent>> {
        Ok(self.events.lock().await.clone())
    }

    async fn save_document(&self, name: &str, document: &serde_json::Value) -> Result<()> {
        self.documents
            .lock()
            .await
            .insert(name.to_string(), document.clone());
        Ok(())
    }

    async fn load_document(&self, name: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.documents.lock().await.get(name).cloned())
    }
}

/// Durable store under a state directory.
pub struct FilesystemStore {
    dir: PathBuf,
    /// Serializes appends so concurrent writers cannot interleave lines.
    write_lock: Mutex<()>,
}

impl FilesystemStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        FilesystemStore {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn events_path(&self) -> PathBuf {
        self.dir.join("events.jsonl")
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait::async_trait]
impl EventStore for FilesystemStore {
    async fn append(&self, event: &MigrationEvent) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        std::fs::create_dir_all(&self.dir)?;
        let line = serde_json::to_string(event)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path())?;
        writeln!(file, "{line}")?;
        debug!("Appended {} event to {}", event.kind, self.events_path().display());
        Ok(())
    }

    async fn load_events(&self) -> Result<Vec<MigrationEvent>> {
        let path = self.events_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        let mut events = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: MigrationEvent = serde_json::from_str(line).map_err(|e| {
                SyncError::State(format!(
                    "corrupt event log {} at line {}: {e}",
                    path.display(),
                    i + 1
                ))
            })?;
            events.push(event);
        }
        Ok(events)
    }

    async fn save_document(&self, name: &str, document: &serde_json::Value) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.document_path(name);
        std::fs::write(&path, serde_json::to_string_pretty(document)?)?;
        debug!("Saved state document {}", path.display());
        Ok(())
    }

    async fn load_document(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let path = self.document_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let document = serde_json::from_str(&content).map_err(|e| {
            SyncError::State(format!("corrupt state document {}: {e}", path.display()))
        })?;
        Ok(Some(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::EventKind;

    #[tokio::test]
    async fn filesystem_store_round_trips_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());

        let first = MigrationEvent::new(EventKind::SyncStarted, "full sync of photos");
        let second = MigrationEvent::new(EventKind::SyncCompleted, "synced 120 records")
            .with_phase("photos-full");
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();

        let loaded = store.load_events().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].kind, EventKind::SyncStarted);
        assert_eq!(loaded[1].phase_id.as_deref(), Some("photos-full"));
    }

    #[tokio::test]
    async fn corrupt_log_lines_surface_as_state_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());
        store
            .append(&MigrationEvent::new(EventKind::SyncStarted, "ok"))
            .await
            .unwrap();
        std::fs::write(dir.path().join("events.jsonl"), "{not json}\n").unwrap();

        let err = store.load_events().await.unwrap_err();
        assert!(matches!(err, SyncError::State(_)));
    }

    #[tokio::test]
    async fn documents_save_and_load_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path());

        assert!(store.load_document("schedules").await.unwrap().is_none());
        let doc = serde_json::json!({"schedules": []});
        store.save_document("schedules", &doc).await.unwrap();
        assert_eq!(store.load_document("schedules").await.unwrap(), Some(doc));
    }
}
