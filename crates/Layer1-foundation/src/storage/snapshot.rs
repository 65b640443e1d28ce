//! Snapshot - 저장소 테이블 직렬화 및 파일 기록
//!
//! ## File format
//!
//! ```text
//! {
//!   "version": 1,
//!   "store": "cache",
//!   "savedAt": "2024-01-15T10:00:00Z",
//!   "entries": [["<id>", { "id": "<id>", "createdAt": "...", ... }], ...]
//! }
//! ```
//!
//! Timestamps are RFC 3339 strings on disk; the typed record schema decodes
//! them back into `DateTime<Utc>`.

use super::entity::{Entity, EntityData, EntityId};
use super::json::JsonStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// In-memory table type
pub type Table<T> = HashMap<EntityId, Entity<T>>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a, T> {
    version: u32,
    store: &'a str,
    saved_at: DateTime<Utc>,
    entries: Vec<(&'a EntityId, &'a Entity<T>)>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile<T> {
    version: u32,
    #[allow(dead_code)]
    store: String,
    #[allow(dead_code)]
    saved_at: DateTime<Utc>,
    entries: Vec<(EntityId, Entity<T>)>,
}

/// Serialize the full table
pub fn encode<T: EntityData>(
    store: &str,
    saved_at: DateTime<Utc>,
    table: &Table<T>,
) -> Result<String> {
    let mut entries: Vec<_> = table.iter().collect();
    // Stable file contents for identical tables
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let snapshot = SnapshotRef {
        version: SNAPSHOT_VERSION,
        store,
        saved_at,
        entries,
    };
    serde_json::to_string_pretty(&snapshot)
        .map_err(|e| Error::Persistence(format!("Failed to serialize snapshot: {}", e)))
}

/// Deserialize a table; later duplicates of an id win
pub fn decode<T: EntityData>(content: &str) -> Result<Table<T>> {
    let snapshot: SnapshotFile<T> = serde_json::from_str(content)
        .map_err(|e| Error::Deserialization(format!("Invalid snapshot: {}", e)))?;

    if snapshot.version > SNAPSHOT_VERSION {
        return Err(Error::Deserialization(format!(
            "Unsupported snapshot version {} (max {})",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }

    Ok(snapshot.entries.into_iter().collect())
}

// ============================================================================
// SnapshotWriter
// ============================================================================

/// Ordered, best-effort snapshot writer
///
/// Each encoded snapshot carries a generation taken under the table lock.
/// A write whose generation is not newer than the last one on disk is
/// dropped, so a late background write never overwrites a fresher file.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    inner: Arc<WriterInner>,
}

#[derive(Debug)]
struct WriterInner {
    store: String,
    files: JsonStore,
    filename: String,
    next_generation: AtomicU64,
    written: Mutex<u64>,
}

impl SnapshotWriter {
    pub fn new(store: impl Into<String>, files: JsonStore, filename: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                store: store.into(),
                files,
                filename: filename.into(),
                next_generation: AtomicU64::new(1),
                written: Mutex::new(0),
            }),
        }
    }

    pub fn files(&self) -> &JsonStore {
        &self.inner.files
    }

    pub fn filename(&self) -> &str {
        &self.inner.filename
    }

    /// Must be called while holding the table lock the snapshot was taken under
    pub fn next_generation(&self) -> u64 {
        self.inner.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Read the snapshot file, if any
    pub fn read(&self) -> Result<Option<String>> {
        self.inner.files.read_raw(&self.inner.filename)
    }

    /// Blocking write; skipped when a newer generation is already on disk
    pub fn write(&self, generation: u64, content: &str) -> Result<()> {
        let mut written = self.inner.written.lock().unwrap_or_else(|e| e.into_inner());
        if generation <= *written {
            debug!(
                store = %self.inner.store,
                generation,
                written = *written,
                "Skipping stale snapshot"
            );
            return Ok(());
        }

        self.inner.files.save_raw(&self.inner.filename, content)?;
        *written = generation;

        debug!(store = %self.inner.store, generation, bytes = content.len(), "Snapshot written");
        Ok(())
    }

    /// Fire-and-forget write; failures are logged, never returned
    pub fn schedule(&self, generation: u64, content: String) {
        let writer = self.clone();
        let job = move || {
            if let Err(e) = writer.write(generation, &content) {
                error!(store = %writer.inner.store, error = %e, "Snapshot write failed");
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            // No runtime: write inline
            Err(_) => job(),
        }
    }
}
