//! Entity store - 인메모리 테이블 + 스냅샷 영속화
//!
//! The in-memory table is the source of truth while the process runs. Every
//! mutation re-encodes the whole table under the write lock and hands it to
//! the [`SnapshotWriter`] without waiting; the snapshot is read back only at
//! construction.

use super::entity::{Entity, EntityData, EntityId, Repository};
use super::json::JsonStore;
use super::snapshot::{self, SnapshotWriter, Table};
use crate::clock::{system_clock, SharedClock};
use crate::config::{PersistenceMode, StoreConfig, SNAPSHOT_EXTENSION};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Generic keyed container for records of one type
pub struct EntityStore<T: EntityData> {
    name: String,
    table: RwLock<Table<T>>,
    writer: Option<SnapshotWriter>,
    clock: SharedClock,
}

impl<T: EntityData> EntityStore<T> {
    /// Open a store, loading its snapshot when durable
    pub fn open(config: StoreConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Memory-only store (tests, serverless deployments)
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::open(StoreConfig::memory_only(name))
    }

    pub fn with_clock(config: StoreConfig, clock: SharedClock) -> Self {
        let writer = match &config.persistence {
            PersistenceMode::Durable { data_dir } => Some(SnapshotWriter::new(
                config.name.clone(),
                JsonStore::new(data_dir.clone()),
                format!("{}.{}", config.name, SNAPSHOT_EXTENSION),
            )),
            PersistenceMode::MemoryOnly => None,
        };

        let table = match &writer {
            Some(writer) => load_table(&config.name, writer),
            None => Table::new(),
        };

        Self {
            name: config.name,
            table: RwLock::new(table),
            writer,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.writer.is_some()
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.writer
            .as_ref()
            .map(|w| w.files().file_path(w.filename()))
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove every record matching `predicate` under a single lock
    ///
    /// Returns the removed records; one snapshot write covers the batch.
    pub fn remove_where(&self, mut predicate: impl FnMut(&Entity<T>) -> bool) -> Vec<Entity<T>> {
        let mut table = self.write();
        let ids: Vec<EntityId> = table
            .values()
            .filter(|record| predicate(record))
            .map(|record| record.id.clone())
            .collect();

        let removed: Vec<Entity<T>> = ids.iter().filter_map(|id| table.remove(id)).collect();
        if !removed.is_empty() {
            self.persist_locked(&table);
        }
        removed
    }

    /// Write the current table now and wait for it to land
    pub async fn flush(&self) -> Result<()> {
        let Some(writer) = self.writer.clone() else {
            return Ok(());
        };

        let (generation, content) = {
            let table = self.read();
            let content = snapshot::encode(&self.name, self.clock.now(), &*table)?;
            (writer.next_generation(), content)
        };

        tokio::task::spawn_blocking(move || writer.write(generation, &content))
            .await
            .map_err(|e| Error::Internal(format!("Snapshot task failed: {}", e)))?
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn read(&self) -> RwLockReadGuard<'_, Table<T>> {
        self.table.read().unwrap_or_else(|e| {
            warn!(store = %self.name, "Table lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table<T>> {
        self.table.write().unwrap_or_else(|e| {
            warn!(store = %self.name, "Table lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Encode under the caller's lock and schedule the write
    fn persist_locked(&self, table: &Table<T>) {
        let Some(writer) = &self.writer else {
            return;
        };

        match snapshot::encode(&self.name, self.clock.now(), table) {
            Ok(content) => writer.schedule(writer.next_generation(), content),
            Err(e) => error!(store = %self.name, error = %e, "Snapshot encoding failed"),
        }
    }
}

impl<T: EntityData> Repository<T> for EntityStore<T> {
    fn get(&self, id: &EntityId) -> Option<Entity<T>> {
        self.read().get(id).cloned()
    }

    fn get_all(&self) -> Vec<Entity<T>> {
        self.read().values().cloned().collect()
    }

    fn add(&self, data: T) -> Result<Entity<T>> {
        data.validate()?;
        let mut table = self.write();

        let mut id = EntityId::generate();
        while table.contains_key(&id) {
            id = EntityId::generate();
        }

        let record = Entity::new(id.clone(), self.clock.now(), data);
        table.insert(id, record.clone());
        self.persist_locked(&table);

        debug!(store = %self.name, id = %record.id, "Entity added");
        Ok(record)
    }

    fn update(&self, id: &EntityId, patch: T::Patch) -> Result<Entity<T>> {
        let mut table = self.write();
        let record = table
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("{} entity {}", self.name, id)))?;

        let mut data = record.data.clone();
        data.apply_patch(patch);
        data.validate()?;
        record.data = data;
        let updated = record.clone();
        self.persist_locked(&table);

        debug!(store = %self.name, id = %id, "Entity updated");
        Ok(updated)
    }

    fn remove(&self, id: &EntityId) {
        let mut table = self.write();
        if table.remove(id).is_some() {
            self.persist_locked(&table);
            debug!(store = %self.name, id = %id, "Entity removed");
        }
    }

    fn persist(&self) {
        let table = self.write();
        self.persist_locked(&table);
    }
}

impl<T: EntityData> std::fmt::Debug for EntityStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("name", &self.name)
            .field("entries", &self.len())
            .field("durable", &self.is_durable())
            .finish()
    }
}

/// Missing file: empty. Unreadable or corrupt file: logged, empty.
fn load_table<T: EntityData>(name: &str, writer: &SnapshotWriter) -> Table<T> {
    let content = match writer.read() {
        Ok(Some(content)) => content,
        Ok(None) => {
            debug!(store = %name, "No snapshot found, starting empty");
            return Table::new();
        }
        Err(e) => {
            error!(store = %name, error = %e, "Failed to read snapshot, starting empty");
            return Table::new();
        }
    };

    match snapshot::decode(&content) {
        Ok(table) => {
            info!(store = %name, entries = table.len(), "Snapshot loaded");
            table
        }
        Err(e) => {
            error!(store = %name, error = %e, "Corrupt snapshot, starting empty");
            Table::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Trip {
        city: String,
        nights: u32,
        departs_at: DateTime<Utc>,
    }

    #[derive(Debug, Default)]
    struct TripPatch {
        city: Option<String>,
        nights: Option<u32>,
    }

    impl EntityData for Trip {
        type Patch = TripPatch;

        fn apply_patch(&mut self, patch: TripPatch) {
            if let Some(city) = patch.city {
                self.city = city;
            }
            if let Some(nights) = patch.nights {
                self.nights = nights;
            }
        }

        fn validate(&self) -> Result<()> {
            if self.city.trim().is_empty() {
                return Err(Error::InvalidInput("trip needs a city".into()));
            }
            Ok(())
        }

        fn extend_model(&self, model: &mut Map<String, Value>) {
            model.insert("city".into(), json!(self.city));
        }
    }

    fn departure() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn trip(city: &str) -> Trip {
        Trip {
            city: city.to_string(),
            nights: 2,
            departs_at: departure(),
        }
    }

    #[test]
    fn test_add_then_get() {
        let store = EntityStore::<Trip>::in_memory("trips");
        let before = Utc::now();

        let added = store.add(trip("Oslo")).unwrap();

        assert!(!added.id.as_str().is_empty());
        assert!(added.created_at >= before);
        assert_eq!(store.get(&added.id), Some(added.clone()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let store = EntityStore::<Trip>::in_memory("trips");
        let a = store.add(trip("Oslo")).unwrap();
        let b = store.add(trip("Oslo")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.get_all().len(), 2);
    }

    #[test]
    fn test_update_merges_shallowly() {
        let store = EntityStore::<Trip>::in_memory("trips");
        let added = store.add(trip("Oslo")).unwrap();

        let updated = store
            .update(
                &added.id,
                TripPatch {
                    nights: Some(5),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.id, added.id);
        assert_eq!(updated.created_at, added.created_at);
        assert_eq!(updated.data.city, "Oslo");
        assert_eq!(updated.data.nights, 5);
        assert_eq!(store.get(&added.id), Some(updated));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = EntityStore::<Trip>::in_memory("trips");
        let err = store
            .update(&EntityId::from("nope"), TripPatch::default())
            .unwrap_err();
        assert!(err.is_not_found());

        let added = store.add(trip("Oslo")).unwrap();
        store.remove(&added.id);
        let err = store.update(&added.id, TripPatch::default()).unwrap_err();
        assert!(err.is_not_found());
        assert!(store.get(&added.id).is_none());
    }

    #[test]
    fn test_invalid_records_are_rejected() {
        let store = EntityStore::<Trip>::in_memory("trips");
        let err = store.add(trip(" ")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.is_empty());

        let added = store.add(trip("Oslo")).unwrap();
        let err = store
            .update(
                &added.id,
                TripPatch {
                    city: Some(String::new()),
                    nights: Some(9),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // nothing from the rejected patch is applied
        assert_eq!(store.get(&added.id), Some(added));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = EntityStore::<Trip>::in_memory("trips");
        let added = store.add(trip("Oslo")).unwrap();

        store.remove(&added.id);
        store.remove(&added.id);
        store.remove(&EntityId::from("never-existed"));

        assert!(store.get(&added.id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_created_at_uses_clock() {
        let clock = ManualClock::new(departure());
        let store = EntityStore::<Trip>::with_clock(
            StoreConfig::memory_only("trips"),
            Arc::new(clock.clone()),
        );

        let first = store.add(trip("Oslo")).unwrap();
        clock.advance(Duration::minutes(5));
        let second = store.add(trip("Rome")).unwrap();

        assert_eq!(first.created_at, departure());
        assert_eq!(second.created_at, departure() + Duration::minutes(5));
    }

    #[test]
    fn test_to_model_extends_base_view() {
        let clock = ManualClock::new(departure());
        let store =
            EntityStore::<Trip>::with_clock(StoreConfig::memory_only("trips"), Arc::new(clock));
        let added = store.add(trip("Oslo")).unwrap();

        let model = store.to_model(&added);
        assert_eq!(
            model,
            json!({
                "id": added.id.as_str(),
                "createdAt": "2024-01-15T10:00:00.000Z",
                "city": "Oslo",
            })
        );
    }

    #[test]
    fn test_remove_where_returns_removed() {
        let store = EntityStore::<Trip>::in_memory("trips");
        store.add(trip("Oslo")).unwrap();
        store.add(trip("Rome")).unwrap();
        store.add(trip("Oslo")).unwrap();

        let removed = store.remove_where(|t| t.data.city == "Oslo");
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.remove_where(|t| t.data.city == "Oslo").is_empty());
    }

    #[test]
    fn test_memory_only_never_writes() {
        let store = EntityStore::<Trip>::in_memory("trips");
        store.add(trip("Oslo")).unwrap();
        assert!(!store.is_durable());
        assert!(store.snapshot_path().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable("trips", dir.path());

        let store = EntityStore::<Trip>::open(config.clone());
        let kept = store.add(trip("Oslo")).unwrap();
        let dropped = store.add(trip("Rome")).unwrap();
        store.remove(&dropped.id);
        store.flush().await.unwrap();

        assert_eq!(store.snapshot_path(), Some(dir.path().join("trips.json")));

        let reopened = EntityStore::<Trip>::open(config);
        assert_eq!(reopened.len(), 1);
        let restored = reopened.get(&kept.id).unwrap();
        assert_eq!(restored, kept);
        assert_eq!(restored.data.departs_at, departure());
    }

    #[test]
    fn test_writes_without_runtime_land_immediately() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable("trips", dir.path());

        let store = EntityStore::<Trip>::open(config.clone());
        let added = store.add(trip("Oslo")).unwrap();

        let reopened = EntityStore::<Trip>::open(config);
        assert_eq!(reopened.get(&added.id), Some(added));
    }

    #[test]
    fn test_missing_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = EntityStore::<Trip>::open(StoreConfig::durable("trips", dir.path()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("trips.json"), "{ definitely not json").unwrap();

        let store = EntityStore::<Trip>::open(StoreConfig::durable("trips", dir.path()));
        assert!(store.is_empty());

        // The store keeps working and overwrites the corrupt file
        let added = store.add(trip("Oslo")).unwrap();
        let reopened = EntityStore::<Trip>::open(StoreConfig::durable("trips", dir.path()));
        assert_eq!(reopened.get(&added.id), Some(added));
    }

    #[test]
    fn test_persistence_failure_does_not_reach_caller() {
        let dir = TempDir::new().unwrap();
        // A regular file where the data directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let store = EntityStore::<Trip>::open(StoreConfig::durable("trips", &blocker));
        let added = store.add(trip("Oslo")).unwrap();

        assert_eq!(store.get(&added.id), Some(added));
    }

    #[tokio::test]
    async fn test_flush_reports_persistence_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let store = EntityStore::<Trip>::open(StoreConfig::durable("trips", &blocker));
        store.add(trip("Oslo")).unwrap();

        let err = store.flush().await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_each_store_owns_its_file() {
        let dir = TempDir::new().unwrap();
        let trips = EntityStore::<Trip>::open(StoreConfig::durable("trips", dir.path()));
        let archive = EntityStore::<Trip>::open(StoreConfig::durable("archive", dir.path()));

        trips.add(trip("Oslo")).unwrap();
        archive.add(trip("Rome")).unwrap();

        let reopened = EntityStore::<Trip>::open(StoreConfig::durable("trips", dir.path()));
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get_all()[0].data.city, "Oslo");
    }
}
