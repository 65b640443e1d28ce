//! Entity - 영속 레코드 공통 타입
//!
//! Every record a store holds is an [`Entity<T>`]: a generated id, a
//! creation timestamp, and the record type's own fields flattened next to
//! them. Record-specific behavior (patching, presentation) lives on
//! [`EntityData`]; stores expose the narrow [`Repository`] interface.

use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// EntityId
// ============================================================================

/// Opaque entity identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Fresh random id (UUID v4, OS-seeded RNG)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// EntityData
// ============================================================================

/// Fields and behavior owned by a concrete record type
pub trait EntityData: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Partial update; each present field replaces the stored one
    type Patch: Send;

    fn apply_patch(&mut self, patch: Self::Patch);

    /// Record-level rule checked before any insert or patch is committed
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Add this record type's public fields to the presentation view
    fn extend_model(&self, _model: &mut Map<String, Value>) {}
}

// ============================================================================
// Entity
// ============================================================================

/// A uniquely identified, persisted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity<T> {
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: T,
}

impl<T: EntityData> Entity<T> {
    pub fn new(id: EntityId, created_at: DateTime<Utc>, data: T) -> Self {
        Self {
            id,
            created_at,
            data,
        }
    }

    /// Presentation view: `id`, `createdAt` (ISO-8601) plus record fields
    pub fn to_model(&self) -> Value {
        let mut model = Map::new();
        model.insert("id".to_string(), Value::String(self.id.to_string()));
        model.insert(
            "createdAt".to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        self.data.extend_model(&mut model);
        Value::Object(model)
    }
}

/// ISO-8601, millisecond precision, `Z` suffix
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Repository
// ============================================================================

/// Narrow storage interface shared by every store
///
/// Concrete stores (cache, places) hold an implementation of this rather
/// than extending one.
pub trait Repository<T: EntityData>: Send + Sync {
    fn get(&self, id: &EntityId) -> Option<Entity<T>>;

    fn get_all(&self) -> Vec<Entity<T>>;

    /// Insert a new record with a generated id and creation time
    ///
    /// Fails with `Error::InvalidInput` when the record does not validate.
    fn add(&self, data: T) -> Result<Entity<T>>;

    /// Fails with `Error::NotFound` when `id` is absent and with
    /// `Error::InvalidInput` when the patched record does not validate; the
    /// stored record is left unchanged in both cases
    fn update(&self, id: &EntityId, patch: T::Patch) -> Result<Entity<T>>;

    /// Removing an absent id is a no-op
    fn remove(&self, id: &EntityId);

    /// Schedule a durable write of the current table
    fn persist(&self);

    fn to_model(&self, record: &Entity<T>) -> Value {
        record.to_model()
    }
}
