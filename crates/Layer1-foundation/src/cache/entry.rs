//! Cache entry record

use crate::storage::{format_timestamp, Entity, EntityData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Fields of a cache entry entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryData {
    /// Cache key (not the entity id)
    pub key: String,
    /// Opaque payload
    pub value: Value,
    pub expires_at: DateTime<Utc>,
    /// TTL `expires_at` was computed from; diagnostics only
    pub ttl_minutes: i64,
}

impl CacheEntryData {
    /// Stale once `now` is past `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Replacement fields for an in-place refresh
#[derive(Debug, Clone, Default)]
pub struct CacheEntryPatch {
    pub value: Option<Value>,
    pub expires_at: Option<DateTime<Utc>>,
    pub ttl_minutes: Option<i64>,
}

impl EntityData for CacheEntryData {
    type Patch = CacheEntryPatch;

    fn apply_patch(&mut self, patch: CacheEntryPatch) {
        if let Some(value) = patch.value {
            self.value = value;
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(ttl_minutes) = patch.ttl_minutes {
            self.ttl_minutes = ttl_minutes;
        }
    }

    fn extend_model(&self, model: &mut Map<String, Value>) {
        model.insert("key".to_string(), json!(self.key));
        model.insert("value".to_string(), self.value.clone());
        model.insert(
            "expiresAt".to_string(),
            json!(format_timestamp(&self.expires_at)),
        );
        model.insert("ttlMinutes".to_string(), json!(self.ttl_minutes));
    }
}

/// A stored cache entry
pub type CacheEntry = Entity<CacheEntryData>;
