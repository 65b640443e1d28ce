//! Place repository - 정규화된 장소 저장소
//!
//! Domain store over [`EntityStore`] with no TTL semantics: a resolved place
//! stays until it is removed.

use crate::cache::normalize_query;
use crate::clock::{system_clock, SharedClock};
use crate::config::StoreConfig;
use crate::storage::{Entity, EntityData, EntityId, EntityStore, Repository};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Snapshot file stem of the place store
pub const PLACE_STORE_NAME: &str = "places";

/// A normalized location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceData {
    /// Free-text description the place was resolved from
    pub query: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl PlaceData {
    pub fn new(
        query: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            query: query.into(),
            name: name.into(),
            latitude,
            longitude,
            country: None,
            timezone: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }
}

/// Partial update; `Some` replaces the stored field
#[derive(Debug, Clone, Default)]
pub struct PlacePatch {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<Option<String>>,
    pub timezone: Option<Option<String>>,
}

impl EntityData for PlaceData {
    type Patch = PlacePatch;

    fn apply_patch(&mut self, patch: PlacePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(latitude) = patch.latitude {
            self.latitude = latitude;
        }
        if let Some(longitude) = patch.longitude {
            self.longitude = longitude;
        }
        if let Some(country) = patch.country {
            self.country = country;
        }
        if let Some(timezone) = patch.timezone {
            self.timezone = timezone;
        }
    }

    /// Coordinates must be on the globe
    fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::InvalidInput(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::InvalidInput(format!(
                "longitude out of range: {}",
                self.longitude
            )));
        }
        Ok(())
    }

    // `query` is internal: the view exposes the resolved place only
    fn extend_model(&self, model: &mut Map<String, Value>) {
        model.insert("name".to_string(), json!(self.name));
        model.insert("latitude".to_string(), json!(self.latitude));
        model.insert("longitude".to_string(), json!(self.longitude));
        if let Some(country) = &self.country {
            model.insert("country".to_string(), json!(country));
        }
        if let Some(timezone) = &self.timezone {
            model.insert("timezone".to_string(), json!(timezone));
        }
    }
}

/// A stored place
pub type Place = Entity<PlaceData>;

/// Place store
#[derive(Debug)]
pub struct PlaceRepository {
    store: EntityStore<PlaceData>,
}

impl PlaceRepository {
    /// Open next to other stores sharing `base`'s persistence mode
    pub fn open(base: &StoreConfig) -> Self {
        Self::with_clock(base, system_clock())
    }

    pub fn in_memory() -> Self {
        Self::open(&StoreConfig::memory_only(PLACE_STORE_NAME))
    }

    pub fn with_clock(base: &StoreConfig, clock: SharedClock) -> Self {
        Self {
            store: EntityStore::with_clock(base.renamed(PLACE_STORE_NAME), clock),
        }
    }

    /// Validate coordinates and insert
    pub fn add_place(&self, place: PlaceData) -> Result<Place> {
        self.store.add(place)
    }

    /// First place resolved from an equivalent query
    pub fn find_by_query(&self, query: &str) -> Option<Place> {
        let wanted = normalize_query(query);
        self.store
            .get_all()
            .into_iter()
            .filter(|p| normalize_query(&p.data.query) == wanted)
            .min_by_key(|p| p.created_at)
    }

    /// All places, oldest first
    pub fn list(&self) -> Vec<Place> {
        let mut places = self.store.get_all();
        places.sort_by_key(|p| p.created_at);
        places
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }
}

impl Repository<PlaceData> for PlaceRepository {
    fn get(&self, id: &EntityId) -> Option<Place> {
        self.store.get(id)
    }

    fn get_all(&self) -> Vec<Place> {
        self.store.get_all()
    }

    fn add(&self, data: PlaceData) -> Result<Place> {
        self.store.add(data)
    }

    fn update(&self, id: &EntityId, patch: PlacePatch) -> Result<Place> {
        self.store.update(id, patch)
    }

    fn remove(&self, id: &EntityId) {
        self.store.remove(id)
    }

    fn persist(&self) {
        self.store.persist()
    }
}
