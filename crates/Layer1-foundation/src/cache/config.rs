//! Cache configuration

use crate::config::StoreConfig;
use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::keys::CacheDomain;

/// Settings file name
pub const CACHE_SETTINGS_FILE: &str = "cache.json";

/// Where cache snapshots go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceKind {
    Durable,
    Memory,
}

/// Cache system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    /// Snapshot file stem for the cache store
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Snapshot directory; platform data dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_persistence")]
    pub persistence: PersistenceKind,

    /// Valid/total ratio under which the cache reports degraded
    #[serde(default = "default_health_threshold")]
    pub health_threshold: f64,

    /// Interval of the background sweeper (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_weather_ttl_minutes")]
    pub weather_ttl_minutes: i64,

    #[serde(default = "default_geocode_ttl_minutes")]
    pub geocode_ttl_minutes: i64,

    #[serde(default = "default_llm_ttl_minutes")]
    pub llm_ttl_minutes: i64,

    #[serde(default = "default_place_ttl_minutes")]
    pub place_ttl_minutes: i64,
}

// Default value functions
fn default_store_name() -> String {
    "cache".to_string()
}
fn default_persistence() -> PersistenceKind {
    PersistenceKind::Durable
}
fn default_health_threshold() -> f64 {
    0.5
}
fn default_sweep_interval_secs() -> u64 {
    300
} // 5 minutes
fn default_weather_ttl_minutes() -> i64 {
    60
}
fn default_geocode_ttl_minutes() -> i64 {
    1440
} // 1 day
fn default_llm_ttl_minutes() -> i64 {
    1440
}
fn default_place_ttl_minutes() -> i64 {
    10080
} // 1 week

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            store_name: default_store_name(),
            data_dir: None,
            persistence: default_persistence(),
            health_threshold: default_health_threshold(),
            sweep_interval_secs: default_sweep_interval_secs(),
            weather_ttl_minutes: default_weather_ttl_minutes(),
            geocode_ttl_minutes: default_geocode_ttl_minutes(),
            llm_ttl_minutes: default_llm_ttl_minutes(),
            place_ttl_minutes: default_place_ttl_minutes(),
        }
    }
}

/// Partial settings as found in a single file; present fields override
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheSettingsOverlay {
    store_name: Option<String>,
    data_dir: Option<PathBuf>,
    persistence: Option<PersistenceKind>,
    health_threshold: Option<f64>,
    sweep_interval_secs: Option<u64>,
    weather_ttl_minutes: Option<i64>,
    geocode_ttl_minutes: Option<i64>,
    llm_ttl_minutes: Option<i64>,
    place_ttl_minutes: Option<i64>,
}

impl CacheSettings {
    // ========================================================================
    // Load
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut settings = Self::default();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            settings.merge_from(&global)?;
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            settings.merge_from(&project)?;
        }

        Ok(settings)
    }

    /// Load from a single directory, defaults for anything missing
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        let mut settings = Self::default();
        settings.merge_from(store)?;
        Ok(settings)
    }

    fn merge_from(&mut self, store: &JsonStore) -> Result<()> {
        if let Some(overlay) = store.load_optional::<CacheSettingsOverlay>(CACHE_SETTINGS_FILE)? {
            self.merge(overlay)?;
        }
        Ok(())
    }

    fn merge(&mut self, other: CacheSettingsOverlay) -> Result<()> {
        if let Some(v) = other.store_name {
            self.store_name = v;
        }
        if let Some(v) = other.data_dir {
            self.data_dir = Some(v);
        }
        if let Some(v) = other.persistence {
            self.persistence = v;
        }
        if let Some(v) = other.health_threshold {
            self.health_threshold = v;
        }
        if let Some(v) = other.sweep_interval_secs {
            if v == 0 {
                return Err(Error::Config("sweepIntervalSecs must be at least 1".to_string()));
            }
            self.sweep_interval_secs = v;
        }
        if let Some(v) = other.weather_ttl_minutes {
            self.weather_ttl_minutes = v;
        }
        if let Some(v) = other.geocode_ttl_minutes {
            self.geocode_ttl_minutes = v;
        }
        if let Some(v) = other.llm_ttl_minutes {
            self.llm_ttl_minutes = v;
        }
        if let Some(v) = other.place_ttl_minutes {
            self.place_ttl_minutes = v;
        }
        Ok(())
    }

    // ========================================================================
    // Derived values
    // ========================================================================

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(JsonStore::default_data_dir)
    }

    /// Store config for the cache store itself
    pub fn store_config(&self) -> StoreConfig {
        match self.persistence {
            PersistenceKind::Durable => StoreConfig::durable(&self.store_name, self.data_dir()),
            PersistenceKind::Memory => StoreConfig::memory_only(&self.store_name),
        }
    }

    /// Default TTL for a cache domain
    pub fn ttl_minutes(&self, domain: CacheDomain) -> i64 {
        match domain {
            CacheDomain::Weather => self.weather_ttl_minutes,
            CacheDomain::Geocode => self.geocode_ttl_minutes,
            CacheDomain::Llm => self.llm_ttl_minutes,
            CacheDomain::Place => self.place_ttl_minutes,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
