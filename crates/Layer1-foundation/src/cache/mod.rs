//! # wearcast Cache System
//!
//! Expiring key/value storage for the results of expensive external calls
//! (geocoding, weather forecasts, LLM normalization).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Caller (geocode / weather / LLM client)                    │
//! │        │ keys::geocode_key("New York")                      │
//! │        ▼                                                    │
//! │  CacheStore  get_cached / set_cache / delete_cache          │
//! │        │      (lazy eviction on read)                       │
//! │        ▼                                                    │
//! │  EntityStore<CacheEntryData>  ── snapshot ──▶ cache.json    │
//! │                                                             │
//! │  maintenance: sweep / classify_health / spawn_sweeper       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wearcast_foundation::cache::{keys, CacheStore, CacheSettings};
//!
//! let cache = CacheStore::from_settings(CacheSettings::load()?);
//! let key = keys::geocode_key("New York");
//!
//! if let Some(hit) = cache.get_cached(&key) {
//!     return Ok(hit);
//! }
//! let coords = geocoder.lookup("New York").await?;
//! cache.set_cache(&key, coords.clone(), 1440);
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Cache settings
//! - [`entry`] - Cache entry record
//! - [`store`] - Cache store
//! - [`keys`] - Key builders
//! - [`maintenance`] - Sweep and health

pub mod config;
pub mod entry;
pub mod keys;
pub mod maintenance;
pub mod store;

pub use config::{CacheSettings, PersistenceKind, CACHE_SETTINGS_FILE};
pub use entry::{CacheEntry, CacheEntryData, CacheEntryPatch};
pub use keys::{
    generate_key, geocode_key, llm_key, normalize_query, place_key, round_coordinate,
    weather_key, CacheDomain, KeyPart, COORDINATE_PRECISION, KEY_SEPARATOR, LLM_DIGEST_LEN,
};
pub use maintenance::{
    check_health, classify_health, hit_ratio, spawn_sweeper, sweep, CacheHealth, HealthStatus,
    SweepReport, MIN_SWEEP_INTERVAL,
};
pub use store::{CacheStats, CacheStore};
