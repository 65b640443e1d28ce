//! # wearcast-foundation
//!
//! Foundation layer for wearcast:
//! - Storage: EntityStore (인메모리 테이블 + JSON 스냅샷), Repository trait
//! - Cache: TTL 캐시, 키 빌더, 유지보수 (sweep / health)
//! - Place: 정규화된 장소 저장소
//! - Config: StoreConfig / PersistenceMode
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Collaborators (geocode / weather / LLM clients)        │
//! │                     │                                   │
//! │          ┌─────────┴─────────┐                         │
//! │          ▼                   ▼                         │
//! │     CacheStore         PlaceRepository                 │
//! │   (TTL, lazy evict)    (no TTL)                        │
//! │          │                   │                         │
//! │          └─────────┬─────────┘                         │
//! │                    ▼                                   │
//! │         EntityStore<T> ── snapshot ──▶ <name>.json     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod place;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Clock
// ============================================================================
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{PersistenceMode, StoreConfig};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{Entity, EntityData, EntityId, EntityStore, JsonStore, Repository};

// ============================================================================
// Cache (캐시 시스템)
// ============================================================================
pub use cache::{
    // Settings
    CacheSettings,
    // Store
    CacheEntry,
    CacheEntryData,
    CacheStats,
    CacheStore,
    // Keys
    CacheDomain,
    KeyPart,
    // Maintenance
    CacheHealth,
    HealthStatus,
    SweepReport,
};

// ============================================================================
// Place (장소 저장소)
// ============================================================================
pub use place::{Place, PlaceData, PlacePatch, PlaceRepository};
