//! Config - 저장소 설정
//!
//! - `store.rs` - StoreConfig / PersistenceMode
//!
//! 캐시 설정 파일은 `cache::config`에서 관리

mod store;

pub use store::{PersistenceMode, StoreConfig, SNAPSHOT_EXTENSION};
