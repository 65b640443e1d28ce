//! Storage module for wearcast
//!
//! - `entity`: 레코드 타입 / Repository trait
//! - `store`: EntityStore - 인메모리 테이블 + 스냅샷
//! - `snapshot`: 스냅샷 포맷 및 순서 보장 writer
//! - `json`: JSON - 범용 파일 저장/로드

mod entity;
mod json;
pub mod snapshot;
mod store;

pub use entity::{format_timestamp, Entity, EntityData, EntityId, Repository};
pub use json::{JsonStore, APP_DIR};
pub use snapshot::{SnapshotWriter, Table, SNAPSHOT_VERSION};
pub use store::EntityStore;
