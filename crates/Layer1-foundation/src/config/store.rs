//! Store config - 저장소 생성 설정
//!
//! 영속성 모드는 환경을 감지하지 않고 생성 시점에 명시적으로 전달한다.

use std::path::{Path, PathBuf};

/// Snapshot file extension
pub const SNAPSHOT_EXTENSION: &str = "json";

/// How a store keeps its table across restarts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Snapshot to `<data_dir>/<name>.json` after every mutation
    Durable { data_dir: PathBuf },
    /// Never touch the filesystem
    MemoryOnly,
}

impl PersistenceMode {
    pub fn is_durable(&self) -> bool {
        matches!(self, PersistenceMode::Durable { .. })
    }
}

/// Construction parameters for a single store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store name; also the snapshot file stem
    pub name: String,
    pub persistence: PersistenceMode,
}

impl StoreConfig {
    pub fn durable(name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            persistence: PersistenceMode::Durable {
                data_dir: data_dir.into(),
            },
        }
    }

    pub fn memory_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistence: PersistenceMode::MemoryOnly,
        }
    }

    /// Same persistence mode under a different store name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistence: self.persistence.clone(),
        }
    }

    /// Snapshot path, `None` for memory-only stores
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        match &self.persistence {
            PersistenceMode::Durable { data_dir } => Some(snapshot_file(data_dir, &self.name)),
            PersistenceMode::MemoryOnly => None,
        }
    }
}

fn snapshot_file(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.{}", name, SNAPSHOT_EXTENSION))
}
