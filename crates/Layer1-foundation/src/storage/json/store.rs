//! JSON 파일 저장소

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// Application directory name under the platform config/data dirs
pub const APP_DIR: &str = "wearcast";

/// JSON 파일 저장소
///
/// Settings files and store snapshots both go through here.
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 글로벌 설정 (~/.config/wearcast/)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join(APP_DIR);
        Ok(Self::new(dir))
    }

    /// 프로젝트 설정 (.wearcast/)
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(format!(".{}", APP_DIR)))
    }

    /// 현재 디렉토리 프로젝트 설정
    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    /// 기본 데이터 디렉토리 (~/.local/share/wearcast/)
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            std::fs::create_dir_all(&self.base_dir).map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create directory {}: {}",
                    self.base_dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// 파일 내용 로드 (없으면 None)
    pub fn read_raw(&self, filename: &str) -> Result<Option<String>> {
        let path = self.file_path(filename);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path).map(Some).map_err(|e| {
            Error::Persistence(format!("Failed to read {}: {}", path.display(), e))
        })
    }

    /// JSON 로드 (Optional)
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let Some(content) = self.read_raw(filename)? else {
            return Ok(None);
        };
        serde_json::from_str(&content).map(Some).map_err(|e| {
            Error::Deserialization(format!(
                "Failed to parse {}: {}",
                self.file_path(filename).display(),
                e
            ))
        })
    }

    /// 직렬화된 내용 저장
    ///
    /// Writes to a sibling temp file and renames it over the target, so a
    /// crash mid-write leaves the previous file intact.
    pub fn save_raw(&self, filename: &str, content: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.file_path(filename);
        let tmp = self.file_path(&format!("{}.tmp", filename));
        std::fs::write(&tmp, content).map_err(|e| {
            Error::Persistence(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            Error::Persistence(format!("Failed to replace {}: {}", path.display(), e))
        })
    }
}
