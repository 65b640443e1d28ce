//! JSON 파일 저장 (설정 / 스냅샷)

mod store;

pub use store::{JsonStore, APP_DIR};
