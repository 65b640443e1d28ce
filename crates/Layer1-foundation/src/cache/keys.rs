//! Cache key builders
//!
//! Pure functions mapping call parameters to stable string keys, partitioned
//! by [`CacheDomain`] so unrelated call sites never share an entry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Separator between key segments
pub const KEY_SEPARATOR: char = ':';

/// Decimal places kept for weather coordinates (~1.1 km)
pub const COORDINATE_PRECISION: usize = 2;

/// Hex characters of the prompt digest kept in LLM keys
pub const LLM_DIGEST_LEN: usize = 16;

/// Model segment used when the caller does not name one
pub const DEFAULT_MODEL_MARKER: &str = "default";

// ============================================================================
// CacheDomain
// ============================================================================

/// Logical cache namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDomain {
    Weather,
    Geocode,
    Llm,
    Place,
}

impl CacheDomain {
    pub const ALL: [CacheDomain; 4] = [
        CacheDomain::Weather,
        CacheDomain::Geocode,
        CacheDomain::Llm,
        CacheDomain::Place,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            CacheDomain::Weather => "weather",
            CacheDomain::Geocode => "geocode",
            CacheDomain::Llm => "llm",
            CacheDomain::Place => "place",
        }
    }

    /// Domain a key belongs to, judged by its prefix
    pub fn of_key(key: &str) -> Option<Self> {
        let prefix = key.split(KEY_SEPARATOR).next()?;
        prefix.parse().ok()
    }
}

impl fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for CacheDomain {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheDomain::ALL
            .into_iter()
            .find(|d| d.prefix() == s)
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown cache domain: {}", s)))
    }
}

// ============================================================================
// generate_key
// ============================================================================

/// A primitive key segment
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Missing,
}

impl KeyPart {
    fn write_to(&self, out: &mut String) {
        match self {
            KeyPart::Str(s) => {
                for c in s.chars() {
                    // Escape so ("a:b", "c") and ("a", "b:c") stay distinct
                    if c == KEY_SEPARATOR || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
            }
            KeyPart::Int(n) => out.push_str(&n.to_string()),
            KeyPart::Float(n) => out.push_str(&n.to_string()),
            KeyPart::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            KeyPart::Missing => {}
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::Str(s.clone())
    }
}

impl From<f64> for KeyPart {
    fn from(n: f64) -> Self {
        KeyPart::Float(n)
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

impl From<i32> for KeyPart {
    fn from(n: i32) -> Self {
        KeyPart::Int(n.into())
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        KeyPart::Int(n.into())
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(KeyPart::Missing)
    }
}

/// Join a domain prefix and primitive parts with [`KEY_SEPARATOR`]
pub fn generate_key(prefix: &str, parts: &[KeyPart]) -> String {
    let mut key = String::with_capacity(prefix.len() + parts.len() * 12);
    key.push_str(prefix);
    for part in parts {
        key.push(KEY_SEPARATOR);
        part.write_to(&mut key);
    }
    key
}

/// `generate_key` with inline parts
///
/// ```rust,ignore
/// let key = cache_key!("weather", 40.7128, -74.006, "2024-01-01");
/// ```
#[macro_export]
macro_rules! cache_key {
    ($prefix:expr $(, $part:expr)* $(,)?) => {
        $crate::cache::generate_key(
            $prefix,
            &[$($crate::cache::KeyPart::from($part)),*],
        )
    };
}

// ============================================================================
// Domain builders
// ============================================================================

/// Weather forecast key: rounded coordinates plus date range
pub fn weather_key(latitude: f64, longitude: f64, start_date: &str, end_date: &str) -> String {
    generate_key(
        CacheDomain::Weather.prefix(),
        &[
            round_coordinate(latitude).into(),
            round_coordinate(longitude).into(),
            start_date.into(),
            end_date.into(),
        ],
    )
}

/// Geocode key: normalized free-text query
pub fn geocode_key(query: &str) -> String {
    format!(
        "{}{}{}",
        CacheDomain::Geocode.prefix(),
        KEY_SEPARATOR,
        normalize_query(query)
    )
}

/// Normalized place key
pub fn place_key(query: &str) -> String {
    format!(
        "{}{}{}",
        CacheDomain::Place.prefix(),
        KEY_SEPARATOR,
        normalize_query(query)
    )
}

/// LLM key: model (or default marker) plus a fixed-length prompt digest
pub fn llm_key(model: Option<&str>, prompt: &str) -> String {
    let model = model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MODEL_MARKER);
    generate_key(
        CacheDomain::Llm.prefix(),
        &[model.into(), prompt_digest(prompt).into()],
    )
}

/// Trimmed, lowercased, inner whitespace collapsed
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Fixed-precision coordinate text, `-0.00` folded into `0.00`
pub fn round_coordinate(value: f64) -> String {
    let factor = 10f64.powi(COORDINATE_PRECISION as i32);
    let mut rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        rounded = 0.0;
    }
    format!("{:.*}", COORDINATE_PRECISION, rounded)
}

fn prompt_digest(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(LLM_DIGEST_LEN);
    hex
}
