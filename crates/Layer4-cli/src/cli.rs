//! Cache admin commands

use clap::Subcommand;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wearcast_foundation::cache::{self, keys, CacheDomain};
use wearcast_foundation::{CacheSettings, CacheStore, PlaceRepository, Repository};

/// Commands that operate on the stores
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show entry counts and approximate size
    Stats,
    /// Remove expired entries and report how many were removed
    Sweep,
    /// Classify cache health
    Health {
        /// Exit with an error when the cache is degraded
        #[arg(long)]
        strict: bool,
    },
    /// Print the live value for a key
    Get { key: String },
    /// Print the full entry for a key, expired or not
    Inspect { key: String },
    /// Delete a key
    Delete { key: String },
    /// List stored places
    Places,
    /// Sweep periodically until interrupted
    Sweeper {
        /// Seconds between sweeps (defaults to cache.json)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

/// Key builders by domain
#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Forecast key from coordinates and a date range
    Weather {
        #[arg(allow_hyphen_values = true)]
        latitude: f64,
        #[arg(allow_hyphen_values = true)]
        longitude: f64,
        start_date: String,
        end_date: String,
    },
    /// Geocode key from a free-text query
    Geocode { query: String },
    /// LLM key from a model and prompt
    Llm {
        #[arg(short, long)]
        model: Option<String>,
        prompt: String,
    },
    /// Place key from a free-text query
    Place { query: String },
}

pub fn build_key(command: &KeyCommand) -> String {
    match command {
        KeyCommand::Weather {
            latitude,
            longitude,
            start_date,
            end_date,
        } => keys::weather_key(*latitude, *longitude, start_date, end_date),
        KeyCommand::Geocode { query } => keys::geocode_key(query),
        KeyCommand::Llm { model, prompt } => keys::llm_key(model.as_deref(), prompt),
        KeyCommand::Place { query } => keys::place_key(query),
    }
}

/// Stores opened from the cache settings
pub struct Admin {
    cache: Arc<CacheStore>,
    places: PlaceRepository,
}

impl Admin {
    pub fn open(settings: CacheSettings) -> Self {
        let places = PlaceRepository::open(&settings.store_config());
        let cache = Arc::new(CacheStore::from_settings(settings));
        Self { cache, places }
    }

    pub async fn run(&self, command: CacheCommand) -> anyhow::Result<()> {
        let output = match command {
            CacheCommand::Stats => self.stats(),
            CacheCommand::Sweep => self.sweep(),
            CacheCommand::Health { strict } => {
                let health = cache::check_health(&self.cache);
                if strict && !health.is_healthy() {
                    anyhow::bail!(
                        "cache degraded: ratio {:.2} (threshold {:.2}), {} expired / {} valid",
                        health.ratio,
                        health.threshold,
                        health.stats.expired_entries,
                        health.stats.valid_entries
                    );
                }
                serde_json::to_value(health)?
            }
            CacheCommand::Get { key } => self.get(&key),
            CacheCommand::Inspect { key } => self.inspect(&key),
            CacheCommand::Delete { key } => self.delete(&key),
            CacheCommand::Places => self.places(),
            CacheCommand::Sweeper { interval } => {
                self.run_sweeper(interval).await?;
                return Ok(());
            }
        };

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    pub fn stats(&self) -> Value {
        let stats = self.cache.get_cache_stats();
        json!({
            "stats": stats,
            "hitRatio": cache::hit_ratio(&stats),
            "snapshot": self.cache.snapshot_path(),
        })
    }

    pub fn sweep(&self) -> Value {
        json!(cache::sweep(&self.cache))
    }

    pub fn get(&self, key: &str) -> Value {
        match self.cache.get_cached(key) {
            Some(value) => json!({ "key": key, "hit": true, "value": value }),
            None => json!({ "key": key, "hit": false }),
        }
    }

    pub fn inspect(&self, key: &str) -> Value {
        match self.cache.get_entry(key) {
            Some(entry) => {
                let mut model = entry.to_model();
                model["expired"] = json!(entry.data.is_expired_at(self.cache.now()));
                model["domain"] = json!(CacheDomain::of_key(key));
                model
            }
            None => Value::Null,
        }
    }

    pub fn delete(&self, key: &str) -> Value {
        let existed = self.cache.get_entry(key).is_some();
        self.cache.delete_cache(key);
        json!({ "key": key, "deleted": existed })
    }

    pub fn places(&self) -> Value {
        Value::Array(
            self.places
                .list()
                .iter()
                .map(|place| self.places.to_model(place))
                .collect(),
        )
    }

    pub async fn run_sweeper(&self, interval: Option<u64>) -> anyhow::Result<()> {
        let interval = interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.cache.settings().sweep_interval());
        tracing::info!(interval_secs = interval.as_secs(), "Sweeper started");

        let handle = cache::spawn_sweeper(self.cache.clone(), interval);
        tokio::signal::ctrl_c().await?;
        handle.abort();

        tracing::info!("Sweeper stopped");
        Ok(())
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.cache.flush().await?;
        self.places.flush().await?;
        Ok(())
    }
}
