use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use runtime::BackoffPolicy;
use scene::PickKeys;
use serde::{Deserialize, Serialize};
use streaming::StreamingConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{key}={value:?} is not a valid override")]
    Env { key: &'static str, value: String },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Drill-down behaviour of the click state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub flight_duration_ms: u64,
    pub flight_height_m: f64,
    pub flight_pitch_deg: f64,
    /// Pause on `Complete` (or a terminal error) before returning to idle.
    pub ui_settle_ms: u64,
    pub retry: BackoffPolicy,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            flight_duration_ms: 3000,
            flight_height_m: 1500.0,
            flight_pitch_deg: -35.0,
            ui_settle_ms: 500,
            retry: BackoffPolicy::default(),
        }
    }
}

impl ClickConfig {
    pub fn flight_duration(&self) -> Duration {
        Duration::from_millis(self.flight_duration_ms)
    }

    pub fn ui_settle(&self) -> Duration {
        Duration::from_millis(self.ui_settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickConfig {
    /// Picks closer together than this are ignored.
    pub debounce_ms: u64,
    #[serde(flatten)]
    pub keys: PickKeys,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            keys: PickKeys::default(),
        }
    }
}

impl PickConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    pub streaming: StreamingConfig,
    pub click: ClickConfig,
    pub picking: PickConfig,
}

impl NavigatorConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// File, then `NAVIGATOR_*` environment overrides, then validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        env_override(&lookup, "NAVIGATOR_TILE_SIZE_DEG", &mut self.streaming.tile_size_deg)?;
        env_override(&lookup, "NAVIGATOR_BUFFER_FRACTION", &mut self.streaming.buffer_fraction)?;
        env_override(
            &lookup,
            "NAVIGATOR_MAX_CONCURRENT_LOADS",
            &mut self.streaming.max_concurrent_loads,
        )?;
        env_override(&lookup, "NAVIGATOR_MAX_LOADED_TILES", &mut self.streaming.max_loaded_tiles)?;
        env_override(
            &lookup,
            "NAVIGATOR_MAX_TILES_PER_PASS",
            &mut self.streaming.max_tiles_per_pass,
        )?;
        env_override(&lookup, "NAVIGATOR_FLIGHT_DURATION_MS", &mut self.click.flight_duration_ms)?;
        env_override(&lookup, "NAVIGATOR_PICK_DEBOUNCE_MS", &mut self.picking.debounce_ms)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = self.streaming.problems();
        if self.click.retry.max_attempts == 0 {
            problems.push("click.retry.max_attempts must be >= 1".to_string());
        }
        if !(self.click.retry.multiplier.is_finite() && self.click.retry.multiplier >= 1.0) {
            problems.push(format!(
                "click.retry.multiplier must be >= 1 (got {})",
                self.click.retry.multiplier
            ));
        }
        if !(self.click.flight_height_m.is_finite() && self.click.flight_height_m > 0.0) {
            problems.push(format!(
                "click.flight_height_m must be > 0 (got {})",
                self.click.flight_height_m
            ));
        }
        let keys = &self.picking.keys;
        for (name, value) in [
            ("area_key", &keys.area_key),
            ("object_key", &keys.object_key),
            ("centroid_lon_key", &keys.centroid_lon_key),
            ("centroid_lat_key", &keys.centroid_lat_key),
        ] {
            if value.is_empty() {
                problems.push(format!("picking.{name} must not be empty"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

fn env_override<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { key, value: raw.clone() })?;
    Ok(())
}
