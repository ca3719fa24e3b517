use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fade::FadeIn;
use crate::gateway::SourceKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Edge length of a grid cell in degrees.
    pub tile_size_deg: f64,
    /// Fraction of the viewport size added on each side for the buffer zone.
    pub buffer_fraction: f64,
    pub debounce_ms: u64,
    pub max_concurrent_loads: usize,
    pub fade_duration_ms: u64,
    pub fade_steps: u32,
    pub target_opacity: f32,
    /// Loaded-tile cap of the registry; hidden tiles beyond it are evicted.
    pub max_loaded_tiles: usize,
    /// Most tiles one pass covers. Wider buffers are cut down to the block
    /// nearest the viewport center.
    pub max_tiles_per_pass: usize,
    /// Warm the gateway cache for the ring of tiles around the buffer.
    pub prefetch: bool,
    pub source: SourceKind,
    pub cache_ttl_s: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            tile_size_deg: 0.02,
            buffer_fraction: 0.2,
            debounce_ms: 300,
            max_concurrent_loads: 3,
            fade_duration_ms: 300,
            fade_steps: 10,
            target_opacity: 1.0,
            max_loaded_tiles: 256,
            max_tiles_per_pass: 128,
            prefetch: true,
            source: SourceKind::Buildings,
            cache_ttl_s: 3600,
        }
    }
}

impl StreamingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_s)
    }

    pub fn fade(&self) -> FadeIn {
        FadeIn::new(
            Duration::from_millis(self.fade_duration_ms),
            self.fade_steps,
            self.target_opacity,
        )
    }

    /// Human-readable problems with this configuration, empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !(self.tile_size_deg.is_finite() && self.tile_size_deg > 0.0) {
            out.push(format!("tile_size_deg must be > 0 (got {})", self.tile_size_deg));
        }
        if !(self.buffer_fraction.is_finite() && self.buffer_fraction >= 0.0) {
            out.push(format!(
                "buffer_fraction must be >= 0 (got {})",
                self.buffer_fraction
            ));
        }
        if self.max_concurrent_loads == 0 {
            out.push("max_concurrent_loads must be >= 1".to_string());
        }
        if self.max_tiles_per_pass == 0 {
            out.push("max_tiles_per_pass must be >= 1".to_string());
        } else if self.max_tiles_per_pass > self.max_loaded_tiles {
            out.push(format!(
                "max_tiles_per_pass ({}) must not exceed max_loaded_tiles ({})",
                self.max_tiles_per_pass, self.max_loaded_tiles
            ));
        }
        if self.fade_steps == 0 {
            out.push("fade_steps must be >= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.target_opacity) {
            out.push(format!(
                "target_opacity must be within 0..=1 (got {})",
                self.target_opacity
            ));
        }
        out
    }
}
