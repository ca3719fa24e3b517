//! Fixed-size geographic tile grid.
//!
//! Tiles are addressed by integer `(lat_index, lon_index)` pairs obtained by
//! floor-dividing degrees by the tile size. All functions here are pure.

use std::fmt;
use std::str::FromStr;

use foundation::{GeoPoint, GeoRect};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId {
    pub lat_index: i32,
    pub lon_index: i32,
}

impl TileId {
    pub fn new(lat_index: i32, lon_index: i32) -> Self {
        Self {
            lat_index,
            lon_index,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.lat_index, self.lon_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed tile id {0:?}: expected \"<lat_index>_<lon_index>\"")]
pub struct TileIdError(pub String);

impl FromStr for TileId {
    type Err = TileIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Negative indices contain '-', never '_', so the separator is unambiguous.
        let (lat, lon) = s.split_once('_').ok_or_else(|| TileIdError(s.to_string()))?;
        let lat_index = lat.parse().map_err(|_| TileIdError(s.to_string()))?;
        let lon_index = lon.parse().map_err(|_| TileIdError(s.to_string()))?;
        Ok(Self::new(lat_index, lon_index))
    }
}

/// Inclusive block of tile indices.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TileSpan {
    pub lat0: i32,
    pub lat1: i32,
    pub lon0: i32,
    pub lon1: i32,
}

impl TileSpan {
    fn lat_len(&self) -> u64 {
        (i64::from(self.lat1) - i64::from(self.lat0) + 1).max(0) as u64
    }

    fn lon_len(&self) -> u64 {
        (i64::from(self.lon1) - i64::from(self.lon0) + 1).max(0) as u64
    }

    /// Number of tiles in the span, computed without enumerating them.
    pub fn len(&self) -> usize {
        usize::try_from(self.lat_len().saturating_mul(self.lon_len())).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: TileId) -> bool {
        (self.lat0..=self.lat1).contains(&id.lat_index)
            && (self.lon0..=self.lon1).contains(&id.lon_index)
    }

    /// Every tile in the span, in row-major (lat, lon) order.
    pub fn tiles(&self) -> Vec<TileId> {
        let mut out = Vec::with_capacity(self.len());
        for lat in self.lat0..=self.lat1 {
            for lon in self.lon0..=self.lon1 {
                out.push(TileId::new(lat, lon));
            }
        }
        out
    }

    /// The sub-span of at most `max_tiles` tiles centered on `center` as far
    /// as the span's edges allow. Returns `self` when it is small enough.
    pub fn around(&self, center: TileId, max_tiles: usize) -> TileSpan {
        let max = max_tiles.max(1) as u64;
        if self.is_empty() || (self.len() as u64) <= max {
            return *self;
        }
        let side = (max as f64).sqrt().floor().max(1.0) as u64;
        let mut lat_take = self.lat_len().min(side);
        let lon_take = self.lon_len().min(max / lat_take);
        lat_take = self.lat_len().min(max / lon_take);

        let (lat0, lat1) = window(self.lat0, self.lat1, center.lat_index, lat_take);
        let (lon0, lon1) = window(self.lon0, self.lon1, center.lon_index, lon_take);
        TileSpan {
            lat0,
            lat1,
            lon0,
            lon1,
        }
    }

    /// Tiles in the one-tile ring just outside the span.
    pub fn ring(&self) -> Vec<TileId> {
        let (lat0, lat1) = (self.lat0.saturating_sub(1), self.lat1.saturating_add(1));
        let (lon0, lon1) = (self.lon0.saturating_sub(1), self.lon1.saturating_add(1));
        let mut out = Vec::new();
        for lat in lat0..=lat1 {
            for lon in lon0..=lon1 {
                if lat == lat0 || lat == lat1 || lon == lon0 || lon == lon1 {
                    out.push(TileId::new(lat, lon));
                }
            }
        }
        out
    }
}

/// `take` consecutive indices inside `lo..=hi`, centered on `center` where
/// possible.
fn window(lo: i32, hi: i32, center: i32, take: u64) -> (i32, i32) {
    let take = i64::try_from(take).unwrap_or(i64::MAX).max(1);
    let (lo, hi) = (i64::from(lo), i64::from(hi));
    let start = (i64::from(center) - take / 2).clamp(lo, (hi - take + 1).max(lo));
    let end = (start + take - 1).min(hi);
    (start as i32, end as i32)
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TileGrid {
    tile_size_deg: f64,
}

impl TileGrid {
    /// Non-positive or non-finite sizes fall back to 0.01°.
    pub fn new(tile_size_deg: f64) -> Self {
        let tile_size_deg = if tile_size_deg.is_finite() && tile_size_deg > 0.0 {
            tile_size_deg
        } else {
            0.01
        };
        Self { tile_size_deg }
    }

    pub fn tile_size_deg(&self) -> f64 {
        self.tile_size_deg
    }

    fn index(&self, deg: f64) -> i32 {
        (deg / self.tile_size_deg).floor() as i32
    }

    pub fn tile_at(&self, p: GeoPoint) -> TileId {
        TileId::new(self.index(p.lat), self.index(p.lon))
    }

    pub fn bounds(&self, id: TileId) -> GeoRect {
        let s = self.tile_size_deg;
        GeoRect::new(
            id.lon_index as f64 * s,
            id.lat_index as f64 * s,
            (id.lon_index + 1) as f64 * s,
            (id.lat_index + 1) as f64 * s,
        )
    }

    pub fn center(&self, id: TileId) -> GeoPoint {
        self.bounds(id).center()
    }

    /// Index block of every tile intersecting `rect`.
    pub fn span(&self, rect: &GeoRect) -> TileSpan {
        TileSpan {
            lat0: self.index(rect.south),
            lat1: self.index(rect.north),
            lon0: self.index(rect.west),
            lon1: self.index(rect.east),
        }
    }

    /// Every tile intersecting `rect`, in row-major (lat, lon) order.
    pub fn tiles_in(&self, rect: &GeoRect) -> Vec<TileId> {
        self.span(rect).tiles()
    }
}
