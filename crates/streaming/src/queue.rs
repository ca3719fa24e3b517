use std::cmp::Ordering;

use foundation::GeoPoint;
use runtime::work_queue::WorkQueue;

use crate::grid::{TileGrid, TileId};

/// Coarse load class; lower tiers always load first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadTier {
    Viewport = 0,
    Buffer = 1,
    Prefetch = 2,
}

/// Tier first, then squared distance from tile center to viewport center.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LoadPriority {
    pub tier: LoadTier,
    pub distance_sq: f64,
}

impl LoadPriority {
    pub fn new(tier: LoadTier, distance_sq: f64) -> Self {
        Self { tier, distance_sq }
    }
}

impl Eq for LoadPriority {}

impl PartialOrd for LoadPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tier
            .cmp(&other.tier)
            .then_with(|| self.distance_sq.total_cmp(&other.distance_sq))
    }
}

/// Center-out tile load queue for one streaming pass.
///
/// A thin wrapper over `runtime::WorkQueue`: equal priorities keep insertion
/// order, so the result is deterministic for a given viewport.
#[derive(Debug, Default)]
pub struct LoadQueue {
    inner: WorkQueue<LoadPriority, TileId>,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Queues `tile` ranked by its center's distance to `center`.
    pub fn push_ranked(
        &mut self,
        grid: &TileGrid,
        center: GeoPoint,
        tier: LoadTier,
        tile: TileId,
    ) {
        let distance_sq = grid.center(tile).distance_sq(center);
        self.inner.push(LoadPriority::new(tier, distance_sq), tile);
    }

    pub fn pop(&mut self) -> Option<(LoadPriority, TileId)> {
        let (_, priority, tile) = self.inner.pop_next()?;
        Some((priority, tile))
    }
}
