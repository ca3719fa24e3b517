use std::collections::{BTreeMap, BTreeSet};

use scene::GroupHandle;

use crate::grid::TileId;
use crate::tile::{TileLoadState, TileVisibility};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown tile {0}")]
    UnknownTile(TileId),
    #[error("tile {tile} is {state:?}, expected Loading")]
    NotLoading { tile: TileId, state: TileLoadState },
    #[error("tile {0} has no render group")]
    NotLoaded(TileId),
}

/// Registry entry for one tile.
///
/// The render group is present iff the tile is `Loaded`.
#[derive(Debug, Clone)]
pub struct TileRecord {
    state: TileLoadState,
    visibility: TileVisibility,
    group: Option<GroupHandle>,
    item_count: usize,
    last_accessed: u64,
}

impl TileRecord {
    fn new(tick: u64) -> Self {
        Self {
            state: TileLoadState::NotLoaded,
            visibility: TileVisibility::Hidden,
            group: None,
            item_count: 0,
            last_accessed: tick,
        }
    }

    pub fn state(&self) -> TileLoadState {
        self.state
    }

    pub fn visibility(&self) -> TileVisibility {
        self.visibility
    }

    pub fn group(&self) -> Option<&GroupHandle> {
        self.group.as_ref()
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Logical tick of the last time this tile was shown or touched.
    pub fn last_accessed(&self) -> u64 {
        self.last_accessed
    }
}

/// Indexed map of tile records with a bounded number of loaded tiles.
///
/// Entries are keyed in a `BTreeMap` so traversal and eviction tie-breaks are
/// deterministic. Eviction is LRU by `last_accessed`, then by tile id.
#[derive(Debug)]
pub struct TileRegistry {
    tick: u64,
    max_loaded: usize,
    tiles: BTreeMap<TileId, TileRecord>,
}

impl TileRegistry {
    pub fn new(max_loaded: usize) -> Self {
        Self {
            tick: 0,
            max_loaded,
            tiles: BTreeMap::new(),
        }
    }

    pub fn max_loaded(&self) -> usize {
        self.max_loaded
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn loaded_len(&self) -> usize {
        self.tiles
            .values()
            .filter(|r| r.state == TileLoadState::Loaded)
            .count()
    }

    pub fn get(&self, id: TileId) -> Option<&TileRecord> {
        self.tiles.get(&id)
    }

    pub fn state(&self, id: TileId) -> TileLoadState {
        self.tiles.get(&id).map(|r| r.state).unwrap_or_default()
    }

    pub fn loaded_ids(&self) -> Vec<TileId> {
        self.tiles
            .iter()
            .filter(|(_, r)| r.state == TileLoadState::Loaded)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, &TileRecord)> {
        self.tiles.iter().map(|(id, r)| (*id, r))
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Creates the record on first reference and marks it `Loading`.
    ///
    /// Returns `false` when the tile is already loading or loaded, which is
    /// what keeps at most one load in flight per tile.
    pub fn try_begin_load(&mut self, id: TileId) -> bool {
        let tick = self.next_tick();
        let record = self.tiles.entry(id).or_insert_with(|| TileRecord::new(tick));
        if !record.state.can_begin_load() {
            return false;
        }
        record.state = TileLoadState::Loading;
        true
    }

    pub fn complete_load(
        &mut self,
        id: TileId,
        group: GroupHandle,
        item_count: usize,
        visibility: TileVisibility,
    ) -> Result<(), RegistryError> {
        let tick = self.next_tick();
        let record = self
            .tiles
            .get_mut(&id)
            .ok_or(RegistryError::UnknownTile(id))?;
        if record.state != TileLoadState::Loading {
            return Err(RegistryError::NotLoading {
                tile: id,
                state: record.state,
            });
        }
        record.state = TileLoadState::Loaded;
        record.group = Some(group);
        record.item_count = item_count;
        record.visibility = visibility;
        record.last_accessed = tick;
        Ok(())
    }

    pub fn fail_load(&mut self, id: TileId) -> Result<(), RegistryError> {
        let record = self
            .tiles
            .get_mut(&id)
            .ok_or(RegistryError::UnknownTile(id))?;
        if record.state != TileLoadState::Loading {
            return Err(RegistryError::NotLoading {
                tile: id,
                state: record.state,
            });
        }
        record.state = TileLoadState::Error;
        record.group = None;
        record.item_count = 0;
        Ok(())
    }

    /// Records a new visibility class for a loaded tile and returns its group.
    ///
    /// Drawn tiles are touched so eviction prefers the least recently shown.
    pub fn set_visibility(
        &mut self,
        id: TileId,
        visibility: TileVisibility,
    ) -> Result<GroupHandle, RegistryError> {
        let tick = self.next_tick();
        let record = self
            .tiles
            .get_mut(&id)
            .ok_or(RegistryError::UnknownTile(id))?;
        let group = record.group.clone().ok_or(RegistryError::NotLoaded(id))?;
        record.visibility = visibility;
        if visibility.is_drawn() {
            record.last_accessed = tick;
        }
        Ok(group)
    }

    /// Drops records of tiles that are neither loaded nor loading and lie
    /// outside `keep`. Returns how many were dropped.
    pub fn forget_unloaded(&mut self, keep: &BTreeSet<TileId>) -> usize {
        let before = self.tiles.len();
        self.tiles.retain(|id, r| {
            matches!(r.state, TileLoadState::Loaded | TileLoadState::Loading) || keep.contains(id)
        });
        before - self.tiles.len()
    }

    /// Removes hidden loaded tiles, least recently shown first, until no more
    /// than `max_loaded` tiles are loaded. Tiles in `protected` are never
    /// removed, so the cap can be exceeded when everything loaded is in use.
    ///
    /// The removed groups are returned for the caller to detach.
    pub fn evict_over_cap(&mut self, protected: &BTreeSet<TileId>) -> Vec<(TileId, GroupHandle)> {
        let mut evicted = Vec::new();
        let mut loaded = self.loaded_len();
        while loaded > self.max_loaded {
            let candidate = self
                .tiles
                .iter()
                .filter(|(id, r)| {
                    r.state == TileLoadState::Loaded
                        && r.visibility == TileVisibility::Hidden
                        && !protected.contains(id)
                })
                .min_by(|(ia, ra), (ib, rb)| {
                    ra.last_accessed
                        .cmp(&rb.last_accessed)
                        .then_with(|| ia.cmp(ib))
                })
                .map(|(id, _)| *id);

            let Some(id) = candidate else {
                break;
            };
            if let Some(group) = self.tiles.remove(&id).and_then(|r| r.group) {
                evicted.push((id, group));
            }
            loaded -= 1;
        }
        evicted
    }
}
