/// Load lifecycle of a single tile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TileLoadState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Error,
}

impl TileLoadState {
    /// Whether a new load may be started from this state.
    pub fn can_begin_load(self) -> bool {
        matches!(self, TileLoadState::NotLoaded | TileLoadState::Error)
    }
}

/// Visibility class of a tile relative to the current view.
///
/// `Buffered` tiles sit in the zone around the viewport; their groups stay
/// drawn so panning into them is instant. Only `Hidden` groups are turned off.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TileVisibility {
    Visible,
    Buffered,
    #[default]
    Hidden,
}

impl TileVisibility {
    pub fn is_drawn(self) -> bool {
        !matches!(self, TileVisibility::Hidden)
    }
}
