use runtime::{Listeners, SubscriptionId};
use scene::{ObjectPick, UiFlags};
use streaming::StreamingStats;

use crate::state::{ClickProcessingState, NavigationLevel};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    LevelChanged,
    ClickStateChanged,
    ObjectSelected,
    TileStats,
    UiRestored,
}

/// Ids are only unique per event kind, so the kind travels with them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EventSubscription {
    pub kind: EventKind,
    pub id: SubscriptionId,
}

/// Typed notifications for UI collaborators.
///
/// One listener registry per event kind; delivery is synchronous and
/// fire-and-forget.
#[derive(Debug, Default)]
pub struct NavigationEvents {
    pub(crate) level_changed: Listeners<NavigationLevel>,
    pub(crate) click_state_changed: Listeners<ClickProcessingState>,
    pub(crate) object_selected: Listeners<ObjectPick>,
    pub(crate) tile_stats: Listeners<StreamingStats>,
    pub(crate) ui_restored: Listeners<UiFlags>,
}

impl NavigationEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_level_changed(
        &self,
        callback: impl Fn(&NavigationLevel) + Send + Sync + 'static,
    ) -> EventSubscription {
        EventSubscription {
            kind: EventKind::LevelChanged,
            id: self.level_changed.subscribe(callback),
        }
    }

    pub fn on_click_state_changed(
        &self,
        callback: impl Fn(&ClickProcessingState) + Send + Sync + 'static,
    ) -> EventSubscription {
        EventSubscription {
            kind: EventKind::ClickStateChanged,
            id: self.click_state_changed.subscribe(callback),
        }
    }

    pub fn on_object_selected(
        &self,
        callback: impl Fn(&ObjectPick) + Send + Sync + 'static,
    ) -> EventSubscription {
        EventSubscription {
            kind: EventKind::ObjectSelected,
            id: self.object_selected.subscribe(callback),
        }
    }

    /// Loaded and visible tile counts after every streaming pass.
    pub fn on_tile_stats(
        &self,
        callback: impl Fn(&StreamingStats) + Send + Sync + 'static,
    ) -> EventSubscription {
        EventSubscription {
            kind: EventKind::TileStats,
            id: self.tile_stats.subscribe(callback),
        }
    }

    /// UI flags handed back by a cancelled navigation.
    pub fn on_ui_restored(
        &self,
        callback: impl Fn(&UiFlags) + Send + Sync + 'static,
    ) -> EventSubscription {
        EventSubscription {
            kind: EventKind::UiRestored,
            id: self.ui_restored.subscribe(callback),
        }
    }

    pub fn unsubscribe(&self, subscription: EventSubscription) -> bool {
        let id = subscription.id;
        match subscription.kind {
            EventKind::LevelChanged => self.level_changed.unsubscribe(id),
            EventKind::ClickStateChanged => self.click_state_changed.unsubscribe(id),
            EventKind::ObjectSelected => self.object_selected.unsubscribe(id),
            EventKind::TileStats => self.tile_stats.unsubscribe(id),
            EventKind::UiRestored => self.ui_restored.unsubscribe(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::NavigationEvents;
    use crate::state::NavigationLevel;

    #[test]
    fn unsubscribe_only_touches_its_own_kind() {
        let events = NavigationEvents::new();
        let levels = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&levels);
        let level_sub = events.on_level_changed(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let stats_sub = events.on_tile_stats(|_| {});
        assert_eq!(level_sub.id, stats_sub.id);

        assert!(events.unsubscribe(stats_sub));
        events.level_changed.emit(&NavigationLevel::Area);
        assert_eq!(levels.load(Ordering::SeqCst), 1);
        assert!(events.unsubscribe(level_sub));
        assert!(!events.unsubscribe(level_sub));
    }
}
