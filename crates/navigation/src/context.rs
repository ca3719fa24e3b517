use std::sync::Arc;

use parking_lot::RwLock;
use scene::{UiFlags, ViewState};
use tracing::warn;

use crate::events::NavigationEvents;
use crate::state::{ClickProcessingState, NavigationLevel, TransitionError};

/// The single process-wide navigation state.
///
/// Readers get snapshots; only the click processor and the navigator mutate
/// it, and every mutation is announced on [`NavigationEvents`] after the lock
/// is released.
#[derive(Debug, Default)]
pub struct NavigationContext {
    level: RwLock<NavigationLevel>,
    click: RwLock<ClickProcessingState>,
    ui_flags: RwLock<UiFlags>,
    events: Arc<NavigationEvents>,
}

impl NavigationContext {
    pub fn new(events: Arc<NavigationEvents>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn events(&self) -> &Arc<NavigationEvents> {
        &self.events
    }

    pub fn level(&self) -> NavigationLevel {
        *self.level.read()
    }

    pub fn click_state(&self) -> ClickProcessingState {
        self.click.read().clone()
    }

    pub fn is_processing(&self) -> bool {
        self.click.read().is_processing
    }

    pub fn ui_flags(&self) -> UiFlags {
        self.ui_flags.read().clone()
    }

    pub fn set_ui_flag(&self, name: impl Into<String>, value: bool) {
        self.ui_flags.write().insert(name.into(), value);
    }

    /// Replaces every UI flag, e.g. with the ones a cancelled navigation
    /// captured.
    pub fn replace_ui_flags(&self, flags: UiFlags) {
        *self.ui_flags.write() = flags.clone();
        self.events.ui_restored.emit(&flags);
    }

    /// Validated pick-driven transition. Returns whether the level changed.
    pub(crate) fn set_level(&self, next: NavigationLevel) -> Result<bool, TransitionError> {
        let changed = {
            let mut level = self.level.write();
            let target = level.transition(next)?;
            let changed = *level != target;
            *level = target;
            changed
        };
        if changed {
            self.events.level_changed.emit(&next);
        }
        Ok(changed)
    }

    /// Unvalidated reset, used to return to the region overview.
    pub(crate) fn force_level(&self, next: NavigationLevel) {
        let previous = std::mem::replace(&mut *self.level.write(), next);
        if previous != next {
            self.events.level_changed.emit(&next);
        }
    }

    /// Installs `state` only if no action is in flight.
    pub(crate) fn begin_click(&self, state: ClickProcessingState) -> bool {
        {
            let mut click = self.click.write();
            if click.is_processing {
                return false;
            }
            *click = state.clone();
        }
        self.events.click_state_changed.emit(&state);
        true
    }

    pub(crate) fn update_click(
        &self,
        apply: impl FnOnce(&mut ClickProcessingState),
    ) -> ClickProcessingState {
        let snapshot = {
            let mut click = self.click.write();
            apply(&mut click);
            click.clone()
        };
        if !snapshot.is_consistent() {
            warn!(
                "click state processing without a stage: area={:?}",
                snapshot.area_id
            );
        }
        self.events.click_state_changed.emit(&snapshot);
        snapshot
    }

    pub(crate) fn reset_click(&self) {
        self.update_click(|s| *s = ClickProcessingState::idle());
    }

    /// Hands out the captured view exactly once.
    pub(crate) fn take_previous_view(&self) -> Option<ViewState> {
        self.click.write().previous_view_state.take()
    }
}
