use std::fmt;

use scene::ViewState;
use tokio::time::Instant;

/// Hierarchical drill-down level. Exactly one is active at a time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum NavigationLevel {
    #[default]
    Region,
    Area,
    Object,
}

impl fmt::Display for NavigationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NavigationLevel::Region => "region",
            NavigationLevel::Area => "area",
            NavigationLevel::Object => "object",
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("navigation from {from} to {to} is not allowed")]
pub struct TransitionError {
    pub from: NavigationLevel,
    pub to: NavigationLevel,
}

impl NavigationLevel {
    /// Pick-driven transitions: Region→Area, Area→Object and Object→Area,
    /// plus staying on the same level. Region→Object is never allowed.
    pub fn can_transition_to(self, next: NavigationLevel) -> bool {
        use NavigationLevel::*;
        matches!(
            (self, next),
            (Region, Area)
                | (Area, Object)
                | (Object, Area)
                | (Region, Region)
                | (Area, Area)
                | (Object, Object)
        )
    }

    pub fn transition(self, next: NavigationLevel) -> Result<NavigationLevel, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ClickStage {
    #[default]
    None,
    Loading,
    Animating,
    Complete,
}

/// Error surfaced to the UI after a failed area load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickError {
    pub message: String,
    pub details: Option<String>,
    /// Whether a retry affordance should be offered.
    pub retriable: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoadingProgress {
    pub current: u32,
    pub total: u32,
}

impl LoadingProgress {
    pub fn new(current: u32, total: u32) -> Self {
        Self { current, total }
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1).min(self.total);
    }
}

/// Lifecycle of the single in-flight drill-down action.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClickProcessingState {
    pub is_processing: bool,
    pub area_id: Option<String>,
    pub area_name: Option<String>,
    pub stage: ClickStage,
    pub start_time: Option<Instant>,
    pub can_cancel: bool,
    pub error: Option<ClickError>,
    pub retry_count: u32,
    pub loading_progress: Option<LoadingProgress>,
    pub previous_view_state: Option<ViewState>,
}

impl ClickProcessingState {
    pub fn idle() -> Self {
        Self::default()
    }

    /// `is_processing` implies a stage other than `None`.
    pub fn is_consistent(&self) -> bool {
        !self.is_processing || self.stage != ClickStage::None
    }
}
