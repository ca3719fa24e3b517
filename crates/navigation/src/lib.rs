//! Click-driven drill-down (region, area, object) on top of the tile
//! streamer: navigation context, typed events, the click state machine and
//! the navigator that routes picks.

pub mod click;
pub mod config;
pub mod context;
pub mod events;
pub mod orchestrator;
pub mod state;

pub use click::*;
pub use config::*;
pub use context::NavigationContext;
pub use events::*;
pub use orchestrator::*;
pub use state::*;
