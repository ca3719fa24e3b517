//! Viewport-driven tile streaming: spatial index, tile registry, data
//! gateway seam and the streamer that ties them to the camera.

pub mod cache;
pub mod config;
pub mod fade;
pub mod gateway;
pub mod grid;
pub mod memory;
pub mod queue;
pub mod registry;
pub mod streamer;
pub mod tile;

pub use cache::{CacheKey, CachedGateway, ResponseCache};
pub use config::StreamingConfig;
pub use fade::FadeIn;
pub use gateway::*;
pub use grid::*;
pub use memory::{GatewayCall, MemoryGateway};
pub use queue::*;
pub use registry::*;
pub use streamer::*;
pub use tile::*;
