//! Capability traits the orchestration layer consumes from the 3D engine.
//!
//! The engine itself (projection, entity rendering, picking) lives outside
//! this workspace; everything here talks to it through these seams.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::features::FeatureCollection;
use crate::picking::PickedObject;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pointer position in canvas pixels.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A drawable group of entities owned by the scene (one per tile or area).
pub trait RenderGroup: Send + Sync + std::fmt::Debug {
    fn label(&self) -> &str;
    fn entity_count(&self) -> usize;
    fn set_visible(&self, visible: bool);
    fn is_visible(&self) -> bool;
    fn set_opacity(&self, opacity: f32);
    fn opacity(&self) -> f32;
}

pub type GroupHandle = Arc<dyn RenderGroup>;

pub trait Scene: Send + Sync {
    /// Builds a render group from `features` and adds it to the scene.
    fn attach_group(&self, label: &str, features: &FeatureCollection, opacity: f32)
    -> GroupHandle;

    fn detach_group(&self, group: &GroupHandle);

    /// Asks the engine for one redraw on its next frame.
    fn request_render(&self);

    fn pick(&self, at: ScreenPoint) -> Option<PickedObject>;

    fn set_highlighted(&self, object_id: &str, highlighted: bool);
}
