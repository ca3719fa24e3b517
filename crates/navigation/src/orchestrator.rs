use std::sync::Arc;

use parking_lot::Mutex;
use runtime::LeadingGate;
use scene::{
    CameraController, Highlighter, PickTarget, PickedObject, Scene, ScreenPoint, classify,
};
use streaming::{DataGateway, TileStreamer};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::click::{AreaMetadata, ClickProcessor, SelectionError, SelectionHandle};
use crate::config::NavigatorConfig;
use crate::context::NavigationContext;
use crate::events::NavigationEvents;
use crate::state::{ClickProcessingState, NavigationLevel, TransitionError};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Within the pick debounce window of the previous pick.
    Debounced,
    /// A drill-down is in flight.
    Busy,
}

#[derive(Debug)]
pub enum PickOutcome {
    Ignored(IgnoreReason),
    AreaSelection(SelectionHandle),
    ObjectSelected(String),
    Rejected(TransitionError),
    /// Empty space or an object without navigation identity.
    Nothing,
}

/// Top-level entry point: routes picks to the click processor or to direct
/// object selection, and owns the streamer wired to the same camera.
pub struct Navigator {
    config: NavigatorConfig,
    events: Arc<NavigationEvents>,
    context: Arc<NavigationContext>,
    scene: Arc<dyn Scene>,
    streamer: TileStreamer,
    clicks: ClickProcessor,
    gate: Mutex<LeadingGate>,
    highlighter: Mutex<Highlighter>,
}

impl Navigator {
    pub fn new(
        config: NavigatorConfig,
        camera: CameraController,
        gateway: Arc<dyn DataGateway>,
        scene: Arc<dyn Scene>,
    ) -> Self {
        let events = Arc::new(NavigationEvents::new());
        let context = Arc::new(NavigationContext::new(Arc::clone(&events)));

        let streamer = TileStreamer::new(
            config.streaming.clone(),
            camera.clone(),
            Arc::clone(&gateway),
            Arc::clone(&scene),
        );
        let forward = Arc::clone(&events);
        streamer.on_stats(move |stats| forward.tile_stats.emit(stats));

        let clicks = ClickProcessor::new(
            config.click.clone(),
            Arc::clone(&context),
            camera,
            gateway,
            Arc::clone(&scene),
            Some(streamer.clone()),
        );
        let gate = Mutex::new(LeadingGate::new(config.picking.debounce()));

        Self {
            config,
            events,
            context,
            scene,
            streamer,
            clicks,
            gate,
            highlighter: Mutex::new(Highlighter::new()),
        }
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<NavigationEvents> {
        &self.events
    }

    pub fn context(&self) -> &Arc<NavigationContext> {
        &self.context
    }

    pub fn streamer(&self) -> &TileStreamer {
        &self.streamer
    }

    pub fn clicks(&self) -> &ClickProcessor {
        &self.clicks
    }

    pub fn level(&self) -> NavigationLevel {
        self.context.level()
    }

    pub fn click_state(&self) -> ClickProcessingState {
        self.context.click_state()
    }

    pub fn highlighted(&self) -> Option<String> {
        self.highlighter.lock().current().map(str::to_string)
    }

    /// Forwards camera movement to the streamer's debounced pass.
    pub fn on_camera_moved(&self) {
        self.streamer.on_camera_moved();
    }

    pub fn handle_click(&self, at: ScreenPoint) -> PickOutcome {
        let picked = self.scene.pick(at);
        self.handle_pick(picked)
    }

    pub fn handle_pick(&self, picked: Option<PickedObject>) -> PickOutcome {
        let Some(picked) = picked else {
            return PickOutcome::Nothing;
        };
        if self.context.is_processing() {
            debug!("pick on {} ignored while a selection is in flight", picked.id);
            return PickOutcome::Ignored(IgnoreReason::Busy);
        }
        if !self.gate.lock().admit(Instant::now()) {
            debug!("pick on {} ignored by the debounce", picked.id);
            return PickOutcome::Ignored(IgnoreReason::Debounced);
        }

        match classify(&picked, &self.config.picking.keys) {
            PickTarget::Area(area) => {
                self.highlighter.lock().clear(self.scene.as_ref());
                let metadata = AreaMetadata {
                    name: area.name,
                    centroid: area.centroid,
                };
                match self.clicks.begin_area_selection(area.area_id, metadata) {
                    Ok(handle) => PickOutcome::AreaSelection(handle),
                    Err(SelectionError::Busy(current)) => {
                        debug!("area {current} is still being processed");
                        PickOutcome::Ignored(IgnoreReason::Busy)
                    }
                    Err(err) => {
                        warn!("could not start area selection: {err}");
                        PickOutcome::Nothing
                    }
                }
            }
            PickTarget::Object(object) => {
                if let Err(err) = self.context.set_level(NavigationLevel::Object) {
                    warn!("object {} not selected: {err}", object.object_id);
                    return PickOutcome::Rejected(err);
                }
                self.highlighter
                    .lock()
                    .highlight(self.scene.as_ref(), &object.object_id);
                self.scene.request_render();
                info!("selected object {}", object.object_id);
                let id = object.object_id.clone();
                self.events.object_selected.emit(&object);
                PickOutcome::ObjectSelected(id)
            }
            PickTarget::Unrecognized => {
                debug!("pick on {} carries no navigation identity", picked.id);
                PickOutcome::Nothing
            }
        }
    }

    /// Leaves any area or object back to the region overview.
    pub fn reset_to_region(&self) {
        if self.context.is_processing() && self.clicks.cancel().is_err() {
            self.clicks.abandon();
        }
        self.highlighter.lock().clear(self.scene.as_ref());
        self.clicks.detach_area_group();
        self.context.force_level(NavigationLevel::Region);
        self.gate.lock().reset();
        self.scene.request_render();
        info!("returned to region overview");
    }
}
