//! Viewport tile streamer.
//!
//! On every (debounced) camera-settle event a streaming pass:
//! 1. reads the viewport rectangle and expands it into the buffer zone,
//! 2. reclassifies loaded tiles as visible, buffered or hidden and applies
//!    all visibility flips as one batch followed by a single render request,
//! 3. loads missing buffer tiles center-out through a bounded window,
//!    attaching each at zero opacity and fading it in,
//! 4. evicts hidden tiles beyond the registry cap,
//! 5. checks the tracked-visible set and publishes stats.
//!
//! A pass covers at most `max_tiles_per_pass` tiles: a wider buffer (a camera
//! high above the ground) is cut down to the block around the viewport center.
//! Passes never overlap: a pass that finds another one running is dropped.
//! Dropping a pass future mid-load hands its unfinished tiles back as `Error`
//! so the next pass retries them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use foundation::{GeoPoint, GeoRect};
use parking_lot::{Mutex, RwLock};
use runtime::{Debouncer, Listeners, Metrics, SubscriptionId};
use scene::{BoxFuture, CameraController, FeatureCollection, GroupHandle, Scene};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::StreamingConfig;
use crate::gateway::{DataGateway, FetchOptions, FetchPriority, FetchResult};
use crate::grid::{TileGrid, TileId, TileSpan};
use crate::queue::{LoadQueue, LoadTier};
use crate::registry::{TileRecord, TileRegistry};
use crate::tile::{TileLoadState, TileVisibility};

/// Opaque per-tile post-processing applied to fetched features before they
/// are attached (styling, extrusion and similar).
pub type FeatureEnricher = Arc<dyn Fn(TileId, &mut FeatureCollection) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct StreamingStats {
    /// Loaded tiles held by the registry.
    pub tile_count: usize,
    /// Tiles whose groups are currently drawn.
    pub visible_count: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    /// The camera has no ground intersection; nothing was touched.
    NoViewport,
    /// Another pass was running; this one was dropped.
    Busy,
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub viewport: Option<GeoRect>,
    /// Tiles in the order their loads were started.
    pub load_order: Vec<TileId>,
    pub loaded: Vec<TileId>,
    pub failed: Vec<TileId>,
    pub shown: Vec<TileId>,
    pub hidden: Vec<TileId>,
    pub evicted: Vec<TileId>,
}

impl PassReport {
    fn new(outcome: PassOutcome) -> Self {
        Self {
            outcome,
            viewport: None,
            load_order: Vec::new(),
            loaded: Vec::new(),
            failed: Vec::new(),
            shown: Vec::new(),
            hidden: Vec::new(),
            evicted: Vec::new(),
        }
    }
}

enum TileLoad {
    Loaded(TileId),
    Failed(TileId),
}

struct StreamState {
    registry: TileRegistry,
    /// Tiles believed to have a drawn group; must stay a subset of reality.
    tracked_visible: BTreeSet<TileId>,
    metrics: Metrics,
}

struct Shared {
    config: StreamingConfig,
    grid: TileGrid,
    camera: CameraController,
    gateway: Arc<dyn DataGateway>,
    scene: Arc<dyn Scene>,
    enricher: RwLock<Option<FeatureEnricher>>,
    state: Mutex<StreamState>,
    streaming: AtomicBool,
    enabled: AtomicBool,
    debouncer: Debouncer,
    stats: Listeners<StreamingStats>,
}

/// Held for the duration of one pass.
struct PassLock<'a>(&'a AtomicBool);

impl<'a> PassLock<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassLock<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tiles a pass marked `Loading`. Whatever is still loading when this drops
/// is failed back to `Error`.
struct InFlight<'a> {
    shared: &'a Shared,
    tiles: Vec<TileId>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let abandoned = {
            let mut st = self.shared.state.lock();
            let mut abandoned = 0u64;
            for id in &self.tiles {
                if st.registry.state(*id) == TileLoadState::Loading
                    && st.registry.fail_load(*id).is_ok()
                {
                    abandoned += 1;
                }
            }
            st.metrics.incr_by("loads_abandoned", abandoned);
            abandoned
        };
        if abandoned > 0 {
            debug!("{abandoned} tile load(s) abandoned before settling");
        }
    }
}

#[derive(Clone)]
pub struct TileStreamer {
    shared: Arc<Shared>,
}

impl TileStreamer {
    pub fn new(
        config: StreamingConfig,
        camera: CameraController,
        gateway: Arc<dyn DataGateway>,
        scene: Arc<dyn Scene>,
    ) -> Self {
        let grid = TileGrid::new(config.tile_size_deg);
        let debouncer = Debouncer::new(config.debounce());
        let registry = TileRegistry::new(config.max_loaded_tiles);
        Self {
            shared: Arc::new(Shared {
                config,
                grid,
                camera,
                gateway,
                scene,
                enricher: RwLock::new(None),
                state: Mutex::new(StreamState {
                    registry,
                    tracked_visible: BTreeSet::new(),
                    metrics: Metrics::new(),
                }),
                streaming: AtomicBool::new(false),
                enabled: AtomicBool::new(true),
                debouncer,
                stats: Listeners::new(),
            }),
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.shared.config
    }

    pub fn grid(&self) -> TileGrid {
        self.shared.grid
    }

    pub fn set_enricher(&self, enricher: Option<FeatureEnricher>) {
        *self.shared.enricher.write() = enricher;
    }

    /// A disabled streamer drops scheduled passes and runs none.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.shared.debouncer.cancel();
        }
        debug!("tile streaming {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::Acquire)
    }

    pub fn on_stats(
        &self,
        callback: impl Fn(&StreamingStats) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.shared.stats.subscribe(callback)
    }

    pub fn unsubscribe_stats(&self, id: SubscriptionId) -> bool {
        self.shared.stats.unsubscribe(id)
    }

    pub fn stats(&self) -> StreamingStats {
        let st = self.shared.state.lock();
        StreamingStats {
            tile_count: st.registry.loaded_len(),
            visible_count: st.tracked_visible.len(),
        }
    }

    pub fn metrics(&self) -> Metrics {
        self.shared.state.lock().metrics.clone()
    }

    pub fn tile(&self, id: TileId) -> Option<TileRecord> {
        self.shared.state.lock().registry.get(id).cloned()
    }

    pub fn tile_state(&self, id: TileId) -> TileLoadState {
        self.shared.state.lock().registry.state(id)
    }

    pub fn tracked_visible(&self) -> BTreeSet<TileId> {
        self.shared.state.lock().tracked_visible.clone()
    }

    /// Ids of every tile the registry knows about, loaded or not.
    pub fn known_tiles(&self) -> Vec<TileId> {
        self.shared
            .state
            .lock()
            .registry
            .iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Schedules a pass once the camera has been still for the debounce
    /// window.
    pub fn on_camera_moved(&self) {
        if !self.is_enabled() {
            return;
        }
        let streamer = self.clone();
        self.shared.debouncer.call(move || async move {
            streamer.run_pass().await;
        });
    }

    pub async fn run_pass(&self) -> PassReport {
        let shared = &*self.shared;
        if !self.is_enabled() {
            return PassReport::new(PassOutcome::Disabled);
        }
        let Some(lock) = PassLock::acquire(&shared.streaming) else {
            debug!("streaming pass dropped: previous pass still running");
            shared.state.lock().metrics.incr("passes_dropped");
            return PassReport::new(PassOutcome::Busy);
        };
        let Some(viewport) = shared.camera.viewport_rectangle() else {
            debug!("streaming pass skipped: camera has no ground intersection");
            shared.state.lock().metrics.incr("passes_without_viewport");
            return PassReport::new(PassOutcome::NoViewport);
        };

        let started = Instant::now();
        let center = viewport.center();
        let view_span = shared.grid.span(&viewport);
        let mut buffer_span = shared.grid.span(&viewport.expand(shared.config.buffer_fraction));
        let limit = shared.config.max_tiles_per_pass.max(1);
        if buffer_span.len() > limit {
            let full = buffer_span.len();
            buffer_span = buffer_span.around(shared.grid.tile_at(center), limit);
            debug!(
                "streaming pass limited to {} of {full} buffer tiles around the viewport center",
                buffer_span.len()
            );
            shared.state.lock().metrics.incr("passes_limited");
        }
        let buffer_tiles: BTreeSet<TileId> = buffer_span.tiles().into_iter().collect();
        let view_tiles: BTreeSet<TileId> = buffer_tiles
            .iter()
            .copied()
            .filter(|id| view_span.contains(*id))
            .collect();
        debug!(
            "streaming pass start: {} viewport tiles, {} buffer tiles",
            view_tiles.len(),
            buffer_tiles.len()
        );

        let classify = |id: &TileId| {
            if view_tiles.contains(id) {
                TileVisibility::Visible
            } else if buffer_tiles.contains(id) {
                TileVisibility::Buffered
            } else {
                TileVisibility::Hidden
            }
        };

        let mut report = PassReport::new(PassOutcome::Completed);
        report.viewport = Some(viewport);

        // Collect every flip first, then apply them and render once.
        let mut flips: Vec<(GroupHandle, bool)> = Vec::new();
        {
            let mut st = shared.state.lock();
            let StreamState {
                registry,
                tracked_visible,
                metrics,
            } = &mut *st;
            for id in registry.loaded_ids() {
                let target = classify(&id);
                let Ok(group) = registry.set_visibility(id, target) else {
                    continue;
                };
                let drawn = target.is_drawn();
                if drawn {
                    tracked_visible.insert(id);
                } else {
                    tracked_visible.remove(&id);
                }
                if group.is_visible() != drawn {
                    if drawn {
                        report.shown.push(id);
                    } else {
                        report.hidden.push(id);
                    }
                    flips.push((group, drawn));
                }
            }
            metrics.incr_by("tiles_hidden", report.hidden.len() as u64);
        }
        if !flips.is_empty() {
            for (group, visible) in &flips {
                group.set_visible(*visible);
            }
            shared.scene.request_render();
        }

        let mut queue = LoadQueue::new();
        let mut in_flight = InFlight {
            shared,
            tiles: Vec::new(),
        };
        {
            let mut st = shared.state.lock();
            for id in &buffer_tiles {
                if st.registry.try_begin_load(*id) {
                    in_flight.tiles.push(*id);
                    let tier = if view_tiles.contains(id) {
                        LoadTier::Viewport
                    } else {
                        LoadTier::Buffer
                    };
                    queue.push_ranked(&shared.grid, center, tier, *id);
                }
            }
        }

        let window = Arc::new(Semaphore::new(shared.config.max_concurrent_loads.max(1)));
        let mut loads = JoinSet::new();
        while let Some((_, id)) = queue.pop() {
            let permit = match Arc::clone(&window).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!("tile {id} not loaded: {e}");
                    let _ = shared.state.lock().registry.fail_load(id);
                    continue;
                }
            };
            let fetch = shared.gateway.fetch_by_bounding_box(
                shared.grid.bounds(id),
                shared.config.source.clone(),
                FetchOptions::default(),
            );
            report.load_order.push(id);
            loads.spawn(load_tile(
                Arc::clone(&self.shared),
                id,
                classify(&id),
                fetch,
                permit,
            ));
        }
        while let Some(joined) = loads.join_next().await {
            match joined {
                Ok(TileLoad::Loaded(id)) => report.loaded.push(id),
                Ok(TileLoad::Failed(id)) => report.failed.push(id),
                Err(e) => warn!("tile load task ended abnormally: {e}"),
            }
        }

        let evicted = {
            let mut st = shared.state.lock();
            let evicted = st.registry.evict_over_cap(&buffer_tiles);
            for (id, _) in &evicted {
                st.tracked_visible.remove(id);
            }
            st.metrics.incr_by("tiles_evicted", evicted.len() as u64);
            let forgotten = st.registry.forget_unloaded(&buffer_tiles);
            st.metrics.incr_by("records_forgotten", forgotten as u64);
            evicted
        };
        for (id, group) in evicted {
            debug!("evicted tile {id}");
            shared.scene.detach_group(&group);
            report.evicted.push(id);
        }

        self.check_visibility_consistency();

        let stats = {
            let mut st = shared.state.lock();
            let stats = StreamingStats {
                tile_count: st.registry.loaded_len(),
                visible_count: st.tracked_visible.len(),
            };
            st.metrics.incr("passes");
            st.metrics
                .observe("pass_ms", started.elapsed().as_secs_f64() * 1000.0);
            st.metrics.set_gauge("tiles_loaded", stats.tile_count as i64);
            st.metrics.set_gauge("tiles_visible", stats.visible_count as i64);
            debug!(
                "streaming pass finished: loaded={} failed={} shown={} hidden={} evicted={} | {}",
                report.loaded.len(),
                report.failed.len(),
                report.shown.len(),
                report.hidden.len(),
                report.evicted.len(),
                st.metrics.render()
            );
            stats
        };
        shared.stats.emit(&stats);

        drop(in_flight);
        drop(lock);
        if shared.config.prefetch {
            self.spawn_prefetch(&buffer_span, center);
        }
        report
    }

    /// Compares the tracked-visible set with the real group state, logs each
    /// divergence and repairs it. Returns the tiles that had diverged.
    pub fn check_visibility_consistency(&self) -> Vec<TileId> {
        let shared = &*self.shared;
        let mut diverged = Vec::new();
        let mut reshown = false;
        {
            let mut st = shared.state.lock();
            let StreamState {
                registry,
                tracked_visible,
                ..
            } = &mut *st;

            for (id, record) in registry.iter() {
                if !record.visibility().is_drawn() {
                    continue;
                }
                if let Some(group) = record.group()
                    && !group.is_visible()
                {
                    warn!("tile {id} is classed {:?} but its group is hidden", record.visibility());
                    group.set_visible(true);
                    tracked_visible.insert(id);
                    reshown = true;
                    diverged.push(id);
                }
            }

            let stale: Vec<TileId> = tracked_visible
                .iter()
                .copied()
                .filter(|id| {
                    !registry
                        .get(*id)
                        .and_then(TileRecord::group)
                        .is_some_and(|g| g.is_visible())
                })
                .collect();
            for id in stale {
                warn!("tile {id} is tracked as visible but has no drawn group");
                tracked_visible.remove(&id);
                diverged.push(id);
            }
        }
        if reshown {
            shared.scene.request_render();
        }
        diverged
    }

    /// Warms the gateway cache for the ring of tiles around `buffer`, nearest
    /// first, one request at a time at low priority. Never touches the
    /// registry.
    fn spawn_prefetch(&self, buffer: &TileSpan, center: GeoPoint) {
        let shared = &*self.shared;
        let mut queue = LoadQueue::new();
        {
            let st = shared.state.lock();
            for id in buffer.ring() {
                if st.registry.state(id) == TileLoadState::NotLoaded {
                    queue.push_ranked(&shared.grid, center, LoadTier::Prefetch, id);
                }
            }
        }
        let mut ring: Vec<GeoRect> = Vec::with_capacity(queue.len());
        while let Some((_, id)) = queue.pop() {
            ring.push(shared.grid.bounds(id));
        }
        if ring.is_empty() {
            return;
        }
        let gateway = Arc::clone(&shared.gateway);
        let source = shared.config.source.clone();
        let options = FetchOptions::default().with_priority(FetchPriority::Low);
        tokio::spawn(async move {
            let total = ring.len();
            let mut warmed = 0usize;
            for rect in ring {
                if gateway
                    .fetch_by_bounding_box(rect, source.clone(), options.clone())
                    .await
                    .is_ok()
                {
                    warmed += 1;
                }
            }
            debug!("prefetch warmed {warmed}/{total} tiles");
        });
    }
}

async fn load_tile(
    shared: Arc<Shared>,
    id: TileId,
    visibility: TileVisibility,
    fetch: BoxFuture<'static, FetchResult>,
    permit: OwnedSemaphorePermit,
) -> TileLoad {
    let started = Instant::now();
    let mut features = match fetch.await {
        Ok(features) => features,
        Err(e) => {
            warn!("tile {id} load failed: {e}");
            let mut st = shared.state.lock();
            if let Err(err) = st.registry.fail_load(id) {
                warn!("tile {id}: {err}");
            }
            st.metrics.incr("tiles_failed");
            return TileLoad::Failed(id);
        }
    };

    let enricher = shared.enricher.read().clone();
    if let Some(enrich) = enricher {
        enrich(id, &mut features);
    }

    let group = shared.scene.attach_group(&format!("tile:{id}"), &features, 0.0);
    group.set_visible(visibility.is_drawn());
    let completed = {
        let mut st = shared.state.lock();
        let completed =
            st.registry
                .complete_load(id, Arc::clone(&group), features.len(), visibility);
        if completed.is_ok() {
            if visibility.is_drawn() {
                st.tracked_visible.insert(id);
            }
            st.metrics.incr("tiles_loaded");
            st.metrics
                .observe("tile_load_ms", started.elapsed().as_secs_f64() * 1000.0);
        }
        completed
    };
    drop(permit);

    if let Err(e) = completed {
        warn!("discarding tile {id}: {e}");
        shared.scene.detach_group(&group);
        return TileLoad::Failed(id);
    }

    let fade = shared.config.fade();
    let scene = Arc::clone(&shared.scene);
    tokio::spawn(async move {
        fade.run(&group, scene.as_ref()).await;
    });
    TileLoad::Loaded(id)
}
