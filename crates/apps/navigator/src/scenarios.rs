//! Scripted sessions against the headless engine and an in-memory gateway
//! seeded with central Helsinki.

use std::error::Error;
use std::sync::Arc;

use foundation::GeoPoint;
use navigation::{
    ClickStage, NavigationLevel, Navigator, NavigatorConfig, PickOutcome, SelectionOutcome,
};
use parking_lot::Mutex;
use scene::sim::{SimCamera, SimScene};
use scene::{
    CameraController, CameraPose, CameraRig, Feature, FeatureCollection, PickedObject, ScreenPoint,
};
use streaming::{CachedGateway, FetchError, MemoryGateway, PassOutcome, SourceKind};
use tokio::time::Instant;
use tracing::info;

type ScenarioResult = Result<(), Box<dyn Error>>;

const AREA_ID: &str = "00100";
const CLICK_AT: ScreenPoint = ScreenPoint { x: 640.0, y: 360.0 };

struct World {
    camera: SimCamera,
    scene: Arc<SimScene>,
    memory: MemoryGateway,
    gateway: Arc<CachedGateway<MemoryGateway>>,
    navigator: Navigator,
}

fn area_centroid() -> GeoPoint {
    GeoPoint::new(24.94, 60.17)
}

fn world(config: &NavigatorConfig, start: CameraPose) -> World {
    let camera = SimCamera::new(start);
    let scene = Arc::new(SimScene::new());
    let memory = MemoryGateway::new();

    // Buildings every ~250 m over the city center.
    let mut buildings = Vec::new();
    for row in 0..32 {
        for col in 0..40 {
            let at = GeoPoint::new(24.86 + col as f64 * 0.004, 60.13 + row as f64 * 0.0025);
            buildings.push(
                Feature::point(format!("bldg-{row}-{col}"), at)
                    .with_property("building_id", format!("{row}-{col}")),
            );
        }
    }
    memory.add_features(SourceKind::Buildings, buildings);

    let centroid = area_centroid();
    memory.add_area(
        AREA_ID,
        FeatureCollection::new(
            (0..12)
                .map(|i| {
                    let at = GeoPoint::new(centroid.lon - 0.006 + i as f64 * 0.001, centroid.lat);
                    Feature::point(format!("{AREA_ID}-{i}"), at)
                        .with_property("postinumero", AREA_ID)
                })
                .collect(),
        ),
    );

    let gateway = Arc::new(CachedGateway::new(
        memory.clone(),
        512,
        config.streaming.cache_ttl(),
    ));
    let navigator = Navigator::new(
        config.clone(),
        CameraController::new(Arc::new(camera.clone())),
        gateway.clone(),
        scene.clone(),
    );

    scene.place_pickable(
        CLICK_AT,
        PickedObject::new("area-00100")
            .with_property("postinumero", AREA_ID)
            .with_property("nimi", "Helsinki Keskusta - Etu-Töölö")
            .with_property("center_lon", centroid.lon)
            .with_property("center_lat", centroid.lat),
    );

    World {
        camera,
        scene,
        memory,
        gateway,
        navigator,
    }
}

fn region_view() -> CameraPose {
    CameraPose::overhead(GeoPoint::new(24.93, 60.19), 12_000.0)
}

fn log_click_states(navigator: &Navigator) {
    navigator.events().on_click_state_changed(|s| {
        info!(
            "click state: stage={:?} progress={:?} retries={} error={:?}",
            s.stage,
            s.loading_progress.map(|p| (p.current, p.total)),
            s.retry_count,
            s.error.as_ref().map(|e| &e.message)
        );
    });
}

async fn click_area(w: &World) -> Result<SelectionOutcome, Box<dyn Error>> {
    match w.navigator.handle_click(CLICK_AT) {
        PickOutcome::AreaSelection(handle) => Ok(handle.outcome().await),
        other => Err(format!("area click was not accepted: {other:?}").into()),
    }
}

/// Click an area and follow Loading, Animating and Complete.
pub async fn drill_down(config: &NavigatorConfig) -> ScenarioResult {
    let w = world(config, region_view());
    log_click_states(&w.navigator);

    let started = Instant::now();
    let outcome = click_area(&w).await?;
    info!("drill-down settled after {:?}: {outcome:?}", started.elapsed());
    if !matches!(outcome, SelectionOutcome::Completed { .. }) {
        return Err(format!("expected completion, got {outcome:?}").into());
    }
    if w.navigator.level() != NavigationLevel::Area {
        return Err(format!("expected area level, got {}", w.navigator.level()).into());
    }

    // Let the post-selection streaming pass run.
    tokio::time::sleep(config.streaming.debounce() * 3).await;
    let stats = w.navigator.streamer().stats();
    info!(
        "after drill-down: {} tile(s) loaded, {} visible, {} scene group(s), camera at {:?}",
        stats.tile_count,
        stats.visible_count,
        w.scene.groups().len(),
        w.camera.pose().position()
    );
    Ok(())
}

/// Area data fails twice with network errors, then loads.
pub async fn retry_then_succeed(config: &NavigatorConfig) -> ScenarioResult {
    let w = world(config, region_view());
    log_click_states(&w.navigator);
    w.memory
        .fail_next(2, FetchError::Network("connection reset by peer".into()));

    let completed_retries = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&completed_retries);
    w.navigator.events().on_click_state_changed(move |s| {
        if s.stage == ClickStage::Complete {
            *slot.lock() = Some(s.retry_count);
        }
    });

    let started = Instant::now();
    let outcome = click_area(&w).await?;
    let elapsed = started.elapsed();
    info!("retry scenario settled after {elapsed:?}: {outcome:?}");

    let SelectionOutcome::Completed { attempts, .. } = outcome else {
        return Err(format!("expected completion, got {outcome:?}").into());
    };
    let retries = *completed_retries.lock();
    if attempts != 3 || retries != Some(2) {
        return Err(
            format!("expected 3 attempts and 2 retries, got {attempts} and {retries:?}").into(),
        );
    }
    info!(
        "gateway saw {} area request(s); cache hits={} misses={}",
        w.memory.area_calls(),
        w.gateway.hits(),
        w.gateway.misses()
    );
    Ok(())
}

/// Pan 2 km east: tiles that leave the buffer are hidden, not evicted, and
/// the new viewport loads before the buffer ring.
pub async fn pan_east(config: &NavigatorConfig) -> ScenarioResult {
    let mut config = config.clone();
    config.streaming.prefetch = false;
    let w = world(&config, CameraPose::overhead(area_centroid(), 3000.0));
    let streamer = w.navigator.streamer();

    let first = streamer.run_pass().await;
    info!(
        "initial pass: {} tile(s) loaded in order {:?}",
        first.loaded.len(),
        first.load_order
    );

    w.camera.pan_east(2000.0);
    let second = streamer.run_pass().await;
    info!(
        "after pan: hidden={:?} shown={:?} loaded={:?}",
        second.hidden, second.shown, second.loaded
    );

    for id in &second.hidden {
        let kept = streamer.tile(*id).is_some_and(|t| t.group().is_some());
        if !kept {
            return Err(format!("hidden tile {id} lost its render group").into());
        }
    }
    let Some(viewport) = second.viewport else {
        return Err("camera lost its ground footprint".into());
    };
    let in_view = streamer.grid().tiles_in(&viewport);
    let loads_in_view = second.load_order.iter().any(|t| in_view.contains(t));
    if let Some(first_load) = second.load_order.first()
        && loads_in_view
        && !in_view.contains(first_load)
    {
        return Err(format!("buffer tile {first_load} loaded before the viewport").into());
    }
    info!("metrics after pan:\n{}", streamer.metrics().render());
    Ok(())
}

/// Tilt the camera above the horizon: the pass must not fetch or toggle
/// anything.
pub async fn look_at_sky(config: &NavigatorConfig) -> ScenarioResult {
    let mut config = config.clone();
    config.streaming.prefetch = false;
    let w = world(&config, CameraPose::overhead(area_centroid(), 3000.0));
    let streamer = w.navigator.streamer();
    streamer.run_pass().await;
    let calls = w.memory.call_count();
    let visible = streamer.tracked_visible();

    let mut pose = w.camera.pose();
    pose.pitch_deg = 30.0;
    w.camera.set_pose(pose);

    let report = streamer.run_pass().await;
    if report.outcome != PassOutcome::NoViewport {
        return Err(format!("expected no viewport, got {:?}", report.outcome).into());
    }
    if w.memory.call_count() != calls || streamer.tracked_visible() != visible {
        return Err("sky pass touched the gateway or tile visibility".into());
    }
    info!("sky pass made no calls; {} tile(s) stay visible", visible.len());
    Ok(())
}
