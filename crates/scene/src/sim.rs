//! Headless in-memory engine.
//!
//! Implements the engine capability traits without a GPU so the navigation
//! core can be driven from the CLI and from tests. Every side effect the
//! orchestration layer performs is recorded for inspection.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use foundation::math::{Geodetic, Ray, enu_frame, geodetic_to_ecef};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::camera::{CameraPose, CameraRig, FlightError};
use crate::engine::{BoxFuture, GroupHandle, RenderGroup, ScreenPoint, Scene};
use crate::features::FeatureCollection;
use crate::picking::PickedObject;

#[derive(Debug)]
pub struct SimGroup {
    label: String,
    entity_count: usize,
    visible: AtomicBool,
    opacity: Mutex<f32>,
    visibility_changes: AtomicUsize,
    opacity_history: Mutex<Vec<f32>>,
}

impl SimGroup {
    fn new(label: &str, entity_count: usize, opacity: f32) -> Self {
        Self {
            label: label.to_string(),
            entity_count,
            visible: AtomicBool::new(true),
            opacity: Mutex::new(opacity),
            visibility_changes: AtomicUsize::new(0),
            opacity_history: Mutex::new(vec![opacity]),
        }
    }

    /// Number of `set_visible` calls that actually flipped the flag.
    pub fn visibility_changes(&self) -> usize {
        self.visibility_changes.load(Ordering::SeqCst)
    }

    pub fn opacity_history(&self) -> Vec<f32> {
        self.opacity_history.lock().clone()
    }
}

impl RenderGroup for SimGroup {
    fn label(&self) -> &str {
        &self.label
    }

    fn entity_count(&self) -> usize {
        self.entity_count
    }

    fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::SeqCst) != visible {
            self.visibility_changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn set_opacity(&self, opacity: f32) {
        *self.opacity.lock() = opacity;
        self.opacity_history.lock().push(opacity);
    }

    fn opacity(&self) -> f32 {
        *self.opacity.lock()
    }
}

#[derive(Debug, Default)]
pub struct SimScene {
    groups: Mutex<Vec<Arc<SimGroup>>>,
    render_requests: AtomicUsize,
    pickables: Mutex<Vec<(ScreenPoint, PickedObject)>>,
    highlighted: Mutex<BTreeSet<String>>,
    highlight_log: Mutex<Vec<(String, bool)>>,
}

impl SimScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `object` pickable at exactly `at`.
    pub fn place_pickable(&self, at: ScreenPoint, object: PickedObject) {
        let mut pickables = self.pickables.lock();
        pickables.retain(|(p, _)| *p != at);
        pickables.push((at, object));
    }

    pub fn render_requests(&self) -> usize {
        self.render_requests.load(Ordering::SeqCst)
    }

    pub fn groups(&self) -> Vec<Arc<SimGroup>> {
        self.groups.lock().clone()
    }

    pub fn group(&self, label: &str) -> Option<Arc<SimGroup>> {
        self.groups.lock().iter().find(|g| g.label == label).cloned()
    }

    pub fn highlighted(&self) -> BTreeSet<String> {
        self.highlighted.lock().clone()
    }

    pub fn highlight_log(&self) -> Vec<(String, bool)> {
        self.highlight_log.lock().clone()
    }
}

impl Scene for SimScene {
    fn attach_group(
        &self,
        label: &str,
        features: &FeatureCollection,
        opacity: f32,
    ) -> GroupHandle {
        let group = Arc::new(SimGroup::new(label, features.len(), opacity));
        self.groups.lock().push(Arc::clone(&group));
        group
    }

    fn detach_group(&self, group: &GroupHandle) {
        let target = Arc::as_ptr(group) as *const ();
        self.groups
            .lock()
            .retain(|g| Arc::as_ptr(g) as *const () != target);
    }

    fn request_render(&self) {
        self.render_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn pick(&self, at: ScreenPoint) -> Option<PickedObject> {
        self.pickables
            .lock()
            .iter()
            .find(|(p, _)| *p == at)
            .map(|(_, o)| o.clone())
    }

    fn set_highlighted(&self, object_id: &str, highlighted: bool) {
        let mut set = self.highlighted.lock();
        if highlighted {
            set.insert(object_id.to_string());
        } else {
            set.remove(object_id);
        }
        self.highlight_log
            .lock()
            .push((object_id.to_string(), highlighted));
    }
}

#[derive(Debug)]
struct SimCameraInner {
    pose: Mutex<CameraPose>,
    horizontal_fov_deg: f64,
    aspect: f64,
    abort: Notify,
    failing_flights: AtomicU32,
    flights_started: AtomicU32,
    flights_aborted: AtomicU32,
}

/// Pinhole camera over the WGS84 ellipsoid with timer-driven flights.
#[derive(Debug, Clone)]
pub struct SimCamera {
    inner: Arc<SimCameraInner>,
}

impl SimCamera {
    pub fn new(pose: CameraPose) -> Self {
        Self::with_fov(pose, 60.0, 16.0 / 9.0)
    }

    pub fn with_fov(pose: CameraPose, horizontal_fov_deg: f64, aspect: f64) -> Self {
        Self {
            inner: Arc::new(SimCameraInner {
                pose: Mutex::new(pose),
                horizontal_fov_deg,
                aspect: aspect.max(f64::EPSILON),
                abort: Notify::new(),
                failing_flights: AtomicU32::new(0),
                flights_started: AtomicU32::new(0),
                flights_aborted: AtomicU32::new(0),
            }),
        }
    }

    /// The next `n` flights fail halfway without moving the camera.
    pub fn fail_next_flights(&self, n: u32) {
        self.inner.failing_flights.store(n, Ordering::SeqCst);
    }

    pub fn flights_started(&self) -> u32 {
        self.inner.flights_started.load(Ordering::SeqCst)
    }

    pub fn flights_aborted(&self) -> u32 {
        self.inner.flights_aborted.load(Ordering::SeqCst)
    }

    /// Moves the camera east by `meters` at its current latitude.
    pub fn pan_east(&self, meters: f64) {
        let mut pose = self.inner.pose.lock();
        let meters_per_deg_lon = 111_320.0 * pose.lat_deg.to_radians().cos();
        pose.lon_deg += meters / meters_per_deg_lon.max(1.0);
    }
}

impl CameraRig for SimCamera {
    fn pose(&self) -> CameraPose {
        *self.inner.pose.lock()
    }

    fn set_pose(&self, pose: CameraPose) {
        *self.inner.pose.lock() = pose;
    }

    fn corner_rays(&self) -> [Ray; 4] {
        let pose = self.pose();
        let position = Geodetic::from_degrees(pose.lon_deg, pose.lat_deg, pose.height_m);
        let origin = geodetic_to_ecef(position).to_vec3();
        let enu = enu_frame(position);

        let (sin_h, cos_h) = pose.heading_deg.to_radians().sin_cos();
        let (sin_p, cos_p) = pose.pitch_deg.to_radians().sin_cos();
        let horizontal = enu.north.scale(cos_h) + enu.east.scale(sin_h);
        let forward = horizontal.scale(cos_p) + enu.up.scale(sin_p);
        let right = enu.east.scale(cos_h) - enu.north.scale(sin_h);
        let up = right.cross(forward);

        let tan_h = (self.inner.horizontal_fov_deg.to_radians() * 0.5).tan();
        let tan_v = tan_h / self.inner.aspect;
        let corner = |sx: f64, sy: f64| {
            Ray::new(
                origin,
                forward + right.scale(sx * tan_h) + up.scale(sy * tan_v),
            )
        };
        [
            corner(-1.0, 1.0),
            corner(1.0, 1.0),
            corner(1.0, -1.0),
            corner(-1.0, -1.0),
        ]
    }

    fn fly(
        &self,
        destination: CameraPose,
        duration: Duration,
    ) -> BoxFuture<'static, Result<(), FlightError>> {
        let inner = Arc::clone(&self.inner);
        inner.flights_started.fetch_add(1, Ordering::SeqCst);
        let fails = inner
            .failing_flights
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        Box::pin(async move {
            if fails {
                tokio::time::sleep(duration / 2).await;
                return Err(FlightError::Engine("simulated animation failure".into()));
            }
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    *inner.pose.lock() = destination;
                    Ok(())
                }
                _ = inner.abort.notified() => Err(FlightError::Interrupted),
            }
        })
    }

    fn abort_flight(&self) {
        self.inner.flights_aborted.fetch_add(1, Ordering::SeqCst);
        self.inner.abort.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use foundation::GeoPoint;

    use super::{SimCamera, SimScene};
    use crate::camera::{CameraPose, CameraRig};
    use crate::engine::{RenderGroup, ScreenPoint, Scene};
    use crate::features::{Feature, FeatureCollection};
    use crate::picking::PickedObject;

    #[test]
    fn detach_removes_only_that_group() {
        let scene = SimScene::new();
        let fc = FeatureCollection::new(vec![Feature::new("a")]);
        let a = scene.attach_group("tile:a", &fc, 0.0);
        let _b = scene.attach_group("tile:b", &fc, 0.0);
        scene.detach_group(&a);
        let labels: Vec<String> = scene.groups().iter().map(|g| g.label().to_string()).collect();
        assert_eq!(labels, vec!["tile:b".to_string()]);
    }

    #[test]
    fn group_counts_real_visibility_flips() {
        let scene = SimScene::new();
        let g = scene.attach_group("g", &FeatureCollection::default(), 1.0);
        g.set_visible(true);
        g.set_visible(false);
        g.set_visible(false);
        let sim = scene.group("g").unwrap();
        assert_eq!(sim.visibility_changes(), 1);
        assert!(!g.is_visible());
    }

    #[test]
    fn pick_matches_exact_point() {
        let scene = SimScene::new();
        let obj = PickedObject::new("b-1");
        scene.place_pickable(ScreenPoint::new(10.0, 20.0), obj.clone());
        assert_eq!(scene.pick(ScreenPoint::new(10.0, 20.0)), Some(obj));
        assert_eq!(scene.pick(ScreenPoint::new(11.0, 20.0)), None);
    }

    #[test]
    fn pan_east_moves_longitude_only() {
        let cam = SimCamera::new(CameraPose::overhead(GeoPoint::new(24.94, 60.17), 1000.0));
        cam.pan_east(2000.0);
        let pose = cam.pose();
        assert!(pose.lon_deg > 24.97 && pose.lon_deg < 24.98, "lon {}", pose.lon_deg);
        assert_eq!(pose.lat_deg, 60.17);
    }
}
