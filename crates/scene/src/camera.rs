//! Camera controller: viewport queries, cancellable fly-to and view snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use foundation::math::{Ray, ecef_to_geodetic, ray_ellipsoid_intersection};
use foundation::{GeoPoint, GeoRect};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::BoxFuture;

/// Meters per degree of latitude (spherical approximation).
const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Camera position and orientation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraPose {
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub height_m: f64,
    pub heading_deg: f64,
    /// -90 looks straight down, 0 looks at the horizon.
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

impl CameraPose {
    pub fn overhead(at: GeoPoint, height_m: f64) -> Self {
        Self {
            lon_deg: at.lon,
            lat_deg: at.lat,
            height_m,
            heading_deg: 0.0,
            pitch_deg: -90.0,
            roll_deg: 0.0,
        }
    }

    /// North-facing pose at `height_m` whose line of sight hits `target`.
    pub fn looking_at(target: GeoPoint, height_m: f64, pitch_deg: f64) -> Self {
        let pitch = pitch_deg.clamp(-90.0, -1.0);
        let ground_offset_m = height_m / pitch.to_radians().abs().tan();
        Self {
            lon_deg: target.lon,
            lat_deg: target.lat - ground_offset_m / METERS_PER_DEG_LAT,
            height_m,
            heading_deg: 0.0,
            pitch_deg: pitch,
            roll_deg: 0.0,
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lon_deg, self.lat_deg)
    }
}

/// UI visibility flags restored together with the camera.
pub type UiFlags = BTreeMap<String, bool>;

/// Snapshot used to undo a navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub pose: CameraPose,
    pub ui: UiFlags,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlightError {
    #[error("flight interrupted by the engine")]
    Interrupted,
    #[error("engine flight failed: {0}")]
    Engine(String),
}

/// Camera capability consumed from the rendering engine.
pub trait CameraRig: Send + Sync {
    fn pose(&self) -> CameraPose;

    /// Instant cut, no animation.
    fn set_pose(&self, pose: CameraPose);

    /// World-space (ECEF) rays through the four frustum corners.
    fn corner_rays(&self) -> [Ray; 4];

    /// Animated transition; resolves when the engine finishes or gives up.
    fn fly(
        &self,
        destination: CameraPose,
        duration: Duration,
    ) -> BoxFuture<'static, Result<(), FlightError>>;

    /// Stops any running animation where it is.
    fn abort_flight(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlightOutcome {
    Completed,
    Cancelled,
    Failed(FlightError),
}

/// In-flight camera animation.
///
/// The outcome resolves exactly once: either completed, cancelled or failed.
#[derive(Debug)]
pub struct FlightHandle {
    destination: CameraPose,
    token: CancellationToken,
    outcome: oneshot::Receiver<FlightOutcome>,
}

impl FlightHandle {
    pub fn destination(&self) -> CameraPose {
        self.destination
    }

    /// Token that aborts this flight when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn outcome(self) -> FlightOutcome {
        // A dropped sender means the driver task was torn down with the runtime.
        self.outcome.await.unwrap_or(FlightOutcome::Cancelled)
    }
}

#[derive(Clone)]
pub struct CameraController {
    rig: Arc<dyn CameraRig>,
}

impl CameraController {
    pub fn new(rig: Arc<dyn CameraRig>) -> Self {
        Self { rig }
    }

    pub fn pose(&self) -> CameraPose {
        self.rig.pose()
    }

    /// Ground footprint of the current view.
    ///
    /// `None` when any frustum corner ray misses the ellipsoid (camera looking
    /// at sky or space). That is a normal state, not an error.
    pub fn viewport_rectangle(&self) -> Option<GeoRect> {
        let mut corners = Vec::with_capacity(4);
        for ray in self.rig.corner_rays() {
            let hit = ray_ellipsoid_intersection(ray)?;
            corners.push(ecef_to_geodetic(hit).to_geo_point());
        }
        GeoRect::from_points(corners)
    }

    /// Starts an animated flight that ends looking at `target`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn fly_to(
        &self,
        target: GeoPoint,
        duration: Duration,
        pitch_deg: f64,
        height_m: f64,
    ) -> FlightHandle {
        let destination = CameraPose::looking_at(target, height_m, pitch_deg);
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let flight = self.rig.fly(destination, duration);
        let rig = Arc::clone(&self.rig);
        let cancelled = token.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    rig.abort_flight();
                    FlightOutcome::Cancelled
                }
                res = flight => match res {
                    Ok(()) => FlightOutcome::Completed,
                    Err(e) => FlightOutcome::Failed(e),
                },
            };
            debug!("camera flight settled: {outcome:?}");
            let _ = tx.send(outcome);
        });

        FlightHandle {
            destination,
            token,
            outcome: rx,
        }
    }

    pub fn set_view(&self, pose: CameraPose) {
        self.rig.set_pose(pose);
    }

    pub fn capture_view_state(&self, ui: UiFlags) -> ViewState {
        ViewState {
            pose: self.rig.pose(),
            ui,
        }
    }

    /// Applies the snapshot's camera pose and hands back its UI flags.
    pub fn restore_view_state(&self, state: ViewState) -> UiFlags {
        self.rig.set_pose(state.pose);
        state.ui
    }
}
