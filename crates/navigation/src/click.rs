//! Drill-down from a picked area: camera flight and area data load run in
//! parallel, are joined all-settled, and feed a single click state.
//!
//! Every started selection gets an epoch. Cancellation and retry bump the
//! epoch, so effects of a task that settles late are dropped instead of
//! applied. The `settled` flag decides the race between natural completion
//! and `cancel()`: whichever swaps it first wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use foundation::GeoPoint;
use parking_lot::Mutex;
use runtime::{RetryFailure, retry_with_backoff};
use scene::{CameraController, FeatureCollection, FlightHandle, FlightOutcome, GroupHandle, Scene};
use streaming::{DataGateway, FetchError, FetchOptions, FetchPriority, TileStreamer};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClickConfig;
use crate::context::NavigationContext;
use crate::state::{ClickError, ClickProcessingState, ClickStage, LoadingProgress, NavigationLevel};

#[derive(Debug, Clone, PartialEq)]
pub struct AreaMetadata {
    pub name: Option<String>,
    pub centroid: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("area {0} is still being processed")]
    Busy(String),
    #[error("the current selection cannot be cancelled")]
    NotCancellable,
    #[error("there is no retriable failure to retry")]
    NothingToRetry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// Area data arrived. `flight` is `None` for a data-only retry.
    Completed {
        area_id: String,
        flight: Option<FlightOutcome>,
        attempts: u32,
    },
    Failed {
        area_id: String,
        error: FetchError,
        attempts: u32,
    },
    Cancelled {
        area_id: String,
    },
    /// The driving task was torn down before it settled.
    Aborted,
}

/// Join handle of one selection (or retry) task.
#[derive(Debug)]
pub struct SelectionHandle {
    area_id: String,
    task: JoinHandle<SelectionOutcome>,
}

impl SelectionHandle {
    pub fn area_id(&self) -> &str {
        &self.area_id
    }

    pub async fn outcome(self) -> SelectionOutcome {
        self.task.await.unwrap_or(SelectionOutcome::Aborted)
    }
}

struct ActiveSelection {
    epoch: u64,
    area_id: String,
    flight: Option<CancellationToken>,
    data: CancellationToken,
    settled: Arc<AtomicBool>,
}

impl ActiveSelection {
    fn abort(&self) {
        if let Some(flight) = &self.flight {
            flight.cancel();
        }
        self.data.cancel();
    }
}

enum DataOutcome {
    Loaded(FeatureCollection, u32),
    Failed(RetryFailure<FetchError>),
    Cancelled,
}

struct Inner {
    config: ClickConfig,
    context: Arc<NavigationContext>,
    camera: CameraController,
    gateway: Arc<dyn DataGateway>,
    scene: Arc<dyn Scene>,
    streamer: Option<TileStreamer>,
    active: Mutex<Option<ActiveSelection>>,
    epoch: AtomicU64,
    area_group: Mutex<Option<GroupHandle>>,
}

#[derive(Clone)]
pub struct ClickProcessor {
    inner: Arc<Inner>,
}

impl ClickProcessor {
    pub fn new(
        config: ClickConfig,
        context: Arc<NavigationContext>,
        camera: CameraController,
        gateway: Arc<dyn DataGateway>,
        scene: Arc<dyn Scene>,
        streamer: Option<TileStreamer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                context,
                camera,
                gateway,
                scene,
                streamer,
                active: Mutex::new(None),
                epoch: AtomicU64::new(0),
                area_group: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClickConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &Arc<NavigationContext> {
        &self.inner.context
    }

    /// Render group of the most recently completed area, if still attached.
    pub fn area_group(&self) -> Option<GroupHandle> {
        self.inner.area_group.lock().clone()
    }

    /// Starts a drill-down into `area_id`. Only valid while idle.
    ///
    /// The flight starts before this returns; the data load starts on the
    /// spawned task's first poll. Must be called from within a tokio runtime.
    pub fn begin_area_selection(
        &self,
        area_id: impl Into<String>,
        metadata: AreaMetadata,
    ) -> Result<SelectionHandle, SelectionError> {
        let area_id = area_id.into();
        let inner = &self.inner;

        let previous = inner.camera.capture_view_state(inner.context.ui_flags());
        let loading = ClickProcessingState {
            is_processing: true,
            area_id: Some(area_id.clone()),
            area_name: metadata.name.clone(),
            stage: ClickStage::Loading,
            start_time: Some(Instant::now()),
            can_cancel: false,
            error: None,
            retry_count: 0,
            loading_progress: Some(LoadingProgress::new(0, 2)),
            previous_view_state: Some(previous),
        };
        if !inner.context.begin_click(loading) {
            let current = inner.context.click_state().area_id.unwrap_or_default();
            return Err(SelectionError::Busy(current));
        }
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("selecting area {area_id} (epoch {epoch})");

        let flight = inner.camera.fly_to(
            metadata.centroid,
            inner.config.flight_duration(),
            inner.config.flight_pitch_deg,
            inner.config.flight_height_m,
        );
        let data = CancellationToken::new();
        let settled = Arc::new(AtomicBool::new(false));
        *inner.active.lock() = Some(ActiveSelection {
            epoch,
            area_id: area_id.clone(),
            flight: Some(flight.cancel_token()),
            data: data.clone(),
            settled: Arc::clone(&settled),
        });
        inner.context.update_click(|s| {
            s.stage = ClickStage::Animating;
            s.can_cancel = true;
        });

        let this = self.clone();
        let id = area_id.clone();
        let task = tokio::spawn(async move {
            this.run_selection(epoch, id, flight, data, settled).await
        });
        Ok(SelectionHandle { area_id, task })
    }

    /// Re-runs the area data load after a retriable failure.
    pub fn retry(&self) -> Result<SelectionHandle, SelectionError> {
        let inner = &self.inner;
        let state = inner.context.click_state();
        if !state.error.as_ref().is_some_and(|e| e.retriable) {
            return Err(SelectionError::NothingToRetry);
        }

        let data = CancellationToken::new();
        let settled = Arc::new(AtomicBool::new(false));
        let (epoch, area_id) = {
            let mut active = inner.active.lock();
            let Some(selection) = active.as_mut() else {
                return Err(SelectionError::NothingToRetry);
            };
            let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            selection.epoch = epoch;
            selection.flight = None;
            selection.data = data.clone();
            selection.settled = Arc::clone(&settled);
            (epoch, selection.area_id.clone())
        };
        info!(
            "retrying area {area_id} (retry {})",
            state.retry_count + 1
        );
        inner.context.update_click(|s| {
            s.stage = ClickStage::Loading;
            s.error = None;
            s.can_cancel = false;
            s.retry_count += 1;
            s.loading_progress = Some(LoadingProgress::new(1, 2));
        });

        let this = self.clone();
        let id = area_id.clone();
        let task = tokio::spawn(async move {
            let outcome = this.load_area(epoch, &id, &data).await;
            this.update_if_current(epoch, advance_progress);
            this.settle(epoch, id, None, outcome, &settled).await
        });
        Ok(SelectionHandle { area_id, task })
    }

    /// Aborts the flight and restores the view captured at click time.
    ///
    /// Allowed while the flight runs, or while a failure is shown. Loses to
    /// a selection that already settled on its own.
    pub fn cancel(&self) -> Result<(), SelectionError> {
        let inner = &self.inner;
        let state = inner.context.click_state();
        let showing_error = state.error.is_some();
        if !state.is_processing || !(state.can_cancel || showing_error) {
            return Err(SelectionError::NotCancellable);
        }

        let active = {
            let mut guard = inner.active.lock();
            let Some(active) = guard.as_ref() else {
                return Err(SelectionError::NotCancellable);
            };
            if !showing_error && active.settled.swap(true, Ordering::SeqCst) {
                return Err(SelectionError::NotCancellable);
            }
            inner.epoch.fetch_add(1, Ordering::SeqCst);
            guard.take()
        };
        if let Some(active) = &active {
            active.abort();
        }

        match inner.context.take_previous_view() {
            Some(view) => {
                let ui = inner.camera.restore_view_state(view);
                inner.context.replace_ui_flags(ui);
            }
            None => warn!(
                "no captured view to restore for area {:?}",
                state.area_id
            ),
        }
        inner.context.reset_click();
        info!("cancelled selection of area {:?}", state.area_id);
        Ok(())
    }

    /// Drops any in-flight selection without touching the camera.
    pub fn abandon(&self) {
        let active = {
            let mut guard = self.inner.active.lock();
            if let Some(active) = guard.as_ref() {
                active.settled.store(true, Ordering::SeqCst);
            }
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            guard.take()
        };
        if let Some(active) = active {
            debug!("abandoning selection of area {}", active.area_id);
            active.abort();
        }
        if self.inner.context.is_processing() {
            self.inner.context.reset_click();
        }
    }

    pub fn detach_area_group(&self) -> bool {
        let group = self.inner.area_group.lock().take();
        match group {
            Some(group) => {
                self.inner.scene.detach_group(&group);
                true
            }
            None => false,
        }
    }

    async fn run_selection(
        self,
        epoch: u64,
        area_id: String,
        flight: FlightHandle,
        data: CancellationToken,
        settled: Arc<AtomicBool>,
    ) -> SelectionOutcome {
        let flight_task = async {
            let destination = flight.destination();
            let outcome = flight.outcome().await;
            if let FlightOutcome::Failed(err) = &outcome
                && self.is_current(epoch)
            {
                warn!("camera flight to area {area_id} failed, cutting to destination: {err}");
                self.inner.camera.set_view(destination);
            }
            self.update_if_current(epoch, |s| {
                s.can_cancel = false;
                advance_progress(s);
            });
            outcome
        };
        let data_task = async {
            let outcome = self.load_area(epoch, &area_id, &data).await;
            self.update_if_current(epoch, advance_progress);
            outcome
        };

        let (flight_outcome, data_outcome) = tokio::join!(flight_task, data_task);
        self.settle(epoch, area_id, Some(flight_outcome), data_outcome, &settled)
            .await
    }

    async fn load_area(&self, epoch: u64, area_id: &str, token: &CancellationToken) -> DataOutcome {
        let gateway = Arc::clone(&self.inner.gateway);
        let load = retry_with_backoff(
            &self.inner.config.retry,
            FetchError::is_retriable,
            |attempt, err, delay| {
                info!("area {area_id} attempt {attempt} failed ({err}), retrying in {delay:?}");
                self.update_if_current(epoch, |s| s.retry_count += 1);
            },
            |_| {
                gateway.fetch_by_area_id(
                    area_id.to_string(),
                    FetchOptions::default().with_priority(FetchPriority::High),
                )
            },
        );
        tokio::select! {
            biased;
            _ = token.cancelled() => DataOutcome::Cancelled,
            res = load => match res {
                Ok((features, attempts)) => DataOutcome::Loaded(features, attempts),
                Err(failure) => DataOutcome::Failed(failure),
            },
        }
    }

    async fn settle(
        &self,
        epoch: u64,
        area_id: String,
        flight: Option<FlightOutcome>,
        data: DataOutcome,
        settled: &AtomicBool,
    ) -> SelectionOutcome {
        if !self.is_current(epoch) || settled.swap(true, Ordering::SeqCst) {
            debug!("selection of area {area_id} settled after cancellation");
            return SelectionOutcome::Cancelled { area_id };
        }

        match data {
            DataOutcome::Cancelled => SelectionOutcome::Cancelled { area_id },
            DataOutcome::Loaded(features, attempts) => {
                self.complete(&area_id, &features);
                tokio::time::sleep(self.inner.config.ui_settle()).await;
                self.finish(epoch);
                SelectionOutcome::Completed {
                    area_id,
                    flight,
                    attempts,
                }
            }
            DataOutcome::Failed(RetryFailure { error, attempts }) => {
                let retriable = error.is_retriable();
                warn!("loading area {area_id} failed after {attempts} attempt(s): {error}");
                self.update_if_current(epoch, |s| {
                    s.error = Some(ClickError {
                        message: format!("Could not load area {area_id}"),
                        details: Some(error.to_string()),
                        retriable,
                    });
                    s.can_cancel = true;
                });
                if !retriable {
                    tokio::time::sleep(self.inner.config.ui_settle()).await;
                    self.finish(epoch);
                }
                SelectionOutcome::Failed {
                    area_id,
                    error,
                    attempts,
                }
            }
        }
    }

    fn complete(&self, area_id: &str, features: &FeatureCollection) {
        let inner = &self.inner;
        inner.context.update_click(|s| {
            s.stage = ClickStage::Complete;
            s.can_cancel = false;
            s.error = None;
            s.loading_progress = Some(LoadingProgress::new(2, 2));
        });
        if let Err(err) = inner.context.set_level(NavigationLevel::Area) {
            warn!("{err}");
        }

        let group = inner
            .scene
            .attach_group(&format!("area:{area_id}"), features, 1.0);
        let previous = inner.area_group.lock().replace(group);
        if let Some(previous) = previous {
            inner.scene.detach_group(&previous);
        }
        inner.scene.request_render();

        if let Some(streamer) = &inner.streamer {
            streamer.on_camera_moved();
        }
        info!("area {area_id} ready with {} feature(s)", features.len());
    }

    /// Returns to idle unless a newer selection took over.
    fn finish(&self, epoch: u64) {
        let finished = {
            let mut active = self.inner.active.lock();
            if active.as_ref().is_some_and(|a| a.epoch == epoch) {
                active.take();
                true
            } else {
                false
            }
        };
        if finished {
            self.inner.context.reset_click();
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
    }

    fn update_if_current(&self, epoch: u64, apply: impl FnOnce(&mut ClickProcessingState)) {
        if self.is_current(epoch) {
            self.inner.context.update_click(apply);
        }
    }
}

fn advance_progress(state: &mut ClickProcessingState) {
    if let Some(progress) = state.loading_progress.as_mut() {
        progress.advance();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use foundation::GeoPoint;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use scene::sim::{SimCamera, SimScene};
    use scene::{
        CameraController, CameraPose, CameraRig, Feature, FeatureCollection, FlightOutcome,
        RenderGroup,
    };
    use streaming::{FetchError, MemoryGateway};
    use tokio::time::{Instant, sleep};

    use super::{AreaMetadata, ClickProcessor, SelectionError, SelectionOutcome};
    use crate::config::ClickConfig;
    use crate::context::NavigationContext;
    use crate::events::NavigationEvents;
    use crate::state::{ClickProcessingState, ClickStage, NavigationLevel};

    struct Rig {
        camera: SimCamera,
        scene: Arc<SimScene>,
        gateway: MemoryGateway,
        context: Arc<NavigationContext>,
        clicks: ClickProcessor,
        states: Arc<Mutex<Vec<ClickProcessingState>>>,
    }

    fn centroid() -> GeoPoint {
        GeoPoint::new(24.94, 60.17)
    }

    fn rig() -> Rig {
        let camera = SimCamera::new(CameraPose::overhead(GeoPoint::new(24.90, 60.20), 8000.0));
        let scene = Arc::new(SimScene::new());
        let gateway = MemoryGateway::new();
        gateway.add_area(
            "00100",
            FeatureCollection::new(vec![
                Feature::point("b-1", GeoPoint::new(24.941, 60.171)),
                Feature::point("b-2", GeoPoint::new(24.939, 60.169)),
            ]),
        );

        let events = Arc::new(NavigationEvents::new());
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        events.on_click_state_changed(move |s| sink.lock().push(s.clone()));
        let context = Arc::new(NavigationContext::new(events));

        let clicks = ClickProcessor::new(
            ClickConfig::default(),
            Arc::clone(&context),
            CameraController::new(Arc::new(camera.clone())),
            Arc::new(gateway.clone()),
            scene.clone(),
            None,
        );
        Rig {
            camera,
            scene,
            gateway,
            context,
            clicks,
            states,
        }
    }

    fn metadata() -> AreaMetadata {
        AreaMetadata {
            name: Some("Helsinki keskusta".into()),
            centroid: centroid(),
        }
    }

    fn distinct<T: PartialEq + Copy>(values: impl IntoIterator<Item = T>) -> Vec<T> {
        let mut out: Vec<T> = Vec::new();
        for v in values {
            if out.last() != Some(&v) {
                out.push(v);
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn drill_down_runs_flight_and_load_in_parallel() {
        let r = rig();
        let started = Instant::now();
        let handle = r.clicks.begin_area_selection("00100", metadata()).unwrap();

        let state = r.context.click_state();
        assert_eq!(state.stage, ClickStage::Animating);
        assert!(state.can_cancel && state.is_processing);
        assert_eq!(state.area_name.as_deref(), Some("Helsinki keskusta"));

        let outcome = handle.outcome().await;
        assert_eq!(
            outcome,
            SelectionOutcome::Completed {
                area_id: "00100".into(),
                flight: Some(FlightOutcome::Completed),
                attempts: 1,
            }
        );
        assert!(started.elapsed() >= Duration::from_millis(3000));

        let states = r.states.lock().clone();
        assert_eq!(
            distinct(states.iter().map(|s| s.stage)),
            vec![
                ClickStage::Loading,
                ClickStage::Animating,
                ClickStage::Complete,
                ClickStage::None
            ]
        );
        assert_eq!(
            distinct(states.iter().filter_map(|s| s.loading_progress.map(|p| p.current))),
            vec![0, 1, 2]
        );
        assert!(states.iter().all(ClickProcessingState::is_consistent));

        assert_eq!(r.context.level(), NavigationLevel::Area);
        assert!(!r.context.is_processing());
        assert_eq!(
            r.camera.pose(),
            CameraPose::looking_at(centroid(), 1500.0, -35.0)
        );
        let group = r.scene.group("area:00100").unwrap();
        assert_eq!(group.entity_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_then_complete() {
        let r = rig();
        r.gateway.fail_next(2, FetchError::Network("connection reset".into()));
        let started = Instant::now();

        let outcome = r
            .clicks
            .begin_area_selection("00100", metadata())
            .unwrap()
            .outcome()
            .await;
        assert!(matches!(outcome, SelectionOutcome::Completed { attempts: 3, .. }));
        assert!(started.elapsed() >= Duration::from_millis(1000 + 2250));
        assert_eq!(r.gateway.area_calls(), 3);

        let states = r.states.lock().clone();
        let complete = states
            .iter()
            .find(|s| s.stage == ClickStage::Complete)
            .unwrap();
        assert_eq!(complete.retry_count, 2);
        assert!(complete.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_stops_after_three_attempts_and_can_be_retried() {
        let r = rig();
        r.gateway.fail_always(Some(FetchError::Timeout));

        let outcome = r
            .clicks
            .begin_area_selection("00100", metadata())
            .unwrap()
            .outcome()
            .await;
        assert!(matches!(outcome, SelectionOutcome::Failed { attempts: 3, .. }));
        assert_eq!(r.gateway.area_calls(), 3);

        let state = r.context.click_state();
        assert!(state.is_processing);
        assert!(state.can_cancel);
        let error = state.error.clone().unwrap();
        assert!(error.retriable);
        assert_eq!(state.retry_count, 2);
        assert_eq!(r.context.level(), NavigationLevel::Region);

        r.gateway.fail_always(None);
        let outcome = r.clicks.retry().unwrap().outcome().await;
        assert_eq!(
            outcome,
            SelectionOutcome::Completed {
                area_id: "00100".into(),
                flight: None,
                attempts: 1,
            }
        );
        let states = r.states.lock().clone();
        let complete = states
            .iter()
            .find(|s| s.stage == ClickStage::Complete)
            .unwrap();
        assert_eq!(complete.retry_count, 3);
        assert_eq!(r.context.level(), NavigationLevel::Area);
        assert!(!r.context.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_fail_without_retry() {
        let r = rig();
        let outcome = r
            .clicks
            .begin_area_selection(
                "99999",
                AreaMetadata {
                    name: None,
                    centroid: centroid(),
                },
            )
            .unwrap()
            .outcome()
            .await;
        assert!(matches!(outcome, SelectionOutcome::Failed { attempts: 1, .. }));
        assert_eq!(r.gateway.area_calls(), 1);

        let surfaced = r
            .states
            .lock()
            .iter()
            .find_map(|s| s.error.clone())
            .unwrap();
        assert!(!surfaced.retriable);
        assert!(!r.context.is_processing());
        assert_eq!(r.clicks.retry().unwrap_err(), SelectionError::NothingToRetry);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_flight_restores_the_captured_view() {
        let r = rig();
        let before = r.camera.pose();
        r.context.set_ui_flag("statistics_panel", true);

        let handle = r.clicks.begin_area_selection("00100", metadata()).unwrap();
        r.context.set_ui_flag("statistics_panel", false);
        sleep(Duration::from_millis(200)).await;

        r.clicks.cancel().unwrap();
        assert_eq!(r.camera.pose(), before);
        assert_eq!(r.context.ui_flags().get("statistics_panel"), Some(&true));
        assert_eq!(r.context.click_state(), ClickProcessingState::idle());
        assert_eq!(r.clicks.cancel().unwrap_err(), SelectionError::NotCancellable);

        let recorded = r.states.lock().len();
        assert_eq!(
            handle.outcome().await,
            SelectionOutcome::Cancelled {
                area_id: "00100".into()
            }
        );
        sleep(Duration::from_secs(5)).await;

        assert_eq!(r.camera.pose(), before);
        assert_eq!(r.states.lock().len(), recorded);
        assert_eq!(r.context.level(), NavigationLevel::Region);
        assert_eq!(r.camera.flights_aborted(), 1);
        assert!(r.scene.group("area:00100").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flight_cuts_to_destination() {
        let r = rig();
        r.camera.fail_next_flights(1);
        let outcome = r
            .clicks
            .begin_area_selection("00100", metadata())
            .unwrap()
            .outcome()
            .await;
        assert!(matches!(
            outcome,
            SelectionOutcome::Completed {
                flight: Some(FlightOutcome::Failed(_)),
                ..
            }
        ));
        assert_eq!(
            r.camera.pose(),
            CameraPose::looking_at(centroid(), 1500.0, -35.0)
        );
        assert_eq!(r.context.level(), NavigationLevel::Area);
    }

    #[tokio::test(start_paused = true)]
    async fn second_selection_is_refused_while_busy() {
        let r = rig();
        let _first = r.clicks.begin_area_selection("00100", metadata()).unwrap();
        assert_eq!(
            r.clicks.begin_area_selection("00200", metadata()).unwrap_err(),
            SelectionError::Busy("00100".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completed_selection_cannot_be_cancelled() {
        let r = rig();
        let handle = r.clicks.begin_area_selection("00100", metadata()).unwrap();
        sleep(Duration::from_millis(3100)).await;
        assert_eq!(r.context.click_state().stage, ClickStage::Complete);
        assert_eq!(r.clicks.cancel().unwrap_err(), SelectionError::NotCancellable);
        assert!(matches!(handle.outcome().await, SelectionOutcome::Completed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn next_area_replaces_the_previous_group() {
        let r = rig();
        r.gateway.add_area("00200", FeatureCollection::default());
        r.clicks
            .begin_area_selection("00100", metadata())
            .unwrap()
            .outcome()
            .await;
        r.clicks
            .begin_area_selection("00200", metadata())
            .unwrap()
            .outcome()
            .await;
        assert!(r.scene.group("area:00100").is_none());
        assert!(r.scene.group("area:00200").is_some());
        assert!(r.clicks.detach_area_group());
        assert!(r.scene.groups().is_empty());
    }
}
