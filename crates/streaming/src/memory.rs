//! In-memory data gateway with scripted failures.
//!
//! Serves features registered per source (filtered by bounding box on their
//! anchor point) and per area id. Every call is logged in issue order so
//! callers can assert on load ordering and request counts.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use foundation::GeoRect;
use parking_lot::Mutex;
use scene::{BoxFuture, Feature, FeatureCollection};

use crate::gateway::{DataGateway, FetchError, FetchOptions, FetchPriority, FetchResult, SourceKind};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    BoundingBox {
        rect: GeoRect,
        source: SourceKind,
        priority: FetchPriority,
    },
    Area(String),
}

#[derive(Debug, Default)]
struct State {
    features: BTreeMap<SourceKind, Vec<Feature>>,
    areas: BTreeMap<String, FeatureCollection>,
    scripted_failures: VecDeque<FetchError>,
    persistent_failure: Option<FetchError>,
    calls: Vec<GatewayCall>,
    latency: Duration,
    in_flight: usize,
    max_in_flight: usize,
}

impl State {
    fn next_failure(&mut self) -> Option<FetchError> {
        self.scripted_failures
            .pop_front()
            .or_else(|| self.persistent_failure.clone())
    }

    fn start(&mut self, call: GatewayCall) -> Duration {
        self.calls.push(call);
        self.in_flight += 1;
        self.max_in_flight = self.max_in_flight.max(self.in_flight);
        self.latency
    }
}

struct InFlight(Arc<Mutex<State>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<State>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every response resolves after `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn add_feature(&self, source: SourceKind, feature: Feature) {
        self.state
            .lock()
            .features
            .entry(source)
            .or_default()
            .push(feature);
    }

    pub fn add_features(&self, source: SourceKind, features: impl IntoIterator<Item = Feature>) {
        self.state
            .lock()
            .features
            .entry(source)
            .or_default()
            .extend(features);
    }

    pub fn add_area(&self, area_id: impl Into<String>, features: FeatureCollection) {
        self.state.lock().areas.insert(area_id.into(), features);
    }

    /// The next `n` calls fail with `error`, whatever they request.
    pub fn fail_next(&self, n: usize, error: FetchError) {
        let mut state = self.state.lock();
        state
            .scripted_failures
            .extend(std::iter::repeat_n(error, n));
    }

    /// Every call fails with `error` until cleared with `None`.
    pub fn fail_always(&self, error: Option<FetchError>) {
        self.state.lock().persistent_failure = error;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn bounding_box_calls(&self) -> Vec<GeoRect> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::BoundingBox { rect, .. } => Some(*rect),
                GatewayCall::Area(_) => None,
            })
            .collect()
    }

    pub fn area_calls(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, GatewayCall::Area(_)))
            .count()
    }

    /// Highest number of simultaneously outstanding requests seen.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.max_in_flight = state.in_flight;
    }

    fn respond(&self, latency: Duration, result: FetchResult) -> BoxFuture<'static, FetchResult> {
        let guard = InFlight(Arc::clone(&self.state));
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            drop(guard);
            result
        })
    }
}

impl DataGateway for MemoryGateway {
    fn fetch_by_bounding_box(
        &self,
        rect: GeoRect,
        source: SourceKind,
        options: FetchOptions,
    ) -> BoxFuture<'static, FetchResult> {
        let (latency, result) = {
            let mut state = self.state.lock();
            let latency = state.start(GatewayCall::BoundingBox {
                rect,
                source: source.clone(),
                priority: options.priority,
            });
            let result = match state.next_failure() {
                Some(e) => Err(e),
                None => Ok(FeatureCollection::new(
                    state
                        .features
                        .get(&source)
                        .into_iter()
                        .flatten()
                        .filter(|f| f.anchor().is_some_and(|p| rect.contains(p)))
                        .cloned()
                        .collect(),
                )),
            };
            (latency, result)
        };
        self.respond(latency, result)
    }

    fn fetch_by_area_id(
        &self,
        area_id: String,
        _options: FetchOptions,
    ) -> BoxFuture<'static, FetchResult> {
        let (latency, result) = {
            let mut state = self.state.lock();
            let latency = state.start(GatewayCall::Area(area_id.clone()));
            let result = match state.next_failure() {
                Some(e) => Err(e),
                None => state
                    .areas
                    .get(&area_id)
                    .cloned()
                    .ok_or_else(|| FetchError::status(404, format!("unknown area {area_id}"))),
            };
            (latency, result)
        };
        self.respond(latency, result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use foundation::{GeoPoint, GeoRect};
    use pretty_assertions::assert_eq;
    use scene::Feature;

    use super::MemoryGateway;
    use crate::gateway::{DataGateway, FetchError, FetchOptions, SourceKind};

    #[tokio::test]
    async fn filters_by_anchor_inside_rect() {
        let gw = MemoryGateway::new();
        gw.add_features(
            SourceKind::Buildings,
            [
                Feature::point("in", GeoPoint::new(0.5, 0.5)),
                Feature::point("out", GeoPoint::new(2.0, 2.0)),
                Feature::new("no-geometry"),
            ],
        );
        let got = gw
            .fetch_by_bounding_box(
                GeoRect::new(0.0, 0.0, 1.0, 1.0),
                SourceKind::Buildings,
                FetchOptions::default(),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = got.features.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["in"]);

        let trees = gw
            .fetch_by_bounding_box(
                GeoRect::new(0.0, 0.0, 1.0, 1.0),
                SourceKind::Trees,
                FetchOptions::default(),
            )
            .await
            .unwrap();
        assert!(trees.is_empty());
    }

    #[tokio::test]
    async fn scripted_failures_come_before_persistent_ones() {
        let gw = MemoryGateway::new();
        gw.add_area("00100", Default::default());
        gw.fail_next(1, FetchError::Timeout);
        assert_eq!(
            gw.fetch_by_area_id("00100".into(), FetchOptions::default()).await,
            Err(FetchError::Timeout)
        );
        assert!(gw.fetch_by_area_id("00100".into(), FetchOptions::default()).await.is_ok());

        gw.fail_always(Some(FetchError::status(500, "down")));
        assert!(gw.fetch_by_area_id("00100".into(), FetchOptions::default()).await.is_err());
        gw.fail_always(None);
        assert_eq!(
            gw.fetch_by_area_id("nope".into(), FetchOptions::default())
                .await
                .map_err(|e| e.is_retriable()),
            Err(false)
        );
        assert_eq!(gw.area_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn tracks_outstanding_requests() {
        let gw = MemoryGateway::new().with_latency(Duration::from_millis(50));
        let rect = GeoRect::new(0.0, 0.0, 1.0, 1.0);
        let a = gw.fetch_by_bounding_box(rect, SourceKind::Buildings, FetchOptions::default());
        let b = gw.fetch_by_bounding_box(rect, SourceKind::Buildings, FetchOptions::default());
        let _ = tokio::join!(a, b);
        assert_eq!(gw.max_in_flight(), 2);
        let _ = gw
            .fetch_by_bounding_box(rect, SourceKind::Buildings, FetchOptions::default())
            .await;
        assert_eq!(gw.max_in_flight(), 2);
        assert_eq!(gw.bounding_box_calls().len(), 3);
    }
}
