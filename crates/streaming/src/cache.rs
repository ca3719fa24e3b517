use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use foundation::GeoRect;
use parking_lot::Mutex;
use scene::{BoxFuture, FeatureCollection};
use tokio::time::Instant;
use tracing::debug;

use crate::gateway::{DataGateway, FetchError, FetchOptions, FetchResult, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheKey {
    BoundingBox { source: SourceKind, rect: String },
    Area(String),
}

impl CacheKey {
    /// Coordinates are rounded to 1e-7 degrees so equal tiles share a key.
    pub fn bounding_box(rect: &GeoRect, source: &SourceKind) -> Self {
        CacheKey::BoundingBox {
            source: source.clone(),
            rect: format!(
                "{:.7},{:.7},{:.7},{:.7}",
                rect.west, rect.south, rect.east, rect.north
            ),
        }
    }

    pub fn area(area_id: impl Into<String>) -> Self {
        CacheKey::Area(area_id.into())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: FeatureCollection,
    expires_at: Instant,
    last_used_tick: u64,
}

/// In-memory response cache with per-entry TTL and an entry cap.
///
/// Expired entries are dropped on lookup. Once full, the least recently used
/// entry is evicted, ties broken by key ordering.
#[derive(Debug)]
pub struct ResponseCache {
    max_entries: usize,
    default_ttl: Duration,
    tick: u64,
    entries: BTreeMap<CacheKey, CacheEntry>,
}

impl ResponseCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            max_entries: max_entries.max(1),
            default_ttl,
            tick: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &CacheKey, now: Instant) -> Option<FeatureCollection> {
        self.tick += 1;
        let expired = match self.entries.get_mut(key) {
            None => return None,
            Some(entry) if entry.expires_at <= now => true,
            Some(entry) => {
                entry.last_used_tick = self.tick;
                return Some(entry.value.clone());
            }
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Stores `value`; returns the keys evicted to stay within the cap.
    pub fn insert(
        &mut self,
        key: CacheKey,
        value: FeatureCollection,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Vec<CacheKey> {
        self.tick += 1;
        let entry = CacheEntry {
            value,
            expires_at: now + ttl.unwrap_or(self.default_ttl),
            last_used_tick: self.tick,
        };
        self.entries.insert(key.clone(), entry);

        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries {
            let victim = self
                .entries
                .iter()
                .filter(|(k, _)| **k != key)
                .min_by(|(ka, ea), (kb, eb)| {
                    ea.last_used_tick
                        .cmp(&eb.last_used_tick)
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone());
            let Some(victim) = victim else {
                break;
            };
            self.entries.remove(&victim);
            evicted.push(victim);
        }
        evicted
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Decorates a gateway with the response cache and gateway-level retries.
///
/// Requests with `cache: false` bypass the cache in both directions. The
/// `retries` option allows that many immediate re-attempts on retriable
/// errors before the error is surfaced.
pub struct CachedGateway<G> {
    inner: Arc<G>,
    cache: Arc<Mutex<ResponseCache>>,
    counters: Arc<CacheCounters>,
}

impl<G> CachedGateway<G>
where
    G: DataGateway + 'static,
{
    pub fn new(inner: G, max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            cache: Arc::new(Mutex::new(ResponseCache::new(max_entries, default_ttl))),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub fn hits(&self) -> u64 {
        self.counters.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.counters.misses.load(Ordering::Relaxed)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.cache.lock().invalidate(key)
    }

    fn fetch_through<F>(
        &self,
        key: CacheKey,
        options: FetchOptions,
        fetch: F,
    ) -> BoxFuture<'static, FetchResult>
    where
        F: Fn(&G, FetchOptions) -> BoxFuture<'static, FetchResult> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        let counters = Arc::clone(&self.counters);
        Box::pin(async move {
            let cached = if options.cache {
                cache.lock().get(&key, Instant::now())
            } else {
                None
            };
            if let Some(hit) = cached {
                counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
            counters.misses.fetch_add(1, Ordering::Relaxed);

            let mut attempt = 0u32;
            let result = loop {
                match fetch(&*inner, options.clone()).await {
                    Err(e) if e.is_retriable() && attempt < options.retries => {
                        attempt += 1;
                        debug!("gateway retry {attempt}/{} for {key:?}: {e}", options.retries);
                    }
                    other => break other,
                }
            };

            let value = result?;
            if options.cache {
                let evicted = cache.lock().insert(
                    key,
                    value.clone(),
                    options.cache_ttl,
                    Instant::now(),
                );
                if !evicted.is_empty() {
                    debug!("response cache evicted {} entries", evicted.len());
                }
            }
            Ok::<_, FetchError>(value)
        })
    }
}

/// Options forwarded to the wrapped gateway: caching and retries are owned
/// by this layer.
fn passthrough(options: FetchOptions) -> FetchOptions {
    FetchOptions {
        cache: false,
        retries: 0,
        ..options
    }
}

impl<G> DataGateway for CachedGateway<G>
where
    G: DataGateway + 'static,
{
    fn fetch_by_bounding_box(
        &self,
        rect: GeoRect,
        source: SourceKind,
        options: FetchOptions,
    ) -> BoxFuture<'static, FetchResult> {
        let key = CacheKey::bounding_box(&rect, &source);
        self.fetch_through(key, options, move |g, opts| {
            g.fetch_by_bounding_box(rect, source.clone(), passthrough(opts))
        })
    }

    fn fetch_by_area_id(
        &self,
        area_id: String,
        options: FetchOptions,
    ) -> BoxFuture<'static, FetchResult> {
        let key = CacheKey::area(area_id.clone());
        self.fetch_through(key, options, move |g, opts| {
            g.fetch_by_area_id(area_id.clone(), passthrough(opts))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use foundation::{GeoPoint, GeoRect};
    use pretty_assertions::assert_eq;
    use scene::{Feature, FeatureCollection};
    use tokio::time::{Instant, advance};

    use super::{CacheKey, CachedGateway, ResponseCache};
    use crate::gateway::{DataGateway, FetchError, FetchOptions, SourceKind};
    use crate::memory::MemoryGateway;

    fn fc(n: usize) -> FeatureCollection {
        FeatureCollection::new((0..n).map(|i| Feature::new(format!("f{i}"))).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let mut cache = ResponseCache::new(4, Duration::from_secs(3600));
        let key = CacheKey::area("00100");
        cache.insert(key.clone(), fc(2), None, Instant::now());
        assert_eq!(cache.get(&key, Instant::now()).map(|v| v.len()), Some(2));

        advance(Duration::from_secs(3600)).await;
        assert_eq!(cache.get(&key, Instant::now()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lru_entry_is_evicted_at_cap() {
        let mut cache = ResponseCache::new(2, Duration::from_secs(60));
        let (a, b, c) = (CacheKey::area("a"), CacheKey::area("b"), CacheKey::area("c"));
        let now = Instant::now();
        cache.insert(a.clone(), fc(1), None, now);
        cache.insert(b.clone(), fc(1), None, now);
        // Touch a so b becomes least recently used.
        cache.get(&a, now);
        assert_eq!(cache.insert(c.clone(), fc(1), None, now), vec![b.clone()]);
        assert!(cache.get(&a, now).is_some());
        assert!(cache.get(&b, now).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cached_gateway_serves_repeat_requests_from_memory() {
        let memory = MemoryGateway::new();
        memory.add_feature(SourceKind::Buildings, Feature::point("b1", GeoPoint::new(0.5, 0.5)));
        let gateway = CachedGateway::new(memory, 16, Duration::from_secs(3600));
        let rect = GeoRect::new(0.0, 0.0, 1.0, 1.0);

        for _ in 0..3 {
            let got = gateway
                .fetch_by_bounding_box(rect, SourceKind::Buildings, FetchOptions::default())
                .await
                .unwrap();
            assert_eq!(got.len(), 1);
        }
        assert_eq!(gateway.inner().call_count(), 1);
        assert_eq!((gateway.hits(), gateway.misses()), (2, 1));

        gateway
            .fetch_by_bounding_box(rect, SourceKind::Buildings, FetchOptions::uncached())
            .await
            .unwrap();
        assert_eq!(gateway.inner().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_reload() {
        let memory = MemoryGateway::new();
        memory.add_area("00100", fc(3));
        let gateway = CachedGateway::new(memory, 16, Duration::from_secs(3600));
        let opts = FetchOptions::default().with_ttl(Duration::from_secs(10));

        gateway.fetch_by_area_id("00100".into(), opts.clone()).await.unwrap();
        advance(Duration::from_secs(11)).await;
        gateway.fetch_by_area_id("00100".into(), opts).await.unwrap();
        assert_eq!(gateway.inner().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_retries_only_retriable_errors() {
        let memory = MemoryGateway::new();
        memory.add_area("00100", fc(1));
        memory.fail_next(2, FetchError::Timeout);
        let gateway = CachedGateway::new(memory, 16, Duration::from_secs(3600));

        let opts = FetchOptions {
            retries: 2,
            ..FetchOptions::default()
        };
        assert!(gateway.fetch_by_area_id("00100".into(), opts).await.is_ok());
        assert_eq!(gateway.inner().call_count(), 3);

        gateway.inner().fail_next(1, FetchError::status(404, "gone"));
        let opts = FetchOptions {
            retries: 2,
            ..FetchOptions::uncached()
        };
        assert_eq!(
            gateway.fetch_by_area_id("00100".into(), opts).await,
            Err(FetchError::status(404, "gone"))
        );
        assert_eq!(gateway.inner().call_count(), 4);
    }
}
