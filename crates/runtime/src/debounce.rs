use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Trailing-edge debouncer.
///
/// Every [`Debouncer::call`] supersedes the previous one; the task only runs
/// once `window` has elapsed without another call. Must be used from within
/// a tokio runtime.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn call<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if generation.load(Ordering::SeqCst) == ticket {
                task().await;
            }
        });
    }

    /// Drops any scheduled-but-not-yet-fired task.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Leading-edge rate gate: admits an event only if at least `min_interval`
/// has passed since the last admitted one.
#[derive(Debug, Clone)]
pub struct LeadingGate {
    min_interval: Duration,
    last_admitted: Option<Instant>,
}

impl LeadingGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_admitted: None,
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_admitted
            && now.saturating_duration_since(last) < self.min_interval
        {
            return false;
        }
        self.last_admitted = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tokio::time::{Instant, advance, sleep};

    use super::{Debouncer, LeadingGate};

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_run() {
        let runs = Arc::new(AtomicU32::new(0));
        let d = Debouncer::new(Duration::from_millis(300));

        for _ in 0..5 {
            let r = Arc::clone(&runs);
            d.call(move || async move {
                r.fetch_add(1, Ordering::SeqCst);
            });
            sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(400)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_task() {
        let runs = Arc::new(AtomicU32::new(0));
        let d = Debouncer::new(Duration::from_millis(300));
        let r = Arc::clone(&runs);
        d.call(move || async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        d.cancel();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_rejects_within_interval() {
        let mut gate = LeadingGate::new(Duration::from_millis(500));
        assert!(gate.admit(Instant::now()));
        advance(Duration::from_millis(200)).await;
        assert!(!gate.admit(Instant::now()));
        advance(Duration::from_millis(300)).await;
        assert!(gate.admit(Instant::now()));
    }
}
