use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with additive jitter.
///
/// The delay after the n-th failed attempt is
/// `base_ms * multiplier^n + uniform(0..=max_jitter_ms)`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub multiplier: f64,
    pub max_jitter_ms: u64,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            multiplier: 1.5,
            max_jitter_ms: 500,
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    pub fn without_jitter(self) -> Self {
        Self {
            max_jitter_ms: 0,
            ..self
        }
    }

    /// Delay before the next attempt, excluding jitter.
    pub fn nominal_delay(&self, failed_attempts: u32) -> Duration {
        let exp = i32::try_from(failed_attempts).unwrap_or(i32::MAX);
        let ms = self.base_ms as f64 * self.multiplier.max(1.0).powi(exp);
        Duration::from_millis(ms.round().min(u64::MAX as f64) as u64)
    }

    pub fn delay_after<R: Rng + ?Sized>(&self, failed_attempts: u32, rng: &mut R) -> Duration {
        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=self.max_jitter_ms)
        };
        self.nominal_delay(failed_attempts) + Duration::from_millis(jitter)
    }
}

/// Terminal failure of [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, fails with a non-retriable error, or the
/// policy's attempt budget is spent.
///
/// `op` receives the 1-based attempt number. `on_retry` fires before each
/// backoff sleep with the failed attempt number, its error and the delay.
/// On success returns the value and the number of attempts used.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    is_retriable: impl Fn(&E) -> bool,
    mut on_retry: impl FnMut(u32, &E, Duration),
    mut op: F,
) -> Result<(T, u32), RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => {
                if attempt >= max_attempts || !is_retriable(&error) {
                    return Err(RetryFailure {
                        error,
                        attempts: attempt,
                    });
                }
                let delay = policy.delay_after(attempt, &mut rand::thread_rng());
                on_retry(attempt, &error, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{BackoffPolicy, retry_with_backoff};

    #[derive(Debug, Clone, PartialEq)]
    enum Failure {
        Transient,
        Fatal,
    }

    fn retriable(f: &Failure) -> bool {
        *f == Failure::Transient
    }

    #[test]
    fn nominal_delays_grow_geometrically() {
        let p = BackoffPolicy::default();
        assert_eq!(p.nominal_delay(1), Duration::from_millis(1500));
        assert_eq!(p.nominal_delay(2), Duration::from_millis(2250));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = BackoffPolicy::default();
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let d = p.delay_after(1, &mut rng);
            assert!(d >= Duration::from_millis(1500));
            assert!(d <= Duration::from_millis(2000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_transient_failure_stops_after_three_attempts() {
        let mut calls = 0;
        let mut retries = Vec::new();
        let res: Result<((), u32), _> = retry_with_backoff(
            &BackoffPolicy::default(),
            retriable,
            |n, _, _| retries.push(n),
            |_| {
                calls += 1;
                async { Err(Failure::Transient) }
            },
        )
        .await;

        let failure = res.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(calls, 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_not_retried() {
        let mut calls = 0;
        let res: Result<((), u32), _> = retry_with_backoff(
            &BackoffPolicy::default(),
            retriable,
            |_, _, _| {},
            |_| {
                calls += 1;
                async { Err(Failure::Fatal) }
            },
        )
        .await;
        assert_eq!(res.unwrap_err().attempts, 1);
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_backoff() {
        let start = Instant::now();
        let res = retry_with_backoff(
            &BackoffPolicy::default(),
            retriable,
            |_, _, _| {},
            |attempt| async move {
                if attempt < 3 {
                    Err(Failure::Transient)
                } else {
                    Ok("payload")
                }
            },
        )
        .await;

        assert_eq!(res, Ok(("payload", 3)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3750), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(4750), "elapsed {elapsed:?}");
    }
}
