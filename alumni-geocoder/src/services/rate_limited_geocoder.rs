//! Sequential, rate-limited address resolution
//!
//! Requests are issued one at a time. Any two requests, retries included,
//! start at least `delay` apart. Transient failures are retried with
//! exponential backoff; everything else resolves to "no coordinates".

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::{AddressQuery, Coordinates, GeocodeResult, Progress};
use crate::services::progress::ProgressReporter;
use crate::types::{GeocodeError, Geocoder};

pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8000;

/// Enforces a minimum spacing between request starts
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait until the next request may start
    ///
    /// Returns `false` if `cancel` fired while waiting. The slot is not
    /// consumed in that case.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(wait_time) => {}
                }
            }
        }

        *last = Some(Instant::now());
        true
    }
}

/// Bounded retry of transient lookup failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first (0 = single attempt)
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }

    /// Single attempt, never retry
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::models::parameters::DEFAULT_MAX_RETRIES)
    }
}

enum Lookup {
    Done(Option<Coordinates>),
    Failed(GeocodeError),
    Cancelled,
}

/// Resolves queries through a [`Geocoder`] one at a time
///
/// The limiter lives as long as this value, so spacing holds across
/// successive `resolve` calls (batches) of one run.
pub struct RateLimitedGeocoder {
    geocoder: Arc<dyn Geocoder>,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

impl RateLimitedGeocoder {
    pub fn new(geocoder: Arc<dyn Geocoder>, delay: Duration, retry: RetryPolicy) -> Self {
        Self {
            geocoder,
            rate_limiter: RateLimiter::new(delay),
            retry,
        }
    }

    /// Resolve `queries` in order
    ///
    /// `progress.done` is advanced and reported after every processed query,
    /// resolved or not. On cancellation the results gathered so far are
    /// returned; the interrupted query is not included.
    pub async fn resolve(
        &self,
        queries: &[AddressQuery],
        progress: &mut Progress,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Vec<GeocodeResult> {
        let mut results = Vec::with_capacity(queries.len());

        for query in queries {
            let result = match self.lookup(&query.query, cancel).await {
                Lookup::Cancelled => {
                    tracing::info!(
                        user_id = %query.user_id,
                        processed = results.len(),
                        "Resolution cancelled"
                    );
                    break;
                }
                Lookup::Done(Some(coordinates)) => {
                    tracing::debug!(
                        user_id = %query.user_id,
                        latitude = coordinates.latitude,
                        longitude = coordinates.longitude,
                        "Address resolved"
                    );
                    GeocodeResult::resolved(query.user_id.clone(), coordinates)
                }
                Lookup::Done(None) => {
                    tracing::debug!(user_id = %query.user_id, query = %query.query, "No match");
                    GeocodeResult::unresolved(query.user_id.clone())
                }
                Lookup::Failed(e) => {
                    tracing::warn!(
                        user_id = %query.user_id,
                        query = %query.query,
                        error = %e,
                        "Geocoding failed, leaving address unresolved"
                    );
                    GeocodeResult::unresolved(query.user_id.clone())
                }
            };

            results.push(result);
            progress.done += 1;
            reporter.report(*progress);
        }

        results
    }

    async fn lookup(&self, query: &str, cancel: &CancellationToken) -> Lookup {
        let mut retry = 0u32;

        loop {
            if cancel.is_cancelled() || !self.rate_limiter.wait(cancel).await {
                return Lookup::Cancelled;
            }

            match self.geocoder.geocode(query).await {
                Ok(coordinates) => return Lookup::Done(coordinates),
                Err(e) if e.is_transient() && retry < self.retry.max_retries => {
                    retry += 1;
                    let backoff = self.retry.backoff_for(retry);
                    tracing::warn!(
                        query = %query,
                        error = %e,
                        retry,
                        max_retries = self.retry.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient geocoding failure, will retry after backoff"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Lookup::Cancelled,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => return Lookup::Failed(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Replays scripted responses, then answers `Ok(None)`
    struct Scripted {
        responses: StdMutex<VecDeque<Result<Option<Coordinates>, GeocodeError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Option<Coordinates>, GeocodeError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Geocoder for Scripted {
        async fn geocode(&self, _query: &str) -> Result<Option<Coordinates>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    fn queries(n: usize) -> Vec<AddressQuery> {
        (0..n)
            .map(|i| AddressQuery::new(format!("u{}", i), format!("{} Main St", i)))
            .collect()
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(4000));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(8000));
        assert_eq!(policy.backoff_for(9), Duration::from_millis(8000));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_rate_limiter_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let start = Instant::now();
        assert!(limiter.wait(&cancel).await);
        assert!(start.elapsed() < Duration::from_millis(50));

        assert!(limiter.wait(&cancel).await);
        assert!(limiter.wait(&cancel).await);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_rate_limiter_wait_is_cancellable() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        assert!(limiter.wait(&cancel).await);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!limiter.wait(&cancel).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_resolve_reports_every_address() {
        let geocoder = Scripted::new(vec![
            Ok(Some(Coordinates::new(1.0, 2.0))),
            Ok(None),
            Err(GeocodeError::Http { status: 400, body: "bad".into() }),
        ]);
        let resolver = RateLimitedGeocoder::new(geocoder.clone(), Duration::ZERO, RetryPolicy::none());
        let reported = StdMutex::new(Vec::new());
        let reporter = |p: Progress| reported.lock().unwrap().push(p);
        let mut progress = Progress::new(0, 3);

        let results = resolver
            .resolve(&queries(3), &mut progress, &reporter, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_resolved());
        assert!(!results[1].is_resolved());
        assert!(!results[2].is_resolved());
        assert_eq!(
            *reported.lock().unwrap(),
            vec![Progress::new(1, 3), Progress::new(2, 3), Progress::new(3, 3)]
        );
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let geocoder = Scripted::new(vec![
            Err(GeocodeError::Timeout),
            Err(GeocodeError::Http { status: 503, body: String::new() }),
            Ok(Some(Coordinates::new(5.0, 6.0))),
        ]);
        let resolver = RateLimitedGeocoder::new(geocoder.clone(), Duration::ZERO, fast_retry(2));
        let mut progress = Progress::new(0, 1);

        let results = resolver
            .resolve(&queries(1), &mut progress, &|_: Progress| {}, &CancellationToken::new())
            .await;

        assert_eq!(results[0].coordinates, Some(Coordinates::new(5.0, 6.0)));
        assert_eq!(geocoder.calls(), 3);
        assert_eq!(progress.done, 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let geocoder = Scripted::new(vec![
            Err(GeocodeError::Network("reset".into())),
            Err(GeocodeError::Network("reset".into())),
            Err(GeocodeError::Network("reset".into())),
        ]);
        let resolver = RateLimitedGeocoder::new(geocoder.clone(), Duration::ZERO, fast_retry(1));
        let mut progress = Progress::new(0, 1);

        let results = resolver
            .resolve(&queries(1), &mut progress, &|_: Progress| {}, &CancellationToken::new())
            .await;

        assert!(!results[0].is_resolved());
        assert_eq!(geocoder.calls(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let geocoder = Scripted::new(vec![Err(GeocodeError::Http { status: 404, body: String::new() })]);
        let resolver = RateLimitedGeocoder::new(geocoder.clone(), Duration::ZERO, fast_retry(3));
        let mut progress = Progress::new(0, 1);

        resolver
            .resolve(&queries(1), &mut progress, &|_: Progress| {}, &CancellationToken::new())
            .await;

        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let geocoder = Scripted::new(vec![]);
        let resolver = RateLimitedGeocoder::new(geocoder.clone(), Duration::ZERO, RetryPolicy::none());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut progress = Progress::new(0, 4);

        let results = resolver.resolve(&queries(4), &mut progress, &|_: Progress| {}, &cancel).await;

        assert!(results.is_empty());
        assert_eq!(geocoder.calls(), 0);
        assert_eq!(progress.done, 0);
    }
}
