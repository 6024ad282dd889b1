//! Read-through price cache
//!
//! Provides a `TransparentCache` that wraps a `PriceService` and remembers the
//! prices it has fetched. Freshness is judged against one expiry point shared
//! by every entry: the cache's construction time plus its maximum age.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

use super::{CacheError, Clock, SystemClock};
use crate::service::PriceService;

/// Snapshot of cache activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of item codes currently holding a price
    pub entries: usize,
    /// Lookups answered without calling the service
    pub hits: u64,
    /// Lookups that had to call the service
    pub misses: u64,
    /// Service calls that failed
    pub upstream_failures: u64,
}

/// A cache that sits in front of a slow price service
///
/// Prices fetched from the service are kept until `epoch + max_age`, where
/// `epoch` is the moment the cache was created. Past that point every lookup
/// goes back to the service, including for prices fetched moments ago, and
/// the epoch is never moved forward.
pub struct TransparentCache {
    /// Service that actually knows the prices
    service: Arc<dyn PriceService>,
    /// Time source for freshness checks
    clock: Arc<dyn Clock>,
    /// How long after `epoch` cached prices may be served
    max_age: Duration,
    /// When the cache was created
    epoch: DateTime<Utc>,
    /// Last fetched price per item code
    prices: Mutex<HashMap<String, f64>>,
    hits: AtomicU64,
    misses: AtomicU64,
    upstream_failures: AtomicU64,
}

impl TransparentCache {
    /// Creates a cache in front of `service`, using wall-clock time
    pub fn new(service: Arc<dyn PriceService>, max_age: Duration) -> Self {
        Self::with_clock(service, max_age, Arc::new(SystemClock))
    }

    /// Creates a cache that reads the time from `clock`
    ///
    /// The epoch is taken from `clock` right away.
    pub fn with_clock(
        service: Arc<dyn PriceService>,
        max_age: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            service,
            clock,
            max_age,
            epoch,
            prices: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
        }
    }

    /// The instant after which no cached price is served
    ///
    /// `None` when `epoch + max_age` is past the representable range, in
    /// which case cached prices never expire.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.epoch.checked_add_signed(self.max_age)
    }

    /// Returns true while cached prices may still be served
    fn is_fresh(&self) -> bool {
        match self.expires_at() {
            Some(expires_at) => self.clock.now() < expires_at,
            None => true,
        }
    }

    fn lock_prices(&self) -> MutexGuard<'_, HashMap<String, f64>> {
        // A panic while holding the lock cannot leave a half-written f64 behind.
        self.prices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached price for `item_code` if it may still be served
    fn fresh_price(&self, item_code: &str) -> Option<f64> {
        let prices = self.lock_prices();
        let price = prices.get(item_code).copied()?;
        self.is_fresh().then_some(price)
    }

    /// Gets the price for an item, from the cache or from the service
    ///
    /// # Arguments
    /// * `item_code` - The item to price
    ///
    /// # Returns
    /// * `Ok(f64)` - The cached price if still fresh, otherwise a newly fetched one
    /// * `Err(CacheError::UpstreamFetchFailed)` - If the service call failed;
    ///   any previously cached price is left as it was
    pub async fn get_price(&self, item_code: &str) -> Result<f64, CacheError> {
        if let Some(price) = self.fresh_price(item_code) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(item_code, price, "cache hit");
            return Ok(price);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(item_code, "cache miss, asking price service");

        // The lock is not held here so other lookups can reach the service meanwhile.
        match self.service.get_price_for(item_code).await {
            Ok(price) => {
                self.lock_prices().insert(item_code.to_string(), price);
                Ok(price)
            }
            Err(source) => {
                self.upstream_failures.fetch_add(1, Ordering::Relaxed);
                warn!(item_code, error = %source, "price service lookup failed");
                Err(CacheError::UpstreamFetchFailed {
                    item_code: item_code.to_string(),
                    source,
                })
            }
        }
    }

    /// Gets the prices for several items at once
    ///
    /// All lookups run concurrently as futures on the calling task; none are
    /// spawned. Prices come back in the same order as `item_codes`, whatever
    /// order the lookups finish in.
    ///
    /// # Returns
    /// * `Ok(Vec<f64>)` - One price per requested item code
    /// * `Err(CacheError::BatchPartialFailure)` - If any lookup failed; carries
    ///   every failure and no prices
    pub async fn get_prices<S: AsRef<str>>(
        &self,
        item_codes: &[S],
    ) -> Result<Vec<f64>, CacheError> {
        let lookups = item_codes
            .iter()
            .map(|item_code| self.get_price(item_code.as_ref()));
        let results = join_all(lookups).await;

        let mut prices = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(price) => prices.push(price),
                Err(err) => failures.push(err),
            }
        }

        if failures.is_empty() {
            Ok(prices)
        } else {
            Err(CacheError::BatchPartialFailure { failures })
        }
    }

    /// Returns a snapshot of cache activity
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.lock_prices().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for TransparentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransparentCache")
            .field("max_age", &self.max_age)
            .field("epoch", &self.epoch)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::service::{ServiceError, StaticPriceService};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    /// Service answering from a table, failing for chosen codes and
    /// delaying each code by its own amount
    #[derive(Debug, Default)]
    struct ScriptedService {
        prices: HashMap<String, f64>,
        failing: Mutex<HashSet<String>>,
        delays: HashMap<String, StdDuration>,
        calls: AtomicUsize,
    }

    impl ScriptedService {
        fn with_prices(entries: &[(&str, f64)]) -> Self {
            Self {
                prices: entries
                    .iter()
                    .map(|(code, price)| (code.to_string(), *price))
                    .collect(),
                ..Default::default()
            }
        }

        fn failing_for(self, code: &str) -> Self {
            self.failing.lock().unwrap().insert(code.to_string());
            self
        }

        fn delayed(mut self, code: &str, delay: StdDuration) -> Self {
            self.delays.insert(code.to_string(), delay);
            self
        }

        fn recover(&self, code: &str) {
            self.failing.lock().unwrap().remove(code);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceService for ScriptedService {
        async fn get_price_for(&self, item_code: &str) -> Result<f64, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(item_code) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing.lock().unwrap().contains(item_code) {
                return Err(ServiceError::Unavailable(format!("{} is down", item_code)));
            }
            self.prices
                .get(item_code)
                .copied()
                .ok_or_else(|| ServiceError::UnknownItem(item_code.to_string()))
        }
    }

    fn cache_with(
        service: Arc<ScriptedService>,
        max_age: Duration,
    ) -> (TransparentCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TransparentCache::with_clock(service, max_age, clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_apple_is_fetched_once_then_again_after_window() {
        let service = Arc::new(ScriptedService::with_prices(&[("APPLE", 1.50)]));
        let (cache, clock) = cache_with(service.clone(), Duration::minutes(1));

        let price = cache.get_price("APPLE").await.unwrap();
        assert!((price - 1.50).abs() < f64::EPSILON);
        assert_eq!(service.calls(), 1);

        let price = cache.get_price("APPLE").await.unwrap();
        assert!((price - 1.50).abs() < f64::EPSILON);
        assert_eq!(service.calls(), 1, "fresh price should not hit the service");

        clock.advance(Duration::minutes(2));
        cache.get_price("APPLE").await.unwrap();
        assert_eq!(service.calls(), 2, "stale price should be fetched again");
    }

    #[tokio::test]
    async fn test_window_is_shared_by_all_entries() {
        let service = Arc::new(ScriptedService::with_prices(&[("APPLE", 1.50), ("PEAR", 2.0)]));
        let (cache, clock) = cache_with(service.clone(), Duration::minutes(1));

        cache.get_price("APPLE").await.unwrap();
        // PEAR is fetched late in the window, yet expires with APPLE.
        clock.advance(Duration::seconds(59));
        cache.get_price("PEAR").await.unwrap();
        assert_eq!(service.calls(), 2);

        clock.advance(Duration::seconds(2));
        cache.get_price("PEAR").await.unwrap();
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test]
    async fn test_refresh_does_not_move_the_epoch() {
        let service = Arc::new(ScriptedService::with_prices(&[("APPLE", 1.50)]));
        let (cache, clock) = cache_with(service.clone(), Duration::minutes(1));
        let expires_at = cache.expires_at();

        clock.advance(Duration::minutes(5));
        cache.get_price("APPLE").await.unwrap();
        cache.get_price("APPLE").await.unwrap();

        assert_eq!(cache.expires_at(), expires_at);
        assert_eq!(service.calls(), 2, "every lookup past expiry goes upstream");
    }

    #[tokio::test]
    async fn test_expiry_instant_itself_is_stale() {
        let service = Arc::new(ScriptedService::with_prices(&[("APPLE", 1.50)]));
        let (cache, clock) = cache_with(service.clone(), Duration::minutes(1));

        cache.get_price("APPLE").await.unwrap();
        clock.advance(Duration::minutes(1));
        cache.get_price("APPLE").await.unwrap();

        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_wrapped_and_not_cached() {
        let service = Arc::new(ScriptedService::with_prices(&[("APPLE", 1.50)]).failing_for("APPLE"));
        let (cache, _clock) = cache_with(service.clone(), Duration::minutes(1));

        let err = cache.get_price("APPLE").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::UpstreamFetchFailed { ref item_code, source: ServiceError::Unavailable(_) }
                if item_code == "APPLE"
        ));
        assert_eq!(cache.stats().entries, 0);

        service.recover("APPLE");
        let price = cache.get_price("APPLE").await.unwrap();
        assert!((price - 1.50).abs() < f64::EPSILON);
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_price() {
        let service = Arc::new(ScriptedService::with_prices(&[("APPLE", 1.50)]));
        let (cache, clock) = cache_with(service.clone(), Duration::minutes(1));
        cache.get_price("APPLE").await.unwrap();

        clock.advance(Duration::minutes(2));
        service.failing.lock().unwrap().insert("APPLE".to_string());
        assert!(cache.get_price("APPLE").await.is_err());
        assert_eq!(cache.lock_prices().get("APPLE").copied(), Some(1.50));

        service.recover("APPLE");
        let price = cache.get_price("APPLE").await.unwrap();
        assert!((price - 1.50).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_keeps_input_order() {
        let service = Arc::new(
            ScriptedService::with_prices(&[("A", 1.0), ("B", 2.0), ("C", 3.0)])
                .delayed("A", StdDuration::from_millis(300))
                .delayed("B", StdDuration::from_millis(100))
                .delayed("C", StdDuration::from_millis(200)),
        );
        let (cache, _clock) = cache_with(service, Duration::minutes(1));

        let prices = cache.get_prices(&["A", "B", "C"]).await.unwrap();

        assert_eq!(prices, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_batch_fails_when_any_item_fails() {
        let service = Arc::new(
            ScriptedService::with_prices(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]).failing_for("B"),
        );
        let (cache, _clock) = cache_with(service, Duration::minutes(1));

        let err = cache.get_prices(&["A", "B", "C"]).await.unwrap_err();

        assert!(matches!(err, CacheError::BatchPartialFailure { ref failures } if failures.len() == 1));
        assert_eq!(err.failed_item_codes(), vec!["B"]);
    }

    #[tokio::test]
    async fn test_batch_reports_every_failure_in_input_order() {
        let service = Arc::new(ScriptedService::with_prices(&[("B", 2.0)]));
        let (cache, _clock) = cache_with(service, Duration::minutes(1));

        let err = cache.get_prices(&["X", "B", "Y"]).await.unwrap_err();

        assert_eq!(err.failed_item_codes(), vec!["X", "Y"]);
    }

    #[tokio::test]
    async fn test_batch_mixes_cached_and_fetched_prices() {
        let service = Arc::new(ScriptedService::with_prices(&[("A", 1.0), ("B", 2.0)]));
        let (cache, _clock) = cache_with(service.clone(), Duration::minutes(1));
        cache.get_price("A").await.unwrap();

        let prices = cache.get_prices(&["A".to_string(), "B".to_string()]).await.unwrap();

        assert_eq!(prices, vec![1.0, 2.0]);
        assert_eq!(service.calls(), 2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 2);
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_call_service() {
        let service = Arc::new(ScriptedService::default());
        let (cache, _clock) = cache_with(service.clone(), Duration::minutes(1));

        let prices = cache.get_prices::<&str>(&[]).await.unwrap();

        assert!(prices.is_empty());
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_lookups_reach_service_concurrently() {
        let prices = (0..8)
            .map(|i| (format!("ITEM{}", i), i as f64))
            .collect::<HashMap<_, _>>();
        let service =
            Arc::new(StaticPriceService::new(prices).with_latency(StdDuration::from_millis(100)));
        let cache = TransparentCache::new(service.clone(), Duration::minutes(1));
        let codes: Vec<String> = (0..8).map(|i| format!("ITEM{}", i)).collect();
        let started = tokio::time::Instant::now();

        let fetched = cache.get_prices(codes.as_slice()).await.unwrap();

        assert_eq!(fetched.len(), 8);
        assert_eq!(service.calls(), 8);
        assert!(
            started.elapsed() < StdDuration::from_millis(200),
            "lookups should overlap instead of queueing behind one another"
        );
    }

    #[tokio::test]
    async fn test_cache_is_shared_across_spawned_tasks() {
        let service = Arc::new(ScriptedService::with_prices(&[("A", 1.0), ("B", 2.0)]));
        let (cache, _clock) = cache_with(service, Duration::minutes(1));
        let cache = Arc::new(cache);

        let handles: Vec<_> = ["A", "B", "A", "B"]
            .into_iter()
            .map(|code| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_price(code).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_huge_max_age_never_expires() {
        let service = Arc::new(ScriptedService::default());
        let cache = TransparentCache::new(service, Duration::MAX);

        assert!(cache.expires_at().is_none());
        assert!(cache.is_fresh());
    }
}
