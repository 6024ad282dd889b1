//! In-memory price table with simulated latency
//!
//! Stands in for a real price backend: every lookup sleeps for a fixed
//! latency before answering, so cache hits are visible in the timing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use super::{PriceService, ServiceError};

/// Price service backed by a fixed table of item codes
#[derive(Debug, Default)]
pub struct StaticPriceService {
    /// Known prices keyed by item code
    prices: HashMap<String, f64>,
    /// How long each lookup takes
    latency: Duration,
    /// Number of lookups served so far, successful or not
    calls: AtomicUsize,
}

impl StaticPriceService {
    /// Creates a service answering from `prices` with no added latency
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self {
            prices,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sets the simulated latency applied to every lookup
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns how many lookups this service has answered
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceService for StaticPriceService {
    async fn get_price_for(&self, item_code: &str) -> Result<f64, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        trace!(item_code, latency_ms = self.latency.as_millis() as u64, "static lookup");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.prices
            .get(item_code)
            .copied()
            .ok_or_else(|| ServiceError::UnknownItem(item_code.to_string()))
    }
}
