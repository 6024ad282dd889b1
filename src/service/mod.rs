//! Price lookup services sitting behind the cache
//!
//! This module defines the `PriceService` capability consumed by the cache,
//! along with the two concrete services the CLI can run against: an
//! in-memory table with simulated latency, and an HTTP JSON endpoint.

pub mod http;
pub mod static_table;

pub use http::HttpPriceService;
pub use static_table::StaticPriceService;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when asking a backing service for a price
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service has no price for this item code
    #[error("Unknown item code: '{0}'")]
    UnknownItem(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status code
    #[error("Price service returned status {0}")]
    Status(u16),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Service answered for a different item than the one requested
    #[error("Price service answered for '{returned}' instead of '{requested}'")]
    ItemMismatch { requested: String, returned: String },

    /// Service returned a price that cannot be a real price
    #[error("Invalid price in response: {0}")]
    InvalidPrice(f64),

    /// Service is temporarily unable to answer
    #[error("Price service unavailable: {0}")]
    Unavailable(String),
}

/// A slow, fallible lookup returning the current price for an item code
///
/// Calls are assumed to be expensive (network or disk latency), which is
/// the reason `TransparentCache` exists. Implementations must be shareable
/// across tasks.
#[async_trait]
pub trait PriceService: Send + Sync {
    /// Fetches the current price for `item_code`
    async fn get_price_for(&self, item_code: &str) -> Result<f64, ServiceError>;
}

/// Rejects prices that are negative, NaN or infinite
pub(crate) fn validate_price(price: f64) -> Result<f64, ServiceError> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(ServiceError::InvalidPrice(price))
    }
}
