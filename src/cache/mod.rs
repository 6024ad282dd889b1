//! Read-through cache for price lookups
//!
//! This module provides `TransparentCache`, which remembers prices fetched
//! from a `PriceService` and serves them again while they are fresh. All
//! entries share a single expiry point fixed when the cache is created.

mod clock;
mod error;
mod transparent;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CacheError;
pub use transparent::{CacheStats, TransparentCache};
