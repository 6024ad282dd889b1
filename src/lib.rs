//! Price Cache Library
//!
//! A read-through cache in front of a slow price service, plus the services
//! and CLI plumbing used by the `pricecache` binary.

pub mod cache;
pub mod cli;
pub mod logging;
pub mod service;

pub use cache::{CacheError, CacheStats, TransparentCache};
pub use service::{PriceService, ServiceError};
