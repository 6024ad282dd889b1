//! Errors surfaced by the transparent cache

use thiserror::Error;

use crate::service::ServiceError;

/// Errors returned by `TransparentCache` lookups
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing service failed while fetching a price
    #[error("getting price for '{item_code}' from service: {source}")]
    UpstreamFetchFailed {
        /// Item code that was being looked up
        item_code: String,
        /// Underlying service failure
        #[source]
        source: ServiceError,
    },

    /// One or more lookups in a batch failed, so the batch has no result
    #[error("{} of the requested prices could not be fetched: {}", .failures.len(), describe(.failures))]
    BatchPartialFailure {
        /// Every failed lookup, in the order the item codes were requested
        failures: Vec<CacheError>,
    },
}

impl CacheError {
    /// Returns the item codes whose lookups failed
    pub fn failed_item_codes(&self) -> Vec<&str> {
        match self {
            CacheError::UpstreamFetchFailed { item_code, .. } => vec![item_code.as_str()],
            CacheError::BatchPartialFailure { failures } => failures
                .iter()
                .flat_map(CacheError::failed_item_codes)
                .collect(),
        }
    }
}

fn describe(failures: &[CacheError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
