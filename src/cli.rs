//! Command-line interface parsing for the price cache
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! a `RunConfig`: the cache settings, which price service to talk to, and how
//! many lookup rounds to run.

use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// A `--price` entry is not of the form `CODE=VALUE`
    #[error("Invalid price entry: '{0}'. Expected CODE=VALUE, e.g. APPLE=1.50")]
    InvalidPriceEntry(String),

    /// The freshness window must be at least one second
    #[error("Invalid max age: must be greater than zero seconds")]
    InvalidMaxAge,

    /// At least one lookup round is required
    #[error("Invalid rounds: must be at least 1")]
    InvalidRounds,
}

/// Price cache CLI - look up item prices through a read-through cache
#[derive(Parser, Debug)]
#[command(name = "pricecache")]
#[command(about = "Look up item prices through a read-through cache")]
#[command(version)]
pub struct Cli {
    /// Item codes to look up, fetched concurrently
    #[arg(value_name = "CODE")]
    pub item_codes: Vec<String>,

    /// Seconds after startup during which cached prices are served
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub max_age: u64,

    /// Price known to the built-in table service
    ///
    /// Examples:
    ///   pricecache --price APPLE=1.50 --price PEAR=2 APPLE PEAR
    #[arg(long = "price", value_name = "CODE=VALUE")]
    pub prices: Vec<String>,

    /// Simulated latency of the built-in table service, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub latency_ms: u64,

    /// Base URL of a remote price service; replaces the built-in table
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Number of times to run the batch lookup
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub rounds: u32,

    /// Log level used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Which price service the cache sits in front of
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceChoice {
    /// In-memory table with simulated latency
    Static {
        prices: HashMap<String, f64>,
        latency: Duration,
    },
    /// Remote JSON price service
    Http { endpoint: String },
}

/// Settings for the cache itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Freshness window measured from cache creation
    pub max_age: chrono::Duration,
}

/// Configuration derived from CLI arguments for a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub cache: CacheConfig,
    pub service: ServiceChoice,
    pub item_codes: Vec<String>,
    pub rounds: u32,
}

/// Parses a `CODE=VALUE` price entry.
///
/// # Arguments
/// * `s` - The entry as given on the command line
///
/// # Returns
/// * `Ok((code, price))` if the entry is well formed
/// * `Err(CliError::InvalidPriceEntry)` otherwise
pub fn parse_price_entry(s: &str) -> Result<(String, f64), CliError> {
    let invalid = || CliError::InvalidPriceEntry(s.to_string());

    let (code, value) = s.split_once('=').ok_or_else(invalid)?;
    let code = code.trim();
    if code.is_empty() {
        return Err(invalid());
    }

    let price: f64 = value.trim().parse().map_err(|_| invalid())?;
    if !price.is_finite() || price < 0.0 {
        return Err(invalid());
    }

    Ok((code.to_string(), price))
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with appropriate settings
    /// * `Err(CliError)` if any argument is out of range or malformed
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.max_age == 0 {
            return Err(CliError::InvalidMaxAge);
        }
        if cli.rounds == 0 {
            return Err(CliError::InvalidRounds);
        }
        let max_age = i64::try_from(cli.max_age)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);

        let service = match &cli.endpoint {
            Some(endpoint) => ServiceChoice::Http {
                endpoint: endpoint.clone(),
            },
            None => ServiceChoice::Static {
                prices: cli
                    .prices
                    .iter()
                    .map(|entry| parse_price_entry(entry))
                    .collect::<Result<_, _>>()?,
                latency: Duration::from_millis(cli.latency_ms),
            },
        };

        Ok(RunConfig {
            cache: CacheConfig { max_age },
            service,
            item_codes: cli.item_codes.clone(),
            rounds: cli.rounds,
        })
    }
}
