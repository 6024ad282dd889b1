//! Price Cache CLI - look up item prices through a read-through cache
//!
//! Builds the selected price service, puts a `TransparentCache` in front of
//! it, and runs one or more concurrent batch lookups for the requested codes.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use pricecache::cli::{Cli, RunConfig, ServiceChoice};
use pricecache::service::{HttpPriceService, PriceService, StaticPriceService};
use pricecache::{logging, TransparentCache};

/// Builds the price service chosen on the command line
fn build_service(choice: ServiceChoice) -> Arc<dyn PriceService> {
    match choice {
        ServiceChoice::Static { prices, latency } => {
            Arc::new(StaticPriceService::new(prices).with_latency(latency))
        }
        ServiceChoice::Http { endpoint } => Arc::new(HttpPriceService::new(endpoint)),
    }
}

async fn run(config: RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let service = build_service(config.service);
    let cache = TransparentCache::new(service, config.cache.max_age);

    for round in 1..=config.rounds {
        let started = std::time::Instant::now();
        let prices = cache.get_prices(config.item_codes.as_slice()).await?;
        info!(
            round,
            items = prices.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch lookup finished"
        );

        for (item_code, price) in config.item_codes.iter().zip(&prices) {
            println!("{}\t{:.2}", item_code, price);
        }
    }

    let stats = cache.stats();
    info!(
        entries = stats.entries,
        hits = stats.hits,
        misses = stats.misses,
        upstream_failures = stats.upstream_failures,
        "cache summary"
    );

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = match RunConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
