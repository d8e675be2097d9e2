//! CLI command implementations

pub mod cache;
pub mod config;
pub mod fetch;
pub mod install;

pub use cache::execute as cache;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use install::execute as install;

use crate::config::Config;
use crate::network::HttpFetcher;
use std::time::Duration;

/// Live fetcher built from `[network]` settings
fn http_fetcher(config: &Config) -> HttpFetcher {
    let fetcher = HttpFetcher::new(
        Duration::from_secs(config.network.timeout_secs),
        &config.network.user_agent,
    );
    match config.network.max_body_bytes {
        Some(limit) => fetcher.with_body_limit(limit),
        None => fetcher,
    }
}
