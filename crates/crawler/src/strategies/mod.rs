//! Built-in extraction strategies

mod listing;

pub use listing::{ListingSite, ListingStrategy};

use crate::strategy::StrategyRegistry;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Registry holding every built-in listing site
pub fn builtin_registry(page_delay: Duration, wait_timeout: Duration) -> Result<StrategyRegistry> {
    let mut registry = StrategyRegistry::new();
    for site in ListingSite::builtin() {
        registry.register(Arc::new(ListingStrategy::new(site, page_delay, wait_timeout)?));
    }
    Ok(registry)
}
