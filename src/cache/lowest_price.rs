use tracing::debug;

use super::{CacheBuilder, CacheHandle, DerivedCache};
use crate::error::BuildError;
use crate::forecast::AggregatedMap;

/// Value stored for a bucket that has no entries at all
pub const NO_PRICE: f64 = -1.0;

/// Cheapest price any provider reports for each bucket.
pub fn lowest_prices(snapshot: &AggregatedMap) -> DerivedCache<f64> {
    snapshot
        .iter()
        .map(|(bucket, entries)| {
            let lowest = entries.iter().map(|e| e.price).reduce(f64::min);
            (*bucket, lowest.unwrap_or(NO_PRICE))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct LowestPriceCache {
    handle: CacheHandle<f64>,
}

impl LowestPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> CacheHandle<f64> {
        self.handle.clone()
    }
}

impl CacheBuilder for LowestPriceCache {
    fn name(&self) -> &str {
        "lowest_price"
    }

    fn build(&self, snapshot: &AggregatedMap) -> Result<(), BuildError> {
        let cache = lowest_prices(snapshot);
        debug!(buckets = cache.len(), "lowest price cache rebuilt");
        self.handle.publish(cache);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bucket, ForecastEntry};
    use chrono::DateTime;

    fn slot(s: &str) -> Bucket {
        Bucket::containing(DateTime::parse_from_rfc3339(s).unwrap())
    }

    fn entries(b: Bucket, prices: &[f64]) -> Vec<ForecastEntry> {
        prices.iter().map(|p| ForecastEntry::new(*p, b.start())).collect()
    }

    #[test]
    fn test_minimum_over_providers() {
        let b = slot("2024-05-01T10:00:00+02:00");
        let snapshot = AggregatedMap::from_iter([(b, entries(b, &[5.0, 3.0, 8.0]))]);
        assert_eq!(lowest_prices(&snapshot).get(&b), Some(&3.0));
    }

    #[test]
    fn test_empty_bucket_gets_sentinel() {
        let b = slot("2024-05-01T10:00:00+02:00");
        let snapshot = AggregatedMap::from_iter([(b, Vec::new())]);
        assert_eq!(lowest_prices(&snapshot).get(&b), Some(&NO_PRICE));
    }

    #[test]
    fn test_build_publishes_to_handle() {
        let builder = LowestPriceCache::new();
        let reader = builder.handle();
        let b = slot("2024-05-01T10:15:00Z");
        let snapshot = AggregatedMap::from_iter([(b, entries(b, &[0.4, -0.1]))]);

        builder.build(&snapshot).unwrap();

        assert_eq!(reader.read(&b), Some(-0.1));
        assert_eq!(reader.read(&b.next()), None);
    }
}
