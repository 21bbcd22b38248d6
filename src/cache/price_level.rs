use itertools::Itertools;
use ordered_float::OrderedFloat;
use tracing::debug;

use super::{CacheBuilder, CacheHandle, DerivedCache};
use crate::error::BuildError;
use crate::forecast::AggregatedMap;

/// Rank of each bucket's price within its calendar day, 0 being the cheapest.
///
/// Each bucket is represented by its first entry. Equal prices keep time
/// order. The most expensive bucket of every day is left unranked.
pub fn price_levels(snapshot: &AggregatedMap) -> DerivedCache<usize> {
    let by_day = snapshot
        .iter()
        .filter_map(|(bucket, entries)| entries.first().map(|e| (*bucket, e.price)))
        .into_group_map_by(|(bucket, _)| bucket.day());

    let mut levels = DerivedCache::new();
    for (_, mut slots) in by_day {
        slots.sort_by_key(|(_, price)| OrderedFloat(*price));
        let ranked = slots.len().saturating_sub(1);
        for (rank, (bucket, _)) in slots.into_iter().take(ranked).enumerate() {
            levels.insert(bucket, rank);
        }
    }
    levels
}

#[derive(Debug, Clone, Default)]
pub struct PriceLevelCache {
    handle: CacheHandle<usize>,
}

impl PriceLevelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> CacheHandle<usize> {
        self.handle.clone()
    }
}

impl CacheBuilder for PriceLevelCache {
    fn name(&self) -> &str {
        "price_level"
    }

    fn build(&self, snapshot: &AggregatedMap) -> Result<(), BuildError> {
        let cache = price_levels(snapshot);
        debug!(buckets = cache.len(), "price level cache rebuilt");
        self.handle.publish(cache);
        Ok(())
    }
}
