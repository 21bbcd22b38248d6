use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::cache::CacheHandle;
use crate::coordinator::RefreshCoordinator;
use crate::domain::Bucket;

/// Value of a sensor for one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading<V> {
    pub bucket: Bucket,
    pub value: Option<V>,
}

/// Read side of one derived cache.
///
/// Every poll first asks the coordinator for fresh data, then looks up the
/// bucket containing "now". A failed refresh is tolerated and the last
/// published cache is served.
pub struct Sensor<V> {
    name: String,
    coordinator: Arc<RefreshCoordinator>,
    handle: CacheHandle<V>,
    fallback: Option<V>,
}

impl<V: Clone> Sensor<V> {
    /// Sensor answering `None` for buckets without a value
    pub fn new(name: impl Into<String>, coordinator: Arc<RefreshCoordinator>, handle: CacheHandle<V>) -> Self {
        Self {
            name: name.into(),
            coordinator,
            handle,
            fallback: None,
        }
    }

    /// Answer `fallback` instead of `None` for buckets without a value
    pub fn with_fallback(mut self, fallback: V) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cached_buckets(&self) -> usize {
        self.handle.snapshot().len()
    }

    pub fn current_bucket(&self) -> Bucket {
        Bucket::containing(self.coordinator.now().fixed_offset())
    }

    pub async fn poll(&self) -> SensorReading<V> {
        if let Err(e) = self.coordinator.ensure_fresh().await {
            warn!(sensor = %self.name, error = %e, "refresh failed, serving cached value");
        }
        self.read_at(self.current_bucket())
    }

    /// Lookup without triggering a refresh
    pub fn read_at(&self, bucket: Bucket) -> SensorReading<V> {
        let value = self.handle.read(&bucket).or_else(|| self.fallback.clone());
        SensorReading { bucket, value }
    }
}
