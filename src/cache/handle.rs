use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::Bucket;

/// A derived view: one scalar per bucket
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedCache<V> {
    values: BTreeMap<Bucket, V>,
}

impl<V> Default for DerivedCache<V> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<V> DerivedCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bucket: Bucket, value: V) {
        self.values.insert(bucket, value);
    }

    pub fn get(&self, bucket: &Bucket) -> Option<&V> {
        self.values.get(bucket)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bucket, &V)> {
        self.values.iter()
    }
}

impl<V> FromIterator<(Bucket, V)> for DerivedCache<V> {
    fn from_iter<I: IntoIterator<Item = (Bucket, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Shared storage slot for one builder's cache.
///
/// Builders publish a complete replacement; readers grab the current `Arc`
/// and never see a cache that is still being assembled. Clones share the
/// same slot.
#[derive(Debug)]
pub struct CacheHandle<V> {
    current: Arc<RwLock<Arc<DerivedCache<V>>>>,
}

impl<V> Clone for CacheHandle<V> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<V> Default for CacheHandle<V> {
    fn default() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(DerivedCache::new()))),
        }
    }
}

impl<V> CacheHandle<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache
    pub fn publish(&self, cache: DerivedCache<V>) {
        *self.current.write() = Arc::new(cache);
    }

    /// The latest published cache
    pub fn snapshot(&self) -> Arc<DerivedCache<V>> {
        Arc::clone(&self.current.read())
    }
}

impl<V: Clone> CacheHandle<V> {
    pub fn read(&self, bucket: &Bucket) -> Option<V> {
        self.snapshot().get(bucket).cloned()
    }
}
