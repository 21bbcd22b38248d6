use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::bucket::Bucket;

/// A single forecast observation: a price valid from `instant` onwards.
///
/// Providers emit these in whatever resolution they have; normalization
/// produces bucket-aligned copies rather than rewriting entries in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub price: f64,
    pub instant: DateTime<FixedOffset>,
}

impl ForecastEntry {
    pub fn new(price: f64, instant: DateTime<FixedOffset>) -> Self {
        Self { price, instant }
    }

    /// The bucket this entry belongs to
    pub fn bucket(&self) -> Bucket {
        Bucket::containing(self.instant)
    }

    /// Copy of this entry with `instant` moved to its bucket boundary
    pub fn aligned(&self) -> Self {
        Self {
            price: self.price,
            instant: self.bucket().start(),
        }
    }
}

/// Sort entries ascending by instant, keeping the relative order of equal instants.
pub fn sort_by_instant(entries: &mut [ForecastEntry]) {
    entries.sort_by_key(|e| e.instant);
}
