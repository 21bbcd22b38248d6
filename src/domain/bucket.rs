use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use super::entry::ForecastEntry;

/// Width of one grid slot in minutes
pub const BUCKET_MINUTES: i64 = 15;

/// A timestamp truncated to the 15-minute grid.
///
/// The offset of the source timestamp is kept, so calendar questions
/// (`day`) are answered in the provider's own local time. Comparison and
/// hashing go by instant, which makes buckets from providers reporting in
/// different offsets interchangeable as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct Bucket(DateTime<FixedOffset>);

impl Bucket {
    /// Bucket containing `t`
    pub fn containing(t: DateTime<FixedOffset>) -> Self {
        let into_slot = chrono::Duration::minutes(i64::from(t.minute()) % BUCKET_MINUTES)
            + chrono::Duration::seconds(i64::from(t.second()))
            + chrono::Duration::nanoseconds(i64::from(t.nanosecond()));
        Self(t - into_slot)
    }

    pub fn width() -> chrono::Duration {
        chrono::Duration::minutes(BUCKET_MINUTES)
    }

    /// Start of the slot
    pub fn start(&self) -> DateTime<FixedOffset> {
        self.0
    }

    /// The following slot, in the same offset
    pub fn next(&self) -> Self {
        Self(self.0 + Self::width())
    }

    /// Calendar day of the slot in its own offset
    pub fn day(&self) -> NaiveDate {
        self.0.date_naive()
    }
}

impl From<DateTime<FixedOffset>> for Bucket {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Self::containing(t)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Same text as `Display`, so a zero offset stays `+00:00`
impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Truncate `t` to the 15-minute grid.
pub fn bucket(t: DateTime<FixedOffset>) -> Bucket {
    Bucket::containing(t)
}

/// Spread a sorted entry sequence over every bucket it spans.
///
/// Each entry is emitted as its aligned copy, and every empty bucket up to
/// the next entry repeats the price of the entry before it. The last entry
/// always closes the sequence. An empty input yields an empty output and a
/// single entry yields just its aligned copy. Entries sharing a bucket are
/// all kept.
pub fn fill_gaps(entries: &[ForecastEntry]) -> Vec<ForecastEntry> {
    let Some(last) = entries.last() else {
        return Vec::new();
    };

    let mut filled = Vec::with_capacity(entries.len());
    for pair in entries.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        filled.push(current.aligned());

        let until = next.bucket();
        let mut slot = current.bucket().next();
        while slot < until {
            filled.push(ForecastEntry::new(current.price, slot.start()));
            slot = slot.next();
        }
    }
    filled.push(last.aligned());
    filled
}
