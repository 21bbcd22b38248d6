use tracing::debug;

use super::{CacheBuilder, CacheHandle, DerivedCache};
use crate::analysis::{find_peaks, PeakError, PeakParams};
use crate::domain::Bucket;
use crate::error::BuildError;
use crate::forecast::AggregatedMap;

/// Widest accepted peak, in buckets, when none is configured
pub const DEFAULT_MAX_WIDTH: f64 = 4.0;

/// Selectivity of one peak (or trough) sensor
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSettings {
    pub threshold: Option<f64>,
    pub distance: Option<usize>,
    pub max_width: f64,
    pub lookup_window: Option<usize>,
    pub prominence: Option<f64>,
    /// Look for price valleys instead of price peaks
    pub troughs: bool,
}

impl Default for PeakSettings {
    fn default() -> Self {
        Self {
            threshold: None,
            distance: None,
            max_width: DEFAULT_MAX_WIDTH,
            lookup_window: None,
            prominence: None,
            troughs: false,
        }
    }
}

impl PeakSettings {
    fn params(&self) -> PeakParams {
        PeakParams {
            threshold: self.threshold,
            distance: self.distance,
            prominence: self.prominence,
            width: Some((1.0, self.max_width)),
            wlen: self.lookup_window,
        }
    }
}

/// Buckets covered by a detected peak, valued with that peak's prominence.
///
/// The series is the lowest price per non-empty bucket in time order,
/// negated when looking for troughs. A peak covers every grid bucket between
/// its rounded half-prominence crossings, including buckets missing from
/// the series. Crossings are rounded half to even. Where spans overlap the
/// later peak wins.
pub fn peak_regions(
    snapshot: &AggregatedMap,
    settings: &PeakSettings,
) -> Result<DerivedCache<f64>, PeakError> {
    let series: Vec<(Bucket, f64)> = snapshot
        .iter()
        .filter_map(|(bucket, entries)| {
            entries
                .iter()
                .map(|e| e.price)
                .reduce(f64::min)
                .map(|price| (*bucket, price))
        })
        .collect();
    let values: Vec<f64> = series
        .iter()
        .map(|(_, price)| if settings.troughs { -price } else { *price })
        .collect();

    let mut regions = DerivedCache::new();
    for peak in find_peaks(&values, &settings.params())? {
        let (left, _) = series[crossing_index(peak.left_ips)];
        let (right, _) = series[crossing_index(peak.right_ips)];
        let mut slot = left;
        while slot <= right {
            regions.insert(slot, peak.prominence);
            slot = slot.next();
        }
    }
    Ok(regions)
}

fn crossing_index(ips: f64) -> usize {
    ips.round_ties_even() as usize
}

/// Named peak or trough detector publishing its regions
#[derive(Debug, Clone)]
pub struct PeakCache {
    name: String,
    settings: PeakSettings,
    handle: CacheHandle<f64>,
}

impl PeakCache {
    pub fn new(name: impl Into<String>, settings: PeakSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            handle: CacheHandle::new(),
        }
    }

    pub fn handle(&self) -> CacheHandle<f64> {
        self.handle.clone()
    }

    pub fn settings(&self) -> &PeakSettings {
        &self.settings
    }
}

impl CacheBuilder for PeakCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, snapshot: &AggregatedMap) -> Result<(), BuildError> {
        let cache = peak_regions(snapshot, &self.settings).map_err(|source| BuildError::Peak {
            cache: self.name.clone(),
            source,
        })?;
        debug!(
            cache = %self.name,
            troughs = self.settings.troughs,
            buckets = cache.len(),
            "peak cache rebuilt"
        );
        self.handle.publish(cache);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ForecastEntry;
    use chrono::DateTime;

    const UNIMODAL: [f64; 20] = [
        0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 5.0, 0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3,
        0.2, 0.1,
    ];

    fn origin() -> Bucket {
        Bucket::containing(DateTime::parse_from_rfc3339("2024-05-01T00:00:00+02:00").unwrap())
    }

    fn nth(n: usize) -> Bucket {
        (0..n).fold(origin(), |b, _| b.next())
    }

    fn snapshot_at(slots: &[(usize, f64)]) -> AggregatedMap {
        slots
            .iter()
            .map(|(n, price)| {
                let b = nth(*n);
                (b, vec![ForecastEntry::new(*price, b.start())])
            })
            .collect()
    }

    fn series(prices: &[f64]) -> AggregatedMap {
        snapshot_at(&prices.iter().copied().enumerate().collect::<Vec<_>>())
    }

    fn covered(cache: &DerivedCache<f64>) -> Vec<Bucket> {
        cache.iter().map(|(b, _)| *b).collect()
    }

    #[test]
    fn test_single_peak_brackets_maximum() {
        let cache = peak_regions(&series(&UNIMODAL), &PeakSettings::default()).unwrap();
        assert_eq!(covered(&cache), vec![nth(9), nth(10), nth(11)]);
        for (_, prominence) in cache.iter() {
            assert!((prominence - 4.9).abs() < 1e-9);
        }
    }

    #[test]
    fn test_trough_of_mirrored_series_has_same_span() {
        let mirrored: Vec<f64> = UNIMODAL.iter().map(|p| 6.0 - p).collect();
        let settings = PeakSettings {
            troughs: true,
            ..Default::default()
        };
        let cache = peak_regions(&series(&mirrored), &settings).unwrap();
        assert_eq!(covered(&cache), vec![nth(9), nth(10), nth(11)]);

        let as_peaks = peak_regions(&series(&mirrored), &PeakSettings::default()).unwrap();
        assert!(as_peaks.is_empty());
    }

    #[test]
    fn test_crossings_round_half_to_even() {
        // crossings at 4.5 and 5.5
        let prices = [0.0, 0.0, 0.0, 4.0, 0.0, 6.0, 0.0, 0.0, 0.0, 0.0];
        let settings = PeakSettings {
            distance: Some(3),
            ..Default::default()
        };
        let cache = peak_regions(&series(&prices), &settings).unwrap();
        assert_eq!(covered(&cache), vec![nth(4), nth(5), nth(6)]);
        assert_eq!(cache.get(&nth(5)), Some(&6.0));
    }

    #[test]
    fn test_span_fills_uncovered_buckets() {
        // crossings at samples 2.25 and 3.75, no data for bucket 4
        let cache = peak_regions(
            &snapshot_at(&[(0, 0.0), (1, 0.0), (2, 2.0), (3, 6.0), (5, 2.0), (6, 0.0), (7, 0.0)]),
            &PeakSettings::default(),
        )
        .unwrap();
        assert_eq!(covered(&cache), vec![nth(2), nth(3), nth(4), nth(5)]);
    }

    #[test]
    fn test_empty_buckets_are_left_out_of_series() {
        let mut slots: Vec<(Bucket, Vec<ForecastEntry>)> = series(&UNIMODAL)
            .iter()
            .map(|(b, e)| (*b, e.to_vec()))
            .collect();
        slots.push((nth(25), Vec::new()));
        let snapshot: AggregatedMap = slots.into_iter().collect();
        let cache = peak_regions(&snapshot, &PeakSettings::default()).unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_minimum_price_feeds_series() {
        let mut snapshot = series(&UNIMODAL);
        snapshot.insert(ForecastEntry::new(0.0, nth(10).start()));
        let cache = peak_regions(&snapshot, &PeakSettings::default()).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalid_settings_fail_build() {
        let builder = PeakCache::new(
            "evening",
            PeakSettings {
                lookup_window: Some(1),
                ..Default::default()
            },
        );
        let err = builder.build(&series(&UNIMODAL)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "peak cache evening: lookup window must be larger than 1, got 1"
        );
        assert!(builder.handle().snapshot().is_empty());
    }
}
