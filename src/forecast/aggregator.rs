use std::collections::BTreeMap;

use crate::domain::{fill_gaps, sort_by_instant, Bucket, ForecastEntry};

use super::Coverage;

/// Entries of one provider for one refresh cycle
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    pub coverage: Coverage,
    pub entries: Vec<ForecastEntry>,
}

impl ProviderOutput {
    pub fn new(coverage: Coverage, entries: Vec<ForecastEntry>) -> Self {
        Self { coverage, entries }
    }
}

/// Every provider's entries, grouped by bucket.
///
/// Within a bucket, entries appear in provider order. Prices are not
/// reconciled here; each cache builder applies its own reduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedMap {
    buckets: BTreeMap<Bucket, Vec<ForecastEntry>>,
}

impl AggregatedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry under its bucket, rewriting its instant to the bucket start
    pub fn insert(&mut self, entry: ForecastEntry) {
        let aligned = entry.aligned();
        self.buckets.entry(aligned.bucket()).or_default().push(aligned);
    }

    pub fn get(&self, bucket: &Bucket) -> Option<&[ForecastEntry]> {
        self.buckets.get(bucket).map(Vec::as_slice)
    }

    /// Buckets in ascending order with their entries
    pub fn iter(&self) -> impl Iterator<Item = (&Bucket, &[ForecastEntry])> {
        self.buckets.iter().map(|(b, e)| (b, e.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of entries across all buckets
    pub fn entry_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

impl FromIterator<(Bucket, Vec<ForecastEntry>)> for AggregatedMap {
    fn from_iter<I: IntoIterator<Item = (Bucket, Vec<ForecastEntry>)>>(iter: I) -> Self {
        Self {
            buckets: iter.into_iter().collect(),
        }
    }
}

/// Merge provider outputs into one bucket map.
///
/// Full-horizon outputs are gap-filled first; partial outputs are only
/// aligned, since a missing slot there carries meaning.
pub fn aggregate(outputs: &[ProviderOutput]) -> AggregatedMap {
    let mut map = AggregatedMap::new();
    for output in outputs {
        match output.coverage {
            Coverage::FullHorizon => {
                let mut sorted = output.entries.clone();
                sort_by_instant(&mut sorted);
                fill_gaps(&sorted).into_iter().for_each(|e| map.insert(e));
            }
            Coverage::Partial => output.entries.iter().for_each(|e| map.insert(*e)),
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn entry(price: f64, s: &str) -> ForecastEntry {
        ForecastEntry::new(price, at(s))
    }

    #[test]
    fn test_full_horizon_output_is_gap_filled() {
        let outputs = vec![ProviderOutput::new(
            Coverage::FullHorizon,
            vec![entry(1.0, "2024-05-01T00:00:00Z"), entry(2.0, "2024-05-01T01:00:00Z")],
        )];
        let map = aggregate(&outputs);
        assert_eq!(map.len(), 5);
        let half = map.get(&Bucket::containing(at("2024-05-01T00:30:00Z"))).unwrap();
        assert_eq!(half, &[entry(1.0, "2024-05-01T00:30:00Z")]);
    }

    #[test]
    fn test_partial_output_keeps_gaps() {
        let outputs = vec![ProviderOutput::new(
            Coverage::Partial,
            vec![entry(0.0, "2024-05-01T10:00:00Z"), entry(0.0, "2024-05-01T11:00:00Z")],
        )];
        let map = aggregate(&outputs);
        assert_eq!(map.len(), 2);
        assert!(map.get(&Bucket::containing(at("2024-05-01T10:15:00Z"))).is_none());
    }

    #[test]
    fn test_multiplicity_is_preserved_in_provider_order() {
        let outputs = vec![
            ProviderOutput::new(Coverage::FullHorizon, vec![entry(0.30, "2024-05-01T10:00:00Z")]),
            ProviderOutput::new(Coverage::Partial, vec![entry(0.05, "2024-05-01T10:07:00Z")]),
        ];
        let map = aggregate(&outputs);
        assert_eq!(map.len(), 1);
        assert_eq!(map.entry_count(), 2);
        let slot = map.get(&Bucket::containing(at("2024-05-01T10:00:00Z"))).unwrap();
        assert_eq!(slot[0].price, 0.30);
        assert_eq!(slot[1].price, 0.05);
        assert_eq!(slot[1].instant, at("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn test_unsorted_full_horizon_output_is_sorted_before_filling() {
        let outputs = vec![ProviderOutput::new(
            Coverage::FullHorizon,
            vec![entry(2.0, "2024-05-01T00:30:00Z"), entry(1.0, "2024-05-01T00:00:00Z")],
        )];
        let map = aggregate(&outputs);
        let prices: Vec<f64> = map.iter().map(|(_, e)| e[0].price).collect();
        assert_eq!(prices, vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_empty_outputs() {
        assert!(aggregate(&[]).is_empty());
        let outputs = vec![ProviderOutput::new(Coverage::FullHorizon, vec![])];
        assert!(aggregate(&outputs).is_empty());
    }
}
