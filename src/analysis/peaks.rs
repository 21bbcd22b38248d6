//! Peak Detection
//!
//! Local-maximum search on an evenly sampled series with the usual
//! selection stages: vertical threshold to the direct neighbours, minimum
//! horizontal distance between peaks, topographic prominence and width at
//! half prominence. Stages run in that order and each one only sees the
//! peaks that survived the previous stage.

use ordered_float::OrderedFloat;
use thiserror::Error;

/// Height at which widths are measured, relative to the prominence
pub const REL_HEIGHT: f64 = 0.5;

/// Selection criteria; `None` disables a stage
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeakParams {
    /// Minimum vertical drop to both direct neighbours
    pub threshold: Option<f64>,
    /// Minimum index distance between two kept peaks (≥ 1)
    pub distance: Option<usize>,
    /// Minimum prominence
    pub prominence: Option<f64>,
    /// Inclusive `(min, max)` width in samples, measured at half prominence
    pub width: Option<(f64, f64)>,
    /// Window length (≥ 2) bounding the prominence search around each peak
    pub wlen: Option<usize>,
}

impl PeakParams {
    pub fn validate(&self) -> Result<(), PeakError> {
        if let Some(distance) = self.distance {
            if distance < 1 {
                return Err(PeakError::InvalidDistance(distance));
            }
        }
        if let Some(wlen) = self.wlen {
            if wlen < 2 {
                return Err(PeakError::InvalidLookupWindow(wlen));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PeakError {
    #[error("distance must be at least 1, got {0}")]
    InvalidDistance(usize),

    #[error("lookup window must be larger than 1, got {0}")]
    InvalidLookupWindow(usize),
}

/// A detected peak with its measured properties
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub prominence: f64,
    pub left_base: usize,
    pub right_base: usize,
    pub width: f64,
    /// Height of the line the width is measured on
    pub width_height: f64,
    /// Interpolated position where the signal crosses `width_height` left of the peak
    pub left_ips: f64,
    /// Same crossing on the right side
    pub right_ips: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prominence {
    pub prominence: f64,
    pub left_base: usize,
    pub right_base: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Width {
    pub width: f64,
    pub height: f64,
    pub left_ips: f64,
    pub right_ips: f64,
}

/// Find peaks in `x` that satisfy every enabled criterion of `params`.
pub fn find_peaks(x: &[f64], params: &PeakParams) -> Result<Vec<Peak>, PeakError> {
    params.validate()?;

    let mut indices = local_maxima(x);
    if let Some(threshold) = params.threshold {
        indices.retain(|&p| (x[p] - x[p - 1]).min(x[p] - x[p + 1]) >= threshold);
    }
    if let Some(distance) = params.distance {
        indices = select_by_distance(x, &indices, distance);
    }

    let mut peaks: Vec<Peak> = indices
        .into_iter()
        .map(|index| {
            let prominence = peak_prominence(x, index, params.wlen);
            let width = peak_width(x, index, &prominence, REL_HEIGHT);
            Peak {
                index,
                prominence: prominence.prominence,
                left_base: prominence.left_base,
                right_base: prominence.right_base,
                width: width.width,
                width_height: width.height,
                left_ips: width.left_ips,
                right_ips: width.right_ips,
            }
        })
        .collect();

    if let Some(min_prominence) = params.prominence {
        peaks.retain(|p| p.prominence >= min_prominence);
    }
    if let Some((min_width, max_width)) = params.width {
        peaks.retain(|p| min_width <= p.width && p.width <= max_width);
    }
    Ok(peaks)
}

/// Indices of all local maxima.
///
/// Flat tops count once, at their middle sample (rounded down). The first
/// and last sample are never peaks.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }

    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let right_edge = ahead - 1;
                peaks.push((i + right_edge) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Drop peaks closer than `distance` to a higher one.
///
/// Peaks are visited from highest to lowest; among equal heights the later
/// peak is visited first.
fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];
    let mut by_height: Vec<usize> = (0..peaks.len()).collect();
    by_height.sort_by_key(|&i| OrderedFloat(x[peaks[i]]));

    for &i in by_height.iter().rev() {
        if !keep[i] {
            continue;
        }
        for k in (0..i).rev() {
            if peaks[i] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in i + 1..peaks.len() {
            if peaks[k] - peaks[i] >= distance {
                break;
            }
            keep[k] = false;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}

/// Prominence of the peak at `peak`.
///
/// Walks outwards on both sides while the signal stays at or below the
/// peak, tracking the lowest point as that side's base. With a window,
/// the walk stops `wlen / 2` samples from the peak.
pub fn peak_prominence(x: &[f64], peak: usize, wlen: Option<usize>) -> Prominence {
    let (mut i_min, mut i_max) = (0, x.len() - 1);
    if let Some(wlen) = wlen.filter(|w| *w >= 2) {
        i_min = peak.saturating_sub(wlen / 2);
        i_max = (peak + wlen / 2).min(i_max);
    }

    let top = x[peak];
    let (mut left_min, mut left_base) = (top, peak);
    for i in (i_min..=peak).rev() {
        if x[i] > top {
            break;
        }
        if x[i] < left_min {
            left_min = x[i];
            left_base = i;
        }
    }

    let (mut right_min, mut right_base) = (top, peak);
    for i in peak..=i_max {
        if x[i] > top {
            break;
        }
        if x[i] < right_min {
            right_min = x[i];
            right_base = i;
        }
    }

    Prominence {
        prominence: top - left_min.max(right_min),
        left_base,
        right_base,
    }
}

/// Width of the peak at `rel_height` of its prominence, with the crossing
/// points linearly interpolated between samples.
pub fn peak_width(x: &[f64], peak: usize, prominence: &Prominence, rel_height: f64) -> Width {
    let height = x[peak] - prominence.prominence * rel_height;

    let mut i = peak;
    while prominence.left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left_ips = i as f64;
    if x[i] < height {
        left_ips += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < prominence.right_base && height < x[i] {
        i += 1;
    }
    let mut right_ips = i as f64;
    if x[i] < height {
        right_ips -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    Width {
        width: right_ips - left_ips,
        height,
        left_ips,
        right_ips,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIMODAL: [f64; 20] = [
        0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 5.0, 0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3,
        0.2, 0.1,
    ];

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_local_maxima() {
        assert_eq!(local_maxima(&[1.0, 3.0, 2.0, 4.0, 4.0, 4.0, 1.0, 5.0]), vec![1, 4]);
        assert_eq!(local_maxima(&[0.0, 2.0, 2.0, 1.0]), vec![1]);
        assert!(local_maxima(&[0.0, 2.0, 2.0]).is_empty());
        assert!(local_maxima(&[3.0, 1.0]).is_empty());
        assert!(local_maxima(&[]).is_empty());
    }

    #[test]
    fn test_prominence_walks_to_lowest_point() {
        let x = [0.0, 5.0, 1.0, 3.0, 2.0, 0.0];
        let p = peak_prominence(&x, 3, None);
        assert_eq!(p.prominence, 2.0);
        assert_eq!((p.left_base, p.right_base), (2, 5));

        let tall = peak_prominence(&x, 1, None);
        assert_eq!(tall.prominence, 5.0);
        assert_eq!((tall.left_base, tall.right_base), (0, 5));
    }

    #[test]
    fn test_prominence_respects_window() {
        let x = [0.0, 5.0, 1.0, 3.0, 2.0, 0.0];
        let p = peak_prominence(&x, 3, Some(3));
        assert_eq!(p.prominence, 1.0);
        assert_eq!((p.left_base, p.right_base), (2, 4));
    }

    #[test]
    fn test_width_is_interpolated() {
        let prominence = peak_prominence(&UNIMODAL, 10, None);
        assert_close(prominence.prominence, 4.9);
        let width = peak_width(&UNIMODAL, 10, &prominence, REL_HEIGHT);
        assert_close(width.height, 2.55);
        assert_close(width.left_ips, 9.0 + 1.65 / 4.1);
        assert_close(width.right_ips, 11.0 - 1.65 / 4.1);
        assert_close(width.width, 2.0 - 3.3 / 4.1);
    }

    #[test]
    fn test_single_spike_width_is_one() {
        let x = [0.0, 0.0, 0.0, 4.0, 0.0, 6.0, 0.0, 0.0];
        let prominence = peak_prominence(&x, 5, None);
        let width = peak_width(&x, 5, &prominence, REL_HEIGHT);
        assert_eq!(width.left_ips, 4.5);
        assert_eq!(width.right_ips, 5.5);
        assert_eq!(width.width, 1.0);
    }

    #[test]
    fn test_threshold_selection() {
        let x = [0.0, 5.0, 1.0, 3.0, 2.0, 0.0];
        let params = PeakParams {
            threshold: Some(2.0),
            ..Default::default()
        };
        let peaks = find_peaks(&x, &params).unwrap();
        assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_distance_keeps_highest() {
        let x = [0.0, 0.0, 0.0, 4.0, 0.0, 6.0, 0.0, 0.0, 0.0, 0.0];
        let near = PeakParams {
            distance: Some(3),
            ..Default::default()
        };
        let peaks = find_peaks(&x, &near).unwrap();
        assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![5]);

        let far = PeakParams {
            distance: Some(2),
            ..Default::default()
        };
        let peaks = find_peaks(&x, &far).unwrap();
        assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn test_distance_tie_keeps_later_peak() {
        let x = [0.0, 5.0, 0.0, 5.0, 0.0];
        let params = PeakParams {
            distance: Some(3),
            ..Default::default()
        };
        let peaks = find_peaks(&x, &params).unwrap();
        assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_prominence_and_width_filters() {
        let base = PeakParams {
            prominence: Some(1.0),
            width: Some((1.0, 4.0)),
            ..Default::default()
        };
        let peaks = find_peaks(&UNIMODAL, &base).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 10);

        let too_prominent = PeakParams {
            prominence: Some(5.0),
            ..base.clone()
        };
        assert!(find_peaks(&UNIMODAL, &too_prominent).unwrap().is_empty());

        let too_narrow = PeakParams {
            width: Some((1.0, 1.1)),
            ..base
        };
        assert!(find_peaks(&UNIMODAL, &too_narrow).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_params() {
        let params = PeakParams {
            distance: Some(0),
            ..Default::default()
        };
        assert_eq!(find_peaks(&UNIMODAL, &params), Err(PeakError::InvalidDistance(0)));

        let params = PeakParams {
            wlen: Some(1),
            ..Default::default()
        };
        assert_eq!(
            find_peaks(&UNIMODAL, &params),
            Err(PeakError::InvalidLookupWindow(1))
        );
    }
}
