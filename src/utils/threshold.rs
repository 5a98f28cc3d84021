//! Threshold selection and binarization
//!
//! Two strategies for picking the binarization cut on the smoothed volume:
//! Otsu's histogram method and a percentile of the flattened intensity
//! distribution. Any other strategy name is rejected at configuration
//! parse time; there is no fallback.

use crate::config::ThresholdType;

/// A binarized volume, same shape as its source. Produced by comparing
/// smoothed intensities against a scalar threshold; consumed exactly once
/// by surface extraction.
#[derive(Debug, Clone)]
pub struct BinaryVolume {
    /// Voxel mask (0/1), length `nx * ny * nz`, Fortran order.
    pub data: Vec<u8>,
    /// Dimensions (nx, ny, nz).
    pub dims: (usize, usize, usize),
}

impl BinaryVolume {
    /// Number of foreground voxels.
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }
}

/// Compute the binarization threshold with the configured strategy.
pub fn compute_threshold(data: &[f64], threshold_type: ThresholdType, percentile: f64) -> f64 {
    match threshold_type {
        ThresholdType::Otsu => otsu_threshold(data, 256),
        ThresholdType::Percentile => percentile_threshold(data, percentile),
    }
}

/// Otsu's method for automatic threshold selection
///
/// Finds the threshold that maximizes inter-class variance. Operates on
/// all values including zeros and returns the threshold at a bin edge.
///
/// # Arguments
/// * `data` - Input data (flattened smoothed volume)
/// * `num_bins` - Number of histogram bins (typically 256)
///
/// # Returns
/// The optimal threshold value
pub fn otsu_threshold(data: &[f64], num_bins: usize) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let min_val = data.iter().fold(f64::MAX, |a, &b| a.min(b));
    let max_val = data.iter().fold(f64::MIN, |a, &b| a.max(b));

    if (max_val - min_val).abs() < 1e-10 {
        return min_val;
    }

    // Build histogram over the full intensity range
    let bin_width = (max_val - min_val) / num_bins as f64;
    let mut histogram = vec![0usize; num_bins];

    for &v in data {
        let bin = ((v - min_val) / bin_width).floor() as usize;
        let bin = bin.min(num_bins - 1);
        histogram[bin] += 1;
    }

    let total_pixels = data.len() as f64;

    let mut sum_total = 0.0;
    for (i, &count) in histogram.iter().enumerate() {
        sum_total += i as f64 * count as f64;
    }

    let mut sum_background = 0.0;
    let mut weight_background = 0.0;
    let mut max_variance = 0.0;
    let mut optimal_threshold_bin = 0;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count as f64;
        if weight_background == 0.0 {
            continue;
        }

        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0.0 {
            break;
        }

        sum_background += t as f64 * count as f64;

        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_total - sum_background) / weight_foreground;

        // Inter-class variance
        let variance = weight_background * weight_foreground
            * (mean_background - mean_foreground).powi(2);

        if variance > max_variance {
            max_variance = variance;
            optimal_threshold_bin = t;
        }
    }

    min_val + optimal_threshold_bin as f64 * bin_width
}

/// Threshold at the given percentile (0-100) of the intensity distribution.
///
/// Uses linear interpolation between adjacent order statistics, so the
/// result matches `numpy.percentile` on the flattened volume.
pub fn percentile_threshold(data: &[f64], percentile: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut sorted = data.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);

    let rank = (percentile / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Binarize a volume: voxel > threshold becomes foreground.
pub fn binarize(data: &[f64], dims: (usize, usize, usize), threshold: f64) -> BinaryVolume {
    BinaryVolume {
        data: data.iter().map(|&v| u8::from(v > threshold)).collect(),
        dims,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otsu_threshold_bimodal() {
        // Bimodal distribution: one mode in 0..=50, one in 200..=255
        let mut data = Vec::new();
        for i in 0..=50 {
            data.push(i as f64);
        }
        for i in 200..=255 {
            data.push(i as f64);
        }

        let threshold = otsu_threshold(&data, 256);
        assert!(
            threshold > 50.0 && threshold < 200.0,
            "threshold {threshold} should separate the two modes"
        );
    }

    #[test]
    fn test_otsu_threshold_empty() {
        assert_eq!(otsu_threshold(&[], 256), 0.0);
    }

    #[test]
    fn test_otsu_threshold_constant() {
        let data = vec![5.0; 100];
        assert_eq!(otsu_threshold(&data, 256), 5.0);
    }

    #[test]
    fn test_percentile_isolates_hot_fraction() {
        // 1% of voxels at 255, the rest at 0: the 99th percentile must
        // select a cut that isolates exactly the hot voxels.
        let mut data = vec![0.0; 9900];
        data.extend(vec![255.0; 100]);

        let threshold = percentile_threshold(&data, 99.0);
        let above = data.iter().filter(|&&v| v > threshold).count();
        assert_eq!(above, 100, "threshold {threshold} should isolate the top 1%");
    }

    #[test]
    fn test_percentile_interpolates() {
        let data = vec![0.0, 10.0];
        assert!((percentile_threshold(&data, 50.0) - 5.0).abs() < 1e-12);
        assert_eq!(percentile_threshold(&data, 0.0), 0.0);
        assert_eq!(percentile_threshold(&data, 100.0), 10.0);
    }

    #[test]
    fn test_percentile_unsorted_input() {
        let data = vec![9.0, 1.0, 5.0, 3.0, 7.0];
        assert_eq!(percentile_threshold(&data, 50.0), 5.0);
    }

    #[test]
    fn test_compute_threshold_dispatch() {
        let data = vec![0.0, 0.0, 0.0, 10.0];
        let p = compute_threshold(&data, ThresholdType::Percentile, 75.0);
        let o = compute_threshold(&data, ThresholdType::Otsu, 75.0);
        assert!(p > 0.0);
        assert!(o >= 0.0 && o < 10.0);
    }

    #[test]
    fn test_binarize() {
        let data = vec![0.0, 1.0, 2.0, 3.0];
        let binary = binarize(&data, (4, 1, 1), 1.5);
        assert_eq!(binary.data, vec![0, 0, 1, 1]);
        assert_eq!(binary.foreground_count(), 2);
    }

    #[test]
    fn test_binarize_strictly_greater() {
        // Voxels exactly at the threshold stay background
        let data = vec![1.0, 1.0, 2.0];
        let binary = binarize(&data, (3, 1, 1), 1.0);
        assert_eq!(binary.data, vec![0, 0, 1]);
    }
}
