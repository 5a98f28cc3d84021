//! Pipeline configuration
//!
//! All user-tunable parameters live in [`PipelineConfig`], an immutable
//! value validated once before the pipeline runs. Defaults match the
//! extraction CLI defaults.

use std::str::FromStr;

use crate::error::{ExtractError, Result};

/// Strategy used to pick the binarization threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdType {
    /// Global histogram threshold maximizing inter-class variance.
    Otsu,
    /// Threshold at a given percentile of the smoothed intensity
    /// distribution.
    Percentile,
}

impl FromStr for ThresholdType {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "otsu" => Ok(ThresholdType::Otsu),
            "percentile" => Ok(ThresholdType::Percentile),
            other => Err(ExtractError::UnsupportedThresholdType(other.to_string())),
        }
    }
}

/// Named axis permutation applied after axis inversions to match the
/// atlas coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Input already matches the atlas; no permutation.
    Sagittal,
    /// Axis order (2, 1, 0) relative to the input.
    Coronal,
    /// Axis order (1, 2, 0) relative to the input.
    Horizontal,
}

impl Orientation {
    /// Axis permutation in numpy `transpose` convention: output axis `m`
    /// takes input axis `perm[m]`. `None` for the default orientation.
    pub fn permutation(self) -> Option<[usize; 3]> {
        match self {
            Orientation::Sagittal => None,
            Orientation::Coronal => Some([2, 1, 0]),
            Orientation::Horizontal => Some([1, 2, 0]),
        }
    }
}

impl FromStr for Orientation {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sagittal" => Ok(Orientation::Sagittal),
            "coronal" => Ok(Orientation::Coronal),
            "horizontal" => Ok(Orientation::Horizontal),
            other => Err(ExtractError::InvalidConfig(format!(
                "unknown orientation '{other}' (expected 'sagittal', 'coronal' or 'horizontal')"
            ))),
        }
    }
}

/// User-tunable parameters for one pipeline run.
///
/// Immutable for the duration of the run. `voxel_size` is stored per-axis
/// so it can be taken straight from a NIfTI header, but the pipeline only
/// supports uniform scaling; [`PipelineConfig::validate`] rejects
/// anisotropic values.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-axis gaussian sigma in voxels applied before thresholding.
    pub smoothing_sigma: [f64; 3],
    /// Threshold selection strategy.
    pub threshold_type: ThresholdType,
    /// Percentile in [0, 100], used when `threshold_type` is `Percentile`.
    pub percentile: f64,
    /// Physical voxel size used to scale mesh vertices. Must be uniform.
    pub voxel_size: [f64; 3],
    /// Axes to flip before the orientation permutation.
    pub invert_axes: Vec<usize>,
    /// Axis permutation matching the atlas orientation.
    pub orientation: Orientation,
    /// Re-run the extraction even if the output mesh already exists.
    pub overwrite: bool,
    /// Persist the intermediate binary volume beside the input and force
    /// recomputation like `overwrite`.
    pub debug: bool,
    /// Export a viewer scene artifact after analysis.
    pub render: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            smoothing_sigma: sigma_from_kernel(2.5),
            threshold_type: ThresholdType::Otsu,
            percentile: 99.995,
            voxel_size: [1.0; 3],
            invert_axes: Vec::new(),
            orientation: Orientation::Sagittal,
            overwrite: false,
            debug: false,
            render: false,
        }
    }
}

impl PipelineConfig {
    /// Check the configuration before any work is done.
    pub fn validate(&self) -> Result<()> {
        let [vx, vy, vz] = self.voxel_size;
        if !(vx.is_finite() && vy.is_finite() && vz.is_finite()) || vx <= 0.0 {
            return Err(ExtractError::InvalidConfig(format!(
                "voxel size must be positive and finite, got {:?}",
                self.voxel_size
            )));
        }
        if (vx - vy).abs() > 1e-9 || (vx - vz).abs() > 1e-9 {
            return Err(ExtractError::InvalidConfig(format!(
                "anisotropic voxel size {:?} is not supported; vertices are scaled uniformly",
                self.voxel_size
            )));
        }
        if self.smoothing_sigma.iter().any(|&s| !s.is_finite() || s < 0.0) {
            return Err(ExtractError::InvalidConfig(format!(
                "smoothing sigma must be non-negative, got {:?}",
                self.smoothing_sigma
            )));
        }
        if self.threshold_type == ThresholdType::Percentile
            && !(0.0..=100.0).contains(&self.percentile)
        {
            return Err(ExtractError::InvalidConfig(format!(
                "percentile must be in [0, 100], got {}",
                self.percentile
            )));
        }
        if let Some(&axis) = self.invert_axes.iter().find(|&&a| a > 2) {
            return Err(ExtractError::InvalidConfig(format!(
                "invert axis index {axis} out of range (volume is 3D)"
            )));
        }
        Ok(())
    }

    /// The uniform vertex scaling factor. Only meaningful after
    /// [`PipelineConfig::validate`] has accepted the voxel size.
    pub fn uniform_voxel_size(&self) -> f64 {
        self.voxel_size[0]
    }
}

/// Map the CLI's scalar gaussian kernel to per-axis sigmas.
///
/// The in-plane axes get the user value; the slice axis is fixed at 2
/// voxels, matching how the scans are downsampled more coarsely along z.
pub fn sigma_from_kernel(kernel: f64) -> [f64; 3] {
    [kernel, kernel, 2.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_type_parse() {
        assert_eq!("otsu".parse::<ThresholdType>().unwrap(), ThresholdType::Otsu);
        assert_eq!(
            "percentile".parse::<ThresholdType>().unwrap(),
            ThresholdType::Percentile
        );
    }

    #[test]
    fn test_threshold_type_rejects_unknown() {
        let err = "perc".parse::<ThresholdType>().unwrap_err();
        match err {
            ExtractError::UnsupportedThresholdType(name) => assert_eq!(name, "perc"),
            other => panic!("expected UnsupportedThresholdType, got {other:?}"),
        }
    }

    #[test]
    fn test_orientation_permutations() {
        assert_eq!(Orientation::Sagittal.permutation(), None);
        assert_eq!(Orientation::Coronal.permutation(), Some([2, 1, 0]));
        assert_eq!(Orientation::Horizontal.permutation(), Some([1, 2, 0]));
    }

    #[test]
    fn test_validate_default() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_anisotropic_voxel_size() {
        let config = PipelineConfig {
            voxel_size: [1.0, 1.0, 2.0],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ExtractError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_percentile() {
        let config = PipelineConfig {
            threshold_type: ThresholdType::Percentile,
            percentile: 101.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_axis() {
        let config = PipelineConfig {
            invert_axes: vec![0, 3],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sigma_from_kernel() {
        assert_eq!(sigma_from_kernel(5.0), [5.0, 5.0, 2.0]);
    }
}
