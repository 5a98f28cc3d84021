//! Preprocessing utilities: reorientation, smoothing, thresholding.

pub mod reorient;
pub mod smoothing;
pub mod threshold;

pub use reorient::{flip_axis, reorient_volume, transpose};
pub use smoothing::gaussian_smooth_3d;
pub use threshold::{
    binarize, compute_threshold, otsu_threshold, percentile_threshold, BinaryVolume,
};
