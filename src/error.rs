//! Error taxonomy for the extraction pipeline.
//!
//! Every stage returns [`ExtractError`]; any failure aborts the remaining
//! pipeline. There is no retry policy and no checkpointing beyond the
//! output-file existence check in the orchestrator.

use std::path::PathBuf;

/// Errors surfaced by the extraction pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// Requested threshold strategy is not one of `otsu` / `percentile`.
    #[error("unsupported threshold type '{0}' (expected 'otsu' or 'percentile')")]
    UnsupportedThresholdType(String),

    /// Configuration rejected before any work was done.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The registration subprocess exited non-zero or could not be run.
    /// Carries the subprocess stderr where available.
    #[error("registration failed: {0}")]
    Registration(String),

    /// A NIfTI volume could not be read or decoded.
    #[error("failed to load NIfTI volume '{path}': {reason}")]
    Nifti { path: PathBuf, reason: String },

    /// Atlas lookup data (annotation volume or structures table) could not
    /// be loaded.
    #[error("failed to load atlas data '{path}': {reason}")]
    Atlas { path: PathBuf, reason: String },

    /// A serialized mesh violates the OBJ interchange format or the
    /// parallel vertex/normal invariant.
    #[error("malformed mesh file '{path}': {reason}")]
    MeshFormat { path: PathBuf, reason: String },

    /// Marching cubes produced no triangles. Usually means the threshold
    /// left no foreground voxels.
    #[error("surface extraction produced no geometry (threshold too high?)")]
    EmptyMesh,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
