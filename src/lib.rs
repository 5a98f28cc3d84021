//! Injection-Core: injection-site extraction from downsampled brain volumes
//!
//! This crate segments the injection site in a downsampled volumetric scan
//! and reconstructs it as a surface mesh.
//!
//! # Modules
//! - `nifti_io`: NIfTI volume loading and saving
//! - `utils`: reorientation, gaussian smoothing, thresholding
//! - `surface`: marching cubes surface extraction
//! - `mesh`: surface mesh type and OBJ interchange
//! - `components`: largest-connected-component filtering
//! - `analyse`: center of mass, volume, atlas region
//! - `atlas`: annotation-volume region lookup
//! - `registration`: external `reg_resample` subprocess wrapper
//! - `scene`: viewer scene assembly
//! - `extract`: pipeline orchestrator

// Core pipeline stages
pub mod components;
pub mod mesh;
pub mod surface;
pub mod utils;

// Analysis
pub mod analyse;
pub mod atlas;

// I/O and external collaborators
pub mod nifti_io;
pub mod registration;
pub mod scene;

// Orchestration
pub mod config;
pub mod error;
pub mod extract;

pub use analyse::InjectionSiteStats;
pub use config::{Orientation, PipelineConfig, ThresholdType};
pub use error::ExtractError;
pub use extract::Extractor;
pub use mesh::SurfaceMesh;
pub use registration::RegistrationConfig;
