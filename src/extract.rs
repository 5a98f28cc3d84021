//! Pipeline orchestrator
//!
//! Runs the stages in order: optional registration, reorientation,
//! smoothing, thresholding, surface extraction, component filtering,
//! analysis, optional scene export. Each stage is a pure transformation of
//! the previous stage's output; the only state across invocations is the
//! presence of output files on disk.
//!
//! The skip policy is file-existence only: if the target mesh exists and
//! neither overwrite nor debug is set, extraction is skipped and the
//! statistics are computed from the existing file. The cache key is the
//! output path, not the input or configuration, so a mesh produced with
//! different parameters is silently reused unless overwrite is forced.
//! Two concurrent runs targeting the same output path race on the
//! filesystem; there is no locking.

use std::path::{Path, PathBuf};

use crate::analyse::{analyse, InjectionSiteStats};
use crate::atlas::AtlasRegions;
use crate::components::filter_largest_component;
use crate::config::{Orientation, PipelineConfig};
use crate::error::Result;
use crate::mesh::SurfaceMesh;
use crate::nifti_io::{read_volume_file, save_volume_to_file, Volume};
use crate::registration::{get_registered_image, RegistrationConfig};
use crate::scene::Scene;
use crate::surface::extract_surface;
use crate::utils::reorient::reorient_volume;
use crate::utils::smoothing::gaussian_smooth_3d;
use crate::utils::threshold::{binarize, compute_threshold};

const MESH_COLOR: [f64; 3] = [0.94, 0.5, 0.5]; // lightcoral
const COM_COLOR: [f64; 3] = [0.98, 0.98, 0.82];

/// One injection-site extraction run.
pub struct Extractor {
    datapath: PathBuf,
    obj_path: PathBuf,
    config: PipelineConfig,
    registration: Option<RegistrationConfig>,
}

impl Extractor {
    /// Extraction run with the mesh written beside the input volume
    /// (extension swapped to `.obj`).
    pub fn new(datapath: impl Into<PathBuf>, config: PipelineConfig) -> Self {
        let datapath = datapath.into();
        let obj_path = default_obj_path(&datapath);
        Extractor {
            datapath,
            obj_path,
            config,
            registration: None,
        }
    }

    /// Override the output mesh path.
    pub fn with_obj_path(mut self, obj_path: impl Into<PathBuf>) -> Self {
        self.obj_path = obj_path.into();
        self
    }

    /// Enable the registration step (and atlas-region lookup against the
    /// registration folder).
    pub fn with_registration(mut self, registration: RegistrationConfig) -> Self {
        self.registration = Some(registration);
        self
    }

    /// Target mesh path for this run.
    pub fn obj_path(&self) -> &Path {
        &self.obj_path
    }

    /// Run the pipeline and return the injection-site statistics.
    pub fn run(&self) -> Result<InjectionSiteStats> {
        self.config.validate()?;

        if self.obj_path.is_file() && !self.config.overwrite && !self.config.debug {
            log::info!(
                "output file {} already exists, skipping injection site extraction",
                self.obj_path.display()
            );
        } else {
            self.build_mesh()?;
        }

        // Region lookup needs the registered annotation volume; run
        // without it when the registration folder cannot provide one.
        let atlas = self.registration.as_ref().and_then(|reg| {
            match AtlasRegions::from_registration_folder(&reg.registration_folder) {
                Ok(atlas) => Some(atlas),
                Err(e) => {
                    log::warn!("atlas region lookup unavailable: {e}");
                    None
                }
            }
        });

        let stats = analyse(&self.obj_path, atlas.as_ref())?;
        log::info!(
            "injection site: center of mass ({:.1}, {:.1}, {:.1}), volume {:.1}{}",
            stats.center_of_mass[0],
            stats.center_of_mass[1],
            stats.center_of_mass[2],
            stats.volume,
            stats
                .region
                .as_deref()
                .map(|r| format!(", region {r}"))
                .unwrap_or_default()
        );

        if self.config.render {
            // Scene export is best-effort and never fails the pipeline
            if let Err(e) = self.export_scene(&stats) {
                log::warn!("scene export failed: {e}");
            }
        }

        Ok(stats)
    }

    fn build_mesh(&self) -> Result<()> {
        let input = match &self.registration {
            Some(reg) => get_registered_image(&self.datapath, reg)?,
            None => self.datapath.clone(),
        };

        log::info!("ready to extract injection site from {}", input.display());
        let volume = read_volume_file(&input)?;

        let reoriented = !self.config.invert_axes.is_empty()
            || self.config.orientation != Orientation::Sagittal;
        let volume = reorient_volume(volume, &self.config.invert_axes, self.config.orientation);
        let (nx, ny, nz) = volume.dims;

        log::info!("data loaded ({nx}x{ny}x{nz}), starting gaussian filtering");
        let smoothed = gaussian_smooth_3d(&volume.data, self.config.smoothing_sigma, nx, ny, nz);

        let threshold = compute_threshold(
            &smoothed,
            self.config.threshold_type,
            self.config.percentile,
        );
        let binary = binarize(&smoothed, volume.dims, threshold);
        log::info!(
            "filtering completed, threshold {:.4} keeps {} voxels",
            threshold,
            binary.foreground_count()
        );

        if self.config.debug {
            self.save_debug_volume(&binary.data, &volume, reoriented)?;
        }

        log::info!("extracting surface from thresholded image");
        let mesh = extract_surface(&binary, self.config.uniform_voxel_size())?;
        mesh.save_obj(&self.obj_path)?;
        filter_largest_component(&self.obj_path)?;
        Ok(())
    }

    /// Persist the binary volume beside the input, with a suffix recording
    /// whether the coordinate transform was applied.
    fn save_debug_volume(&self, binary: &[u8], volume: &Volume, reoriented: bool) -> Result<()> {
        let suffix = if reoriented { "reoriented" } else { "raw" };
        let path = self
            .obj_path
            .with_file_name(format!("{}_binary_{}.nii", file_stem(&self.datapath), suffix));
        let debug_volume = Volume {
            data: binary.iter().map(|&v| f64::from(v)).collect(),
            dims: volume.dims,
            voxel_size: volume.voxel_size,
            affine: volume.affine,
        };
        save_volume_to_file(&path, &debug_volume)?;
        log::debug!("wrote binary volume to {}", path.display());
        Ok(())
    }

    fn export_scene(&self, stats: &InjectionSiteStats) -> Result<()> {
        let mesh = SurfaceMesh::load_obj(&self.obj_path)?;
        let mut scene = Scene::new();
        scene.add_mesh(file_stem(&self.obj_path), mesh, MESH_COLOR, 0.5);
        scene.add_sphere_at_point(
            "center_of_mass",
            stats.center_of_mass,
            (stats.volume.cbrt() * 0.25).max(1.0),
            COM_COLOR,
        );

        let scene_path = self
            .obj_path
            .with_file_name(format!("{}_scene.obj", file_stem(&self.obj_path)));
        scene.export(&scene_path)?;
        log::info!("scene written to {}", scene_path.display());
        Ok(())
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// Default output path: the input path with `.nii` / `.nii.gz` swapped
/// for `.obj`.
pub fn default_obj_path(datapath: &Path) -> PathBuf {
    let name = datapath
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or_else(|| name.split('.').next().unwrap_or(&name));
    datapath.with_file_name(format!("{stem}.obj"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_obj_path() {
        assert_eq!(
            default_obj_path(Path::new("/data/downsampled.nii")),
            PathBuf::from("/data/downsampled.obj")
        );
        assert_eq!(
            default_obj_path(Path::new("/data/downsampled.nii.gz")),
            PathBuf::from("/data/downsampled.obj")
        );
    }

    #[test]
    fn test_skip_policy_uses_existing_mesh() {
        // With the output present and overwrite/debug off, the input
        // volume is never read: a nonexistent datapath must still succeed.
        let dir = tempfile::tempdir().unwrap();
        let obj_path = dir.path().join("downsampled.obj");
        let mesh = SurfaceMesh {
            vertices: vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            faces: vec![[1, 2, 3]],
        };
        mesh.save_obj(&obj_path).unwrap();

        let extractor = Extractor::new(
            dir.path().join("downsampled.nii"),
            PipelineConfig::default(),
        );
        let stats = extractor.run().unwrap();

        let expected_com = [2.0 / 3.0, 2.0 / 3.0, 0.0];
        for d in 0..3 {
            assert!((stats.center_of_mass[d] - expected_com[d]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_input_without_cache_fails() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(
            dir.path().join("missing.nii"),
            PipelineConfig::default(),
        );
        assert!(extractor.run().is_err());
    }

    #[test]
    fn test_invalid_config_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            voxel_size: [1.0, 2.0, 3.0],
            ..Default::default()
        };
        let extractor = Extractor::new(dir.path().join("missing.nii"), config);
        assert!(matches!(
            extractor.run(),
            Err(crate::error::ExtractError::InvalidConfig(_))
        ));
    }
}
