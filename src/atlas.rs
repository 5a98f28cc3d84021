//! Atlas region lookup
//!
//! Resolves a point in atlas space to a named brain region using two files
//! from the registration folder: the registered annotation volume (one
//! label id per voxel) and a structures JSON mapping label ids to acronyms
//! (the Allen structures format; unknown fields are ignored).

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ExtractError, Result};
use crate::nifti_io::{read_volume_file, Volume};

const ANNOTATION_FILE: &str = "registered_atlas.nii";
const STRUCTURES_FILE: &str = "structures.json";

#[derive(Debug, Deserialize)]
struct StructureRecord {
    id: u32,
    acronym: String,
}

/// Registered annotation volume plus the id-to-acronym table.
pub struct AtlasRegions {
    annotation: Volume,
    structures: HashMap<u32, String>,
}

impl AtlasRegions {
    /// Load from explicit annotation / structures paths.
    pub fn load(annotation_path: &Path, structures_path: &Path) -> Result<Self> {
        let annotation = read_volume_file(annotation_path)?;

        let reader = BufReader::new(File::open(structures_path)?);
        let records: Vec<StructureRecord> =
            serde_json::from_reader(reader).map_err(|e| ExtractError::Atlas {
                path: structures_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(AtlasRegions {
            annotation,
            structures: records.into_iter().map(|r| (r.id, r.acronym)).collect(),
        })
    }

    /// Load the conventional `registered_atlas.nii` / `structures.json`
    /// pair from a registration folder.
    pub fn from_registration_folder(folder: &Path) -> Result<Self> {
        Self::load(&folder.join(ANNOTATION_FILE), &folder.join(STRUCTURES_FILE))
    }

    /// Acronym of the region containing a point, or `None` when the point
    /// falls outside the volume or on an unannotated voxel.
    pub fn region_at(&self, point: [f64; 3]) -> Option<String> {
        let (nx, ny, nz) = self.annotation.dims;
        let (vsx, vsy, vsz) = self.annotation.voxel_size;

        let i = (point[0] / vsx).floor();
        let j = (point[1] / vsy).floor();
        let k = (point[2] / vsz).floor();
        if i < 0.0 || j < 0.0 || k < 0.0 {
            return None;
        }
        let (i, j, k) = (i as usize, j as usize, k as usize);
        if i >= nx || j >= ny || k >= nz {
            return None;
        }

        let label = self.annotation.data[i + j * nx + k * nx * ny].round();
        if label <= 0.0 {
            return None;
        }
        self.structures.get(&(label as u32)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_atlas() -> AtlasRegions {
        // 4x4x4 annotation: label 7 fills x<2, label 9 fills x>=2
        let (nx, ny, nz) = (4, 4, 4);
        let mut data = vec![0.0; nx * ny * nz];
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data[i + j * nx + k * nx * ny] = if i < 2 { 7.0 } else { 9.0 };
                }
            }
        }
        AtlasRegions {
            annotation: Volume {
                data,
                dims: (nx, ny, nz),
                voxel_size: (1.0, 1.0, 1.0),
                affine: [
                    1.0, 0.0, 0.0, 0.0,
                    0.0, 1.0, 0.0, 0.0,
                    0.0, 0.0, 1.0, 0.0,
                    0.0, 0.0, 0.0, 1.0,
                ],
            },
            structures: HashMap::from([(7, "SCm".to_string()), (9, "PAG".to_string())]),
        }
    }

    #[test]
    fn test_region_lookup() {
        let atlas = test_atlas();
        assert_eq!(atlas.region_at([0.5, 1.0, 1.0]).as_deref(), Some("SCm"));
        assert_eq!(atlas.region_at([3.5, 1.0, 1.0]).as_deref(), Some("PAG"));
    }

    #[test]
    fn test_region_lookup_out_of_bounds() {
        let atlas = test_atlas();
        assert_eq!(atlas.region_at([-1.0, 0.0, 0.0]), None);
        assert_eq!(atlas.region_at([10.0, 0.0, 0.0]), None);
    }

    #[test]
    fn test_region_lookup_respects_voxel_size() {
        let mut atlas = test_atlas();
        atlas.annotation.voxel_size = (25.0, 25.0, 25.0);
        // 60mm / 25mm = voxel 2 along x, in the label-9 half
        assert_eq!(atlas.region_at([60.0, 10.0, 10.0]).as_deref(), Some("PAG"));
    }

    #[test]
    fn test_unknown_label_is_none() {
        let mut atlas = test_atlas();
        atlas.structures.remove(&7);
        assert_eq!(atlas.region_at([0.5, 1.0, 1.0]), None);
    }

    #[test]
    fn test_structures_parse_ignores_extra_fields() {
        let json = r#"[{"id": 3, "acronym": "MOs", "name": "Secondary motor area", "rgb": [31, 157, 90]}]"#;
        let tmpdir = std::env::temp_dir();
        let structures_path = tmpdir.join("injection_core_structures.json");
        std::fs::write(&structures_path, json).unwrap();

        // Pair it with a tiny annotation volume
        let annotation_path = tmpdir.join("injection_core_annotation.nii");
        let volume = Volume {
            data: vec![3.0; 8],
            dims: (2, 2, 2),
            voxel_size: (1.0, 1.0, 1.0),
            affine: [
                1.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
                0.0, 0.0, 1.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ],
        };
        crate::nifti_io::save_volume_to_file(&annotation_path, &volume).unwrap();

        let atlas = AtlasRegions::load(&annotation_path, &structures_path).unwrap();
        assert_eq!(atlas.region_at([0.5, 0.5, 0.5]).as_deref(), Some("MOs"));

        std::fs::remove_file(&structures_path).ok();
        std::fs::remove_file(&annotation_path).ok();
    }
}
