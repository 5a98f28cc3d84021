//! Geometric analysis of the extracted injection site
//!
//! Computes simple statistics from the filtered mesh: center of mass
//! (arithmetic mean of vertex positions), enclosed volume (divergence
//! theorem over the closed surface), and optionally the atlas region
//! containing the center of mass. Never mutates the mesh.

use std::path::Path;

use crate::atlas::AtlasRegions;
use crate::error::Result;
use crate::mesh::SurfaceMesh;

/// Statistics for one extracted injection site.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionSiteStats {
    /// Mean of the vertex positions, in the mesh coordinate space.
    pub center_of_mass: [f64; 3],
    /// Enclosed volume of the closed mesh, in cubic mesh units.
    pub volume: f64,
    /// Acronym of the atlas region containing the center of mass, when an
    /// atlas was available and the point fell inside an annotated region.
    pub region: Option<String>,
}

/// Arithmetic mean of the vertex positions.
pub fn center_of_mass(mesh: &SurfaceMesh) -> [f64; 3] {
    let mut com = [0.0; 3];
    if mesh.vertices.is_empty() {
        return com;
    }
    for v in &mesh.vertices {
        com[0] += v[0];
        com[1] += v[1];
        com[2] += v[2];
    }
    let n = mesh.vertices.len() as f64;
    [com[0] / n, com[1] / n, com[2] / n]
}

/// Enclosed volume of a closed mesh via the divergence theorem.
///
/// Sums signed tetrahedron volumes against the origin; the absolute value
/// makes the result independent of winding, so it is stable across the
/// normal flip applied by component filtering.
pub fn mesh_volume(mesh: &SurfaceMesh) -> f64 {
    let mut six_volume = 0.0;
    for face in &mesh.faces {
        let a = mesh.vertices[face[0] - 1];
        let b = mesh.vertices[face[1] - 1];
        let c = mesh.vertices[face[2] - 1];

        // a . (b x c)
        six_volume += a[0] * (b[1] * c[2] - b[2] * c[1])
            + a[1] * (b[2] * c[0] - b[0] * c[2])
            + a[2] * (b[0] * c[1] - b[1] * c[0]);
    }
    (six_volume / 6.0).abs()
}

/// Load a serialized mesh and compute its statistics.
///
/// `atlas` is optional; without one the region field stays `None`.
pub fn analyse(obj_path: &Path, atlas: Option<&AtlasRegions>) -> Result<InjectionSiteStats> {
    let mesh = SurfaceMesh::load_obj(obj_path)?;
    Ok(analyse_mesh(&mesh, atlas))
}

/// Compute statistics for an in-memory mesh.
pub fn analyse_mesh(mesh: &SurfaceMesh, atlas: Option<&AtlasRegions>) -> InjectionSiteStats {
    let com = center_of_mass(mesh);
    InjectionSiteStats {
        center_of_mass: com,
        volume: mesh_volume(mesh),
        region: atlas.and_then(|a| a.region_at(com)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit cube (12 triangles) with corner at the origin.
    fn unit_cube() -> SurfaceMesh {
        let vertices = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        let faces = vec![
            // bottom (z=0)
            [1, 3, 2],
            [1, 4, 3],
            // top (z=1)
            [5, 6, 7],
            [5, 7, 8],
            // front (y=0)
            [1, 2, 6],
            [1, 6, 5],
            // back (y=1)
            [3, 4, 8],
            [3, 8, 7],
            // left (x=0)
            [1, 5, 8],
            [1, 8, 4],
            // right (x=1)
            [2, 3, 7],
            [2, 7, 6],
        ];
        let normals = vec![[0.0, 0.0, 1.0]; 8];
        SurfaceMesh {
            vertices,
            normals,
            faces,
        }
    }

    #[test]
    fn test_center_of_mass_cube() {
        let com = center_of_mass(&unit_cube());
        for d in 0..3 {
            assert!((com[d] - 0.5).abs() < 1e-12, "expected 0.5, got {}", com[d]);
        }
    }

    #[test]
    fn test_volume_cube() {
        let volume = mesh_volume(&unit_cube());
        assert!((volume - 1.0).abs() < 1e-12, "unit cube volume should be 1, got {volume}");
    }

    #[test]
    fn test_volume_invariant_under_winding_flip() {
        let mut cube = unit_cube();
        let original = mesh_volume(&cube);
        for face in cube.faces.iter_mut() {
            face.swap(1, 2);
        }
        assert!((mesh_volume(&cube) - original).abs() < 1e-12);
    }

    #[test]
    fn test_volume_scales_cubically() {
        let mut cube = unit_cube();
        cube.scale_vertices(3.0);
        assert!((mesh_volume(&cube) - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_analyse_file_without_atlas() {
        let cube = unit_cube();
        let tmp = std::env::temp_dir().join("injection_core_analyse_cube.obj");
        cube.save_obj(&tmp).unwrap();

        let stats = analyse(&tmp, None).unwrap();
        assert!((stats.volume - 1.0).abs() < 1e-9);
        assert_eq!(stats.region, None);

        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn test_empty_mesh_stats() {
        let mesh = SurfaceMesh {
            vertices: vec![],
            normals: vec![],
            faces: vec![],
        };
        let stats = analyse_mesh(&mesh, None);
        assert_eq!(stats.center_of_mass, [0.0, 0.0, 0.0]);
        assert_eq!(stats.volume, 0.0);
    }
}
