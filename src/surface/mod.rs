//! Marching cubes surface extraction
//!
//! Converts the binarized volume into a triangulated isosurface at level 0
//! with a step size of one voxel. Vertices falling on the same lattice edge
//! are shared between neighboring cells, so the resulting face graph is
//! connected through vertex indices and component filtering can operate on
//! it directly. Faces are emitted 1-based for the OBJ interchange format.

mod tables;

use std::collections::HashMap;

use crate::error::{ExtractError, Result};
use crate::mesh::{compute_vertex_normals, SurfaceMesh};
use crate::utils::threshold::BinaryVolume;

use tables::{CORNER_OFFSETS, EDGE_CORNERS, TRI_TABLE};

fn idx3d(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

/// Run marching cubes over a scalar field.
///
/// Returns vertices and 0-based triangle indices. A corner is inside the
/// surface when its value is strictly greater than `iso`, matching the
/// binarization rule upstream.
pub fn marching_cubes(
    data: &[f64],
    dims: (usize, usize, usize),
    iso: f64,
) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let (nx, ny, nz) = dims;
    let mut vertices: Vec<[f64; 3]> = Vec::new();
    let mut faces: Vec<[usize; 3]> = Vec::new();
    // Lattice edge -> vertex index, keyed by the edge's two grid corners
    let mut edge_cache: HashMap<([usize; 3], [usize; 3]), usize> = HashMap::new();

    if nx < 2 || ny < 2 || nz < 2 {
        return (vertices, faces);
    }

    for cz in 0..nz - 1 {
        for cy in 0..ny - 1 {
            for cx in 0..nx - 1 {
                let mut corner_pos = [[0usize; 3]; 8];
                let mut corner_val = [0.0f64; 8];
                let mut cube_index = 0usize;

                for (c, offset) in CORNER_OFFSETS.iter().enumerate() {
                    let pos = [cx + offset[0], cy + offset[1], cz + offset[2]];
                    let val = data[idx3d(pos[0], pos[1], pos[2], nx, ny)];
                    corner_pos[c] = pos;
                    corner_val[c] = val;
                    if val > iso {
                        cube_index |= 1 << c;
                    }
                }

                let tris = &TRI_TABLE[cube_index];
                let mut t = 0;
                while tris[t] >= 0 {
                    let mut face = [0usize; 3];
                    for (slot, &edge) in face.iter_mut().zip(&tris[t..t + 3]) {
                        let edge = edge as usize;
                        let [ca, cb] = EDGE_CORNERS[edge];
                        let (pa, pb) = (corner_pos[ca], corner_pos[cb]);
                        let key = if pa <= pb { (pa, pb) } else { (pb, pa) };

                        *slot = *edge_cache.entry(key).or_insert_with(|| {
                            let (va, vb) = (corner_val[ca], corner_val[cb]);
                            let frac = if (vb - va).abs() < 1e-12 {
                                0.5
                            } else {
                                ((iso - va) / (vb - va)).clamp(0.0, 1.0)
                            };
                            vertices.push([
                                pa[0] as f64 + frac * (pb[0] as f64 - pa[0] as f64),
                                pa[1] as f64 + frac * (pb[1] as f64 - pa[1] as f64),
                                pa[2] as f64 + frac * (pb[2] as f64 - pa[2] as f64),
                            ]);
                            vertices.len() - 1
                        });
                    }
                    faces.push(face);
                    t += 3;
                }
            }
        }
    }

    (vertices, faces)
}

/// Extract the injection-site surface from a binarized volume.
///
/// Runs marching cubes at level 0, computes per-vertex normals, scales
/// vertices to the physical voxel spacing when it is not 1, and converts
/// faces to 1-based indices.
pub fn extract_surface(binary: &BinaryVolume, voxel_size: f64) -> Result<SurfaceMesh> {
    let field: Vec<f64> = binary.data.iter().map(|&v| f64::from(v)).collect();
    let (vertices, faces) = marching_cubes(&field, binary.dims, 0.0);

    if faces.is_empty() {
        return Err(ExtractError::EmptyMesh);
    }

    let normals = compute_vertex_normals(&vertices, &faces);

    let mut mesh = SurfaceMesh {
        vertices,
        normals,
        faces: faces.iter().map(|f| [f[0] + 1, f[1] + 1, f[2] + 1]).collect(),
    };

    if voxel_size != 1.0 {
        mesh.scale_vertices(voxel_size);
    }

    Ok(mesh)
}
