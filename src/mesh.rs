//! Surface mesh representation and OBJ interchange
//!
//! The mesh is the canonical interchange format between pipeline stages:
//! all `v` lines, then all `vn` lines, then all `f i//i j//j k//k` lines
//! with 1-based indices (the normal index always equals the vertex index).
//! Vertex and normal sequences are parallel and equal length; every face
//! index must reference a valid vertex.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{ExtractError, Result};

/// Triangle mesh with per-vertex normals and 1-based face indices.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMesh {
    /// Vertex positions.
    pub vertices: Vec<[f64; 3]>,
    /// Per-vertex normals, parallel to `vertices`.
    pub normals: Vec<[f64; 3]>,
    /// Triangles as 1-based vertex indices.
    pub faces: Vec<[usize; 3]>,
}

impl SurfaceMesh {
    /// Check the structural invariants: parallel vertex/normal arrays and
    /// face indices within `[1, vertices.len()]`.
    pub fn validate(&self, origin: &Path) -> Result<()> {
        if self.normals.len() != self.vertices.len() {
            return Err(mesh_err(
                origin,
                format!(
                    "{} vertices but {} normals",
                    self.vertices.len(),
                    self.normals.len()
                ),
            ));
        }
        let n = self.vertices.len();
        for (f, face) in self.faces.iter().enumerate() {
            for &idx in face {
                if idx < 1 || idx > n {
                    return Err(mesh_err(
                        origin,
                        format!("face {f} references vertex {idx}, valid range is 1..={n}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Scale every vertex coordinate by a uniform factor (atlas spacing).
    pub fn scale_vertices(&mut self, factor: f64) {
        for v in self.vertices.iter_mut() {
            v[0] *= factor;
            v[1] *= factor;
            v[2] *= factor;
        }
    }

    /// Invert the orientation of every normal in place.
    pub fn flip_normals(&mut self) {
        for n in self.normals.iter_mut() {
            n[0] = -n[0];
            n[1] = -n[1];
            n[2] = -n[2];
        }
    }

    /// Serialize to the OBJ interchange format. Line order is significant:
    /// vertices, then normals, then faces.
    pub fn save_obj(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for v in &self.vertices {
            writeln!(out, "v {} {} {}", v[0], v[1], v[2])?;
        }
        for n in &self.normals {
            writeln!(out, "vn {} {} {}", n[0], n[1], n[2])?;
        }
        for f in &self.faces {
            writeln!(out, "f {}//{} {}//{} {}//{}", f[0], f[0], f[1], f[1], f[2], f[2])?;
        }
        out.flush()?;
        Ok(())
    }

    /// Parse a mesh from the OBJ interchange format and validate it.
    pub fn load_obj(path: &Path) -> Result<SurfaceMesh> {
        let reader = BufReader::new(File::open(path)?);

        let mut vertices = Vec::new();
        let mut normals = Vec::new();
        let mut faces = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => vertices.push(parse_triple(path, lineno, tokens)?),
                Some("vn") => normals.push(parse_triple(path, lineno, tokens)?),
                Some("f") => {
                    let mut face = [0usize; 3];
                    for slot in face.iter_mut() {
                        let token = tokens.next().ok_or_else(|| {
                            mesh_err(path, format!("line {}: face with fewer than 3 indices", lineno + 1))
                        })?;
                        // "i//i" or "i/..." or bare "i": the vertex index is
                        // the first field
                        let index = token.split('/').next().unwrap_or(token);
                        *slot = index.parse().map_err(|_| {
                            mesh_err(path, format!("line {}: bad face index '{token}'", lineno + 1))
                        })?;
                    }
                    faces.push(face);
                }
                // Object names, materials and other directives are ignored
                _ => {}
            }
        }

        let mesh = SurfaceMesh {
            vertices,
            normals,
            faces,
        };
        mesh.validate(path)?;
        Ok(mesh)
    }
}

fn mesh_err(path: &Path, reason: String) -> ExtractError {
    ExtractError::MeshFormat {
        path: path.to_path_buf(),
        reason,
    }
}

fn parse_triple<'a>(
    path: &Path,
    lineno: usize,
    mut tokens: impl Iterator<Item = &'a str>,
) -> Result<[f64; 3]> {
    let mut out = [0.0; 3];
    for slot in out.iter_mut() {
        let token = tokens
            .next()
            .ok_or_else(|| mesh_err(path, format!("line {}: expected 3 coordinates", lineno + 1)))?;
        *slot = token
            .parse()
            .map_err(|_| mesh_err(path, format!("line {}: bad coordinate '{token}'", lineno + 1)))?;
    }
    Ok(out)
}

/// Compute outward-accumulated per-vertex normals from face geometry.
///
/// Faces are 0-based here; callers converting to the OBJ convention add 1
/// afterwards. Each face normal is accumulated at its three vertices and
/// the result renormalized, so larger faces contribute more.
pub fn compute_vertex_normals(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> Vec<[f64; 3]> {
    let mut normals: Vec<[f64; 3]> = vec![[0.0, 0.0, 0.0]; vertices.len()];

    for &[i0, i1, i2] in faces {
        let v0 = vertices[i0];
        let v1 = vertices[i1];
        let v2 = vertices[i2];

        let e1 = [v1[0] - v0[0], v1[1] - v0[1], v1[2] - v0[2]];
        let e2 = [v2[0] - v0[0], v2[1] - v0[1], v2[2] - v0[2]];

        // Face normal (cross product)
        let face_normal = [
            e1[1] * e2[2] - e1[2] * e2[1],
            e1[2] * e2[0] - e1[0] * e2[2],
            e1[0] * e2[1] - e1[1] * e2[0],
        ];

        let norm = (face_normal[0].powi(2) + face_normal[1].powi(2) + face_normal[2].powi(2)).sqrt();
        let face_normal = if norm > 1e-10 {
            [face_normal[0] / norm, face_normal[1] / norm, face_normal[2] / norm]
        } else {
            // Degenerate face, contributes nothing
            [0.0, 0.0, 0.0]
        };

        for &idx in &[i0, i1, i2] {
            normals[idx][0] += face_normal[0];
            normals[idx][1] += face_normal[1];
            normals[idx][2] += face_normal[2];
        }
    }

    for n in normals.iter_mut() {
        let norm = (n[0].powi(2) + n[1].powi(2) + n[2].powi(2)).sqrt();
        if norm > 1e-10 {
            n[0] /= norm;
            n[1] /= norm;
            n[2] /= norm;
        }
    }

    normals
}
