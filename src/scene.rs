//! Viewer scene assembly
//!
//! Interactive rendering is delegated to external viewers; this module
//! only assembles an explicit [`Scene`] value (no ambient viewer state)
//! and exports it as a multi-object OBJ + MTL artifact that any 3D viewer
//! can open. The pipeline adds the filtered injection-site mesh and a
//! sphere marking its center of mass.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::mesh::SurfaceMesh;

/// A named mesh with display attributes.
pub struct Actor {
    pub name: String,
    pub mesh: SurfaceMesh,
    /// RGB in [0, 1].
    pub color: [f64; 3],
    /// Opacity in [0, 1].
    pub alpha: f64,
}

/// An explicit collection of actors to hand to an external viewer.
#[derive(Default)]
pub struct Scene {
    actors: Vec<Actor>,
}

impl Scene {
    pub fn new() -> Self {
        Scene::default()
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    /// Add an in-memory mesh to the scene.
    pub fn add_mesh(&mut self, name: impl Into<String>, mesh: SurfaceMesh, color: [f64; 3], alpha: f64) {
        self.actors.push(Actor {
            name: sanitize(&name.into()),
            mesh,
            color,
            alpha,
        });
    }

    /// Load a serialized mesh and add it to the scene.
    pub fn add_obj_file(&mut self, path: &Path, color: [f64; 3], alpha: f64) -> Result<()> {
        let mesh = SurfaceMesh::load_obj(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mesh".to_string());
        self.add_mesh(name, mesh, color, alpha);
        Ok(())
    }

    /// Add a sphere marker, e.g. at an injection site's center of mass.
    pub fn add_sphere_at_point(&mut self, name: impl Into<String>, center: [f64; 3], radius: f64, color: [f64; 3]) {
        self.add_mesh(name, icosphere(center, radius, 2), color, 1.0);
    }

    /// Export the scene as `<path>` (OBJ) plus a sibling `.mtl` with one
    /// material per actor.
    pub fn export(&self, obj_path: &Path) -> Result<()> {
        let mtl_path = obj_path.with_extension("mtl");

        let mut mtl = BufWriter::new(File::create(&mtl_path)?);
        for actor in &self.actors {
            writeln!(mtl, "newmtl {}", actor.name)?;
            writeln!(mtl, "Kd {} {} {}", actor.color[0], actor.color[1], actor.color[2])?;
            writeln!(mtl, "d {}", actor.alpha)?;
            writeln!(mtl)?;
        }
        mtl.flush()?;

        let mut out = BufWriter::new(File::create(obj_path)?);
        if let Some(mtl_name) = mtl_path.file_name() {
            writeln!(out, "mtllib {}", mtl_name.to_string_lossy())?;
        }

        // OBJ vertex indices are global across the file
        let mut offset = 0usize;
        for actor in &self.actors {
            writeln!(out, "o {}", actor.name)?;
            writeln!(out, "usemtl {}", actor.name)?;
            for v in &actor.mesh.vertices {
                writeln!(out, "v {} {} {}", v[0], v[1], v[2])?;
            }
            for n in &actor.mesh.normals {
                writeln!(out, "vn {} {} {}", n[0], n[1], n[2])?;
            }
            for f in &actor.mesh.faces {
                let (a, b, c) = (f[0] + offset, f[1] + offset, f[2] + offset);
                writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}")?;
            }
            offset += actor.mesh.vertices.len();
        }
        out.flush()?;
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Icosphere mesh: subdivided icosahedron projected onto a sphere.
/// Normals are radial; faces are 1-based.
pub fn icosphere(center: [f64; 3], radius: f64, subdivisions: usize) -> SurfaceMesh {
    let t = (1.0 + 5.0f64.sqrt()) / 2.0;

    let mut vertices: Vec<[f64; 3]> = vec![
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ];
    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for v in vertices.iter_mut() {
        *v = normalize(*v);
    }

    for _ in 0..subdivisions {
        let mut midpoint_cache: HashMap<(usize, usize), usize> = HashMap::new();
        let mut next_faces = Vec::with_capacity(faces.len() * 4);

        for &[a, b, c] in &faces {
            let ab = midpoint(&mut vertices, &mut midpoint_cache, a, b);
            let bc = midpoint(&mut vertices, &mut midpoint_cache, b, c);
            let ca = midpoint(&mut vertices, &mut midpoint_cache, c, a);
            next_faces.push([a, ab, ca]);
            next_faces.push([b, bc, ab]);
            next_faces.push([c, ca, bc]);
            next_faces.push([ab, bc, ca]);
        }
        faces = next_faces;
    }

    let normals: Vec<[f64; 3]> = vertices.clone();
    let vertices = vertices
        .into_iter()
        .map(|v| {
            [
                center[0] + v[0] * radius,
                center[1] + v[1] * radius,
                center[2] + v[2] * radius,
            ]
        })
        .collect();

    SurfaceMesh {
        vertices,
        normals,
        faces: faces.iter().map(|f| [f[0] + 1, f[1] + 1, f[2] + 1]).collect(),
    }
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    [v[0] / len, v[1] / len, v[2] / len]
}

fn midpoint(
    vertices: &mut Vec<[f64; 3]>,
    cache: &mut HashMap<(usize, usize), usize>,
    a: usize,
    b: usize,
) -> usize {
    let key = (a.min(b), a.max(b));
    if let Some(&idx) = cache.get(&key) {
        return idx;
    }
    let (va, vb) = (vertices[a], vertices[b]);
    let mid = normalize([
        (va[0] + vb[0]) / 2.0,
        (va[1] + vb[1]) / 2.0,
        (va[2] + vb[2]) / 2.0,
    ]);
    vertices.push(mid);
    let idx = vertices.len() - 1;
    cache.insert(key, idx);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyse::{center_of_mass, mesh_volume};
    use std::path::Path;

    #[test]
    fn test_icosphere_geometry() {
        let sphere = icosphere([0.0, 0.0, 0.0], 1.0, 2);

        // 20 * 4^2 faces after two subdivisions
        assert_eq!(sphere.faces.len(), 320);
        assert_eq!(sphere.normals.len(), sphere.vertices.len());

        for v in &sphere.vertices {
            let r = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            assert!((r - 1.0).abs() < 1e-12, "vertex should lie on the sphere, r={r}");
        }

        // Volume approaches 4/3 pi as subdivision increases
        let volume = mesh_volume(&sphere);
        let exact = 4.0 / 3.0 * std::f64::consts::PI;
        assert!(
            (volume - exact).abs() / exact < 0.05,
            "volume {volume} too far from {exact}"
        );
    }

    #[test]
    fn test_icosphere_centered() {
        let sphere = icosphere([10.0, -5.0, 2.0], 3.0, 1);
        let com = center_of_mass(&sphere);
        assert!((com[0] - 10.0).abs() < 1e-9);
        assert!((com[1] + 5.0).abs() < 1e-9);
        assert!((com[2] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_icosphere_valid_mesh() {
        let sphere = icosphere([0.0, 0.0, 0.0], 1.0, 1);
        assert!(sphere.validate(Path::new("icosphere")).is_ok());
    }

    #[test]
    fn test_scene_export() {
        let mut scene = Scene::new();
        scene.add_mesh(
            "injection site",
            icosphere([0.0, 0.0, 0.0], 1.0, 0),
            [0.94, 0.5, 0.5],
            0.5,
        );
        scene.add_sphere_at_point("com", [0.0, 0.0, 0.0], 0.1, [1.0, 1.0, 1.0]);

        let dir = tempfile::tempdir().unwrap();
        let obj_path = dir.path().join("scene.obj");
        scene.export(&obj_path).unwrap();

        let obj = std::fs::read_to_string(&obj_path).unwrap();
        assert!(obj.starts_with("mtllib scene.mtl"));
        assert!(obj.contains("o injection_site"));
        assert!(obj.contains("o com"));
        assert!(obj.contains("usemtl com"));

        let mtl = std::fs::read_to_string(dir.path().join("scene.mtl")).unwrap();
        assert!(mtl.contains("newmtl injection_site"));
        assert!(mtl.contains("Kd 0.94 0.5 0.5"));
        assert!(mtl.contains("d 0.5"));
    }

    #[test]
    fn test_scene_face_indices_are_offset() {
        let mut scene = Scene::new();
        let first = icosphere([0.0, 0.0, 0.0], 1.0, 0);
        let n_first = first.vertices.len();
        scene.add_mesh("a", first, [1.0, 0.0, 0.0], 1.0);
        scene.add_mesh("b", icosphere([5.0, 0.0, 0.0], 1.0, 0), [0.0, 1.0, 0.0], 1.0);

        let dir = tempfile::tempdir().unwrap();
        let obj_path = dir.path().join("two.obj");
        scene.export(&obj_path).unwrap();

        let obj = std::fs::read_to_string(&obj_path).unwrap();
        let max_index = obj
            .lines()
            .filter(|l| l.starts_with("f "))
            .flat_map(|l| l.split_whitespace().skip(1))
            .map(|token| token.split('/').next().unwrap().parse::<usize>().unwrap())
            .max()
            .unwrap();
        assert_eq!(max_index, n_first * 2, "second actor's faces must be offset");
    }
}
