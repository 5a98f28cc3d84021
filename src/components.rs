//! Largest-connected-component filtering
//!
//! Marching cubes on a noisy scan usually produces one large injection-site
//! shell plus satellite debris. This pass keeps only the largest connected
//! component of the face graph (faces connected through shared vertices),
//! flips every normal to correct the winding convention expected by the
//! viewer, and overwrites the mesh file in place. Destructive: callers that
//! need the unfiltered mesh must retain a copy first.

use std::path::Path;

use crate::error::{ExtractError, Result};
use crate::mesh::SurfaceMesh;

/// Union-find over vertex indices with path halving.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Reduce a mesh to its largest connected component.
///
/// Components are maximal face sets reachable through shared vertices; the
/// winner has the most faces, with ties broken by vertex count. Vertices
/// not referenced by any face never win and are dropped. Surviving
/// vertices keep their relative order, so repeated filtering is stable.
pub fn largest_component(mesh: &SurfaceMesh) -> Result<SurfaceMesh> {
    if mesh.faces.is_empty() {
        return Err(ExtractError::EmptyMesh);
    }

    let n = mesh.vertices.len();
    let mut sets = DisjointSet::new(n);
    for face in &mesh.faces {
        // 1-based face indices
        sets.union(face[0] - 1, face[1] - 1);
        sets.union(face[1] - 1, face[2] - 1);
    }

    let mut face_count = vec![0usize; n];
    for face in &mesh.faces {
        face_count[sets.find(face[0] - 1)] += 1;
    }
    let mut vertex_count = vec![0usize; n];
    for v in 0..n {
        vertex_count[sets.find(v)] += 1;
    }

    let mut winner = 0;
    for root in 0..n {
        let better = face_count[root] > face_count[winner]
            || (face_count[root] == face_count[winner]
                && vertex_count[root] > vertex_count[winner]);
        if better {
            winner = root;
        }
    }

    // Compact the surviving vertices, preserving order
    let mut remap = vec![usize::MAX; n];
    let mut vertices = Vec::new();
    let mut normals = Vec::new();
    for v in 0..n {
        if sets.find(v) == winner {
            remap[v] = vertices.len();
            vertices.push(mesh.vertices[v]);
            normals.push(mesh.normals[v]);
        }
    }

    let faces = mesh
        .faces
        .iter()
        .filter(|face| sets.find(face[0] - 1) == winner)
        .map(|face| {
            [
                remap[face[0] - 1] + 1,
                remap[face[1] - 1] + 1,
                remap[face[2] - 1] + 1,
            ]
        })
        .collect();

    Ok(SurfaceMesh {
        vertices,
        normals,
        faces,
    })
}

/// Load a serialized mesh, keep only its largest connected component, flip
/// all normals, and overwrite the file in place.
pub fn filter_largest_component(path: &Path) -> Result<()> {
    let mesh = SurfaceMesh::load_obj(path)?;
    let mut filtered = largest_component(&mesh)?;
    filtered.flip_normals();
    filtered.save_obj(path)?;
    log::debug!(
        "component filter kept {} of {} faces in {}",
        filtered.faces.len(),
        mesh.faces.len(),
        path.display()
    );
    Ok(())
}
