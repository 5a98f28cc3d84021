//! Volume reorientation
//!
//! Brings a scan into the coordinate space of the atlas: first flip the
//! requested axes, then apply the named axis permutation. Both steps are
//! deterministic and applied exactly once per pipeline run.

use crate::config::Orientation;
use crate::nifti_io::Volume;

fn idx3d(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

/// Flip a flattened Fortran-order volume along one axis (0 = x, 1 = y, 2 = z).
pub fn flip_axis(data: &[f64], dims: (usize, usize, usize), axis: usize) -> Vec<f64> {
    let (nx, ny, nz) = dims;
    let mut out = vec![0.0; data.len()];

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let (si, sj, sk) = match axis {
                    0 => (nx - 1 - i, j, k),
                    1 => (i, ny - 1 - j, k),
                    _ => (i, j, nz - 1 - k),
                };
                out[idx3d(i, j, k, nx, ny)] = data[idx3d(si, sj, sk, nx, ny)];
            }
        }
    }

    out
}

/// Permute volume axes in numpy `transpose` convention: output axis `m`
/// takes input axis `perm[m]`.
pub fn transpose(
    data: &[f64],
    dims: (usize, usize, usize),
    perm: [usize; 3],
) -> (Vec<f64>, (usize, usize, usize)) {
    let in_dims = [dims.0, dims.1, dims.2];
    let out_dims = (in_dims[perm[0]], in_dims[perm[1]], in_dims[perm[2]]);
    let (nx, ny, nz) = out_dims;
    let mut out = vec![0.0; data.len()];

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let mut src = [0usize; 3];
                src[perm[0]] = i;
                src[perm[1]] = j;
                src[perm[2]] = k;
                out[idx3d(i, j, k, nx, ny)] =
                    data[idx3d(src[0], src[1], src[2], in_dims[0], in_dims[1])];
            }
        }
    }

    (out, out_dims)
}

/// Reorient a volume to the atlas coordinate space.
///
/// Flips are applied in the order given, then the orientation permutation
/// (coronal: (2,1,0), horizontal: (1,2,0), sagittal: none). Voxel sizes are
/// permuted along with the data.
pub fn reorient_volume(volume: Volume, invert_axes: &[usize], orientation: Orientation) -> Volume {
    let Volume {
        mut data,
        mut dims,
        voxel_size,
        affine,
    } = volume;

    for &axis in invert_axes {
        data = flip_axis(&data, dims, axis);
    }

    let mut vs = [voxel_size.0, voxel_size.1, voxel_size.2];
    if let Some(perm) = orientation.permutation() {
        let (permuted, out_dims) = transpose(&data, dims, perm);
        data = permuted;
        dims = out_dims;
        vs = [vs[perm[0]], vs[perm[1]], vs[perm[2]]];
    }

    Volume {
        data,
        dims,
        voxel_size: (vs[0], vs[1], vs[2]),
        affine,
    }
}
