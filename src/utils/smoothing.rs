//! 3D gaussian smoothing
//!
//! Separable gaussian filter used to suppress noise before the injection
//! site is thresholded. Kernel support is truncated at 3 sigma; borders are
//! renormalized by the in-bounds kernel weight so edge voxels are not
//! darkened.

fn idx3d(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

/// Separable 3D gaussian smoothing with per-axis sigma (in voxels).
///
/// A sigma of 0 skips filtering along that axis.
///
/// # Arguments
/// * `data` - Input volume (nx * ny * nz, Fortran order)
/// * `sigma` - Smoothing sigma in voxels [sx, sy, sz]
/// * `nx`, `ny`, `nz` - Dimensions
///
/// # Returns
/// Smoothed volume, same shape as the input
pub fn gaussian_smooth_3d(
    data: &[f64],
    sigma: [f64; 3],
    nx: usize,
    ny: usize,
    nz: usize,
) -> Vec<f64> {
    let n_total = nx * ny * nz;
    let mut result = data.to_vec();
    let mut temp = vec![0.0; n_total];

    // X direction
    if sigma[0] > 0.0 {
        let kernel = make_gaussian_kernel(sigma[0]);
        let half = kernel.len() / 2;

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let mut sum = 0.0;
                    let mut weight_sum = 0.0;

                    for (ki, &kv) in kernel.iter().enumerate() {
                        let ii = i as isize + ki as isize - half as isize;
                        if ii >= 0 && ii < nx as isize {
                            sum += result[idx3d(ii as usize, j, k, nx, ny)] * kv;
                            weight_sum += kv;
                        }
                    }

                    temp[idx3d(i, j, k, nx, ny)] = sum / weight_sum;
                }
            }
        }
        std::mem::swap(&mut result, &mut temp);
    }

    // Y direction
    if sigma[1] > 0.0 {
        let kernel = make_gaussian_kernel(sigma[1]);
        let half = kernel.len() / 2;

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let mut sum = 0.0;
                    let mut weight_sum = 0.0;

                    for (ki, &kv) in kernel.iter().enumerate() {
                        let jj = j as isize + ki as isize - half as isize;
                        if jj >= 0 && jj < ny as isize {
                            sum += result[idx3d(i, jj as usize, k, nx, ny)] * kv;
                            weight_sum += kv;
                        }
                    }

                    temp[idx3d(i, j, k, nx, ny)] = sum / weight_sum;
                }
            }
        }
        std::mem::swap(&mut result, &mut temp);
    }

    // Z direction
    if sigma[2] > 0.0 {
        let kernel = make_gaussian_kernel(sigma[2]);
        let half = kernel.len() / 2;

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let mut sum = 0.0;
                    let mut weight_sum = 0.0;

                    for (ki, &kv) in kernel.iter().enumerate() {
                        let kk = k as isize + ki as isize - half as isize;
                        if kk >= 0 && kk < nz as isize {
                            sum += result[idx3d(i, j, kk as usize, nx, ny)] * kv;
                            weight_sum += kv;
                        }
                    }

                    temp[idx3d(i, j, k, nx, ny)] = sum / weight_sum;
                }
            }
        }
        std::mem::swap(&mut result, &mut temp);
    }

    result
}

/// Create 1D gaussian kernel truncated at 3 sigma
fn make_gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil() as usize;
    let size = 2 * radius + 1;
    let mut kernel = vec![0.0; size];

    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut sum = 0.0;

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f64 - radius as f64;
        *k = (-x * x / two_sigma_sq).exp();
        sum += *k;
    }

    for k in kernel.iter_mut() {
        *k /= sum;
    }

    kernel
}
