//! NIfTI volume I/O
//!
//! Loads downsampled scans (`.nii` / `.nii.gz`, gzip auto-detected) into a
//! flattened Fortran-order volume and writes intermediate volumes back out
//! with a hand-built NIfTI-1 header. Intensity scaling (`scl_slope` /
//! `scl_inter`) is applied on load so the rest of the pipeline only ever
//! sees physical intensities.

use std::io::Cursor;
use std::path::Path;

use flate2::read::GzDecoder;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{ExtractError, Result};

/// A 3D scalar volume in Fortran (column-major) order:
/// `index = x + y*nx + z*nx*ny`, matching the NIfTI convention.
#[derive(Debug, Clone)]
pub struct Volume {
    /// Voxel intensities, length `nx * ny * nz`.
    pub data: Vec<f64>,
    /// Dimensions (nx, ny, nz).
    pub dims: (usize, usize, usize),
    /// Voxel sizes in mm, per axis.
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major).
    pub affine: [f64; 16],
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn nifti_err(path: &Path, reason: impl ToString) -> ExtractError {
    ExtractError::Nifti {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Load a volume from NIfTI bytes.
///
/// 4D inputs are accepted; only the first timepoint is kept.
pub fn load_volume(bytes: &[u8], origin: &Path) -> Result<Volume> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        let decoder = GzDecoder::new(Cursor::new(bytes));
        InMemNiftiObject::from_reader(decoder)
            .map_err(|e| nifti_err(origin, format!("failed to read gzipped NIfTI: {e}")))?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| nifti_err(origin, format!("failed to read NIfTI: {e}")))?
    };

    let header = obj.header();

    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(nifti_err(
            origin,
            format!("expected at least a 3D volume, got {ndim}D"),
        ));
    }

    let pixdim = header.pixdim;
    let voxel_size = (pixdim[1] as f64, pixdim[2] as f64, pixdim[3] as f64);

    let scl_slope = if header.scl_slope == 0.0 {
        1.0
    } else {
        header.scl_slope as f64
    };
    let scl_inter = header.scl_inter as f64;

    let affine = get_affine(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| nifti_err(origin, format!("failed to convert to ndarray: {e}")))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(nifti_err(
            origin,
            format!("expected at least a 3D array, got {}D", shape.len()),
        ));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);

    // Flatten in Fortran order (x varies fastest). 4D arrays contribute
    // only their first timepoint.
    let mut data = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let raw = if shape.len() == 3 {
                    array[[i, j, k]]
                } else {
                    array[[i, j, k, 0]]
                };
                data.push(raw * scl_slope + scl_inter);
            }
        }
    }

    Ok(Volume {
        data,
        dims: (nx, ny, nz),
        voxel_size,
        affine,
    })
}

/// Read a NIfTI volume from a filesystem path (`.nii` or `.nii.gz`).
pub fn read_volume_file(path: &Path) -> Result<Volume> {
    let bytes = std::fs::read(path)?;
    load_volume(&bytes, path)
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        // Fall back to identity with voxel scaling
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Serialize a volume as uncompressed NIfTI-1 bytes (FLOAT32 data).
pub fn save_volume(volume: &Volume) -> Result<Vec<u8>> {
    use std::io::Write;

    let (nx, ny, nz) = volume.dims;
    let (vsx, vsy, vsz) = volume.voxel_size;

    // NIfTI-1 header (348 bytes)
    let mut header = [0u8; 348];

    // sizeof_hdr = 348
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    // dim[0..7]
    let dim: [i16; 8] = [3, nx as i16, ny as i16, nz as i16, 1, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32), bitpix = 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    // pixdim[0..7]
    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4 byte extension marker)
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());

    // scl_slope = 1.0, scl_inter = 0.0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    for row in 0..3 {
        for col in 0..4 {
            let offset = 280 + row * 16 + col * 4;
            let value = volume.affine[row * 4 + col] as f32;
            header[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(352 + volume.data.len() * 4);
    buffer.write_all(&header)?;
    // Extension marker (4 bytes, all zeros = no extension)
    buffer.write_all(&[0u8; 4])?;
    for &val in &volume.data {
        buffer.write_all(&(val as f32).to_le_bytes())?;
    }

    Ok(buffer)
}

/// Save a volume to a file.
///
/// If the path ends with `.nii.gz` the output is gzip compressed,
/// otherwise uncompressed `.nii`.
pub fn save_volume_to_file(path: &Path, volume: &Volume) -> Result<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let uncompressed = save_volume(volume)?;
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&uncompressed)?;
        encoder.finish()?
    } else {
        uncompressed
    };

    std::fs::write(path, &bytes)?;
    Ok(())
}
