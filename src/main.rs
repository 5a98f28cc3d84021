//! Command-line entry point for injection-site extraction.

use std::path::PathBuf;

use clap::Parser;

use injection_core::config::sigma_from_kernel;
use injection_core::error::{ExtractError, Result};
use injection_core::{Extractor, Orientation, PipelineConfig, RegistrationConfig, ThresholdType};

#[derive(Parser)]
#[command(name = "injection-extract")]
#[command(about = "Extract injection-site surfaces from downsampled brain volumes")]
#[command(version)]
struct Args {
    /// Path to brain volume (.nii / .nii.gz) data.
    datapath: PathBuf,

    /// Path to the registration folder. Enables registration to the atlas
    /// and region lookup.
    registration_folder: Option<PathBuf>,

    /// Path to output .obj file. Defaults to the input path with the
    /// extension swapped.
    #[arg(short = 'o', long)]
    obj_path: Option<PathBuf>,

    /// Size of kernel for gaussian smoothing (x, y directions).
    #[arg(short = 'k', long, default_value_t = 2.5)]
    gaussian_kernel: f64,

    /// Percentile in [0, 100] of pixel intensity values for thresholding.
    #[arg(short = 't', long, default_value_t = 99.995)]
    threshold: f64,

    /// How the threshold value is computed: 'otsu' or 'percentile'.
    #[arg(short = 'T', long, default_value = "otsu")]
    threshold_type: String,

    /// Export a viewer scene artifact next to the mesh.
    #[arg(short = 'r', long)]
    render: bool,

    /// Orientation of the input relative to the atlas: 'sagittal',
    /// 'coronal' or 'horizontal'.
    #[arg(long, default_value = "sagittal")]
    orientation: String,

    /// Comma-separated axis indices to flip before reorientation,
    /// e.g. "0,2".
    #[arg(long)]
    invert_axes: Option<String>,

    /// Physical voxel size used to scale mesh vertices.
    #[arg(long, default_value_t = 1.0)]
    voxel_size: f64,

    /// Re-run the extraction even if the output mesh already exists.
    #[arg(long)]
    overwrite: bool,

    /// Keep the intermediate binary volume for inspection.
    #[arg(long)]
    debug: bool,

    /// Re-run registration even if a transformed volume already exists.
    #[arg(long)]
    force_rerun: bool,

    /// The reg_resample binary to invoke for registration.
    #[arg(long, default_value = "reg_resample")]
    registration_binary: PathBuf,
}

fn parse_invert_axes(raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse()
                .map_err(|_| ExtractError::InvalidConfig(format!("bad axis index '{s}'")))
        })
        .collect()
}

fn run(args: Args) -> Result<()> {
    let threshold_type: ThresholdType = args.threshold_type.parse()?;
    let orientation: Orientation = args.orientation.parse()?;
    let invert_axes = match &args.invert_axes {
        Some(raw) => parse_invert_axes(raw)?,
        None => Vec::new(),
    };

    let config = PipelineConfig {
        smoothing_sigma: sigma_from_kernel(args.gaussian_kernel),
        threshold_type,
        percentile: args.threshold,
        voxel_size: [args.voxel_size; 3],
        invert_axes,
        orientation,
        overwrite: args.overwrite,
        debug: args.debug,
        render: args.render,
    };

    let mut extractor = Extractor::new(&args.datapath, config);
    if let Some(obj_path) = &args.obj_path {
        extractor = extractor.with_obj_path(obj_path);
    }
    if let Some(folder) = &args.registration_folder {
        let mut registration = RegistrationConfig::new(folder);
        registration.program = args.registration_binary.clone();
        registration.force_rerun = args.force_rerun;
        extractor = extractor.with_registration(registration);
    }

    let stats = extractor.run()?;

    println!("center of mass: ({:.2}, {:.2}, {:.2})",
        stats.center_of_mass[0], stats.center_of_mass[1], stats.center_of_mass[2]);
    println!("volume: {:.2}", stats.volume);
    if let Some(region) = &stats.region {
        println!("region: {region}");
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
