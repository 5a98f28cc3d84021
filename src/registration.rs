//! Atlas registration via the external `reg_resample` binary
//!
//! Registration itself is delegated to NiftyReg; this module only builds
//! the command line, runs it as a blocking subprocess, and interprets the
//! exit status. There is no timeout and no cancellation: the call runs to
//! completion or failure before the pipeline proceeds. stdout and stderr
//! are redirected to fixed log files in the registration folder.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{ExtractError, Result};

const TRANSFORMED_FILE: &str = "transformed.nii";
const CONTROL_POINT_FILE: &str = "control_point_file.nii";
const DESTINATION_FILE: &str = "destination.nii";
const LOG_FILE: &str = "registrationlog.txt";
const ERROR_FILE: &str = "registrationerr.txt";

/// How to run the registration step.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// The `reg_resample` binary (name resolved via PATH, or a full path).
    pub program: PathBuf,
    /// Folder holding the control point file and destination image;
    /// outputs and logs are written here too.
    pub registration_folder: PathBuf,
    /// Re-run registration even if a transformed volume already exists.
    pub force_rerun: bool,
}

impl RegistrationConfig {
    pub fn new(registration_folder: impl Into<PathBuf>) -> Self {
        RegistrationConfig {
            program: PathBuf::from("reg_resample"),
            registration_folder: registration_folder.into(),
            force_rerun: false,
        }
    }
}

/// Build the resample invocation:
/// `<binary> -cpp <control_point_file> -flo <floating> -ref <destination> -res <output>`
pub fn registration_command(
    program: &Path,
    control_point_file: &Path,
    floating_image: &Path,
    destination_image: &Path,
    output_file: &Path,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg("-cpp")
        .arg(control_point_file)
        .arg("-flo")
        .arg(floating_image)
        .arg("-ref")
        .arg(destination_image)
        .arg("-res")
        .arg(output_file);
    cmd
}

/// Register the input volume to the atlas, returning the path of the
/// transformed volume.
///
/// If `transformed.nii` already exists in the registration folder and
/// `force_rerun` is false, the existing file is reused and the subprocess
/// is not invoked.
pub fn get_registered_image(datapath: &Path, config: &RegistrationConfig) -> Result<PathBuf> {
    let folder = &config.registration_folder;
    let transformed = folder.join(TRANSFORMED_FILE);

    if transformed.is_file() && !config.force_rerun {
        log::info!(
            "transformed volume {} already exists, skipping registration",
            transformed.display()
        );
        return Ok(transformed);
    }

    let log_path = folder.join(LOG_FILE);
    let err_path = folder.join(ERROR_FILE);

    let mut cmd = registration_command(
        &config.program,
        &folder.join(CONTROL_POINT_FILE),
        datapath,
        &folder.join(DESTINATION_FILE),
        &transformed,
    );
    cmd.stdout(Stdio::from(File::create(&log_path)?));
    cmd.stderr(Stdio::from(File::create(&err_path)?));

    log::info!("running ROI registration: {cmd:?}");
    let status = cmd.status().map_err(|e| {
        ExtractError::Registration(format!(
            "could not run '{}': {e}",
            config.program.display()
        ))
    })?;

    if !status.success() {
        let stderr = std::fs::read_to_string(&err_path).unwrap_or_default();
        return Err(ExtractError::Registration(format!(
            "'{}' exited with {status}; {}",
            config.program.display(),
            if stderr.trim().is_empty() {
                format!("see {}", err_path.display())
            } else {
                stderr.trim().to_string()
            }
        )));
    }

    Ok(transformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_template() {
        let cmd = registration_command(
            Path::new("reg_resample"),
            Path::new("/reg/control_point_file.nii"),
            Path::new("/data/downsampled.nii"),
            Path::new("/reg/destination.nii"),
            Path::new("/reg/transformed.nii"),
        );
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-cpp",
                "/reg/control_point_file.nii",
                "-flo",
                "/data/downsampled.nii",
                "-ref",
                "/reg/destination.nii",
                "-res",
                "/reg/transformed.nii",
            ]
        );
        assert_eq!(cmd.get_program(), "reg_resample");
    }

    #[test]
    fn test_skip_when_transformed_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TRANSFORMED_FILE), b"stale").unwrap();

        let mut config = RegistrationConfig::new(dir.path());
        // Program that would fail if it were invoked
        config.program = PathBuf::from("false");

        let out = get_registered_image(Path::new("input.nii"), &config).unwrap();
        assert_eq!(out, dir.path().join(TRANSFORMED_FILE));
    }

    #[test]
    fn test_force_rerun_invokes_program() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TRANSFORMED_FILE), b"stale").unwrap();

        let mut config = RegistrationConfig::new(dir.path());
        config.program = PathBuf::from("true");
        config.force_rerun = true;

        // `true` exits zero, so the run succeeds and logs are created
        let out = get_registered_image(Path::new("input.nii"), &config).unwrap();
        assert_eq!(out, dir.path().join(TRANSFORMED_FILE));
        assert!(dir.path().join(LOG_FILE).is_file());
        assert!(dir.path().join(ERROR_FILE).is_file());
    }

    #[test]
    fn test_nonzero_exit_is_registration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RegistrationConfig::new(dir.path());
        config.program = PathBuf::from("false");

        let err = get_registered_image(Path::new("input.nii"), &config).unwrap_err();
        assert!(matches!(err, ExtractError::Registration(_)));
    }

    #[test]
    fn test_missing_binary_is_registration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RegistrationConfig::new(dir.path());
        config.program = PathBuf::from("/nonexistent/reg_resample_xyz");

        let err = get_registered_image(Path::new("input.nii"), &config).unwrap_err();
        match err {
            ExtractError::Registration(msg) => {
                assert!(msg.contains("could not run"), "unexpected message: {msg}")
            }
            other => panic!("expected Registration error, got {other:?}"),
        }
    }
}
