//! End-to-end pipeline tests on synthetic volumes.

mod common;

use std::path::Path;

use injection_core::config::{PipelineConfig, ThresholdType};
use injection_core::mesh::SurfaceMesh;
use injection_core::nifti_io::{read_volume_file, save_volume_to_file};
use injection_core::registration::RegistrationConfig;
use injection_core::Extractor;

use common::{sphere_volume, structures_json, uniform_annotation};

fn percentile_config() -> PipelineConfig {
    PipelineConfig {
        smoothing_sigma: [1.0, 1.0, 1.0],
        threshold_type: ThresholdType::Percentile,
        percentile: 98.0,
        ..Default::default()
    }
}

/// Write the standard synthetic scan and return its path.
fn write_scan(dir: &Path) -> std::path::PathBuf {
    let datapath = dir.join("downsampled.nii");
    let volume = sphere_volume(24, 24, 24, [12.0, 12.0, 12.0], 4.0, 255.0);
    save_volume_to_file(&datapath, &volume).unwrap();
    datapath
}

#[test]
fn extracts_sphere_with_percentile_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let datapath = write_scan(dir.path());

    let extractor = Extractor::new(&datapath, percentile_config());
    let stats = extractor.run().unwrap();

    let obj_path = dir.path().join("downsampled.obj");
    assert!(obj_path.is_file(), "mesh should be written next to the input");

    // The mesh survives load and validation: all faces within
    // [1, |vertices|], normals parallel to vertices
    let mesh = SurfaceMesh::load_obj(&obj_path).unwrap();
    assert!(!mesh.faces.is_empty());

    assert!(stats.volume > 10.0, "volume {} too small", stats.volume);
    assert!(stats.volume < 24.0 * 24.0 * 24.0);
    for d in 0..3 {
        assert!(
            (stats.center_of_mass[d] - 12.0).abs() < 3.0,
            "center of mass {:?} should be near the sphere center",
            stats.center_of_mass
        );
    }
    assert_eq!(stats.region, None, "no atlas available in this run");
}

#[test]
fn extracts_sphere_with_otsu_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let datapath = write_scan(dir.path());

    let config = PipelineConfig {
        smoothing_sigma: [1.0, 1.0, 1.0],
        threshold_type: ThresholdType::Otsu,
        ..Default::default()
    };
    let stats = Extractor::new(&datapath, config).run().unwrap();

    assert!(stats.volume > 10.0);
    for d in 0..3 {
        assert!((stats.center_of_mass[d] - 12.0).abs() < 3.0);
    }
}

#[test]
fn rerun_with_overwrite_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let datapath = write_scan(dir.path());
    let obj_path = dir.path().join("downsampled.obj");

    let config = PipelineConfig {
        overwrite: true,
        ..percentile_config()
    };

    Extractor::new(&datapath, config.clone()).run().unwrap();
    let first = std::fs::read(&obj_path).unwrap();

    Extractor::new(&datapath, config).run().unwrap();
    let second = std::fs::read(&obj_path).unwrap();

    assert_eq!(first, second, "identical input and config must reproduce the mesh");
}

#[test]
fn existing_mesh_is_reused_even_when_stale() {
    let dir = tempfile::tempdir().unwrap();
    let datapath = write_scan(dir.path());
    let obj_path = dir.path().join("downsampled.obj");

    // Plant a mesh that the input volume could never produce. The cache
    // key is the output path only, so the run must reuse it as-is.
    let planted = SurfaceMesh {
        vertices: vec![[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [0.0, 3.0, 0.0]],
        normals: vec![[0.0, 0.0, 1.0]; 3],
        faces: vec![[1, 2, 3]],
    };
    planted.save_obj(&obj_path).unwrap();
    let planted_bytes = std::fs::read(&obj_path).unwrap();

    let stats = Extractor::new(&datapath, percentile_config()).run().unwrap();

    assert_eq!(
        std::fs::read(&obj_path).unwrap(),
        planted_bytes,
        "skip policy must not touch the existing file"
    );
    let expected_com = [1.0, 1.0, 0.0];
    for d in 0..3 {
        assert!((stats.center_of_mass[d] - expected_com[d]).abs() < 1e-9);
    }
}

#[test]
fn overwrite_replaces_stale_mesh() {
    let dir = tempfile::tempdir().unwrap();
    let datapath = write_scan(dir.path());
    let obj_path = dir.path().join("downsampled.obj");

    std::fs::write(&obj_path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nvn 0 0 1\nvn 0 0 1\nf 1//1 2//2 3//3\n").unwrap();

    let config = PipelineConfig {
        overwrite: true,
        ..percentile_config()
    };
    let stats = Extractor::new(&datapath, config).run().unwrap();
    assert!(stats.volume > 10.0, "stale mesh should have been recomputed");
}

#[test]
fn debug_mode_persists_binary_volume() {
    let dir = tempfile::tempdir().unwrap();
    let datapath = write_scan(dir.path());

    let config = PipelineConfig {
        debug: true,
        ..percentile_config()
    };
    Extractor::new(&datapath, config).run().unwrap();

    let debug_path = dir.path().join("downsampled_binary_raw.nii");
    assert!(debug_path.is_file(), "debug artifact missing");

    let binary = read_volume_file(&debug_path).unwrap();
    assert_eq!(binary.dims, (24, 24, 24));
    assert!(binary.data.iter().all(|&v| v == 0.0 || v == 1.0));
    assert!(binary.data.iter().any(|&v| v == 1.0));
}

#[test]
fn render_exports_scene_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let datapath = write_scan(dir.path());

    let config = PipelineConfig {
        render: true,
        ..percentile_config()
    };
    Extractor::new(&datapath, config).run().unwrap();

    let scene_path = dir.path().join("downsampled_scene.obj");
    assert!(scene_path.is_file(), "scene artifact missing");
    let scene = std::fs::read_to_string(&scene_path).unwrap();
    assert!(scene.contains("o downsampled"));
    assert!(scene.contains("o center_of_mass"));
    assert!(dir.path().join("downsampled_scene.mtl").is_file());
}

#[test]
fn registered_volume_is_used_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let reg_folder = dir.path().join("registration");
    std::fs::create_dir(&reg_folder).unwrap();

    // An existing transformed volume short-circuits the subprocess call,
    // so no reg_resample binary is needed
    let transformed = sphere_volume(24, 24, 24, [12.0, 12.0, 12.0], 4.0, 255.0);
    save_volume_to_file(&reg_folder.join("transformed.nii"), &transformed).unwrap();

    // Atlas files for the region lookup
    save_volume_to_file(
        &reg_folder.join("registered_atlas.nii"),
        &uniform_annotation(24, 24, 24, 5),
    )
    .unwrap();
    std::fs::write(reg_folder.join("structures.json"), structures_json(5, "VTA")).unwrap();

    // The raw datapath does not exist; only the registered volume does
    let extractor = Extractor::new(dir.path().join("downsampled.nii"), percentile_config())
        .with_obj_path(dir.path().join("injection.obj"))
        .with_registration(RegistrationConfig::new(&reg_folder));
    let stats = extractor.run().unwrap();

    assert!(stats.volume > 10.0);
    assert_eq!(stats.region.as_deref(), Some("VTA"));
}

#[test]
fn registration_failure_aborts_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let reg_folder = dir.path().join("registration");
    std::fs::create_dir(&reg_folder).unwrap();

    let mut registration = RegistrationConfig::new(&reg_folder);
    registration.program = "false".into();

    let result = Extractor::new(dir.path().join("downsampled.nii"), percentile_config())
        .with_registration(registration)
        .run();
    assert!(result.is_err());
}
