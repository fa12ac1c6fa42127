//! End-to-end runs of the detection pipeline against the synthetic stage
//! set: clean completion, precondition failures, and determinism.

use std::fs;
use std::path::{Path, PathBuf};

use vidgraph_cli::pipeline::detection_plan;
use vidgraph_core::{
    BatchingConfig, LoopOutcome, PipelineConfig, PipelineError, StageRegistry,
};

fn registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    vidgraph_sim::register_builtin(&mut registry);
    registry
}

fn fixture_config(dir: &Path, output_name: &str) -> PipelineConfig {
    let input_video = dir.join("palace.mp4");
    // Deterministic synthetic container: 16 KiB of patterned bytes, which
    // the default 4096-byte blocksize turns into four access units.
    let payload: Vec<u8> = (0..16 * 1024).map(|i| (i % 251) as u8).collect();
    fs::write(&input_video, payload).unwrap();

    let infer_config = dir.join("config_infer.txt");
    fs::write(
        &infer_config,
        "[property]\nnum-detected-classes=80\npre-cluster-threshold=0.4\n",
    )
    .unwrap();

    let tracker_config = dir.join("tracker.yml");
    fs::write(&tracker_config, "maxShadowTrackingAge: 30\n").unwrap();

    PipelineConfig {
        input_video,
        output_file: dir.join(output_name),
        infer_config,
        tracker_config,
        batching: BatchingConfig {
            width: 640,
            height: 384,
            batch_size: 2,
            timeout_ms: 40,
        },
        encoder: Default::default(),
    }
}

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

#[tokio::test]
async fn full_run_reaches_eos_and_writes_the_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path(), "out.mkv");

    let report = vidgraph_core::run_pipeline(&registry(), detection_plan(&config), never())
        .await
        .unwrap();

    assert_eq!(report.outcome, LoopOutcome::Completed);
    // The batcher slot was acquired once and released once.
    assert_eq!(report.released_ports, 1);

    let written = fs::read(&config.output_file).unwrap();
    assert!(!written.is_empty(), "output container must not be empty");
}

#[tokio::test]
async fn missing_input_fails_before_any_stage_exists() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fixture_config(dir.path(), "out.mkv");
    config.input_video = PathBuf::from("/nonexistent/palace.mp4");

    let err = vidgraph_core::run_pipeline(&registry(), detection_plan(&config), never())
        .await
        .unwrap_err();
    match err {
        PipelineError::PreconditionFailed { path } => {
            assert_eq!(path, PathBuf::from("/nonexistent/palace.mp4"));
        }
        other => panic!("expected PreconditionFailed, got {other}"),
    }
    assert!(!config.output_file.exists());
}

#[tokio::test]
async fn unreadable_stage_config_aborts_construction() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fixture_config(dir.path(), "out.mkv");
    fs::remove_file(&config.tracker_config).unwrap();

    let err = vidgraph_core::run_pipeline(&registry(), detection_plan(&config), never())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PreconditionFailed { .. }));

    // Restore the tracker config but point the detector at a directory: it
    // survives the existence check and fails at construction instead.
    fs::write(&config.tracker_config, "").unwrap();
    config.infer_config = dir.path().to_path_buf();
    let err = vidgraph_core::run_pipeline(&registry(), detection_plan(&config), never())
        .await
        .unwrap_err();
    match err {
        PipelineError::StageConstructionFailed { name, .. } => assert_eq!(name, "detector"),
        other => panic!("expected StageConstructionFailed, got {other}"),
    }
}

#[test]
fn check_builds_the_graph_without_running_it() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture_config(dir.path(), "out.mkv");

    let report = vidgraph_core::check_pipeline(&registry(), detection_plan(&config)).unwrap();
    assert_eq!(report.stages, 13);
    assert!(report.warnings.is_empty());
    // Build-only: nothing was activated, so nothing was written.
    assert!(!config.output_file.exists());
}

#[tokio::test]
async fn identical_inputs_produce_identical_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let first = fixture_config(dir.path(), "first.mkv");
    let report = vidgraph_core::run_pipeline(&registry(), detection_plan(&first), never())
        .await
        .unwrap();
    assert_eq!(report.outcome, LoopOutcome::Completed);

    let second = fixture_config(dir.path(), "second.mkv");
    let report = vidgraph_core::run_pipeline(&registry(), detection_plan(&second), never())
        .await
        .unwrap();
    assert_eq!(report.outcome, LoopOutcome::Completed);

    let a = fs::read(&first.output_file).unwrap();
    let b = fs::read(&second.output_file).unwrap();
    assert_eq!(a, b, "same input must yield the same output");
}
