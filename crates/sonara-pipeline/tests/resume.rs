//! End-to-end extraction runs against temporary checkpoint directories.

#![allow(clippy::unwrap_used)]

use image::{Rgb, RgbImage};
use sonara_core::{Error, FeatureVector, ItemCollection, LoadOptions};
use sonara_extract::{ExtractorSpec, MockFactory};
use sonara_pipeline::{ExtractionConfig, ExtractionOrchestrator, Phase};
use sonara_pipeline_state::{CheckpointIdentity, CheckpointStore, RowOutcome, read_status};
use tempfile::TempDir;

fn collection(ids: &[&str]) -> ItemCollection {
    let mut csv = String::from("id,name,image_path\n");
    for id in ids {
        csv.push_str(&format!("{id},Song {id},covers/{id}.jpg\n"));
    }
    ItemCollection::from_reader(csv.as_bytes(), &LoadOptions::default()).unwrap()
}

fn config(dir: &TempDir) -> ExtractionConfig {
    ExtractionConfig::new(dir.path().join("checkpoints"))
        .with_status_path(dir.path().join("status.csv"))
        .with_workers(2)
        .with_interval(2)
}

const FIVE: [&str; 5] = ["a", "b", "c", "d", "e"];

#[test]
fn test_full_run_records_every_row() {
    let dir = TempDir::new().unwrap();
    let items = collection(&FIVE);
    let factory = MockFactory::new(3);

    let report = ExtractionOrchestrator::new(&items, &factory, config(&dir))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.dispatched, 5);
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.batches.len(), 3);
    assert_eq!(report.batches[2].start, 4);
    assert_eq!(report.batches[2].end, 5);
    assert!(report.complete);
    assert!(report.resumed_from.is_none());
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let items = collection(&FIVE);
    let factory = MockFactory::new(3);

    let mut first = ExtractionOrchestrator::new(&items, &factory, config(&dir)).unwrap();
    first.run().unwrap();
    let checkpoint_path = first.checkpoint_path();
    let before = std::fs::read(&checkpoint_path).unwrap();
    let calls = factory.calls();

    let report = ExtractionOrchestrator::new(&items, &factory, config(&dir))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.dispatched, 0);
    assert_eq!(factory.calls(), calls);
    assert_eq!(report.resumed_from, Some(5));
    assert!(report.complete);
    assert_eq!(std::fs::read(&checkpoint_path).unwrap(), before);
}

#[test]
fn test_interrupted_run_resumes_at_next_batch() {
    let dir = TempDir::new().unwrap();
    let items = collection(&FIVE);
    let factory = MockFactory::new(3);

    let report = ExtractionOrchestrator::new(&items, &factory, config(&dir).with_max_batches(1))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(report.batches.len(), 1);
    assert!(!report.complete);

    let mut orchestrator = ExtractionOrchestrator::new(&items, &factory, config(&dir)).unwrap();
    orchestrator.load_checkpoint().unwrap();
    let record = orchestrator.checkpoint().unwrap().record();
    assert!(record.is_extracted(0) && record.is_extracted(1));
    assert!(record.get(2).is_none());
    assert_eq!(orchestrator.compute_resume().unwrap(), 2);

    let report = orchestrator.run().unwrap();
    assert_eq!(report.resumed_from, Some(2));
    assert_eq!(report.dispatched, 3);
    assert!(report.complete);
    assert_eq!(orchestrator.phase(), Phase::Done);
}

#[test]
fn test_resume_after_highest_seen_row() {
    let dir = TempDir::new().unwrap();
    let items = collection(&FIVE);
    let factory = MockFactory::new(2);
    let identity = CheckpointIdentity::new("mock", "mock");

    let mut store = CheckpointStore::open(&dir.path().join("checkpoints"), &identity);
    store
        .merge((0..3).map(|row| {
            let id = FIVE[row];
            RowOutcome::extracted(row, id, FeatureVector::new(vec![row as f32, 1.0]).unwrap())
        }))
        .unwrap();
    store.persist().unwrap();

    let report = ExtractionOrchestrator::new(&items, &factory, config(&dir))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.resumed_from, Some(3));
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.batches[0].start, 3);
}

#[test]
fn test_shrunk_collection_is_fatal() {
    let dir = TempDir::new().unwrap();
    let factory = MockFactory::new(2);

    ExtractionOrchestrator::new(&collection(&FIVE), &factory, config(&dir))
        .unwrap()
        .run()
        .unwrap();

    let smaller = collection(&["a", "b", "c"]);
    let err = ExtractionOrchestrator::new(&smaller, &factory, config(&dir))
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, Error::ResumeInconsistency(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_missing_image_column_is_config_error() {
    let dir = TempDir::new().unwrap();
    let items = collection(&FIVE);
    let factory = MockFactory::new(2);

    let err = ExtractionOrchestrator::new(&items, &factory, config(&dir).with_image_column("img"))
        .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_failures_and_crashes_are_absent() {
    let dir = TempDir::new().unwrap();
    let items = collection(&FIVE);
    let factory = MockFactory::new(2).failing("b").panicking("d");

    let mut orchestrator = ExtractionOrchestrator::new(&items, &factory, config(&dir)).unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.crashed, 1);
    assert!(report.complete);

    let record = orchestrator.checkpoint().unwrap().record();
    assert!(!record.is_extracted(1));
    assert!(!record.is_extracted(3));
    assert!(record.is_extracted(4));

    let flags = read_status(&dir.path().join("status.csv"), "id", "mock_mock_extracted").unwrap();
    assert!(flags["a"]);
    assert!(!flags["b"]);
    assert!(!flags["d"]);
}

#[test]
fn test_new_identity_starts_fresh_checkpoint() {
    let dir = TempDir::new().unwrap();
    let items = collection(&FIVE);

    let first = MockFactory::new(2);
    ExtractionOrchestrator::new(&items, &first, config(&dir))
        .unwrap()
        .run()
        .unwrap();

    let second = MockFactory::new(4).with_model("wide");
    let report = ExtractionOrchestrator::new(&items, &second, config(&dir))
        .unwrap()
        .run()
        .unwrap();

    assert!(report.resumed_from.is_none());
    assert_eq!(report.dispatched, 5);
    assert!(dir.path().join("checkpoints/mock_mock.checkpoint.json").exists());
    assert!(dir.path().join("checkpoints/mock_wide.checkpoint.json").exists());
}

#[test]
fn test_status_projection_keeps_every_identity() {
    let dir = TempDir::new().unwrap();
    let items = collection(&FIVE);
    let status = dir.path().join("status.csv");

    let narrow = MockFactory::new(2).failing("c");
    ExtractionOrchestrator::new(&items, &narrow, config(&dir))
        .unwrap()
        .run()
        .unwrap();
    let wide = MockFactory::new(4).with_model("wide");
    ExtractionOrchestrator::new(&items, &wide, config(&dir))
        .unwrap()
        .run()
        .unwrap();

    let text = std::fs::read_to_string(&status).unwrap();
    assert_eq!(
        text.lines().next().unwrap(),
        "id,name,image_path,mock_mock_extracted,mock_wide_extracted"
    );
    let narrow_flags = read_status(&status, "id", "mock_mock_extracted").unwrap();
    assert!(narrow_flags["a"]);
    assert!(!narrow_flags["c"]);
    let wide_flags = read_status(&status, "id", "mock_wide_extracted").unwrap();
    assert!(wide_flags.values().all(|flag| *flag));

    // A rerun of the first identity reconciles cleanly and keeps the second.
    ExtractionOrchestrator::new(&items, &narrow, config(&dir))
        .unwrap()
        .run()
        .unwrap();
    assert!(read_status(&status, "id", "mock_wide_extracted").unwrap()["e"]);
}

#[test]
fn test_extractor_built_once_per_worker_per_run() {
    let dir = TempDir::new().unwrap();
    let items = collection(&["a", "b", "c", "d", "e", "f", "g", "h"]);
    let factory = MockFactory::new(3);

    let report = ExtractionOrchestrator::new(&items, &factory, config(&dir).with_workers(1))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.batches.len(), 4);
    assert_eq!(report.succeeded, 8);
    assert_eq!(factory.created(), 1);

    let dir = TempDir::new().unwrap();
    let factory = MockFactory::new(3);
    ExtractionOrchestrator::new(&items, &factory, config(&dir))
        .unwrap()
        .run()
        .unwrap();
    assert!(factory.created() <= 2);
}

#[test]
fn test_color_extraction_over_real_files() {
    let dir = TempDir::new().unwrap();
    let covers = dir.path().join("covers");
    std::fs::create_dir_all(&covers).unwrap();
    RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]))
        .save(covers.join("red.png"))
        .unwrap();
    RgbImage::from_pixel(8, 8, Rgb([0, 0, 255]))
        .save(covers.join("blue.png"))
        .unwrap();
    std::fs::write(covers.join("broken.png"), b"garbage").unwrap();

    let csv = "id,image_path\nr,covers/red.png\nx,covers/broken.png\nb,covers/blue.png\nn,\n";
    let items = ItemCollection::from_reader(csv.as_bytes(), &LoadOptions::default()).unwrap();
    let factory = ExtractorSpec::basic();

    let mut orchestrator = ExtractionOrchestrator::new(
        &items,
        &factory,
        config(&dir).with_image_root(dir.path()),
    )
    .unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.dispatched, 3);

    let record = orchestrator.checkpoint().unwrap().record();
    assert_eq!(record.dimension(), Some(sonara_extract::COLOR_FEATURE_DIM));
    assert!(orchestrator.checkpoint_path().ends_with("basic_color.checkpoint.json"));

    let flags =
        read_status(&dir.path().join("status.csv"), "id", "basic_color_extracted").unwrap();
    assert!(flags["r"] && flags["b"]);
    assert!(!flags["x"] && !flags["n"]);
}
