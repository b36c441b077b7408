//! Offline integration tests for the batch pipeline.
//!
//! The analysis service and the cloud drive are replaced by in-process fakes
//! injected through `ReportConfig`, so these run without network access.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

mod common;

use async_trait::async_trait;
use common::{write_image, FakeAnalyzer, FakeDrive};
use edgequake_img2report::pipeline::source::list_image_files;
use edgequake_img2report::pipeline::table::read_report_rows;
use edgequake_img2report::{
    process_images, BatchProgressCallback, BatchRequest, ErrorKind, ImageAnalyzer, Img2ReportError,
    ItemError, ReportConfig,
};
use lopdf::content::Content;
use lopdf::{Document, Object};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

const FOLDER_LINK: &str = "https://drive.google.com/drive/folders/1AbCdEfGhIjKlMnOp?usp=sharing";

fn config_with(analyzer: Arc<FakeAnalyzer>, drive: Arc<FakeDrive>, out: &Path) -> ReportConfig {
    ReportConfig::builder()
        .analyzer(analyzer)
        .fetcher(drive)
        .default_output_dir(out)
        .build()
        .unwrap()
}

fn local_config(analyzer: Arc<FakeAnalyzer>) -> ReportConfig {
    ReportConfig::builder().analyzer(analyzer).build().unwrap()
}

/// Every `Tj` string in a PDF, in page order.
fn pdf_strings(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    let mut out = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        for op in content.operations {
            if op.operator == "Tj" {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    out.push(String::from_utf8_lossy(bytes).into_owned());
                }
            }
        }
    }
    out
}

fn artifact_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("analysis_results_"))
        .count()
}

// ── Local folder ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_local_folder_two_images() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 320, 240);
    write_image(dir.path(), "b.jpg", 120, 400);
    std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
    let listing = list_image_files(dir.path()).unwrap();

    let analyzer = Arc::new(FakeAnalyzer::default());
    let config = local_config(analyzer.clone());
    let output = process_images(&BatchRequest::local(dir.path(), "key"), &config)
        .await
        .expect("batch should succeed");

    // One result per image, in listing order.
    let names: Vec<_> = output.results.iter().map(|r| r.image_name.clone()).collect();
    assert_eq!(names, listing);
    assert_eq!(analyzer.calls(), listing);
    assert_eq!(output.message, "Processing completed successfully");
    assert_eq!(output.stats.total_images, 2);
    assert_eq!(output.stats.analyzed, 2);
    assert_eq!(output.stats.failed, 0);
    assert_eq!(output.stats.thumbnail_failures, 0);

    // Artifacts live beside the images with unique names.
    let re = Regex::new(r"^analysis_results_\d{8}_\d{6}_[0-9a-f]{8}\.(xlsx|pdf)$").unwrap();
    for path in [&output.report_path, &output.document_path] {
        assert_eq!(path.parent().unwrap(), dir.path());
        assert!(re.is_match(&path.file_name().unwrap().to_string_lossy()));
        assert!(path.is_file());
    }

    // 2 data rows (header skipped by the reader).
    let rows = read_report_rows(&output.report_path).unwrap();
    assert_eq!(rows.len(), 2);
    for (row, name) in rows.iter().zip(&listing) {
        assert_eq!(&row.image_name, name);
        assert_eq!(row.analysis_text, format!("description of {name}"));
    }

    // 1 title block + 2 image sections.
    let text = pdf_strings(&output.document_path);
    assert_eq!(text.iter().filter(|t| *t == "Image Analysis Results").count(), 1);
    assert_eq!(text.iter().filter(|t| t.starts_with("Image: ")).count(), 2);
}

#[tokio::test]
async fn test_missing_folder_is_not_found() {
    let analyzer = Arc::new(FakeAnalyzer::default());
    let config = local_config(analyzer.clone());
    let err = process_images(&BatchRequest::local("/definitely/not/here", "key"), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, Img2ReportError::FolderNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn test_folder_without_images() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.md"), b"# nothing").unwrap();

    let analyzer = Arc::new(FakeAnalyzer::default());
    let err = process_images(&BatchRequest::local(dir.path(), "key"), &local_config(analyzer.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, Img2ReportError::NoImagesFound));
    assert_eq!(err.kind(), ErrorKind::Failure);
    assert!(analyzer.calls().is_empty());
    assert_eq!(artifact_count(dir.path()), 0);
}

#[tokio::test]
async fn test_analysis_failure_keeps_row() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 50, 50);
    write_image(dir.path(), "b.png", 50, 50);

    let analyzer = Arc::new(FakeAnalyzer::failing(&["b.png"]));
    let output = process_images(&BatchRequest::local(dir.path(), "key"), &local_config(analyzer))
        .await
        .unwrap();

    assert_eq!(output.results.len(), 2);
    assert_eq!(output.stats.analyzed, 1);
    assert_eq!(output.stats.failed, 1);

    let failed = output.results.iter().find(|r| r.image_name == "b.png").unwrap();
    assert!(!failed.is_success());
    assert!(failed.analysis_text.starts_with("Error processing image: "));

    let rows = read_report_rows(&output.report_path).unwrap();
    assert_eq!(rows.len(), 2);
    let row = rows.iter().find(|r| r.image_name == "b.png").unwrap();
    assert_eq!(row.analysis_text, failed.analysis_text);

    let text = pdf_strings(&output.document_path);
    assert!(text.iter().any(|t| t.starts_with("Error processing image: ")));
}

#[tokio::test]
async fn test_corrupt_image_gets_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "good.png", 80, 60);
    std::fs::write(dir.path().join("broken.jpg"), b"definitely not a jpeg").unwrap();

    let analyzer = Arc::new(FakeAnalyzer::default());
    let output = process_images(&BatchRequest::local(dir.path(), "key"), &local_config(analyzer))
        .await
        .unwrap();

    assert_eq!(output.results.len(), 2);
    assert_eq!(output.stats.thumbnail_failures, 1);
    assert_eq!(read_report_rows(&output.report_path).unwrap().len(), 2);
}

#[tokio::test]
async fn test_two_runs_are_distinct_but_equivalent() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 40, 40);
    write_image(dir.path(), "b.bmp", 40, 40);

    let config = local_config(Arc::new(FakeAnalyzer::default()));
    let request = BatchRequest::local(dir.path(), "key");
    let first = process_images(&request, &config).await.unwrap();
    let second = process_images(&request, &config).await.unwrap();

    assert_ne!(first.report_path, second.report_path);
    assert_ne!(first.document_path, second.document_path);
    assert_eq!(
        read_report_rows(&first.report_path).unwrap(),
        read_report_rows(&second.report_path).unwrap()
    );
    // Artifacts from the first run are not picked up as images by the second.
    assert_eq!(second.results.len(), 2);
}

#[tokio::test]
async fn test_progress_events() {
    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        completed: AtomicUsize,
        errored: AtomicUsize,
        batch_total: AtomicUsize,
    }
    impl BatchProgressCallback for Counting {
        fn on_batch_start(&self, total: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }
        fn on_image_start(&self, _i: usize, _t: usize, _n: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_image_complete(&self, _i: usize, _t: usize, _n: &str, _len: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_image_error(&self, _i: usize, _t: usize, _n: &str, _e: &str) {
            self.errored.fetch_add(1, Ordering::SeqCst);
        }
    }

    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 20, 20);
    write_image(dir.path(), "b.png", 20, 20);
    write_image(dir.path(), "c.png", 20, 20);

    let counting = Arc::new(Counting::default());
    let config = ReportConfig::builder()
        .analyzer(Arc::new(FakeAnalyzer::failing(&["c.png"])))
        .progress_callback(counting.clone())
        .build()
        .unwrap();
    process_images(&BatchRequest::local(dir.path(), "key"), &config)
        .await
        .unwrap();

    assert_eq!(counting.batch_total.load(Ordering::SeqCst), 3);
    assert_eq!(counting.started.load(Ordering::SeqCst), 3);
    assert_eq!(counting.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counting.errored.load(Ordering::SeqCst), 1);
}

// ── Cloud links ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cloud_file_download_failure_cleans_up() {
    let out = tempfile::tempdir().unwrap();
    let drive = Arc::new(FakeDrive::failing());
    let analyzer = Arc::new(FakeAnalyzer::default());
    let config = config_with(analyzer.clone(), drive.clone(), out.path());

    let err = process_images(
        &BatchRequest::cloud("https://drive.google.com/file/d/1ZyXwVuTsRqPoNm/view?usp=sharing", "key"),
        &config,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Img2ReportError::NoImagesFound));
    let temp = drive.last_dest().expect("fetcher was called");
    assert!(!temp.exists(), "temp dir should be removed: {}", temp.display());
    assert!(analyzer.calls().is_empty());
    assert_eq!(artifact_count(out.path()), 0);
}

#[tokio::test]
async fn test_cloud_folder_success() {
    let out = tempfile::tempdir().unwrap();
    let drive = Arc::new(FakeDrive::with_files(&["one.png", "two.jpg", "notes.txt"]));
    let analyzer = Arc::new(FakeAnalyzer::default());
    let config = config_with(analyzer.clone(), drive.clone(), out.path());

    let output = process_images(
        &BatchRequest::cloud("https://drive.google.com/drive/folders/1AbCdEfGhIjKlMnOp?usp=sharing", "key"),
        &config,
    )
    .await
    .unwrap();

    let mut names: Vec<_> = output.results.iter().map(|r| r.image_name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["one.png", "two.jpg"]);
    assert_eq!(output.report_path.parent().unwrap(), out.path());
    assert_eq!(output.document_path.parent().unwrap(), out.path());

    let temp = drive.last_dest().unwrap();
    assert!(!temp.exists(), "temp dir should be removed after success");
}

#[tokio::test]
async fn test_cloud_single_file_success() {
    let out = tempfile::tempdir().unwrap();
    let drive = Arc::new(FakeDrive::default());
    let config = config_with(Arc::new(FakeAnalyzer::default()), drive.clone(), out.path());

    let output = process_images(
        &BatchRequest::cloud("https://drive.google.com/open?id=1ZyXwVuTsRqPoNm", "key"),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].image_name, "downloaded_image.jpg");
    assert!(!drive.last_dest().unwrap().exists());
}

#[tokio::test]
async fn test_cloud_unwritable_output_dir_still_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    // Output "directory" is a regular file: creating it must fail.
    let blocked = scratch.path().join("not-a-dir");
    std::fs::write(&blocked, b"x").unwrap();

    let drive = Arc::new(FakeDrive::with_files(&["one.png"]));
    let config = config_with(Arc::new(FakeAnalyzer::default()), drive.clone(), &blocked);

    let err = process_images(&BatchRequest::cloud(FOLDER_LINK, "key"), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, Img2ReportError::OutputWriteFailed { .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Failure);
    assert!(!drive.last_dest().unwrap().exists());
}

#[tokio::test]
async fn test_cloud_every_analysis_failing_still_cleans_up() {
    let out = tempfile::tempdir().unwrap();
    let drive = Arc::new(FakeDrive::with_files(&["one.png", "two.jpg"]));
    let analyzer = Arc::new(FakeAnalyzer::failing(&["one.png", "two.jpg"]));
    let config = config_with(analyzer.clone(), drive.clone(), out.path());

    let output = process_images(&BatchRequest::cloud(FOLDER_LINK, "key"), &config)
        .await
        .unwrap();

    assert_eq!(output.stats.failed, 2);
    assert_eq!(output.stats.analyzed, 0);
    assert_eq!(analyzer.calls().len(), 2);
    assert_eq!(read_report_rows(&output.report_path).unwrap().len(), 2);
    assert!(!drive.last_dest().unwrap().exists());
}

/// Replaces the output directory with a plain file while analysing, so the
/// directory check passes but saving the spreadsheet cannot.
struct OutputDirSaboteur {
    output_dir: PathBuf,
}

#[async_trait]
impl ImageAnalyzer for OutputDirSaboteur {
    async fn analyze(&self, _image_path: &Path) -> Result<String, ItemError> {
        if self.output_dir.is_dir() {
            std::fs::remove_dir_all(&self.output_dir).unwrap();
            std::fs::write(&self.output_dir, b"x").unwrap();
        }
        Ok("fine".into())
    }
}

#[tokio::test]
async fn test_cloud_report_build_failure_still_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let output_dir = scratch.path().join("reports");
    let drive = Arc::new(FakeDrive::with_files(&["one.png", "two.jpg"]));
    let config = ReportConfig::builder()
        .analyzer(Arc::new(OutputDirSaboteur {
            output_dir: output_dir.clone(),
        }))
        .fetcher(drive.clone())
        .default_output_dir(&output_dir)
        .build()
        .unwrap();

    let err = process_images(&BatchRequest::cloud(FOLDER_LINK, "key"), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, Img2ReportError::ReportBuildFailed { .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Failure);
    assert!(!drive.last_dest().unwrap().exists());
}

struct PanickingAnalyzer;

#[async_trait]
impl ImageAnalyzer for PanickingAnalyzer {
    async fn analyze(&self, image_path: &Path) -> Result<String, ItemError> {
        panic!("analyzer blew up on {}", image_path.display());
    }
}

#[tokio::test]
async fn test_cloud_panic_mid_batch_still_cleans_up() {
    let out = tempfile::tempdir().unwrap();
    let drive = Arc::new(FakeDrive::with_files(&["one.png"]));
    let config = ReportConfig::builder()
        .analyzer(Arc::new(PanickingAnalyzer))
        .fetcher(drive.clone())
        .default_output_dir(out.path())
        .build()
        .unwrap();
    let request = BatchRequest::cloud(FOLDER_LINK, "key");

    let joined = tokio::spawn(async move { process_images(&request, &config).await }).await;

    assert!(joined.unwrap_err().is_panic());
    let temp = drive.last_dest().expect("fetcher was called");
    assert!(!temp.exists(), "temp dir should be removed: {}", temp.display());
    assert_eq!(artifact_count(out.path()), 0);
}

#[tokio::test]
async fn test_invalid_link_is_rejected_before_download() {
    let out = tempfile::tempdir().unwrap();
    let drive = Arc::new(FakeDrive::default());
    let config = config_with(Arc::new(FakeAnalyzer::default()), drive.clone(), out.path());

    let err = process_images(
        &BatchRequest::cloud("https://example.com/folders/1AbCdEfGhIjKlMnOp", "key"),
        &config,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Img2ReportError::InvalidSourceUrl { .. }));
    assert!(drive.last_dest().is_none());
}
