//! Batch entry points: one request in, a spreadsheet and a PDF out.
//!
//! ## Cleanup guarantee
//!
//! Source resolution may allocate a temporary directory (cloud sources).
//! [`process_images`] releases it after the batch body returns, whatever the
//! outcome: success, `NoImagesFound`, or a report/document failure. Panics and
//! cancelled futures are covered by the directory's own drop.
//!
//! ## Why sequential?
//!
//! Images are analysed one at a time, in resolution order. Report rows follow
//! that order, and the remote service is not asked to absorb a burst of
//! concurrent streams on behalf of one caller.

use crate::config::ReportConfig;
use crate::error::Img2ReportError;
use crate::output::{AnalysisResult, BatchOutput, BatchStats};
use crate::pipeline::analyze::{analyze_image, DifyClient, ImageAnalyzer};
use crate::pipeline::document::render_document;
use crate::pipeline::drive::{DriveFetcher, GoogleDriveClient};
use crate::pipeline::source::{resolve_source, SourceDescriptor};
use crate::pipeline::table::{build_rows, write_report};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Message attached to every successful [`BatchOutput`].
pub const SUCCESS_MESSAGE: &str = "Processing completed successfully";

/// One batch: where the images are and whose credential analyses them.
#[derive(Clone)]
pub struct BatchRequest {
    pub source: SourceDescriptor,
    /// Bearer credential for the analysis service. Never logged.
    pub api_key: String,
}

impl std::fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRequest")
            .field("source", &self.source)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl BatchRequest {
    pub fn local(path: impl Into<PathBuf>, api_key: impl Into<String>) -> Self {
        Self {
            source: SourceDescriptor::LocalFolder { path: path.into() },
            api_key: api_key.into(),
        }
    }

    pub fn cloud(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            source: SourceDescriptor::CloudLink { url: url.into() },
            api_key: api_key.into(),
        }
    }
}

/// Run one batch end to end.
///
/// # Returns
/// `Ok(BatchOutput)` once both artifacts are saved, even when every image
/// failed analysis (those rows carry error markers; check
/// `output.stats.failed`).
///
/// # Errors
/// - [`Img2ReportError::FolderNotFound`] / [`Img2ReportError::NotADirectory`]:
///   the local source is unusable
/// - [`Img2ReportError::InvalidSourceUrl`]: the share link has no usable id
/// - [`Img2ReportError::NoImagesFound`]: resolution yielded zero images,
///   including every cloud download failure
/// - report or document write failures
pub async fn process_images(
    request: &BatchRequest,
    config: &ReportConfig,
) -> Result<BatchOutput, Img2ReportError> {
    let total_start = Instant::now();
    info!("Starting batch: {:?}", request.source);

    // ── Step 1: Resolve source ───────────────────────────────────────────
    let fetcher = resolve_fetcher(config)?;
    let resolved = resolve_source(&request.source, fetcher.as_ref()).await?;

    // ── Step 2: Analyse and report, then always clean up ─────────────────
    let outcome = run_batch(request, &resolved.images, config, total_start).await;
    if let Some(handle) = resolved.cleanup {
        handle.release();
    }

    if let Err(ref e) = outcome {
        warn!("Batch failed: {}", e);
    }
    outcome
}

/// Synchronous wrapper around [`process_images`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_images_sync(
    request: &BatchRequest,
    config: &ReportConfig,
) -> Result<BatchOutput, Img2ReportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Img2ReportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_images(request, config))
}

/// Where the artifacts of `source` are written.
///
/// Local batches write beside their images; cloud batches have no durable
/// source location and use the configured default directory.
pub fn output_dir_for(source: &SourceDescriptor, config: &ReportConfig) -> PathBuf {
    match source {
        SourceDescriptor::LocalFolder { path } => path.clone(),
        SourceDescriptor::CloudLink { .. } => config.default_output_dir.clone(),
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_batch(
    request: &BatchRequest,
    images: &[PathBuf],
    config: &ReportConfig,
    total_start: Instant,
) -> Result<BatchOutput, Img2ReportError> {
    if images.is_empty() {
        return Err(Img2ReportError::NoImagesFound);
    }

    let output_dir = output_dir_for(&request.source, config);
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|e| Img2ReportError::OutputWriteFailed {
            path: output_dir.clone(),
            source: e,
        })?;

    let analyzer = resolve_analyzer(&request.api_key, config)?;
    let total = images.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    // ── Analyse each image ───────────────────────────────────────────────
    let analysis_start = Instant::now();
    let results = analyze_sequential(analyzer.as_ref(), images, config).await;
    let analysis_duration_ms = analysis_start.elapsed().as_millis() as u64;
    let analyzed = results.iter().filter(|r| r.is_success()).count();
    info!(
        "Analysed {}/{} images in {}ms",
        analyzed, total, analysis_duration_ms
    );

    // ── Spreadsheet ──────────────────────────────────────────────────────
    let (report_path, thumbnail_failures) = {
        let results = results.clone();
        let config = config.clone();
        let dir = output_dir.clone();
        tokio::task::spawn_blocking(move || {
            let report = build_rows(&results, &config);
            write_report(&report, &dir).map(|path| (path, report.thumbnail_failures()))
        })
        .await
        .map_err(join_error)??
    };

    // ── Document ─────────────────────────────────────────────────────────
    let document_path = {
        let report_path = report_path.clone();
        let dir = output_dir.clone();
        tokio::task::spawn_blocking(move || render_document(&report_path, &dir))
            .await
            .map_err(join_error)??
    };

    let stats = BatchStats {
        total_images: total,
        analyzed,
        failed: total - analyzed,
        thumbnail_failures,
        analysis_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Batch complete: {}/{} analysed, {}ms total",
        analyzed, total, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, analyzed);
    }

    Ok(BatchOutput {
        report_path,
        document_path,
        message: SUCCESS_MESSAGE.to_string(),
        results,
        stats,
    })
}

async fn analyze_sequential(
    analyzer: &dyn ImageAnalyzer,
    images: &[PathBuf],
    config: &ReportConfig,
) -> Vec<AnalysisResult> {
    let total = images.len();
    let mut results = Vec::with_capacity(total);

    for (i, path) in images.iter().enumerate() {
        let index = i + 1;
        let name = crate::output::display_name(path);
        if let Some(ref cb) = config.progress_callback {
            cb.on_image_start(index, total, &name);
        }

        let result = analyze_image(analyzer, path).await;

        if let Some(ref cb) = config.progress_callback {
            match &result.error {
                None => cb.on_image_complete(index, total, &name, result.analysis_text.len()),
                Some(e) => cb.on_image_error(index, total, &name, &e.to_string()),
            }
        }
        results.push(result);
    }

    results
}

/// Pre-built analyzer from the config, else the HTTP client for this credential.
fn resolve_analyzer(
    api_key: &str,
    config: &ReportConfig,
) -> Result<Arc<dyn ImageAnalyzer>, Img2ReportError> {
    if let Some(ref analyzer) = config.analyzer {
        return Ok(Arc::clone(analyzer));
    }
    if api_key.trim().is_empty() {
        warn!("Empty API key: every analysis call will be rejected");
    }
    Ok(Arc::new(DifyClient::new(api_key, config)?))
}

fn resolve_fetcher(config: &ReportConfig) -> Result<Arc<dyn DriveFetcher>, Img2ReportError> {
    if let Some(ref fetcher) = config.fetcher {
        return Ok(Arc::clone(fetcher));
    }
    debug!("Using Google Drive fetcher");
    let client = GoogleDriveClient::new(config.download_timeout_secs)
        .map_err(|e| Img2ReportError::Internal(format!("Drive client: {e}")))?;
    Ok(Arc::new(client))
}

fn join_error(e: tokio::task::JoinError) -> Img2ReportError {
    Img2ReportError::Internal(format!("Report task failed: {}", e))
}
