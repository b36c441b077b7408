//! Result types returned by the pipeline.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Analysis outcome for one image. Always produced, even on failure, so the
/// report has exactly one row per resolved image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// File name (no directory) shown in the report.
    pub image_name: String,
    /// Full path of the image on local storage.
    pub image_path: PathBuf,
    /// Aggregated analysis text, or an error marker when `error` is set.
    pub analysis_text: String,
    /// Set when the remote call failed for this image.
    pub error: Option<ItemError>,
}

impl AnalysisResult {
    /// A result whose file name is taken from `path`.
    pub fn new(path: &Path, analysis_text: String, error: Option<ItemError>) -> Self {
        Self {
            image_name: display_name(path),
            image_path: path.to_path_buf(),
            analysis_text,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate statistics for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_images: usize,
    pub analyzed: usize,
    pub failed: usize,
    /// Rows whose thumbnail fell back to the error placeholder.
    pub thumbnail_failures: usize,
    pub analysis_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a successful batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// Spreadsheet report (`.xlsx`).
    pub report_path: PathBuf,
    /// Paginated document (`.pdf`).
    pub document_path: PathBuf,
    pub message: String,
    pub results: Vec<AnalysisResult>,
    pub stats: BatchStats,
}

/// Base name of `path` as a displayable string.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Unique artifact file name: `analysis_results_<YYYYmmdd_HHMMSS>_<token>.<ext>`.
///
/// The 8-hex-char token comes from a fresh v4 UUID, so two calls within the
/// same second still differ.
pub fn artifact_file_name(extension: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("analysis_results_{timestamp}_{}.{extension}", &token[..8])
}
