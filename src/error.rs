//! Error types for the edgequake-img2report library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Img2ReportError`] — **Fatal**: the batch cannot proceed at all
//!   (source folder missing, nothing to analyse, report could not be saved).
//!   Returned as `Err(Img2ReportError)` from the top-level `process_*`
//!   functions.
//!
//! * [`ItemError`] — **Non-fatal**: a single image failed (upload rejected,
//!   stream broke, thumbnail could not be decoded) but every other image is
//!   fine. Stored inside [`crate::output::AnalysisResult`] so the report keeps
//!   one row per resolved image.
//!
//! Boundary adapters classify fatal errors through [`Img2ReportError::kind`]:
//! a missing source folder is a not-found condition, everything else is a
//! generic processing failure carrying the error's display text.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used by boundary adapters (HTTP status, exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested source does not exist (404-equivalent).
    NotFound,
    /// Any other pipeline failure (500-equivalent).
    Failure,
}

/// All fatal errors returned by the edgequake-img2report library.
///
/// Per-image failures use [`ItemError`] and never surface here.
#[derive(Debug, Error)]
pub enum Img2ReportError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// The local source folder does not exist.
    #[error("Folder not found: '{path}'")]
    FolderNotFound { path: PathBuf },

    /// The local source path exists but is not a directory.
    #[error("Source path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// Resolution succeeded but produced zero eligible image files.
    #[error("No image files found")]
    NoImagesFound,

    /// A cloud-drive link whose shape we cannot extract an identifier from.
    #[error("Invalid cloud-drive link '{url}': {reason}")]
    InvalidSourceUrl { url: String, reason: String },

    // ── Artifact errors ───────────────────────────────────────────────────
    /// The spreadsheet report could not be assembled or saved.
    #[error("Failed to build report '{path}': {detail}")]
    ReportBuildFailed { path: PathBuf, detail: String },

    /// The PDF document could not be rendered or saved.
    #[error("Failed to render document '{path}': {detail}")]
    DocumentRenderFailed { path: PathBuf, detail: String },

    /// The output directory could not be created.
    #[error("Failed to prepare output directory '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Img2ReportError {
    /// Classify this error for a boundary adapter.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Img2ReportError::FolderNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Failure,
        }
    }
}

/// A non-fatal error for a single image.
///
/// The batch always continues; the error text becomes the row's content.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The upload endpoint rejected the image or returned no file id.
    #[error("upload failed: {detail}")]
    Upload { detail: String },

    /// The analysis endpoint returned a non-success status.
    #[error("analysis request failed: {detail}")]
    Analyze { detail: String },

    /// Connection, timeout or stream-read failure.
    #[error("transport error: {detail}")]
    Transport { detail: String },

    /// The image could not be decoded or resized for the report.
    #[error("thumbnail failed for '{name}': {detail}")]
    Thumbnail { name: String, detail: String },
}
