//! # edgequake-img2report
//!
//! Analyse a batch of images with a remote vision API and emit a spreadsheet
//! and a PDF pairing each image with its generated description.
//!
//! ## Why this crate?
//!
//! Describing a folder of photos one by one in a chat window is slow and the
//! results end up scattered. This crate walks the whole batch, streams each
//! description back, and lays everything out as a reviewable table (with
//! thumbnails) plus a printable document. One image failing never costs the
//! rest of the batch: its row carries the error instead.
//!
//! ## Pipeline Overview
//!
//! ```text
//! folder / share link
//!  │
//!  ├─ 1. Source    list local images, or download a Drive folder/file to a temp dir
//!  ├─ 2. Analyse   upload + streamed chat call per image, sequentially
//!  ├─ 3. Table     xlsx: thumbnail | name | analysis, heuristic row heights
//!  ├─ 4. Document  PDF re-read from the saved table
//!  └─ 5. Cleanup   temp dir removed on every exit path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_img2report::{process_images, BatchRequest, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReportConfig::default();
//!     let request = BatchRequest::local("./photos", std::env::var("DIFY_API_KEY")?);
//!     let output = process_images(&request, &config).await?;
//!     println!("{}", output.report_path.display());
//!     println!("{}", output.document_path.display());
//!     eprintln!("{}/{} analysed", output.stats.analyzed, output.stats.total_images);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `img2report` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | HTTP boundary (`axum` router with `POST /api/v1/process-images`) |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-img2report = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ReportConfig, ReportConfigBuilder, RowLayout};
pub use error::{ErrorKind, Img2ReportError, ItemError};
pub use output::{AnalysisResult, BatchOutput, BatchStats};
pub use pipeline::analyze::{DifyClient, ImageAnalyzer};
pub use pipeline::drive::{DriveFetcher, GoogleDriveClient};
pub use pipeline::source::SourceDescriptor;
pub use process::{process_images, process_images_sync, BatchRequest};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
