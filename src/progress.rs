//! Progress-callback trait for per-image batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ReportConfigBuilder::progress_callback`] to receive
//! events as the pipeline analyses each image.
//!
//! Callers can forward events to a terminal progress bar, a channel or a log
//! without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_img2report::{BatchProgressCallback, ReportConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, name: &str, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} ({} chars)", index, total, name, text_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ReportConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it works through a batch.
///
/// Implementations must be `Send + Sync`: the HTTP adapter runs batches on
/// arbitrary runtime threads. All methods have default no-op implementations
/// so callers only override what they care about. `index` is 1-based.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after the source has been resolved.
    fn on_batch_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called just before the image is uploaded.
    fn on_image_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when an analysis text was received.
    fn on_image_complete(&self, index: usize, total: usize, name: &str, text_len: usize) {
        let _ = (index, total, name, text_len);
    }

    /// Called when an image's analysis failed; the batch continues.
    fn on_image_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once the report artifacts have been written.
    fn on_batch_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReportConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
