//! Pipeline stages for batch image-to-report processing.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (a different cloud drive, a different analysis
//! backend) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ analyze ──▶ table ──▶ document
//! (folder/link) (HTTP)   (xlsx)    (pdf)
//!    │                     │
//!  drive               thumbnail
//! ```
//!
//! 1. [`source`] — turn a local folder or share link into local image paths;
//!    cloud downloads go through [`drive`] into a temp dir with a cleanup handle
//! 2. [`analyze`] — upload each image and aggregate the streamed answer; the
//!    only stage with analysis network I/O
//! 3. [`table`] — one spreadsheet row per result, thumbnails from
//!    [`thumbnail`]; runs in `spawn_blocking` because image resizing is CPU-bound
//! 4. [`document`] — re-read the saved spreadsheet and paginate it as a PDF

pub mod analyze;
pub mod document;
pub mod drive;
pub mod source;
pub mod table;
pub mod thumbnail;
