//! Source resolution: turn a local folder or a cloud-drive link into a list
//! of local image files.
//!
//! ## Cleanup
//!
//! Cloud sources are downloaded into a fresh [`TempDir`]. The directory is
//! handed back as a [`CleanupHandle`] inside the [`ResolvedImageSet`]; the
//! orchestrator calls [`CleanupHandle::release`] exactly once after the last
//! image has been read. `release` consumes the handle, so it cannot run twice,
//! and if the batch unwinds before reaching it the `TempDir` drop still removes
//! the directory. Local folders carry no handle: the caller owns them.
//!
//! ## Download failures
//!
//! Any [`DownloadError`] is logged and collapsed into an empty image list. The
//! orchestrator reports that as [`Img2ReportError::NoImagesFound`]; callers
//! never see finer-grained cloud errors.

use crate::error::Img2ReportError;
use crate::pipeline::drive::{parse_drive_link, DownloadError, DriveFetcher, DriveLink};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Extensions (lower-case, no dot) recognised as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Where the images of a batch come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// A directory on local storage. Artifacts are written beside the images.
    LocalFolder { path: PathBuf },
    /// A public cloud-drive share link (folder or single file).
    CloudLink { url: String },
}

/// Obligation to remove temporary storage allocated during resolution.
#[derive(Debug)]
pub struct CleanupHandle {
    dir: TempDir,
}

impl CleanupHandle {
    fn new() -> Result<Self, Img2ReportError> {
        let dir = tempfile::Builder::new()
            .prefix("img2report-")
            .tempdir()
            .map_err(|e| Img2ReportError::Internal(format!("Failed to create temp dir: {e}")))?;
        debug!("Allocated temp dir {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory and everything in it.
    ///
    /// Removal errors are logged, not returned: the batch outcome is already
    /// decided by the time cleanup runs.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed temp dir {}", path.display()),
            Err(e) => warn!("Failed to remove temp dir {}: {}", path.display(), e),
        }
    }
}

/// The resolved images, in the order they will appear in the report.
#[derive(Debug)]
pub struct ResolvedImageSet {
    /// Full paths, each existing with a recognised extension at resolution time.
    pub images: Vec<PathBuf>,
    /// Present only when resolution created temporary storage.
    pub cleanup: Option<CleanupHandle>,
}

/// `true` when `path` has a recognised image extension (case-insensitive).
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// List image file names (not paths) in `folder`, in directory-listing order.
///
/// The order is whatever the platform returns and is not sorted.
pub fn list_image_files(folder: &Path) -> Result<Vec<String>, Img2ReportError> {
    if !folder.exists() {
        return Err(Img2ReportError::FolderNotFound {
            path: folder.to_path_buf(),
        });
    }
    if !folder.is_dir() {
        return Err(Img2ReportError::NotADirectory {
            path: folder.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(folder).map_err(|e| {
        Img2ReportError::Internal(format!("Failed to list '{}': {e}", folder.display()))
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Img2ReportError::Internal(format!("Failed to list '{}': {e}", folder.display()))
        })?;
        let path = entry.path();
        if path.is_file() && has_image_extension(&path) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Resolve a source to local image files.
///
/// `fetcher` is only consulted for cloud links.
pub async fn resolve_source(
    source: &SourceDescriptor,
    fetcher: &dyn DriveFetcher,
) -> Result<ResolvedImageSet, Img2ReportError> {
    match source {
        SourceDescriptor::LocalFolder { path } => {
            let names = list_image_files(path)?;
            info!("Found {} images in {}", names.len(), path.display());
            Ok(ResolvedImageSet {
                images: names.iter().map(|n| path.join(n)).collect(),
                cleanup: None,
            })
        }
        SourceDescriptor::CloudLink { url } => {
            let link = parse_drive_link(url)?;
            let handle = CleanupHandle::new()?;
            let images = match download_link(&link, fetcher, handle.path()).await {
                Ok(images) => images,
                Err(e) => {
                    warn!("Error downloading from cloud drive: {}", e);
                    Vec::new()
                }
            };
            info!("Resolved {} images from {}", images.len(), url);
            Ok(ResolvedImageSet {
                images,
                cleanup: Some(handle),
            })
        }
    }
}

async fn download_link(
    link: &DriveLink,
    fetcher: &dyn DriveFetcher,
    dest: &Path,
) -> Result<Vec<PathBuf>, DownloadError> {
    match link {
        DriveLink::Folder { id } => {
            fetcher.fetch_folder(id, dest).await?;
            // Filter what actually landed on disk, not what the fetcher claims.
            let names = list_image_files(dest).map_err(|_| DownloadError::Listing { id: id.clone() })?;
            Ok(names.iter().map(|n| dest.join(n)).collect())
        }
        DriveLink::File { id } => {
            let path = fetcher.fetch_file(id, dest).await?;
            Ok(if path.is_file() { vec![path] } else { Vec::new() })
        }
    }
}
