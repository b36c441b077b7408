//! Cloud-drive share links: identifier extraction and bulk download.
//!
//! Only public Google Drive links are understood. Two shapes exist:
//!
//! ```text
//! https://drive.google.com/drive/folders/<FOLDER_ID>?usp=sharing   → folder
//! https://drive.google.com/file/d/<FILE_ID>/view?usp=sharing       → single file
//! https://drive.google.com/open?id=<FILE_ID>                        → single file
//! ```
//!
//! Anything else is rejected up front as [`Img2ReportError::InvalidSourceUrl`]
//! instead of guessing which path segment holds the id.
//!
//! Downloading goes through the [`DriveFetcher`] trait so the resolver can be
//! driven by an in-memory fake in tests; [`GoogleDriveClient`] is the HTTPS
//! implementation.

use crate::error::Img2ReportError;
use crate::pipeline::source::has_image_extension;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Host serving share links and downloads.
pub const DRIVE_BASE_URL: &str = "https://drive.google.com";

/// File name used for a single-file download when the server names none.
pub const DEFAULT_SINGLE_FILE_NAME: &str = "downloaded_image.jpg";

static DRIVE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{10,}$").unwrap());

static FOLDER_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)id="entry-([A-Za-z0-9_-]+)".*?href="([^"]*)".*?class="flip-entry-title">([^<]*)<"#)
        .unwrap()
});

static FORM_ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<form[^>]*id="download-form"[^>]*action="([^"]+)""#).unwrap());

static HIDDEN_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<input[^>]*name="([^"]+)"[^>]*value="([^"]*)""#).unwrap());

static DISPOSITION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).unwrap());

/// A parsed share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveLink {
    Folder { id: String },
    File { id: String },
}

/// Classify a share link and extract its identifier.
pub fn parse_drive_link(url: &str) -> Result<DriveLink, Img2ReportError> {
    let invalid = |reason: &str| Img2ReportError::InvalidSourceUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url.trim()).map_err(|e| invalid(&format!("not a URL ({e})")))?;
    if parsed.host_str() != Some("drive.google.com") {
        return Err(invalid("only drive.google.com share links are supported"));
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let checked = |id: &str| {
        if DRIVE_ID.is_match(id) {
            Ok(id.to_string())
        } else {
            Err(invalid(&format!("'{id}' is not a drive identifier")))
        }
    };

    if segments.iter().any(|s| *s == "folders") {
        let id = segments.last().copied().unwrap_or_default();
        return Ok(DriveLink::Folder { id: checked(id)? });
    }

    if let Some(pos) = segments.iter().position(|s| *s == "d") {
        if let Some(id) = segments.get(pos + 1) {
            return Ok(DriveLink::File { id: checked(*id)? });
        }
    }

    if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "id") {
        return Ok(DriveLink::File { id: checked(id.as_ref())? });
    }

    Err(invalid("no file or folder identifier in the link"))
}

// ── Fetching ─────────────────────────────────────────────────────────────

/// Failure while pulling files from the drive.
///
/// The resolver logs these and reports an empty image set; they never reach
/// the caller of the pipeline.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("request to {url} failed: {detail}")]
    Transport { url: String, detail: String },

    #[error("'{id}' did not resolve to a downloadable file")]
    NotAFile { id: String },

    #[error("could not read folder listing for '{id}'")]
    Listing { id: String },

    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Bulk-download capability for share links.
#[async_trait]
pub trait DriveFetcher: Send + Sync {
    /// Download every file of a public folder into `dest`.
    async fn fetch_folder(&self, folder_id: &str, dest: &Path) -> Result<Vec<PathBuf>, DownloadError>;

    /// Download one file into `dest` and return its path.
    async fn fetch_file(&self, file_id: &str, dest: &Path) -> Result<PathBuf, DownloadError>;
}

/// Public Google Drive over HTTPS.
#[derive(Debug, Clone)]
pub struct GoogleDriveClient {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleDriveClient {
    pub fn new(timeout_secs: u64) -> Result<Self, DownloadError> {
        Self::with_base_url(DRIVE_BASE_URL, timeout_secs)
    }

    /// Point the client at another host (mirrors, local test servers).
    pub fn with_base_url(base_url: &str, timeout_secs: u64) -> Result<Self, DownloadError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DownloadError::Transport {
                url: base_url.to_string(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(DownloadError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    /// GET the file, following the large-file confirmation page once.
    async fn open_file(&self, file_id: &str) -> Result<reqwest::Response, DownloadError> {
        let url = format!("{}/uc?export=download&id={}", self.base_url, file_id);
        let response = self.get(&url).await?;
        if !is_html(response.headers()) {
            return Ok(response);
        }

        let page = response.text().await.map_err(|e| DownloadError::Transport {
            url: url.clone(),
            detail: e.to_string(),
        })?;
        let confirm = confirm_url(&page).ok_or_else(|| DownloadError::NotAFile {
            id: file_id.to_string(),
        })?;
        debug!("Following download confirmation for {}", file_id);

        let response = self.get(&confirm).await?;
        if is_html(response.headers()) {
            return Err(DownloadError::NotAFile {
                id: file_id.to_string(),
            });
        }
        Ok(response)
    }

    async fn save(
        &self,
        response: reqwest::Response,
        path: &Path,
    ) -> Result<(), DownloadError> {
        let url = response.url().to_string();
        let bytes = response.bytes().await.map_err(|e| DownloadError::Transport {
            url,
            detail: e.to_string(),
        })?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| DownloadError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!("Saved {} bytes → {}", bytes.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl DriveFetcher for GoogleDriveClient {
    async fn fetch_folder(&self, folder_id: &str, dest: &Path) -> Result<Vec<PathBuf>, DownloadError> {
        let url = format!("{}/embeddedfolderview?id={}", self.base_url, folder_id);
        info!("Listing drive folder {}", folder_id);
        let page = self
            .get(&url)
            .await?
            .text()
            .await
            .map_err(|e| DownloadError::Transport {
                url: url.clone(),
                detail: e.to_string(),
            })?;

        let entries = parse_folder_listing(&page);
        if entries.is_empty() && !page.contains("flip-entry") && !page.contains("folder-view") {
            return Err(DownloadError::Listing {
                id: folder_id.to_string(),
            });
        }

        let mut saved = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| !e.is_folder) {
            let path = dest.join(sanitize_file_name(&entry.title, &entry.id));
            let response = self.open_file(&entry.id).await?;
            self.save(response, &path).await?;
            saved.push(path);
        }
        info!("Downloaded {} files from folder {}", saved.len(), folder_id);
        Ok(saved)
    }

    async fn fetch_file(&self, file_id: &str, dest: &Path) -> Result<PathBuf, DownloadError> {
        info!("Downloading drive file {}", file_id);
        let response = self.open_file(file_id).await?;
        let name = disposition_file_name(response.headers())
            .filter(|n| has_image_extension(Path::new(n)))
            .map(|n| sanitize_file_name(&n, file_id))
            .unwrap_or_else(|| DEFAULT_SINGLE_FILE_NAME.to_string());
        let path = dest.join(name);
        self.save(response, &path).await?;
        Ok(path)
    }
}

// ── Page parsing ─────────────────────────────────────────────────────────

/// One entry of a public folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub id: String,
    pub title: String,
    /// Sub-folders are listed alongside files; they are not descended into.
    pub is_folder: bool,
}

/// Extract entries from an `embeddedfolderview` page.
pub fn parse_folder_listing(html: &str) -> Vec<FolderEntry> {
    FOLDER_ENTRY
        .captures_iter(html)
        .map(|c| FolderEntry {
            id: c[1].to_string(),
            is_folder: c[2].contains("/folders/"),
            title: unescape_html(c[3].trim()),
        })
        .collect()
}

/// Build the follow-up URL from Google's "can't scan for viruses" page.
pub fn confirm_url(html: &str) -> Option<String> {
    let action = FORM_ACTION.captures(html)?.get(1)?.as_str();
    let params: Vec<(String, String)> = HIDDEN_INPUT
        .captures_iter(html)
        .map(|c| (c[1].to_string(), unescape_html(&c[2])))
        .collect();
    Url::parse_with_params(&unescape_html(action), &params)
        .ok()
        .map(String::from)
}

fn disposition_file_name(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    DISPOSITION_NAME
        .captures(value)
        .map(|c| c[1].trim().to_string())
        .filter(|n| !n.is_empty())
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false)
}

fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
