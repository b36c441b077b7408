//! Configuration types for batch image analysis and reporting.
//!
//! All batch behaviour is controlled through [`ReportConfig`], built via its
//! [`ReportConfigBuilder`]. One struct carries every knob so a config can be
//! shared between concurrent requests (it is cheap to clone) and logged as a
//! unit.
//!
//! The credential is deliberately *not* part of the config: it arrives with
//! each [`crate::process::BatchRequest`] so one server can serve many callers.

use crate::error::Img2ReportError;
use crate::pipeline::analyze::ImageAnalyzer;
use crate::pipeline::drive::DriveFetcher;
use crate::progress::ProgressCallback;
use crate::prompts::{DEFAULT_ANALYSIS_QUERY, DEFAULT_USER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default base URL of the vision-analysis service.
pub const DEFAULT_API_BASE_URL: &str = "https://api.dify.ai/v1";

/// Configuration for one or more batch runs.
///
/// # Example
/// ```rust
/// use edgequake_img2report::ReportConfig;
///
/// let config = ReportConfig::builder()
///     .thumbnail_max_width(160)
///     .analyze_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.thumbnail_max_width, 160);
/// ```
#[derive(Clone)]
pub struct ReportConfig {
    /// Base URL of the analysis service, without trailing slash.
    pub api_base_url: String,

    /// Instruction sent with every image.
    pub query: String,

    /// Opaque end-user identifier forwarded to the service.
    pub user: String,

    /// Where artifacts for cloud-drive sources are written. Default: the
    /// user's Downloads directory. Local-folder sources always write beside
    /// the source images.
    pub default_output_dir: PathBuf,

    /// Maximum thumbnail width in pixels. Default: 200.
    pub thumbnail_max_width: u32,

    /// Row sizing heuristic for the spreadsheet.
    pub layout: RowLayout,

    /// Timeout for the multipart upload call. Default: 60.
    pub upload_timeout_secs: u64,

    /// Timeout for the whole streamed analysis call. Default: 300.
    ///
    /// Streaming answers for detailed descriptions routinely take a minute
    /// or more, so this is far larger than the upload timeout.
    pub analyze_timeout_secs: u64,

    /// Timeout per cloud-drive download request. Default: 120.
    pub download_timeout_secs: u64,

    /// Pre-constructed analyzer. Takes precedence over the HTTP client built
    /// from the request credential.
    pub analyzer: Option<Arc<dyn ImageAnalyzer>>,

    /// Pre-constructed cloud-drive fetcher. Default: Google Drive over HTTPS.
    pub fetcher: Option<Arc<dyn DriveFetcher>>,

    /// Optional per-image progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            query: DEFAULT_ANALYSIS_QUERY.to_string(),
            user: DEFAULT_USER.to_string(),
            default_output_dir: default_downloads_dir(),
            thumbnail_max_width: 200,
            layout: RowLayout::default(),
            upload_timeout_secs: 60,
            analyze_timeout_secs: 300,
            download_timeout_secs: 120,
            analyzer: None,
            fetcher: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("api_base_url", &self.api_base_url)
            .field("user", &self.user)
            .field("default_output_dir", &self.default_output_dir)
            .field("thumbnail_max_width", &self.thumbnail_max_width)
            .field("layout", &self.layout)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("analyze_timeout_secs", &self.analyze_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("analyzer", &self.analyzer.as_ref().map(|_| "<dyn ImageAnalyzer>"))
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn DriveFetcher>"))
            .finish()
    }
}

impl ReportConfig {
    /// Create a new builder for `ReportConfig`.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder {
            config: Self::default(),
        }
    }
}

/// `~/Downloads`, or the platform equivalent.
fn default_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Builder for [`ReportConfig`].
#[derive(Debug)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.config.query = query.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    pub fn default_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.default_output_dir = dir.into();
        self
    }

    pub fn thumbnail_max_width(mut self, px: u32) -> Self {
        self.config.thumbnail_max_width = px.max(16);
        self
    }

    pub fn layout(mut self, layout: RowLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn analyze_timeout_secs(mut self, secs: u64) -> Self {
        self.config.analyze_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        self.config.analyzer = Some(analyzer);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn DriveFetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    /// Attach a progress callback that receives per-image events.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReportConfig, Img2ReportError> {
        let c = &self.config;
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(Img2ReportError::InvalidConfig(format!(
                "API base URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        if c.upload_timeout_secs == 0 || c.analyze_timeout_secs == 0 || c.download_timeout_secs == 0
        {
            return Err(Img2ReportError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        c.layout.validate()?;
        Ok(self.config)
    }
}

// ── Row sizing ───────────────────────────────────────────────────────────

/// Heuristic row sizing for the spreadsheet report.
///
/// Text height is estimated from character count alone: a fixed average
/// number of characters fits on one line of the analysis column. This is an
/// approximation, not text-layout measurement; proportional fonts, long words
/// and explicit newlines all make the real wrapped height differ.
///
/// ```text
/// lines       = chars / chars_per_line
/// text_height = clamp(lines * px_per_line, min_text_height, max_text_height)
/// row_height  = max(text_height, min_image_height)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowLayout {
    /// Average characters per wrapped line of the analysis column. Default: 30.
    pub chars_per_line: f64,
    /// Pixels per wrapped line. Default: 15.
    pub px_per_line: f64,
    /// Lower clamp for the text height. Default: 75.
    pub min_text_height: f64,
    /// Upper clamp for the text height. Default: 400.
    pub max_text_height: f64,
    /// Rows are never shorter than this, so thumbnails fit. Default: 200.
    pub min_image_height: f64,
}

impl Default for RowLayout {
    fn default() -> Self {
        Self {
            chars_per_line: 30.0,
            px_per_line: 15.0,
            min_text_height: 75.0,
            max_text_height: 400.0,
            min_image_height: 200.0,
        }
    }
}

impl RowLayout {
    /// Row height in pixels for an analysis text of `text_len` characters.
    pub fn row_height(&self, text_len: usize) -> f64 {
        let lines = text_len as f64 / self.chars_per_line;
        let text_height = (lines * self.px_per_line).clamp(self.min_text_height, self.max_text_height);
        text_height.max(self.min_image_height)
    }

    fn validate(&self) -> Result<(), Img2ReportError> {
        if self.chars_per_line <= 0.0 || self.px_per_line <= 0.0 {
            return Err(Img2ReportError::InvalidConfig(
                "chars_per_line and px_per_line must be positive".into(),
            ));
        }
        if self.min_text_height > self.max_text_height {
            return Err(Img2ReportError::InvalidConfig(format!(
                "min_text_height ({}) exceeds max_text_height ({})",
                self.min_text_height, self.max_text_height
            )));
        }
        if self.min_image_height <= 0.0 {
            return Err(Img2ReportError::InvalidConfig(
                "min_image_height must be positive".into(),
            ));
        }
        Ok(())
    }
}
