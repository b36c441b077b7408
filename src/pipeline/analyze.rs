//! Remote image analysis: upload an image, then stream its description back.
//!
//! The service speaks a two-step protocol:
//!
//! 1. `POST {base}/files/upload` (multipart) → `{"id": "<upload_file_id>"}`
//! 2. `POST {base}/chat-messages` referencing that id with
//!    `response_mode: "streaming"` → newline-delimited JSON events, optionally
//!    prefixed with SSE `data: `.
//!
//! Only `agent_message` events carrying an `answer` contribute text; their
//! fragments are concatenated in receipt order with no separator. Heartbeats,
//! `message_end`, malformed lines and anything else are skipped silently.
//!
//! ## Failure model
//!
//! [`analyze_image`] never fails: a transport error or non-success status for
//! one image becomes an error-marker text in that image's
//! [`AnalysisResult`], and the batch moves on to the next image. There is a
//! single attempt per image.

use crate::config::ReportConfig;
use crate::error::{Img2ReportError, ItemError};
use crate::output::{display_name, AnalysisResult};
use crate::prompts::error_marker;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Event type whose `answer` fragments make up the analysis text.
pub const ANSWER_EVENT: &str = "agent_message";

/// Upper bound on how much of an error body is echoed into the marker text.
const MAX_ERROR_BODY: usize = 300;

/// Anything that can turn an image file into analysis text.
///
/// The HTTP implementation is [`DifyClient`]; tests and alternative
/// backends plug in through [`crate::config::ReportConfigBuilder::analyzer`].
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image_path: &Path) -> Result<String, ItemError>;
}

/// Analyse one image, converting any failure into an error-marker result.
pub async fn analyze_image(analyzer: &dyn ImageAnalyzer, image_path: &Path) -> AnalysisResult {
    let start = Instant::now();
    match analyzer.analyze(image_path).await {
        Ok(text) => {
            debug!(
                "{}: {} chars in {:?}",
                image_path.display(),
                text.chars().count(),
                start.elapsed()
            );
            AnalysisResult::new(image_path, text, None)
        }
        Err(e) => {
            warn!("{}: analysis failed: {}", image_path.display(), e);
            AnalysisResult::new(image_path, error_marker(&e), Some(e))
        }
    }
}

// ── HTTP client ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    inputs: serde_json::Map<String, serde_json::Value>,
    query: &'a str,
    response_mode: &'static str,
    conversation_id: &'static str,
    user: &'a str,
    files: [ChatFile<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatFile<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    transfer_method: &'static str,
    upload_file_id: &'a str,
}

/// Client for the upload + streaming chat API.
///
/// Holds the caller's credential; build one per request.
#[derive(Clone)]
pub struct DifyClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    query: String,
    user: String,
    upload_timeout: Duration,
    analyze_timeout: Duration,
}

impl std::fmt::Debug for DifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifyClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

impl DifyClient {
    pub fn new(api_key: impl Into<String>, config: &ReportConfig) -> Result<Self, Img2ReportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.upload_timeout_secs))
            .build()
            .map_err(|e| Img2ReportError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            api_key: api_key.into(),
            query: config.query.clone(),
            user: config.user.clone(),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            analyze_timeout: Duration::from_secs(config.analyze_timeout_secs),
        })
    }

    /// Upload the raw image bytes and return the service's file id.
    pub async fn upload(&self, image_path: &Path) -> Result<String, ItemError> {
        let bytes = tokio::fs::read(image_path).await.map_err(|e| ItemError::Upload {
            detail: format!("cannot read '{}': {e}", image_path.display()),
        })?;

        let part = Part::bytes(bytes)
            .file_name(display_name(image_path))
            .mime_str(mime_for_path(image_path))
            .map_err(|e| ItemError::Upload {
                detail: e.to_string(),
            })?;
        let form = Form::new().part("file", part).text("user", self.user.clone());

        let response = self
            .http
            .post(format!("{}/files/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(ItemError::Upload {
                detail: status_detail(response).await,
            });
        }

        let body: UploadResponse = response.json().await.map_err(|e| ItemError::Upload {
            detail: format!("unreadable upload response: {e}"),
        })?;
        body.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ItemError::Upload {
                detail: "upload response carried no file id".into(),
            })
    }

    /// Ask for an analysis of an uploaded file and aggregate the streamed answer.
    pub async fn analyze_upload(&self, upload_file_id: &str) -> Result<String, ItemError> {
        let payload = ChatRequest {
            inputs: serde_json::Map::new(),
            query: &self.query,
            response_mode: "streaming",
            conversation_id: "",
            user: &self.user,
            files: [ChatFile {
                kind: "image",
                transfer_method: "local_file",
                upload_file_id,
            }],
        };

        let response = self
            .http
            .post(format!("{}/chat-messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(self.analyze_timeout)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(ItemError::Analyze {
                detail: status_detail(response).await,
            });
        }

        let mut stream = response.bytes_stream();
        let mut aggregator = StreamAggregator::default();
        while let Some(chunk) = stream.next().await {
            aggregator.push(&chunk.map_err(transport)?);
        }
        Ok(aggregator.finish())
    }
}

#[async_trait]
impl ImageAnalyzer for DifyClient {
    async fn analyze(&self, image_path: &Path) -> Result<String, ItemError> {
        let file_id = self.upload(image_path).await?;
        debug!("{} uploaded as {}", image_path.display(), file_id);
        self.analyze_upload(&file_id).await
    }
}

fn transport(e: reqwest::Error) -> ItemError {
    let detail = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    ItemError::Transport { detail }
}

async fn status_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}

/// MIME type sent with the upload, from the file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

// ── Stream aggregation ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamEvent {
    event: Option<String>,
    answer: Option<String>,
}

/// Extract the answer fragment from one stream line, if it carries one.
pub fn parse_answer_fragment(line: &str) -> Option<String> {
    let line = line.trim();
    let line = line
        .strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    let event: StreamEvent = serde_json::from_str(line).ok()?;
    if event.event.as_deref() == Some(ANSWER_EVENT) {
        event.answer
    } else {
        None
    }
}

/// Incremental line splitter over arbitrary network chunks.
///
/// Chunks may split a line, or a multi-byte character, anywhere; bytes are
/// buffered until a newline arrives so decoding always sees whole lines.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    pending: Vec<u8>,
    text: String,
}

impl StreamAggregator {
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume(&line);
        }
    }

    /// Flush a trailing line without newline and return the aggregate text.
    pub fn finish(mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        self.consume(&rest);
        self.text
    }

    fn consume(&mut self, line: &[u8]) {
        if let Some(fragment) = parse_answer_fragment(&String::from_utf8_lossy(line)) {
            self.text.push_str(&fragment);
        }
    }
}
