//! Shared helpers for integration tests: image fixtures, fakes and a tiny
//! canned-response HTTP server.
#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_img2report::pipeline::drive::{DownloadError, DriveFetcher};
use edgequake_img2report::{ImageAnalyzer, ItemError};
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// Write a small solid-colour image; the format follows the extension.
pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb([30, 120, 200]))
        .save(&path)
        .expect("write fixture image");
    path
}

// ── Fake analyzer ────────────────────────────────────────────────────────────

/// Returns `"description of <name>"`, or fails for names listed in `fail`.
#[derive(Default)]
pub struct FakeAnalyzer {
    pub fail: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeAnalyzer {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            fail: names.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageAnalyzer for FakeAnalyzer {
    async fn analyze(&self, image_path: &Path) -> Result<String, ItemError> {
        let name = image_path.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(name.clone());
        if self.fail.contains(&name) {
            return Err(ItemError::Analyze {
                detail: "HTTP 500 Internal Server Error".into(),
            });
        }
        Ok(format!("description of {name}"))
    }
}

// ── Fake drive ───────────────────────────────────────────────────────────────

/// In-memory drive: writes the configured files, or fails, and remembers the
/// destination directory so tests can check it was removed afterwards.
#[derive(Default)]
pub struct FakeDrive {
    /// Names of the files a folder download produces.
    pub files: Vec<String>,
    pub fail: bool,
    pub last_dest: Mutex<Option<PathBuf>>,
}

impl FakeDrive {
    pub fn with_files(names: &[&str]) -> Self {
        Self {
            files: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn last_dest(&self) -> Option<PathBuf> {
        self.last_dest.lock().unwrap().clone()
    }

    fn remember(&self, dest: &Path) {
        *self.last_dest.lock().unwrap() = Some(dest.to_path_buf());
    }
}

#[async_trait]
impl DriveFetcher for FakeDrive {
    async fn fetch_folder(&self, folder_id: &str, dest: &Path) -> Result<Vec<PathBuf>, DownloadError> {
        self.remember(dest);
        if self.fail {
            return Err(DownloadError::Listing {
                id: folder_id.to_string(),
            });
        }
        Ok(self
            .files
            .iter()
            .map(|name| {
                if name.ends_with(".txt") {
                    let p = dest.join(name);
                    std::fs::write(&p, b"notes").unwrap();
                    p
                } else {
                    write_image(dest, name, 64, 48)
                }
            })
            .collect())
    }

    async fn fetch_file(&self, file_id: &str, dest: &Path) -> Result<PathBuf, DownloadError> {
        self.remember(dest);
        if self.fail {
            return Err(DownloadError::Http {
                url: format!("https://drive.google.com/uc?id={file_id}"),
                status: 404,
            });
        }
        Ok(write_image(dest, "downloaded_image.jpg", 64, 48))
    }
}

// ── Canned HTTP server ───────────────────────────────────────────────────────

/// A request as seen by [`CannedServer`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Canned {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: body.to_string().into_bytes(),
        }
    }

    pub fn text(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), content_type.into())],
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

type Responder = dyn Fn(&Recorded) -> Canned + Send + Sync;

/// One-response-per-connection HTTP/1.1 server on a loopback port.
pub struct CannedServer {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl CannedServer {
    pub async fn start(responder: impl Fn(&Recorded) -> Canned + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let log = Arc::clone(&log);
                let responder = Arc::clone(&responder);
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut socket).await else {
                        return;
                    };
                    let canned = responder(&request);
                    log.lock().unwrap().push(request);

                    let mut head = format!(
                        "HTTP/1.1 {} Canned\r\nContent-Length: {}\r\nConnection: close\r\n",
                        canned.status,
                        canned.body.len()
                    );
                    for (name, value) in &canned.headers {
                        head.push_str(&format!("{name}: {value}\r\n"));
                    }
                    head.push_str("\r\n");
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&canned.body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    loop {
        let done = if chunked {
            body.ends_with(b"0\r\n\r\n")
        } else {
            body.len() >= length
        };
        if done {
            break;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Recorded {
        method,
        target,
        headers,
        body,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
