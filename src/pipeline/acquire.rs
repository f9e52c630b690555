//! Turns a caller's filename-or-URL into a readable seed file in the uploads area.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::pipeline::artifacts::{remove_best_effort, unique_token};
use crate::pipeline::error::PipelineError;

const DEFAULT_DOWNLOAD_EXTENSION: &str = ".jpg";

/// Largest source accepted from a download or an upload.
pub const MAX_SOURCE_BYTES: u64 = 100 * 1024 * 1024;

const UPLOAD_EXTENSIONS: [&str; 10] = [
    "jpeg", "jpg", "png", "gif", "bmp", "webp", "svg", "tiff", "tif", "ico",
];

const CONTENT_TYPE_EXTENSIONS: [(&str, &str); 9] = [
    ("image/jpeg", ".jpg"),
    ("image/jpg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/bmp", ".bmp"),
    ("image/webp", ".webp"),
    ("image/svg+xml", ".svg"),
    ("image/tiff", ".tiff"),
    ("image/x-icon", ".ico"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Provenance {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "url")]
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub path: PathBuf,
    pub provenance: Provenance,
    pub original_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedResource {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("http client init failed: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("reading response body failed: {0}")]
    Body(String),
    #[error("response exceeds {0} bytes")]
    TooLarge(u64),
    #[error("storing download failed: {0}")]
    Store(String),
    #[error("download task did not complete: {0}")]
    Interrupted(String),
}

/// Blocking remote download.
pub trait RemoteFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> Result<FetchedResource, FetchError>;
}

/// A source written into the uploads area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSource {
    pub filename: String,
    pub path: PathBuf,
    pub original_name: String,
    pub size: u64,
    pub provenance: Provenance,
}

#[derive(Debug, Clone)]
pub struct HttpRemoteFetcher {
    timeout: Duration,
    max_bytes: u64,
}

impl HttpRemoteFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_bytes: MAX_SOURCE_BYTES,
        }
    }
}

impl RemoteFetcher for HttpRemoteFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedResource, FetchError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        let resp = client
            .get(url.as_str())
            .send()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if resp.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge(self.max_bytes));
        }
        let mut bytes = Vec::new();
        resp.take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| FetchError::Body(e.to_string()))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(FetchError::TooLarge(self.max_bytes));
        }
        Ok(FetchedResource {
            bytes,
            content_type,
        })
    }
}

#[derive(Clone)]
pub struct ResourceResolver {
    uploads_dir: PathBuf,
    fetcher: Arc<dyn RemoteFetcher>,
    max_bytes: u64,
}

impl ResourceResolver {
    pub fn new(uploads_dir: impl Into<PathBuf>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            fetcher,
            max_bytes: MAX_SOURCE_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub async fn resolve(&self, reference: &str) -> Result<ResolvedResource, PipelineError> {
        match remote_url(reference) {
            Some(url) => self.download(url).await,
            None => self.local(reference).map(|path| ResolvedResource {
                path,
                provenance: Provenance::Local,
                original_name: reference.to_string(),
            }),
        }
    }

    /// Existing upload named `name`; traversal attempts count as missing.
    pub fn local(&self, name: &str) -> Result<PathBuf, PipelineError> {
        let name = name.trim();
        if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(PipelineError::FileNotFound(name.to_string()));
        }
        let path = self.uploads_dir.join(name);
        if !path.is_file() {
            return Err(PipelineError::FileNotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Downloads `reference` into the uploads area; non-URLs are rejected.
    pub async fn import_remote(&self, reference: &str) -> Result<StoredSource, PipelineError> {
        let Some(url) = remote_url(reference) else {
            return Err(PipelineError::InvalidRequest(String::from(
                "url must be an absolute http(s) URL",
            )));
        };
        let original_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("downloaded_image")
            .to_string();
        let resolved = self.download(url).await?;
        let size = fs::metadata(&resolved.path).map(|m| m.len()).unwrap_or(0);
        Ok(StoredSource {
            filename: file_name_of(&resolved.path),
            path: resolved.path,
            original_name,
            size,
            provenance: Provenance::Remote,
        })
    }

    /// Writes caller-uploaded bytes as `{token}{ext}`, keeping the original
    /// extension. Only image extensions are accepted.
    pub fn store_upload(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredSource, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::InvalidRequest(String::from("uploaded file is empty")));
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(PipelineError::InvalidRequest(format!(
                "uploaded file exceeds {} bytes",
                self.max_bytes
            )));
        }
        let ext = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| UPLOAD_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| {
                PipelineError::InvalidRequest(format!(
                    "unsupported upload type '{original_name}'; expected one of {}",
                    UPLOAD_EXTENSIONS.join(", ")
                ))
            })?;

        let path = self.uploads_dir.join(format!("{}.{ext}", unique_token()));
        if let Err(err) = fs::write(&path, bytes) {
            remove_best_effort(&path);
            tracing::error!(path = %path.display(), error = %err, "storing upload failed");
            return Err(PipelineError::StorageFailed(err.to_string()));
        }
        tracing::info!(path = %path.display(), size = bytes.len(), "upload stored");
        Ok(StoredSource {
            filename: file_name_of(&path),
            path,
            original_name: original_name.to_string(),
            size: bytes.len() as u64,
            provenance: Provenance::Local,
        })
    }

    async fn download(&self, url: Url) -> Result<ResolvedResource, PipelineError> {
        let fetcher = Arc::clone(&self.fetcher);
        let uploads_dir = self.uploads_dir.clone();
        let original_name = url.to_string();
        tracing::info!(url = %url, "downloading remote image");

        let task_url = url.clone();
        let max_bytes = self.max_bytes;
        let stored = tokio::task::spawn_blocking(move || -> Result<PathBuf, FetchError> {
            let fetched = fetcher.fetch(&task_url)?;
            if fetched.bytes.len() as u64 > max_bytes {
                return Err(FetchError::TooLarge(max_bytes));
            }
            let ext = extension_from_url(&task_url)
                .or_else(|| {
                    fetched
                        .content_type
                        .as_deref()
                        .and_then(extension_for_content_type)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_EXTENSION.to_string());
            let path = uploads_dir.join(format!("downloaded_{}{ext}", unique_token()));
            if let Err(err) = fs::write(&path, &fetched.bytes) {
                remove_best_effort(&path);
                return Err(FetchError::Store(err.to_string()));
            }
            Ok(path)
        })
        .await
        .map_err(|e| FetchError::Interrupted(e.to_string()))
        .and_then(|inner| inner);

        match stored {
            Ok(path) => {
                tracing::info!(url = %url, path = %path.display(), "remote image stored");
                Ok(ResolvedResource {
                    path,
                    provenance: Provenance::Remote,
                    original_name,
                })
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "remote image download failed");
                Err(PipelineError::DownloadFailed {
                    url: original_name,
                    reason: err.to_string(),
                })
            }
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Syntactically valid `http(s)` URL with a host.
pub fn remote_url(reference: &str) -> Option<Url> {
    Url::parse(reference.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

fn extension_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let ext = Path::new(segment).extension()?.to_str()?;
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| format!(".{}", ext.to_ascii_lowercase()))
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(candidate, _)| *candidate == mime)
        .map(|(_, ext)| *ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct StubFetcher {
        result: Result<FetchedResource, FetchError>,
        seen: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn ok(content_type: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(FetchedResource {
                    bytes: b"remote".to_vec(),
                    content_type: content_type.map(str::to_string),
                }),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: FetchError) -> Arc<Self> {
            Arc::new(Self {
                result: Err(err),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl RemoteFetcher for StubFetcher {
        fn fetch(&self, url: &Url) -> Result<FetchedResource, FetchError> {
            self.seen
                .lock()
                .expect("stub fetcher mutex poisoned")
                .push(url.to_string());
            self.result.clone()
        }
    }

    fn uploads() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("acquire-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create uploads");
        dir
    }

    #[tokio::test]
    async fn local_file_resolves_with_local_provenance() {
        let dir = uploads();
        fs::write(dir.join("cat.jpg"), b"x").expect("write upload");
        let resolver = ResourceResolver::new(&dir, StubFetcher::ok(None));
        let resolved = resolver.resolve("cat.jpg").await.expect("local resolve");
        assert_eq!(resolved.provenance, Provenance::Local);
        assert_eq!(resolved.path, dir.join("cat.jpg"));
        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_and_traversal_names_are_not_found() {
        let dir = uploads();
        let resolver = ResourceResolver::new(&dir, StubFetcher::ok(None));
        for name in ["absent.png", "../etc/passwd", "sub/cat.jpg", "ftp://host/a.png"] {
            let err = resolver.resolve(name).await.expect_err("should be missing");
            assert!(matches!(err, PipelineError::FileNotFound(_)), "{name}");
        }
        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn remote_extension_prefers_url_path_then_content_type() {
        let dir = uploads();
        let fetcher = StubFetcher::ok(Some("image/png"));
        let resolver = ResourceResolver::new(&dir, fetcher.clone());
        let from_path = resolver
            .resolve("https://example.com/pics/photo.WEBP?size=large")
            .await
            .expect("remote resolve");
        assert_eq!(from_path.provenance, Provenance::Remote);
        assert!(from_path.path.to_string_lossy().ends_with(".webp"));

        let from_header = resolver
            .resolve("http://example.com/image")
            .await
            .expect("remote resolve");
        assert!(from_header.path.to_string_lossy().ends_with(".png"));
        let name = from_header
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        assert!(name.starts_with("downloaded_"));
        assert_eq!(fs::read(&from_header.path).expect("read download"), b"remote");
        assert_eq!(fetcher.seen.lock().expect("stub fetcher mutex poisoned").len(), 2);
        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_content_type_falls_back_to_jpg() {
        let dir = uploads();
        let resolver =
            ResourceResolver::new(&dir, StubFetcher::ok(Some("application/octet-stream")));
        let resolved = resolver
            .resolve("https://example.com/render")
            .await
            .expect("remote resolve");
        assert!(resolved.path.to_string_lossy().ends_with(".jpg"));
        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn fetch_failure_is_download_failed() {
        let dir = uploads();
        let resolver = ResourceResolver::new(&dir, StubFetcher::failing(FetchError::Status(404)));
        let err = resolver
            .resolve("https://example.com/a.png")
            .await
            .expect_err("download should fail");
        match err {
            PipelineError::DownloadFailed { reason, .. } => assert_eq!(reason, "HTTP 404"),
            other => panic!("unexpected error: {other:?}"),
        }
        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn oversized_download_fails_without_leaving_a_file() {
        let dir = uploads();
        let resolver = ResourceResolver::new(&dir, StubFetcher::ok(Some("image/png"))).with_max_bytes(3);
        let err = resolver
            .resolve("https://example.com/big.png")
            .await
            .expect_err("body larger than the cap");
        match err {
            PipelineError::DownloadFailed { reason, .. } => {
                assert_eq!(reason, "response exceeds 3 bytes")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs::read_dir(&dir).expect("read uploads").count(), 0);
        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn failed_store_leaves_no_partial_download() {
        let dir = uploads();
        let missing = dir.join("gone");
        let resolver = ResourceResolver::new(&missing, StubFetcher::ok(Some("image/png")));
        let err = resolver
            .resolve("https://example.com/a.png")
            .await
            .expect_err("uploads dir does not exist");
        assert!(matches!(err, PipelineError::DownloadFailed { .. }));
        assert!(!missing.exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn import_remote_reports_name_size_and_provenance() {
        let dir = uploads();
        let resolver = ResourceResolver::new(&dir, StubFetcher::ok(None));
        let stored = resolver
            .import_remote("https://example.com/pics/cat.png")
            .await
            .expect("import");
        assert_eq!(stored.original_name, "cat.png");
        assert_eq!(stored.size, 6);
        assert_eq!(stored.provenance, Provenance::Remote);
        assert!(stored.filename.starts_with("downloaded_"));
        assert_eq!(resolver.local(&stored.filename).expect("now local"), stored.path);

        let err = resolver
            .import_remote("cat.png")
            .await
            .expect_err("plain names are not URLs");
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn uploads_keep_image_extensions_only() {
        let dir = uploads();
        let resolver = ResourceResolver::new(&dir, StubFetcher::ok(None));
        let stored = resolver.store_upload("Holiday.JPG", b"jpeg-bytes").expect("store");
        assert!(stored.filename.ends_with(".jpg"));
        assert_eq!(stored.original_name, "Holiday.JPG");
        assert_eq!(stored.size, 10);
        assert_eq!(stored.provenance, Provenance::Local);
        assert_eq!(fs::read(&stored.path).expect("read upload"), b"jpeg-bytes");

        for (name, bytes) in [("notes.txt", &b"text"[..]), ("noext", &b"x"[..]), ("a.png", &b""[..])] {
            let err = resolver.store_upload(name, bytes).expect_err("rejected");
            assert!(matches!(err, PipelineError::InvalidRequest(_)), "{name}");
        }
        let capped = resolver.clone().with_max_bytes(2);
        assert!(capped.store_upload("a.png", b"abc").is_err());
        assert_eq!(fs::read_dir(&dir).expect("read uploads").count(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn content_type_table_ignores_parameters() {
        assert_eq!(
            extension_for_content_type("image/svg+xml; charset=utf-8"),
            Some(".svg")
        );
        assert_eq!(extension_for_content_type("IMAGE/JPEG"), Some(".jpg"));
        assert_eq!(extension_for_content_type("text/html"), None);
    }
}
