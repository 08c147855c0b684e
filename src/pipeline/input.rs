//! Input resolution: turn a path, URL or upload into a [`SourceDocument`].
//!
//! The document is read into memory once and then shared read-only. Both the
//! rasteriser (pdfium) and the exporter (lopdf) open it from the same bytes,
//! each with its own parser, so neither can disturb the other. Every entry
//! point checks the `%PDF` magic before returning so callers get a meaningful
//! error instead of a parser failure deep in the pipeline.

use crate::error::IndexError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// The only media type accepted for uploads.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// An immutable PDF held in memory for the whole session.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    name: String,
    bytes: Arc<[u8]>,
}

impl SourceDocument {
    /// Wrap in-memory bytes. `name` is the file name shown to the user.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self, IndexError> {
        let name = name.into();
        let bytes: Vec<u8> = bytes.into();
        check_magic(&name, &bytes)?;
        Ok(Self {
            name,
            bytes: Arc::from(bytes),
        })
    }

    /// Accept an upload whose media type was declared by the client.
    pub fn from_upload(
        name: impl Into<String>,
        declared_media_type: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<Self, IndexError> {
        let name = name.into();
        let media_type = declared_media_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if media_type != PDF_MEDIA_TYPE {
            return Err(IndexError::UnsupportedMediaType {
                name,
                media_type: declared_media_type.to_string(),
            });
        }
        Self::from_bytes(name, bytes)
    }

    /// Read a local file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => IndexError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => IndexError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(file_name_of(path), bytes)
    }

    /// File name shown to the user (e.g. `book.pdf`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap handle to the bytes for moving into blocking tasks.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Name of the exported file: `<stem>_indexed.pdf`.
    pub fn indexed_file_name(&self) -> String {
        indexed_file_name(&self.name)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or HTTP(S) URL to a [`SourceDocument`].
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, IndexError> {
    if input.trim().is_empty() {
        return Err(IndexError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        SourceDocument::from_path(input).await
    }
}

/// `book.pdf` → `book_indexed.pdf`; names without a `.pdf` suffix keep their
/// full text as the stem.
pub fn indexed_file_name(original: &str) -> String {
    let split = original.len().checked_sub(4);
    let stem = match split.and_then(|i| original.get(i..).map(|ext| (i, ext))) {
        Some((i, ext)) if ext.eq_ignore_ascii_case(".pdf") => &original[..i],
        _ => original,
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{stem}_indexed.pdf")
}

fn check_magic(name: &str, bytes: &[u8]) -> Result<(), IndexError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(IndexError::NotAPdf {
            name: name.to_string(),
            magic,
        });
    }
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, IndexError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| IndexError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            IndexError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            IndexError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(IndexError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = filename_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| IndexError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes as {}", bytes.len(), name);
    SourceDocument::from_bytes(name, bytes.to_vec())
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

/// Default export path: `<stem>_indexed.pdf` next to `input` (or in the
/// current directory for URLs).
pub fn default_output_path(input: &str, doc: &SourceDocument) -> PathBuf {
    let file = doc.indexed_file_name();
    if is_url(input) {
        return PathBuf::from(file);
    }
    match Path::new(input).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file),
        _ => PathBuf::from(file),
    }
}
