//! Error types for the edgequake-pdf-index library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`IndexError`] — **Fatal**: the operation cannot proceed at all
//!   (bad input file, missing credential, corrupt PDF). Returned as
//!   `Err(IndexError)` from the top-level `analyze*` / `export*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page could not be rendered or
//!   analysed, but the other pages are fine. Collected in
//!   [`crate::output::AnalysisReport::failures`] so callers can inspect
//!   partial success instead of losing the whole batch to one bad page.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf-index library.
#[derive(Debug, Error)]
pub enum IndexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The uploaded file declared a media type other than `application/pdf`.
    #[error("'{name}' has media type '{media_type}', expected application/pdf")]
    UnsupportedMediaType { name: String, media_type: String },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF object graph could not be parsed or rewritten.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// Encrypted PDFs cannot be annotated.
    #[error("PDF is encrypted; decrypt it first (e.g. qpdf --decrypt in.pdf out.pdf)")]
    EncryptedPdf,

    /// The page selection matched no page of the document.
    #[error("No page selected (document has {total} pages)")]
    NoPagesSelected { total: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide,\n\
or pass its directory with --pdfium-lib <DIR>.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Detection errors ──────────────────────────────────────────────────
    /// The vision service credential is absent. Raised before any network I/O.
    #[error("Missing credential for provider '{provider}'.\nSet {env_var} before starting.")]
    MissingCredential { provider: String, env_var: String },

    /// The provider factory could not build a client.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The vision model call failed.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// A page failed while the batch ran with [`crate::config::ErrorPolicy::FailFast`].
    #[error(transparent)]
    PageFailed(#[from] PageError),

    /// Every attempted page failed; nothing was detected.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the exported PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IndexError {
    pub(crate) fn corrupt(detail: impl std::fmt::Display) -> Self {
        IndexError::CorruptPdf {
            detail: detail.to_string(),
        }
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// The rendered bitmap could not be JPEG-encoded.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: u32, detail: String },

    /// The vision model call for this page failed.
    #[error("Page {page}: detection failed: {detail}")]
    DetectionFailed { page: u32, detail: String },
}

impl PageError {
    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> u32 {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::DetectionFailed { page, .. } => *page,
        }
    }
}
