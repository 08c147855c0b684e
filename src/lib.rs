//! # edgequake-pdf-index
//!
//! Make the index and table-of-contents pages of a PDF clickable.
//!
//! Index pages list labels followed by page numbers, but in most scanned or
//! exported PDFs those numbers are plain text. This crate renders the chosen
//! pages, asks a vision model where each entry and its page number sit, and
//! writes a copy of the PDF with a `/Link` annotation over every entry that
//! jumps to the page it names.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    local file, upload or URL → shared bytes
//!  ├─ 2. Render   pdfium at 1.5× (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode   JPEG q80 → base64
//!  ├─ 4. Detect   one vision request per page, strictly in order
//!  ├─ 5. Parse    fenced / wrapped JSON → entries with 0–1000 boxes
//!  └─ 6. Export   lopdf: /Annot /Link + /GoTo [page /Fit]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_index::{IndexConfig, IndexSession, SourceDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY (or GOOGLE_API_KEY) once.
//!     let config = IndexConfig::from_env();
//!     let mut session = IndexSession::new(SourceDocument::from_path("book.pdf").await?);
//!
//!     let report = session.analyze(&config).await?;
//!     eprintln!("{} links on {} pages", report.stats.total_links, report.stats.succeeded_pages);
//!
//!     session.export_to(session.export_file_name()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-index` binary (clap + indicatif + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_pages, detect_rendered_pages, export_pdf, export_to_file, inspect, DetectionOutcome};
pub use config::{ErrorPolicy, IndexConfig, IndexConfigBuilder, PageSelection};
pub use error::{IndexError, PageError};
pub use output::{
    AnalysisReport, AnalysisStats, BoundingBox, DocumentInfo, ExportOutput, ExportStats, IndexLink, LinkId,
    LinkIdSequence, PageLinks, SkipReason, SkippedLink,
};
pub use pipeline::annotate::{export_indexed_pdf, map_to_page_rect, PageGeometry};
pub use pipeline::detect::{Detector, LlmVisionClient, PageDetection, VisionClient, VisionRequest, VisionResponse};
pub use pipeline::encode::PageImage;
pub use pipeline::input::{indexed_file_name, resolve_input, SourceDocument};
pub use pipeline::render::{pages_in_range, rasterize_pages, PageRasterizer, PdfiumRasterizer, RasterOutput};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::IndexSession;
pub use stream::{analyze_stream, PageStream};
