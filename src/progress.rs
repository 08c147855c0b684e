//! Progress-callback trait for per-page analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::IndexConfigBuilder::progress_callback`] to receive events
//! while the batch pipeline works through the selected pages.
//!
//! Pages are analysed one at a time in page order, so `on_page_start`
//! reports a `current/total` counter that only ever goes up.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_index::{AnalysisProgressCallback, IndexConfig};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl AnalysisProgressCallback for Printer {
//!     fn on_page_start(&self, current: usize, total: usize, page: u32) {
//!         eprintln!("[{current}/{total}] analysing page {page}");
//!     }
//! }
//!
//! let config = IndexConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the analysis pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once, after rasterisation, with the number of pages that will
    /// be sent to the model.
    fn on_analysis_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the model request for a page is sent.
    ///
    /// # Arguments
    /// * `current` — 1-based position of this page in the batch
    /// * `total`   — number of pages in the batch
    /// * `page`    — 1-indexed page number in the document
    fn on_page_start(&self, current: usize, total: usize, page: u32) {
        let _ = (current, total, page);
    }

    /// Called when a page was analysed.
    fn on_page_complete(&self, page: u32, link_count: usize) {
        let _ = (page, link_count);
    }

    /// Called when a page failed to render or to be analysed.
    fn on_page_error(&self, page: u32, error: &str) {
        let _ = (page, error);
    }

    /// Called once after every page has been attempted.
    fn on_analysis_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IndexConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
