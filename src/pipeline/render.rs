//! PDF rasterisation: render selected pages to JPEG [`PageImage`]s via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. [`rasterize_pages`] moves the whole batch onto Tokio's
//! blocking pool so the runtime's worker threads never stall.
//!
//! ## Failure model
//!
//! A page number outside the document is skipped without a trace in the
//! output. A page that fails to render or encode is logged and reported as a
//! [`PageError`], and the rest of the batch carries on. Only failures that
//! affect every page (no pdfium library, unreadable document) are fatal.

use crate::config::IndexConfig;
use crate::error::{IndexError, PageError};
use crate::pipeline::encode::{encode_page, PageImage};
use crate::pipeline::input::SourceDocument;
use pdfium_render::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Render scale applied to every page (1 PDF point → 1.5 px).
pub const RENDER_SCALE: f32 = 1.5;

/// Outcome of rasterising a batch of pages.
#[derive(Debug, Clone, Default)]
pub struct RasterOutput {
    /// Successfully rendered pages keyed by 1-indexed page number.
    pub images: BTreeMap<u32, PageImage>,
    /// Pages that were in range but could not be rendered or encoded.
    pub failures: Vec<PageError>,
}

/// Turns PDF pages into images. The seam between the pipeline and pdfium.
pub trait PageRasterizer: Send + Sync {
    /// Render `pages` (1-indexed) of the PDF in `pdf`.
    ///
    /// Out-of-range pages must be skipped, per-page failures reported in
    /// [`RasterOutput::failures`]. `Err` is reserved for failures that
    /// prevent rendering any page at all.
    fn rasterize(&self, pdf: &[u8], pages: &[u32]) -> Result<RasterOutput, IndexError>;
}

/// Default rasteriser backed by the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    lib_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }

    fn bind(&self) -> Result<Pdfium, IndexError> {
        bind_pdfium(self.lib_dir.as_deref())
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &[u8], pages: &[u32]) -> Result<RasterOutput, IndexError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| IndexError::corrupt(format!("{:?}", e)))?;

        let doc_pages = document.pages();
        let total_pages = doc_pages.len() as usize;
        info!("PDF loaded for rendering: {} pages", total_pages);

        let mut output = RasterOutput::default();

        for page_num in pages_in_range(pages, total_pages) {
            match render_one(&doc_pages, page_num) {
                Ok(image) => {
                    output.images.insert(page_num, image);
                }
                Err(e) => {
                    warn!("{}", e);
                    output.failures.push(e);
                }
            }
        }

        // `document` and `pdfium` drop here, releasing the pdfium handles
        // whatever happened to individual pages.
        Ok(output)
    }
}

/// The pages of `pages` that exist in a document of `total_pages` pages,
/// in request order. Everything else is dropped without an error.
pub fn pages_in_range(pages: &[u32], total_pages: usize) -> Vec<u32> {
    pages
        .iter()
        .copied()
        .filter(|&p| {
            let keep = p >= 1 && p as usize <= total_pages;
            if !keep {
                debug!("Skipping page {} (out of range, total={})", p, total_pages);
            }
            keep
        })
        .collect()
}

/// Render and encode one in-range page.
fn render_one(pages: &PdfPages, page_num: u32) -> Result<PageImage, PageError> {
    let page = pages
        .get((page_num - 1) as u16)
        .map_err(|e| PageError::RenderFailed {
            page: page_num,
            detail: format!("{:?}", e),
        })?;

    let width = (page.width().value * RENDER_SCALE).round() as i32;
    let height = (page.height().value * RENDER_SCALE).round() as i32;
    let render_config = PdfRenderConfig::new()
        .set_target_width(width.max(1))
        .set_target_height(height.max(1));

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| PageError::RenderFailed {
            page: page_num,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page_num,
        image.width(),
        image.height()
    );

    encode_page(page_num, &image).map_err(|e| PageError::EncodeFailed {
        page: page_num,
        detail: e.to_string(),
    })
}

/// Bind to pdfium: explicit directory first, then `./`, then the system path.
pub fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, IndexError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| IndexError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Resolve the rasteriser configured for this run.
pub fn resolve_rasterizer(config: &IndexConfig) -> Arc<dyn PageRasterizer> {
    match config.rasterizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(PdfiumRasterizer::new(config.pdfium_lib_dir.clone())),
    }
}

/// Rasterise `pages` of `source` on the blocking pool.
pub async fn rasterize_pages(
    rasterizer: Arc<dyn PageRasterizer>,
    source: &SourceDocument,
    pages: &[u32],
) -> Result<RasterOutput, IndexError> {
    let bytes = source.shared_bytes();
    let pages = pages.to_vec();

    tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes, &pages))
        .await
        .map_err(|e| IndexError::Internal(format!("Render task panicked: {}", e)))?
}

/// Number of pages in the document, read with lopdf (no pdfium needed).
pub fn page_count(source: &SourceDocument) -> Result<usize, IndexError> {
    let doc = lopdf::Document::load_mem(source.bytes()).map_err(IndexError::corrupt)?;
    Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRasterizer;

    impl PageRasterizer for FixedRasterizer {
        fn rasterize(&self, _pdf: &[u8], pages: &[u32]) -> Result<RasterOutput, IndexError> {
            let mut out = RasterOutput::default();
            for p in pages_in_range(pages, 2) {
                out.images.insert(
                    p,
                    PageImage {
                        page: p,
                        width: 1,
                        height: 1,
                        jpeg_base64: String::new(),
                    },
                );
            }
            Ok(out)
        }
    }

    #[test]
    fn out_of_range_pages_are_dropped() {
        assert_eq!(pages_in_range(&[0, 1, 2, 3], 2), vec![1, 2]);
        assert_eq!(pages_in_range(&[3, 1], 3), vec![3, 1]);
        assert_eq!(pages_in_range(&[u32::MAX, 5], 4), Vec::<u32>::new());
        assert!(pages_in_range(&[1], 0).is_empty());
    }

    #[test]
    fn configured_rasterizer_takes_precedence() {
        let config = IndexConfig::builder()
            .rasterizer(Arc::new(FixedRasterizer))
            .build()
            .unwrap();
        let r = resolve_rasterizer(&config);
        let out = r.rasterize(b"%PDF", &[0, 1, 2, 3]).unwrap();
        assert_eq!(out.images.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn rasterize_pages_runs_on_blocking_pool() {
        let doc = SourceDocument::from_bytes("a.pdf", b"%PDF-1.4\n".to_vec()).unwrap();
        let out = rasterize_pages(Arc::new(FixedRasterizer), &doc, &[2, 5])
            .await
            .unwrap();
        assert!(out.images.contains_key(&2));
        assert!(!out.images.contains_key(&5));
        assert!(out.failures.is_empty());
    }
}
