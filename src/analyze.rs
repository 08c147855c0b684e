//! Batch analysis and export entry points.
//!
//! [`analyze_pages`] resolves the vision client, rasterises every selected
//! page in one pass, then detects entries page by page, strictly in order and
//! one request at a time. Use [`crate::stream::analyze_stream`] to receive
//! pages as they finish instead.

use crate::config::{ErrorPolicy, IndexConfig};
use crate::error::{IndexError, PageError};
use crate::output::{AnalysisReport, AnalysisStats, DocumentInfo, ExportOutput, ExportStats, PageLinks};
use crate::pipeline::annotate::export_indexed_pdf;
use crate::pipeline::detect::{resolve_client, Detector};
use crate::pipeline::encode::PageImage;
use crate::pipeline::input::SourceDocument;
use crate::pipeline::render::{self, RasterOutput};
use crate::progress::ProgressCallback;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything needed before the first detection call.
pub(crate) struct Prepared {
    pub detector: Detector,
    pub raster: RasterOutput,
    pub total_pages: usize,
    pub selected: Vec<u32>,
    pub render_duration_ms: u64,
}

/// Resolve the client, select pages and rasterise them.
pub(crate) async fn prepare(source: &SourceDocument, config: &IndexConfig) -> Result<Prepared, IndexError> {
    // Credential first: no rendering work is wasted on a run that cannot finish.
    let client = resolve_client(config)?;

    let total_pages = render::page_count(source)?;
    let selected = config.pages.to_page_numbers(total_pages);
    if selected.is_empty() {
        return Err(IndexError::NoPagesSelected { total: total_pages });
    }
    debug!("Selected {} of {} pages", selected.len(), total_pages);

    let render_start = Instant::now();
    let rasterizer = render::resolve_rasterizer(config);
    let raster = render::rasterize_pages(rasterizer, source, &selected).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} pages in {}ms ({} failed)",
        raster.images.len(),
        render_duration_ms,
        raster.failures.len()
    );

    Ok(Prepared {
        detector: Detector::new(client),
        raster,
        total_pages,
        selected,
        render_duration_ms,
    })
}

/// Result of [`detect_rendered_pages`].
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub links: PageLinks,
    pub failures: Vec<PageError>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Detect entries on already-rendered pages, one request at a time in the
/// order given.
///
/// With [`ErrorPolicy::ContinueOnError`] a failed page is recorded in
/// [`DetectionOutcome::failures`] and the next page is attempted; with
/// [`ErrorPolicy::FailFast`] the first failure is returned.
pub async fn detect_rendered_pages(
    detector: &mut Detector,
    images: &[PageImage],
    policy: ErrorPolicy,
    progress: Option<&ProgressCallback>,
) -> Result<DetectionOutcome, IndexError> {
    let mut outcome = DetectionOutcome::default();
    let total = images.len();

    for (i, image) in images.iter().enumerate() {
        if let Some(cb) = progress {
            cb.on_page_start(i + 1, total, image.page);
        }

        match detector.detect(image).await {
            Ok(found) => {
                if let Some(cb) = progress {
                    cb.on_page_complete(image.page, found.links.len());
                }
                outcome.input_tokens += found.input_tokens as u64;
                outcome.output_tokens += found.output_tokens as u64;
                outcome.links.replace_page(image.page, found.links);
            }
            Err(e) => {
                let err = PageError::DetectionFailed {
                    page: image.page,
                    detail: e.to_string(),
                };
                warn!("{}", err);
                if let Some(cb) = progress {
                    cb.on_page_error(image.page, &err.to_string());
                }
                if policy == ErrorPolicy::FailFast {
                    return Err(err.into());
                }
                outcome.failures.push(err);
            }
        }
    }

    Ok(outcome)
}

/// Analyse the selected pages of `source`.
///
/// # Errors
/// Fatal errors only: missing credential, unreadable PDF, empty selection,
/// or every attempted page failing. Partial success is `Ok`, with the failed
/// pages listed in [`AnalysisReport::failures`].
pub async fn analyze_pages(source: &SourceDocument, config: &IndexConfig) -> Result<AnalysisReport, IndexError> {
    info!("Analysing {}", source.name());
    let Prepared {
        mut detector,
        raster,
        total_pages,
        selected,
        render_duration_ms,
    } = prepare(source, config).await?;
    let progress = config.progress_callback.as_ref();

    if let Some(cb) = progress {
        cb.on_analysis_start(selected.len());
    }
    // Every exit after `on_analysis_start` must close the progress display.
    let abort = |err: IndexError| {
        if let Some(cb) = progress {
            cb.on_analysis_complete(selected.len(), 0);
        }
        err
    };

    let mut failures = raster.failures;
    if let Some(first) = failures.first() {
        if config.error_policy == ErrorPolicy::FailFast {
            return Err(abort(first.clone().into()));
        }
        if let Some(cb) = progress {
            for f in &failures {
                cb.on_page_error(f.page(), &f.to_string());
            }
        }
    }

    let images: Vec<PageImage> = raster.images.into_values().collect();
    let detect_start = Instant::now();
    let outcome = detect_rendered_pages(&mut detector, &images, config.error_policy, progress)
        .await
        .map_err(abort)?;
    let detect_duration_ms = detect_start.elapsed().as_millis() as u64;

    failures.extend(outcome.failures);
    failures.sort_by_key(PageError::page);
    let links = outcome.links;

    if links.is_empty() {
        let first_error = failures
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "no page could be rendered".to_string());
        return Err(abort(IndexError::AllPagesFailed {
            total: selected.len(),
            first_error,
        }));
    }

    let stats = AnalysisStats {
        total_pages,
        selected_pages: selected.len(),
        succeeded_pages: links.page_count(),
        failed_pages: failures.len(),
        total_links: links.total_links(),
        total_input_tokens: outcome.input_tokens,
        total_output_tokens: outcome.output_tokens,
        render_duration_ms,
        detect_duration_ms,
    };

    info!(
        "Analysis complete: {}/{} pages, {} links",
        stats.succeeded_pages, stats.selected_pages, stats.total_links
    );
    if let Some(cb) = progress {
        cb.on_analysis_complete(selected.len(), stats.succeeded_pages);
    }

    Ok(AnalysisReport {
        links,
        failures,
        stats,
    })
}

/// Export `links` into a copy of `source` on the blocking pool.
pub async fn export_pdf(source: &SourceDocument, links: &PageLinks) -> Result<ExportOutput, IndexError> {
    let bytes = source.shared_bytes();
    let links = links.clone();
    tokio::task::spawn_blocking(move || export_indexed_pdf(&bytes, &links))
        .await
        .map_err(|e| IndexError::Internal(format!("Export task panicked: {}", e)))?
}

/// Export and write the result to `path`.
///
/// The file is written to a temporary sibling first and renamed into place,
/// so `path` never holds a partial PDF.
pub async fn export_to_file(
    source: &SourceDocument,
    links: &PageLinks,
    path: impl AsRef<Path>,
) -> Result<ExportStats, IndexError> {
    let output = export_pdf(source, links).await?;
    let path = path.as_ref().to_path_buf();
    let bytes = output.bytes;

    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .map_err(|e| IndexError::Internal(format!("Write task panicked: {}", e)))??;

    Ok(output.stats)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let fail = |source: std::io::Error| IndexError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Page count and header facts, without rendering or a model call.
pub fn inspect(source: &SourceDocument) -> Result<DocumentInfo, IndexError> {
    let doc = lopdf::Document::load_mem(source.bytes()).map_err(IndexError::corrupt)?;
    Ok(DocumentInfo {
        name: source.name().to_string(),
        page_count: doc.get_pages().len(),
        file_size: source.len(),
        pdf_version: doc.version.clone(),
        encrypted: doc.is_encrypted(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detect::{VisionClient, VisionRequest, VisionResponse};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoPage;

    #[async_trait]
    impl VisionClient for EchoPage {
        async fn generate(&self, req: VisionRequest<'_>) -> Result<VisionResponse, IndexError> {
            let page = req.images[0].page;
            if page == 2 {
                return Err(IndexError::LlmApiError {
                    message: "quota".into(),
                });
            }
            Ok(VisionResponse {
                text: format!(
                    r#"[{{"label":"p{page}","targetPage":{page},"ymin":0,"xmin":0,"ymax":10,"xmax":10}}]"#
                ),
                input_tokens: 100,
                output_tokens: 20,
            })
        }
    }

    fn images(pages: &[u32]) -> Vec<PageImage> {
        pages
            .iter()
            .map(|&page| PageImage {
                page,
                width: 1,
                height: 1,
                jpeg_base64: String::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn continue_on_error_keeps_other_pages() {
        let mut detector = Detector::new(Arc::new(EchoPage));
        let out = detect_rendered_pages(&mut detector, &images(&[1, 2, 3]), ErrorPolicy::ContinueOnError, None)
            .await
            .unwrap();
        assert_eq!(out.links.page_numbers().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].page(), 2);
        assert_eq!(out.input_tokens, 200);
    }

    #[tokio::test]
    async fn fail_fast_returns_first_error() {
        let mut detector = Detector::new(Arc::new(EchoPage));
        let err = detect_rendered_pages(&mut detector, &images(&[1, 2, 3]), ErrorPolicy::FailFast, None)
            .await
            .unwrap_err();
        match err {
            IndexError::PageFailed(p) => assert_eq!(p.page(), 2),
            other => panic!("expected PageFailed, got {other:?}"),
        }
    }

    #[test]
    fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("book_indexed.pdf");
        write_atomic(&path, b"%PDF-1.5").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.5");
    }
}
