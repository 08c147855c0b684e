//! Streaming analysis: emit each page's entries as soon as its request returns.
//!
//! Unlike [`crate::analyze::analyze_pages`], which returns only after every
//! page has been attempted, [`analyze_stream`] hands back a `Stream` right
//! after rasterisation. Requests are still made one at a time in page order;
//! the stream simply exposes each answer as it arrives.

use crate::analyze::{prepare, Prepared};
use crate::config::IndexConfig;
use crate::error::{IndexError, PageError};
use crate::pipeline::detect::PageDetection;
use crate::pipeline::input::SourceDocument;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-page outcomes.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageDetection, PageError>> + Send>>;

/// Analyse `source`, streaming pages as they are detected.
///
/// Pages that failed to render are yielded first, as `Err` items; rendered
/// pages follow in ascending page order. Dropping the stream stops further
/// requests.
///
/// # Errors
/// The same fatal errors as [`crate::analyze::analyze_pages`] raised before
/// the first request (missing credential, unreadable PDF, empty selection).
pub async fn analyze_stream(source: &SourceDocument, config: &IndexConfig) -> Result<PageStream, IndexError> {
    let Prepared {
        detector,
        raster,
        selected,
        ..
    } = prepare(source, config).await?;
    info!("Streaming analysis of {} pages", selected.len());

    let render_failures = stream::iter(raster.failures.into_iter().map(Err));
    let images = raster.images.into_values();

    let detections = stream::unfold((detector, images), |(mut detector, mut images)| async move {
        let image = images.next()?;
        let item = detector
            .detect(&image)
            .await
            .map_err(|e| PageError::DetectionFailed {
                page: image.page,
                detail: e.to_string(),
            });
        Some((item, (detector, images)))
    });

    Ok(Box::pin(render_failures.chain(detections)))
}
