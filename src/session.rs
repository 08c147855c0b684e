//! Per-document session: the loaded PDF plus the entries detected so far.

use crate::analyze::{analyze_pages, export_pdf, export_to_file};
use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::output::{AnalysisReport, ExportOutput, ExportStats, IndexLink, PageLinks};
use crate::pipeline::input::SourceDocument;
use std::path::Path;
use tracing::debug;

/// A loaded document and its analysis state.
///
/// Analysing a page again replaces that page's entries; it never merges them
/// with an earlier run. Exports always start from the original bytes.
#[derive(Debug, Clone)]
pub struct IndexSession {
    source: SourceDocument,
    links: PageLinks,
}

impl IndexSession {
    pub fn new(source: SourceDocument) -> Self {
        Self {
            source,
            links: PageLinks::new(),
        }
    }

    pub fn source(&self) -> &SourceDocument {
        &self.source
    }

    pub fn links(&self) -> &PageLinks {
        &self.links
    }

    /// Run the batch pipeline and store every page that succeeded.
    ///
    /// Pages that failed keep whatever they had before.
    pub async fn analyze(&mut self, config: &IndexConfig) -> Result<AnalysisReport, IndexError> {
        let report = analyze_pages(&self.source, config).await?;
        for (page, links) in report.links.iter() {
            if let Some(previous) = self.links.replace_page(page, links.to_vec()) {
                debug!("Page {}: replaced {} earlier entries", page, previous.len());
            }
        }
        Ok(report)
    }

    /// Replace the entries of one page (e.g. after manual correction).
    pub fn set_page_links(&mut self, page: u32, links: Vec<IndexLink>) {
        self.links.replace_page(page, links);
    }

    pub fn clear_page(&mut self, page: u32) -> Option<Vec<IndexLink>> {
        self.links.remove_page(page)
    }

    /// Annotated copy of the document, in memory.
    pub async fn export(&self) -> Result<ExportOutput, IndexError> {
        export_pdf(&self.source, &self.links).await
    }

    pub async fn export_to(&self, path: impl AsRef<Path>) -> Result<ExportStats, IndexError> {
        export_to_file(&self.source, &self.links, path).await
    }

    /// `<stem>_indexed.pdf`.
    pub fn export_file_name(&self) -> String {
        self.source.indexed_file_name()
    }
}
