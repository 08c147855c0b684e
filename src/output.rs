//! Data model shared by the detection, session and export stages.
//!
//! Bounding boxes live in the model's normalised space: 0–1000 on each axis,
//! origin at the top-left of the page image, y increasing downward. They are
//! only converted to PDF user space at export time, see
//! [`crate::pipeline::annotate::map_to_page_rect`].

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound of the normalised coordinate space.
pub const NORMALISED_MAX: f32 = 1000.0;

/// A box in normalised 0–1000 image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
}

impl BoundingBox {
    /// Build a box, clamping into `[0, 1000]` and ordering each min/max pair.
    pub fn normalised(ymin: f32, xmin: f32, ymax: f32, xmax: f32) -> Self {
        let clamp = |v: f32| {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, NORMALISED_MAX)
            }
        };
        let (ymin, ymax) = (clamp(ymin), clamp(ymax));
        let (xmin, xmax) = (clamp(xmin), clamp(xmax));
        Self {
            ymin: ymin.min(ymax),
            xmin: xmin.min(xmax),
            ymax: ymin.max(ymax),
            xmax: xmin.max(xmax),
        }
    }

    /// The whole page.
    pub fn full_page() -> Self {
        Self {
            ymin: 0.0,
            xmin: 0.0,
            ymax: NORMALISED_MAX,
            xmax: NORMALISED_MAX,
        }
    }
}

/// Identifier of one detected entry. Unique within one detection run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Self {
        LinkId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out [`LinkId`]s for one detection run.
///
/// The counter is shared by every page of the run, and the page number is
/// part of the id, so ids stay distinct even after pages from different runs
/// are combined in one [`PageLinks`].
#[derive(Debug, Default)]
pub struct LinkIdSequence {
    next: u64,
}

impl LinkIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_for(&mut self, page: u32) -> LinkId {
        let id = LinkId(format!("p{page}-{}", self.next));
        self.next += 1;
        id
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

/// One clickable index/TOC entry detected on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexLink {
    pub id: LinkId,
    pub label: String,
    /// 1-based page the entry points at, exactly as the model reported it.
    /// Not range-checked until export.
    pub target_page: i64,
    pub bbox: BoundingBox,
}

/// Per-document analysis state: page number → entries on that page.
///
/// Pages iterate in ascending order; entries keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageLinks {
    pages: BTreeMap<u32, Vec<IndexLink>>,
}

impl PageLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry of `page` with `links`. Never merges.
    ///
    /// Returns the entries that were previously stored for the page.
    pub fn replace_page(&mut self, page: u32, links: Vec<IndexLink>) -> Option<Vec<IndexLink>> {
        self.pages.insert(page, links)
    }

    pub fn remove_page(&mut self, page: u32) -> Option<Vec<IndexLink>> {
        self.pages.remove(&page)
    }

    pub fn get(&self, page: u32) -> Option<&[IndexLink]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    pub fn contains_page(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[IndexLink])> {
        self.pages.iter().map(|(p, links)| (*p, links.as_slice()))
    }

    pub fn page_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    /// Number of pages with stored results (including empty ones).
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn total_links(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl FromIterator<(u32, Vec<IndexLink>)> for PageLinks {
    fn from_iter<T: IntoIterator<Item = (u32, Vec<IndexLink>)>>(iter: T) -> Self {
        Self {
            pages: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<u32, Vec<IndexLink>>> for PageLinks {
    fn from(pages: BTreeMap<u32, Vec<IndexLink>>) -> Self {
        Self { pages }
    }
}

/// Result of a batch analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Successful pages only. A page that detected nothing maps to an empty list.
    pub links: PageLinks,
    /// Pages that could not be rendered or analysed.
    pub failures: Vec<PageError>,
    pub stats: AnalysisStats,
}

impl AnalysisReport {
    pub fn succeeded_pages(&self) -> Vec<u32> {
        self.links.page_numbers().collect()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.failures.iter().map(PageError::page).collect()
    }
}

/// Counters and timings for an analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages selected for analysis (after range filtering).
    pub selected_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub total_links: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub render_duration_ms: u64,
    pub detect_duration_ms: u64,
}

/// Basic facts about a document, available without a model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    pub page_count: usize,
    pub file_size: usize,
    pub pdf_version: String,
    pub encrypted: bool,
}

/// Why an entry was left out of the exported PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The page the entry sits on is not in the document.
    SourcePageOutOfRange,
    /// The page the entry points at is not in the document.
    TargetPageOutOfRange,
}

/// An entry that export did not turn into an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedLink {
    pub page: u32,
    pub id: LinkId,
    pub reason: SkipReason,
}

/// Counters for an export run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportStats {
    pub page_count: usize,
    pub written: usize,
    pub skipped: Vec<SkippedLink>,
}

/// A serialised, annotated PDF.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub stats: ExportStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, target: i64) -> IndexLink {
        IndexLink {
            id: LinkId(id.to_string()),
            label: format!("entry {id}"),
            target_page: target,
            bbox: BoundingBox::full_page(),
        }
    }

    #[test]
    fn replace_page_replaces_instead_of_merging() {
        let mut links = PageLinks::new();
        links.replace_page(3, vec![link("a", 1), link("b", 2)]);
        let previous = links.replace_page(3, vec![link("c", 9)]);

        assert_eq!(previous.map(|v| v.len()), Some(2));
        let now = links.get(3).expect("page 3 present");
        assert_eq!(now.len(), 1);
        assert_eq!(now[0].id.as_str(), "c");
    }

    #[test]
    fn total_links_counts_all_pages() {
        let links: PageLinks = vec![(1, vec![link("a", 2)]), (2, vec![]), (4, vec![link("b", 1), link("c", 3)])]
            .into_iter()
            .collect();
        assert_eq!(links.total_links(), 3);
        assert_eq!(links.page_count(), 3);
        assert_eq!(links.page_numbers().collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn id_sequence_is_unique_within_a_run() {
        let mut seq = LinkIdSequence::new();
        let a = seq.next_for(1);
        let b = seq.next_for(1);
        let c = seq.next_for(2);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a.as_str(), "p1-0");
        assert_eq!(c.as_str(), "p2-2");
        assert_eq!(seq.issued(), 3);
    }

    #[test]
    fn normalised_box_clamps_and_orders() {
        let b = BoundingBox::normalised(1200.0, 40.0, -5.0, 10.0);
        assert_eq!(b.ymin, 0.0);
        assert_eq!(b.ymax, 1000.0);
        assert_eq!(b.xmin, 10.0);
        assert_eq!(b.xmax, 40.0);
    }

    #[test]
    fn index_link_serialises_camel_case() {
        let json = serde_json::to_value(link("p1-0", 12)).expect("serialise");
        assert_eq!(json["targetPage"], 12);
        assert_eq!(json["id"], "p1-0");
    }
}
