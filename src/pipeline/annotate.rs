//! Export: write detected entries into a copy of the PDF as `/Link`
//! annotations that jump to their target page.
//!
//! Each export parses the source bytes afresh with lopdf, so the session's
//! document is never touched and repeated exports are independent.

use crate::error::IndexError;
use crate::output::{
    BoundingBox, ExportOutput, ExportStats, IndexLink, PageLinks, SkipReason, SkippedLink,
    NORMALISED_MAX,
};
use lopdf::{dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Page size used when a page has no MediaBox anywhere in its tree (US Letter).
const FALLBACK_MEDIA_BOX: PageGeometry = PageGeometry {
    x0: 0.0,
    y0: 0.0,
    width: 612.0,
    height: 792.0,
};

/// A page's MediaBox as origin plus size, in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub x0: f32,
    pub y0: f32,
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    /// Geometry of a `[0 0 width height]` MediaBox.
    pub fn sized(width: f32, height: f32) -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            width,
            height,
        }
    }

    fn from_media_box(values: [f32; 4]) -> Self {
        let [ax, ay, bx, by] = values;
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            width: (bx - ax).abs(),
            height: (by - ay).abs(),
        }
    }
}

/// Map a normalised top-left box to a PDF `[x1 y1 x2 y2]` rect (bottom-left origin).
pub fn map_to_page_rect(bbox: &BoundingBox, page: &PageGeometry) -> [f32; 4] {
    let sx = page.width / NORMALISED_MAX;
    let sy = page.height / NORMALISED_MAX;
    [
        page.x0 + bbox.xmin * sx,
        page.y0 + page.height - bbox.ymax * sy,
        page.x0 + bbox.xmax * sx,
        page.y0 + page.height - bbox.ymin * sy,
    ]
}

/// Look `key` up on the page, then on its `/Parent` chain.
fn resolve_inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, IndexError> {
    let mut current = page_id;
    // Bounded walk; a malformed tree may contain a /Parent cycle.
    for _ in 0..64 {
        let dict = doc.get_dictionary(current).map_err(IndexError::corrupt)?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => return Ok(None),
        }
    }
    Err(IndexError::corrupt("page tree /Parent chain too deep"))
}

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, IndexError> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).map_err(IndexError::corrupt),
        other => Ok(other),
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f as f32),
        _ => None,
    }
}

/// MediaBox of a page, inherited from the page tree when needed.
pub fn page_geometry(doc: &Document, page_id: ObjectId) -> Result<PageGeometry, IndexError> {
    let Some(obj) = resolve_inherited(doc, page_id, b"MediaBox")? else {
        warn!("Page {:?} has no MediaBox; assuming US Letter", page_id);
        return Ok(FALLBACK_MEDIA_BOX);
    };
    let array = deref(doc, obj)?
        .as_array()
        .map_err(|e| IndexError::corrupt(format!("MediaBox is not an array: {e}")))?;

    let values: Vec<f32> = array
        .iter()
        .map(|o| deref(doc, o).ok().and_then(number))
        .collect::<Option<_>>()
        .ok_or_else(|| IndexError::corrupt("MediaBox has non-numeric entries"))?;
    let values: [f32; 4] = values
        .try_into()
        .map_err(|v: Vec<f32>| IndexError::corrupt(format!("MediaBox has {} entries", v.len())))?;

    Ok(PageGeometry::from_media_box(values))
}

/// Append `annot_id` to the page's `/Annots`, keeping existing entries.
fn append_annotation(doc: &mut Document, page_id: ObjectId, annot_id: ObjectId) -> Result<(), IndexError> {
    let existing = doc
        .get_dictionary(page_id)
        .map_err(IndexError::corrupt)?
        .get(b"Annots")
        .ok()
        .cloned();

    match existing {
        Some(Object::Reference(array_id)) => {
            doc.get_object_mut(array_id)
                .and_then(Object::as_array_mut)
                .map_err(|e| IndexError::corrupt(format!("/Annots {array_id:?}: {e}")))?
                .push(Object::Reference(annot_id));
        }
        Some(Object::Array(_)) => {
            let page = doc.get_dictionary_mut(page_id).map_err(IndexError::corrupt)?;
            if let Ok(Object::Array(annots)) = page.get_mut(b"Annots") {
                annots.push(Object::Reference(annot_id));
            }
        }
        _ => {
            let page = doc.get_dictionary_mut(page_id).map_err(IndexError::corrupt)?;
            page.set("Annots", vec![Object::Reference(annot_id)]);
        }
    }
    Ok(())
}

/// Add one link annotation on `page_id` jumping to `target_id`.
fn add_link(
    doc: &mut Document,
    page_id: ObjectId,
    target_id: ObjectId,
    rect: [f32; 4],
) -> Result<ObjectId, IndexError> {
    let action = dictionary! {
        "Type" => "Action",
        "S" => "GoTo",
        "D" => vec![Object::Reference(target_id), "Fit".into()],
    };
    let annot_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => rect.iter().map(|v| Object::Real((*v).into())).collect::<Vec<_>>(),
        "Border" => vec![0.into(), 0.into(), 0.into()],
        "A" => action,
    });
    append_annotation(doc, page_id, annot_id)?;
    Ok(annot_id)
}

fn target_of(link: &IndexLink, pages: &BTreeMap<u32, ObjectId>) -> Option<ObjectId> {
    u32::try_from(link.target_page)
        .ok()
        .and_then(|t| pages.get(&t).copied())
}

/// Write every entry of `links` into a fresh copy of `pdf` and serialise it.
///
/// Entries whose page or target page is not in the document are skipped and
/// listed in [`ExportStats::skipped`]; they never cause an error.
pub fn export_indexed_pdf(pdf: &[u8], links: &PageLinks) -> Result<ExportOutput, IndexError> {
    let mut doc = Document::load_mem(pdf).map_err(IndexError::corrupt)?;
    if doc.is_encrypted() {
        return Err(IndexError::EncryptedPdf);
    }

    let pages = doc.get_pages();
    let mut stats = ExportStats {
        page_count: pages.len(),
        ..Default::default()
    };

    for (page, entries) in links.iter() {
        let Some(&page_id) = pages.get(&page) else {
            debug!("Skipping {} entries on page {} (not in document)", entries.len(), page);
            stats.skipped.extend(entries.iter().map(|l| SkippedLink {
                page,
                id: l.id.clone(),
                reason: SkipReason::SourcePageOutOfRange,
            }));
            continue;
        };
        if entries.is_empty() {
            continue;
        }
        let geometry = page_geometry(&doc, page_id)?;

        for link in entries {
            let Some(target_id) = target_of(link, &pages) else {
                debug!(
                    "Skipping {} on page {}: target page {} out of range",
                    link.id, page, link.target_page
                );
                stats.skipped.push(SkippedLink {
                    page,
                    id: link.id.clone(),
                    reason: SkipReason::TargetPageOutOfRange,
                });
                continue;
            };
            let rect = map_to_page_rect(&link.bbox, &geometry);
            add_link(&mut doc, page_id, target_id, rect)?;
            stats.written += 1;
        }
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(IndexError::corrupt)?;
    info!(
        "Exported {} links ({} skipped), {} bytes",
        stats.written,
        stats.skipped.len(),
        bytes.len()
    );
    Ok(ExportOutput { bytes, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::LinkId;

    /// `n` letter pages. `annots` installs a pre-existing annotation on page 1:
    /// `Some(false)` as a direct array, `Some(true)` through an indirect array.
    fn fixture(n: usize, annots: Option<bool>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for i in 0..n {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            };
            if i == 0 {
                if let Some(indirect) = annots {
                    let existing = doc.add_object(dictionary! {
                        "Type" => "Annot",
                        "Subtype" => "Text",
                        "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
                    });
                    let array = vec![Object::Reference(existing)];
                    if indirect {
                        let array_id = doc.add_object(Object::Array(array));
                        page.set("Annots", array_id);
                    } else {
                        page.set("Annots", array);
                    }
                }
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => n as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn link(id: &str, target: i64) -> IndexLink {
        IndexLink {
            id: LinkId::new(id),
            label: id.to_string(),
            target_page: target,
            bbox: BoundingBox::normalised(100.0, 100.0, 150.0, 900.0),
        }
    }

    fn annots_of(bytes: &[u8], page: u32) -> Vec<Object> {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&page];
        let dict = doc.get_dictionary(page_id).unwrap();
        match dict.get(b"Annots") {
            Ok(Object::Array(a)) => a.clone(),
            Ok(Object::Reference(id)) => doc.get_object(*id).unwrap().as_array().unwrap().clone(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn full_box_maps_to_whole_page() {
        let r = map_to_page_rect(&BoundingBox::full_page(), &PageGeometry::sized(612.0, 792.0));
        assert_eq!(r, [0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn top_left_quadrant_maps_to_upper_left() {
        let b = BoundingBox::normalised(0.0, 0.0, 500.0, 500.0);
        let r = map_to_page_rect(&b, &PageGeometry::sized(600.0, 800.0));
        assert_eq!(r, [0.0, 400.0, 300.0, 800.0]);
    }

    #[test]
    fn mapping_honours_media_box_origin() {
        let g = PageGeometry::from_media_box([10.0, 20.0, 110.0, 220.0]);
        let r = map_to_page_rect(&BoundingBox::full_page(), &g);
        assert_eq!(r, [10.0, 20.0, 110.0, 220.0]);
    }

    #[test]
    fn inherited_media_box_is_found() {
        let doc = Document::load_mem(&fixture(1, None)).unwrap();
        let page_id = doc.get_pages()[&1];
        assert_eq!(page_geometry(&doc, page_id).unwrap(), PageGeometry::sized(612.0, 792.0));
    }

    #[test]
    fn writes_goto_link_with_fit_destination() {
        let pdf = fixture(3, None);
        let links: PageLinks = vec![(1, vec![link("p1-0", 3)])].into_iter().collect();
        let out = export_indexed_pdf(&pdf, &links).unwrap();
        assert_eq!(out.stats.written, 1);
        assert_eq!(out.stats.page_count, 3);

        let doc = Document::load_mem(&out.bytes).unwrap();
        let pages = doc.get_pages();
        let annots = annots_of(&out.bytes, 1);
        assert_eq!(annots.len(), 1);

        let annot = doc
            .get_dictionary(annots[0].as_reference().unwrap())
            .unwrap();
        assert_eq!(annot.get(b"Subtype").unwrap().as_name().unwrap(), b"Link");
        let border = annot.get(b"Border").unwrap().as_array().unwrap();
        assert_eq!(border.len(), 3);

        let action = annot.get(b"A").unwrap().as_dict().unwrap();
        assert_eq!(action.get(b"S").unwrap().as_name().unwrap(), b"GoTo");
        let dest = action.get(b"D").unwrap().as_array().unwrap();
        assert_eq!(dest[0].as_reference().unwrap(), pages[&3]);
        assert_eq!(dest[1].as_name().unwrap(), b"Fit");

        let rect: Vec<f32> = annot
            .get(b"Rect")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| number(o).unwrap())
            .collect();
        // xmin=100, ymin=100, xmax=900, ymax=150 on 612x792
        let expected = [61.2, 792.0 - 118.8, 550.8, 792.0 - 79.2];
        for (got, want) in rect.iter().zip(expected) {
            assert!((got - want).abs() < 0.01, "{rect:?}");
        }
    }

    #[test]
    fn existing_direct_annotations_are_kept() {
        let pdf = fixture(2, Some(false));
        let links: PageLinks = vec![(1, vec![link("p1-0", 2)])].into_iter().collect();
        let out = export_indexed_pdf(&pdf, &links).unwrap();
        assert_eq!(annots_of(&out.bytes, 1).len(), 2);
    }

    #[test]
    fn existing_indirect_annotations_are_kept() {
        let pdf = fixture(2, Some(true));
        let links: PageLinks = vec![(1, vec![link("p1-0", 2)])].into_iter().collect();
        let out = export_indexed_pdf(&pdf, &links).unwrap();
        assert_eq!(annots_of(&out.bytes, 1).len(), 2);
    }

    #[test]
    fn out_of_range_targets_are_skipped() {
        let pdf = fixture(3, None);
        let links: PageLinks = vec![(
            2,
            vec![link("zero", 0), link("neg", -1), link("past", 4), link("ok", 1)],
        )]
        .into_iter()
        .collect();
        let out = export_indexed_pdf(&pdf, &links).unwrap();

        assert_eq!(out.stats.written, 1);
        assert_eq!(out.stats.skipped.len(), 3);
        assert!(out
            .stats
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::TargetPageOutOfRange));
        assert_eq!(annots_of(&out.bytes, 2).len(), 1);
    }

    #[test]
    fn entries_on_missing_pages_are_skipped() {
        let pdf = fixture(1, None);
        let links: PageLinks = vec![(5, vec![link("p5-0", 1)])].into_iter().collect();
        let out = export_indexed_pdf(&pdf, &links).unwrap();
        assert_eq!(out.stats.written, 0);
        assert_eq!(out.stats.skipped[0].reason, SkipReason::SourcePageOutOfRange);
    }

    #[test]
    fn source_bytes_are_not_modified() {
        let pdf = fixture(2, None);
        let before = pdf.clone();
        let links: PageLinks = vec![(1, vec![link("a", 2)])].into_iter().collect();
        let first = export_indexed_pdf(&pdf, &links).unwrap();
        let second = export_indexed_pdf(&pdf, &links).unwrap();
        assert_eq!(pdf, before);
        assert_eq!(annots_of(&first.bytes, 1).len(), 1);
        assert_eq!(annots_of(&second.bytes, 1).len(), 1);
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let err = export_indexed_pdf(b"%PDF-1.4 nonsense", &PageLinks::new()).unwrap_err();
        assert!(matches!(err, IndexError::CorruptPdf { .. }));
    }
}
