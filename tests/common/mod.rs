//! Shared fixtures: lopdf-built PDFs, a scripted vision client and a fake
//! rasteriser, so pipeline tests need neither pdfium nor the network.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_pdf_index::{
    pages_in_range, AnalysisProgressCallback, IndexError, PageImage, PageRasterizer, RasterOutput,
    SourceDocument, VisionClient, VisionRequest, VisionResponse,
};
use lopdf::{dictionary, Document, Object};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A PDF with `n` empty US Letter pages (MediaBox inherited from /Pages).
pub fn blank_pdf(n: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..n)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            })
            .into()
        })
        .collect();
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
    doc.save_to(&mut buf).expect("save fixture");
    buf
}

pub fn blank_source(n: usize) -> SourceDocument {
    SourceDocument::from_bytes("book.pdf", blank_pdf(n)).expect("fixture is a PDF")
}

/// Number of `/Annots` entries on `page` of `bytes`.
pub fn annotation_count(bytes: &[u8], page: u32) -> usize {
    let doc = Document::load_mem(bytes).expect("load output");
    let page_id = doc.get_pages()[&page];
    match doc.get_dictionary(page_id).expect("page dict").get(b"Annots") {
        Ok(Object::Array(a)) => a.len(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_array)
            .map(Vec::len)
            .unwrap_or(0),
        _ => 0,
    }
}

/// JSON for one entry.
pub fn entry(label: &str, target: i64, ymin: u32, xmin: u32, ymax: u32, xmax: u32) -> String {
    format!(
        r#"{{"label":"{label}","targetPage":{target},"ymin":{ymin},"xmin":{xmin},"ymax":{ymax},"xmax":{xmax}}}"#
    )
}

pub fn entries(items: &[String]) -> String {
    format!("[{}]", items.join(","))
}

/// Answers single-page requests from a per-page script.
///
/// `Ok(text)` is returned as the model's answer; `Err(msg)` as an API error.
/// Pages without a script answer `[]`.
#[derive(Default)]
pub struct ScriptedClient {
    script: HashMap<u32, Result<String, String>>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, page: u32, text: impl Into<String>) -> Self {
        self.script.insert(page, Ok(text.into()));
        self
    }

    pub fn fail(mut self, page: u32, message: impl Into<String>) -> Self {
        self.script.insert(page, Err(message.into()));
        self
    }

    /// Pages requested so far, in call order.
    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionClient for ScriptedClient {
    async fn generate(&self, request: VisionRequest<'_>) -> Result<VisionResponse, IndexError> {
        let page = request.images.first().map(|i| i.page).unwrap_or(0);
        self.calls.lock().unwrap().push(page);
        match self.script.get(&page) {
            Some(Ok(text)) => Ok(VisionResponse {
                text: text.clone(),
                input_tokens: 1000,
                output_tokens: 50,
            }),
            Some(Err(message)) => Err(IndexError::LlmApiError {
                message: message.clone(),
            }),
            None => Ok(VisionResponse {
                text: "[]".into(),
                ..Default::default()
            }),
        }
    }
}

/// Produces placeholder images for in-range pages and counts its calls.
#[derive(Default)]
pub struct FakeRasterizer {
    pub calls: AtomicUsize,
}

impl PageRasterizer for FakeRasterizer {
    fn rasterize(&self, pdf: &[u8], pages: &[u32]) -> Result<RasterOutput, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total = Document::load_mem(pdf)
            .map_err(|e| IndexError::CorruptPdf {
                detail: e.to_string(),
            })?
            .get_pages()
            .len();

        let mut out = RasterOutput::default();
        for page in pages_in_range(pages, total) {
            out.images.insert(
                page,
                PageImage {
                    page,
                    width: 918,
                    height: 1188,
                    jpeg_base64: String::new(),
                },
            );
        }
        Ok(out)
    }
}

/// Records every progress event as a line of text.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<String>>,
}

impl AnalysisProgressCallback for RecordingProgress {
    fn on_analysis_start(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("start {total_pages}"));
    }

    fn on_page_start(&self, current: usize, total: usize, page: u32) {
        self.events
            .lock()
            .unwrap()
            .push(format!("page {current}/{total} #{page}"));
    }

    fn on_page_error(&self, page: u32, _error: &str) {
        self.events.lock().unwrap().push(format!("error #{page}"));
    }

    fn on_analysis_complete(&self, total_pages: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total_pages}"));
    }
}
