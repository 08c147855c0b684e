//! Pipeline stages for detecting and linking index entries.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ detect ──▶ parse ─ ─ ▶ annotate
//! (path/URL) (pdfium)  (JPEG b64)  (VLM)    (JSON)      (lopdf, at export)
//! ```
//!
//! 1. [`input`]  — read the PDF into shared, immutable bytes
//! 2. [`render`] — rasterise selected pages at 1.5× on the blocking pool
//! 3. [`encode`] — JPEG-encode (q 80) and base64-wrap each page
//! 4. [`detect`] — one vision call per page (or one for several pages)
//! 5. [`parse`]  — tolerant JSON parsing of the model's answer
//! 6. [`annotate`] — write `/Link` annotations into a copy of the PDF

pub mod annotate;
pub mod detect;
pub mod encode;
pub mod input;
pub mod parse;
pub mod render;
