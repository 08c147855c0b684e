//! Instructions and JSON schemas sent to the vision model.
//!
//! Keeping every prompt here means the detection rules can be read, tested
//! and changed in one place without touching request or parsing code in
//! [`crate::pipeline::detect`].

use serde_json::{json, Value};

/// Instruction for detecting index/TOC entries on a single page image.
pub const SINGLE_PAGE_INSTRUCTION: &str = r#"You are analysing one page of a book or report. Find every table-of-contents or index entry on the page: a text label followed by one or more page numbers it refers to.

Rules:

1. ONE ENTRY PER PAGE NUMBER
   - If a line lists several page numbers (e.g. "Bananas, 5, 8, 12"), output one entry per number.
   - Each of those entries must have the same label, its own targetPage, and a bounding box that encloses ONLY the digits of that number, not the whole line, so every number stays separately clickable.

2. SINGLE-NUMBER LINES
   - If a line has exactly one page number, the bounding box must enclose the WHOLE line: the label, any leader dots, and the number.

3. COORDINATES
   - ymin, xmin, ymax, xmax are integers from 0 to 1000, relative to the page image height (y) and width (x).
   - The origin is the top-left corner; y grows downward.

4. WHAT TO IGNORE
   - Running headers and footers, the page's own folio number, and body text that is not an index or contents entry.

5. OUTPUT FORMAT
   - Respond with JSON only, matching the provided schema.
   - Return an empty array if the page has no entries.
   - Do NOT add commentary."#;

/// Instruction for detecting entries on several page images in one request.
pub const BATCH_INSTRUCTION: &str = r#"You are analysing several pages of a book or report. The images are given in the order listed below, each labelled with its page number. For every page, find every table-of-contents or index entry: a text label followed by one or more page numbers it refers to.

Apply these rules on each page independently:

1. If a line lists several page numbers (e.g. "Bananas, 5, 8, 12"), output one entry per number, each with a bounding box enclosing ONLY that number's digits.
2. If a line has exactly one page number, its bounding box must enclose the WHOLE line: label, leader dots and number.
3. ymin, xmin, ymax, xmax are integers from 0 to 1000 relative to that page image; origin top-left, y grows downward.
4. Ignore running headers, footers and folio numbers.

Respond with JSON only, matching the provided schema: one object per page with its pageNumber and its entries (an empty array when the page has none). Do NOT add commentary."#;

/// Schema of one detected entry.
fn entry_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "label": { "type": "string" },
            "targetPage": { "type": "integer" },
            "ymin": { "type": "integer", "minimum": 0, "maximum": 1000 },
            "xmin": { "type": "integer", "minimum": 0, "maximum": 1000 },
            "ymax": { "type": "integer", "minimum": 0, "maximum": 1000 },
            "xmax": { "type": "integer", "minimum": 0, "maximum": 1000 }
        },
        "required": ["label", "targetPage", "ymin", "xmin", "ymax", "xmax"]
    })
}

/// Response schema for single-page detection: an array of entries.
pub fn single_page_schema() -> Value {
    json!({
        "type": "array",
        "items": entry_schema()
    })
}

/// Response schema for multi-page detection: `[{pageNumber, entries}]`.
pub fn batch_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "pageNumber": { "type": "integer" },
                "entries": {
                    "type": "array",
                    "items": entry_schema()
                }
            },
            "required": ["pageNumber", "entries"]
        }
    })
}

/// Text accompanying the images of a multi-page request.
pub fn batch_image_legend(pages: &[u32]) -> String {
    let list = pages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("image {} = page {}", i + 1, p))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Pages in this request: {list}.")
}
