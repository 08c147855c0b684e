//! Parsing of vision-model responses into [`IndexLink`]s.
//!
//! Models are asked for bare JSON but regularly wrap it in ` ```json ` fences
//! or an `{"entries": [...]}` object. Both are tolerated. Text that still
//! fails to parse yields an empty result with a warning, never an error, and
//! a single malformed entry is dropped without losing its siblings.

use crate::output::{BoundingBox, IndexLink, LinkIdSequence};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One entry exactly as the model reported it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    pub label: String,
    #[serde(deserialize_with = "integral")]
    pub target_page: i64,
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
}

impl RawEntry {
    pub fn into_link(self, page: u32, ids: &mut LinkIdSequence) -> IndexLink {
        IndexLink {
            id: ids.next_for(page),
            label: self.label,
            target_page: self.target_page,
            bbox: BoundingBox::normalised(self.ymin, self.xmin, self.ymax, self.xmax),
        }
    }
}

/// Accept `12` and `12.0` (some models emit floats for integer fields).
fn integral<'de, D: serde::Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = f64::deserialize(d)?;
    if v.fract() != 0.0 || !v.is_finite() {
        return Err(serde::de::Error::custom(format!("{v} is not an integer")));
    }
    Ok(v as i64)
}

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)\n?```").unwrap());

/// Body of the first fenced block, or the whole trimmed input when there is
/// none. Prose around the fence is discarded.
pub fn strip_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => trimmed,
    }
}

fn parse_value(text: &str) -> Option<Value> {
    let body = strip_fences(text);
    match serde_json::from_str::<Value>(body) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Unparseable model response ({}): {:.120}", e, body);
            None
        }
    }
}

/// Pull the entry array out of `[...]` or `{"entries": [...]}`.
fn entry_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("entries") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("Model response object has no `entries` array");
                Vec::new()
            }
        },
        other => {
            warn!("Unexpected model response shape: {}", other);
            Vec::new()
        }
    }
}

fn entries_from(items: Vec<Value>) -> Vec<RawEntry> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawEntry>(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Dropping malformed entry: {}", e);
                None
            }
        })
        .collect()
}

/// Parse a single-page response.
pub fn parse_entries(text: &str) -> Vec<RawEntry> {
    parse_value(text)
        .map(|v| entries_from(entry_array(v)))
        .unwrap_or_default()
}

/// Parse a multi-page response `[{pageNumber, entries}]`.
///
/// Pages listed more than once have their entries concatenated in order.
pub fn parse_batch(text: &str) -> BTreeMap<u32, Vec<RawEntry>> {
    let mut out: BTreeMap<u32, Vec<RawEntry>> = BTreeMap::new();
    let Some(value) = parse_value(text) else {
        return out;
    };
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("pages") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    for item in items {
        let page = item
            .get("pageNumber")
            .and_then(Value::as_u64)
            .and_then(|p| u32::try_from(p).ok());
        let Some(page) = page else {
            debug!("Dropping batch item without a valid pageNumber");
            continue;
        };
        let entries = item
            .get("entries")
            .cloned()
            .map(entry_array)
            .map(entries_from)
            .unwrap_or_default();
        out.entry(page).or_default().extend(entries);
    }
    out
}
