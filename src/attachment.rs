//! Tone attachment validation and normalization.
//!
//! Attachments reach the conversion engine in one of three shapes: the
//! canonical `Tones` map, a flat `{ "events": [...] }` list, or a
//! `CompactTones` map of concatenated hex nibbles (4 hex chars per write:
//! 2 address + 2 value, all at time 0). Everything is validated and
//! normalized locally, so the engine only ever sees the canonical shape
//! and syntactically invalid JSON never crosses the boundary.

use serde_json::{Map, Value};

use crate::{PlayerError, Result};

/// Which recognized shape an attachment used, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentShape {
    /// Already canonical: a `Tones` map (or anything we pass through as-is).
    ToneMap,
    /// Flat top-level `events` array, wrapped into program 0.
    EventList,
    /// `CompactTones` nibble strings, expanded into event arrays.
    CompactNibbles,
}

/// Outcome of attachment normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAttachment {
    /// Canonical JSON text, pretty-printed.
    pub text: String,
    /// The shape the input arrived in.
    pub shape: AttachmentShape,
}

/// Normalize attachment text into the canonical `Tones` shape.
///
/// Returns `Ok(None)` for blank input ("use default tones": the engine
/// gets an empty byte attachment). Syntactically invalid JSON and
/// malformed compact strings are rejected with `InvalidAttachment`
/// locally, without calling the engine.
pub fn normalize(text: &str) -> Result<Option<NormalizedAttachment>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed: Value = serde_json::from_str(trimmed)
        .map_err(|e| PlayerError::InvalidAttachment(e.to_string()))?;
    let Value::Object(mut root) = parsed else {
        return Err(PlayerError::InvalidAttachment(
            "attachment must be a JSON object".into(),
        ));
    };

    let mut shape = AttachmentShape::ToneMap;

    // Flat event list: wrap into program 0 of the tone map.
    if let Some(events) = root.get("events").filter(|v| v.is_array()).cloned() {
        let tones = tones_map(&mut root);
        tones.insert("0".to_string(), serde_json::json!({ "events": events }));
        root.remove("events");
        root.remove("event_count");
        shape = AttachmentShape::EventList;
    }

    // Compact nibble strings: expand each program's hex string.
    if let Some(Value::Object(compact)) = root.remove("CompactTones") {
        let expanded: Result<Vec<(String, Value)>> = compact
            .into_iter()
            .map(|(program, value)| {
                let Value::String(nibbles) = value else {
                    return Err(PlayerError::InvalidAttachment(
                        "CompactTones values must be hex strings".into(),
                    ));
                };
                let events = expand_compact(&nibbles)?;
                Ok((program, serde_json::json!({ "events": events })))
            })
            .collect();
        let tones = tones_map(&mut root);
        for (program, tone) in expanded? {
            tones.insert(program, tone);
        }
        shape = AttachmentShape::CompactNibbles;
    }

    let text = serde_json::to_string_pretty(&Value::Object(root))
        .map_err(|e| PlayerError::InvalidAttachment(e.to_string()))?;
    Ok(Some(NormalizedAttachment { text, shape }))
}

/// Normalize and encode as the byte attachment handed to the engine.
///
/// Blank input yields an empty byte vector.
pub fn attachment_bytes(text: &str) -> Result<Vec<u8>> {
    Ok(match normalize(text)? {
        Some(normalized) => normalized.text.into_bytes(),
        None => Vec::new(),
    })
}

/// Get (or create) the mutable `Tones` object of the root.
fn tones_map(root: &mut Map<String, Value>) -> &mut Map<String, Value> {
    let entry = root
        .entry("Tones".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    entry.as_object_mut().expect("just ensured an object")
}

/// Expand a compact nibble string into register events.
///
/// 4 hex chars per write: 2 address nibbles, 2 value nibbles, time 0.
/// Whitespace is ignored; length must be a multiple of 4.
fn expand_compact(compact: &str) -> Result<Vec<Value>> {
    let cleaned: String = compact.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }
    if cleaned.len() % 4 != 0 {
        return Err(PlayerError::InvalidAttachment(
            "CompactTones length must be a multiple of 4".into(),
        ));
    }
    if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PlayerError::InvalidAttachment(
            "CompactTones contains non-hex characters".into(),
        ));
    }

    let bytes = cleaned.as_bytes();
    let mut events = Vec::with_capacity(cleaned.len() / 4);
    for chunk in bytes.chunks(4) {
        let addr = std::str::from_utf8(&chunk[..2]).expect("ascii hex");
        let data = std::str::from_utf8(&chunk[2..]).expect("ascii hex");
        events.push(serde_json::json!({
            "time": 0,
            "addr": format!("0x{}", addr.to_uppercase()),
            "data": format!("0x{}", data.to_uppercase()),
        }));
    }
    Ok(events)
}
