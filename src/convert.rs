//! Conversion engine seam.
//!
//! The SMF→YM2151 conversion engine is an external component; this module
//! defines the trait it is consumed through and the parser for its result
//! envelope: `{ "event_count": n, "events": [...] }` on success,
//! `{ "error": "..." }` on an engine-reported failure.

use serde::Deserialize;

use crate::events::{decode_value, EventSequence};
use crate::{PlayerError, Result};

/// External SMF→YM2151 conversion engine.
///
/// `attachment` is the normalized tone JSON as UTF-8 bytes, or empty for
/// the engine's default tones. The returned string is the raw JSON result
/// envelope; feed it to [`parse_conversion_result`].
pub trait SmfConverter: Send + Sync {
    /// Convert SMF bytes (plus tone attachment) into an event-log JSON string.
    fn convert(&self, midi: &[u8], attachment: &[u8]) -> Result<String>;
}

/// Recognized fields of the engine's result envelope.
#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    #[serde(default)]
    event_count: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// A parsed, decoded conversion result.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// Event count as reported by the engine, if present.
    pub event_count: Option<u64>,
    /// The decoded event sequence (may be empty).
    pub sequence: EventSequence,
    /// The engine output, reformatted for display.
    pub pretty_json: String,
}

/// Parse and decode the engine's result envelope.
///
/// An `{ "error": ... }` envelope becomes a `Conversion` error; output that
/// is not valid JSON at the top level becomes a `Decode` error (the caller
/// treats it as an empty render). Everything else is decoded permissively:
/// individual malformed events are dropped, not failed.
pub fn parse_conversion_result(raw: &str) -> Result<ConversionReport> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| PlayerError::Decode(e.to_string()))?;

    let envelope: ResultEnvelope =
        serde_json::from_value(value.clone()).unwrap_or(ResultEnvelope {
            event_count: None,
            error: None,
        });

    if let Some(message) = envelope.error {
        return Err(PlayerError::Conversion(message));
    }

    let sequence = decode_value(&value);
    let pretty_json = serde_json::to_string_pretty(&value)
        .map_err(|e| PlayerError::Decode(e.to_string()))?;

    Ok(ConversionReport {
        event_count: envelope.event_count,
        sequence,
        pretty_json,
    })
}
