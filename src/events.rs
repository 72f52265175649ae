//! Decoding of YM2151 register-write logs.
//!
//! Conversion engines emit event logs in slightly different JSON shapes:
//! times as numbers or numeric strings, register addresses and values as
//! integers, `0x`-prefixed hex strings or bare hex strings. This module
//! normalizes all of them into one canonical, ordered [`EventSequence`].
//!
//! Decoding is deliberately permissive: an element that cannot yield a
//! finite non-negative time plus a one-byte address and value is dropped
//! silently, and a log that is malformed at the top level decodes to an
//! empty sequence rather than an error. Callers distinguish "nothing to
//! render" only by checking [`EventSequence::is_empty`].

use serde_json::Value;

/// One timestamped write to the chip's register space.
///
/// Immutable once decoded. `time` is in seconds from the start of the log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterEvent {
    /// Event time in seconds (finite, non-negative).
    pub time: f64,
    /// Register address.
    pub address: u8,
    /// Register value.
    pub value: u8,
}

/// An ordered, finite sequence of register events.
///
/// Owned exclusively by the most recent successful conversion; replacing it
/// invalidates any audio or trace derived from the previous one. Source
/// order is preserved; events are never re-sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSequence {
    events: Vec<RegisterEvent>,
}

impl EventSequence {
    /// Build a sequence from already-validated events.
    pub fn from_events(events: Vec<RegisterEvent>) -> Self {
        Self { events }
    }

    /// Number of events in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if the sequence holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The events in source order.
    #[must_use]
    pub fn events(&self) -> &[RegisterEvent] {
        &self.events
    }

    /// Latest event time in seconds, or 0.0 for an empty sequence.
    #[must_use]
    pub fn max_time(&self) -> f64 {
        self.events.iter().map(|e| e.time).fold(0.0, f64::max)
    }

    /// Iterate over the events in source order.
    pub fn iter(&self) -> std::slice::Iter<'_, RegisterEvent> {
        self.events.iter()
    }

    /// Serialize back to the canonical log shape
    /// `{ "event_count": n, "events": [{ "time", "addr", "data" }] }`
    /// with `0x`-prefixed uppercase hex strings.
    #[must_use]
    pub fn encode(&self) -> Value {
        let events: Vec<Value> = self
            .events
            .iter()
            .map(|e| {
                serde_json::json!({
                    "time": e.time,
                    "addr": format!("0x{:02X}", e.address),
                    "data": format!("0x{:02X}", e.value),
                })
            })
            .collect();
        serde_json::json!({
            "event_count": self.events.len(),
            "events": events,
        })
    }
}

impl<'a> IntoIterator for &'a EventSequence {
    type Item = &'a RegisterEvent;
    type IntoIter = std::slice::Iter<'a, RegisterEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Decode a raw JSON log into an event sequence.
///
/// Top-level malformed input yields an empty sequence, not an error.
#[must_use]
pub fn decode(raw: &str) -> EventSequence {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => decode_value(&value),
        Err(_) => EventSequence::default(),
    }
}

/// Decode an already-parsed JSON value into an event sequence.
///
/// Iterates the `events` field if present and an array; anything else
/// (missing key, wrong type) yields an empty sequence.
#[must_use]
pub fn decode_value(json: &Value) -> EventSequence {
    let Some(raw_events) = json.get("events").and_then(Value::as_array) else {
        return EventSequence::default();
    };

    let events = raw_events.iter().filter_map(decode_event).collect();
    EventSequence { events }
}

/// Decode one raw event, or None if any field is unparsable.
fn decode_event(raw: &Value) -> Option<RegisterEvent> {
    let time = time_field(raw.get("time")?)?;
    let address = byte_field(raw.get("addr")?)?;
    let value = byte_field(raw.get("data")?)?;
    Some(RegisterEvent {
        time,
        address,
        value,
    })
}

/// Extract a finite non-negative time from a number or numeric string.
fn time_field(value: &Value) -> Option<f64> {
    let time = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (time.is_finite() && time >= 0.0).then_some(time)
}

/// Extract a one-byte register field from an integer or hex string.
///
/// Strings are interpreted as hex with or without a `0x` prefix, matching
/// the log convention (`"0x20"` and `"20"` both mean 32).
fn byte_field(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
            u8::from_str_radix(digits, 16).ok()
        }
        _ => None,
    }
}
