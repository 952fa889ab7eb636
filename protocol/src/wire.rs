//! Line-oriented `key: value` framing.
//!
//! A frame is a sequence of `\n`-separated lines, each `key: value`. The
//! `message_type` line always comes first; `sequence_number` and `ack_number`
//! (when present) come next, in that order, ahead of all payload fields.
//! Structured values are serialized as JSON on a single line.

use serde_json::Value as Json;

use crate::message::MessageType;
use crate::ProtocolError;

/// Upper bound on the number of lines [`parse_header`] will scan.
pub const MAX_HEADER_LINES: usize = 5;

/// A decoded field value.
///
/// Values starting with `{` or `[` are parsed as JSON, numeric text becomes
/// an integer (or a float when it carries a fraction), everything else stays
/// a string. `message_type` is exempt from numeric interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Json(Json),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value, widening integers to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Json> {
        match self {
            FieldValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical wire text for this value.
    ///
    /// Floats that happen to be whole numbers keep a forced decimal point so
    /// they decode back as floats rather than integers.
    pub fn to_wire(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Int(n) => n.to_string(),
            FieldValue::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{:.1}", f),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Json(v) => v.to_string(),
        }
    }
}

/// Parse a raw value string into its typed form.
pub fn parse_value(raw: &str) -> FieldValue {
    if raw.starts_with('{') || raw.starts_with('[') {
        // Unparseable JSON falls back to the raw string.
        if let Ok(v) = serde_json::from_str::<Json>(raw) {
            return FieldValue::Json(v);
        }
        return FieldValue::Str(raw.to_string());
    }
    if let Ok(n) = raw.parse::<i64>() {
        return FieldValue::Int(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return FieldValue::Float(f);
    }
    FieldValue::Str(raw.to_string())
}

/// An ordered collection of decoded fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldValue)> {
        self.0.iter()
    }
}

/// Decode every line of a frame into typed fields.
///
/// Lines without a `:` are skipped; only the first `:` of a line separates
/// key from value, so values may themselves contain colons.
pub fn decode_fields(text: &str) -> Fields {
    let mut fields = Vec::new();
    for line in text.split('\n') {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = if key == "message_type" {
            FieldValue::Str(value.trim().to_string())
        } else {
            parse_value(value.trim())
        };
        fields.push((key.to_string(), value));
    }
    Fields(fields)
}

/// Append one `key: value` line to a frame under construction.
pub fn push_line(out: &mut String, key: &str, value: &FieldValue) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(key);
    out.push_str(": ");
    out.push_str(&value.to_wire());
}

/// The routing header of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub sequence_number: Option<u64>,
    pub ack_number: Option<u64>,
}

/// Scan only the leading lines of a frame for routing information.
///
/// Fails with [`ProtocolError::MalformedFrame`] when no `message_type` line
/// appears within the first [`MAX_HEADER_LINES`] lines.
pub fn parse_header(bytes: &[u8]) -> Result<Header, ProtocolError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ProtocolError::MalformedFrame("frame is not valid UTF-8".to_string()))?;

    let mut message_type = None;
    let mut sequence_number = None;
    let mut ack_number = None;

    for line in text.split('\n').take(MAX_HEADER_LINES) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "message_type" => {
                let tag = MessageType::parse(value)
                    .ok_or_else(|| ProtocolError::UnknownMessageType(value.to_string()))?;
                message_type = Some(tag);
            }
            "sequence_number" => sequence_number = value.parse::<u64>().ok(),
            "ack_number" => ack_number = value.parse::<u64>().ok(),
            _ => {}
        }
    }

    let message_type = message_type
        .ok_or_else(|| ProtocolError::MalformedFrame("missing message_type".to_string()))?;
    Ok(Header {
        message_type,
        sequence_number,
        ack_number,
    })
}
