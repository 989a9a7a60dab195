use crate::error::{DcError, Result};
use crate::statics;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt::Write as _;
use tracing::warn;

/// Represents a number that preserves the distinction between integers and reals for round-tripping.
/// The game writes `7` and `7.0` as different things and the diff reports the difference.
#[derive(Debug, Clone, PartialEq)]
pub enum DcNumber {
    I64(i64),
    U64(u64),
    F64(f64),
}

impl DcNumber {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DcNumber::I64(v) => Some(*v),
            DcNumber::U64(v) => i64::try_from(*v).ok(),
            DcNumber::F64(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            DcNumber::I64(v) => *v as f64,
            DcNumber::U64(v) => *v as f64,
            DcNumber::F64(v) => *v,
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, DcNumber::F64(_))
    }

    /// Integer value of the number, also for reals with no fractional part.
    pub fn integral(&self) -> Option<i128> {
        match self {
            DcNumber::I64(v) => Some(i128::from(*v)),
            DcNumber::U64(v) => Some(i128::from(*v)),
            DcNumber::F64(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e36 {
                    Some(*v as i128)
                } else {
                    None
                }
            }
        }
    }
}

impl Serialize for DcNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DcNumber::I64(v) => serializer.serialize_i64(*v),
            DcNumber::U64(v) => serializer.serialize_u64(*v),
            DcNumber::F64(v) => serializer.serialize_f64(*v),
        }
    }
}

/// Represents a value of a save document: the JSON data model with ordered objects.
#[derive(Debug, Clone, PartialEq)]
pub enum DcValue {
    Null,
    Bool(bool),
    Number(DcNumber),
    String(String),
    Array(Vec<DcValue>),
    Object(IndexMap<String, DcValue>),
}

/// Output layout for [`DcValue::write_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonStyle {
    /// Single line, no whitespace. The only form the game can read.
    Compact,
    /// Like `Compact` but object keys sorted recursively; used for hashing and multiset keys.
    Canonical,
    /// Indented, for user-facing exports.
    Pretty,
}

impl DcValue {
    pub fn empty_object() -> Self {
        DcValue::Object(IndexMap::new())
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, DcValue>> {
        match self {
            DcValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, DcValue>> {
        match self {
            DcValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DcValue]> {
        match self {
            DcValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<DcValue>> {
        match self {
            DcValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DcValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of the value. Reals count when they carry no fraction (`3.0`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DcValue::Number(n) => n.integral().and_then(|v| i64::try_from(v).ok()),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, DcValue::Object(_))
    }

    pub fn get(&self, key: &str) -> Option<&DcValue> {
        self.as_object().and_then(|m| m.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut DcValue> {
        self.as_object_mut().and_then(|m| m.get_mut(key))
    }

    /// Follow a dotted path (`judgeCounts.perfect`) through nested objects.
    pub fn get_path(&self, path: &str) -> Option<&DcValue> {
        path.split('.').try_fold(self, |cur, key| cur.get(key))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DcValue::Null => statics::EN_TYPE_NULL,
            DcValue::Bool(_) => statics::EN_TYPE_BOOL,
            DcValue::Number(n) if n.is_integer() => statics::EN_TYPE_INT,
            DcValue::Number(_) => statics::EN_TYPE_FLOAT,
            DcValue::String(_) => statics::EN_TYPE_STRING,
            DcValue::Array(_) => statics::EN_TYPE_ARRAY,
            DcValue::Object(_) => statics::EN_TYPE_OBJECT,
        }
    }

    /// Parse strict JSON. Object key order is kept as written.
    ///
    /// A `\uXXXX` escape naming an unpaired UTF-16 surrogate (the game truncating a string
    /// in the middle of an emoji) is read as U+FFFD instead of failing the whole document.
    pub fn parse_json(text: &str) -> Result<DcValue> {
        let err = match serde_json::from_str::<DcValue>(text) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        let Some(repaired) = replace_lone_surrogates(text) else {
            return Err(DcError::MalformedJson(err));
        };
        warn!("document has unpaired surrogate escapes; reading them as U+FFFD");
        serde_json::from_str::<DcValue>(&repaired).map_err(DcError::MalformedJson)
    }

    /// Single-line JSON without any whitespace, as the game writes it.
    pub fn to_json_compact(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out, 0, JsonStyle::Compact);
        out
    }

    /// Compact JSON with object keys sorted at every level.
    pub fn to_json_canonical(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out, 0, JsonStyle::Canonical);
        out
    }

    /// Indented JSON for exports and the editor. Never hand this to the game.
    pub fn to_json_pretty(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out, 0, JsonStyle::Pretty);
        out.push('\n');
        out
    }

    fn write_json(&self, out: &mut String, indent: usize, style: JsonStyle) {
        let pretty = style == JsonStyle::Pretty;
        match self {
            DcValue::Null => out.push_str("null"),
            DcValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            DcValue::Number(n) => n.write_json(out),
            DcValue::String(s) => write_escaped_string(out, s),
            DcValue::Array(values) => {
                out.push('[');
                if pretty && !values.is_empty() {
                    out.push('\n');
                }
                for (i, v) in values.iter().enumerate() {
                    if pretty {
                        out.push_str(&" ".repeat(indent + 4));
                    }
                    v.write_json(out, indent + 4, style);
                    if i + 1 != values.len() {
                        out.push(',');
                    }
                    if pretty {
                        out.push('\n');
                    }
                }
                if pretty && !values.is_empty() {
                    out.push_str(&" ".repeat(indent));
                }
                out.push(']');
            }
            DcValue::Object(map) => {
                let mut entries: Vec<(&String, &DcValue)> = map.iter().collect();
                if style == JsonStyle::Canonical {
                    entries.sort_by(|a, b| a.0.cmp(b.0));
                }

                out.push('{');
                if pretty && !entries.is_empty() {
                    out.push('\n');
                }
                let len = entries.len();
                for (i, (k, v)) in entries.into_iter().enumerate() {
                    if pretty {
                        out.push_str(&" ".repeat(indent + 4));
                    }
                    write_escaped_string(out, k);
                    out.push(':');
                    if pretty {
                        out.push(' ');
                    }
                    v.write_json(out, indent + 4, style);
                    if i + 1 != len {
                        out.push(',');
                    }
                    if pretty {
                        out.push('\n');
                    }
                }
                if pretty && len > 0 {
                    out.push_str(&" ".repeat(indent));
                }
                out.push('}');
            }
        }
    }
}

impl DcNumber {
    fn write_json(&self, out: &mut String) {
        match self {
            DcNumber::I64(v) => out.push_str(&v.to_string()),
            DcNumber::U64(v) => out.push_str(&v.to_string()),
            DcNumber::F64(v) => {
                // JSON has no spelling for NaN/Infinity; the game's own serializer writes null.
                if !v.is_finite() {
                    out.push_str("null");
                    return;
                }
                let mut buf = ryu::Buffer::new();
                out.push_str(buf.format_finite(*v));
            }
        }
    }
}

/// Rewrite unpaired surrogate escapes as `\ufffd`. `None` when there is nothing to rewrite.
fn replace_lone_surrogates(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        let Some(unit) = escaped_unit(bytes, i) else {
            // `\\`, `\"` and friends: skip the escaped character too.
            i += 2;
            continue;
        };
        let paired = (0xD800..=0xDBFF).contains(&unit)
            && escaped_unit(bytes, i + 6).is_some_and(|low| (0xDC00..=0xDFFF).contains(&low));
        match unit {
            _ if paired => i += 12,
            0xD800..=0xDFFF => {
                out.push_str(&text[copied..i]);
                out.push_str("\\ufffd");
                i += 6;
                copied = i;
            }
            _ => i += 6,
        }
    }
    if copied == 0 {
        return None;
    }
    out.push_str(&text[copied..]);
    Some(out)
}

/// Code unit of a `\uXXXX` escape starting at byte `at`.
fn escaped_unit(bytes: &[u8], at: usize) -> Option<u16> {
    let escape = bytes.get(at..at + 6)?;
    if escape[0] != b'\\' || escape[1] != b'u' || !escape[2..].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u16::from_str_radix(std::str::from_utf8(&escape[2..]).ok()?, 16).ok()
}

fn write_escaped_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                write!(out, "\\u{:04x}", c as u32).ok();
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

impl From<bool> for DcValue {
    fn from(v: bool) -> Self {
        DcValue::Bool(v)
    }
}

impl From<i64> for DcValue {
    fn from(v: i64) -> Self {
        DcValue::Number(DcNumber::I64(v))
    }
}

impl From<f64> for DcValue {
    fn from(v: f64) -> Self {
        DcValue::Number(DcNumber::F64(v))
    }
}

impl From<&str> for DcValue {
    fn from(v: &str) -> Self {
        DcValue::String(v.to_string())
    }
}

impl From<String> for DcValue {
    fn from(v: String) -> Self {
        DcValue::String(v)
    }
}

impl std::fmt::Display for DcValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_json_compact())
    }
}

impl Serialize for DcValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DcValue::Null => serializer.serialize_unit(),
            DcValue::Bool(v) => serializer.serialize_bool(*v),
            DcValue::Number(n) => n.serialize(serializer),
            DcValue::String(s) => serializer.serialize_str(s),
            DcValue::Array(values) => values.serialize(serializer),
            DcValue::Object(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DcValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> de::Visitor<'de> for ValueVisitor {
            type Value = DcValue;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a JSON value")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(DcValue::Null)
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(DcValue::Null)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
                Ok(DcValue::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                Ok(DcValue::Number(DcNumber::I64(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                // Keep small positives as I64 so `7` parsed and `7` built compare equal.
                match i64::try_from(v) {
                    Ok(v) => Ok(DcValue::Number(DcNumber::I64(v))),
                    Err(_) => Ok(DcValue::Number(DcNumber::U64(v))),
                }
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
                Ok(DcValue::Number(DcNumber::F64(v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(DcValue::String(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
                Ok(DcValue::String(v))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut values = Vec::new();
                while let Some(value) = seq.next_element::<DcValue>()? {
                    values.push(value);
                }
                Ok(DcValue::Array(values))
            }

            fn visit_map<A: de::MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut values = IndexMap::new();
                while let Some((key, value)) = map.next_entry::<String, DcValue>()? {
                    values.insert(key, value);
                }
                Ok(DcValue::Object(values))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
