use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

pub type Document = IndexMap<String, StructuredValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object id `{0}`")]
pub struct ParseObjectIdError(String);

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.len() != 24 || !raw.is_ascii() {
            return Err(ParseObjectIdError(raw.to_string()));
        }

        let mut bytes = [0_u8; 12];
        for (index, byte) in bytes.iter_mut().enumerate() {
            let pair = &raw[index * 2..index * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| ParseObjectIdError(raw.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal(String),
    String(String),
    Binary(Vec<u8>),
    DateTime(DateTime<Utc>),
    ObjectId(ObjectId),
    MinValue,
    MaxValue,
    Array(Vec<StructuredValue>),
    Document(Document),
}

impl StructuredValue {
    #[must_use]
    pub fn is_document(&self) -> bool {
        matches!(self, Self::Document(_))
    }

    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(document) => Some(document),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
            Self::DateTime(_) => "datetime",
            Self::ObjectId(_) => "objectid",
            Self::MinValue => "minvalue",
            Self::MaxValue => "maxvalue",
            Self::Array(_) => "array",
            Self::Document(_) => "document",
        }
    }

    #[must_use]
    pub fn cell_text(&self) -> String {
        match self {
            Self::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for StructuredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

impl Serialize for StructuredValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Boolean(value) => serializer.serialize_bool(*value),
            Self::Int32(value) => serializer.serialize_i32(*value),
            Self::Int64(value) => tagged(serializer, "$numberLong", &value.to_string()),
            Self::Double(value) => serializer.serialize_f64(*value),
            Self::Decimal(value) => tagged(serializer, "$numberDecimal", value),
            Self::String(value) => serializer.serialize_str(value),
            Self::Binary(bytes) => tagged(serializer, "$binary", &BASE64.encode(bytes)),
            Self::DateTime(at) => tagged(
                serializer,
                "$date",
                &at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            Self::ObjectId(id) => tagged(serializer, "$oid", &id.to_string()),
            Self::MinValue => tagged(serializer, "$minValue", "1"),
            Self::MaxValue => tagged(serializer, "$maxValue", "1"),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Document(document) => {
                let mut map = serializer.serialize_map(Some(document.len()))?;
                for (key, value) in document {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

fn tagged<S: Serializer>(serializer: S, tag: &str, value: &str) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(tag, value)?;
    map.end()
}

impl From<JsonValue> for StructuredValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(value) => Self::Boolean(value),
            JsonValue::Number(number) => match number.as_i64() {
                Some(integer) => i32::try_from(integer).map_or(Self::Int64(integer), Self::Int32),
                None => Self::Double(number.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(text) => Self::String(text),
            JsonValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            JsonValue::Object(map) => extended_scalar(&map).unwrap_or_else(|| {
                Self::Document(
                    map.into_iter()
                        .map(|(key, value)| (key, Self::from(value)))
                        .collect(),
                )
            }),
        }
    }
}

fn extended_scalar(map: &JsonMap<String, JsonValue>) -> Option<StructuredValue> {
    if map.len() != 1 {
        return None;
    }
    let (tag, value) = map.iter().next()?;
    let text = value.as_str()?;
    match tag.as_str() {
        "$numberLong" => text.parse().ok().map(StructuredValue::Int64),
        "$numberDecimal" => Some(StructuredValue::Decimal(text.to_string())),
        "$binary" => BASE64.decode(text).ok().map(StructuredValue::Binary),
        "$date" => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|at| StructuredValue::DateTime(at.with_timezone(&Utc))),
        "$oid" => text.parse().ok().map(StructuredValue::ObjectId),
        "$minValue" => Some(StructuredValue::MinValue),
        "$maxValue" => Some(StructuredValue::MaxValue),
        _ => None,
    }
}

impl From<Document> for StructuredValue {
    fn from(document: Document) -> Self {
        Self::Document(document)
    }
}

impl From<&str> for StructuredValue {
    fn from(text: &str) -> Self {
        Self::String(text.to_string())
    }
}

impl From<String> for StructuredValue {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<i32> for StructuredValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<bool> for StructuredValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}
