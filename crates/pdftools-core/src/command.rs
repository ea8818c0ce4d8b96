//! Inbound worker messages
//!
//! One message starts one task. Messages are tagged by `type` and use the
//! camelCase field names the UI sends.

use serde::{Deserialize, Serialize};

use crate::error::PdfToolsError;
use crate::units::MeasurementUnit;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerCommand {
    Merge(MergeRequest),
    Decrypt(DecryptRequest),
}

impl WorkerCommand {
    /// Parse a JSON message, returning `None` for unknown or malformed ones
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(command) => Some(command),
            Err(e) => {
                tracing::debug!("Rejected inbound message: {}", e);
                None
            }
        }
    }
}

/// An uploaded file: raw bytes plus declared MIME type and name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// `bytes` is the field name the browser UI uses
    #[serde(with = "payload", alias = "bytes")]
    pub data: Vec<u8>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// A user-ordered reference into the file list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub id: PreviewId,
}

impl PreviewEntry {
    pub fn index(index: i64) -> Self {
        Self {
            id: PreviewId::Number(index as f64),
        }
    }
}

/// The UI sends ids as strings; numbers are accepted too
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreviewId {
    Number(f64),
    Text(String),
}

impl PreviewId {
    /// The integer index, read the way the UI reads it: leading
    /// whitespace and sign, then as many digits as are present
    pub fn index(&self) -> Option<i64> {
        match self {
            PreviewId::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            PreviewId::Number(_) => None,
            PreviewId::Text(s) => leading_integer(s),
        }
    }

    /// Resolve against a collection of `len` files
    pub fn resolve(&self, len: usize) -> Option<usize> {
        usize::try_from(self.index()?).ok().filter(|&i| i < len)
    }
}

fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let value = rest[..digits].parse::<i64>().ok()?;
    Some(if negative { -value } else { value })
}

impl std::fmt::Display for PreviewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index() {
            Some(n) => write!(f, "{}", n),
            None => f.write_str("NaN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleType {
    All,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleDimension {
    Width,
    Height,
}

/// Target page sizing for images and optional rescaling of PDF pages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleSpec {
    pub scale_type: ScaleType,
    pub scale_dimension: ScaleDimension,
    pub output_size: f64,
    pub output_size_unit: MeasurementUnit,
}

impl ScaleSpec {
    /// The anchored output dimension in PDF points
    pub fn target_points(&self) -> Result<f64, PdfToolsError> {
        if !self.output_size.is_finite() || self.output_size <= 0.0 {
            return Err(PdfToolsError::OperationError(format!(
                "Invalid output size {}",
                self.output_size
            )));
        }
        Ok(crate::units::to_points(
            self.output_size,
            self.output_size_unit,
        ))
    }
}

impl Default for ScaleSpec {
    fn default() -> Self {
        Self {
            scale_type: ScaleType::None,
            scale_dimension: ScaleDimension::Width,
            output_size: 210.0,
            output_size_unit: MeasurementUnit::Millimeter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub files: Vec<FileDescriptor>,
    pub files_preview: Vec<PreviewEntry>,
    #[serde(flatten)]
    pub scale: ScaleSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub file: FileDescriptor,
    #[serde(default)]
    pub password: Option<String>,
}

impl DecryptRequest {
    /// The password, treating an empty string as absent
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Byte payloads: base64 strings on the JSON wire, raw bytes from
/// binary-capable deserializers
pub(crate) mod payload {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_any(PayloadVisitor)
    }

    struct PayloadVisitor;

    impl<'de> Visitor<'de> for PayloadVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a base64 string or a byte array")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            STANDARD.decode(v).map_err(E::custom)
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(b) = seq.next_element::<u8>()? {
                bytes.push(b);
            }
            Ok(bytes)
        }
    }
}
