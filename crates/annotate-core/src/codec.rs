//! Metadata codec
//!
//! Turns the raw `annotate` sub-key into an [`AnnotationRecord`] and back.
//!
//! # Decode
//! - missing key or `null` → `Ok(None)` (no record yet, not an error)
//! - wrong shape (missing fields, wrong field types, not an object) →
//!   `CodecError::Corrupt`; callers reset to an empty record
//! - another `schemaVersion` that still parses is accepted as-is
//!
//! # Encode
//! Size is measured in encoded UTF-8 bytes of the whole record, never in
//! characters, and compared against the configured ceiling.

use crate::config::EngineConfig;
use crate::error::CodecError;
use crate::record::{AnnotationBody, AnnotationRecord};
use crate::sections::SectionBook;
use serde_json::Value;

/// Encoded payload ready for the host
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRecord {
    /// JSON value written under the `annotate` sub-key
    pub value: Value,
    /// Encoded size in bytes
    pub size: usize,
}

/// Record (de)serializer with a size ceiling
#[derive(Debug, Clone)]
pub struct MetadataCodec {
    schema_version: String,
    ceiling: usize,
}

impl MetadataCodec {
    /// Create codec
    #[inline]
    #[must_use]
    pub fn new(schema_version: impl Into<String>, ceiling: usize) -> Self {
        Self {
            schema_version: schema_version.into(),
            ceiling,
        }
    }

    /// Create codec from engine config
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.schema_version.clone(), config.max_payload_bytes)
    }

    /// Byte ceiling
    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Schema tag this codec writes
    #[inline]
    #[must_use]
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Decode the `annotate` sub-key
    ///
    /// # Errors
    /// `CodecError::Corrupt` when a value is present but not a record
    pub fn decode(&self, raw: Option<&Value>) -> Result<Option<AnnotationRecord>, CodecError> {
        let raw = match raw {
            None | Some(Value::Null) => return Ok(None),
            Some(value @ Value::Object(_)) => value,
            Some(other) => {
                return Err(CodecError::Corrupt(format!(
                    "expected object, found {}",
                    json_kind(other)
                )))
            }
        };

        let mut record: AnnotationRecord = serde_json::from_value(raw.clone())
            .map_err(|e| CodecError::Corrupt(e.to_string()))?;

        if record.schema_version != self.schema_version {
            tracing::debug!(
                stored = %record.schema_version,
                current = %self.schema_version,
                "schema version differs, payload still parses"
            );
        }

        if let AnnotationBody::Sections { sections } = &mut record.body {
            let restored = SectionBook::from_sections(std::mem::take(sections).into_sections());
            *sections = restored;
        }

        Ok(Some(record))
    }

    /// Encoded size of a record in bytes
    ///
    /// # Errors
    /// `CodecError::Serialize` if the record cannot be serialized
    pub fn measure(&self, record: &AnnotationRecord) -> Result<usize, CodecError> {
        Ok(serde_json::to_vec(record)?.len())
    }

    /// Encode a record, enforcing the ceiling
    ///
    /// # Errors
    /// `CodecError::PayloadTooLarge` with the measured size and the ceiling
    pub fn encode(&self, record: &AnnotationRecord) -> Result<EncodedRecord, CodecError> {
        let bytes = serde_json::to_vec(record)?;
        let size = bytes.len();
        if size > self.ceiling {
            return Err(CodecError::PayloadTooLarge {
                size,
                ceiling: self.ceiling,
            });
        }
        let value = serde_json::from_slice(&bytes)?;
        Ok(EncodedRecord { value, size })
    }
}

impl Default for MetadataCodec {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
