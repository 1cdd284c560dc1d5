//! Error types for the annotation sync engine
//!
//! Provides error handling for:
//! - Payload decoding and size limits (codec)
//! - Section/note book edits
//! - Host reads and writes made on behalf of the active object
//! - Dropped writes whose selection went stale
//!
//! Nothing here is fatal: every failure leaves the engine in an empty,
//! read-only or last-cached state.

use crate::config::AnnotationVariant;
use crate::sections::{NoteId, SectionId};
use annotate_host::{HostError, ObjectId};

/// Errors from encoding or decoding the metadata payload
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload exists but does not have the record shape
    #[error("corrupt payload: {0}")]
    Corrupt(String),

    /// Encoded payload is over the byte ceiling
    #[error("payload too large: {size} bytes exceeds ceiling of {ceiling} bytes")]
    PayloadTooLarge {
        /// Encoded size in bytes
        size: usize,
        /// Configured ceiling in bytes
        ceiling: usize,
    },

    /// Record could not be serialized
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from section/note book edits
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SectionError {
    /// No section with this id
    #[error("unknown section: {0}")]
    UnknownSection(SectionId),

    /// No note with this id
    #[error("unknown note: {0}")]
    UnknownNote(NoteId),

    /// Position outside the sequence
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested position
        index: usize,
        /// Number of slots available
        len: usize,
    },

    /// Section names must contain visible text
    #[error("section name must not be empty")]
    EmptyName,
}

/// Why a read failed
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Host fetch failed
    #[error("host fetch failed: {0}")]
    Host(#[from] HostError),

    /// Stored payload is corrupt
    #[error("{0}")]
    Corrupt(#[from] CodecError),
}

/// Main sync engine error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Current user could not be resolved
    #[error("identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// Current user may not edit this object
    #[error("not an editor of {0}")]
    NotEditor(ObjectId),

    /// Nothing is selected for editing
    #[error("no single object is selected")]
    NoActiveObject,

    /// Metadata could not be read or decoded
    #[error("read failure on {object}: {source}")]
    ReadFailure {
        /// Object being read
        object: ObjectId,
        /// Underlying cause
        #[source]
        source: ReadError,
    },

    /// Host rejected the write
    #[error("write failure on {object}: {source}")]
    WriteFailure {
        /// Object being written
        object: ObjectId,
        /// Host rejection
        #[source]
        source: HostError,
    },

    /// Encoded payload is over the byte ceiling
    #[error("payload too large: {size} bytes exceeds ceiling of {ceiling} bytes")]
    PayloadTooLarge {
        /// Encoded size in bytes
        size: usize,
        /// Configured ceiling in bytes
        ceiling: usize,
    },

    /// Write dropped because selection moved away from its object
    #[error("stale write for {origin} dropped (active: {active:?})")]
    StaleSelectionGuard {
        /// Object the edit was made on
        origin: ObjectId,
        /// Object being edited when the write fired
        active: Option<ObjectId>,
    },

    /// Edit does not match the loaded record shape
    #[error("record is not a {expected:?} annotation")]
    VariantMismatch {
        /// Layout the edit needs
        expected: AnnotationVariant,
    },

    /// Section/note edit rejected
    #[error("section edit failed: {0}")]
    Section(#[from] SectionError),
}

impl SyncError {
    /// Create read failure for object
    pub fn read_failure(object: ObjectId, source: impl Into<ReadError>) -> Self {
        Self::ReadFailure {
            object,
            source: source.into(),
        }
    }

    /// Create write failure for object
    pub fn write_failure(object: ObjectId, source: HostError) -> Self {
        Self::WriteFailure { object, source }
    }

    /// Map a codec error raised while saving
    pub fn from_encode(object: ObjectId, error: CodecError) -> Self {
        match error {
            CodecError::PayloadTooLarge { size, ceiling } => Self::PayloadTooLarge { size, ceiling },
            other => Self::write_failure(object, HostError::Rejected(other.to_string())),
        }
    }

    /// Check if the stored payload was corrupt
    #[inline]
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::ReadFailure {
                source: ReadError::Corrupt(_),
                ..
            }
        )
    }

    /// Check if the user should see this error
    ///
    /// Stale-guard drops are logged only.
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::StaleSelectionGuard { .. })
    }

    /// Check if the user can fix this by editing and retrying
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge { .. } | Self::WriteFailure { .. } | Self::IdentityUnavailable(_)
        )
    }

    /// Short message for the dismissible notice
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::IdentityUnavailable(_) => {
                "Could not confirm your identity; annotations are read-only.".to_string()
            }
            Self::NotEditor(_) => "Only the creator of this item can edit its annotation.".to_string(),
            Self::NoActiveObject => "Select a single item to annotate it.".to_string(),
            Self::ReadFailure { source: ReadError::Corrupt(_), .. } => {
                "Stored annotation was unreadable and has been reset.".to_string()
            }
            Self::ReadFailure { .. } => "Could not load the annotation for this item.".to_string(),
            Self::WriteFailure { .. } => "Saving failed; your changes are kept but not saved.".to_string(),
            Self::PayloadTooLarge { size, ceiling } => {
                format!("Annotation is too long ({size} of {ceiling} bytes); shorten it to save.")
            }
            Self::StaleSelectionGuard { .. } => String::new(),
            Self::VariantMismatch { .. } => "This annotation uses a different layout.".to_string(),
            Self::Section(e) => e.to_string(),
        }
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_too_large_display() {
        let err = CodecError::PayloadTooLarge {
            size: 7000,
            ceiling: 6144,
        };
        assert_eq!(
            err.to_string(),
            "payload too large: 7000 bytes exceeds ceiling of 6144 bytes"
        );
    }

    #[test]
    fn encode_error_mapping() {
        let err = SyncError::from_encode(
            ObjectId::new("o-1"),
            CodecError::PayloadTooLarge {
                size: 9000,
                ceiling: 6144,
            },
        );
        assert!(matches!(
            err,
            SyncError::PayloadTooLarge {
                size: 9000,
                ceiling: 6144
            }
        ));
        assert!(err.is_retryable());
        assert!(err.user_message().contains("9000"));
    }

    #[test]
    fn corrupt_read_classification() {
        let err = SyncError::read_failure(ObjectId::new("o-1"), CodecError::Corrupt("bad".into()));
        assert!(err.is_corrupt());
        assert!(err.is_user_facing());

        let err = SyncError::read_failure(
            ObjectId::new("o-1"),
            HostError::Unavailable("offline".into()),
        );
        assert!(!err.is_corrupt());
    }

    #[test]
    fn stale_guard_is_not_user_facing() {
        let err = SyncError::StaleSelectionGuard {
            origin: ObjectId::new("a"),
            active: Some(ObjectId::new("b")),
        };
        assert!(!err.is_user_facing());
        assert!(err.user_message().is_empty());
    }

    #[test]
    fn section_error_conversion() {
        let err: SyncError = SectionError::EmptyName.into();
        assert!(matches!(err, SyncError::Section(SectionError::EmptyName)));
    }
}
