//! The annotation record stored under the `annotate` sub-key
//!
//! Wire shape (camelCase):
//!
//! ```text
//! { "schemaVersion": "1.0.0", "content": "<p>..</p>", "updatedAt": 1700000000000, "authorId": "u-1" }
//! { "schemaVersion": "1.0.0", "sections": [ .. ],    "updatedAt": 1700000000000, "authorId": null }
//! ```

use crate::config::AnnotationVariant;
use crate::sections::SectionBook;
use crate::text::{is_present, plain_text_len};
use annotate_host::UserId;
use serde::{Deserialize, Serialize};

/// Annotation payload body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationBody {
    /// One opaque rich-text body
    Text {
        /// Serialized rich text
        content: String,
    },
    /// Ordered sections of notes
    Sections {
        /// The note book
        sections: SectionBook,
    },
}

impl AnnotationBody {
    /// Layout this body uses
    #[must_use]
    pub fn variant(&self) -> AnnotationVariant {
        match self {
            Self::Text { .. } => AnnotationVariant::Single,
            Self::Sections { .. } => AnnotationVariant::Sections,
        }
    }
}

/// Annotation attached to one canvas object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    /// Schema tag
    pub schema_version: String,
    /// Payload
    #[serde(flatten)]
    pub body: AnnotationBody,
    /// Last committed edit, epoch milliseconds
    pub updated_at: i64,
    /// Author of the last committed edit
    #[serde(default)]
    pub author_id: Option<UserId>,
}

impl AnnotationRecord {
    /// Record with no content in the given layout
    #[must_use]
    pub fn empty(variant: AnnotationVariant, schema_version: impl Into<String>) -> Self {
        let body = match variant {
            AnnotationVariant::Single => AnnotationBody::Text {
                content: String::new(),
            },
            AnnotationVariant::Sections => AnnotationBody::Sections {
                sections: SectionBook::new(),
            },
        };
        Self {
            schema_version: schema_version.into(),
            body,
            updated_at: 0,
            author_id: None,
        }
    }

    /// Single-body record
    #[must_use]
    pub fn text(schema_version: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            body: AnnotationBody::Text {
                content: content.into(),
            },
            updated_at: 0,
            author_id: None,
        }
    }

    /// Rich-text body, for the single layout
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match &self.body {
            AnnotationBody::Text { content } => Some(content),
            AnnotationBody::Sections { .. } => None,
        }
    }

    /// Note book, for the sections layout
    #[must_use]
    pub fn sections(&self) -> Option<&SectionBook> {
        match &self.body {
            AnnotationBody::Sections { sections } => Some(sections),
            AnnotationBody::Text { .. } => None,
        }
    }

    /// Layout of this record
    #[inline]
    #[must_use]
    pub fn variant(&self) -> AnnotationVariant {
        self.body.variant()
    }

    /// True when the content is non-empty after trimming
    #[must_use]
    pub fn has_content(&self) -> bool {
        match &self.body {
            AnnotationBody::Text { content } => is_present(content),
            AnnotationBody::Sections { sections } => sections.has_content(),
        }
    }

    /// Character count of the visible text
    #[must_use]
    pub fn plain_text_len(&self) -> usize {
        match &self.body {
            AnnotationBody::Text { content } => plain_text_len(content),
            AnnotationBody::Sections { sections } => sections
                .sections()
                .iter()
                .flat_map(|s| s.notes.iter())
                .map(|n| plain_text_len(&n.heading) + plain_text_len(&n.body))
                .sum(),
        }
    }

    /// Stamp a committed edit
    pub fn touch(&mut self, schema_version: &str, author: Option<UserId>, now_ms: i64) {
        self.schema_version = schema_version.to_string();
        self.author_id = author;
        self.updated_at = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_record_wire_shape() {
        let mut record = AnnotationRecord::text("1.0.0", "<p>Hello</p>");
        record.touch("1.0.0", Some(UserId::new("u-1")), 42);

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "schemaVersion": "1.0.0",
                "content": "<p>Hello</p>",
                "updatedAt": 42,
                "authorId": "u-1"
            })
        );
    }

    #[test]
    fn missing_author_is_null() {
        let record = AnnotationRecord::text("1.0.0", "");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["authorId"], serde_json::Value::Null);
    }

    #[test]
    fn empty_sections_record_has_general() {
        let record = AnnotationRecord::empty(AnnotationVariant::Sections, "1.0.0");
        assert_eq!(record.sections().unwrap().sections().len(), 1);
        assert!(!record.has_content());
        assert_eq!(record.variant(), AnnotationVariant::Sections);
    }

    #[test]
    fn presence_uses_trimmed_content() {
        assert!(!AnnotationRecord::text("1.0.0", "  ").has_content());
        assert!(AnnotationRecord::text("1.0.0", "Hello").has_content());
        assert!(AnnotationRecord::text("1.0.0", "<p><img src=\"a.png\"></p>").has_content());
        assert_eq!(AnnotationRecord::text("1.0.0", "<b>Hi</b>").plain_text_len(), 2);
    }
}
