//! Error types for host calls
//!
//! Every call into the canvas platform can fail; these are the shapes the
//! engine distinguishes.

use crate::types::{ObjectId, WidgetId};

/// Errors reported by a canvas host
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Host session is not ready, current user cannot be resolved
    #[error("identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// Object does not exist on the canvas
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Widget does not exist on the canvas
    #[error("widget not found: {0}")]
    WidgetNotFound(WidgetId),

    /// Host refused the write
    #[error("write rejected: {0}")]
    Rejected(String),

    /// Transport or platform failure
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

impl HostError {
    /// Check if error means "the thing is not there"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound(_) | Self::WidgetNotFound(_))
    }
}

/// Result type alias for host calls
pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_display() {
        let err = HostError::ObjectNotFound(ObjectId::new("o-1"));
        assert_eq!(err.to_string(), "object not found: o-1");
    }

    #[test]
    fn not_found_classification() {
        assert!(HostError::WidgetNotFound(WidgetId::new("w")).is_not_found());
        assert!(!HostError::Rejected("quota".into()).is_not_found());
    }
}
