//! Canvas value types shared by the host contract and the sync engine
//!
//! Defines:
//! - Identifiers handed out by the host (objects, widgets, users)
//! - Object geometry and the object snapshot returned by lookups
//! - Marker widget configuration
//! - Canvas events delivered on the notification channel

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! host_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a host-issued identifier
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

host_id!(
    /// Canvas object identifier
    ObjectId
);
host_id!(
    /// Canvas widget identifier (markers are widgets too)
    WidgetId
);
host_id!(
    /// Host user identifier
    UserId
);

/// Axis-aligned bounding box in canvas units
///
/// `x`/`y` is the top-left corner; `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Rect {
    /// Create rect from origin and size
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge
    #[inline]
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Top edge
    #[inline]
    #[must_use]
    pub fn top(&self) -> f64 {
        self.y
    }

    /// Same size, new origin
    #[inline]
    #[must_use]
    pub fn moved_to(self, x: f64, y: f64) -> Self {
        Self { x, y, ..self }
    }
}

/// Snapshot of a canvas object as returned by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasObject {
    /// Object id
    pub id: ObjectId,
    /// Host object type ("sticky_note", "shape", ...)
    pub kind: String,
    /// Display title, if the object has one
    pub title: Option<String>,
    /// Bounding box
    pub bounds: Rect,
    /// Creator of the object; `None` for system-created items
    pub created_by: Option<UserId>,
}

impl CanvasObject {
    /// Create object snapshot
    #[must_use]
    pub fn new(id: impl Into<ObjectId>, kind: impl Into<String>, bounds: Rect) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            title: None,
            bounds,
            created_by: None,
        }
    }

    /// With creator
    #[inline]
    #[must_use]
    pub fn with_creator(mut self, user: impl Into<UserId>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    /// With title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Configuration for a marker widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Placement of the marker
    pub bounds: Rect,
    /// Glyph drawn inside the marker
    pub glyph: String,
    /// Object the marker belongs to
    pub bound_to: ObjectId,
}

/// A widget living on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    /// Widget id
    pub id: WidgetId,
    /// Current placement
    pub bounds: Rect,
}

/// Notifications emitted by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasEvent {
    /// Selection changed; carries every selected object id
    SelectionChanged(Vec<ObjectId>),
    /// Object was moved or resized
    GeometryChanged(ObjectId),
    /// Object was deleted from the canvas
    ObjectRemoved(ObjectId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_raw_value() {
        let id = ObjectId::new("3458764");
        assert_eq!(id.to_string(), "3458764");
        assert_eq!(id.as_str(), "3458764");
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = WidgetId::from("w-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"w-1\"");
    }

    #[test]
    fn rect_edges() {
        let rect = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(rect.right(), 110.0);
        assert_eq!(rect.top(), 20.0);
        assert_eq!(rect.moved_to(0.0, 0.0).width, 100.0);
    }
}
