//! Canvas host contract
//!
//! The boundary between the annotation sync engine and the collaborative
//! canvas platform. The platform provides:
//!
//! - Objects with an id, a bounding box and a creator
//! - Per-object namespaced key/value metadata
//! - Marker widgets that can be created, looked up, moved and removed
//! - A notification channel for selection and geometry changes
//!
//! [`MemoryHost`] is a complete in-memory implementation used by the
//! simulator and the test suites. With the `mock` feature the crate also
//! exports `MockCanvasHost` (mockall).
//!
//! # Example
//!
//! ```rust,ignore
//! use annotate_host::{CanvasHost, CanvasObject, MemoryHost, Rect};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let host = MemoryHost::with_user("u-1");
//! host.add_object(CanvasObject::new("o-1", "sticky_note", Rect::new(0.0, 0.0, 200.0, 200.0)));
//!
//! let user = host.current_user_id().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod host;
pub mod memory;
pub mod types;

pub use error::{HostError, HostResult};
pub use host::CanvasHost;
#[cfg(feature = "mock")]
pub use host::MockCanvasHost;
pub use memory::{HostCallStats, MemoryHost};
pub use types::{CanvasEvent, CanvasObject, MarkerConfig, ObjectId, Rect, UserId, Widget, WidgetId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
