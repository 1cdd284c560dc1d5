//! Annotation sync engine
//!
//! Keeps annotations attached to collaborative canvas objects in step with
//! the objects' own metadata, under a selection that can change at any time.
//!
//! # Core Operations
//!
//! - **Load**: read an object's annotation, cache first
//! - **Edit**: update the panel at once, persist after a quiet window
//! - **Guard**: drop any write whose object is no longer being edited
//! - **Indicate**: keep a marker next to every annotated object
//!
//! # Architecture
//!
//! ```text
//! CanvasHost ─▶ SelectionTracker ─▶ ObjectCache ◀─ MetadataCodec ◀─ MetadataStore
//!                      │                                  ▲
//!                      ▼                                  │
//!                 PanelState ─▶ PersistenceQueue ─────────┘
//!                                      └─▶ IndicatorManager
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use annotate_core::prelude::*;
//! use annotate_host::MemoryHost;
//! use std::sync::Arc;
//!
//! # async fn example() -> SyncResult<()> {
//! let host = Arc::new(MemoryHost::with_user("u-1"));
//! let engine = SyncEngine::new(Arc::clone(&host), EngineConfig::default());
//!
//! engine.apply_selection(&["o-1".into()]).await;
//! engine.edit_content("<p>Check the copy</p>")?;
//! engine.flush().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod cache;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod persistence;
pub mod record;
pub mod role;
pub mod sections;
pub mod selection;
pub mod store;
pub mod text;
pub mod timer;

// Re-exports for convenience
pub use cache::{CacheStats, ObjectCache};
pub use codec::{EncodedRecord, MetadataCodec};
pub use config::{AnnotationVariant, ConfigError, EngineConfig, MarkerGeometry, TimingConfig};
pub use engine::{Notice, PanelState, SaveStatus, SyncEngine};
pub use error::{CodecError, ReadError, SectionError, SyncError, SyncResult};
pub use indicator::{marker_bounds, IndicatorManager, IndicatorOutcome};
pub use persistence::{Committed, EditingGuard, PersistenceQueue, Persister};
pub use record::{AnnotationBody, AnnotationRecord};
pub use role::EditorRoleResolver;
pub use sections::{Note, NoteDraft, NoteId, Section, SectionBook, SectionId};
pub use selection::{SelectionKind, SelectionTicket, SelectionTracker};
pub use store::{MetadataStore, Namespace};
pub use timer::{KeyedDebouncer, KeyedThrottle, ThrottleDecision};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::config::{AnnotationVariant, EngineConfig};
    pub use crate::engine::{Notice, PanelState, SaveStatus, SyncEngine};
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::record::AnnotationRecord;
    pub use crate::sections::{NoteDraft, SectionBook};
    pub use crate::selection::SelectionKind;
    pub use annotate_host::{CanvasHost, ObjectId};
}
