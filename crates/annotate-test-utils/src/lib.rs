//! Testing utilities for the canvas annotate workspace
//!
//! Shared fixtures: seeded in-memory hosts, engines, and metadata readers.

#![allow(missing_docs)]

use annotate_core::config::{ANNOTATION_KEY, DEFAULT_NAMESPACE, INDICATOR_KEY};
use annotate_core::{AnnotationRecord, AnnotationVariant, EngineConfig, SyncEngine};
use annotate_host::{CanvasObject, MemoryHost, ObjectId, Rect};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Signed-in user that creates every seeded object
pub const OWNER: &str = "alice";
/// Another collaborator on the same canvas
pub const COLLABORATOR: &str = "bob";

pub fn oid(id: &str) -> ObjectId {
    ObjectId::new(id)
}

pub fn sticky(id: &str) -> CanvasObject {
    CanvasObject::new(id, "sticky_note", Rect::new(100.0, 100.0, 200.0, 200.0))
        .with_creator(OWNER)
        .with_title(format!("Sticky {id}"))
}

/// Host signed in as [`OWNER`] holding one sticky per id
pub fn seeded_host(ids: &[&str]) -> Arc<MemoryHost> {
    let host = Arc::new(MemoryHost::with_user(OWNER));
    for id in ids {
        host.add_object(sticky(id));
    }
    host
}

pub fn engine(host: &Arc<MemoryHost>) -> Arc<SyncEngine<MemoryHost>> {
    SyncEngine::new(Arc::clone(host), EngineConfig::default())
}

pub fn sections_engine(host: &Arc<MemoryHost>) -> Arc<SyncEngine<MemoryHost>> {
    SyncEngine::new(
        Arc::clone(host),
        EngineConfig::default().with_variant(AnnotationVariant::Sections),
    )
}

pub fn text_record(content: &str) -> AnnotationRecord {
    AnnotationRecord::text(annotate_core::config::SCHEMA_VERSION, content)
}

/// Whole application namespace stored on an object
pub fn stored_namespace(host: &MemoryHost, id: &str) -> Option<Value> {
    host.peek_metadata(&oid(id), DEFAULT_NAMESPACE)
}

/// Raw `annotate` payload stored on an object
pub fn stored_annotation(host: &MemoryHost, id: &str) -> Option<Value> {
    stored_namespace(host, id).and_then(|ns| ns.get(ANNOTATION_KEY).cloned())
}

pub fn stored_content(host: &MemoryHost, id: &str) -> Option<String> {
    stored_annotation(host, id).and_then(|a| a.get("content")?.as_str().map(str::to_string))
}

pub fn stored_indicator(host: &MemoryHost, id: &str) -> Option<String> {
    stored_namespace(host, id).and_then(|ns| ns.get(INDICATOR_KEY)?.as_str().map(str::to_string))
}

/// Sleep past the default edit debounce window
pub async fn past_edit_window() {
    tokio::time::sleep(Duration::from_millis(450)).await;
}

/// Sleep past the default selection debounce window
pub async fn past_selection_window() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}
