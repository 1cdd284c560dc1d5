//! Namespaced metadata access with read-merge-write
//!
//! The application namespace on an object holds two independent keys: the
//! `annotate` record and the `indicatorWidgetId` back-reference. Whoever
//! rewrites one must keep the other, so every write goes through
//! [`MetadataStore::update`]: read the namespace, change only the caller's
//! keys, write it back. Updates to the same object are serialized by a
//! per-object async lock so two writers cannot interleave between their read
//! and their write.

use crate::config::{ANNOTATION_KEY, INDICATOR_KEY};
use annotate_host::{CanvasHost, HostResult, ObjectId, WidgetId};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Contents of the application namespace on one object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    entries: Map<String, Value>,
}

impl Namespace {
    /// Wrap the value read from the host
    ///
    /// A non-object value cannot carry our keys; it is replaced by an empty
    /// namespace on the next write.
    #[must_use]
    pub fn from_raw(raw: Option<Value>) -> Self {
        match raw {
            Some(Value::Object(entries)) => Self { entries },
            None | Some(Value::Null) => Self::default(),
            Some(other) => {
                tracing::warn!(found = %other, "namespace is not an object, starting fresh");
                Self::default()
            }
        }
    }

    /// Raw `annotate` sub-key
    #[inline]
    #[must_use]
    pub fn annotation(&self) -> Option<&Value> {
        self.entries.get(ANNOTATION_KEY)
    }

    /// Replace the `annotate` sub-key
    pub fn set_annotation(&mut self, value: Value) {
        self.entries.insert(ANNOTATION_KEY.to_string(), value);
    }

    /// Recorded indicator widget id, if any
    #[must_use]
    pub fn indicator(&self) -> Option<WidgetId> {
        match self.entries.get(INDICATOR_KEY) {
            Some(Value::String(id)) if !id.is_empty() => Some(WidgetId::new(id.clone())),
            _ => None,
        }
    }

    /// Record the indicator widget id
    pub fn set_indicator(&mut self, id: &WidgetId) {
        self.entries
            .insert(INDICATOR_KEY.to_string(), Value::String(id.to_string()));
    }

    /// Drop the indicator key; true if it was present
    pub fn clear_indicator(&mut self) -> bool {
        self.entries.remove(INDICATOR_KEY).is_some()
    }

    /// Value to hand back to the host
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}

/// Per-object namespace reader/writer
pub struct MetadataStore<H> {
    host: Arc<H>,
    namespace: String,
    locks: DashMap<ObjectId, Arc<Mutex<()>>>,
}

impl<H: CanvasHost> MetadataStore<H> {
    /// Create store for an application namespace
    #[must_use]
    pub fn new(host: Arc<H>, namespace: impl Into<String>) -> Self {
        Self {
            host,
            namespace: namespace.into(),
            locks: DashMap::new(),
        }
    }

    /// Namespace name
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Read the namespace of an object
    ///
    /// # Errors
    /// Host read failures
    pub async fn read(&self, id: &ObjectId) -> HostResult<Namespace> {
        let raw = self.host.get_metadata(id, &self.namespace).await?;
        Ok(Namespace::from_raw(raw))
    }

    /// Read-merge-write the namespace of an object
    ///
    /// `edit` sees the current namespace and changes only its own keys. The
    /// host is written only when `edit` actually changed something.
    ///
    /// # Errors
    /// Host read or write failures; on failure nothing is written
    pub async fn update<T, F>(&self, id: &ObjectId, edit: F) -> HostResult<T>
    where
        F: FnOnce(&mut Namespace) -> T,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let current = self.read(id).await?;
        let mut next = current.clone();
        let out = edit(&mut next);
        if next != current {
            self.host
                .set_metadata(id, &self.namespace, next.into_value())
                .await?;
        }
        Ok(out)
    }

    fn lock_for(&self, id: &ObjectId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the write lock of a deleted object
    pub fn forget(&self, id: &ObjectId) {
        self.locks.remove(id);
    }
}

impl<H> std::fmt::Debug for MetadataStore<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("namespace", &self.namespace)
            .field("locked_objects", &self.locks.len())
            .finish()
    }
}
