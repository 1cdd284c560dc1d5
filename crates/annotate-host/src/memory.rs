//! In-memory canvas host
//!
//! A complete [`CanvasHost`] backed by hash maps. Used by the simulator and by
//! tests; it counts every host call and can be told to fail on demand.

use crate::error::{HostError, HostResult};
use crate::host::CanvasHost;
use crate::types::{CanvasEvent, CanvasObject, MarkerConfig, ObjectId, UserId, Widget, WidgetId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

/// Call counters for an in-memory host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostCallStats {
    /// `get_metadata` calls
    pub metadata_reads: usize,
    /// `set_metadata` calls that reached the store
    pub metadata_writes: usize,
    /// Markers created
    pub markers_created: usize,
    /// Widgets moved
    pub widget_moves: usize,
    /// Widgets removed
    pub widgets_removed: usize,
}

/// Failure switches
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    reads: bool,
    writes: bool,
    widgets: bool,
}

#[derive(Debug, Default)]
struct CanvasState {
    current_user: Option<UserId>,
    objects: HashMap<ObjectId, CanvasObject>,
    metadata: HashMap<(ObjectId, String), Value>,
    widgets: HashMap<WidgetId, Widget>,
    selection: Vec<ObjectId>,
    stats: HostCallStats,
    faults: Faults,
}

/// Canvas host kept entirely in memory
#[derive(Debug)]
pub struct MemoryHost {
    state: Mutex<CanvasState>,
    events: broadcast::Sender<CanvasEvent>,
}

impl MemoryHost {
    /// Create empty canvas with no signed-in user
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(CanvasState::default()),
            events,
        }
    }

    /// Create empty canvas with a signed-in user
    #[must_use]
    pub fn with_user(user: impl Into<UserId>) -> Self {
        let host = Self::new();
        host.set_user(Some(user.into()));
        host
    }

    /// Change the signed-in user; `None` makes identity unavailable
    pub fn set_user(&self, user: Option<UserId>) {
        self.state.lock().current_user = user;
    }

    /// Put an object on the canvas
    pub fn add_object(&self, object: CanvasObject) {
        self.state.lock().objects.insert(object.id.clone(), object);
    }

    /// Move an object and notify subscribers
    ///
    /// # Errors
    /// `HostError::ObjectNotFound` when the object is not on the canvas
    pub fn move_object(&self, id: &ObjectId, x: f64, y: f64) -> HostResult<()> {
        {
            let mut state = self.state.lock();
            let object = state
                .objects
                .get_mut(id)
                .ok_or_else(|| HostError::ObjectNotFound(id.clone()))?;
            object.bounds = object.bounds.moved_to(x, y);
        }
        self.emit(CanvasEvent::GeometryChanged(id.clone()));
        Ok(())
    }

    /// Delete an object (and its metadata) and notify subscribers
    pub fn remove_object(&self, id: &ObjectId) {
        {
            let mut state = self.state.lock();
            state.objects.remove(id);
            state.metadata.retain(|(object, _), _| object != id);
            state.selection.retain(|selected| selected != id);
        }
        self.emit(CanvasEvent::ObjectRemoved(id.clone()));
    }

    /// Replace the selection and notify subscribers
    pub fn select(&self, ids: &[ObjectId]) {
        self.state.lock().selection = ids.to_vec();
        self.emit(CanvasEvent::SelectionChanged(ids.to_vec()));
    }

    /// Read metadata without counting a host call
    #[must_use]
    pub fn peek_metadata(&self, id: &ObjectId, namespace: &str) -> Option<Value> {
        self.state
            .lock()
            .metadata
            .get(&(id.clone(), namespace.to_string()))
            .cloned()
    }

    /// Write metadata without counting a host call
    pub fn seed_metadata(&self, id: &ObjectId, namespace: &str, value: Value) {
        self.state
            .lock()
            .metadata
            .insert((id.clone(), namespace.to_string()), value);
    }

    /// Look up a widget without counting a host call
    #[must_use]
    pub fn peek_widget(&self, id: &WidgetId) -> Option<Widget> {
        self.state.lock().widgets.get(id).cloned()
    }

    /// Number of widgets on the canvas
    #[must_use]
    pub fn widget_count(&self) -> usize {
        self.state.lock().widgets.len()
    }

    /// Delete a widget behind the engine's back
    pub fn drop_widget(&self, id: &WidgetId) {
        self.state.lock().widgets.remove(id);
    }

    /// Call counters so far
    #[must_use]
    pub fn stats(&self) -> HostCallStats {
        self.state.lock().stats
    }

    /// Make metadata reads fail
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().faults.reads = fail;
    }

    /// Make metadata writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().faults.writes = fail;
    }

    /// Make widget operations fail
    pub fn fail_widgets(&self, fail: bool) {
        self.state.lock().faults.widgets = fail;
    }

    fn emit(&self, event: CanvasEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn widget_fault(state: &CanvasState) -> HostResult<()> {
        if state.faults.widgets {
            return Err(HostError::Unavailable("widget api offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanvasHost for MemoryHost {
    async fn current_user_id(&self) -> HostResult<UserId> {
        self.state
            .lock()
            .current_user
            .clone()
            .ok_or_else(|| HostError::IdentityUnavailable("no active session".to_string()))
    }

    async fn get_object(&self, id: &ObjectId) -> HostResult<Option<CanvasObject>> {
        Ok(self.state.lock().objects.get(id).cloned())
    }

    async fn get_metadata(&self, id: &ObjectId, namespace: &str) -> HostResult<Option<Value>> {
        let mut state = self.state.lock();
        state.stats.metadata_reads += 1;
        if state.faults.reads {
            return Err(HostError::Unavailable("metadata read failed".to_string()));
        }
        if !state.objects.contains_key(id) {
            return Err(HostError::ObjectNotFound(id.clone()));
        }
        Ok(state.metadata.get(&(id.clone(), namespace.to_string())).cloned())
    }

    async fn set_metadata(&self, id: &ObjectId, namespace: &str, value: Value) -> HostResult<()> {
        let mut state = self.state.lock();
        if state.faults.writes {
            return Err(HostError::Rejected("metadata write rejected".to_string()));
        }
        if !state.objects.contains_key(id) {
            return Err(HostError::ObjectNotFound(id.clone()));
        }
        state.stats.metadata_writes += 1;
        state
            .metadata
            .insert((id.clone(), namespace.to_string()), value);
        Ok(())
    }

    async fn selection(&self) -> HostResult<Vec<CanvasObject>> {
        let state = self.state.lock();
        Ok(state
            .selection
            .iter()
            .filter_map(|id| state.objects.get(id).cloned())
            .collect())
    }

    async fn create_marker(&self, config: MarkerConfig) -> HostResult<Widget> {
        let mut state = self.state.lock();
        Self::widget_fault(&state)?;
        let widget = Widget {
            id: WidgetId::new(Ulid::new().to_string()),
            bounds: config.bounds,
        };
        state.widgets.insert(widget.id.clone(), widget.clone());
        state.stats.markers_created += 1;
        tracing::trace!(widget = %widget.id, object = %config.bound_to, "marker created");
        Ok(widget)
    }

    async fn get_widget(&self, id: &WidgetId) -> HostResult<Option<Widget>> {
        let state = self.state.lock();
        Self::widget_fault(&state)?;
        Ok(state.widgets.get(id).cloned())
    }

    async fn move_widget(&self, id: &WidgetId, x: f64, y: f64) -> HostResult<()> {
        let mut state = self.state.lock();
        Self::widget_fault(&state)?;
        let widget = state
            .widgets
            .get_mut(id)
            .ok_or_else(|| HostError::WidgetNotFound(id.clone()))?;
        widget.bounds = widget.bounds.moved_to(x, y);
        state.stats.widget_moves += 1;
        Ok(())
    }

    async fn remove_widget(&self, id: &WidgetId) -> HostResult<()> {
        let mut state = self.state.lock();
        Self::widget_fault(&state)?;
        state
            .widgets
            .remove(id)
            .ok_or_else(|| HostError::WidgetNotFound(id.clone()))?;
        state.stats.widgets_removed += 1;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.events.subscribe()
    }
}
