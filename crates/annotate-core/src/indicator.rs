//! Indicator lifecycle
//!
//! Keeps a small marker widget next to every annotated object. The widget id
//! lives in the object's own namespace (`indicatorWidgetId`) and is only ever
//! treated as a lookup key: an id that no longer resolves means "no marker".
//!
//! States per object:
//!
//! - **NoIndicator → Present**: content appears and no live marker is recorded
//! - **Present → Present**: object geometry changed; the marker is moved,
//!   throttled per object
//! - **Present → NoIndicator**: content cleared; the marker is removed and the
//!   key dropped, even if the marker had already vanished
//!
//! Every transition requires the editor role. Host failures are logged and
//! turn the call into a no-op.

use crate::config::MarkerGeometry;
use crate::role::EditorRoleResolver;
use crate::store::{MetadataStore, Namespace};
use crate::timer::{KeyedThrottle, ThrottleDecision};
use annotate_host::{CanvasHost, MarkerConfig, ObjectId, Rect, WidgetId};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Result of one indicator synchronization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorOutcome {
    /// A new marker was created and recorded
    Created(WidgetId),
    /// The recorded marker is live and stays
    Kept(WidgetId),
    /// The recorded marker was moved to the current anchor
    Moved(WidgetId),
    /// The marker was removed and its key cleared
    Removed(WidgetId),
    /// A recorded id no longer resolved; the stale key was cleared
    Cleared(WidgetId),
    /// Nothing recorded and nothing needed
    Absent,
    /// Current user is not the editor; nothing touched
    Skipped,
    /// A host call failed; nothing further attempted
    Failed,
}

/// Marker placement for an object's bounding box
///
/// The marker hangs off the top-right corner, pushed `offset` units outward
/// on both axes (right and up).
#[must_use]
pub fn marker_bounds(object: &Rect, geometry: &MarkerGeometry) -> Rect {
    Rect::new(
        object.right() + geometry.offset,
        object.top() - geometry.offset - geometry.size,
        geometry.size,
        geometry.size,
    )
}

struct MarkerOps<H> {
    host: Arc<H>,
    store: Arc<MetadataStore<H>>,
    role: Arc<EditorRoleResolver<H>>,
    geometry: MarkerGeometry,
    // Last marker seen per object, used when the object itself is gone
    known: DashMap<ObjectId, WidgetId>,
}

/// Creates, moves and removes annotation markers
pub struct IndicatorManager<H> {
    ops: Arc<MarkerOps<H>>,
    throttle: KeyedThrottle<ObjectId>,
}

impl<H: CanvasHost> IndicatorManager<H> {
    /// Create manager
    #[must_use]
    pub fn new(
        host: Arc<H>,
        store: Arc<MetadataStore<H>>,
        role: Arc<EditorRoleResolver<H>>,
        geometry: MarkerGeometry,
        reposition_throttle: Duration,
    ) -> Self {
        Self {
            ops: Arc::new(MarkerOps {
                host,
                store,
                role,
                geometry,
                known: DashMap::new(),
            }),
            throttle: KeyedThrottle::new(reposition_throttle),
        }
    }

    /// Bring the marker in line with annotation presence
    pub async fn sync(&self, id: &ObjectId, has_content: bool) -> IndicatorOutcome {
        self.ops.sync(id, has_content).await
    }

    /// Remove the marker of an object whose annotation was deleted
    pub async fn remove(&self, id: &ObjectId) -> IndicatorOutcome {
        self.ops.sync(id, false).await
    }

    /// Move the marker to the object's current anchor, throttled per object
    pub fn reposition(&self, id: &ObjectId) -> ThrottleDecision {
        let ops = Arc::clone(&self.ops);
        let target = id.clone();
        self.throttle.submit(id.clone(), async move {
            ops.move_marker(&target).await;
        })
    }

    /// Move the marker now, bypassing the throttle
    pub async fn move_now(&self, id: &ObjectId) -> IndicatorOutcome {
        self.ops.move_marker(id).await
    }

    /// Drop the marker of an object that left the canvas
    ///
    /// Only markers seen during this session can be found once the object's
    /// metadata is gone.
    pub async fn detach(&self, id: &ObjectId) -> Option<WidgetId> {
        self.throttle.forget(id);
        let (_, widget) = self.ops.known.remove(id)?;
        if let Err(e) = self.ops.host.remove_widget(&widget).await {
            if !e.is_not_found() {
                tracing::warn!(object = %id, widget = %widget, error = %e, "orphan marker removal failed");
            }
        }
        Some(widget)
    }

    /// Marker last seen for an object
    #[must_use]
    pub fn known_marker(&self, id: &ObjectId) -> Option<WidgetId> {
        self.ops.known.get(id).map(|w| w.value().clone())
    }
}

impl<H> std::fmt::Debug for IndicatorManager<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorManager")
            .field("known", &self.ops.known.len())
            .field("throttle", &self.throttle)
            .finish()
    }
}

impl<H: CanvasHost> MarkerOps<H> {
    async fn sync(&self, id: &ObjectId, has_content: bool) -> IndicatorOutcome {
        if self.role.authorize(id).await.is_err() {
            tracing::trace!(object = %id, "indicator sync skipped for non-editor");
            return IndicatorOutcome::Skipped;
        }

        let namespace = match self.store.read(id).await {
            Ok(ns) => ns,
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "indicator state unreadable");
                return IndicatorOutcome::Failed;
            }
        };

        let recorded = namespace.indicator();
        let live = match &recorded {
            Some(widget) => self.resolves(widget).await,
            None => false,
        };

        match (has_content, recorded) {
            (true, Some(widget)) if live => {
                self.known.insert(id.clone(), widget.clone());
                IndicatorOutcome::Kept(widget)
            }
            (true, stale) => {
                if let Some(stale) = stale {
                    tracing::debug!(object = %id, widget = %stale, "recorded marker is gone, recreating");
                }
                self.create(id).await
            }
            (false, Some(widget)) => {
                if live {
                    if let Err(e) = self.host.remove_widget(&widget).await {
                        tracing::warn!(object = %id, widget = %widget, error = %e, "marker removal failed");
                        return IndicatorOutcome::Failed;
                    }
                }
                if let Err(e) = self.store.update(id, Namespace::clear_indicator).await {
                    tracing::warn!(object = %id, error = %e, "clearing marker reference failed");
                    return IndicatorOutcome::Failed;
                }
                self.known.remove(id);
                if live {
                    IndicatorOutcome::Removed(widget)
                } else {
                    IndicatorOutcome::Cleared(widget)
                }
            }
            (false, None) => IndicatorOutcome::Absent,
        }
    }

    // Lookup failure means "does not exist"
    async fn resolves(&self, widget: &WidgetId) -> bool {
        match self.host.get_widget(widget).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::debug!(widget = %widget, error = %e, "marker lookup failed");
                false
            }
        }
    }

    async fn create(&self, id: &ObjectId) -> IndicatorOutcome {
        let object = match self.host.get_object(id).await {
            Ok(Some(object)) => object,
            Ok(None) => return IndicatorOutcome::Failed,
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "object lookup for marker failed");
                return IndicatorOutcome::Failed;
            }
        };

        let config = MarkerConfig {
            bounds: marker_bounds(&object.bounds, &self.geometry),
            glyph: self.geometry.glyph.clone(),
            bound_to: id.clone(),
        };
        let widget = match self.host.create_marker(config).await {
            Ok(widget) => widget,
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "marker creation failed");
                return IndicatorOutcome::Failed;
            }
        };

        if let Err(e) = self.store.update(id, |ns| ns.set_indicator(&widget.id)).await {
            tracing::warn!(object = %id, error = %e, "recording marker failed, removing it");
            if let Err(e) = self.host.remove_widget(&widget.id).await {
                tracing::warn!(widget = %widget.id, error = %e, "unrecorded marker left on canvas");
            }
            return IndicatorOutcome::Failed;
        }

        tracing::debug!(object = %id, widget = %widget.id, "marker created");
        self.known.insert(id.clone(), widget.id.clone());
        IndicatorOutcome::Created(widget.id)
    }

    async fn move_marker(&self, id: &ObjectId) -> IndicatorOutcome {
        if self.role.authorize(id).await.is_err() {
            return IndicatorOutcome::Skipped;
        }

        let widget = match self.store.read(id).await.map(|ns| ns.indicator()) {
            Ok(Some(widget)) => widget,
            Ok(None) => return IndicatorOutcome::Absent,
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "indicator state unreadable");
                return IndicatorOutcome::Failed;
            }
        };

        let object = match self.host.get_object(id).await {
            Ok(Some(object)) => object,
            Ok(None) => return IndicatorOutcome::Failed,
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "object lookup for reposition failed");
                return IndicatorOutcome::Failed;
            }
        };

        let anchor = marker_bounds(&object.bounds, &self.geometry);
        match self.host.move_widget(&widget, anchor.x, anchor.y).await {
            Ok(()) => {
                self.known.insert(id.clone(), widget.clone());
                IndicatorOutcome::Moved(widget)
            }
            Err(e) => {
                tracing::warn!(object = %id, widget = %widget, error = %e, "marker move failed");
                IndicatorOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotate_host::{CanvasObject, MemoryHost};
    use serde_json::json;

    const NS: &str = "app";

    struct Fixture {
        host: Arc<MemoryHost>,
        manager: IndicatorManager<MemoryHost>,
        id: ObjectId,
    }

    fn fixture(user: &str) -> Fixture {
        let host = Arc::new(MemoryHost::with_user(user));
        host.add_object(
            CanvasObject::new("o-1", "sticky_note", Rect::new(100.0, 100.0, 200.0, 50.0))
                .with_creator("alice"),
        );
        let store = Arc::new(MetadataStore::new(Arc::clone(&host), NS));
        let role = Arc::new(EditorRoleResolver::new(Arc::clone(&host)));
        let manager = IndicatorManager::new(
            Arc::clone(&host),
            store,
            role,
            MarkerGeometry::default(),
            Duration::from_millis(100),
        );
        Fixture {
            host,
            manager,
            id: ObjectId::new("o-1"),
        }
    }

    fn recorded(fx: &Fixture) -> Option<String> {
        fx.host
            .peek_metadata(&fx.id, NS)
            .and_then(|ns| ns.get("indicatorWidgetId").cloned())
            .and_then(|v| v.as_str().map(str::to_string))
    }

    #[test]
    fn marker_hangs_off_top_right_corner() {
        let bounds = marker_bounds(&Rect::new(100.0, 100.0, 200.0, 50.0), &MarkerGeometry::default());
        assert_eq!(bounds, Rect::new(308.0, 68.0, 24.0, 24.0));
    }

    #[tokio::test]
    async fn content_creates_marker_and_records_it() {
        let fx = fixture("alice");
        fx.host.seed_metadata(&fx.id, NS, json!({"annotate": {"content": "x"}}));

        let outcome = fx.manager.sync(&fx.id, true).await;
        let IndicatorOutcome::Created(widget) = outcome else {
            panic!("expected creation, got {outcome:?}");
        };
        assert_eq!(recorded(&fx).as_deref(), Some(widget.as_str()));
        assert_eq!(
            fx.host.peek_metadata(&fx.id, NS).unwrap()["annotate"]["content"],
            "x"
        );
        assert_eq!(fx.host.peek_widget(&widget).unwrap().bounds.x, 308.0);

        // Second sync keeps the same marker
        assert_eq!(fx.manager.sync(&fx.id, true).await, IndicatorOutcome::Kept(widget));
        assert_eq!(fx.host.widget_count(), 1);
    }

    #[tokio::test]
    async fn cleared_content_removes_marker_and_key() {
        let fx = fixture("alice");
        let IndicatorOutcome::Created(widget) = fx.manager.sync(&fx.id, true).await else {
            panic!("marker not created");
        };

        assert_eq!(fx.manager.sync(&fx.id, false).await, IndicatorOutcome::Removed(widget));
        assert_eq!(fx.host.widget_count(), 0);
        assert!(recorded(&fx).is_none());
        assert!(fx.manager.known_marker(&fx.id).is_none());
    }

    #[tokio::test]
    async fn vanished_marker_is_healed() {
        let fx = fixture("alice");
        fx.host.seed_metadata(&fx.id, NS, json!({"indicatorWidgetId": "w-gone"}));

        // Clearing drops the stale id even though the widget is gone
        assert_eq!(
            fx.manager.sync(&fx.id, false).await,
            IndicatorOutcome::Cleared(WidgetId::new("w-gone"))
        );
        assert!(recorded(&fx).is_none());

        // With content, a stale id is replaced by a fresh marker
        fx.host.seed_metadata(&fx.id, NS, json!({"indicatorWidgetId": "w-gone"}));
        let outcome = fx.manager.sync(&fx.id, true).await;
        assert!(matches!(outcome, IndicatorOutcome::Created(ref w) if w.as_str() != "w-gone"));
    }

    #[tokio::test]
    async fn non_editor_touches_nothing() {
        let fx = fixture("bob");
        assert_eq!(fx.manager.sync(&fx.id, true).await, IndicatorOutcome::Skipped);
        assert_eq!(fx.host.stats().markers_created, 0);
        assert_eq!(fx.host.stats().metadata_writes, 0);
    }

    #[tokio::test]
    async fn widget_failures_are_no_ops() {
        let fx = fixture("alice");
        fx.host.fail_widgets(true);

        assert_eq!(fx.manager.sync(&fx.id, true).await, IndicatorOutcome::Failed);
        assert!(recorded(&fx).is_none());
    }

    #[tokio::test]
    async fn failed_record_write_removes_fresh_marker() {
        let fx = fixture("alice");
        fx.host.fail_writes(true);

        assert_eq!(fx.manager.sync(&fx.id, true).await, IndicatorOutcome::Failed);
        assert_eq!(fx.host.widget_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reposition_follows_object_with_throttle() {
        let fx = fixture("alice");
        let IndicatorOutcome::Created(widget) = fx.manager.sync(&fx.id, true).await else {
            panic!("marker not created");
        };

        fx.host.move_object(&fx.id, 0.0, 500.0).unwrap();
        assert_eq!(fx.manager.reposition(&fx.id), ThrottleDecision::Immediate);
        for step in 1..=5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fx.host.move_object(&fx.id, f64::from(step) * 10.0, 500.0).unwrap();
            assert_eq!(fx.manager.reposition(&fx.id), ThrottleDecision::Deferred);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(fx.host.stats().widget_moves, 2);
        let marker = fx.host.peek_widget(&widget).unwrap();
        assert_eq!((marker.bounds.x, marker.bounds.y), (50.0 + 200.0 + 8.0, 500.0 - 32.0));
    }

    #[tokio::test]
    async fn detach_removes_known_marker() {
        let fx = fixture("alice");
        let IndicatorOutcome::Created(widget) = fx.manager.sync(&fx.id, true).await else {
            panic!("marker not created");
        };
        fx.host.remove_object(&fx.id);

        assert_eq!(fx.manager.detach(&fx.id).await, Some(widget));
        assert_eq!(fx.host.widget_count(), 0);
        assert_eq!(fx.manager.detach(&fx.id).await, None);
    }
}
