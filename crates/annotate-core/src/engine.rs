//! Selection-scoped synchronization engine
//!
//! Owns every piece of per-object state (cache, write locks, save timers,
//! marker bookkeeping) and publishes what the annotation panel should show
//! through a [`watch`] channel.
//!
//! ```text
//! selection events ─▶ SelectionTracker ─▶ load (cache-first) ─▶ PanelState
//! panel edits      ─▶ PersistenceQueue ─▶ guard ▸ role ▸ encode ▸ write ─▶ cache
//!                                                                  └──▶ IndicatorManager
//! geometry events  ─▶ IndicatorManager (throttled reposition)
//! ```

use crate::cache::{CacheStats, ObjectCache};
use crate::codec::MetadataCodec;
use crate::config::{AnnotationVariant, EngineConfig};
use crate::error::{SectionError, SyncError, SyncResult};
use crate::indicator::IndicatorManager;
use crate::persistence::{Committed, EditingGuard, PersistenceQueue, Persister};
use crate::record::{AnnotationBody, AnnotationRecord};
use crate::role::EditorRoleResolver;
use crate::sections::SectionBook;
use crate::selection::{SelectionKind, SelectionTracker};
use crate::store::MetadataStore;
use crate::timer::ThrottleDecision;
use annotate_host::{CanvasEvent, CanvasHost, ObjectId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Save progress of the panel's record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// Nothing to save
    #[default]
    Idle,
    /// Record is being loaded
    Loading,
    /// Edit waiting for the debounce window
    Pending,
    /// Last edit reached the store
    Saved,
    /// Last save failed; local text is kept
    Unsaved,
}

/// Dismissible message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Text to show
    pub message: String,
    /// Editing and retrying can resolve it
    pub retryable: bool,
}

impl Notice {
    /// Notice describing an error
    #[must_use]
    pub fn from_error(error: &SyncError) -> Self {
        Self {
            message: error.user_message(),
            retryable: error.is_retryable(),
        }
    }
}

/// Everything the annotation panel renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PanelState {
    /// Current selection
    pub selection: SelectionKind,
    /// Object whose annotation is shown
    pub active: Option<ObjectId>,
    /// Record shown, including unsaved edits
    pub record: Option<AnnotationRecord>,
    /// Current user may edit the active object
    pub can_edit: bool,
    /// Save progress
    pub save: SaveStatus,
    /// Message to show, if any
    pub notice: Option<Notice>,
    /// Encoded size of the shown record
    pub bytes_used: usize,
    /// Visible characters in the shown record
    pub plain_text_len: usize,
}

impl PanelState {
    fn show(&mut self, record: AnnotationRecord, bytes_used: usize) {
        self.plain_text_len = record.plain_text_len();
        self.bytes_used = bytes_used;
        self.record = Some(record);
    }
}

/// Annotation sync engine for one canvas session
pub struct SyncEngine<H: CanvasHost> {
    host: Arc<H>,
    config: EngineConfig,
    codec: MetadataCodec,
    cache: ObjectCache,
    store: Arc<MetadataStore<H>>,
    role: Arc<EditorRoleResolver<H>>,
    selection: SelectionTracker,
    saves: PersistenceQueue<H>,
    indicators: IndicatorManager<H>,
    panel: watch::Sender<PanelState>,
}

impl<H: CanvasHost> SyncEngine<H> {
    /// Create engine for a host
    #[must_use]
    pub fn new(host: Arc<H>, config: EngineConfig) -> Arc<Self> {
        let codec = MetadataCodec::from_config(&config);
        let cache = ObjectCache::new();
        let store = Arc::new(MetadataStore::new(Arc::clone(&host), config.namespace.clone()));
        let role = Arc::new(EditorRoleResolver::new(Arc::clone(&host)));
        let guard = Arc::new(EditingGuard::new());

        let persister = Persister::new(
            Arc::clone(&store),
            codec.clone(),
            cache.clone(),
            Arc::clone(&role),
            Arc::clone(&guard),
        );
        let indicators = IndicatorManager::new(
            Arc::clone(&host),
            Arc::clone(&store),
            Arc::clone(&role),
            config.marker.clone(),
            config.reposition_throttle(),
        );
        let (panel, _) = watch::channel(PanelState::default());

        tracing::debug!(namespace = %config.namespace, variant = ?config.variant, "sync engine created");
        Arc::new(Self {
            selection: SelectionTracker::new(config.selection_debounce(), guard),
            saves: PersistenceQueue::new(persister, config.edit_debounce()),
            host,
            codec,
            cache,
            store,
            role,
            indicators,
            panel,
            config,
        })
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Host the engine talks to
    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Current panel state
    #[must_use]
    pub fn panel(&self) -> PanelState {
        self.panel.borrow().clone()
    }

    /// Subscribe to panel state changes
    #[must_use]
    pub fn watch_panel(&self) -> watch::Receiver<PanelState> {
        self.panel.subscribe()
    }

    /// Cache hit/miss counters
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Indicator manager
    #[inline]
    #[must_use]
    pub fn indicators(&self) -> &IndicatorManager<H> {
        &self.indicators
    }

    /// Check if the current user may edit an object
    pub async fn is_editor(&self, id: &ObjectId) -> bool {
        let object = match self.host.get_object(id).await {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "object lookup failed");
                None
            }
        };
        self.role.is_editor(object.as_ref()).await
    }

    /// Handle a host selection notification
    ///
    /// Debounced; within a burst only the last selection is applied. Pending
    /// saves for an object the selection left are dropped immediately.
    pub fn on_selection_change(self: &Arc<Self>, ids: Vec<ObjectId>) {
        self.selection.observe(&ids);
        let engine = Arc::clone(self);
        self.selection.submit(async move {
            engine.apply_selection(&ids).await;
        });
    }

    /// Transition to a selection immediately
    pub async fn apply_selection(&self, ids: &[ObjectId]) {
        let kind = SelectionKind::from_ids(ids);
        let ticket = self.selection.begin(kind.clone());

        let Some(id) = kind.single().cloned() else {
            let notice = matches!(kind, SelectionKind::Multiple(_))
                .then(|| Notice::from_error(&SyncError::NoActiveObject));
            self.panel.send_replace(PanelState {
                selection: kind,
                notice,
                ..PanelState::default()
            });
            return;
        };

        self.panel.send_replace(PanelState {
            selection: kind,
            active: Some(id.clone()),
            save: SaveStatus::Loading,
            ..PanelState::default()
        });

        let role = self.role.authorize(&id).await;
        let loaded = self.load(&id).await;
        if !self.selection.is_current(&ticket) {
            tracing::debug!(object = %id, "selection moved on, discarding load");
            return;
        }

        let mut notice = None;
        let mut can_edit = match role {
            Ok(_) => true,
            Err(SyncError::NotEditor(_)) => false,
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "editor role unavailable");
                notice = Some(Notice::from_error(&e));
                false
            }
        };
        let record = match loaded {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "annotation load failed");
                // Corrupt payloads stay editable so the next save replaces them
                can_edit &= e.is_corrupt();
                notice = Some(Notice::from_error(&e));
                self.empty_record()
            }
        };
        let bytes = self.codec.measure(&record).unwrap_or_default();

        self.panel.send_modify(|panel| {
            panel.show(record, bytes);
            panel.can_edit = can_edit;
            panel.save = SaveStatus::Idle;
            panel.notice = notice;
        });
    }

    /// Load an object's annotation, cache first
    ///
    /// An object with no stored annotation yields an empty record.
    ///
    /// # Errors
    /// `SyncError::ReadFailure` when the host read fails or the payload is corrupt
    pub async fn load(&self, id: &ObjectId) -> SyncResult<AnnotationRecord> {
        self.cache
            .get_or_try_fetch(id, || async {
                let namespace = self
                    .store
                    .read(id)
                    .await
                    .map_err(|e| SyncError::read_failure(id.clone(), e))?;
                let record = self
                    .codec
                    .decode(namespace.annotation())
                    .map_err(|e| SyncError::read_failure(id.clone(), e))?;
                Ok(record.unwrap_or_else(|| self.empty_record()))
            })
            .await
    }

    /// Replace the single-body content of the active object
    ///
    /// # Errors
    /// - `NoActiveObject` when no single object is loaded
    /// - `NotEditor` when the current user may not edit it
    /// - `VariantMismatch` when the record holds sections
    pub fn edit_content(self: &Arc<Self>, html: impl Into<String>) -> SyncResult<()> {
        let html = html.into();
        self.stage_edit(|record| match &mut record.body {
            AnnotationBody::Text { content } => {
                *content = html;
                Ok(())
            }
            AnnotationBody::Sections { .. } => Err(SyncError::VariantMismatch {
                expected: AnnotationVariant::Single,
            }),
        })
    }

    /// Edit the section book of the active object
    ///
    /// A rejected section edit leaves the panel unchanged.
    ///
    /// # Errors
    /// As [`Self::edit_content`], plus `SyncError::Section` from `edit`
    pub fn edit_sections<T, F>(self: &Arc<Self>, edit: F) -> SyncResult<T>
    where
        F: FnOnce(&mut SectionBook) -> Result<T, SectionError>,
    {
        self.stage_edit(|record| match &mut record.body {
            AnnotationBody::Sections { sections } => Ok(edit(sections)?),
            AnnotationBody::Text { .. } => Err(SyncError::VariantMismatch {
                expected: AnnotationVariant::Sections,
            }),
        })
    }

    fn stage_edit<T>(
        self: &Arc<Self>,
        edit: impl FnOnce(&mut AnnotationRecord) -> SyncResult<T>,
    ) -> SyncResult<T> {
        let snapshot = self.panel.borrow().clone();
        let origin = snapshot
            .selection
            .single()
            .filter(|selected| snapshot.active.as_ref() == Some(*selected))
            .cloned()
            .ok_or(SyncError::NoActiveObject)?;
        if !snapshot.can_edit {
            return Err(SyncError::NotEditor(origin));
        }
        let mut record = snapshot.record.ok_or(SyncError::NoActiveObject)?;

        let out = edit(&mut record)?;

        let bytes = self.codec.measure(&record).unwrap_or_default();
        let ceiling = self.codec.ceiling();
        self.panel.send_modify(|panel| {
            panel.show(record.clone(), bytes);
            panel.save = SaveStatus::Pending;
            if bytes > ceiling {
                panel.notice = Some(Notice::from_error(&SyncError::PayloadTooLarge {
                    size: bytes,
                    ceiling,
                }));
            }
        });

        let engine = Arc::clone(self);
        let target = origin.clone();
        self.saves.schedule(origin, record, move |outcome| async move {
            engine.finish_save(&target, outcome).await;
        });
        Ok(out)
    }

    async fn finish_save(&self, origin: &ObjectId, outcome: SyncResult<Committed>) {
        match outcome {
            Ok(committed) => {
                let marker = self.indicators.sync(origin, committed.record.has_content()).await;
                tracing::trace!(object = %origin, ?marker, "indicator synced after save");

                // A newer edit for the same object is already queued
                if self.saves.is_pending(origin) {
                    return;
                }
                self.panel.send_if_modified(|panel| {
                    if panel.active.as_ref() != Some(origin) {
                        return false;
                    }
                    panel.show(committed.record, committed.size);
                    panel.save = SaveStatus::Saved;
                    if panel.notice.as_ref().is_some_and(|n| n.retryable) {
                        panel.notice = None;
                    }
                    true
                });
            }
            // Logged by the guard
            Err(SyncError::StaleSelectionGuard { .. }) => {}
            Err(e) => {
                tracing::warn!(object = %origin, error = %e, "annotation save failed");
                self.panel.send_if_modified(|panel| {
                    if panel.active.as_ref() != Some(origin) {
                        return false;
                    }
                    panel.save = SaveStatus::Unsaved;
                    panel.notice = Some(Notice::from_error(&e));
                    true
                });
            }
        }
    }

    /// Run every pending save now; returns how many ran
    pub async fn flush(&self) -> usize {
        self.saves.flush_all().await
    }

    /// Object moved or resized; reposition its marker
    pub fn on_geometry_change(&self, id: &ObjectId) -> ThrottleDecision {
        self.indicators.reposition(id)
    }

    /// Object deleted from the canvas
    ///
    /// Discards its pending save, forgets its cached record and write lock,
    /// removes a marker seen for it and clears the panel if it was shown.
    pub async fn on_object_removed(&self, id: &ObjectId) {
        let dropped = self.saves.cancel(id);
        self.cache.invalidate(id).await;
        self.store.forget(id);
        let marker = self.indicators.detach(id).await;
        tracing::debug!(object = %id, dropped_save = dropped, ?marker, "object removed");

        let shown = self.panel.borrow().active.as_ref() == Some(id);
        if shown {
            self.apply_selection(&[]).await;
        }
    }

    /// Clear the panel's notice
    pub fn dismiss_notice(&self) {
        self.panel.send_if_modified(|panel| panel.notice.take().is_some());
    }

    /// Feed host notifications into the engine until the channel closes
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<CanvasEvent>) {
        loop {
            match events.recv().await {
                Ok(CanvasEvent::SelectionChanged(ids)) => self.on_selection_change(ids),
                Ok(CanvasEvent::GeometryChanged(id)) => {
                    self.on_geometry_change(&id);
                }
                Ok(CanvasEvent::ObjectRemoved(id)) => self.on_object_removed(&id).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "canvas events lagged, re-reading selection");
                    match self.host.selection().await {
                        Ok(objects) => {
                            self.on_selection_change(objects.into_iter().map(|o| o.id).collect());
                        }
                        Err(e) => tracing::warn!(error = %e, "selection re-read failed"),
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("canvas event stream closed");
    }

    /// Subscribe to the host and run the event loop on a task
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let events = self.host.subscribe();
        tokio::spawn(Arc::clone(self).run(events))
    }

    fn empty_record(&self) -> AnnotationRecord {
        AnnotationRecord::empty(self.config.variant, self.codec.schema_version())
    }
}

impl<H: CanvasHost> std::fmt::Debug for SyncEngine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("namespace", &self.config.namespace)
            .field("selection", &self.selection)
            .field("saves", &self.saves)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotate_host::{CanvasObject, MemoryHost, Rect};
    use serde_json::json;
    use std::time::Duration;

    fn engine_with(user: &str) -> (Arc<MemoryHost>, Arc<SyncEngine<MemoryHost>>) {
        let host = Arc::new(MemoryHost::with_user(user));
        for id in ["a", "b"] {
            host.add_object(
                CanvasObject::new(id, "sticky_note", Rect::new(0.0, 0.0, 100.0, 100.0))
                    .with_creator("alice"),
            );
        }
        let engine = SyncEngine::new(Arc::clone(&host), EngineConfig::default());
        (host, engine)
    }

    fn id(raw: &str) -> ObjectId {
        ObjectId::new(raw)
    }

    #[tokio::test]
    async fn multiple_selection_disables_editing() {
        let (_host, engine) = engine_with("alice");
        engine.apply_selection(&[id("a"), id("b")]).await;

        let panel = engine.panel();
        assert_eq!(panel.selection, SelectionKind::Multiple(2));
        assert!(panel.active.is_none());
        assert!(!panel.can_edit);
        assert!(panel.notice.is_some());
        assert!(matches!(engine.edit_content("x"), Err(SyncError::NoActiveObject)));
    }

    #[tokio::test]
    async fn read_failure_gives_read_only_empty_panel() {
        let (host, engine) = engine_with("alice");
        host.fail_reads(true);
        engine.apply_selection(&[id("a")]).await;

        let panel = engine.panel();
        assert_eq!(panel.record.as_ref().and_then(AnnotationRecord::content), Some(""));
        assert!(!panel.can_edit);
        assert!(panel.notice.is_some());
    }

    #[tokio::test]
    async fn corrupt_payload_stays_editable() {
        let (host, engine) = engine_with("alice");
        host.seed_metadata(&id("a"), "annotate-app", json!({"annotate": "legacy text"}));
        engine.apply_selection(&[id("a")]).await;

        let panel = engine.panel();
        assert!(panel.can_edit);
        assert_eq!(panel.record.as_ref().and_then(AnnotationRecord::content), Some(""));
        assert!(panel.notice.is_some());

        engine.dismiss_notice();
        assert!(engine.panel().notice.is_none());
    }

    #[tokio::test]
    async fn identity_failure_is_read_only_with_notice() {
        let (host, engine) = engine_with("alice");
        host.set_user(None);
        engine.apply_selection(&[id("a")]).await;

        let panel = engine.panel();
        assert!(!panel.can_edit);
        assert!(panel.notice.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn edit_marks_pending_then_saved() {
        let (host, engine) = engine_with("alice");
        engine.apply_selection(&[id("a")]).await;

        engine.edit_content("<p>Hi</p>").unwrap();
        let panel = engine.panel();
        assert_eq!(panel.save, SaveStatus::Pending);
        assert_eq!(panel.plain_text_len, 2);

        tokio::time::sleep(Duration::from_millis(450)).await;
        let panel = engine.panel();
        assert_eq!(panel.save, SaveStatus::Saved);
        assert_eq!(panel.record.unwrap().author_id, Some("alice".into()));
        assert_eq!(host.stats().markers_created, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_local_text() {
        let (host, engine) = engine_with("alice");
        engine.apply_selection(&[id("a")]).await;
        host.fail_writes(true);

        engine.edit_content("keep me").unwrap();
        tokio::time::sleep(Duration::from_millis(450)).await;

        let panel = engine.panel();
        assert_eq!(panel.save, SaveStatus::Unsaved);
        assert_eq!(panel.record.as_ref().and_then(AnnotationRecord::content), Some("keep me"));
        assert!(panel.notice.as_ref().is_some_and(|n| n.retryable));
    }

    #[tokio::test]
    async fn wrong_variant_edit_is_rejected() {
        let (_host, engine) = engine_with("alice");
        engine.apply_selection(&[id("a")]).await;

        let err = engine.edit_sections(|book| book.add_section("Ideas")).unwrap_err();
        assert!(matches!(
            err,
            SyncError::VariantMismatch {
                expected: AnnotationVariant::Sections
            }
        ));
        assert_eq!(engine.panel().save, SaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_object_drops_pending_save_and_panel() {
        let (host, engine) = engine_with("alice");
        engine.apply_selection(&[id("a")]).await;
        engine.edit_content("bye").unwrap();

        host.remove_object(&id("a"));
        engine.on_object_removed(&id("a")).await;
        tokio::time::sleep(Duration::from_millis(450)).await;

        assert_eq!(host.stats().metadata_writes, 0);
        assert_eq!(engine.panel().selection, SelectionKind::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn event_loop_follows_host_selection() {
        let (host, engine) = engine_with("alice");
        let task = engine.spawn();

        host.select(&[id("a")]);
        host.select(&[id("b")]);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.panel().active, Some(id("b")));
        // Only the last event of the burst loaded anything
        assert_eq!(host.stats().metadata_reads, 1);
        task.abort();
    }
}
