//! Selection tracking
//!
//! Host selection notifications arrive in bursts (drag-select, shift-click).
//! They are debounced so only the last event of a burst is applied. Each
//! applied transition opens a new *epoch*; work started for an older epoch
//! (a metadata load still in flight) checks its ticket and discards itself.
//!
//! Every transition rewrites the editing reference: `Single` points it at the
//! selected object, anything else clears it, so pending saves for the old
//! object fail their guard.

use crate::persistence::EditingGuard;
use crate::timer::KeyedDebouncer;
use annotate_host::ObjectId;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the current selection allows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SelectionKind {
    /// Nothing selected
    #[default]
    Empty,
    /// Exactly one object selected
    Single(ObjectId),
    /// Several objects selected; editing disabled
    Multiple(usize),
}

impl SelectionKind {
    /// Classify a set of selected ids
    #[must_use]
    pub fn from_ids(ids: &[ObjectId]) -> Self {
        match ids {
            [] => Self::Empty,
            [only] => Self::Single(only.clone()),
            many => Self::Multiple(many.len()),
        }
    }

    /// Selected object when exactly one is selected
    #[inline]
    #[must_use]
    pub fn single(&self) -> Option<&ObjectId> {
        match self {
            Self::Single(id) => Some(id),
            _ => None,
        }
    }
}

/// Proof that a transition is still the latest one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    epoch: u64,
    kind: SelectionKind,
}

impl SelectionTicket {
    /// Selection this ticket was issued for
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &SelectionKind {
        &self.kind
    }
}

/// Debounces selection events and versions transitions
pub struct SelectionTracker {
    debouncer: KeyedDebouncer<()>,
    epoch: AtomicU64,
    guard: Arc<EditingGuard>,
}

impl SelectionTracker {
    /// Create tracker driving `guard`
    #[must_use]
    pub fn new(window: Duration, guard: Arc<EditingGuard>) -> Self {
        Self {
            debouncer: KeyedDebouncer::new(window),
            epoch: AtomicU64::new(0),
            guard,
        }
    }

    /// Record a raw selection event before it settles
    ///
    /// Saves for the object being edited stop passing the guard as soon as
    /// the selection leaves it; only the settled transition sets it again.
    pub fn observe(&self, ids: &[ObjectId]) {
        let current = self.guard.current();
        let unchanged = matches!((ids, current.as_ref()), ([only], Some(editing)) if only == editing);
        if !unchanged && current.is_some() {
            tracing::debug!(editing = ?current, incoming = ids.len(), "selection left edited object");
            self.guard.clear();
        }
    }

    /// Queue the handling of a selection event; only the last one in a burst runs
    pub fn submit<F>(&self, apply: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.debouncer.schedule((), apply);
    }

    /// Check if a selection event is waiting for its window
    #[must_use]
    pub fn is_settling(&self) -> bool {
        self.debouncer.is_pending(&())
    }

    /// Start a transition to `kind`
    ///
    /// Retargets the editing reference and invalidates all older tickets.
    pub fn begin(&self, kind: SelectionKind) -> SelectionTicket {
        match &kind {
            SelectionKind::Single(id) => self.guard.set(id.clone()),
            SelectionKind::Empty | SelectionKind::Multiple(_) => self.guard.clear(),
        }
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(epoch, selection = ?kind, "selection transition");
        SelectionTicket { epoch, kind }
    }

    /// Check if `ticket` belongs to the latest transition
    #[must_use]
    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        self.epoch.load(Ordering::SeqCst) == ticket.epoch
    }
}

impl std::fmt::Debug for SelectionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionTracker")
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .field("editing", &self.guard.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn ids(raw: &[&str]) -> Vec<ObjectId> {
        raw.iter().map(|id| ObjectId::new(*id)).collect()
    }

    #[test]
    fn classifies_selection() {
        assert_eq!(SelectionKind::from_ids(&[]), SelectionKind::Empty);
        assert_eq!(
            SelectionKind::from_ids(&ids(&["a"])),
            SelectionKind::Single(ObjectId::new("a"))
        );
        assert_eq!(SelectionKind::from_ids(&ids(&["a", "b", "c"])), SelectionKind::Multiple(3));
    }

    #[test]
    fn transitions_retarget_editing_reference() {
        let guard = Arc::new(EditingGuard::new());
        let tracker = SelectionTracker::new(Duration::from_millis(150), Arc::clone(&guard));

        tracker.begin(SelectionKind::Single(ObjectId::new("a")));
        assert_eq!(guard.current(), Some(ObjectId::new("a")));

        tracker.begin(SelectionKind::Multiple(2));
        assert_eq!(guard.current(), None);

        tracker.begin(SelectionKind::Single(ObjectId::new("b")));
        tracker.begin(SelectionKind::Empty);
        assert_eq!(guard.current(), None);
    }

    #[test]
    fn raw_event_leaving_edited_object_clears_guard() {
        let guard = Arc::new(EditingGuard::new());
        let tracker = SelectionTracker::new(Duration::from_millis(150), Arc::clone(&guard));
        tracker.begin(SelectionKind::Single(ObjectId::new("a")));

        tracker.observe(&ids(&["a"]));
        assert_eq!(guard.current(), Some(ObjectId::new("a")));

        tracker.observe(&ids(&["a", "b"]));
        assert_eq!(guard.current(), None);

        tracker.begin(SelectionKind::Single(ObjectId::new("a")));
        tracker.observe(&ids(&["b"]));
        assert!(guard.check(&ObjectId::new("a")).is_err());

        tracker.begin(SelectionKind::Single(ObjectId::new("a")));
        tracker.observe(&[]);
        assert_eq!(guard.current(), None);
    }

    #[test]
    fn older_tickets_go_stale() {
        let tracker = SelectionTracker::new(Duration::from_millis(150), Arc::new(EditingGuard::new()));
        let first = tracker.begin(SelectionKind::Single(ObjectId::new("a")));
        assert!(tracker.is_current(&first));

        let second = tracker.begin(SelectionKind::Single(ObjectId::new("a")));
        assert!(!tracker.is_current(&first));
        assert!(tracker.is_current(&second));
        assert_eq!(second.kind().single(), Some(&ObjectId::new("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_applies_only_last_event() {
        let tracker = SelectionTracker::new(Duration::from_millis(150), Arc::new(EditingGuard::new()));
        let applied = Arc::new(Mutex::new(Vec::new()));

        for n in 1..=4 {
            let applied = Arc::clone(&applied);
            tracker.submit(async move { applied.lock().push(n) });
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        assert!(tracker.is_settling());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*applied.lock(), vec![4]);
        assert!(!tracker.is_settling());
    }
}
