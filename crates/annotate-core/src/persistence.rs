//! Debounced persistence
//!
//! Local edits are collapsed per object into one trailing write. Every write
//! is bound to the object that was being edited when the edit happened
//! (its *origin*) and is dropped if that object is no longer the one being
//! edited when the timer fires.
//!
//! A commit runs, in order:
//!
//! 1. staleness guard (origin still being edited)
//! 2. editor role re-verified against a fresh object lookup
//! 3. record stamped with schema, author and time
//! 4. size ceiling enforced on the encoded payload
//! 5. read-merge-write of the `annotate` key
//! 6. cache updated with the written record
//!
//! A failure at any step leaves the store untouched.

use crate::cache::ObjectCache;
use crate::codec::MetadataCodec;
use crate::error::{SyncError, SyncResult};
use crate::record::AnnotationRecord;
use crate::role::EditorRoleResolver;
use crate::store::MetadataStore;
use crate::timer::KeyedDebouncer;
use annotate_host::{CanvasHost, ObjectId};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Reference to the object currently open for editing
#[derive(Debug, Default)]
pub struct EditingGuard {
    current: Mutex<Option<ObjectId>>,
}

impl EditingGuard {
    /// Create guard with nothing being edited
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as the object being edited
    pub fn set(&self, id: ObjectId) {
        *self.current.lock() = Some(id);
    }

    /// Nothing is being edited
    pub fn clear(&self) {
        *self.current.lock() = None;
    }

    /// Object being edited
    #[must_use]
    pub fn current(&self) -> Option<ObjectId> {
        self.current.lock().clone()
    }

    /// Check that `origin` is still the object being edited
    ///
    /// # Errors
    /// `SyncError::StaleSelectionGuard` naming the origin and the current object
    pub fn check(&self, origin: &ObjectId) -> SyncResult<()> {
        let current = self.current.lock();
        if current.as_ref() == Some(origin) {
            Ok(())
        } else {
            Err(SyncError::StaleSelectionGuard {
                origin: origin.clone(),
                active: current.clone(),
            })
        }
    }
}

/// A record that reached the store
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// Record as written, with its stamp
    pub record: AnnotationRecord,
    /// Encoded size in bytes
    pub size: usize,
}

/// Runs the commit steps for one record
pub struct Persister<H> {
    store: Arc<MetadataStore<H>>,
    codec: MetadataCodec,
    cache: ObjectCache,
    role: Arc<EditorRoleResolver<H>>,
    guard: Arc<EditingGuard>,
}

impl<H: CanvasHost> Persister<H> {
    /// Create persister
    #[must_use]
    pub fn new(
        store: Arc<MetadataStore<H>>,
        codec: MetadataCodec,
        cache: ObjectCache,
        role: Arc<EditorRoleResolver<H>>,
        guard: Arc<EditingGuard>,
    ) -> Self {
        Self {
            store,
            codec,
            cache,
            role,
            guard,
        }
    }

    /// Write `record` to `origin` if it is still being edited by its editor
    ///
    /// # Errors
    /// - `StaleSelectionGuard` when editing moved to another object
    /// - `NotEditor` / `IdentityUnavailable` from the role check
    /// - `PayloadTooLarge` when the encoded record is over the ceiling
    /// - `ReadFailure` / `WriteFailure` from the host
    pub async fn commit(&self, origin: &ObjectId, mut record: AnnotationRecord) -> SyncResult<Committed> {
        self.checked(origin)?;
        let author = self.role.authorize(origin).await?;
        // Role lookup awaited; selection may have moved meanwhile
        self.checked(origin)?;

        record.touch(self.codec.schema_version(), Some(author), now_ms());
        let encoded = self
            .codec
            .encode(&record)
            .map_err(|e| SyncError::from_encode(origin.clone(), e))?;

        let size = encoded.size;
        self.store
            .update(origin, move |ns| ns.set_annotation(encoded.value))
            .await
            .map_err(|e| SyncError::write_failure(origin.clone(), e))?;

        self.cache.put(origin.clone(), record.clone()).await;
        tracing::debug!(object = %origin, bytes = size, "annotation persisted");
        Ok(Committed { record, size })
    }

    fn checked(&self, origin: &ObjectId) -> SyncResult<()> {
        self.guard.check(origin).map_err(|e| {
            tracing::warn!(error = %e, "dropping write for object no longer being edited");
            e
        })
    }
}

impl<H> std::fmt::Debug for Persister<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("codec", &self.codec)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

/// Per-object trailing-edge save queue
pub struct PersistenceQueue<H> {
    persister: Arc<Persister<H>>,
    debouncer: KeyedDebouncer<ObjectId>,
}

impl<H: CanvasHost> PersistenceQueue<H> {
    /// Create queue with a quiet window
    #[must_use]
    pub fn new(persister: Persister<H>, window: Duration) -> Self {
        Self {
            persister: Arc::new(persister),
            debouncer: KeyedDebouncer::new(window),
        }
    }

    /// Schedule `record` for `origin`, replacing any pending record
    ///
    /// `then` receives the commit outcome once the window has passed.
    pub fn schedule<F, Fut>(&self, origin: ObjectId, record: AnnotationRecord, then: F)
    where
        F: FnOnce(SyncResult<Committed>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let persister = Arc::clone(&self.persister);
        let target = origin.clone();
        self.debouncer.schedule(origin, async move {
            let outcome = persister.commit(&target, record).await;
            then(outcome).await;
        });
    }

    /// Commit immediately, skipping the window
    ///
    /// # Errors
    /// See [`Persister::commit`]
    pub async fn commit_now(&self, origin: &ObjectId, record: AnnotationRecord) -> SyncResult<Committed> {
        self.debouncer.cancel(origin);
        self.persister.commit(origin, record).await
    }

    /// Drop the pending save for an object
    pub fn cancel(&self, origin: &ObjectId) -> bool {
        self.debouncer.cancel(origin)
    }

    /// Run the pending save for an object now
    pub async fn flush(&self, origin: &ObjectId) -> bool {
        self.debouncer.flush(origin).await
    }

    /// Run every pending save now
    pub async fn flush_all(&self) -> usize {
        self.debouncer.flush_all().await
    }

    /// Check if an object has a save waiting
    #[must_use]
    pub fn is_pending(&self, origin: &ObjectId) -> bool {
        self.debouncer.is_pending(origin)
    }
}

impl<H> std::fmt::Debug for PersistenceQueue<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceQueue")
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
