//! Editor-role resolution
//!
//! Only the creator of an object may change its annotation. The check fails
//! closed: a missing object, an unresolvable current user, or any mismatch
//! between `created_by` and the current user means "not an editor".
//!
//! The role is only known asynchronously, so write paths call
//! [`EditorRoleResolver::authorize`] again at write time instead of trusting
//! the answer computed at selection time.

use crate::error::{SyncError, SyncResult};
use annotate_host::{CanvasHost, CanvasObject, HostError, ObjectId, UserId};
use std::sync::Arc;

/// Decides whether the current user may mutate an object's annotation
pub struct EditorRoleResolver<H> {
    host: Arc<H>,
}

impl<H: CanvasHost> EditorRoleResolver<H> {
    /// Create resolver
    #[inline]
    #[must_use]
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    /// Current session user
    ///
    /// # Errors
    /// `SyncError::IdentityUnavailable` when the host session is not ready
    pub async fn current_user(&self) -> SyncResult<UserId> {
        self.host.current_user_id().await.map_err(|e| match e {
            HostError::IdentityUnavailable(reason) => SyncError::IdentityUnavailable(reason),
            other => SyncError::IdentityUnavailable(other.to_string()),
        })
    }

    /// True when the current user created `object`
    pub async fn is_editor(&self, object: Option<&CanvasObject>) -> bool {
        let Some(object) = object else {
            tracing::debug!("role check on absent object");
            return false;
        };
        match self.check(object).await {
            Ok(_) => true,
            Err(SyncError::NotEditor(_)) => false,
            Err(e) => {
                tracing::warn!(object = %object.id, error = %e, "editor role resolution failed");
                false
            }
        }
    }

    /// Re-fetch the object and confirm the current user may edit it
    ///
    /// Returns the user id to stamp as author.
    ///
    /// # Errors
    /// `SyncError::NotEditor` for a missing object or another creator,
    /// `SyncError::IdentityUnavailable` when the user cannot be resolved
    pub async fn authorize(&self, id: &ObjectId) -> SyncResult<UserId> {
        let object = match self.host.get_object(id).await {
            Ok(Some(object)) => object,
            Ok(None) => return Err(SyncError::NotEditor(id.clone())),
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "object lookup failed during role check");
                return Err(SyncError::NotEditor(id.clone()));
            }
        };
        self.check(&object).await
    }

    async fn check(&self, object: &CanvasObject) -> SyncResult<UserId> {
        let user = self.current_user().await?;
        match &object.created_by {
            Some(creator) if *creator == user => Ok(user),
            _ => Err(SyncError::NotEditor(object.id.clone())),
        }
    }
}

impl<H> std::fmt::Debug for EditorRoleResolver<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorRoleResolver").finish_non_exhaustive()
    }
}
