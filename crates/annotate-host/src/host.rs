//! The canvas host contract
//!
//! The engine never talks to a canvas platform directly; it goes through
//! [`CanvasHost`]. Every method is a suspension point.

use crate::error::HostResult;
use crate::types::{CanvasEvent, CanvasObject, MarkerConfig, ObjectId, UserId, Widget, WidgetId};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Canvas platform operations consumed by the sync engine
///
/// Metadata is stored per object under an application namespace. The value
/// stored under a namespace is a JSON object; callers own the keys inside it
/// and must read-merge-write to preserve keys they did not touch.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CanvasHost: Send + Sync + 'static {
    /// Resolve the user of the current session
    ///
    /// # Errors
    /// `HostError::IdentityUnavailable` when the session is not ready
    async fn current_user_id(&self) -> HostResult<UserId>;

    /// Look up an object by id; `Ok(None)` when it no longer exists
    async fn get_object(&self, id: &ObjectId) -> HostResult<Option<CanvasObject>>;

    /// Read the namespace value stored on an object
    async fn get_metadata(&self, id: &ObjectId, namespace: &str) -> HostResult<Option<Value>>;

    /// Replace the namespace value stored on an object
    async fn set_metadata(&self, id: &ObjectId, namespace: &str, value: Value) -> HostResult<()>;

    /// Objects currently selected
    async fn selection(&self) -> HostResult<Vec<CanvasObject>>;

    /// Create a marker widget
    async fn create_marker(&self, config: MarkerConfig) -> HostResult<Widget>;

    /// Look up a widget by id; `Ok(None)` when it no longer exists
    async fn get_widget(&self, id: &WidgetId) -> HostResult<Option<Widget>>;

    /// Move a widget so its top-left corner sits at `(x, y)`
    async fn move_widget(&self, id: &WidgetId, x: f64, y: f64) -> HostResult<()>;

    /// Remove a widget from the canvas
    async fn remove_widget(&self, id: &WidgetId) -> HostResult<()>;

    /// Subscribe to canvas notifications
    fn subscribe(&self) -> broadcast::Receiver<CanvasEvent>;
}
