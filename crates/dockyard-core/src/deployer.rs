//! Deployment notifier trait.
//!
//! Dockyard does not roll out releases itself. Once an image is pushed, a notifier asks the
//! release-management side to move the release to the new tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The release a rollout is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyTarget {
    pub project_id: u64,
    pub cluster_id: u64,
    /// Release name.
    pub release: String,
    pub namespace: String,
}

/// Trait for deployment notifiers.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Name of this notifier.
    fn name(&self) -> &'static str;

    /// Request a rollout of `tag` for the target release.
    async fn notify(&self, target: &NotifyTarget, tag: &str) -> Result<()>;
}
