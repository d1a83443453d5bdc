//! Release webhook notifier.
//!
//! Rollouts are requested by looking up the release's webhook token and calling the deploy
//! webhook with the freshly pushed tag.

use async_trait::async_trait;
use dockyard_core::deployer::{Notifier, NotifyTarget};
use dockyard_core::release::ReleaseApi;
use dockyard_core::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Notifier that rolls a release over through its deploy webhook.
pub struct WebhookNotifier {
    api: Arc<dyn ReleaseApi>,
}

impl WebhookNotifier {
    pub fn new(api: Arc<dyn ReleaseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, target: &NotifyTarget, tag: &str) -> Result<()> {
        let webhook = self
            .api
            .get_release_webhook(
                target.project_id,
                target.cluster_id,
                &target.release,
                &target.namespace,
            )
            .await
            .map_err(|e| {
                warn!(release = %target.release, error = %e, "Failed to look up release webhook");
                Error::NotifyFailed(format!(
                    "could not get webhook of release {}: {}",
                    target.release, e
                ))
            })?;

        self.api
            .deploy_with_webhook(&webhook.webhook_token, tag)
            .await
            .map_err(|e| {
                Error::NotifyFailed(format!(
                    "deploy webhook for release {} failed: {}",
                    target.release, e
                ))
            })?;

        info!(
            release = %target.release,
            namespace = %target.namespace,
            tag = %tag,
            "Rollout requested"
        );
        Ok(())
    }
}
