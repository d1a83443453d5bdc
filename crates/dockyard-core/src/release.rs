//! Release descriptors and the release API trait.
//!
//! A release is the deployed instance of an application on a cluster. Dockyard only reads
//! releases; creating and updating them is the API server's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::value::{self, ConfigObject};

/// A deployed application, as returned by the release API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    /// Application name.
    pub name: String,
    /// Kubernetes namespace of the release.
    pub namespace: String,
    /// Resolved configuration (chart values) of the release.
    #[serde(default)]
    pub config: ConfigObject,
    /// Git source the release is built from, if it was connected to a repository.
    #[serde(default, rename = "git_action_config")]
    pub git_source: Option<GitSourceConfig>,
}

impl ReleaseDescriptor {
    /// The `image.repository` value of the release configuration.
    pub fn image_repository(&self) -> Result<String> {
        let image = value::get_path(&self.config, &["image"])?;
        Ok(value::get_string(image, "repository")?.to_string())
    }

    /// The `image.tag` value of the release configuration.
    pub fn image_tag(&self) -> Result<String> {
        let image = value::get_path(&self.config, &["image"])?;
        Ok(value::get_string(image, "tag")?.to_string())
    }
}

/// Git source configuration attached to a release.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitSourceConfig {
    /// Repository identifier, `owner/name`.
    pub git_repo: String,
    /// Image repository the built image is pushed to.
    pub image_repo_uri: String,
    /// Dockerfile path inside the repository; empty for buildpack builds.
    #[serde(default)]
    pub dockerfile_path: String,
    #[serde(default)]
    pub git_branch: String,
    /// Git installation the repository is accessed through.
    #[serde(default)]
    pub git_repo_id: u64,
}

impl GitSourceConfig {
    /// Repository identifier with the owner separator replaced by a hyphen.
    ///
    /// Downloaded archives and their extracted directories are named after this value.
    pub fn sanitized_repo(&self) -> String {
        self.git_repo.replacen('/', "-", 1)
    }

    pub fn has_dockerfile(&self) -> bool {
        !self.dockerfile_path.is_empty()
    }
}

/// Signed archive download location for a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveUrl {
    #[serde(rename = "url")]
    pub url: String,
    #[serde(default)]
    pub latest_commit_sha: String,
}

/// Webhook registration for a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseWebhook {
    pub webhook_token: String,
}

/// Client for the release API.
#[async_trait]
pub trait ReleaseApi: Send + Sync {
    /// Fetch a release by name.
    async fn get_release(
        &self,
        project_id: u64,
        cluster_id: u64,
        namespace: &str,
        name: &str,
    ) -> Result<ReleaseDescriptor>;

    /// Get a signed archive URL and the latest commit of a repository.
    async fn get_repo_archive_url(
        &self,
        project_id: u64,
        git_source: &GitSourceConfig,
    ) -> Result<ArchiveUrl>;

    /// Get the webhook registration of a release.
    async fn get_release_webhook(
        &self,
        project_id: u64,
        cluster_id: u64,
        name: &str,
        namespace: &str,
    ) -> Result<ReleaseWebhook>;

    /// Ask the cluster to roll the release over to `tag`.
    async fn deploy_with_webhook(&self, webhook_token: &str, tag: &str) -> Result<()>;
}
