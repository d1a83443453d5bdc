//! CLI command implementations.

pub mod deploy;
pub mod detect;
pub mod env;

use anyhow::{Context as _, Result};
use dockyard_api::ApiClient;
use dockyard_config::{Settings, load_settings};
use dockyard_core::release::{ReleaseApi, ReleaseDescriptor};
use std::path::Path;

use crate::ReleaseArgs;

/// Settings merged with command-line overrides.
pub struct Context {
    pub settings: Settings,
}

impl Context {
    pub fn load(
        config: Option<&Path>,
        api_url: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let mut settings = match config.map(Path::to_path_buf).or_else(Settings::default_path) {
            Some(path) => load_settings(&path)
                .with_context(|| format!("Failed to read settings: {}", path.display()))?,
            None => Settings::default(),
        };

        if api_url.is_some() {
            settings.api_url = api_url;
        }
        if token.is_some() {
            settings.token = token;
        }

        Ok(Self { settings })
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        let url = self
            .settings
            .api_url
            .as_deref()
            .context("No API URL configured; pass --api-url or set api-url in the settings")?;
        ApiClient::new(url, self.settings.token.clone()).context("Invalid API URL")
    }

    fn project_id(&self, flag: Option<u64>) -> Result<u64> {
        flag.or(self.settings.project_id)
            .context("No project configured; pass --project or set project in the settings")
    }

    fn cluster_id(&self, flag: Option<u64>) -> Result<u64> {
        flag.or(self.settings.cluster_id)
            .context("No cluster configured; pass --cluster or set cluster in the settings")
    }

    /// Project and cluster of a release command.
    pub fn target(&self, release: &ReleaseArgs) -> Result<(u64, u64)> {
        Ok((
            self.project_id(release.project)?,
            self.cluster_id(release.cluster)?,
        ))
    }
}

/// Fetch the release a command operates on.
pub async fn fetch_release(
    api: &dyn ReleaseApi,
    project_id: u64,
    cluster_id: u64,
    release: &ReleaseArgs,
) -> Result<ReleaseDescriptor> {
    api.get_release(project_id, cluster_id, &release.namespace, &release.app)
        .await
        .with_context(|| {
            format!(
                "Failed to get release {} in namespace {}",
                release.app, release.namespace
            )
        })
}
