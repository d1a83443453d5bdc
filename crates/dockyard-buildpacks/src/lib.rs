//! Buildpack runtime detection.
//!
//! Given a directory of a hosted repository, decides which buildpacks apply and which runtime
//! version they should use. Results are reported per buildpack provider (Paketo and Heroku):
//! every runtime ends up either in a provider's `detected` list or in its `others` list.

pub mod error;
pub mod nodejs;
pub mod version;

pub use error::{DetectError, DetectResult};
pub use nodejs::NodeRuntime;

use async_trait::async_trait;
use dockyard_core::repository::{RepoContents, RepoLocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Configuration a detected buildpack is run with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackConfig {
    /// `scripts` of the project manifest.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    /// Runtime version constraint.
    pub node_engine: String,
}

/// A buildpack of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackInfo {
    pub name: String,
    pub buildpack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BuildpackConfig>,
}

impl BuildpackInfo {
    pub fn new(name: &str, buildpack: &str) -> Self {
        Self {
            name: name.to_string(),
            buildpack: buildpack.to_string(),
            config: None,
        }
    }
}

/// Detection results of a buildpack provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderInfo {
    pub name: String,
    /// Builder images of the provider.
    pub builders: Vec<String>,
    pub detected: Vec<BuildpackInfo>,
    pub others: Vec<BuildpackInfo>,
}

impl BuilderInfo {
    pub fn new(name: &str, builders: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            builders: builders.iter().map(|b| b.to_string()).collect(),
            detected: Vec::new(),
            others: Vec::new(),
        }
    }

    pub fn paketo() -> Self {
        Self::new("Paketo", &["paketobuildpacks/builder:full"])
    }

    pub fn heroku() -> Self {
        Self::new("Heroku", &["heroku/buildpacks:20"])
    }
}

/// Detection results of both providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub paketo: BuilderInfo,
    pub heroku: BuilderInfo,
}

impl Default for DetectionReport {
    fn default() -> Self {
        Self {
            paketo: BuilderInfo::paketo(),
            heroku: BuilderInfo::heroku(),
        }
    }
}

/// A language runtime that can be detected in a directory.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Name of this runtime.
    fn name(&self) -> &'static str;

    /// Detect the runtime in `location`, whose entries are `listing`.
    ///
    /// Results are appended to the report. On failure the runtime is still recorded under
    /// `others` of both providers before the error is returned.
    async fn detect(
        &self,
        contents: &dyn RepoContents,
        listing: &[String],
        location: &RepoLocation,
        report: &mut DetectionReport,
    ) -> DetectResult<()>;
}

/// Runs every known runtime against a repository directory.
pub struct Detector {
    runtimes: Vec<Box<dyn Runtime>>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    pub fn new() -> Self {
        Self {
            runtimes: vec![Box::new(NodeRuntime::new())],
        }
    }

    /// List `location` and detect all runtimes into `report`.
    ///
    /// Detection stops at the first failing runtime.
    pub async fn detect(
        &self,
        contents: &dyn RepoContents,
        location: &RepoLocation,
        report: &mut DetectionReport,
    ) -> DetectResult<()> {
        let listing = contents
            .list_directory(location)
            .await
            .map_err(|source| DetectError::Fetch {
                file: if location.path.is_empty() {
                    "/".to_string()
                } else {
                    location.path.clone()
                },
                source,
            })?;

        debug!(location = %location, entries = listing.len(), "Listed directory");

        for runtime in &self.runtimes {
            runtime.detect(contents, &listing, location, report).await?;
        }

        info!(
            location = %location,
            detected = report.paketo.detected.len(),
            "Buildpack detection finished"
        );
        Ok(())
    }
}
