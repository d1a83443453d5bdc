//! Node.js runtime detection.

use async_trait::async_trait;
use dockyard_core::repository::{RepoContents, RepoLocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{DetectError, DetectResult};
use crate::version::{
    DEFAULT_NODE_ENGINE, NODE_VERSION, NVMRC, format_nvmrc, validate_node_version, validate_nvmrc,
};
use crate::{BuildpackConfig, BuildpackInfo, DetectionReport, Runtime};

const NAME: &str = "NodeJS";
const PAKETO_BUILDPACK: &str = "gcr.io/paketo-buildpacks/nodejs";
const HEROKU_BUILDPACK: &str = "heroku/nodejs";

const PACKAGE_JSON: &str = "package.json";
const YARN_LOCK: &str = "yarn.lock";
const ENTRYPOINTS: [&str; 4] = ["server.js", "app.js", "main.js", "index.js"];

/// Runtime indicator found by a directory scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionSignal {
    Yarn,
    Npm,
    Standalone,
}

type Scanner = fn(&[String]) -> Option<VersionSignal>;

const SCANNERS: [Scanner; 3] = [scan_lockfile, scan_manifest, scan_entrypoint];

fn contains(listing: &[String], name: &str) -> bool {
    listing.iter().any(|entry| entry == name)
}

/// `yarn` when both the yarn lockfile and the package manifest are present.
pub fn scan_lockfile(listing: &[String]) -> Option<VersionSignal> {
    (contains(listing, YARN_LOCK) && contains(listing, PACKAGE_JSON)).then_some(VersionSignal::Yarn)
}

/// `npm` when the package manifest is present.
pub fn scan_manifest(listing: &[String]) -> Option<VersionSignal> {
    contains(listing, PACKAGE_JSON).then_some(VersionSignal::Npm)
}

/// `standalone` when a conventional entrypoint script is present.
pub fn scan_entrypoint(listing: &[String]) -> Option<VersionSignal> {
    ENTRYPOINTS
        .iter()
        .any(|name| contains(listing, name))
        .then_some(VersionSignal::Standalone)
}

/// Run all scanners concurrently over the same listing.
pub async fn scan(listing: &[String]) -> DetectResult<Vec<VersionSignal>> {
    let listing: Arc<[String]> = Arc::from(listing);
    let mut set = JoinSet::new();

    for scanner in SCANNERS {
        let listing = Arc::clone(&listing);
        set.spawn(async move { scanner(&listing) });
    }

    let mut signals = Vec::with_capacity(SCANNERS.len());
    while let Some(result) = set.join_next().await {
        match result {
            Ok(Some(signal)) => signals.push(signal),
            Ok(None) => {}
            Err(e) => return Err(DetectError::Scan(e.to_string())),
        }
    }

    Ok(signals)
}

/// Fields of `package.json` the detector reads. A `null` field counts as absent.
#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: Option<BTreeMap<String, String>>,
    #[serde(default)]
    engines: Option<Engines>,
}

#[derive(Debug, Default, Deserialize)]
struct Engines {
    #[serde(default)]
    node: Option<String>,
}

enum Detection {
    Detected(Option<BuildpackConfig>),
    Undetected,
}

/// Detects Node.js projects and the Node version they need.
#[derive(Debug, Default)]
pub struct NodeRuntime;

impl NodeRuntime {
    pub fn new() -> Self {
        Self
    }

    async fn classify(
        &self,
        contents: &dyn RepoContents,
        listing: &[String],
        location: &RepoLocation,
    ) -> DetectResult<Detection> {
        let signals = scan(listing).await?;
        debug!(location = %location, signals = ?signals, "Scanned directory");

        if signals.contains(&VersionSignal::Yarn) || signals.contains(&VersionSignal::Npm) {
            let config = self.resolve_config(contents, listing, location).await?;
            Ok(Detection::Detected(Some(config)))
        } else if signals.contains(&VersionSignal::Standalone) {
            Ok(Detection::Detected(None))
        } else {
            Ok(Detection::Undetected)
        }
    }

    async fn resolve_config(
        &self,
        contents: &dyn RepoContents,
        listing: &[String],
        location: &RepoLocation,
    ) -> DetectResult<BuildpackConfig> {
        let manifest = fetch(contents, location, PACKAGE_JSON).await?;
        let package: PackageJson =
            serde_json::from_str(&manifest).map_err(|e| DetectError::Decode {
                file: location.file_path(PACKAGE_JSON),
                message: e.to_string(),
            })?;

        let declared = package.engines.and_then(|engines| engines.node);
        let node_engine = match declared.filter(|node| !node.is_empty()) {
            Some(node) => node,
            None => pinned_version(contents, listing, location)
                .await?
                .unwrap_or_else(|| DEFAULT_NODE_ENGINE.to_string()),
        };

        Ok(BuildpackConfig {
            scripts: package.scripts.unwrap_or_default(),
            node_engine,
        })
    }
}

/// Version pinned by `.nvmrc`, else by `.node-version`.
async fn pinned_version(
    contents: &dyn RepoContents,
    listing: &[String],
    location: &RepoLocation,
) -> DetectResult<Option<String>> {
    if contains(listing, NVMRC) {
        let content = fetch(contents, location, NVMRC).await?;
        let version = format_nvmrc(&validate_nvmrc(&content)?);
        // `*` pins nothing.
        if version != "*" {
            return Ok(Some(version));
        }
    }

    if contains(listing, NODE_VERSION) {
        let content = fetch(contents, location, NODE_VERSION).await?;
        let version = validate_node_version(&content)?;
        if !version.is_empty() {
            return Ok(Some(version));
        }
    }

    Ok(None)
}

async fn fetch(
    contents: &dyn RepoContents,
    location: &RepoLocation,
    file: &str,
) -> DetectResult<String> {
    let path = location.file_path(file);
    contents
        .get_contents(location, &path)
        .await
        .map_err(|source| DetectError::Fetch { file: path, source })
}

#[async_trait]
impl Runtime for NodeRuntime {
    fn name(&self) -> &'static str {
        "nodejs"
    }

    async fn detect(
        &self,
        contents: &dyn RepoContents,
        listing: &[String],
        location: &RepoLocation,
        report: &mut DetectionReport,
    ) -> DetectResult<()> {
        let mut paketo = BuildpackInfo::new(NAME, PAKETO_BUILDPACK);
        let mut heroku = BuildpackInfo::new(NAME, HEROKU_BUILDPACK);

        match self.classify(contents, listing, location).await {
            Ok(Detection::Detected(config)) => {
                paketo.config = config.clone();
                heroku.config = config;
                report.paketo.detected.push(paketo);
                report.heroku.detected.push(heroku);
                Ok(())
            }
            Ok(Detection::Undetected) => {
                report.paketo.others.push(paketo);
                report.heroku.others.push(heroku);
                Ok(())
            }
            Err(e) => {
                warn!(location = %location, error = %e, "Node.js detection failed");
                report.paketo.others.push(paketo);
                report.heroku.others.push(heroku);
                Err(e)
            }
        }
    }
}
