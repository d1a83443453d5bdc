//! Build options and the build facility traits.
//!
//! Two backends produce images: a direct build from a Dockerfile through the local image
//! agent, and a buildpack build. Both consume the same [`BuildOptions`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Stable tag the buildpack backend builds against so the buildpack tool finds the
/// previous image locally instead of going back to the registry.
pub const PACK_CACHE_TAG: &str = "pack-cache";

/// Tag used when neither an override nor a commit reference is available.
pub const DEFAULT_TAG: &str = "latest";

/// How an image is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMethod {
    /// Local Docker build from the application's Dockerfile.
    Docker,
    /// Cloud-native buildpack build.
    Pack,
}

impl std::fmt::Display for BuildMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMethod::Docker => write!(f, "docker"),
            BuildMethod::Pack => write!(f, "pack"),
        }
    }
}

impl std::str::FromStr for BuildMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(BuildMethod::Docker),
            "pack" => Ok(BuildMethod::Pack),
            _ => Err(Error::InvalidInput(format!("unknown build method: {}", s))),
        }
    }
}

/// Options for a single build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Image repository, without tag.
    pub image_repo: String,
    /// Tag the built image receives.
    pub tag: String,
    /// Directory used as the build context.
    pub build_context: PathBuf,
    /// Build-time environment.
    pub env: BTreeMap<String, String>,
    /// Variables set on the build tool's process, such as the prefixed application
    /// environment.
    pub process_env: BTreeMap<String, String>,
}

impl BuildOptions {
    /// Full `<repo>:<tag>` reference of the image this build produces.
    pub fn image_ref(&self) -> String {
        image_ref(&self.image_repo, &self.tag)
    }
}

/// Join an image repository and a tag into a reference.
pub fn image_ref(repo: &str, tag: &str) -> String {
    format!("{}:{}", repo, tag)
}

/// Split an image reference into repository and tag.
///
/// A colon that belongs to a registry port is not treated as a tag separator.
pub fn split_image_ref(image: &str) -> (&str, Option<&str>) {
    match image.rfind(':') {
        Some(idx) if !image[idx + 1..].contains('/') => (&image[..idx], Some(&image[idx + 1..])),
        _ => (image, None),
    }
}

/// Local image facility: builds, pulls, tags and pushes images.
#[async_trait]
pub trait ImageAgent: Send + Sync {
    /// Name of this agent.
    fn name(&self) -> &'static str;

    /// Build an image from a Dockerfile.
    async fn build_local(&self, opts: BuildOptions, dockerfile: &Path) -> Result<()>;

    /// Pull an image. A missing image yields [`Error::ImageNotFound`].
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Add the reference `target` to the image known as `source`.
    async fn tag_image(&self, source: &str, target: &str) -> Result<()>;

    /// Remove a single reference without deleting the underlying image.
    async fn untag_image(&self, image: &str) -> Result<()>;

    /// Push an image to its registry.
    async fn push_image(&self, image: &str) -> Result<()>;
}

/// Buildpack build facility.
#[async_trait]
pub trait BuildpackBuilder: Send + Sync {
    /// Name of this builder.
    fn name(&self) -> &'static str;

    /// Build `opts.image_ref()` from the build context.
    async fn build(&self, opts: BuildOptions) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_method_parsing() {
        assert_eq!("docker".parse::<BuildMethod>().unwrap(), BuildMethod::Docker);
        assert_eq!("PACK".parse::<BuildMethod>().unwrap(), BuildMethod::Pack);
        assert!("kaniko".parse::<BuildMethod>().is_err());
        assert_eq!(BuildMethod::Pack.to_string(), "pack");
    }

    #[test]
    fn test_image_ref() {
        let opts = BuildOptions {
            image_repo: "registry.example.com/acme/web".to_string(),
            tag: "abc1234".to_string(),
            build_context: PathBuf::from("/tmp/src"),
            env: BTreeMap::new(),
            process_env: BTreeMap::new(),
        };
        assert_eq!(opts.image_ref(), "registry.example.com/acme/web:abc1234");
    }

    #[test]
    fn test_split_image_ref() {
        assert_eq!(split_image_ref("acme/web:v1"), ("acme/web", Some("v1")));
        assert_eq!(split_image_ref("acme/web"), ("acme/web", None));
        assert_eq!(
            split_image_ref("localhost:5000/acme/web"),
            ("localhost:5000/acme/web", None)
        );
        assert_eq!(
            split_image_ref("localhost:5000/acme/web:pack-cache"),
            ("localhost:5000/acme/web", Some("pack-cache"))
        );
    }
}
