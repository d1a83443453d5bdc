//! Image cache reuse.
//!
//! The previously deployed image is pulled before a build so the builder can reuse its
//! layers. Buildpack builds look for that image under the fixed `pack-cache` tag; the retag
//! dance around a build is serialized per image repository.

use dockyard_core::build::{BuildOptions, BuildpackBuilder, ImageAgent, PACK_CACHE_TAG, image_ref};
use dockyard_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use tracing::{debug, info};

/// Cache bookkeeping of one image repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildCache {
    pub image_repo: String,
    /// Release tag of the last successful buildpack build.
    pub last_tag: Option<String>,
    pub builds: u64,
}

impl BuildCache {
    /// Reference the buildpack tool builds and finds cached layers under.
    pub fn sentinel_ref(&self) -> String {
        image_ref(&self.image_repo, PACK_CACHE_TAG)
    }
}

type CacheSlot = Arc<tokio::sync::Mutex<BuildCache>>;

static CACHES: LazyLock<Mutex<HashMap<String, CacheSlot>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// The process-wide cache record of an image repository.
pub fn cache_slot(image_repo: &str) -> CacheSlot {
    let mut caches = CACHES.lock().unwrap_or_else(|e| e.into_inner());
    caches
        .entry(image_repo.to_string())
        .or_insert_with(|| {
            Arc::new(tokio::sync::Mutex::new(BuildCache {
                image_repo: image_repo.to_string(),
                ..Default::default()
            }))
        })
        .clone()
}

/// Pulls previous images and runs buildpack builds against them.
#[derive(Clone)]
pub struct ImageCache {
    images: Arc<dyn ImageAgent>,
}

impl ImageCache {
    pub fn new(images: Arc<dyn ImageAgent>) -> Self {
        Self { images }
    }

    /// Pull `<image_repo>:<tag>` to warm the local cache.
    ///
    /// Returns the pulled reference, or `None` when the image does not exist.
    pub async fn warm(&self, image_repo: &str, tag: &str) -> Result<Option<String>> {
        let image = image_ref(image_repo, tag);
        info!(image = %image, "Attempting to pull image");

        match self.images.pull_image(&image).await {
            Ok(()) => Ok(Some(image)),
            Err(e) if e.is_image_not_found() => {
                info!(image = %image, "Could not find image, moving to build step");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Build `opts.image_ref()` with buildpacks, reusing `cached` as build cache.
    ///
    /// The prior image is retagged as `pack-cache`, the build targets `pack-cache` and its
    /// result is retagged to the release tag. The `pack-cache` reference is removed at the end,
    /// so only the release tag remains.
    pub async fn pack_build(
        &self,
        builder: &dyn BuildpackBuilder,
        opts: BuildOptions,
        cached: Option<&str>,
    ) -> Result<()> {
        if opts.tag == PACK_CACHE_TAG {
            return Err(Error::InvalidInput(format!(
                "{} is reserved and cannot be a release tag",
                PACK_CACHE_TAG
            )));
        }

        let slot = cache_slot(&opts.image_repo);
        let mut cache = slot.lock().await;

        let sentinel = cache.sentinel_ref();
        let target = opts.image_ref();

        if let Some(prior) = cached {
            debug!(image = %prior, sentinel = %sentinel, "Retagging previous image");
            self.images.tag_image(prior, &sentinel).await?;
        }

        let tag = opts.tag.clone();
        builder
            .build(BuildOptions {
                tag: PACK_CACHE_TAG.to_string(),
                ..opts
            })
            .await?;

        self.images.tag_image(&sentinel, &target).await?;
        self.images.untag_image(&sentinel).await?;

        cache.last_tag = Some(tag);
        cache.builds += 1;
        info!(image = %target, builds = cache.builds, "Buildpack build tagged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeImages;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn opts(repo: &str, tag: &str) -> BuildOptions {
        BuildOptions {
            image_repo: repo.to_string(),
            tag: tag.to_string(),
            build_context: PathBuf::from("/tmp/src"),
            env: BTreeMap::new(),
            process_env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_warm_pulls_previous_image() {
        let images = Arc::new(FakeImages::default().with_registry_image("acme/warm:v1"));
        let cache = ImageCache::new(images.clone());

        let pulled = cache.warm("acme/warm", "v1").await.unwrap();
        assert_eq!(pulled.as_deref(), Some("acme/warm:v1"));
        assert!(images.has_local("acme/warm:v1"));
    }

    #[tokio::test]
    async fn test_warm_tolerates_missing_image() {
        let images = Arc::new(FakeImages::default());
        let cache = ImageCache::new(images);

        assert_eq!(cache.warm("acme/cold", "v1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_warm_propagates_other_errors() {
        let images = Arc::new(FakeImages::default());
        *images.pull_error.lock().unwrap() = Some(Error::Transport("connection refused".into()));
        let cache = ImageCache::new(images);

        let err = cache.warm("acme/broken", "v1").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_pack_build_leaves_only_release_tag() {
        let images = Arc::new(FakeImages::default().with_registry_image("acme/pack:v1"));
        let cache = ImageCache::new(images.clone());

        for tag in ["v2", "v3"] {
            let cached = cache.warm("acme/pack", "v1").await.unwrap();
            cache
                .pack_build(images.as_ref(), opts("acme/pack", tag), cached.as_deref())
                .await
                .unwrap();

            assert!(images.has_local(&format!("acme/pack:{}", tag)));
            assert!(!images.has_local("acme/pack:pack-cache"));
        }

        let record = cache_slot("acme/pack").lock().await.clone();
        assert_eq!(record.last_tag.as_deref(), Some("v3"));
        assert_eq!(record.builds, 2);
    }

    #[tokio::test]
    async fn test_pack_build_without_prior_image() {
        let images = Arc::new(FakeImages::default());
        let cache = ImageCache::new(images.clone());

        cache
            .pack_build(images.as_ref(), opts("acme/fresh", "v1"), None)
            .await
            .unwrap();

        assert_eq!(
            images.ops(),
            vec![
                "pack env ",
                "build acme/fresh:pack-cache",
                "tag acme/fresh:pack-cache acme/fresh:v1",
                "untag acme/fresh:pack-cache",
            ]
        );
    }

    #[tokio::test]
    async fn test_pack_build_rejects_sentinel_tag() {
        let images = Arc::new(FakeImages::default());
        let cache = ImageCache::new(images.clone());

        let err = cache
            .pack_build(images.as_ref(), opts("acme/reserved", PACK_CACHE_TAG), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(images.ops().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_pack_builds_do_not_interleave() {
        let images = Arc::new(FakeImages {
            build_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let cache = ImageCache::new(images.clone());

        let mut handles = Vec::new();
        for tag in ["a", "b"] {
            let cache = cache.clone();
            let images = images.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .pack_build(images.as_ref(), opts("acme/busy", tag), None)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let ops = images.ops();
        assert_eq!(ops.len(), 8);
        // Each build's four steps run back to back.
        for chunk in ops.chunks(4) {
            let tag = chunk[2].rsplit(':').next().unwrap();
            assert!(chunk[0].starts_with("pack env"));
            assert_eq!(chunk[2], format!("tag acme/busy:pack-cache acme/busy:{}", tag));
            assert_eq!(chunk[3], "untag acme/busy:pack-cache");
        }
        assert!(!images.has_local("acme/busy:pack-cache"));
    }
}
