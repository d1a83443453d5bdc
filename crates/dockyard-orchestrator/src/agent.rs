//! Deploy agent - builds, pushes and rolls out a release.
//!
//! A deploy runs as a fixed sequence of steps. Each step moves the agent to the next
//! [`DeployState`]; calling a step out of order fails with [`Error::InvalidState`]. A failed
//! step leaves whatever it produced (downloaded sources, local images) in place.

use chrono::{DateTime, Utc};
use dockyard_config::BuildEnv;
use dockyard_core::build::{BuildMethod, BuildOptions, BuildpackBuilder, ImageAgent, image_ref};
use dockyard_core::deployer::{Notifier, NotifyTarget};
use dockyard_core::release::{ReleaseApi, ReleaseDescriptor};
use dockyard_core::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::cache::ImageCache;
use crate::source::{self, SourceFetcher};

const DEFAULT_DOCKERFILE: &str = "./Dockerfile";

/// Options of a deploy, usually taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct DeployOpts {
    pub project_id: u64,
    pub cluster_id: u64,
    /// Build from a local directory instead of downloading the repository.
    pub local: bool,
    /// Local source path; its parent directory is the build context.
    pub local_path: PathBuf,
    /// Dockerfile to use instead of the one configured for the repository.
    pub dockerfile: Option<PathBuf>,
    /// Image tag to use instead of the commit reference.
    pub tag: Option<String>,
    /// Build method; chosen from the release when unset.
    pub method: Option<BuildMethod>,
}

/// Progress of a deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Initialized,
    SourceAcquired,
    EnvironmentResolved,
    CacheChecked,
    Built,
    Pushed,
    Notified,
}

impl DeployState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Notified)
    }
}

impl std::fmt::Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeployState::Initialized => "initialized",
            DeployState::SourceAcquired => "source acquired",
            DeployState::EnvironmentResolved => "environment resolved",
            DeployState::CacheChecked => "cache checked",
            DeployState::Built => "built",
            DeployState::Pushed => "pushed",
            DeployState::Notified => "notified",
        };
        write!(f, "{}", s)
    }
}

/// Event emitted while a deploy runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployEvent {
    StateChanged {
        state: DeployState,
        at: DateTime<Utc>,
    },
    /// The previous image is absent; the build runs without cache.
    CacheMiss { image: String, at: DateTime<Utc> },
    Failed {
        state: DeployState,
        message: String,
        at: DateTime<Utc>,
    },
}

/// Everything the agent has decided or learned about a deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    pub method: BuildMethod,
    pub image_repo: String,
    /// Image tag; known once the source is acquired.
    pub tag: Option<String>,
    /// Dockerfile for docker builds.
    pub dockerfile: Option<PathBuf>,
    pub local: bool,
    pub build_context: Option<PathBuf>,
    pub env: BuildEnv,
    /// Reference the previous image was pulled as, if it exists.
    pub cached_ref: Option<String>,
}

impl DeployPlan {
    /// Decide build method, image repository and Dockerfile for a release.
    pub fn for_release(release: &ReleaseDescriptor, opts: &DeployOpts) -> Result<Self> {
        let git = release.git_source.as_ref();

        let method = opts.method.unwrap_or_else(|| match git {
            Some(git) if git.has_dockerfile() => BuildMethod::Docker,
            _ => BuildMethod::Pack,
        });

        // Without a git source there is nothing to download.
        let (local, image_repo) = match git {
            Some(git) => (opts.local, git.image_repo_uri.clone()),
            None => (true, release.image_repository()?),
        };

        let dockerfile = match method {
            BuildMethod::Docker => Some(
                opts.dockerfile
                    .clone()
                    .or_else(|| {
                        git.filter(|g| g.has_dockerfile())
                            .map(|g| PathBuf::from(&g.dockerfile_path))
                    })
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKERFILE)),
            ),
            BuildMethod::Pack => None,
        };

        Ok(Self {
            method,
            image_repo,
            tag: None,
            dockerfile,
            local,
            build_context: None,
            env: BuildEnv::new(&release.name, BTreeMap::new()),
            cached_ref: None,
        })
    }

    /// The reference the build produces.
    pub fn image(&self) -> Option<String> {
        self.tag.as_ref().map(|tag| image_ref(&self.image_repo, tag))
    }
}

/// External services a deploy talks to.
#[derive(Clone)]
pub struct DeployServices {
    pub api: Arc<dyn ReleaseApi>,
    pub images: Arc<dyn ImageAgent>,
    pub buildpacks: Arc<dyn BuildpackBuilder>,
    pub notifier: Arc<dyn Notifier>,
}

/// Drives a release from source to rollout.
pub struct DeployAgent {
    release: ReleaseDescriptor,
    opts: DeployOpts,
    plan: DeployPlan,
    state: DeployState,
    services: DeployServices,
    cache: ImageCache,
    fetcher: SourceFetcher,
    events: Option<mpsc::Sender<DeployEvent>>,
}

impl DeployAgent {
    pub fn new(
        release: ReleaseDescriptor,
        opts: DeployOpts,
        services: DeployServices,
        cache_dir: PathBuf,
    ) -> Result<Self> {
        let plan = DeployPlan::for_release(&release, &opts)?;

        info!(
            release = %release.name,
            method = %plan.method,
            image = %plan.image_repo,
            local = plan.local,
            "Deploy planned"
        );

        Ok(Self {
            release,
            opts,
            plan,
            state: DeployState::Initialized,
            cache: ImageCache::new(services.images.clone()),
            services,
            fetcher: SourceFetcher::new(cache_dir),
            events: None,
        })
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<DeployEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    pub fn plan(&self) -> &DeployPlan {
        &self.plan
    }

    async fn emit(&self, event: DeployEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    fn expect_state(&self, expected: DeployState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                expected: expected.to_string(),
                found: self.state.to_string(),
            });
        }
        Ok(())
    }

    async fn advance(&mut self, state: DeployState) {
        info!(release = %self.release.name, state = %state, "Deploy state changed");
        self.state = state;
        self.emit(DeployEvent::StateChanged {
            state,
            at: Utc::now(),
        })
        .await;
    }

    /// Make the build source available and settle the image tag.
    pub async fn acquire_source(&mut self) -> Result<()> {
        self.expect_state(DeployState::Initialized)?;

        let commit = if self.plan.local {
            self.plan.build_context = Some(source::local_context(&self.opts.local_path));
            None
        } else {
            let git = self.release.git_source.as_ref().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "release {} has no git source to download",
                    self.release.name
                ))
            })?;
            let acquired = self
                .fetcher
                .fetch(self.services.api.as_ref(), self.opts.project_id, git)
                .await?;
            self.plan.build_context = Some(acquired.build_context);
            acquired.commit
        };

        self.plan.tag = Some(source::derive_tag(
            self.opts.tag.as_deref(),
            commit.as_deref(),
        ));
        self.advance(DeployState::SourceAcquired).await;
        Ok(())
    }

    /// Resolve the build environment from the release configuration.
    pub async fn resolve_env(&mut self) -> Result<()> {
        self.expect_state(DeployState::SourceAcquired)?;
        self.plan.env = BuildEnv::from_release_config(&self.release.name, &self.release.config)?;
        self.advance(DeployState::EnvironmentResolved).await;
        Ok(())
    }

    /// Pull the currently deployed image so the build can reuse it.
    pub async fn check_cache(&mut self) -> Result<()> {
        self.expect_state(DeployState::EnvironmentResolved)?;

        let current_tag = self.release.image_tag()?;
        self.plan.cached_ref = self.cache.warm(&self.plan.image_repo, &current_tag).await?;

        if self.plan.cached_ref.is_none() {
            self.emit(DeployEvent::CacheMiss {
                image: image_ref(&self.plan.image_repo, &current_tag),
                at: Utc::now(),
            })
            .await;
        }

        self.advance(DeployState::CacheChecked).await;
        Ok(())
    }

    fn build_options(&self) -> Result<BuildOptions> {
        let (Some(tag), Some(build_context)) = (&self.plan.tag, &self.plan.build_context) else {
            return Err(Error::Internal("build planned without tag or source".to_string()));
        };

        Ok(BuildOptions {
            image_repo: self.plan.image_repo.clone(),
            tag: tag.clone(),
            build_context: build_context.clone(),
            env: self.plan.env.vars().clone(),
            process_env: self.plan.env.prefixed(),
        })
    }

    /// Build the image with the planned method.
    pub async fn build(&mut self) -> Result<()> {
        self.expect_state(DeployState::CacheChecked)?;
        let opts = self.build_options()?;

        match self.plan.method {
            BuildMethod::Docker => {
                let dockerfile = self
                    .plan
                    .dockerfile
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKERFILE));
                self.services.images.build_local(opts, &dockerfile).await?;
            }
            BuildMethod::Pack => {
                self.cache
                    .pack_build(
                        self.services.buildpacks.as_ref(),
                        opts,
                        self.plan.cached_ref.as_deref(),
                    )
                    .await?;
            }
        }

        self.advance(DeployState::Built).await;
        Ok(())
    }

    /// Push the built image.
    pub async fn push(&mut self) -> Result<()> {
        self.expect_state(DeployState::Built)?;
        let image = self
            .plan
            .image()
            .ok_or_else(|| Error::Internal("push without tag".to_string()))?;
        self.services.images.push_image(&image).await?;
        self.advance(DeployState::Pushed).await;
        Ok(())
    }

    /// Ask the release side to roll out the pushed tag.
    pub async fn notify(&mut self) -> Result<()> {
        self.expect_state(DeployState::Pushed)?;
        let tag = self
            .plan
            .tag
            .clone()
            .ok_or_else(|| Error::Internal("notify without tag".to_string()))?;

        let target = NotifyTarget {
            project_id: self.opts.project_id,
            cluster_id: self.opts.cluster_id,
            release: self.release.name.clone(),
            namespace: self.release.namespace.clone(),
        };
        self.services.notifier.notify(&target, &tag).await?;
        self.advance(DeployState::Notified).await;
        Ok(())
    }

    /// Run every remaining step.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_steps().await;

        if let Err(e) = &result {
            error!(release = %self.release.name, state = %self.state, error = %e, "Deploy failed");
            self.emit(DeployEvent::Failed {
                state: self.state,
                message: e.to_string(),
                at: Utc::now(),
            })
            .await;
        }

        result
    }

    async fn run_steps(&mut self) -> Result<()> {
        while !self.state.is_terminal() {
            match self.state {
                DeployState::Initialized => self.acquire_source().await?,
                DeployState::SourceAcquired => self.resolve_env().await?,
                DeployState::EnvironmentResolved => self.check_cache().await?,
                DeployState::CacheChecked => self.build().await?,
                DeployState::Built => self.push().await?,
                DeployState::Pushed => self.notify().await?,
                DeployState::Notified => {}
            }
        }
        Ok(())
    }
}
