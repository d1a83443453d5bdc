//! Local Docker image agent.
//!
//! Talks to the Docker daemon to build images from a Dockerfile and to pull, tag and push
//! images for the cache-warm and release steps.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::errors::Error as BollardError;
use bollard::image::{
    BuildImageOptions, CreateImageOptions, PushImageOptions, RemoveImageOptions, TagImageOptions,
};
use bytes::Bytes;
use dockyard_core::build::{BuildOptions, DEFAULT_TAG, ImageAgent, split_image_ref};
use dockyard_core::{Error, Result};
use futures::StreamExt;
use std::path::{Component, Path};
use tracing::{debug, info};

/// Name given to a Dockerfile that lives outside the build context.
const EXTERNAL_DOCKERFILE: &str = ".dockyard.Dockerfile";

const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Image agent backed by the local Docker daemon.
pub struct LocalDockerAgent {
    docker: Docker,
    credentials: Option<DockerCredentials>,
}

impl LocalDockerAgent {
    /// Create a new agent connecting to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self::with_client(docker))
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            credentials: None,
        }
    }

    /// Use registry credentials for pulls and pushes.
    pub fn with_credentials(mut self, credentials: DockerCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Use a registry username and password for pulls and pushes.
    pub fn with_login(
        self,
        server: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        self.with_credentials(DockerCredentials {
            username,
            password,
            serveraddress: server,
            ..Default::default()
        })
    }
}

#[async_trait]
impl ImageAgent for LocalDockerAgent {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn build_local(&self, opts: BuildOptions, dockerfile: &Path) -> Result<()> {
        let image = opts.image_ref();
        let context = opts.build_context.clone();
        let dockerfile = dockerfile.to_path_buf();

        info!(image = %image, context = %context.display(), "Building image");

        let (archive, dockerfile_in_archive) =
            tokio::task::spawn_blocking(move || build_context_archive(&context, &dockerfile))
                .await
                .map_err(|e| Error::Internal(format!("build context task failed: {}", e)))??;

        let options = BuildImageOptions {
            dockerfile: dockerfile_in_archive,
            t: image.clone(),
            buildargs: opts.env.into_iter().collect(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(Bytes::from(archive)));

        while let Some(result) = stream.next().await {
            let info = result
                .map_err(|e| Error::BuildFailed(format!("failed to build {}: {}", image, e)))?;

            if let Some(error) = info.error {
                return Err(Error::BuildFailed(format!(
                    "failed to build {}: {}",
                    image, error
                )));
            }

            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    info!(image = %image, "{}", line);
                }
            }
        }

        info!(image = %image, "Image built");
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let (repo, tag) = split_image_ref(image);

        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: repo.to_string(),
            tag: tag.unwrap_or(DEFAULT_TAG).to_string(),
            ..Default::default()
        };

        let mut stream = self
            .docker
            .create_image(Some(options), None, self.credentials.clone());

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => return Err(map_pull_error(image, e)),
            }
        }

        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        let (repo, tag) = split_image_ref(target);

        debug!(source = %source, target = %target, "Tagging image");
        let options = TagImageOptions {
            repo: repo.to_string(),
            tag: tag.unwrap_or(DEFAULT_TAG).to_string(),
        };

        self.docker
            .tag_image(source, Some(options))
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => Error::ImageNotFound(source.to_string()),
                e => Error::Internal(format!("failed to tag {} as {}: {}", source, target, e)),
            })
    }

    async fn untag_image(&self, image: &str) -> Result<()> {
        debug!(image = %image, "Removing image tag");
        let options = RemoveImageOptions {
            force: false,
            noprune: true,
        };

        self.docker
            .remove_image(image, Some(options), None)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => Error::ImageNotFound(image.to_string()),
                e => Error::Internal(format!("failed to remove tag {}: {}", image, e)),
            })
    }

    async fn push_image(&self, image: &str) -> Result<()> {
        let (repo, tag) = split_image_ref(image);

        info!(image = %image, "Pushing image");
        let options = PushImageOptions {
            tag: tag.unwrap_or(DEFAULT_TAG).to_string(),
        };

        let mut stream = self
            .docker
            .push_image(repo, Some(options), self.credentials.clone());

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Push progress");
                    }
                }
                Err(e) => {
                    return Err(Error::PushFailed(format!(
                        "failed to push {}: {}",
                        image, e
                    )));
                }
            }
        }

        info!(image = %image, "Image pushed");
        Ok(())
    }
}

fn map_pull_error(image: &str, err: BollardError) -> Error {
    match &err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => Error::ImageNotFound(image.to_string()),
        BollardError::DockerResponseServerError { message, .. }
        | BollardError::DockerStreamError { error: message }
            if is_not_found_message(message) =>
        {
            Error::ImageNotFound(image.to_string())
        }
        _ => Error::Transport(format!("failed to pull {}: {}", image, err)),
    }
}

/// Registries report a missing image in a few different wordings.
fn is_not_found_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("not found") || message.contains("manifest unknown")
}

/// Package a build context as a tarball for the daemon.
///
/// Returns the archive and the Dockerfile's path inside it. A Dockerfile outside the context
/// is added to the archive under [`EXTERNAL_DOCKERFILE`].
fn build_context_archive(context: &Path, dockerfile: &Path) -> Result<(Vec<u8>, String)> {
    let dockerfile = if dockerfile.as_os_str().is_empty() {
        Path::new(DEFAULT_DOCKERFILE)
    } else {
        dockerfile
    };

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", context)?;

    let dockerfile_abs = if dockerfile.is_absolute() {
        dockerfile.to_path_buf()
    } else {
        context.join(dockerfile)
    };

    let inside = dockerfile_abs
        .strip_prefix(context)
        .ok()
        .filter(|rel| !rel.components().any(|c| matches!(c, Component::ParentDir)));

    let name = match inside {
        Some(rel) => rel
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        None => {
            if !dockerfile_abs.is_file() {
                return Err(Error::InvalidInput(format!(
                    "Dockerfile not found: {}",
                    dockerfile_abs.display()
                )));
            }
            builder.append_path_with_name(&dockerfile_abs, EXTERNAL_DOCKERFILE)?;
            EXTERNAL_DOCKERFILE.to_string()
        }
    };

    Ok((builder.into_inner()?, name))
}
