//! Deploy command.

use anyhow::{Context as _, Result};
use dockyard_core::build::BuildMethod;
use dockyard_deployer::WebhookNotifier;
use dockyard_executor::{LocalDockerAgent, PackBuilder};
use dockyard_orchestrator::{DeployAgent, DeployEvent, DeployOpts, DeployServices};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{Context, fetch_release};
use crate::ReleaseArgs;

pub struct DeployArgs {
    pub release: ReleaseArgs,
    pub local: bool,
    pub path: PathBuf,
    pub dockerfile: Option<PathBuf>,
    pub tag: Option<String>,
    pub method: Option<BuildMethod>,
    pub env_file: Option<PathBuf>,
}

/// Build, push and roll out an application.
pub async fn run(ctx: &Context, args: DeployArgs) -> Result<()> {
    let (project_id, cluster_id) = ctx.target(&args.release)?;
    let api = Arc::new(ctx.api_client()?);
    let release = fetch_release(api.as_ref(), project_id, cluster_id, &args.release).await?;

    let mut images = LocalDockerAgent::new().context("Failed to connect to Docker")?;
    if let Some(registry) = &ctx.settings.registry {
        images = images.with_login(
            registry.server.clone(),
            registry.username.clone(),
            registry.password.clone(),
        );
    }

    let services = DeployServices {
        api: api.clone(),
        images: Arc::new(images),
        buildpacks: Arc::new(PackBuilder::new()),
        notifier: Arc::new(WebhookNotifier::new(api)),
    };

    let opts = DeployOpts {
        project_id,
        cluster_id,
        local: args.local,
        local_path: args.path,
        dockerfile: args.dockerfile,
        tag: args.tag,
        method: args.method,
    };

    let cache_dir = ctx.settings.cache_dir()?;
    let (tx, mut rx) = mpsc::channel(32);
    let mut agent = DeployAgent::new(release, opts, services, cache_dir)
        .context("Failed to plan deploy")?
        .with_events(tx);

    println!(
        "Deploying {} with {} to {}",
        args.release.app,
        agent.plan().method,
        agent.plan().image_repo
    );

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                DeployEvent::StateChanged { state, at } => {
                    println!("[{}] {}", at.format("%H:%M:%S"), state);
                }
                DeployEvent::CacheMiss { image, .. } => {
                    println!("Could not find image {}, building without cache", image);
                }
                DeployEvent::Failed { state, message, .. } => {
                    println!("Deploy failed after {}: {}", state, message);
                }
            }
        }
    });

    let mut result = dump_env(&mut agent, args.env_file.as_deref()).await;
    if result.is_ok() {
        result = agent.run().await.map_err(Into::into);
    }

    let image = agent.plan().image();
    drop(agent);
    let _ = printer.await;

    result.with_context(|| format!("Failed to deploy {}", args.release.app))?;

    if let Some(image) = image {
        println!("Deployed {}", image);
    }
    Ok(())
}

/// Step the agent through environment resolution and write the environment to `env_file`.
async fn dump_env(agent: &mut DeployAgent, env_file: Option<&Path>) -> Result<()> {
    let Some(path) = env_file else {
        return Ok(());
    };

    agent.acquire_source().await?;
    agent.resolve_env().await?;
    agent
        .plan()
        .env
        .write_file(path)
        .with_context(|| format!("Failed to write environment to {}", path.display()))?;
    Ok(())
}
