//! Env command.

use anyhow::{Context as _, Result};
use dockyard_config::BuildEnv;
use std::path::Path;

use super::{Context, fetch_release};
use crate::ReleaseArgs;

/// Print or write the build environment of a release.
pub async fn run(ctx: &Context, release: &ReleaseArgs, file: Option<&Path>) -> Result<()> {
    let (project_id, cluster_id) = ctx.target(release)?;
    let api = ctx.api_client()?;
    let descriptor = fetch_release(&api, project_id, cluster_id, release).await?;

    let env = BuildEnv::from_release_config(&descriptor.name, &descriptor.config)
        .context("Failed to resolve environment")?;

    match file {
        Some(path) => {
            env.write_file(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Wrote {} variables to {}", env.len(), path.display());
        }
        None => {
            env.write_to(std::io::stdout().lock())
                .context("Failed to write environment")?;
        }
    }

    Ok(())
}
