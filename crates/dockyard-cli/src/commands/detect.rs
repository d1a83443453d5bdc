//! Detect command.

use anyhow::{Context as _, Result};
use dockyard_api::GitHubContents;
use dockyard_buildpacks::{DetectionReport, Detector};
use dockyard_core::repository::RepoLocation;

use super::Context;

/// Detect buildpacks for a repository directory and print the report.
pub async fn run(ctx: &Context, repo: &str, path: &str, git_ref: Option<String>) -> Result<()> {
    let mut location = RepoLocation::parse(repo)?.with_path(path);
    if let Some(git_ref) = git_ref {
        location = location.with_ref(git_ref);
    }

    let contents = GitHubContents::new(ctx.settings.github_token.clone());
    let mut report = DetectionReport::default();
    let result = Detector::new()
        .detect(&contents, &location, &mut report)
        .await;

    // Print the partial report before surfacing a failure.
    let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
    println!("{}", json);

    result.with_context(|| format!("Detection failed for {}", location))
}
