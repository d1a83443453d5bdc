//! Dockyard CLI tool.

use clap::{Args, Parser, Subcommand};
use dockyard_core::build::BuildMethod;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(about = "Build and deploy applications", long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.dockyard/config.kdl)
    #[arg(long, global = true, env = "DOCKYARD_CONFIG")]
    config: Option<PathBuf>,

    /// API server URL
    #[arg(long, global = true, env = "DOCKYARD_API_URL")]
    api_url: Option<String>,

    /// API token
    #[arg(long, global = true, env = "DOCKYARD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Identifies a release.
#[derive(Args, Debug, Clone)]
pub struct ReleaseArgs {
    /// Application (release) name
    app: String,
    /// Project ID
    #[arg(long)]
    project: Option<u64>,
    /// Cluster ID
    #[arg(long)]
    cluster: Option<u64>,
    /// Namespace of the release
    #[arg(long, default_value = "default")]
    namespace: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, push and roll out an application
    Deploy {
        #[command(flatten)]
        release: ReleaseArgs,
        /// Build from a local directory instead of the repository
        #[arg(long)]
        local: bool,
        /// Local source path; its parent directory is the build context
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Dockerfile to build with
        #[arg(long)]
        dockerfile: Option<PathBuf>,
        /// Image tag (defaults to the short commit, or "latest")
        #[arg(long)]
        tag: Option<String>,
        /// Build method: docker or pack
        #[arg(long)]
        method: Option<BuildMethod>,
        /// Also write the build environment to this file
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
    /// Print the build environment of an application
    Env {
        #[command(flatten)]
        release: ReleaseArgs,
        /// Write to a file instead of stdout
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Detect buildpacks for a repository directory
    Detect {
        /// Repository as owner/name
        repo: String,
        /// Directory inside the repository
        #[arg(long, default_value = "")]
        path: String,
        /// Branch, tag or commit
        #[arg(long = "ref")]
        git_ref: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let ctx = commands::Context::load(cli.config.as_deref(), cli.api_url, cli.token)?;

    match cli.command {
        Commands::Deploy {
            release,
            local,
            path,
            dockerfile,
            tag,
            method,
            env_file,
        } => {
            let opts = commands::deploy::DeployArgs {
                release,
                local,
                path,
                dockerfile,
                tag,
                method,
                env_file,
            };
            commands::deploy::run(&ctx, opts).await?;
        }
        Commands::Env { release, file } => {
            commands::env::run(&ctx, &release, file.as_deref()).await?;
        }
        Commands::Detect {
            repo,
            path,
            git_ref,
        } => {
            commands::detect::run(&ctx, &repo, &path, git_ref).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from([
            "dockyard", "deploy", "web", "--project", "1", "--cluster", "2", "--method", "pack",
            "--tag", "v1",
        ])
        .unwrap();

        match cli.command {
            Commands::Deploy {
                release,
                method,
                tag,
                path,
                local,
                ..
            } => {
                assert_eq!(release.app, "web");
                assert_eq!(release.project, Some(1));
                assert_eq!(release.cluster, Some(2));
                assert_eq!(release.namespace, "default");
                assert_eq!(method, Some(BuildMethod::Pack));
                assert_eq!(tag.as_deref(), Some("v1"));
                assert_eq!(path, PathBuf::from("."));
                assert!(!local);
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_method() {
        let result = Cli::try_parse_from(["dockyard", "deploy", "web", "--method", "kaniko"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_detect_ref() {
        let cli =
            Cli::try_parse_from(["dockyard", "detect", "acme/web", "--path", "app", "--ref", "dev"])
                .unwrap();

        match cli.command {
            Commands::Detect {
                repo,
                path,
                git_ref,
            } => {
                assert_eq!(repo, "acme/web");
                assert_eq!(path, "app");
                assert_eq!(git_ref.as_deref(), Some("dev"));
            }
            _ => panic!("expected detect"),
        }
    }
}
