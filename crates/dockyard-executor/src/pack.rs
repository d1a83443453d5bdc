//! Buildpack builds through the `pack` CLI.

use async_trait::async_trait;
use dockyard_core::build::{BuildOptions, BuildpackBuilder};
use dockyard_core::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Default builder image.
pub const DEFAULT_BUILDER: &str = "paketobuildpacks/builder:full";

/// Lines of stderr kept for the error message of a failed build.
const STDERR_TAIL_LINES: usize = 20;

/// Builds images with cloud-native buildpacks by running `pack build`.
#[derive(Debug, Clone)]
pub struct PackBuilder {
    binary: PathBuf,
    builder: String,
    buildpacks: Vec<String>,
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackBuilder {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("pack"),
            builder: DEFAULT_BUILDER.to_string(),
            buildpacks: Vec::new(),
        }
    }

    /// Use a `pack` binary other than the one on `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_builder(mut self, builder: impl Into<String>) -> Self {
        self.builder = builder.into();
        self
    }

    /// Run these buildpacks instead of letting the builder detect them.
    pub fn with_buildpacks(mut self, buildpacks: Vec<String>) -> Self {
        self.buildpacks = buildpacks;
        self
    }

    /// Arguments passed to `pack`.
    ///
    /// The image is only looked up locally so that a previous image tagged for the build
    /// can serve as cache without a registry round trip.
    fn build_args(&self, opts: &BuildOptions) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            opts.image_ref(),
            "--path".to_string(),
            opts.build_context.to_string_lossy().into_owned(),
            "--builder".to_string(),
            self.builder.clone(),
            "--pull-policy".to_string(),
            "if-not-present".to_string(),
            "--trust-builder".to_string(),
        ];

        for buildpack in &self.buildpacks {
            args.push("--buildpack".to_string());
            args.push(buildpack.clone());
        }

        for (key, value) in &opts.env {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }

        args
    }
}

#[async_trait]
impl BuildpackBuilder for PackBuilder {
    fn name(&self) -> &'static str {
        "pack"
    }

    async fn build(&self, opts: BuildOptions) -> Result<()> {
        let image = opts.image_ref();
        let args = self.build_args(&opts);

        info!(image = %image, builder = %self.builder, "Building image with buildpacks");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .envs(&opts.process_env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::BuildFailed(format!(
                    "failed to start {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                debug!(image = %image, "{}", line);
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::BuildFailed(format!(
                "pack build of {} exited with {}: {}",
                image,
                status,
                stderr_tail(&stderr)
            )));
        }

        info!(image = %image, "Image built");
        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
