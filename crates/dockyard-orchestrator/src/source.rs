//! Build source acquisition.
//!
//! Local builds use a directory on disk. Remote builds download a gzip-compressed tarball of
//! the repository into the cache directory and unpack it there.

use dockyard_core::build::DEFAULT_TAG;
use dockyard_core::release::{GitSourceConfig, ReleaseApi};
use dockyard_core::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Length of the commit prefix used as image tag.
const SHORT_REF_LEN: usize = 7;

/// A build context ready on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredSource {
    pub build_context: PathBuf,
    /// Latest commit of the downloaded source; unset for local sources.
    pub commit: Option<String>,
}

/// Build context of a local source: the directory containing `path`.
pub fn local_context(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// First characters of a commit reference.
pub fn short_ref(commit: &str) -> String {
    commit.chars().take(SHORT_REF_LEN).collect()
}

/// Tag of the image to build: the override, else the short commit, else `latest`.
pub fn derive_tag(tag_override: Option<&str>, commit: Option<&str>) -> String {
    tag_override
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| commit.filter(|c| !c.is_empty()).map(short_ref))
        .unwrap_or_else(|| DEFAULT_TAG.to_string())
}

/// Unpack a gzipped tarball into `dest`, removing the archive afterwards whatever the outcome.
pub fn unpack_archive(archive: &Path, dest: &Path) -> Result<()> {
    let result = File::open(archive).and_then(|file| {
        let mut tarball = tar::Archive::new(GzDecoder::new(file));
        tarball.unpack(dest)
    });

    if let Err(e) = std::fs::remove_file(archive) {
        warn!(archive = %archive.display(), error = %e, "Failed to remove downloaded archive");
    }

    result.map_err(|e| {
        Error::Transport(format!(
            "failed to unpack {}: {}",
            archive.display(),
            e
        ))
    })
}

/// Find the directory an archive of `sanitized_repo` was extracted to.
///
/// Extracted directories are named after the repository and commit. A directory naming
/// `commit` is preferred over stale extractions of earlier commits.
pub fn find_extracted_dir(
    dir: &Path,
    sanitized_repo: &str,
    commit: Option<&str>,
) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|entry| entry.file_name().to_string_lossy().contains(sanitized_repo))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();

    let short = commit.map(short_ref).filter(|c| !c.is_empty());
    let preferred = short.and_then(|short| {
        candidates.iter().find(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().contains(&short))
                .unwrap_or(false)
        })
    });

    preferred
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no extracted directory for {} in {}",
                sanitized_repo,
                dir.display()
            ))
        })
}

/// Downloads remote sources into a cache directory.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: reqwest::Client,
    cache_dir: PathBuf,
}

impl SourceFetcher {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache_dir,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Download and unpack the latest source of a repository.
    pub async fn fetch(
        &self,
        api: &dyn ReleaseApi,
        project_id: u64,
        git_source: &GitSourceConfig,
    ) -> Result<AcquiredSource> {
        let archive_url = api.get_repo_archive_url(project_id, git_source).await?;
        let commit = Some(archive_url.latest_commit_sha).filter(|sha| !sha.is_empty());

        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let sanitized = git_source.sanitized_repo();
        let archive = self.cache_dir.join(format!("{}.tar.gz", sanitized));

        info!(repo = %git_source.git_repo, commit = ?commit, "Downloading source");
        self.download(&archive_url.url, &archive).await?;

        let dest = self.cache_dir.clone();
        let archive_path = archive.clone();
        tokio::task::spawn_blocking(move || unpack_archive(&archive_path, &dest))
            .await
            .map_err(|e| Error::Internal(format!("unpack task failed: {}", e)))??;

        let build_context = find_extracted_dir(&self.cache_dir, &sanitized, commit.as_deref())?;
        debug!(build_context = %build_context.display(), "Source extracted");

        Ok(AcquiredSource {
            build_context,
            commit,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Transport(format!("failed to download source: {}", e)))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("failed to read source archive: {}", e)))?;

        tokio::fs::write(dest, &body).await?;
        Ok(())
    }
}
