//! Repository locations and the repository-content trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A directory inside a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoLocation {
    pub owner: String,
    pub name: String,
    /// Directory inside the repository; empty for the root.
    #[serde(default)]
    pub path: String,
    /// Branch, tag or commit to read; the default branch when unset.
    #[serde(default)]
    pub git_ref: Option<String>,
}

impl RepoLocation {
    /// Parse an `owner/name` identifier.
    pub fn parse(full_name: &str) -> Result<Self> {
        match full_name.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    path: String::new(),
                    git_ref: None,
                })
            }
            _ => Err(Error::InvalidInput(format!(
                "repository must be in owner/name form: {}",
                full_name
            ))),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into().trim_matches('/').to_string();
        self
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    /// Path of `file` relative to the repository root.
    pub fn file_path(&self, file: &str) -> String {
        if self.path.is_empty() {
            file.to_string()
        } else {
            format!("{}/{}", self.path, file)
        }
    }
}

impl std::fmt::Display for RepoLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if !self.path.is_empty() {
            write!(f, ":{}", self.path)?;
        }
        Ok(())
    }
}

/// Read access to files of a hosted repository.
#[async_trait]
pub trait RepoContents: Send + Sync {
    /// Names of the entries in the location's directory.
    async fn list_directory(&self, location: &RepoLocation) -> Result<Vec<String>>;

    /// UTF-8 content of a file, `path` being relative to the repository root.
    async fn get_contents(&self, location: &RepoLocation, path: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let loc = RepoLocation::parse("acme/web").unwrap();
        assert_eq!(loc.owner, "acme");
        assert_eq!(loc.name, "web");
        assert_eq!(loc.file_path("package.json"), "package.json");
    }

    #[test]
    fn test_parse_invalid_location() {
        assert!(RepoLocation::parse("acme").is_err());
        assert!(RepoLocation::parse("/web").is_err());
        assert!(RepoLocation::parse("acme/web/extra").is_err());
    }

    #[test]
    fn test_file_path_in_subdirectory() {
        let loc = RepoLocation::parse("acme/web")
            .unwrap()
            .with_path("/services/api/");
        assert_eq!(loc.path, "services/api");
        assert_eq!(loc.file_path(".nvmrc"), "services/api/.nvmrc");
        assert_eq!(loc.to_string(), "acme/web:services/api");
    }
}
