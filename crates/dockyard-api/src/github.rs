//! GitHub contents API client for repository reads.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dockyard_core::repository::{RepoContents, RepoLocation};
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;

const GITHUB_API_URL: &str = "https://api.github.com";

/// Reads files and directory listings through the GitHub contents API.
#[derive(Clone)]
pub struct GitHubContents {
    client: reqwest::Client,
    api_url: String,
    access_token: Option<String>,
}

impl GitHubContents {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: GITHUB_API_URL.to_string(),
            access_token,
        }
    }

    /// Use a GitHub Enterprise API root instead of github.com.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn contents_url(&self, location: &RepoLocation, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();

        let mut url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            location.owner,
            location.name,
            encoded.join("/")
        );

        if let Some(git_ref) = &location.git_ref {
            url.push_str("?ref=");
            url.push_str(&urlencoding::encode(git_ref));
        }

        url
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ApiError> {
        debug!(url = %url, "Fetching repository contents");

        let mut request = self
            .client
            .get(url)
            .header("User-Agent", "Dockyard-CLI")
            .header("Accept", "application/vnd.github+json");

        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status,
                message: format!("Failed to read {}: {}", url, text),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl RepoContents for GitHubContents {
    async fn list_directory(&self, location: &RepoLocation) -> dockyard_core::Result<Vec<String>> {
        let url = self.contents_url(location, &location.path);
        let entries: Vec<ContentEntry> = self.fetch(&url).await?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    async fn get_contents(
        &self,
        location: &RepoLocation,
        path: &str,
    ) -> dockyard_core::Result<String> {
        let url = self.contents_url(location, path);
        let file: ContentFile = self.fetch(&url).await?;
        Ok(decode_content(&file)?)
    }
}

/// Entry of a directory listing.
#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
}

/// Single file returned by the contents API.
#[derive(Debug, Deserialize)]
struct ContentFile {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

fn decode_content(file: &ContentFile) -> Result<String, ApiError> {
    if file.encoding != "base64" {
        return Err(ApiError::Parse(format!(
            "unsupported content encoding: {:?}",
            file.encoding
        )));
    }

    // The API wraps base64 content at 60 columns.
    let compact: String = file
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| ApiError::Parse(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| ApiError::Parse(e.to_string()))
}
