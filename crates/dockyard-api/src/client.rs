//! Release API client.
//!
//! Talks to the dashboard API with a bearer token. All endpoints are JSON.

use async_trait::async_trait;
use dockyard_core::release::{
    ArchiveUrl, GitSourceConfig, ReleaseApi, ReleaseDescriptor, ReleaseWebhook,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ApiError;

/// Branch requested when the git source does not name one.
const DEFAULT_BRANCH: &str = "main";

/// Client for the dashboard's release API.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        Url::parse(base_url)?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .header("User-Agent", "Dockyard-CLI");

        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status,
                message: text,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path)?;
        debug!(url = %url, "GET");
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

fn release_path(project_id: u64, cluster_id: u64, namespace: &str, name: &str) -> String {
    format!(
        "/api/projects/{}/clusters/{}/namespaces/{}/releases/{}",
        project_id,
        cluster_id,
        urlencoding::encode(namespace),
        urlencoding::encode(name)
    )
}

fn archive_url_path(project_id: u64, git_source: &GitSourceConfig) -> Result<String, ApiError> {
    let (owner, name) = git_source.git_repo.split_once('/').ok_or_else(|| {
        ApiError::Parse(format!(
            "repository must be in owner/name form: {}",
            git_source.git_repo
        ))
    })?;

    let branch = if git_source.git_branch.is_empty() {
        DEFAULT_BRANCH
    } else {
        &git_source.git_branch
    };

    Ok(format!(
        "/api/projects/{}/gitrepos/{}/repos/github/{}/{}/{}/tarball_url",
        project_id,
        git_source.git_repo_id,
        urlencoding::encode(owner),
        urlencoding::encode(name),
        urlencoding::encode(branch)
    ))
}

fn deploy_webhook_path(webhook_token: &str, tag: &str) -> String {
    format!(
        "/api/webhooks/deploy/{}?commit={}",
        urlencoding::encode(webhook_token),
        urlencoding::encode(tag)
    )
}

#[async_trait]
impl ReleaseApi for ApiClient {
    async fn get_release(
        &self,
        project_id: u64,
        cluster_id: u64,
        namespace: &str,
        name: &str,
    ) -> dockyard_core::Result<ReleaseDescriptor> {
        // Revision 0 is the latest revision.
        let path = format!(
            "{}/0",
            release_path(project_id, cluster_id, namespace, name)
        );
        Ok(self.get_json(&path).await?)
    }

    async fn get_repo_archive_url(
        &self,
        project_id: u64,
        git_source: &GitSourceConfig,
    ) -> dockyard_core::Result<ArchiveUrl> {
        let path = archive_url_path(project_id, git_source)?;
        Ok(self.get_json(&path).await?)
    }

    async fn get_release_webhook(
        &self,
        project_id: u64,
        cluster_id: u64,
        name: &str,
        namespace: &str,
    ) -> dockyard_core::Result<ReleaseWebhook> {
        let path = format!(
            "{}/webhook_token",
            release_path(project_id, cluster_id, namespace, name)
        );
        Ok(self.get_json(&path).await?)
    }

    async fn deploy_with_webhook(&self, webhook_token: &str, tag: &str) -> dockyard_core::Result<()> {
        let url = self.url(&deploy_webhook_path(webhook_token, tag))?;
        debug!(tag = %tag, "POST deploy webhook");
        self.send(self.request(reqwest::Method::POST, url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_path() {
        assert_eq!(
            release_path(1, 2, "default", "web"),
            "/api/projects/1/clusters/2/namespaces/default/releases/web"
        );
    }

    #[test]
    fn test_archive_url_path() {
        let git = GitSourceConfig {
            git_repo: "acme/web".to_string(),
            git_repo_id: 5,
            git_branch: "release/1.x".to_string(),
            ..Default::default()
        };
        assert_eq!(
            archive_url_path(3, &git).unwrap(),
            "/api/projects/3/gitrepos/5/repos/github/acme/web/release%2F1.x/tarball_url"
        );
    }

    #[test]
    fn test_archive_url_path_defaults_branch() {
        let git = GitSourceConfig {
            git_repo: "acme/web".to_string(),
            ..Default::default()
        };
        assert!(archive_url_path(1, &git).unwrap().ends_with("/main/tarball_url"));
    }

    #[test]
    fn test_archive_url_path_rejects_bad_repo() {
        let git = GitSourceConfig {
            git_repo: "web".to_string(),
            ..Default::default()
        };
        assert!(archive_url_path(1, &git).is_err());
    }

    #[test]
    fn test_deploy_webhook_path() {
        assert_eq!(
            deploy_webhook_path("tok 1", "abc1234"),
            "/api/webhooks/deploy/tok%201?commit=abc1234"
        );
    }

    #[test]
    fn test_client_url() {
        let client = ApiClient::new("https://dashboard.example.com/", None).unwrap();
        assert_eq!(client.base_url(), "https://dashboard.example.com");
        assert_eq!(
            client.url("/api/projects/1").unwrap().as_str(),
            "https://dashboard.example.com/api/projects/1"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", None),
            Err(ApiError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let err = client.deploy_with_webhook("tok", "latest").await.unwrap_err();
        assert!(matches!(err, dockyard_core::Error::Transport(_)));
    }
}
