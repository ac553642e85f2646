//! GitHub REST client

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openapi_client::models::{CommentRequest, ContentEntry, IssueComment, RepoListing, RepoSummary};
use reqwest::{header, Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::errors::ControlError;
use crate::scm::SourceControl;
use crate::storage::settings::GitHubSettings;

/// GitHub client for comments, contents and repository listing
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
    webhook_secret: Option<SecretString>,
}

impl GitHubClient {
    pub fn new(settings: &GitHubSettings, timeout: std::time::Duration) -> Result<Self, ControlError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shipyard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            webhook_secret: settings.webhook_secret.clone(),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, ControlError> {
        let response = self.authed(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("GitHub {} failed: {} - {}", what, status, body);
            return Err(ControlError::Internal(format!("GitHub {} failed: {}", what, status)));
        }
        Ok(response.json().await?)
    }
}

/// Decode a contents API payload
pub fn decode_content(entry: &ContentEntry) -> Result<String, ControlError> {
    if entry.kind != "file" {
        return Err(ControlError::BadRequest(format!("{} is not a file", entry.path)));
    }
    let raw = entry.content.as_deref().unwrap_or_default();
    match entry.encoding.as_deref() {
        Some("base64") => {
            // GitHub wraps base64 at 60 columns
            let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|e| ControlError::Internal(format!("Invalid base64 in {}: {}", entry.path, e)))?;
            String::from_utf8(bytes)
                .map_err(|_| ControlError::BadRequest(format!("{} is not UTF-8 text", entry.path)))
        }
        _ => Ok(raw.to_string()),
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    fn webhook_secret(&self) -> Option<SecretString> {
        self.webhook_secret.clone()
    }

    async fn list_repositories(&self) -> Result<Vec<RepoSummary>, ControlError> {
        let url = format!("{}/installation/repositories?per_page=100", self.base_url);
        debug!("GET {}", url);
        let listing: RepoListing = self.send(self.client.get(&url), "repository listing").await?;
        Ok(listing.repositories)
    }

    async fn fetch_file(&self, repo: &str, path: &str, git_ref: &str) -> Result<String, ControlError> {
        let url = format!("{}/repos/{}/contents/{}", self.base_url, repo, path.trim_start_matches('/'));
        debug!("GET {} (ref {})", url, git_ref);
        let entry: ContentEntry = self
            .send(self.client.get(&url).query(&[("ref", git_ref)]), "file fetch")
            .await?;
        decode_content(&entry)
    }

    async fn create_comment(&self, repo: &str, issue: u64, body: &str) -> Result<u64, ControlError> {
        let url = format!("{}/repos/{}/issues/{}/comments", self.base_url, repo, issue);
        debug!("POST {}", url);
        let request = self.client.post(&url).json(&CommentRequest {
            body: body.to_string(),
        });
        let comment: IssueComment = self.send(request, "comment create").await?;
        Ok(comment.id)
    }

    async fn update_comment(&self, repo: &str, comment_id: u64, body: &str) -> Result<(), ControlError> {
        let url = format!("{}/repos/{}/issues/comments/{}", self.base_url, repo, comment_id);
        debug!("PATCH {}", url);
        let request = self.client.patch(&url).json(&CommentRequest {
            body: body.to_string(),
        });
        let _: IssueComment = self.send(request, "comment update").await?;
        Ok(())
    }
}
