//! Source-control provider collaborator

pub mod github;

use async_trait::async_trait;
use openapi_client::models::RepoSummary;
use secrecy::SecretString;

use crate::errors::ControlError;

pub use github::GitHubClient;

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Shared secret used to sign webhook deliveries, if one is configured
    fn webhook_secret(&self) -> Option<SecretString>;

    async fn list_repositories(&self) -> Result<Vec<RepoSummary>, ControlError>;

    /// Decoded contents of `path` at `git_ref` in `repo` (`owner/name`)
    async fn fetch_file(&self, repo: &str, path: &str, git_ref: &str) -> Result<String, ControlError>;

    /// Returns the new comment id
    async fn create_comment(&self, repo: &str, issue: u64, body: &str) -> Result<u64, ControlError>;

    async fn update_comment(&self, repo: &str, comment_id: u64, body: &str) -> Result<(), ControlError>;
}
