//! GitHub webhook and REST models
//!
//! Only the fields the control plane reads are modelled; unknown fields are
//! ignored on deserialization.

use serde::{Deserialize, Serialize};

/// Repository block shared by push and pull_request payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub clone_url: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Commit summary carried by push events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub message: String,
}

/// `push` event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub head_commit: Option<Commit>,
    pub repository: Repository,
}

impl PushEvent {
    /// Branch name with the `refs/heads/` prefix removed
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }

    /// Head commit message, if the provider included one
    pub fn commit_message(&self) -> Option<&str> {
        self.head_commit.as_ref().map(|c| c.message.as_str())
    }
}

/// Branch reference at one end of a pull request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
}

/// Pull request block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// `pull_request` event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

/// `ping` event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingEvent {
    #[serde(default)]
    pub zen: Option<String>,
    #[serde(default)]
    pub hook_id: Option<u64>,
}

/// Issue comment as returned by the REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Create/update comment request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

/// Repository entry from the installation repository listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSummary {
    pub id: u64,
    pub full_name: String,
    pub clone_url: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub private: bool,
}

/// Installation repository listing wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoListing {
    #[serde(default)]
    pub total_count: u64,
    pub repositories: Vec<RepoSummary>,
}

/// Contents API entry (file or directory item)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_branch_strips_prefix() {
        let event: PushEvent = serde_json::from_value(serde_json::json!({
            "ref": "refs/heads/feature/login",
            "after": "abc123",
            "repository": {
                "full_name": "x/y",
                "clone_url": "https://x/y.git",
                "default_branch": "main"
            }
        }))
        .unwrap();

        assert_eq!(event.branch(), "feature/login");
        assert!(!event.deleted);
        assert!(event.commit_message().is_none());
    }

    #[test]
    fn test_pull_request_event_parses_head() {
        let event: PullRequestEvent = serde_json::from_value(serde_json::json!({
            "action": "synchronize",
            "number": 7,
            "pull_request": {
                "number": 7,
                "title": "Add login",
                "head": { "ref": "login", "sha": "sha1" },
                "base": { "ref": "main", "sha": "sha0" }
            },
            "repository": {
                "full_name": "x/y",
                "clone_url": "https://x/y.git"
            }
        }))
        .unwrap();

        assert_eq!(event.pull_request.head.sha, "sha1");
        assert_eq!(event.repository.default_branch, "main");
    }
}
