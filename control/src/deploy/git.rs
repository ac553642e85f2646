//! Git source checkout

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::runtime::SourceFetcher;
use crate::errors::ControlError;

/// Source fetcher driving the git binary
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            binary: "git".to_string(),
        }
    }

    async fn git(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String, ControlError> {
        let mut cmd = Command::new(&self.binary);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let output = cmd
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ControlError::DeployError(format!("Failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(ControlError::DeployError(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for GitCli {
    async fn checkout(
        &self,
        repo_url: &str,
        branch: &str,
        commit: Option<&str>,
        target_dir: &Path,
    ) -> Result<String, ControlError> {
        info!("Cloning {} (branch: {}) to {}", repo_url, branch, target_dir.display());

        if target_dir.exists() {
            tokio::fs::remove_dir_all(target_dir).await?;
        }
        if let Some(parent) = target_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let target = target_dir.to_string_lossy();
        self.git(
            None,
            &["clone", "--depth", "50", "--single-branch", "-b", branch, repo_url, &target],
        )
        .await?;

        if let Some(sha) = commit {
            debug!("Checking out commit {}", sha);
            if self.git(Some(target_dir), &["checkout", "--detach", sha]).await.is_err() {
                // Outside the shallow window
                self.git(Some(target_dir), &["fetch", "origin", sha]).await?;
                self.git(Some(target_dir), &["checkout", "--detach", sha]).await?;
            }
        }

        self.git(Some(target_dir), &["rev-parse", "HEAD"]).await
    }
}
