//! Pull request status comment

use crate::models::DeploymentStatus;

/// One row of the preview summary
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSummary {
    pub name: String,
    pub hostname: String,
    pub status: DeploymentStatus,
    /// Set once the service is reachable
    pub url: Option<String>,
}

fn status_badge(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Running => "✅ running",
        DeploymentStatus::Failed => "❌ failed",
        DeploymentStatus::Cancelled => "⏹️ cancelled",
        DeploymentStatus::Stopped => "⏹️ stopped",
        _ => "⏳ in progress",
    }
}

/// Markdown body posted on the pull request
pub fn render(environment_name: &str, commit_sha: &str, services: &[ServiceSummary]) -> String {
    let short_sha: String = commit_sha.chars().take(7).collect();
    let mut body = format!(
        "### Preview environment `{}`\n\nDeployed commit `{}`\n\n| Service | Status | URL |\n|---|---|---|\n",
        environment_name, short_sha
    );
    for service in services {
        let url = service
            .url
            .as_deref()
            .map(|u| format!("[{}]({})", service.hostname, u))
            .unwrap_or_else(|| "-".to_string());
        body.push_str(&format!(
            "| {} | {} | {} |\n",
            service.name,
            status_badge(service.status),
            url
        ));
    }
    body
}
