//! Push event handling

use openapi_client::models::PushEvent;
use openapi_server::models::WebhookResponse;
use tracing::{error, info};

use crate::deploy::DeployRequest;
use crate::errors::ControlError;
use crate::models::DeploymentStatus;
use crate::platform::Platform;

/// Deploy every auto-deploying service that builds from the pushed
/// repository, once per commit.
///
/// Only default-branch pushes deploy; previews come from pull requests.
pub async fn handle(platform: &Platform, event: &PushEvent) -> Result<WebhookResponse, ControlError> {
    let branch = event.branch();
    if event.deleted {
        return Ok(WebhookResponse::message(format!("Ignored deletion of branch '{}'", branch)));
    }
    if branch != event.repository.default_branch {
        return Ok(WebhookResponse::message(format!(
            "Push to '{}' ignored; only '{}' is deployed",
            branch, event.repository.default_branch
        )));
    }

    let services: Vec<_> = platform
        .store
        .list_all_services()
        .await?
        .into_iter()
        .filter(|s| s.auto_deploy && s.matches_repo(&event.repository.clone_url))
        .collect();
    if services.is_empty() {
        return Ok(WebhookResponse::message(format!(
            "Repository {} is not linked to any service",
            event.repository.full_name
        )));
    }

    let sha = event.after.as_str();
    let message = event.commit_message().map(str::to_string);
    let mut deployment_ids = Vec::new();
    let mut skipped = 0usize;

    for service in &services {
        match platform.deployments.has_existing_deployment(service.id, sha).await {
            Ok(true) => {
                info!("Service {} already deployed {}, skipping", service.name, sha);
                skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Failed to check deployments of {}: {}", service.name, e);
                continue;
            }
        }

        match platform
            .deployments
            .deploy(service, DeployRequest::commit(sha, message.clone()))
            .await
        {
            Ok(deployment) => {
                if deployment.status != DeploymentStatus::Running {
                    error!(
                        "Deployment {} of {} ended {}",
                        deployment.id, service.name, deployment.status
                    );
                }
                deployment_ids.push(deployment.id);
            }
            Err(ControlError::Conflict(_)) => {
                info!("Service {} is already deploying {}", service.name, sha);
                skipped += 1;
            }
            Err(e) => error!("Deploy of {} failed: {}", service.name, e),
        }
    }

    Ok(WebhookResponse {
        message: format!(
            "Deployed {} of {} services at {} ({} already deployed)",
            deployment_ids.len(),
            services.len(),
            sha,
            skipped
        ),
        environment_id: None,
        deployment_ids: Some(deployment_ids),
    })
}
