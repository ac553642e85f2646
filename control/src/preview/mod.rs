//! Preview environment manager
//!
//! Pull request events create, refresh and tear down one preview environment
//! per `(project, PR number)`, populated by cloning the project's production
//! services that build from the PR's repository.

pub mod comment;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use openapi_client::models::PullRequestEvent;
use openapi_server::models::WebhookResponse;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::deploy::DeployRequest;
use crate::errors::ControlError;
use crate::models::{DeploymentStatus, Environment, EnvironmentUpdate, Service, ServiceUpdate};
use crate::platform::Platform;
use crate::scm::SourceControl;
use crate::store::StoreExt;
use crate::utils::{bounded, preview_hostname, slugify, truncate_label, MAX_HOSTNAME_LEN};

use comment::ServiceSummary;

/// Action on a pull request that the manager reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    Closed,
}

impl PullRequestAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "opened" => Some(Self::Opened),
            "synchronize" => Some(Self::Synchronize),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Environment name for a pull request
pub fn environment_name(pr_number: u64, title: &str) -> String {
    let name = format!("pr-{}-{}", pr_number, slugify(title));
    truncate_label(&name, MAX_HOSTNAME_LEN)
}

pub struct PreviewManager {
    platform: Arc<Platform>,
    scm: Arc<dyn SourceControl>,
    scm_timeout: Duration,
}

impl PreviewManager {
    pub fn new(platform: Arc<Platform>, scm: Arc<dyn SourceControl>, scm_timeout: Duration) -> Self {
        Self {
            platform,
            scm,
            scm_timeout,
        }
    }

    pub async fn handle(&self, event: &PullRequestEvent) -> Result<WebhookResponse, ControlError> {
        let Some(action) = PullRequestAction::parse(&event.action) else {
            return Ok(WebhookResponse::message(format!(
                "Ignored pull_request action '{}'",
                event.action
            )));
        };

        let by_project = self.linked_services(&event.repository.clone_url).await?;
        if by_project.is_empty() {
            return Ok(WebhookResponse::message(format!(
                "Repository {} is not linked to any project",
                event.repository.full_name
            )));
        }

        if action == PullRequestAction::Closed {
            return self.close(event, by_project.keys().copied()).await;
        }

        let mut environment_id = None;
        let mut deployment_ids = Vec::new();
        for (project_id, services) in by_project {
            let env = self.ensure_environment(project_id, event, action).await?;
            environment_id.get_or_insert(env.id);
            deployment_ids.extend(self.sync_services(&env, &services, event).await?);
        }

        let verb = match action {
            PullRequestAction::Opened => "created",
            _ => "updated",
        };
        Ok(WebhookResponse {
            message: format!("Preview environment {} for PR #{}", verb, event.number),
            environment_id,
            deployment_ids: Some(deployment_ids),
        })
    }

    /// Production services building from `clone_url`, grouped by project
    async fn linked_services(&self, clone_url: &str) -> Result<BTreeMap<Uuid, Vec<Service>>, ControlError> {
        let store = &self.platform.store;
        let mut by_project: BTreeMap<Uuid, Vec<Service>> = BTreeMap::new();
        for service in store.list_all_services().await? {
            if !service.matches_repo(clone_url) {
                continue;
            }
            let env = store.environment(service.environment_id).await?;
            if env.is_production() {
                by_project.entry(env.project_id).or_default().push(service);
            }
        }
        Ok(by_project)
    }

    async fn close(
        &self,
        event: &PullRequestEvent,
        projects: impl Iterator<Item = Uuid>,
    ) -> Result<WebhookResponse, ControlError> {
        let mut deleted = None;
        for project_id in projects {
            if let Some(env) = self.platform.store.find_preview(project_id, event.number).await? {
                self.platform.remove_environment(&env).await?;
                deleted.get_or_insert(env.id);
            }
        }

        Ok(match deleted {
            Some(id) => {
                self.platform.reconciler.sync_quietly().await;
                info!("Removed preview environment for PR #{}", event.number);
                WebhookResponse {
                    message: format!("Preview environment deleted for PR #{}", event.number),
                    environment_id: Some(id),
                    deployment_ids: None,
                }
            }
            None => WebhookResponse::message(format!(
                "No preview environment for PR #{}",
                event.number
            )),
        })
    }

    /// Find or create the preview for the PR
    async fn ensure_environment(
        &self,
        project_id: Uuid,
        event: &PullRequestEvent,
        action: PullRequestAction,
    ) -> Result<Environment, ControlError> {
        let store = &self.platform.store;
        let pr = &event.pull_request;
        let name = environment_name(event.number, &pr.title);

        if let Some(env) = store.find_preview(project_id, event.number).await? {
            let renamed = action == PullRequestAction::Synchronize && env.name != name;
            let rebranched = env.pr_branch.as_deref() != Some(pr.head.git_ref.as_str());
            if !renamed && !rebranched {
                return Ok(env);
            }
            let env = store
                .update_environment(
                    env.id,
                    EnvironmentUpdate {
                        name: renamed.then(|| name.clone()),
                        pr_branch: rebranched.then(|| pr.head.git_ref.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(env);
        }

        self.platform.guard.check_environment_quota(project_id).await?;
        let env = store
            .insert_environment(Environment::preview(project_id, &name, event.number, &pr.head.git_ref))
            .await?;
        info!("Created preview environment {} for PR #{}", env.name, event.number);
        Ok(env)
    }

    /// Clone missing services, deploy the head commit and post the summary.
    ///
    /// Returns ids of deployments created by this call.
    async fn sync_services(
        &self,
        env: &Environment,
        production: &[Service],
        event: &PullRequestEvent,
    ) -> Result<Vec<Uuid>, ControlError> {
        let store = &self.platform.store;
        let head = &event.pull_request.head;

        let existing = store.list_services(env.id).await?;
        let missing: Vec<&Service> = production
            .iter()
            .filter(|p| !existing.iter().any(|s| s.name == p.name))
            .collect();
        if !missing.is_empty() {
            self.platform.guard.check_service_quota(env.id, missing.len()).await?;
        }

        let mut clones = Vec::with_capacity(production.len());
        for source in production {
            match existing.iter().find(|s| s.name == source.name) {
                Some(clone) => {
                    if clone.branch.as_deref() != Some(head.git_ref.as_str()) {
                        let update = ServiceUpdate {
                            branch: Some(head.git_ref.clone()),
                            ..Default::default()
                        };
                        clones.push(store.update_service(clone.id, update).await?);
                    } else {
                        clones.push(clone.clone());
                    }
                }
                None => {
                    let mut clone = source.clone_into(env.id, preview_hostname(&source.hostname, &env.name));
                    clone.branch = Some(head.git_ref.clone());
                    clones.push(self.platform.insert_service(clone).await?);
                }
            }
        }

        let mut created = Vec::new();
        let mut summary = Vec::with_capacity(clones.len());
        for clone in &clones {
            let status = match store.find_deployment_by_commit(clone.id, &head.sha).await? {
                Some(previous) => {
                    info!(
                        "Service {} already has deployment {} for {}",
                        clone.name, previous.id, head.sha
                    );
                    previous.status
                }
                None => self.deploy_clone(clone, &head.sha, &mut created).await,
            };
            summary.push(ServiceSummary {
                name: clone.name.clone(),
                hostname: clone.hostname.clone(),
                status,
                url: (status == DeploymentStatus::Running).then(|| self.platform.public_url(&clone.hostname)),
            });
        }

        self.post_comment(env, event, &summary).await;
        Ok(created)
    }

    async fn deploy_clone(&self, clone: &Service, sha: &str, created: &mut Vec<Uuid>) -> DeploymentStatus {
        let deployments = &self.platform.deployments;
        match deployments.deploy(clone, DeployRequest::commit(sha, None)).await {
            Ok(deployment) => {
                created.push(deployment.id);
                deployment.status
            }
            Err(ControlError::Conflict(_)) => {
                // A concurrent delivery got there first
                match self.platform.store.find_deployment_by_commit(clone.id, sha).await {
                    Ok(Some(other)) => other.status,
                    _ => DeploymentStatus::Pending,
                }
            }
            Err(e) => {
                error!("Preview deploy of {} failed: {}", clone.name, e);
                DeploymentStatus::Failed
            }
        }
    }

    /// Create or update the PR comment; failures are only logged
    async fn post_comment(&self, env: &Environment, event: &PullRequestEvent, summary: &[ServiceSummary]) {
        let repo = &event.repository.full_name;
        let body = comment::render(&env.name, &event.pull_request.head.sha, summary);

        let result = match env.pr_comment_id {
            Some(comment_id) => {
                bounded(
                    "comment update",
                    self.scm_timeout,
                    self.scm.update_comment(repo, comment_id, &body),
                )
                .await
            }
            None => {
                let created = bounded(
                    "comment create",
                    self.scm_timeout,
                    self.scm.create_comment(repo, event.number, &body),
                )
                .await;
                match created {
                    Ok(comment_id) => self
                        .platform
                        .store
                        .update_environment(
                            env.id,
                            EnvironmentUpdate {
                                pr_comment_id: Some(comment_id),
                                ..Default::default()
                            },
                        )
                        .await
                        .map(|_| ()),
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = result {
            warn!("Failed to post preview comment on {}#{}: {}", repo, event.number, e);
        }
    }
}
