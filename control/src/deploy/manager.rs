//! Deployment record manager
//!
//! Owns one deployment attempt from row creation to a terminal status. The
//! service's live pointer moves only in [`DeploymentManager::promote`].

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::runtime::{BuildSpec, ContainerRuntime, RunSpec, RunningContainer, SourceFetcher};
use crate::errors::ControlError;
use crate::models::{
    DeployType, Deployment, DeploymentStatus, DeploymentUpdate, Replica, ReplicaStatus, Service,
    ServiceUpdate,
};
use crate::proxy::Reconciler;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::TimeoutSettings;
use crate::store::{Store, StoreExt};
use crate::utils::bounded;

/// What to deploy
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    /// Replay this deployment's snapshot instead of fetching source
    pub rollback_source: Option<Deployment>,
}

impl DeployRequest {
    pub fn commit(sha: impl Into<String>, message: Option<String>) -> Self {
        Self {
            commit_sha: Some(sha.into()),
            commit_message: message,
            rollback_source: None,
        }
    }

    pub fn rollback(source: Deployment) -> Self {
        Self {
            commit_sha: source.commit_sha.clone(),
            commit_message: source.commit_message.clone(),
            rollback_source: Some(source),
        }
    }
}

/// Snapshot tag a deployment's image is retained under
pub fn snapshot_tag(image_prefix: &str, service_id: Uuid, deployment_id: Uuid) -> String {
    format!("{}/{}:{}", image_prefix, service_id, deployment_id)
}

/// Why an attempt stopped short of `running`
enum Abort {
    /// A newer deployment superseded this one
    Cancelled,
    Failed(ControlError),
}

impl From<ControlError> for Abort {
    fn from(e: ControlError) -> Self {
        Abort::Failed(e)
    }
}

/// In-flight bookkeeping for one attempt
struct Attempt {
    id: Uuid,
    fsm: DeploymentFsm,
    log: Vec<String>,
    containers: Vec<RunningContainer>,
    image: Option<String>,
    snapshot: bool,
}

impl Attempt {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            fsm: DeploymentFsm::new(),
            log: Vec::new(),
            containers: Vec::new(),
            image: None,
            snapshot: false,
        }
    }

    fn log(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        debug!("[{}] {}", self.id, line);
        self.log
            .push(format!("[{}] {}", Utc::now().format("%H:%M:%S"), line));
    }

    fn build_log(&self) -> String {
        self.log.join("\n")
    }
}

/// Drives deployments through build, run and promotion
pub struct DeploymentManager {
    store: Arc<dyn Store>,
    runtime: Arc<dyn ContainerRuntime>,
    source: Arc<dyn SourceFetcher>,
    reconciler: Arc<Reconciler>,
    builds_dir: PathBuf,
    image_prefix: String,
    timeouts: TimeoutSettings,
}

impl DeploymentManager {
    pub fn new(
        store: Arc<dyn Store>,
        runtime: Arc<dyn ContainerRuntime>,
        source: Arc<dyn SourceFetcher>,
        reconciler: Arc<Reconciler>,
        builds_dir: PathBuf,
        image_prefix: String,
        timeouts: TimeoutSettings,
    ) -> Self {
        Self {
            store,
            runtime,
            source,
            reconciler,
            builds_dir,
            image_prefix,
            timeouts,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn timeouts(&self) -> &TimeoutSettings {
        &self.timeouts
    }

    /// Whether `service_id` already has a deployment for `commit_sha`
    pub async fn has_existing_deployment(&self, service_id: Uuid, commit_sha: &str) -> Result<bool, ControlError> {
        Ok(self
            .store
            .find_deployment_by_commit(service_id, commit_sha)
            .await?
            .is_some())
    }

    /// Create a deployment and drive it to a terminal status.
    ///
    /// Build and run failures are recorded on the returned row (status
    /// `failed`) rather than returned as errors. `Conflict` means a
    /// deployment for this commit already exists.
    pub async fn deploy(&self, service: &Service, request: DeployRequest) -> Result<Deployment, ControlError> {
        let replay = match &request.rollback_source {
            Some(source) => Some(source.image_name.clone().ok_or_else(|| {
                ControlError::BadRequest(format!("Deployment {} has no image snapshot", source.id))
            })?),
            None => None,
        };
        let row = match &request.rollback_source {
            Some(source) => Deployment::rollback_of(source),
            None => Deployment::new(
                service.id,
                service.environment_id,
                request.commit_sha,
                request.commit_message,
            ),
        };

        let deployment = self.store.insert_deployment(row).await?;
        info!(
            "Created deployment {} for service {} ({})",
            deployment.id,
            service.name,
            deployment.commit_sha.as_deref().unwrap_or("no commit")
        );

        let mut attempt = Attempt::new(deployment.id);
        if let Err(e) = self.supersede(service.id, deployment.id).await {
            return self.abandon(&mut attempt, Abort::Failed(e)).await;
        }

        let staged = match replay {
            Some(image) => self.replay_stage(service, &mut attempt, image).await,
            None => self.source_stage(service, &mut attempt, deployment.commit_sha.as_deref()).await,
        };
        let result = match staged {
            Ok(()) => self.run_stage(service, &mut attempt).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => self.promote(service, &mut attempt).await,
            Err(abort) => self.abandon(&mut attempt, abort).await,
        }
    }

    /// Cancel every in-flight deployment of the service except `keep`
    async fn supersede(&self, service_id: Uuid, keep: Uuid) -> Result<(), ControlError> {
        for deployment in self.store.list_deployments(service_id).await? {
            if deployment.id == keep || deployment.status.is_terminal() {
                continue;
            }
            let cancelled = self
                .store
                .update_in_flight_deployment(
                    deployment.id,
                    DeploymentUpdate {
                        status: Some(DeploymentStatus::Cancelled),
                        finished_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await?;
            if cancelled.is_some() {
                info!("Deployment {} superseded by {}", deployment.id, keep);
            }
        }
        Ok(())
    }

    /// Apply `event`, persisting the new status and the log so far.
    ///
    /// A superseded attempt stops at its next step.
    async fn transition(&self, attempt: &mut Attempt, event: DeploymentEvent) -> Result<(), Abort> {
        let status = attempt
            .fsm
            .process(event)
            .map_err(|e| Abort::Failed(ControlError::DeployError(e)))?;
        attempt.log(format!("Status: {}", status));

        let updated = self
            .store
            .update_in_flight_deployment(
                attempt.id,
                DeploymentUpdate {
                    status: Some(status),
                    build_log: Some(attempt.build_log()),
                    ..Default::default()
                },
            )
            .await?;
        match updated {
            Some(_) => Ok(()),
            None => Err(Abort::Cancelled),
        }
    }

    async fn replay_stage(&self, service: &Service, attempt: &mut Attempt, image: String) -> Result<(), Abort> {
        attempt.log(format!("Rolling back to snapshot {}", image));
        self.transition(attempt, DeploymentEvent::Deploy).await?;
        attempt.image = Some(image);
        // The replayed image is already a snapshot
        attempt.snapshot = true;
        debug!("Replaying snapshot for service {}", service.id);
        Ok(())
    }

    /// Produce an image: clone and build for repos, pull otherwise
    async fn source_stage(&self, service: &Service, attempt: &mut Attempt, commit: Option<&str>) -> Result<(), Abort> {
        let image = match service.deploy_type {
            DeployType::Repo => self.clone_and_build(service, attempt, commit).await?,
            DeployType::Image | DeployType::Database => {
                let image_url = service.image_url.clone().ok_or_else(|| {
                    ControlError::BadRequest(format!("Service {} has no imageUrl", service.name))
                })?;
                self.transition(attempt, DeploymentEvent::Pull).await?;
                attempt.log(format!("Pulling {}", image_url));
                let image = bounded("image pull", self.timeouts.build(), self.runtime.pull(&image_url)).await?;
                self.transition(attempt, DeploymentEvent::Deploy).await?;
                image
            }
        };

        let tag = snapshot_tag(&self.image_prefix, service.id, attempt.id);
        match bounded("image tag", self.timeouts.run(), self.runtime.tag(&image, &tag)).await {
            Ok(()) => {
                attempt.log(format!("Captured snapshot {}", tag));
                attempt.image = Some(tag);
                attempt.snapshot = true;
            }
            Err(e) => {
                warn!("Snapshot capture failed for deployment {}: {}", attempt.id, e);
                attempt.log(format!("Snapshot capture failed: {}", e));
                attempt.image = Some(image);
            }
        }
        Ok(())
    }

    async fn clone_and_build(&self, service: &Service, attempt: &mut Attempt, commit: Option<&str>) -> Result<String, Abort> {
        let repo_url = service.repo_url.clone().ok_or_else(|| {
            ControlError::BadRequest(format!("Service {} has no repoUrl", service.name))
        })?;
        let workspace = StorageLayout::workspace(&self.builds_dir, attempt.id);

        self.transition(attempt, DeploymentEvent::Clone).await?;
        attempt.log(format!("Cloning {} ({})", repo_url, service.branch()));
        let checked_out = bounded(
            "git checkout",
            self.timeouts.build(),
            self.source.checkout(&repo_url, service.branch(), commit, &workspace),
        )
        .await;
        let sha = match checked_out {
            Ok(sha) => sha,
            Err(e) => {
                remove_workspace(&workspace).await;
                return Err(e.into());
            }
        };
        attempt.log(format!("Checked out {}", sha));

        let built = match self.transition(attempt, DeploymentEvent::Build).await {
            Ok(()) => {
                let spec = BuildSpec {
                    context_dir: workspace.join(service.build_context.as_deref().unwrap_or(".")),
                    dockerfile: service
                        .dockerfile_path
                        .clone()
                        .unwrap_or_else(|| "Dockerfile".to_string()),
                    tag: format!("{}/{}:latest", self.image_prefix, service.id),
                };
                attempt.log(format!("Building {} with {}", spec.tag, spec.dockerfile));
                bounded("image build", self.timeouts.build(), self.runtime.build(&spec))
                    .await
                    .map_err(Abort::from)
            }
            Err(abort) => Err(abort),
        };
        remove_workspace(&workspace).await;
        let image = built?;

        self.transition(attempt, DeploymentEvent::Deploy).await?;
        Ok(image)
    }

    /// Start one container per replica index
    async fn run_stage(&self, service: &Service, attempt: &mut Attempt) -> Result<(), Abort> {
        let image = attempt
            .image
            .clone()
            .ok_or_else(|| ControlError::Internal("no image to run".to_string()))?;
        let count = service.replica_count.max(1);
        let short = attempt.id.simple().to_string();

        for index in 0..count {
            let name = if count == 1 {
                format!("{}-{}", service.hostname, &short[..8])
            } else {
                format!("{}-{}-{}", service.hostname, &short[..8], index)
            };
            attempt.log(format!("Starting {} from {}", name, image));
            let spec = RunSpec::for_service(service, name);
            let container = bounded("container run", self.timeouts.run(), self.runtime.run(&image, &spec)).await?;
            attempt.log(format!(
                "Container {} listening on {}",
                container.container_id,
                container
                    .host_port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "no port".to_string())
            ));
            attempt.containers.push(container);
        }
        Ok(())
    }

    /// Mark the attempt running and move the service's live pointer to it.
    ///
    /// An attempt superseded after its containers started is released instead.
    async fn promote(&self, service: &Service, attempt: &mut Attempt) -> Result<Deployment, ControlError> {
        attempt
            .fsm
            .process(DeploymentEvent::Succeed)
            .map_err(ControlError::DeployError)?;
        attempt.log("Status: running");

        let primary = attempt.containers.first();
        let promoted = self
            .store
            .update_in_flight_deployment(
                attempt.id,
                DeploymentUpdate {
                    status: Some(DeploymentStatus::Running),
                    container_id: primary.map(|c| c.container_id.clone()),
                    host_port: primary.and_then(|c| c.host_port),
                    image_name: attempt.image.clone(),
                    rollback_eligible: Some(attempt.snapshot && service.volumes.is_empty()),
                    build_log: Some(attempt.build_log()),
                    finished_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        let Some(deployment) = promoted else {
            return self.abandon(attempt, Abort::Cancelled).await;
        };

        if attempt.containers.len() > 1 {
            for (index, container) in attempt.containers.iter().enumerate() {
                self.store
                    .insert_replica(Replica::running(
                        attempt.id,
                        index as u32,
                        container.container_id.clone(),
                        container.host_port,
                    ))
                    .await?;
            }
        }

        let previous = self.store.service(service.id).await?.current_deployment_id;
        self.store
            .update_service(service.id, ServiceUpdate::live(Some(deployment.id)))
            .await?;
        info!("Deployment {} is live for service {}", deployment.id, service.name);

        if let Some(previous) = previous.filter(|id| *id != deployment.id) {
            if let Err(e) = self.retire(previous).await {
                warn!("Failed to stop previous deployment {}: {}", previous, e);
            }
        }

        self.reconciler.sync_quietly().await;
        Ok(deployment)
    }

    /// Record a failed or cancelled attempt and release its containers.
    ///
    /// A row that is already terminal keeps its status.
    async fn abandon(&self, attempt: &mut Attempt, abort: Abort) -> Result<Deployment, ControlError> {
        for container in std::mem::take(&mut attempt.containers) {
            self.stop_container(&container.container_id).await;
        }

        match abort {
            Abort::Cancelled => {
                info!("Deployment {} was cancelled", attempt.id);
                self.store.deployment(attempt.id).await
            }
            Abort::Failed(e) => {
                let message = e.to_string();
                error!("Deployment {} failed: {}", attempt.id, message);
                attempt.log(format!("Failed: {}", message));
                let _ = attempt.fsm.process(DeploymentEvent::Fail(message.clone()));
                let failed = self
                    .store
                    .update_in_flight_deployment(
                        attempt.id,
                        DeploymentUpdate {
                            status: Some(DeploymentStatus::Failed),
                            error_message: Some(message),
                            build_log: Some(attempt.build_log()),
                            finished_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await?;
                match failed {
                    Some(deployment) => Ok(deployment),
                    None => {
                        let deployment = self.store.deployment(attempt.id).await?;
                        info!("Deployment {} already {}, not marking it failed", attempt.id, deployment.status);
                        Ok(deployment)
                    }
                }
            }
        }
    }

    /// Operator stop of a running deployment
    pub async fn stop(&self, deployment_id: Uuid) -> Result<Deployment, ControlError> {
        let deployment = self.store.deployment(deployment_id).await?;
        let mut fsm = DeploymentFsm::from_status(deployment.status);
        fsm.process(DeploymentEvent::Stop).map_err(|_| {
            ControlError::BadRequest(format!(
                "Deployment {} is {} and cannot be stopped",
                deployment.id, deployment.status
            ))
        })?;

        let stopped = self.retire(deployment.id).await?;

        let service = self.store.service(deployment.service_id).await?;
        if service.current_deployment_id == Some(deployment.id) {
            self.store
                .update_service(service.id, ServiceUpdate::live(None))
                .await?;
        }

        self.reconciler.sync_quietly().await;
        info!("Stopped deployment {}", deployment.id);
        Ok(stopped)
    }

    /// Stop the containers of a deployment and mark it and its replicas stopped
    async fn retire(&self, deployment_id: Uuid) -> Result<Deployment, ControlError> {
        let deployment = self.store.deployment(deployment_id).await?;
        let replicas = self.store.list_replicas(deployment.id).await?;

        if replicas.is_empty() {
            if let Some(container_id) = &deployment.container_id {
                self.stop_container(container_id).await;
            }
        }
        for replica in replicas {
            if let Some(container_id) = &replica.container_id {
                self.stop_container(container_id).await;
            }
            self.store
                .set_replica_status(replica.id, ReplicaStatus::Stopped)
                .await?;
        }

        if deployment.status != DeploymentStatus::Running {
            return Ok(deployment);
        }
        self.store
            .update_deployment(deployment.id, DeploymentUpdate::status(DeploymentStatus::Stopped))
            .await
    }

    /// Stop whatever the service is serving; used before deleting it
    pub async fn teardown(&self, service: &Service) -> Result<(), ControlError> {
        if let Some(live) = service.current_deployment_id {
            self.retire(live).await?;
        }
        Ok(())
    }

    async fn stop_container(&self, container_id: &str) {
        if let Err(e) = bounded("container stop", self.timeouts.run(), self.runtime.stop(container_id)).await {
            warn!("Failed to stop container {}: {}", container_id, e);
        }
    }
}

async fn remove_workspace(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove workspace {:?}: {}", path, e);
        }
    }
}
