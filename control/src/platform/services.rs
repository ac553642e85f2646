//! Service operations

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::deploy::DeployRequest;
use crate::errors::ControlError;
use crate::models::{Deployment, Domain, Environment, NewService, Project, Service, ServiceUpdate};
use crate::platform::Platform;
use crate::store::StoreExt;
use crate::utils::{preview_hostname, slugify, truncate_label, MAX_HOSTNAME_LEN};

/// A created service and its queued auto-deploy
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedService {
    #[serde(flatten)]
    pub service: Service,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

/// System hostname for a new service in `env`
pub fn service_hostname(name: &str, project: &Project, env: &Environment) -> String {
    let base = truncate_label(
        &format!("{}-{}", slugify(name), project.hostname),
        MAX_HOSTNAME_LEN,
    );
    if env.is_production() {
        base
    } else {
        preview_hostname(&base, &env.name)
    }
}

impl Platform {
    /// Create one or more services in an environment.
    ///
    /// The batch is validated as a whole before any row is written.
    pub async fn create_services(
        &self,
        environment_id: Uuid,
        inputs: Vec<NewService>,
    ) -> Result<Vec<CreatedService>, ControlError> {
        if inputs.is_empty() {
            return Err(ControlError::BadRequest("At least one service is required".to_string()));
        }
        let env = self.store.environment(environment_id).await?;
        let project = self.store.project(env.project_id).await?;
        self.guard.check_service_quota(env.id, inputs.len()).await?;

        let mut services = Vec::with_capacity(inputs.len());
        for input in inputs {
            self.guard.check_replicas(input.replica_count)?;
            self.guard.check_resources(input.cpu_limit, input.memory_limit_mb)?;
            let hostname = service_hostname(&input.name, &project, &env);
            let service = input.into_service(env.id, hostname);
            service.validate()?;
            services.push(service);
        }

        let mut created = Vec::with_capacity(services.len());
        for service in services {
            let service = self.insert_service(service).await?;
            let job_id = if service.auto_deploy {
                Some(self.queue.submit(service.id, DeployRequest::default()).await?)
            } else {
                None
            };
            created.push(CreatedService { service, job_id });
        }
        Ok(created)
    }

    /// Insert a service along with its system domain
    pub(crate) async fn insert_service(&self, service: Service) -> Result<Service, ControlError> {
        let service = self.store.insert_service(service).await?;
        let domain = Domain::system(
            service.id,
            service.environment_id,
            self.system_domain(&service.hostname),
        );
        if let Err(e) = self.store.insert_domain(domain).await {
            warn!("Failed to issue system domain for {}: {}", service.hostname, e);
        }
        info!("Created service {} ({})", service.name, service.hostname);
        Ok(service)
    }

    pub async fn update_service(&self, id: Uuid, update: ServiceUpdate) -> Result<Service, ControlError> {
        let current = self.store.service(id).await?;
        if let Some(replicas) = update.replica_count {
            self.guard.check_replicas(replicas)?;
        }
        self.guard.check_resources(update.cpu_limit, update.memory_limit_mb)?;

        let mut candidate = current.clone();
        update.clone().apply(&mut candidate);
        candidate.validate()?;

        // The live pointer only moves through the deployment manager
        let update = ServiceUpdate {
            current_deployment_id: None,
            ..update
        };
        self.store.update_service(id, update).await
    }

    pub async fn delete_service(&self, id: Uuid) -> Result<(), ControlError> {
        let service = self.store.service(id).await?;
        self.remove_service(&service).await?;
        self.reconciler.sync_quietly().await;
        Ok(())
    }

    pub(crate) async fn remove_service(&self, service: &Service) -> Result<(), ControlError> {
        if let Err(e) = self.deployments.teardown(service).await {
            warn!("Failed to stop service {}: {}", service.name, e);
        }
        self.store.delete_deployments(service.id).await?;
        self.store.delete_service(service.id).await?;
        info!("Deleted service {} ({})", service.name, service.id);
        Ok(())
    }

    /// Queue a deploy of one service
    pub async fn deploy_service(&self, id: Uuid) -> Result<Uuid, ControlError> {
        let service = self.store.service(id).await?;
        self.guard.check_deploy_rate(service.id).await?;
        self.queue.submit(service.id, DeployRequest::default()).await
    }

    /// Roll back to a prior deployment, awaiting the new one
    pub async fn rollback(&self, deployment_id: Uuid) -> Result<Deployment, ControlError> {
        let source = self.store.deployment(deployment_id).await?;
        self.guard.check_deploy_rate(source.service_id).await?;
        self.deployments.rollback(source.id).await
    }

    pub async fn list_deployments(&self, service_id: Uuid) -> Result<Vec<Deployment>, ControlError> {
        let service = self.store.service(service_id).await?;
        self.store.list_deployments(service.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnvironmentType;

    #[test]
    fn test_service_hostname() {
        let project = Project::new("My Project");
        let production = Environment::new(project.id, "production", EnvironmentType::Production);
        let staging = Environment::new(project.id, "Staging", EnvironmentType::Manual);

        assert_eq!(service_hostname("API", &project, &production), "api-my-project");
        assert_eq!(service_hostname("API", &project, &staging), "api-my-project-staging");
    }
}
