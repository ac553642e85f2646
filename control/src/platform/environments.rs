//! Environment operations

use openapi_server::models::DeployEnvironmentResponse;
use tracing::info;
use uuid::Uuid;

use crate::deploy::DeployRequest;
use crate::errors::ControlError;
use crate::models::{Environment, EnvironmentType};
use crate::platform::Platform;
use crate::store::StoreExt;

impl Platform {
    /// Create a manual environment in a project
    pub async fn create_environment(&self, project_id: Uuid, name: &str) -> Result<Environment, ControlError> {
        let project = self.store.project(project_id).await?;
        self.guard.check_environment_quota(project.id).await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ControlError::BadRequest("Environment name is required".to_string()));
        }
        let env = self
            .store
            .insert_environment(Environment::new(project.id, name, EnvironmentType::Manual))
            .await?;
        info!("Created environment {} in project {}", env.name, project.name);
        Ok(env)
    }

    /// Delete an environment with everything it runs
    pub async fn delete_environment(&self, id: Uuid) -> Result<(), ControlError> {
        let env = self.store.environment(id).await?;
        if env.is_production() {
            return Err(ControlError::BadRequest(
                "Production environments cannot be deleted".to_string(),
            ));
        }
        self.remove_environment(&env).await?;
        self.reconciler.sync_quietly().await;
        Ok(())
    }

    /// Tear down an environment's services and drop it, without the
    /// production check or proxy sync
    pub(crate) async fn remove_environment(&self, env: &Environment) -> Result<(), ControlError> {
        for service in self.store.list_services(env.id).await? {
            self.remove_service(&service).await?;
        }
        self.store.delete_environment(env.id).await?;
        info!("Deleted environment {} ({})", env.name, env.id);
        Ok(())
    }

    /// Queue a deploy of every service in the environment
    pub async fn deploy_environment(&self, id: Uuid) -> Result<DeployEnvironmentResponse, ControlError> {
        let env = self.store.environment(id).await?;
        let services = self.store.list_services(env.id).await?;

        // Reject the whole batch before queueing anything
        for service in &services {
            self.guard.check_deploy_rate(service.id).await?;
        }

        let mut job_ids = Vec::with_capacity(services.len());
        for service in &services {
            job_ids.push(self.queue.submit(service.id, DeployRequest::default()).await?);
        }
        info!("Queued {} deploys for environment {}", job_ids.len(), env.name);

        Ok(DeployEnvironmentResponse {
            environment_id: env.id,
            job_ids,
        })
    }
}
