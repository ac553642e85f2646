//! Persisted store collaborator
//!
//! CRUD plus simple filtered counts. A single call is a single logical write;
//! no multi-statement transactions are assumed.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::ControlError;
use crate::models::{
    Deployment, DeploymentUpdate, Domain, Environment, EnvironmentUpdate, Project, Replica,
    ReplicaStatus, Service, ServiceUpdate,
};

pub use memory::MemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    // Projects

    /// Conflict if the hostname is taken
    async fn insert_project(&self, project: Project) -> Result<Project, ControlError>;
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, ControlError>;
    async fn count_projects(&self) -> Result<usize, ControlError>;

    // Environments

    async fn insert_environment(&self, env: Environment) -> Result<Environment, ControlError>;
    async fn get_environment(&self, id: Uuid) -> Result<Option<Environment>, ControlError>;
    async fn update_environment(
        &self,
        id: Uuid,
        update: EnvironmentUpdate,
    ) -> Result<Environment, ControlError>;
    async fn delete_environment(&self, id: Uuid) -> Result<(), ControlError>;
    async fn list_environments(&self, project_id: Uuid) -> Result<Vec<Environment>, ControlError>;
    async fn count_environments(&self, project_id: Uuid) -> Result<usize, ControlError>;
    async fn find_preview(
        &self,
        project_id: Uuid,
        pr_number: u64,
    ) -> Result<Option<Environment>, ControlError>;

    // Services

    /// Conflict if the name is taken within the environment
    async fn insert_service(&self, service: Service) -> Result<Service, ControlError>;
    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, ControlError>;
    async fn update_service(&self, id: Uuid, update: ServiceUpdate) -> Result<Service, ControlError>;
    async fn delete_service(&self, id: Uuid) -> Result<(), ControlError>;
    async fn list_services(&self, environment_id: Uuid) -> Result<Vec<Service>, ControlError>;
    async fn list_all_services(&self) -> Result<Vec<Service>, ControlError>;
    async fn count_services(&self, environment_id: Uuid) -> Result<usize, ControlError>;

    // Deployments

    /// Conflict if a commit-keyed deployment for `(serviceId, commitSha)` exists
    async fn insert_deployment(&self, deployment: Deployment) -> Result<Deployment, ControlError>;
    async fn get_deployment(&self, id: Uuid) -> Result<Option<Deployment>, ControlError>;
    async fn update_deployment(
        &self,
        id: Uuid,
        update: DeploymentUpdate,
    ) -> Result<Deployment, ControlError>;
    /// Apply `update` only while the deployment is in flight.
    ///
    /// `None` when the row already reached a terminal status.
    async fn update_in_flight_deployment(
        &self,
        id: Uuid,
        update: DeploymentUpdate,
    ) -> Result<Option<Deployment>, ControlError>;
    /// Newest first
    async fn list_deployments(&self, service_id: Uuid) -> Result<Vec<Deployment>, ControlError>;
    async fn find_deployment_by_commit(
        &self,
        service_id: Uuid,
        commit_sha: &str,
    ) -> Result<Option<Deployment>, ControlError>;
    async fn count_deployments_since(
        &self,
        service_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<usize, ControlError>;
    async fn delete_deployments(&self, service_id: Uuid) -> Result<(), ControlError>;

    // Replicas

    async fn insert_replica(&self, replica: Replica) -> Result<Replica, ControlError>;
    /// Ascending replica index
    async fn list_replicas(&self, deployment_id: Uuid) -> Result<Vec<Replica>, ControlError>;
    async fn set_replica_status(&self, id: Uuid, status: ReplicaStatus) -> Result<(), ControlError>;

    // Domains

    /// Conflict if the domain is already routed anywhere
    async fn insert_domain(&self, domain: Domain) -> Result<Domain, ControlError>;
    async fn get_domain(&self, id: Uuid) -> Result<Option<Domain>, ControlError>;
    async fn set_domain_verified(&self, id: Uuid, verified: bool) -> Result<Domain, ControlError>;
    async fn delete_domain(&self, id: Uuid) -> Result<(), ControlError>;
    async fn list_domains(&self, service_id: Uuid) -> Result<Vec<Domain>, ControlError>;
    async fn list_all_domains(&self) -> Result<Vec<Domain>, ControlError>;
}

/// Fetch helpers that turn a missing row into `NotFound`
#[async_trait]
pub trait StoreExt {
    async fn project(&self, id: Uuid) -> Result<Project, ControlError>;
    async fn environment(&self, id: Uuid) -> Result<Environment, ControlError>;
    async fn service(&self, id: Uuid) -> Result<Service, ControlError>;
    async fn deployment(&self, id: Uuid) -> Result<Deployment, ControlError>;
}

#[async_trait]
impl<S: Store + ?Sized> StoreExt for S {
    async fn project(&self, id: Uuid) -> Result<Project, ControlError> {
        self.get_project(id)
            .await?
            .ok_or_else(|| ControlError::not_found("Project", id))
    }

    async fn environment(&self, id: Uuid) -> Result<Environment, ControlError> {
        self.get_environment(id)
            .await?
            .ok_or_else(|| ControlError::not_found("Environment", id))
    }

    async fn service(&self, id: Uuid) -> Result<Service, ControlError> {
        self.get_service(id)
            .await?
            .ok_or_else(|| ControlError::not_found("Service", id))
    }

    async fn deployment(&self, id: Uuid) -> Result<Deployment, ControlError> {
        self.get_deployment(id)
            .await?
            .ok_or_else(|| ControlError::not_found("Deployment", id))
    }
}
