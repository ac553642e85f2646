//! In-process store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ControlError;
use crate::models::{
    Deployment, DeploymentUpdate, Domain, Environment, EnvironmentUpdate, Project, Replica,
    ReplicaStatus, Service, ServiceUpdate,
};
use crate::store::Store;

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    environments: HashMap<Uuid, Environment>,
    services: HashMap<Uuid, Service>,
    /// Insertion order doubles as creation order
    deployments: Vec<Deployment>,
    replicas: Vec<Replica>,
    domains: HashMap<Uuid, Domain>,
}

/// Store backed by in-memory tables
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_project(&self, project: Project) -> Result<Project, ControlError> {
        let mut t = self.tables.write().await;
        if t.projects.values().any(|p| p.hostname == project.hostname) {
            return Err(ControlError::Conflict(format!(
                "Project hostname '{}' is already taken",
                project.hostname
            )));
        }
        t.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, ControlError> {
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn count_projects(&self) -> Result<usize, ControlError> {
        Ok(self.tables.read().await.projects.len())
    }

    async fn insert_environment(&self, env: Environment) -> Result<Environment, ControlError> {
        let mut t = self.tables.write().await;
        if t
            .environments
            .values()
            .any(|e| e.project_id == env.project_id && e.name == env.name)
        {
            return Err(ControlError::Conflict(format!(
                "Environment '{}' already exists in project",
                env.name
            )));
        }
        t.environments.insert(env.id, env.clone());
        Ok(env)
    }

    async fn get_environment(&self, id: Uuid) -> Result<Option<Environment>, ControlError> {
        Ok(self.tables.read().await.environments.get(&id).cloned())
    }

    async fn update_environment(
        &self,
        id: Uuid,
        update: EnvironmentUpdate,
    ) -> Result<Environment, ControlError> {
        let mut t = self.tables.write().await;
        let env = t
            .environments
            .get_mut(&id)
            .ok_or_else(|| ControlError::not_found("Environment", id))?;
        update.apply(env);
        Ok(env.clone())
    }

    async fn delete_environment(&self, id: Uuid) -> Result<(), ControlError> {
        self.tables.write().await.environments.remove(&id);
        Ok(())
    }

    async fn list_environments(&self, project_id: Uuid) -> Result<Vec<Environment>, ControlError> {
        let t = self.tables.read().await;
        let mut envs: Vec<_> = t
            .environments
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        envs.sort_by_key(|e| e.created_at);
        Ok(envs)
    }

    async fn count_environments(&self, project_id: Uuid) -> Result<usize, ControlError> {
        let t = self.tables.read().await;
        Ok(t.environments.values().filter(|e| e.project_id == project_id).count())
    }

    async fn find_preview(
        &self,
        project_id: Uuid,
        pr_number: u64,
    ) -> Result<Option<Environment>, ControlError> {
        let t = self.tables.read().await;
        Ok(t
            .environments
            .values()
            .find(|e| e.project_id == project_id && e.pr_number == Some(pr_number))
            .cloned())
    }

    async fn insert_service(&self, service: Service) -> Result<Service, ControlError> {
        let mut t = self.tables.write().await;
        if t
            .services
            .values()
            .any(|s| s.environment_id == service.environment_id && s.name == service.name)
        {
            return Err(ControlError::Conflict(format!(
                "Service '{}' already exists in environment",
                service.name
            )));
        }
        t.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, ControlError> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn update_service(&self, id: Uuid, update: ServiceUpdate) -> Result<Service, ControlError> {
        let mut t = self.tables.write().await;
        let current = t
            .services
            .get(&id)
            .ok_or_else(|| ControlError::not_found("Service", id))?;

        let mut updated = current.clone();
        update.apply(&mut updated);
        if updated.name != current.name
            && t.services.values().any(|s| {
                s.id != id && s.environment_id == updated.environment_id && s.name == updated.name
            })
        {
            return Err(ControlError::Conflict(format!(
                "Service '{}' already exists in environment",
                updated.name
            )));
        }
        t.services.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_service(&self, id: Uuid) -> Result<(), ControlError> {
        let mut t = self.tables.write().await;
        t.services.remove(&id);
        t.domains.retain(|_, d| d.service_id != id);
        Ok(())
    }

    async fn list_services(&self, environment_id: Uuid) -> Result<Vec<Service>, ControlError> {
        let t = self.tables.read().await;
        let mut services: Vec<_> = t
            .services
            .values()
            .filter(|s| s.environment_id == environment_id)
            .cloned()
            .collect();
        services.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(services)
    }

    async fn list_all_services(&self) -> Result<Vec<Service>, ControlError> {
        let t = self.tables.read().await;
        let mut services: Vec<_> = t.services.values().cloned().collect();
        services.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(services)
    }

    async fn count_services(&self, environment_id: Uuid) -> Result<usize, ControlError> {
        let t = self.tables.read().await;
        Ok(t.services.values().filter(|s| s.environment_id == environment_id).count())
    }

    async fn insert_deployment(&self, deployment: Deployment) -> Result<Deployment, ControlError> {
        let mut t = self.tables.write().await;
        if deployment.is_commit_keyed()
            && t.deployments.iter().any(|d| {
                d.is_commit_keyed()
                    && d.service_id == deployment.service_id
                    && d.commit_sha == deployment.commit_sha
            })
        {
            return Err(ControlError::Conflict(format!(
                "Service {} already has a deployment for commit {}",
                deployment.service_id,
                deployment.commit_sha.as_deref().unwrap_or_default()
            )));
        }
        t.deployments.push(deployment.clone());
        Ok(deployment)
    }

    async fn get_deployment(&self, id: Uuid) -> Result<Option<Deployment>, ControlError> {
        let t = self.tables.read().await;
        Ok(t.deployments.iter().find(|d| d.id == id).cloned())
    }

    async fn update_deployment(
        &self,
        id: Uuid,
        update: DeploymentUpdate,
    ) -> Result<Deployment, ControlError> {
        let mut t = self.tables.write().await;
        let deployment = t
            .deployments
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ControlError::not_found("Deployment", id))?;
        update.apply(deployment);
        Ok(deployment.clone())
    }

    async fn update_in_flight_deployment(
        &self,
        id: Uuid,
        update: DeploymentUpdate,
    ) -> Result<Option<Deployment>, ControlError> {
        let mut t = self.tables.write().await;
        let deployment = t
            .deployments
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ControlError::not_found("Deployment", id))?;
        if deployment.status.is_terminal() {
            return Ok(None);
        }
        update.apply(deployment);
        Ok(Some(deployment.clone()))
    }

    async fn list_deployments(&self, service_id: Uuid) -> Result<Vec<Deployment>, ControlError> {
        let t = self.tables.read().await;
        Ok(t
            .deployments
            .iter()
            .rev()
            .filter(|d| d.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn find_deployment_by_commit(
        &self,
        service_id: Uuid,
        commit_sha: &str,
    ) -> Result<Option<Deployment>, ControlError> {
        let t = self.tables.read().await;
        Ok(t
            .deployments
            .iter()
            .rev()
            .find(|d| d.service_id == service_id && d.commit_sha.as_deref() == Some(commit_sha))
            .cloned())
    }

    async fn count_deployments_since(
        &self,
        service_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<usize, ControlError> {
        let t = self.tables.read().await;
        Ok(t
            .deployments
            .iter()
            .filter(|d| d.service_id == service_id && d.created_at > since)
            .count())
    }

    async fn delete_deployments(&self, service_id: Uuid) -> Result<(), ControlError> {
        let mut t = self.tables.write().await;
        let removed: Vec<Uuid> = t
            .deployments
            .iter()
            .filter(|d| d.service_id == service_id)
            .map(|d| d.id)
            .collect();
        t.deployments.retain(|d| d.service_id != service_id);
        t.replicas.retain(|r| !removed.contains(&r.deployment_id));
        Ok(())
    }

    async fn insert_replica(&self, replica: Replica) -> Result<Replica, ControlError> {
        let mut t = self.tables.write().await;
        if t
            .replicas
            .iter()
            .any(|r| r.deployment_id == replica.deployment_id && r.replica_index == replica.replica_index)
        {
            return Err(ControlError::Conflict(format!(
                "Replica {} already exists for deployment {}",
                replica.replica_index, replica.deployment_id
            )));
        }
        t.replicas.push(replica.clone());
        Ok(replica)
    }

    async fn list_replicas(&self, deployment_id: Uuid) -> Result<Vec<Replica>, ControlError> {
        let t = self.tables.read().await;
        let mut replicas: Vec<_> = t
            .replicas
            .iter()
            .filter(|r| r.deployment_id == deployment_id)
            .cloned()
            .collect();
        replicas.sort_by_key(|r| r.replica_index);
        Ok(replicas)
    }

    async fn set_replica_status(&self, id: Uuid, status: ReplicaStatus) -> Result<(), ControlError> {
        let mut t = self.tables.write().await;
        if let Some(replica) = t.replicas.iter_mut().find(|r| r.id == id) {
            replica.status = status;
        }
        Ok(())
    }

    async fn insert_domain(&self, domain: Domain) -> Result<Domain, ControlError> {
        let mut t = self.tables.write().await;
        if t.domains.values().any(|d| d.domain.eq_ignore_ascii_case(&domain.domain)) {
            return Err(ControlError::Conflict(format!(
                "Domain '{}' is already in use",
                domain.domain
            )));
        }
        t.domains.insert(domain.id, domain.clone());
        Ok(domain)
    }

    async fn get_domain(&self, id: Uuid) -> Result<Option<Domain>, ControlError> {
        Ok(self.tables.read().await.domains.get(&id).cloned())
    }

    async fn set_domain_verified(&self, id: Uuid, verified: bool) -> Result<Domain, ControlError> {
        let mut t = self.tables.write().await;
        let domain = t
            .domains
            .get_mut(&id)
            .ok_or_else(|| ControlError::not_found("Domain", id))?;
        domain.dns_verified = verified;
        Ok(domain.clone())
    }

    async fn delete_domain(&self, id: Uuid) -> Result<(), ControlError> {
        self.tables.write().await.domains.remove(&id);
        Ok(())
    }

    async fn list_domains(&self, service_id: Uuid) -> Result<Vec<Domain>, ControlError> {
        let t = self.tables.read().await;
        let mut domains: Vec<_> = t
            .domains
            .values()
            .filter(|d| d.service_id == service_id)
            .cloned()
            .collect();
        domains.sort_by_key(|d| d.created_at);
        Ok(domains)
    }

    async fn list_all_domains(&self) -> Result<Vec<Domain>, ControlError> {
        let t = self.tables.read().await;
        let mut domains: Vec<_> = t.domains.values().cloned().collect();
        domains.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeploymentStatus, EnvironmentType};

    #[tokio::test]
    async fn test_commit_keyed_deployments_are_unique() {
        let store = MemoryStore::new();
        let service_id = Uuid::new_v4();
        let env_id = Uuid::new_v4();

        let first = Deployment::new(service_id, env_id, Some("abc".to_string()), None);
        store.insert_deployment(first.clone()).await.unwrap();

        let dup = Deployment::new(service_id, env_id, Some("abc".to_string()), None);
        assert!(matches!(
            store.insert_deployment(dup).await,
            Err(ControlError::Conflict(_))
        ));

        // Rollbacks replay the same commit and are exempt
        store.insert_deployment(Deployment::rollback_of(&first)).await.unwrap();
        assert_eq!(store.list_deployments(service_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_in_flight_update_leaves_terminal_rows_alone() {
        let store = MemoryStore::new();
        let deployment = Deployment::new(Uuid::new_v4(), Uuid::new_v4(), Some("abc".to_string()), None);
        store.insert_deployment(deployment.clone()).await.unwrap();

        let building = store
            .update_in_flight_deployment(deployment.id, DeploymentUpdate::status(DeploymentStatus::Building))
            .await
            .unwrap();
        assert_eq!(building.map(|d| d.status), Some(DeploymentStatus::Building));

        store
            .update_deployment(deployment.id, DeploymentUpdate::status(DeploymentStatus::Cancelled))
            .await
            .unwrap();
        let late = store
            .update_in_flight_deployment(deployment.id, DeploymentUpdate::status(DeploymentStatus::Failed))
            .await
            .unwrap();
        assert!(late.is_none());
        let row = store.get_deployment(deployment.id).await.unwrap().unwrap();
        assert_eq!(row.status, DeploymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_list_deployments_newest_first() {
        let store = MemoryStore::new();
        let service_id = Uuid::new_v4();
        let env_id = Uuid::new_v4();
        for sha in ["a", "b", "c"] {
            store
                .insert_deployment(Deployment::new(service_id, env_id, Some(sha.to_string()), None))
                .await
                .unwrap();
        }
        let shas: Vec<_> = store
            .list_deployments(service_id)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.commit_sha.unwrap())
            .collect();
        assert_eq!(shas, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_find_preview_by_pr_number() {
        let store = MemoryStore::new();
        let project_id = Uuid::new_v4();
        store
            .insert_environment(Environment::new(project_id, "production", EnvironmentType::Production))
            .await
            .unwrap();
        let preview = store
            .insert_environment(Environment::preview(project_id, "pr-9-fix", 9, "fix"))
            .await
            .unwrap();

        assert_eq!(store.find_preview(project_id, 9).await.unwrap(), Some(preview));
        assert!(store.find_preview(project_id, 10).await.unwrap().is_none());
    }
}
