//! Demo-mode guardrails
//!
//! Every mutating entry point asks the guard before doing work. Counts come
//! from live store queries; nothing is cached. Checks are read-then-act, so
//! concurrent requests can overshoot a quota by one.

pub mod rate_limit;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::errors::ControlError;
use crate::store::Store;
use crate::storage::settings::DemoSettings;

pub use rate_limit::LoginRateLimiter;

/// Quota and ceiling checks; all pass when demo mode is off
pub struct Guard {
    limits: DemoSettings,
    store: Arc<dyn Store>,
}

impl Guard {
    pub fn new(limits: DemoSettings, store: Arc<dyn Store>) -> Self {
        Self { limits, store }
    }

    pub fn is_demo(&self) -> bool {
        self.limits.enabled
    }

    pub fn limits(&self) -> &DemoSettings {
        &self.limits
    }

    pub async fn check_project_quota(&self) -> Result<(), ControlError> {
        if !self.is_demo() {
            return Ok(());
        }
        let count = self.store.count_projects().await?;
        if count >= self.limits.max_projects {
            return Err(quota(format!(
                "Demo instances are limited to {} projects",
                self.limits.max_projects
            )));
        }
        Ok(())
    }

    pub async fn check_environment_quota(&self, project_id: Uuid) -> Result<(), ControlError> {
        if !self.is_demo() {
            return Ok(());
        }
        let count = self.store.count_environments(project_id).await?;
        if count >= self.limits.max_environments_per_project {
            return Err(quota(format!(
                "Demo projects are limited to {} environments",
                self.limits.max_environments_per_project
            )));
        }
        Ok(())
    }

    /// `requested` services are about to be added in one batch
    pub async fn check_service_quota(&self, environment_id: Uuid, requested: usize) -> Result<(), ControlError> {
        if !self.is_demo() {
            return Ok(());
        }
        let count = self.store.count_services(environment_id).await?;
        if count + requested > self.limits.max_services_per_environment {
            return Err(quota(format!(
                "Demo environments are limited to {} services ({} existing, {} requested)",
                self.limits.max_services_per_environment, count, requested
            )));
        }
        Ok(())
    }

    pub fn check_replicas(&self, replicas: u32) -> Result<(), ControlError> {
        if self.is_demo() && replicas > self.limits.max_replicas_per_service {
            return Err(quota(format!(
                "Demo services are limited to {} replicas",
                self.limits.max_replicas_per_service
            )));
        }
        Ok(())
    }

    /// Requests over the ceiling are rejected, never clamped
    pub fn check_resources(&self, cpu_limit: Option<f64>, memory_limit_mb: Option<u64>) -> Result<(), ControlError> {
        if !self.is_demo() {
            return Ok(());
        }
        if let Some(cpu) = cpu_limit {
            if cpu > self.limits.max_cpu_limit {
                return Err(quota(format!(
                    "CPU limit {} exceeds the demo ceiling of {} cores",
                    cpu, self.limits.max_cpu_limit
                )));
            }
        }
        if let Some(memory) = memory_limit_mb {
            if memory > self.limits.max_memory_limit_mb {
                return Err(quota(format!(
                    "Memory limit {}MB exceeds the demo ceiling of {}MB",
                    memory, self.limits.max_memory_limit_mb
                )));
            }
        }
        Ok(())
    }

    /// Sliding window over deployments created for the service
    pub async fn check_deploy_rate(&self, service_id: Uuid) -> Result<(), ControlError> {
        if !self.is_demo() {
            return Ok(());
        }
        let window = chrono::Duration::from_std(self.limits.deploy_window())
            .map_err(|e| ControlError::ConfigError(e.to_string()))?;
        let count = self
            .store
            .count_deployments_since(service_id, Utc::now() - window)
            .await?;
        if count >= self.limits.deploys_per_window {
            return Err(quota(format!(
                "Demo services are limited to {} deploys per {} minutes",
                self.limits.deploys_per_window,
                self.limits.deploy_window_secs / 60
            )));
        }
        Ok(())
    }
}

fn quota(message: String) -> ControlError {
    ControlError::BadRequest(format!("Quota exceeded: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Deployment, Environment, EnvironmentType, Project};
    use crate::store::MemoryStore;

    fn demo_limits() -> DemoSettings {
        DemoSettings {
            enabled: true,
            max_projects: 1,
            max_services_per_environment: 3,
            deploys_per_window: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_guard_allows_everything() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.insert_project(Project::new("a")).await.unwrap();
        let guard = Guard::new(DemoSettings::default(), store);

        assert!(guard.check_project_quota().await.is_ok());
        assert!(guard.check_replicas(100).is_ok());
        assert!(guard.check_resources(Some(64.0), Some(1 << 20)).is_ok());
    }

    #[tokio::test]
    async fn test_project_quota() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let guard = Guard::new(demo_limits(), store.clone());
        assert!(guard.check_project_quota().await.is_ok());

        store.insert_project(Project::new("a")).await.unwrap();
        assert!(matches!(
            guard.check_project_quota().await,
            Err(ControlError::BadRequest(msg)) if msg.contains("1 projects")
        ));
    }

    #[tokio::test]
    async fn test_service_quota_counts_batch() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let env = store
            .insert_environment(Environment::new(Uuid::new_v4(), "production", EnvironmentType::Production))
            .await
            .unwrap();
        let guard = Guard::new(demo_limits(), store);

        assert!(guard.check_service_quota(env.id, 3).await.is_ok());
        assert!(guard.check_service_quota(env.id, 4).await.is_err());
    }

    #[test]
    fn test_resource_ceiling_rejects() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let guard = Guard::new(demo_limits(), store);
        assert!(guard.check_resources(Some(0.5), Some(512)).is_ok());
        assert!(guard.check_resources(Some(1.5), None).is_err());
        assert!(guard.check_resources(None, Some(513)).is_err());
    }

    #[tokio::test]
    async fn test_deploy_rate_window() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let guard = Guard::new(demo_limits(), store.clone());
        let service_id = Uuid::new_v4();

        let mut old = Deployment::new(service_id, Uuid::new_v4(), Some("old".to_string()), None);
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        store.insert_deployment(old).await.unwrap();
        store
            .insert_deployment(Deployment::new(service_id, Uuid::new_v4(), Some("a".to_string()), None))
            .await
            .unwrap();
        assert!(guard.check_deploy_rate(service_id).await.is_ok());

        store
            .insert_deployment(Deployment::new(service_id, Uuid::new_v4(), Some("b".to_string()), None))
            .await
            .unwrap();
        assert!(guard.check_deploy_rate(service_id).await.is_err());
    }
}
